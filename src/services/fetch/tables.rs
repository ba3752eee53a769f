//! `<table>` → 行映射
//!
//! 表头推断：显式 `<th>` 行，否则生成 "Column N"。

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};

use crate::error::AppResult;
use crate::models::TableData;
use crate::services::fetch::{element_text, selector};

/// 提取页面中的全部表格（空表跳过）
pub fn extract_tables(document: &Html) -> AppResult<Vec<TableData>> {
    let table_sel = selector("table")?;
    let mut tables = Vec::new();
    for table in document.select(&table_sel) {
        if let Some(data) = table_from_element(table)? {
            tables.push(data);
        }
    }
    Ok(tables)
}

/// 单个表格转换
pub fn table_from_element(table: ElementRef<'_>) -> AppResult<Option<TableData>> {
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;
    let caption_sel = selector("caption")?;

    let caption = table
        .select(&caption_sel)
        .next()
        .map(|c| element_text(&c))
        .filter(|c| !c.is_empty());

    let mut header_cells: Option<Vec<String>> = None;
    let mut body_rows: Vec<Vec<String>> = Vec::new();

    for row in table.select(&row_sel) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
        if cells.is_empty() {
            continue;
        }
        let all_th = cells.iter().all(|c| c.value().name() == "th");
        let texts: Vec<String> = cells.iter().map(element_text).collect();

        if header_cells.is_none() && body_rows.is_empty() && all_th {
            header_cells = Some(texts);
        } else if texts.iter().any(|t| !t.is_empty()) {
            body_rows.push(texts);
        }
    }

    let width = body_rows
        .iter()
        .map(Vec::len)
        .chain(header_cells.as_ref().map(Vec::len))
        .max()
        .unwrap_or(0);
    if width == 0 || body_rows.is_empty() {
        return Ok(None);
    }

    let headers = infer_headers(header_cells.unwrap_or_default(), width);
    let rows = body_rows
        .into_iter()
        .map(|cells| {
            headers
                .iter()
                .cloned()
                .zip(cells.into_iter().chain(std::iter::repeat(String::new())))
                .collect::<BTreeMap<_, _>>()
        })
        .collect();

    Ok(Some(TableData { caption, headers, rows }))
}

/// 补齐缺失 / 空白表头，重复表头追加序号
fn infer_headers(explicit: Vec<String>, width: usize) -> Vec<String> {
    let mut headers: Vec<String> = Vec::with_capacity(width);
    for index in 0..width {
        let base = explicit
            .get(index)
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| format!("Column {}", index + 1));

        let mut candidate = base.clone();
        let mut suffix = 2;
        while headers.contains(&candidate) {
            candidate = format!("{} ({})", base, suffix);
            suffix += 1;
        }
        headers.push(candidate);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_th_row_as_headers() {
        let html = Html::parse_document(
            "<table><caption>Systems</caption>\
             <tr><th>System</th><th>Length</th></tr>\
             <tr><td>Apo</td><td>500 ns</td></tr>\
             <tr><td>Holo</td><td>1 µs</td></tr></table>",
        );
        let tables = extract_tables(&html).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].caption.as_deref(), Some("Systems"));
        assert_eq!(tables[0].headers, vec!["System", "Length"]);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[0].rows[1]["Length"], "1 µs");
    }

    #[test]
    fn synthesizes_column_labels() {
        let html = Html::parse_document("<table><tr><td>a</td><td>b</td></tr><tr><td>c</td></tr></table>");
        let tables = extract_tables(&html).unwrap();
        assert_eq!(tables[0].headers, vec!["Column 1", "Column 2"]);
        assert_eq!(tables[0].rows[1]["Column 2"], "");
    }

    #[test]
    fn duplicate_headers_are_suffixed() {
        let html = Html::parse_document(
            "<table><tr><th>T</th><th>T</th><th></th></tr><tr><td>1</td><td>2</td><td>3</td></tr></table>",
        );
        let tables = extract_tables(&html).unwrap();
        assert_eq!(tables[0].headers, vec!["T", "T (2)", "Column 3"]);
    }

    #[test]
    fn empty_tables_are_skipped() {
        let html = Html::parse_document("<table><tr><th>Only header</th></tr></table>");
        assert!(extract_tables(&html).unwrap().is_empty());
    }
}
