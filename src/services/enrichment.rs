//! 结构富化与过滤

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::clients::EnrichmentClient;
use crate::models::{CandidateRecord, EnrichmentField, EnrichmentResult, CLASSIFICATION_SIMULATED};

fn merge_field(target: &mut Option<String>, field: &EnrichmentField) {
    if let EnrichmentField::Value(value) = field {
        *target = Some(value.clone());
    }
}

/// 合并富化结果，"未找到"哨兵不覆盖已有字段
pub fn merge_enrichment(record: &mut CandidateRecord, result: &EnrichmentResult) {
    merge_field(&mut record.classification, &result.classification);
    merge_field(&mut record.organism, &result.organism);
    merge_field(&mut record.experimental_method, &result.method);
}

/// 富化并过滤候选记录
///
/// 每个非预测模型的标识符只查询一次；查询失败按全部"未找到"处理。
/// 丢弃两类记录：查询结果全部为"未找到"的标识符，
/// 以及合并后 classification / organism / method 仍全为空白的记录。
///
/// # 参数
/// - `records`: 去重后的候选记录
/// - `client`: 富化服务
///
/// # 返回
/// 保留下来的记录，顺序不变
pub async fn enrich_and_filter(
    records: Vec<CandidateRecord>,
    client: &dyn EnrichmentClient,
) -> Vec<CandidateRecord> {
    let mut results: HashMap<String, EnrichmentResult> = HashMap::new();

    for record in &records {
        let simulated = record.classification.as_deref() == Some(CLASSIFICATION_SIMULATED);
        if simulated || results.contains_key(&record.structure_id) {
            continue;
        }
        let result = match client.lookup(&record.structure_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!("⚠️ 富化查询失败 {}: {}", record.structure_id, e);
                EnrichmentResult::not_found(&record.structure_id)
            }
        };
        debug!("🔍 富化 {} → {:?}", record.structure_id, result);
        results.insert(record.structure_id.clone(), result);
    }

    let before = records.len();
    let kept: Vec<CandidateRecord> = records
        .into_iter()
        .filter_map(|mut record| {
            if let Some(result) = results.get(&record.structure_id) {
                if result.is_all_not_found() {
                    return None;
                }
                merge_enrichment(&mut record, result);
            }
            (!record.lacks_structure_signal()).then_some(record)
        })
        .collect();

    info!(
        "📊 富化完成: 查询 {} 个标识符，保留 {}/{} 条记录",
        results.len(),
        kept.len(),
        before
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EnrichmentClient for FixedClient {
        async fn lookup(&self, structure_id: &str) -> AppResult<EnrichmentResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match structure_id {
                "1ABC" => Ok(EnrichmentResult {
                    structure_id: structure_id.to_string(),
                    classification: EnrichmentField::Value("HYDROLASE".into()),
                    organism: EnrichmentField::NotFound,
                    method: EnrichmentField::Value("X-RAY DIFFRACTION".into()),
                }),
                "9ERR" => Err(AppError::Other("boom".into())),
                _ => Ok(EnrichmentResult::not_found(structure_id)),
            }
        }
    }

    fn record(id: &str, classification: Option<&str>) -> CandidateRecord {
        CandidateRecord {
            structure_id: id.into(),
            classification: classification.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn sentinel_never_overwrites() {
        let mut r = record("1ABC", Some("experimental"));
        r.organism = Some("Homo sapiens".into());
        merge_enrichment(&mut r, &EnrichmentResult::not_found("1ABC"));
        assert_eq!(r.classification.as_deref(), Some("experimental"));
        assert_eq!(r.organism.as_deref(), Some("Homo sapiens"));
    }

    #[tokio::test]
    async fn looks_up_each_identifier_once() {
        let client = FixedClient {
            calls: AtomicUsize::new(0),
        };
        let records = vec![
            record("1ABC", Some("experimental")),
            CandidateRecord {
                temperature: Some(300.0),
                ..record("1ABC", Some("experimental"))
            },
            record("ALPHAFOLD", Some(CLASSIFICATION_SIMULATED)),
        ];
        let kept = enrich_and_filter(records, &client).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].classification.as_deref(), Some("HYDROLASE"));
        assert_eq!(kept[0].experimental_method.as_deref(), Some("X-RAY DIFFRACTION"));
        assert!(kept[0].organism.is_none());
    }

    #[tokio::test]
    async fn unknown_structures_are_dropped_despite_discovery_classification() {
        let client = FixedClient {
            calls: AtomicUsize::new(0),
        };
        let records = vec![
            record("2XYZ", Some("experimental")),
            record("1ABC", Some("experimental")),
        ];
        let kept = enrich_and_filter(records, &client).await;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].structure_id, "1ABC");
    }

    #[tokio::test]
    async fn records_without_signal_are_dropped() {
        let client = FixedClient {
            calls: AtomicUsize::new(0),
        };
        let records = vec![record("2XYZ", Some("  ")), record("9ERR", None)];
        let kept = enrich_and_filter(records, &client).await;
        assert!(kept.is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }
}
