//! 结构标识符发现
//!
//! - AlphaFold / RosettaFold 预测模型 → `ALPHAFOLD` / `ROSETTAFOLD`，分类 simulated
//! - 4 位 PDB 编号只在含上下文关键词的句子里找，分类 experimental

use std::collections::HashSet;

use regex::Regex;

use crate::error::AppResult;
use crate::models::{CLASSIFICATION_EXPERIMENTAL, CLASSIFICATION_SIMULATED};

use super::sentences::Sentence;

/// 发现的结构标识符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredIdentifier {
    /// 已转为大写
    pub id: String,
    pub classification: &'static str,
}

impl DiscoveredIdentifier {
    pub fn is_simulated(&self) -> bool {
        self.classification == CLASSIFICATION_SIMULATED
    }
}

/// 结构编号的合法性：4 位、数字开头、至少含一个字母
pub fn is_valid_structure_code(token: &str) -> bool {
    token.len() == 4
        && token.chars().all(|c| c.is_ascii_alphanumeric())
        && token.starts_with(|c: char| c.is_ascii_digit())
        && token.chars().any(|c| c.is_ascii_alphabetic())
}

pub struct IdentifierMatcher {
    predicted: Regex,
    context: Regex,
    list: Regex,
    single: Regex,
    bare: Regex,
    code: Regex,
    quantity: Regex,
}

impl IdentifierMatcher {
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            predicted: Regex::new(r"(?i)\b(alpha\s*fold|rosetta\s*fold)")?,
            context: Regex::new(
                r"(?i)protein\s+data\s+bank|\bpdb|\baccession|\bstructur|\bcrystal|\bentr(?:y|ies)\b|\bcodes?\b",
            )?,
            list: Regex::new(
                r"(?i)\b(?:pdb|protein\s+data\s+bank|accession|entr(?:y|ies)|codes?|ids?)[^.;]{0,40}?\b([0-9][a-z0-9]{3}(?:\s*(?:,|and|&|/)\s*[0-9][a-z0-9]{3})+)\b",
            )?,
            single: Regex::new(
                r"(?i)\b(?:pdb|protein\s+data\s+bank|accession|entry|code|id)(?:\s+(?:code|id|entry|accession|number))?[\s:#(\[]*\b([0-9][a-z0-9]{3})\b",
            )?,
            bare: Regex::new(r"\b[0-9][A-Z0-9]{3}\b")?,
            code: Regex::new(r"(?i)\b[0-9][a-z0-9]{3}\b")?,
            quantity: Regex::new(r"^(?:\d{3}[KM]|\d{2}(?:NS|PS|MM|UM|NM|KJ))$")?,
        })
    }

    /// 从全文发现标识符，按首次出现排序并去重
    ///
    /// # 参数
    /// - `text`: 文章全文
    /// - `sentences`: 全文切分后的句子
    pub fn discover(&self, text: &str, sentences: &[Sentence<'_>]) -> Vec<DiscoveredIdentifier> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for sentence in sentences {
            if !self.context.is_match(sentence.text) {
                continue;
            }
            for code in self.codes_in_sentence(sentence.text) {
                if seen.insert(code.clone()) {
                    found.push(DiscoveredIdentifier {
                        id: code,
                        classification: CLASSIFICATION_EXPERIMENTAL,
                    });
                }
            }
        }

        for caps in self.predicted.captures_iter(text) {
            let id = if caps[1].to_lowercase().starts_with("alpha") {
                "ALPHAFOLD"
            } else {
                "ROSETTAFOLD"
            };
            if seen.insert(id.to_string()) {
                found.push(DiscoveredIdentifier {
                    id: id.to_string(),
                    classification: CLASSIFICATION_SIMULATED,
                });
            }
        }

        found
    }

    /// 列表模式优先，其次关键词紧邻的单个编号，最后是句中裸编号
    fn codes_in_sentence(&self, sentence: &str) -> Vec<String> {
        let listed: Vec<String> = self
            .list
            .captures_iter(sentence)
            .flat_map(|caps| {
                self.code
                    .find_iter(caps.get(1).map_or("", |m| m.as_str()))
                    .map(|m| m.as_str().to_uppercase())
                    .collect::<Vec<_>>()
            })
            .filter(|code| is_valid_structure_code(code))
            .collect();
        if !listed.is_empty() {
            return listed;
        }

        let single: Vec<String> = self
            .single
            .captures_iter(sentence)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_uppercase()))
            .filter(|code| is_valid_structure_code(code))
            .collect();
        if !single.is_empty() {
            return single;
        }

        self.bare
            .find_iter(sentence)
            .map(|m| m.as_str().to_string())
            .filter(|code| is_valid_structure_code(code) && !self.quantity.is_match(code))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::extraction::sentences::split_sentences;

    fn ids(text: &str) -> Vec<String> {
        let matcher = IdentifierMatcher::new().unwrap();
        matcher
            .discover(text, &split_sentences(text))
            .into_iter()
            .map(|d| d.id)
            .collect()
    }

    #[test]
    fn validates_structure_codes() {
        assert!(is_valid_structure_code("1ABC"));
        assert!(is_valid_structure_code("6VXX"));
        assert!(!is_valid_structure_code("2000"));
        assert!(!is_valid_structure_code("ABCD"));
        assert!(!is_valid_structure_code("1AB"));
    }

    #[test]
    fn keyword_adjacent_code_is_uppercased() {
        assert_eq!(ids("The crystal structure (PDB code 1abc) was used."), vec!["1ABC"]);
    }

    #[test]
    fn list_pattern_collects_every_code() {
        assert_eq!(
            ids("Structures were taken from PDB entries 1AKE, 4AKE and 2ECK."),
            vec!["1AKE", "4AKE", "2ECK"]
        );
    }

    #[test]
    fn codes_need_context_sentences() {
        assert!(ids("We ran 1ABC replicas at 310K.").is_empty());
    }

    #[test]
    fn bare_pass_skips_quantities() {
        assert_eq!(ids("The structure was simulated at 310K starting from 3HTB."), vec!["3HTB"]);
    }

    #[test]
    fn predicted_models_are_simulated() {
        let matcher = IdentifierMatcher::new().unwrap();
        let text = "Models were built with Alpha Fold and RoseTTAFold.";
        let found = matcher.discover(text, &split_sentences(text));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "ALPHAFOLD");
        assert_eq!(found[1].id, "ROSETTAFOLD");
        assert!(found.iter().all(|d| d.is_simulated()));
    }
}
