//! RCSB PDB 结构富化客户端（GraphQL）

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::clients::EnrichmentClient;
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{RateLimitedClient, RetryPolicy};
use crate::models::{EnrichmentField, EnrichmentResult};

const ENTRY_QUERY: &str = r#"query($id: String!) {
  entry(entry_id: $id) {
    struct_keywords { pdbx_keywords }
    exptl { method }
    polymer_entities {
      rcsb_entity_source_organism { scientific_name }
    }
  }
}"#;

/// RCSB 富化客户端
pub struct RcsbClient {
    http: RateLimitedClient,
    graphql_url: String,
}

impl RcsbClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = RateLimitedClient::new(
            "rcsb",
            Duration::from_millis(config.rcsb_min_interval_ms),
            RetryPolicy::default(),
        )?;
        Ok(Self::with_client(http, &config.rcsb_graphql_url))
    }

    pub fn with_client(http: RateLimitedClient, graphql_url: &str) -> Self {
        Self {
            http,
            graphql_url: graphql_url.to_string(),
        }
    }
}

#[async_trait]
impl EnrichmentClient for RcsbClient {
    async fn lookup(&self, structure_id: &str) -> AppResult<EnrichmentResult> {
        let body = json!({
            "query": ENTRY_QUERY,
            "variables": { "id": structure_id.to_uppercase() },
        });
        let response: JsonValue = self
            .http
            .send_json(|client| client.post(&self.graphql_url).json(&body))
            .await?;

        let result = parse_entry_response(structure_id, &response);
        debug!(
            "富化 {}: 分类={:?} 物种={:?} 方法={:?}",
            structure_id,
            result.classification.value(),
            result.organism.value(),
            result.method.value()
        );
        Ok(result)
    }
}

fn field(value: Option<&JsonValue>) -> EnrichmentField {
    EnrichmentField::parse(value.and_then(JsonValue::as_str).map(str::trim).filter(|s| !s.is_empty()))
}

/// 解析 GraphQL 响应，缺失的条目 / 字段映射为 "Not found"
pub fn parse_entry_response(structure_id: &str, response: &JsonValue) -> EnrichmentResult {
    let entry = match response.pointer("/data/entry") {
        Some(entry) if entry.is_object() => entry,
        _ => return EnrichmentResult::not_found(structure_id),
    };

    let organism = entry
        .get("polymer_entities")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entity| entity.get("rcsb_entity_source_organism")?.as_array())
        .flatten()
        .find_map(|source| source.get("scientific_name").filter(|v| v.is_string()));

    EnrichmentResult {
        structure_id: structure_id.to_string(),
        classification: field(entry.pointer("/struct_keywords/pdbx_keywords")),
        organism: field(organism),
        method: field(entry.pointer("/exptl/0/method")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_entry() {
        let response = json!({
            "data": { "entry": {
                "struct_keywords": { "pdbx_keywords": "HYDROLASE" },
                "exptl": [{ "method": "X-RAY DIFFRACTION" }],
                "polymer_entities": [
                    { "rcsb_entity_source_organism": null },
                    { "rcsb_entity_source_organism": [{ "scientific_name": "Gallus gallus" }] }
                ]
            }}
        });
        let result = parse_entry_response("1ABC", &response);
        assert_eq!(result.classification, EnrichmentField::Value("HYDROLASE".into()));
        assert_eq!(result.organism, EnrichmentField::Value("Gallus gallus".into()));
        assert_eq!(result.method, EnrichmentField::Value("X-RAY DIFFRACTION".into()));
    }

    #[test]
    fn missing_entry_is_all_not_found() {
        let response = json!({ "data": { "entry": null } });
        assert_eq!(parse_entry_response("9ZZZ", &response), EnrichmentResult::not_found("9ZZZ"));
    }

    #[test]
    fn blank_fields_become_not_found() {
        let response = json!({
            "data": { "entry": { "struct_keywords": { "pdbx_keywords": "  " }, "exptl": [] } }
        });
        let result = parse_entry_response("1ABC", &response);
        assert_eq!(result.classification, EnrichmentField::NotFound);
        assert_eq!(result.method, EnrichmentField::NotFound);
        assert_eq!(result.organism, EnrichmentField::NotFound);
    }
}
