use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use md_harvest::clients::{CatalogSearch, EnrichmentClient, PubMedCatalog, RcsbClient};
use md_harvest::error::{ApiError, AppError};
use md_harvest::infrastructure::{RateLimitedClient, RetryPolicy};
use md_harvest::models::EnrichmentField;

fn client(name: &str) -> RateLimitedClient {
    RateLimitedClient::with_client(
        name,
        reqwest::Client::new(),
        Duration::ZERO,
        RetryPolicy::new(3, Duration::from_millis(10)),
    )
}

#[tokio::test]
async fn test_429_with_retry_after_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let http = client("test");
    let url = format!("{}/data", server.uri());
    let body = tokio_test::assert_ok!(http.send_text(|c| c.get(&url)).await);

    assert_eq!(body, "ok");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_server_errors_exhaust_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let http = client("flaky");
    let url = format!("{}/flaky", server.uri());
    let err = http.send_text(|c| c.get(&url)).await.unwrap_err();

    assert!(matches!(err, AppError::Api(ApiError::BadStatus { status: 503, .. })));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let http = client("missing");
    let url = format!("{}/missing", server.uri());
    let err = http.send_text(|c| c.get(&url)).await.unwrap_err();

    assert!(matches!(err, AppError::Api(ApiError::BadStatus { status: 404, .. })));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_rcsb_lookup_parses_entry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "entry": {
                "struct_keywords": { "pdbx_keywords": "TRANSFERASE" },
                "exptl": [{ "method": "SOLUTION NMR" }],
                "polymer_entities": [
                    { "rcsb_entity_source_organism": [{ "scientific_name": "Escherichia coli" }] }
                ]
            }}
        })))
        .mount(&server)
        .await;

    let rcsb = RcsbClient::with_client(client("rcsb"), &format!("{}/graphql", server.uri()));
    let result = rcsb.lookup("1abc").await.unwrap();

    assert_eq!(result.structure_id, "1abc");
    assert_eq!(result.classification, EnrichmentField::Value("TRANSFERASE".into()));
    assert_eq!(result.organism, EnrichmentField::Value("Escherichia coli".into()));
    assert_eq!(result.method, EnrichmentField::Value("SOLUTION NMR".into()));

    let requests = server.received_requests().await.unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["variables"]["id"], "1ABC");
}

#[tokio::test]
async fn test_pubmed_search_and_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .and(query_param("retstart", "20"))
        .and(query_param("retmax", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "esearchresult": { "idlist": ["31234567"] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/efetch.fcgi"))
        .and(query_param("id", "31234567"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<PubmedArticleSet><PubmedArticle><MedlineCitation>
<PMID Version="1">31234567</PMID>
<Article><ArticleTitle>Membrane dynamics.</ArticleTitle>
<ELocationID EIdType="doi" ValidYN="Y">10.1000/membrane</ELocationID></Article>
</MedlineCitation></PubmedArticle></PubmedArticleSet>"#,
        ))
        .mount(&server)
        .await;

    let catalog = PubMedCatalog::with_client(client("pubmed"), &server.uri(), None);
    let ids = catalog.search("molecular dynamics", 2, 20).await.unwrap();
    assert_eq!(ids, vec!["31234567"]);

    let metadata = catalog.fetch_metadata(&ids).await.unwrap();
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata[0].title, "Membrane dynamics.");
    assert_eq!(metadata[0].doi.as_deref(), Some("10.1000/membrane"));
}
