pub mod enrichment;
pub mod extraction;
pub mod fetch;
pub mod publisher_router;

pub use enrichment::{enrich_and_filter, merge_enrichment};
pub use extraction::ExtractionEngine;
pub use fetch::{ContentFetcher, GenericScraper, PublisherApiClient};
pub use publisher_router::{PublisherKind, PublisherRouter, Route};
