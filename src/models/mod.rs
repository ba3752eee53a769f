pub mod article;
pub mod loaders;
pub mod record;
pub mod vocabulary;

pub use article::{
    Article, ArticleMetadata, Chapter, FetchOutcome, FetchState, FetchTarget, FetchedContent,
    ImageData, TableData,
};
pub use loaders::{load_vocabulary, load_vocabulary_or_builtin};
pub use record::{
    AttributeKind, AttributeObservation, CandidateKey, CandidateRecord, EnrichmentField,
    EnrichmentResult, WaterModel, WaterModelType, CLASSIFICATION_EXPERIMENTAL,
    CLASSIFICATION_SIMULATED, NOT_FOUND,
};
pub use vocabulary::Vocabulary;
