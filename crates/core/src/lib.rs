pub mod catalog;
pub mod config;
pub mod data_store;
pub mod domain;
pub mod errors;

pub use catalog::{
    CatalogError, CatalogStore, IntentCatalog, MatchMode, SynonymGroup, Vocabularies, Vocabulary,
};
pub use data_store::{DataStore, DataStoreError};
pub use domain::conversation::{ConversationId, MemoryEntry};
pub use domain::entity::{Entities, EntityType, EntityValue};
pub use domain::intent::{
    ClassificationResult, IntentDefinition, QuestionType, FALLBACK_CONFIDENCE, GENERAL_INTENT,
};
pub use domain::query::{QueryOutcome, QueryParam, QuerySpec, Row, StatementSpec};
pub use domain::response::{AssistantResponse, ChatRequest};
pub use errors::{ApplicationError, InterfaceError};
