//! Query-intent pipeline for the academic assistant.
//!
//! A message flows through a fixed sequence of stages:
//! 1. **Classification** (`classifier`, `extractor`, `normalize`) - intent, entities, search terms
//! 2. **Generation** (`generator`, `schema`) - a parameterized read-only [`QuerySpec`]
//! 3. **Validation** (`validator`) - lexical safety gate and row cap
//! 4. **Execution** - one [`DataStore::execute`] call per statement
//! 5. **Synthesis** (`synthesizer`) - Spanish response text, context and recommendations
//! 6. **Memory** (`memory`) - bounded per-conversation history for continuity cues
//!
//! [`AssistantRuntime`](runtime::AssistantRuntime) wires the stages together.
//!
//! # Safety Principle
//!
//! User text never becomes statement text. Entity values and search terms are always bound
//! parameters; the validator is a second line of defense, not the first.
//!
//! [`QuerySpec`]: aula_core::domain::query::QuerySpec
//! [`DataStore::execute`]: aula_core::data_store::DataStore::execute

pub mod classifier;
pub mod extractor;
pub mod generator;
pub mod memory;
pub mod normalize;
pub mod runtime;
pub mod schema;
pub mod synthesizer;
pub mod validator;

pub use classifier::{IntentClassifier, KeywordPatternScorer, ScorerFactory, ScoringStrategy};
pub use extractor::EntityExtractor;
pub use generator::{GenerationError, QueryGenerator};
pub use memory::ConversationMemory;
pub use runtime::AssistantRuntime;
pub use synthesizer::{ResponseSynthesizer, SynthesisError};
pub use validator::{PreparedQuery, QueryValidator, ValidatedStatement, ValidationError};
