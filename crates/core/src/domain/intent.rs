use serde::{Deserialize, Serialize};

use crate::domain::entity::{Entities, EntityType};

/// Intent returned when nothing in the catalog scores above the confidence threshold.
pub const GENERAL_INTENT: &str = "general";

/// Confidence reported for the low-confidence fallback. Not a calibrated probability.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub slots: Vec<EntityType>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Count,
    Identify,
    How,
    Where,
    When,
    Why,
    General,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Identify => "identify",
            Self::How => "how",
            Self::Where => "where",
            Self::When => "when",
            Self::Why => "why",
            Self::General => "general",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: String,
    pub confidence: f64,
    pub entities: Entities,
    pub search_terms: Vec<String>,
    pub question_type: QuestionType,
    pub normalized_text: String,
}

impl ClassificationResult {
    pub fn is_general(&self) -> bool {
        self.intent == GENERAL_INTENT
    }
}
