use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entity::Entities;

/// Characters of the response text kept in a memory entry.
pub const RESPONSE_EXCERPT_CHARS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub intent: String,
    pub entities: Entities,
    pub response_excerpt: String,
}

impl MemoryEntry {
    pub fn new(
        message: impl Into<String>,
        intent: impl Into<String>,
        entities: Entities,
        response_text: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            intent: intent.into(),
            entities,
            response_excerpt: excerpt(response_text),
        }
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= RESPONSE_EXCERPT_CHARS {
        return text.to_string();
    }
    let mut truncated = text.chars().take(RESPONSE_EXCERPT_CHARS).collect::<String>();
    truncated.push_str("...");
    truncated
}
