use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row: column label to value.
pub type Row = Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Statement text with its positional `?` parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatementSpec {
    pub text: String,
    pub parameters: Vec<QueryParam>,
}

impl StatementSpec {
    pub fn literal(text: impl Into<String>) -> Self {
        Self { text: text.into(), parameters: Vec::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "query_type", rename_all = "snake_case")]
pub enum QuerySpec {
    Single { text: String, parameters: Vec<QueryParam>, description: String },
    Multiple { statements: BTreeMap<String, StatementSpec> },
}

impl QuerySpec {
    pub fn single(statement: StatementSpec, description: impl Into<String>) -> Self {
        Self::Single {
            text: statement.text,
            parameters: statement.parameters,
            description: description.into(),
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        match self {
            Self::Single { .. } => Vec::new(),
            Self::Multiple { statements } => statements.keys().map(String::as_str).collect(),
        }
    }
}

/// Execution results handed to the synthesizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "query_type", rename_all = "snake_case")]
pub enum QueryOutcome {
    Single { rows: Vec<Row>, description: String },
    Multiple { results: BTreeMap<String, Vec<Row>> },
    /// The spec failed validation and was never executed.
    Rejected { description: String },
}

impl QueryOutcome {
    pub fn total_rows(&self) -> usize {
        match self {
            Self::Single { rows, .. } => rows.len(),
            Self::Multiple { results } => results.values().map(Vec::len).sum(),
            Self::Rejected { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Single { rows, .. } => rows,
            Self::Multiple { .. } | Self::Rejected { .. } => &[],
        }
    }

    pub fn labeled(&self, label: &str) -> &[Row] {
        match self {
            Self::Multiple { results } => results.get(label).map(Vec::as_slice).unwrap_or(&[]),
            Self::Single { .. } | Self::Rejected { .. } => &[],
        }
    }
}
