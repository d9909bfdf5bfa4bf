use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Category,
    Period,
    RiskType,
    RiskLevel,
    NumericCount,
    ProperNoun,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        Self::Category,
        Self::Period,
        Self::RiskType,
        Self::RiskLevel,
        Self::NumericCount,
        Self::ProperNoun,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Period => "period",
            Self::RiskType => "risk_type",
            Self::RiskLevel => "risk_level",
            Self::NumericCount => "numeric_count",
            Self::ProperNoun => "proper_noun",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Integer(i64),
    Text(String),
}

impl EntityValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Integer(_) => None,
        }
    }
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for EntityValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EntityValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for EntityValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Entities extracted from one message, keyed by type.
///
/// Every type is always present; an empty sequence means nothing matched. Values keep the
/// order in which they were found.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities(BTreeMap<EntityType, Vec<EntityValue>>);

impl Default for Entities {
    fn default() -> Self {
        Self(EntityType::ALL.iter().map(|entity_type| (*entity_type, Vec::new())).collect())
    }
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entity_type: EntityType, value: impl Into<EntityValue>) {
        self.0.entry(entity_type).or_default().push(value.into());
    }

    pub fn get(&self, entity_type: EntityType) -> &[EntityValue] {
        self.0.get(&entity_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, entity_type: EntityType) -> Option<&EntityValue> {
        self.get(entity_type).first()
    }

    pub fn contains(&self, entity_type: EntityType) -> bool {
        !self.get(entity_type).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityType, &[EntityValue])> {
        self.0.iter().map(|(entity_type, values)| (*entity_type, values.as_slice()))
    }
}
