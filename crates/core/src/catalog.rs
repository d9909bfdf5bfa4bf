//! Intent catalog and entity vocabulary.
//!
//! The catalog is data, not code: it is parsed from TOML (see `config/intents.toml`), carries a
//! version string, and is never mutated once loaded. [`CatalogStore`] hands out immutable
//! snapshots and can swap in a freshly loaded catalog without disturbing in-flight requests.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::entity::EntityType;
use crate::domain::intent::IntentDefinition;

pub use crate::domain::intent::GENERAL_INTENT;

const BUILTIN_CATALOG: &str = include_str!("../../../config/intents.toml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read catalog file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse intent catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("intent `{0}` is defined more than once")]
    DuplicateIntent(String),
    #[error("invalid intent catalog: {0}")]
    Invalid(String),
    #[error("catalog store has no source path to reload from")]
    NoSource,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The whole normalized term must appear in the text.
    #[default]
    Term,
    /// The whole term, or any single significant token of it, must appear.
    TermOrToken,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub terms: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabularies {
    #[serde(default)]
    pub category: Vocabulary,
    #[serde(default)]
    pub period: Vocabulary,
    #[serde(default)]
    pub risk_type: Vocabulary,
    #[serde(default)]
    pub risk_level: Vocabulary,
}

impl Vocabularies {
    pub fn iter(&self) -> impl Iterator<Item = (EntityType, &Vocabulary)> {
        [
            (EntityType::Category, &self.category),
            (EntityType::Period, &self.period),
            (EntityType::RiskType, &self.risk_type),
            (EntityType::RiskLevel, &self.risk_level),
        ]
        .into_iter()
    }
}

/// A canonical word and the alternatives that count as a weaker match for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymGroup {
    pub canonical: String,
    pub terms: Vec<String>,
}

impl SynonymGroup {
    pub fn members(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical.as_str()).chain(self.terms.iter().map(String::as_str))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentCatalog {
    pub version: String,
    #[serde(default)]
    pub intents: Vec<IntentDefinition>,
    #[serde(default)]
    pub synonyms: Vec<SynonymGroup>,
    #[serde(default)]
    pub stopwords: BTreeSet<String>,
    #[serde(default)]
    pub query_words: BTreeSet<String>,
    #[serde(default)]
    pub vocabulary: Vocabularies,
}

impl IntentCatalog {
    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let catalog = toml::from_str::<Self>(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| CatalogError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    /// The catalog shipped with the workspace.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn empty() -> Self {
        Self {
            version: "empty".to_string(),
            intents: Vec::new(),
            synonyms: Vec::new(),
            stopwords: BTreeSet::new(),
            query_words: BTreeSet::new(),
            vocabulary: Vocabularies::default(),
        }
    }

    pub fn intent(&self, name: &str) -> Option<&IntentDefinition> {
        self.intents.iter().find(|intent| intent.name == name)
    }

    pub fn is_known_intent(&self, name: &str) -> bool {
        name == GENERAL_INTENT || self.intent(name).is_some()
    }

    pub fn intent_names(&self) -> Vec<&str> {
        self.intents.iter().map(|intent| intent.name.as_str()).collect()
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.version.trim().is_empty() {
            return Err(CatalogError::Invalid("version must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for intent in &self.intents {
            if intent.name.trim().is_empty() {
                return Err(CatalogError::Invalid("intent name must not be empty".to_string()));
            }
            if !seen.insert(intent.name.as_str()) {
                return Err(CatalogError::DuplicateIntent(intent.name.clone()));
            }
        }

        for group in &self.synonyms {
            if group.canonical.trim().is_empty() {
                return Err(CatalogError::Invalid(
                    "synonym group canonical term must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Shared, swappable handle on the current catalog.
#[derive(Debug)]
pub struct CatalogStore {
    current: RwLock<Arc<IntentCatalog>>,
    source: Option<PathBuf>,
}

impl CatalogStore {
    pub fn new(catalog: IntentCatalog) -> Self {
        Self { current: RwLock::new(Arc::new(catalog)), source: None }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let path = path.into();
        let catalog = IntentCatalog::load(&path)?;
        Ok(Self { current: RwLock::new(Arc::new(catalog)), source: Some(path) })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Snapshot of the active catalog. Holders keep their snapshot across a reload.
    pub fn current(&self) -> Arc<IntentCatalog> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, catalog: IntentCatalog) -> Arc<IntentCatalog> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(catalog))
    }

    /// Re-reads the source file. The active catalog is left untouched if loading fails.
    pub fn reload(&self) -> Result<Arc<IntentCatalog>, CatalogError> {
        let path = self.source.as_deref().ok_or(CatalogError::NoSource)?;
        let catalog = IntentCatalog::load(path)?;
        let version = catalog.version.clone();
        let previous = self.replace(catalog);
        info!(
            event_name = "core.catalog.reloaded",
            previous_version = %previous.version,
            version = %version,
            "intent catalog reloaded"
        );
        Ok(self.current())
    }
}
