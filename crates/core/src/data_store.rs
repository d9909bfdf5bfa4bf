use async_trait::async_trait;
use thiserror::Error;

use crate::domain::query::{QueryParam, Row};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DataStoreError {
    /// The store could not be reached (connection, pool, I/O).
    #[error("data store unavailable: {0}")]
    Unavailable(String),
    /// The store was reached but refused or failed the statement.
    #[error("query failed: {0}")]
    QueryFailed(String),
}

impl DataStoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Read-only statement execution. One call is one suspension point.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        parameters: &[QueryParam],
    ) -> Result<Vec<Row>, DataStoreError>;
}
