use async_trait::async_trait;
use aula_core::data_store::{DataStore, DataStoreError};
use aula_core::domain::query::{QueryParam, Row};
use serde_json::{Map, Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, warn};

use crate::connection::DbPool;

/// [`DataStore`] over a SQLite pool. Columns come back keyed by their label, typed by the
/// storage class SQLite reports for each value.
#[derive(Clone, Debug)]
pub struct SqlDataStore {
    pool: DbPool,
}

impl SqlDataStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl DataStore for SqlDataStore {
    async fn execute(
        &self,
        query: &str,
        parameters: &[QueryParam],
    ) -> Result<Vec<Row>, DataStoreError> {
        let mut statement = sqlx::query(query);
        for parameter in parameters {
            statement = match parameter {
                QueryParam::Integer(value) => statement.bind(*value),
                QueryParam::Float(value) => statement.bind(*value),
                QueryParam::Text(value) => statement.bind(value.as_str()),
            };
        }

        let rows = statement.fetch_all(&self.pool).await.map_err(|error| {
            let error = classify_error(error);
            warn!(
                event_name = "db.query.failed",
                unavailable = error.is_unavailable(),
                parameter_count = parameters.len(),
                "statement execution failed"
            );
            error
        })?;

        debug!(event_name = "db.query.executed", rows = rows.len(), "statement executed");
        rows.iter().map(decode_row).collect()
    }
}

/// Connection-level problems are unavailability; everything else is a failed statement.
pub fn classify_error(error: sqlx::Error) -> DataStoreError {
    match error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => DataStoreError::Unavailable(error.to_string()),
        other => DataStoreError::QueryFailed(other.to_string()),
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row, DataStoreError> {
    let mut decoded = Map::new();
    for column in row.columns() {
        let index = column.ordinal();
        let value = decode_value(row, index).map_err(classify_error)?;
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    let storage_class = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_string()
    };

    let value = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" | "NUMERIC" => Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "TEXT" | "DATE" | "TIME" | "DATETIME" => {
            Value::String(row.try_get_unchecked::<String, _>(index)?)
        }
        _ => Value::Null,
    };
    Ok(value)
}
