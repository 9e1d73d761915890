//! Persistence gateway: one query interface over either store backend.
//!
//! Callers write `?` templates and always get back `{rows, affected}` with
//! the same shape, whether or not the backend supports `RETURNING` natively.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{HubError, Result};

use super::postgres::PgStore;
use super::sqlite::SqliteStore;

/// One returned record, keyed by column name.
pub type Record = Map<String, Value>;

/// A positional statement parameter. Nulls stay typed so PostgreSQL can
/// infer the column type.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(Option<i64>),
    Real(Option<f64>),
    Text(Option<String>),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(Some(v))
    }
}
impl From<Option<i64>> for SqlValue {
    fn from(v: Option<i64>) -> Self {
        SqlValue::Int(v)
    }
}
impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(Some(v))
    }
}
impl From<Option<f64>> for SqlValue {
    fn from(v: Option<f64>) -> Self {
        SqlValue::Real(v)
    }
}
impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(Some(v.to_string()))
    }
}
impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(Some(v))
    }
}
impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        SqlValue::Text(v)
    }
}

/// Result of a single statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub rows: Vec<Record>,
    pub affected: u64,
}

impl QueryOutcome {
    pub fn from_rows(rows: Vec<Record>) -> Self {
        let affected = rows.len() as u64;
        Self { rows, affected }
    }

    pub fn from_affected(affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            affected,
        }
    }

    /// Deserialize the first row, if any.
    pub fn first<T: DeserializeOwned>(self) -> Result<Option<T>> {
        match self.rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(Value::Object(row))?)),
            None => Ok(None),
        }
    }

    /// Deserialize every row.
    pub fn all<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.rows
            .into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(HubError::from))
            .collect()
    }

    /// Read an integer column of the first row (e.g. `COUNT(*) AS count`).
    pub fn scalar_i64(&self, column: &str) -> Result<i64> {
        self.rows
            .first()
            .and_then(|row| row.get(column))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                HubError::Persistence(sqlx::Error::ColumnNotFound(column.to_string()))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

/// A relational store the gateway can drive.
#[async_trait]
pub trait Store: Send + Sync {
    fn backend(&self) -> Backend;

    /// Whether `INSERT/UPDATE ... RETURNING` is executed natively.
    fn native_returning(&self) -> bool;

    /// Create the `signals` and `trades` tables if absent. Idempotent.
    async fn init_schema(&self) -> Result<()>;

    /// Run one `?`-placeholder template with positional parameters.
    async fn execute(&self, template: &str, params: &[SqlValue]) -> Result<QueryOutcome>;

    /// Delete every row and reset identifier sequences.
    async fn purge(&self) -> Result<()>;
}

/// Process-wide handle to the active store. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    store: Option<Arc<dyn Store>>,
}

impl Gateway {
    /// Open the backend selected by config and create the schema.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let store: Arc<dyn Store> = match config.networked_url() {
            Some(url) => {
                info!("database url present, using postgres backend");
                Arc::new(PgStore::connect(url, config.max_connections).await?)
            }
            None => {
                info!(path = %config.sqlite_path, "no database url, using sqlite backend");
                Arc::new(SqliteStore::open(&config.sqlite_path, config.max_connections).await?)
            }
        };
        Self::initialize(store).await
    }

    /// Wrap an already-open store and make sure the schema exists.
    pub async fn initialize(store: Arc<dyn Store>) -> Result<Self> {
        store.init_schema().await?;
        info!(backend = ?store.backend(), "database schema ready");
        Ok(Self { store: Some(store) })
    }

    /// A gateway with no backing store; every call fails with a connection error.
    pub fn uninitialized() -> Self {
        Self { store: None }
    }

    fn store(&self) -> Result<&Arc<dyn Store>> {
        self.store
            .as_ref()
            .ok_or_else(|| HubError::Connection("database not initialized".into()))
    }

    pub fn backend(&self) -> Option<Backend> {
        self.store.as_ref().map(|s| s.backend())
    }

    pub async fn execute(&self, template: &str, params: &[SqlValue]) -> Result<QueryOutcome> {
        self.store()?.execute(template, params).await
    }

    pub async fn init_schema(&self) -> Result<()> {
        self.store()?.init_schema().await
    }

    pub async fn purge(&self) -> Result<()> {
        self.store()?.purge().await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn uninitialized_gateway_reports_connection_error() {
        let gw = Gateway::uninitialized();
        let err = gw.execute("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, HubError::Connection(_)));
        assert_eq!(gw.backend(), None);
    }

    #[tokio::test]
    async fn sqlite_honours_gateway_contract() {
        let gw = sqlite_gateway().await;
        assert_eq!(gw.backend(), Some(Backend::Sqlite));
        exercise_gateway_contract(&gw).await;
    }

    #[tokio::test]
    async fn postgres_honours_gateway_contract() {
        let Some((gw, _guard)) = postgres_gateway().await else {
            return;
        };
        assert_eq!(gw.backend(), Some(Backend::Postgres));
        exercise_gateway_contract(&gw).await;
    }

    #[test]
    fn outcome_decodes_typed_rows() {
        #[derive(serde::Deserialize)]
        struct Row {
            id: i64,
        }
        let mut rec = Record::new();
        rec.insert("id".into(), Value::from(7));
        let outcome = QueryOutcome::from_rows(vec![rec]);
        assert_eq!(outcome.affected, 1);
        let row: Row = outcome.first().unwrap().unwrap();
        assert_eq!(row.id, 7);
    }
}
