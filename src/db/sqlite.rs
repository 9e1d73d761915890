//! Embedded SQLite backend.
//!
//! `RETURNING` is not relied on here: inserts and updates that want rows
//! back run inside one transaction followed by a read of the same rows.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{
    self, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::error::{HubError, Result};

use super::gateway::{Backend, QueryOutcome, Record, SqlValue, Store};
use super::sql::{count_placeholders, Statement, StatementKind};

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS signals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        type TEXT NOT NULL,
        price REAL NOT NULL,
        stop_loss REAL NOT NULL,
        take_profit REAL NOT NULL,
        reason TEXT,
        agree_count INTEGER NOT NULL DEFAULT 0,
        disagree_count INTEGER NOT NULL DEFAULT 0,
        timestamp REAL NOT NULL,
        raw_data TEXT
    )",
    "CREATE TABLE IF NOT EXISTS trades (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        signal_id INTEGER REFERENCES signals(id),
        entry_price REAL NOT NULL,
        quantity REAL NOT NULL DEFAULT 1.0,
        status TEXT NOT NULL DEFAULT 'OPEN',
        pnl REAL NOT NULL DEFAULT 0,
        created_at REAL NOT NULL
    )",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `path`.
    pub async fn open(path: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        info!(path, "sqlite database opened");
        Ok(Self { pool })
    }

    async fn insert_returning(
        &self,
        statement: &Statement<'_>,
        columns: &str,
        table: &str,
        params: &[SqlValue],
    ) -> Result<QueryOutcome> {
        let mut tx = self.pool.begin().await?;
        let done = bind_all(sqlx::query(statement.body), params)
            .execute(&mut *tx)
            .await?;
        let affected = done.rows_affected();
        if affected == 0 {
            tx.commit().await?;
            return Ok(QueryOutcome::default());
        }

        // A single statement assigns consecutive rowids ending at the last one.
        let last = done.last_insert_rowid();
        let first = last - affected as i64 + 1;
        let select = format!(
            "SELECT {} FROM {} WHERE rowid BETWEEN ? AND ? ORDER BY rowid",
            columns, table
        );
        let rows = sqlx::query(&select)
            .bind(first)
            .bind(last)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(QueryOutcome {
            rows: decode_rows(&rows)?,
            affected,
        })
    }

    async fn update_returning(
        &self,
        statement: &Statement<'_>,
        columns: &str,
        table: &str,
        params: &[SqlValue],
    ) -> Result<QueryOutcome> {
        // The WHERE parameters are the trailing ones.
        let where_clause = statement.where_clause();
        let where_params = where_clause.map(count_placeholders).unwrap_or(0);
        let split = params.len().checked_sub(where_params).ok_or_else(|| {
            HubError::InvalidInput("fewer parameters than placeholders".into())
        })?;

        // The update runs first so the transaction holds the write lock
        // before the follow-up read; both see the same rows.
        let mut tx = self.pool.begin().await?;
        let done = bind_all(sqlx::query(statement.body), params)
            .execute(&mut *tx)
            .await?;
        let affected = done.rows_affected();
        if affected == 0 {
            tx.commit().await?;
            return Ok(QueryOutcome::default());
        }

        let select = match where_clause {
            Some(cond) => format!("SELECT {} FROM {} WHERE {}", columns, table, cond),
            None => format!("SELECT {} FROM {}", columns, table),
        };
        let rows = bind_all(sqlx::query(&select), &params[split..])
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(QueryOutcome {
            rows: decode_rows(&rows)?,
            affected,
        })
    }
}

fn bind_all<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params.iter().fold(query, |q, param| match param {
        SqlValue::Int(v) => q.bind(*v),
        SqlValue::Real(v) => q.bind(*v),
        SqlValue::Text(v) => q.bind(v.clone()),
    })
}

fn decode_row(row: &SqliteRow) -> std::result::Result<Record, sqlx::Error> {
    let mut record = Record::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let storage = {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };
        let value = match storage.as_deref() {
            None => Value::Null,
            Some("INTEGER") => Value::from(row.try_get::<i64, _>(idx)?),
            Some("REAL") => Value::from(row.try_get::<f64, _>(idx)?),
            Some("BLOB") => Value::from(String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(idx)?).into_owned()),
            Some(_) => Value::from(row.try_get::<String, _>(idx)?),
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn decode_rows(rows: &[SqliteRow]) -> std::result::Result<Vec<Record>, sqlx::Error> {
    rows.iter().map(decode_row).collect()
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn native_returning(&self) -> bool {
        false
    }

    async fn init_schema(&self) -> Result<()> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn execute(&self, template: &str, params: &[SqlValue]) -> Result<QueryOutcome> {
        let statement = Statement::parse(template);

        match (statement.kind, statement.returning, statement.table) {
            (StatementKind::Select, _, _) => {
                let rows = bind_all(sqlx::query(statement.body), params)
                    .fetch_all(&self.pool)
                    .await?;
                Ok(QueryOutcome::from_rows(decode_rows(&rows)?))
            }
            (StatementKind::Insert, Some(columns), Some(table)) => {
                debug!(table, "emulating insert returning");
                self.insert_returning(&statement, columns, table, params).await
            }
            (StatementKind::Update, Some(columns), Some(table)) => {
                debug!(table, "emulating update returning");
                self.update_returning(&statement, columns, table, params).await
            }
            (_, Some(_), _) => Err(HubError::InvalidInput(format!(
                "RETURNING is not supported for this statement on sqlite: {}",
                template.trim()
            ))),
            (_, None, _) => {
                let done = bind_all(sqlx::query(statement.body), params)
                    .execute(&self.pool)
                    .await?;
                Ok(QueryOutcome::from_affected(done.rows_affected()))
            }
        }
    }

    async fn purge(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM trades").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM signals").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'signals' OR name = 'trades'")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("sqlite tables purged");
        Ok(())
    }
}
