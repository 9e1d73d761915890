//! PostgreSQL backend: connection pool, schema, native `RETURNING`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo};
use tracing::info;

use crate::error::Result;

use super::gateway::{Backend, QueryOutcome, Record, SqlValue, Store};
use super::sql::{numbered_placeholders, Statement};

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS signals (
        id BIGSERIAL PRIMARY KEY,
        symbol TEXT NOT NULL,
        type TEXT NOT NULL,
        price DOUBLE PRECISION NOT NULL,
        stop_loss DOUBLE PRECISION NOT NULL,
        take_profit DOUBLE PRECISION NOT NULL,
        reason TEXT,
        agree_count BIGINT NOT NULL DEFAULT 0,
        disagree_count BIGINT NOT NULL DEFAULT 0,
        timestamp DOUBLE PRECISION NOT NULL,
        raw_data TEXT
    )",
    "CREATE TABLE IF NOT EXISTS trades (
        id BIGSERIAL PRIMARY KEY,
        signal_id BIGINT REFERENCES signals(id),
        entry_price DOUBLE PRECISION NOT NULL,
        quantity DOUBLE PRECISION NOT NULL DEFAULT 1.0,
        status TEXT NOT NULL DEFAULT 'OPEN',
        pnl DOUBLE PRECISION NOT NULL DEFAULT 0,
        created_at DOUBLE PRECISION NOT NULL
    )",
];

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a PostgreSQL connection pool and verify it with a round trip.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        info!("postgres pool created");
        Ok(Self { pool })
    }
}

fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Real(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
    }
}

fn decode_row(row: &PgRow) -> std::result::Result<Record, sqlx::Error> {
    let mut record = Record::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = match column.type_info().name() {
            "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
            "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
            "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(idx)?
                .map(|v| Value::from(f64::from(v))),
            "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Value::from),
            "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::from),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?
                .map(|v| Value::from(v.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(idx)?
                .map(|v| Value::from(v.and_utc().to_rfc3339())),
            _ => row.try_get::<Option<String>, _>(idx)?.map(Value::from),
        };
        record.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Ok(record)
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn native_returning(&self) -> bool {
        true
    }

    async fn init_schema(&self) -> Result<()> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn execute(&self, template: &str, params: &[SqlValue]) -> Result<QueryOutcome> {
        let statement = Statement::parse(template);
        let sql = numbered_placeholders(template);
        let query = params
            .iter()
            .fold(sqlx::query(&sql), |q, p| bind_param(q, p));

        if statement.yields_rows() {
            let rows = query.fetch_all(&self.pool).await?;
            let records = rows
                .iter()
                .map(decode_row)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(QueryOutcome::from_rows(records))
        } else {
            let done = query.execute(&self.pool).await?;
            Ok(QueryOutcome::from_affected(done.rows_affected()))
        }
    }

    async fn purge(&self) -> Result<()> {
        sqlx::query("TRUNCATE trades, signals RESTART IDENTITY")
            .execute(&self.pool)
            .await?;
        info!("postgres tables truncated");
        Ok(())
    }
}
