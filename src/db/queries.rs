//! SQL statements for both tables, issued through the gateway.

use super::gateway::{Backend, Gateway, SqlValue};
use super::models::*;
use crate::error::{HubError, Result};

// ── Signals ──────────────────────────────────────────────────────

/// Columns of a signal about to be inserted.
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub symbol: String,
    pub kind: SignalKind,
    pub price: Option<f64>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub reason: Option<String>,
    pub raw_data: String,
}

/// Seconds since epoch as computed by the store while the insert runs.
fn store_clock(db: &Gateway) -> &'static str {
    match db.backend() {
        Some(Backend::Postgres) => "CAST(EXTRACT(EPOCH FROM clock_timestamp()) AS DOUBLE PRECISION)",
        _ => "(julianday('now') - 2440587.5) * 86400.0",
    }
}

/// Insert a signal and return its store-assigned id from the same statement.
/// The timestamp is taken by the store, so it never runs backwards against ids.
pub async fn insert_signal(db: &Gateway, signal: &NewSignal) -> Result<i64> {
    let sql = format!(
        "INSERT INTO signals (symbol, type, price, stop_loss, take_profit, reason, timestamp, raw_data)
         VALUES (?, ?, ?, ?, ?, ?, {}, ?) RETURNING id",
        store_clock(db)
    );
    let out = db
        .execute(
            &sql,
            &[
                signal.symbol.as_str().into(),
                signal.kind.as_str().into(),
                signal.price.into(),
                signal.stop_loss.into(),
                signal.take_profit.into(),
                signal.reason.clone().into(),
                signal.raw_data.as_str().into(),
            ],
        )
        .await?;
    out.scalar_i64("id")
}

/// Bump one sentiment counter by exactly one, evaluated by the store.
/// `None` when no signal has this id.
pub async fn increment_sentiment(db: &Gateway, id: i64, vote: Vote) -> Result<Option<SignalRow>> {
    let column = vote.column();
    let sql = format!(
        "UPDATE signals SET {column} = {column} + 1 WHERE id = ? RETURNING *"
    );
    db.execute(&sql, &[id.into()]).await?.first()
}

pub async fn get_recent_signals(db: &Gateway, limit: i64) -> Result<Vec<SignalRow>> {
    db.execute(
        "SELECT * FROM signals ORDER BY id DESC LIMIT ?",
        &[limit.into()],
    )
    .await?
    .all()
}

pub async fn get_signal(db: &Gateway, id: i64) -> Result<Option<SignalRow>> {
    db.execute("SELECT * FROM signals WHERE id = ?", &[id.into()])
        .await?
        .first()
}

pub async fn count_signals(db: &Gateway) -> Result<i64> {
    db.execute("SELECT COUNT(*) AS count FROM signals", &[])
        .await?
        .scalar_i64("count")
}

// ── Trades ───────────────────────────────────────────────────────

/// Open a simulated trade against a signal.
pub async fn insert_trade(
    db: &Gateway,
    signal_id: Option<i64>,
    entry_price: Option<f64>,
    created_at: f64,
) -> Result<TradeRow> {
    db.execute(
        "INSERT INTO trades (signal_id, entry_price, status, created_at)
         VALUES (?, ?, 'OPEN', ?) RETURNING *",
        &[
            SqlValue::from(signal_id),
            SqlValue::from(entry_price),
            created_at.into(),
        ],
    )
    .await?
    .first()?
    .ok_or(HubError::Persistence(sqlx::Error::RowNotFound))
}

pub async fn count_trades(db: &Gateway) -> Result<i64> {
    db.execute("SELECT COUNT(*) AS count FROM trades", &[])
        .await?
        .scalar_i64("count")
}

/// Closed trades with positive realized pnl.
pub async fn count_winning_trades(db: &Gateway) -> Result<i64> {
    db.execute(
        "SELECT COUNT(*) AS count FROM trades WHERE status = 'CLOSED' AND pnl > 0",
        &[],
    )
    .await?
    .scalar_i64("count")
}

// ── Maintenance ──────────────────────────────────────────────────

/// Delete every trade and signal. Administrative only.
pub async fn purge_all(db: &Gateway) -> Result<()> {
    db.purge().await
}
