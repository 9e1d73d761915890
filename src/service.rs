//! Signal lifecycle: ingest, vote, trade, history, stats.
//!
//! Every write persists first and only then publishes, so a broadcast never
//! describes a row that did not commit. HTTP handlers are thin wrappers
//! around these operations.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info};

use crate::db::models::{SignalKind, SignalRow, Stats, TradeRow, Vote};
use crate::db::queries::{self, NewSignal};
use crate::db::Gateway;
use crate::error::{HubError, Result};
use crate::events::{Hub, HubEvent, SentimentUpdate};
use crate::notify::Notifier;

/// Signals returned by the history query.
pub const HISTORY_LIMIT: i64 = 50;

/// Win rate reported before any trade exists.
pub const PLACEHOLDER_WIN_RATE: f64 = 72.0;

/// Average reward/risk shown on the dashboard. Not computed.
pub const PLACEHOLDER_AVG_RR: f64 = 2.4;

/// Seconds since epoch with microsecond resolution.
pub fn now_ts() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

pub struct SignalService {
    db: Gateway,
    hub: Arc<Hub>,
    notifier: Notifier,
}

impl SignalService {
    pub fn new(db: Gateway, hub: Arc<Hub>, notifier: Notifier) -> Self {
        Self { db, hub, notifier }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Validate, persist and broadcast one analyzer signal. Returns its id.
    pub async fn ingest(&self, payload: Value) -> Result<i64> {
        let Value::Object(fields) = payload else {
            return Err(HubError::InvalidInput("signal must be a JSON object".into()));
        };
        let signal = parse_signal(&fields)?;

        let id = queries::insert_signal(&self.db, &signal).await?;
        info!(id, symbol = %signal.symbol, kind = %signal.kind, "signal accepted");

        let mut broadcast = fields;
        broadcast.insert("id".into(), Value::from(id));
        broadcast.insert("agree_count".into(), Value::from(0));
        broadcast.insert("disagree_count".into(), Value::from(0));
        let broadcast = Value::Object(broadcast);

        self.notifier.signal_accepted(&broadcast);
        self.hub.publish(HubEvent::NewSignal(broadcast));
        Ok(id)
    }

    /// Record one agree/disagree vote. Not idempotent.
    pub async fn vote(&self, id: i64, kind: &str) -> Result<SignalRow> {
        let vote: Vote = kind.parse()?;
        let row = queries::increment_sentiment(&self.db, id, vote)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("signal {id}")))?;

        self.hub.publish(HubEvent::SentimentUpdate(SentimentUpdate {
            id: row.id,
            agree_count: row.agree_count,
            disagree_count: row.disagree_count,
        }));
        Ok(row)
    }

    /// Open a simulated trade at `price` against a signal.
    pub async fn open_trade(&self, signal_id: Option<i64>, price: Option<f64>) -> Result<TradeRow> {
        let trade = queries::insert_trade(&self.db, signal_id, price, now_ts()).await?;
        info!(trade_id = trade.id, signal_id = ?trade.signal_id, "trade opened");
        self.hub.publish(HubEvent::TradeUpdate(trade.clone()));
        Ok(trade)
    }

    /// Recent signals rebuilt from their raw payloads. Stored columns win
    /// over payload fields of the same name.
    pub async fn history(&self) -> Result<Vec<Value>> {
        let rows = queries::get_recent_signals(&self.db, HISTORY_LIMIT).await?;
        Ok(rows.into_iter().map(reconstruct).collect())
    }

    pub async fn stats(&self) -> Result<Stats> {
        let total_signals = queries::count_signals(&self.db).await?;
        let total_trades = queries::count_trades(&self.db).await?;
        let wins = queries::count_winning_trades(&self.db).await?;

        let win_rate = if total_trades > 0 {
            wins as f64 / total_trades as f64 * 100.0
        } else {
            PLACEHOLDER_WIN_RATE
        };

        Ok(Stats {
            total_signals,
            total_trades,
            win_rate,
            avg_rr: PLACEHOLDER_AVG_RR,
        })
    }
}

fn parse_signal(fields: &Map<String, Value>) -> Result<NewSignal> {
    let symbol = match fields.get("symbol") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        _ => return Err(HubError::InvalidInput("symbol is required".into())),
    };
    let kind: SignalKind = match fields.get("type") {
        Some(Value::String(s)) => s.parse()?,
        _ => return Err(HubError::InvalidInput("type is required".into())),
    };

    let zones = fields
        .get("setup_zones")
        .and_then(Value::as_object)
        .ok_or_else(|| HubError::InvalidInput("setup_zones object is required".into()))?;
    let zone = |key: &str| {
        zones
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| HubError::InvalidInput(format!("setup_zones.{key} must be a number")))
    };
    let stop_loss = zone("stop_loss")?;
    let take_profit = zone("take_profit")?;

    // A missing price is left to the store's NOT NULL constraint.
    let price = match fields.get("price") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_f64()
                .ok_or_else(|| HubError::InvalidInput("price must be a number".into()))?,
        ),
    };
    let reason = fields
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(NewSignal {
        symbol,
        kind,
        price,
        stop_loss,
        take_profit,
        reason,
        raw_data: Value::Object(fields.clone()).to_string(),
    })
}

fn reconstruct(row: SignalRow) -> Value {
    let mut merged = match row.raw_data.as_deref().map(serde_json::from_str::<Value>) {
        Some(Ok(Value::Object(map))) => map,
        Some(Ok(_)) | None => Map::new(),
        Some(Err(e)) => {
            error!(id = row.id, error = %e, "failed to parse raw_data");
            Map::new()
        }
    };
    merged.insert("id".into(), Value::from(row.id));
    merged.insert("symbol".into(), Value::from(row.symbol));
    merged.insert("type".into(), Value::from(row.kind.as_str()));
    merged.insert("price".into(), Value::from(row.price));
    merged.insert("agree_count".into(), Value::from(row.agree_count));
    merged.insert("disagree_count".into(), Value::from(row.disagree_count));
    merged.insert("timestamp".into(), Value::from(row.timestamp.floor() as i64));
    Value::Object(merged)
}
