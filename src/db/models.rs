//! Database row types for both tables, plus the enums stored in them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HubError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Sell,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Buy => "BUY",
            SignalKind::Sell => "SELL",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(SignalKind::Buy),
            "SELL" => Ok(SignalKind::Sell),
            other => Err(HubError::InvalidInput(format!(
                "signal type must be BUY or SELL, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// A sentiment vote. Each accepted vote bumps exactly one counter by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Agree,
    Disagree,
}

impl Vote {
    /// Counter column this vote increments.
    pub fn column(&self) -> &'static str {
        match self {
            Vote::Agree => "agree_count",
            Vote::Disagree => "disagree_count",
        }
    }
}

impl FromStr for Vote {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agree" => Ok(Vote::Agree),
            "disagree" => Ok(Vote::Disagree),
            other => Err(HubError::InvalidInput(format!(
                "sentiment type must be agree or disagree, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    pub id: i64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub reason: Option<String>,
    pub agree_count: i64,
    pub disagree_count: i64,
    /// Seconds since epoch, fractional.
    pub timestamp: f64,
    /// The original submission, verbatim JSON text.
    pub raw_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRow {
    pub id: i64,
    pub signal_id: Option<i64>,
    pub entry_price: f64,
    pub quantity: f64,
    pub status: TradeStatus,
    pub pnl: f64,
    pub created_at: f64,
}

/// Aggregates served by `/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_signals: i64,
    pub total_trades: i64,
    pub win_rate: f64,
    pub avg_rr: f64,
}
