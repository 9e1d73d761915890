//! Position sizing from a signal's entry and stop.

use crate::db::models::SignalKind;

/// Lots below this are too small to trade.
pub const DUST_LOT: f64 = 0.00001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSize {
    /// Account currency lost if the stop is hit.
    pub risk_amount: f64,
    pub lot_size: f64,
    /// Account currency gained if the target is hit.
    pub potential_profit: f64,
}

impl PositionSize {
    /// Size a position so that hitting `stop` loses `risk_pct` percent of
    /// `balance`. `None` when entry and stop coincide.
    pub fn compute(entry: f64, stop: f64, target: f64, balance: f64, risk_pct: f64) -> Option<Self> {
        let stop_distance = (entry - stop).abs();
        if !stop_distance.is_finite() || stop_distance == 0.0 {
            return None;
        }
        let risk_amount = balance * risk_pct / 100.0;
        let lot_size = risk_amount / stop_distance;
        Some(Self {
            risk_amount,
            lot_size,
            potential_profit: lot_size * (entry - target).abs(),
        })
    }

    pub fn is_dust(&self) -> bool {
        self.lot_size < DUST_LOT
    }

    /// Unrealized pnl at `current` for a position opened at `entry`.
    pub fn live_pnl(&self, kind: SignalKind, entry: f64, current: f64) -> f64 {
        match kind {
            SignalKind::Buy => (current - entry) * self.lot_size,
            SignalKind::Sell => (entry - current) * self.lot_size,
        }
    }
}
