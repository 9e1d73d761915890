//! Automation preferences kept beside the taken-ids.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

use super::kv::KeyValueStore;

pub const SETTINGS_KEY: &str = "alpha_settings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Take every new signal as soon as it arrives.
    pub auto_execute: bool,
    /// Percent of balance risked per trade.
    pub risk_per_trade: f64,
    pub max_open_trades: u32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_execute: false,
            risk_per_trade: 1.0,
            max_open_trades: 3,
        }
    }
}

impl Preferences {
    pub fn load(kv: &dyn KeyValueStore) -> Self {
        match kv.get(SETTINGS_KEY) {
            Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(error = %e, "stored preferences unreadable, using defaults");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn save(&self, kv: &dyn KeyValueStore) -> Result<()> {
        kv.set(SETTINGS_KEY, &serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::kv::MemoryKv;
    use super::*;

    #[test]
    fn defaults_when_absent() {
        let kv = MemoryKv::new();
        assert_eq!(Preferences::load(&kv), Preferences::default());
    }

    #[test]
    fn stored_keys_are_camel_case() {
        let kv = MemoryKv::new();
        let prefs = Preferences {
            auto_execute: true,
            risk_per_trade: 2.5,
            max_open_trades: 5,
        };
        prefs.save(&kv).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&kv.get(SETTINGS_KEY).unwrap()).unwrap();
        assert_eq!(raw["autoExecute"], true);
        assert_eq!(raw["maxOpenTrades"], 5);
        assert_eq!(Preferences::load(&kv), prefs);
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let kv = MemoryKv::new();
        kv.set(SETTINGS_KEY, r#"{"autoExecute": true}"#).unwrap();
        let prefs = Preferences::load(&kv);
        assert!(prefs.auto_execute);
        assert_eq!(prefs.risk_per_trade, 1.0);
        assert_eq!(prefs.max_open_trades, 3);
    }
}
