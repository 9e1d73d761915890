//! Best-effort notifications for accepted signals.
//!
//! Nothing here can fail a request: every send runs on a detached task and
//! errors are logged, never returned.

pub mod desktop;
pub mod telegram;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::NotifyConfig;

use desktop::DesktopNotifier;
use telegram::TelegramNotifier;

/// Title and body shown for one accepted signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub body: String,
}

impl Alert {
    /// Build from the broadcast payload. Missing fields render as `-`.
    pub fn for_signal(payload: &Value) -> Self {
        let field = |key: &str| match payload.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "-".to_string(),
            Some(other) => other.to_string(),
        };
        Self {
            title: format!("AlphaScanner: {} {}", field("type"), field("symbol")),
            body: format!(
                "[{}] Price: {} | {}",
                field("timeframe"),
                field("price"),
                field("reason")
            ),
        }
    }
}

#[derive(Clone, Default)]
pub struct Notifier {
    desktop: Option<DesktopNotifier>,
    telegram: Option<TelegramNotifier>,
}

impl Notifier {
    pub fn from_config(config: &NotifyConfig) -> Self {
        let desktop = if config.hosted {
            debug!("hosted environment, desktop notifications off");
            None
        } else if config.desktop {
            Some(DesktopNotifier::for_platform())
        } else {
            None
        };

        let telegram = match (&config.telegram_bot_token, &config.telegram_chat_id) {
            (Some(token), Some(chat)) => Some(TelegramNotifier::new(
                &config.telegram_api_url,
                token.clone(),
                chat.clone(),
            )),
            (Some(_), None) => {
                warn!("telegram chat_id not configured, skipping");
                None
            }
            _ => None,
        };

        Self { desktop, telegram }
    }

    /// A notifier that sends nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.desktop.is_some() || self.telegram.is_some()
    }

    /// Fire notifications for an accepted signal without waiting on them.
    pub fn signal_accepted(&self, payload: &Value) {
        if !self.is_enabled() {
            return;
        }
        let alert = Alert::for_signal(payload);

        if let Some(desktop) = self.desktop.clone() {
            let alert = alert.clone();
            tokio::spawn(async move {
                if let Err(e) = desktop.show(&alert).await {
                    debug!(error = %e, "desktop notification failed");
                }
            });
        }

        if let Some(telegram) = self.telegram.clone() {
            tokio::spawn(async move {
                if let Err(e) = telegram.send(&alert).await {
                    warn!(error = %e, "telegram notification failed");
                }
            });
        }
    }
}
