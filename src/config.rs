//! Configuration: TOML file defaults plus environment variable overrides.
//!
//! Defaults live in `config/default.toml` (optional).
//! Deployment knobs (`DATABASE_URL`, `PORT`, `RENDER`, Telegram credentials)
//! come from plain environment variables.

use serde::Deserialize;
use std::env;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Networked store connection string. Empty selects the embedded SQLite file.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_sqlite_path() -> String {
    "database.sqlite".into()
}
fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            sqlite_path: default_sqlite_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// The networked backend is used only when a connection string is present.
    pub fn networked_url(&self) -> Option<&str> {
        let url = self.url.trim();
        (!url.is_empty()).then_some(url)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub cors_any: bool,
    /// Buffered events per subscriber before a slow client starts lagging.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    4000
}
fn default_channel_capacity() -> usize {
    1024
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            cors_any: true,
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub desktop: bool,
    /// Hosted, non-interactive deployment: desktop notifications are skipped.
    #[serde(default)]
    pub hosted: bool,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".into()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            desktop: true,
            hosted: false,
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_url: default_telegram_api_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_output: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_output: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Hub address, with or without scheme.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Where the watcher keeps its taken-ids and preferences.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Account balance used to size positions.
    #[serde(default = "default_account_balance")]
    pub account_balance: f64,
}

fn default_api_url() -> String {
    "localhost:4000".into()
}
fn default_storage_path() -> String {
    "client-state.json".into()
}
fn default_account_balance() -> f64 {
    20.0
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            storage_path: default_storage_path(),
            account_balance: default_account_balance(),
        }
    }
}

impl Config {
    /// Load configuration from `config/default.toml` merged with env vars.
    /// Structured overrides use the `HUB__SECTION__KEY` form.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("HUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Config = builder.try_deserialize()?;

        if let Ok(v) = env::var("DATABASE_URL") {
            cfg.database.url = v;
        }
        if let Ok(v) = env::var("PORT") {
            cfg.web.port = v.parse()?;
        }
        if env::var_os("RENDER").is_some() {
            cfg.notify.hosted = true;
        }
        if let Ok(v) = env::var("TELEGRAM_BOT_TOKEN") {
            cfg.notify.telegram_bot_token = Some(v);
        }
        if let Ok(v) = env::var("TELEGRAM_CHAT_ID") {
            cfg.notify.telegram_chat_id = Some(v);
        }
        if let Ok(v) = env::var("HUB_API_URL") {
            cfg.client.api_url = v;
        }

        Ok(cfg)
    }
}
