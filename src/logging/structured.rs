//! Structured logging setup using tracing-subscriber.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the filter: `RUST_LOG` wins, otherwise the configured level with
/// sqlx statement logging demoted to warnings.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let base = EnvFilter::new(&config.log_level);
        match "sqlx=warn".parse() {
            Ok(directive) => base.add_directive(directive),
            Err(_) => base,
        }
    })
}

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter = build_filter(config);

    let result = if config.json_output {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .compact(),
            )
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
