//! Terminal dashboard: follows a hub and logs every signal, vote and trade.
//!
//! Extra arguments are room names to join in addition to `global`.

use std::sync::Arc;

use tracing::info;

use signal_hub::client::{FileKv, HubClient, KeyValueStore, Preferences, SignalStore, Watcher};
use signal_hub::config::Config;
use signal_hub::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::load()?;
    logging::structured::init_logging(&config.logging);

    let kv: Arc<dyn KeyValueStore> = Arc::new(FileKv::open(&config.client.storage_path));
    let prefs = Preferences::load(kv.as_ref());
    info!(
        api_url = %config.client.api_url,
        auto_execute = prefs.auto_execute,
        "signal-hub-watch starting"
    );

    let mut rooms = vec!["global".to_string()];
    rooms.extend(std::env::args().skip(1));

    let watcher = Watcher::new(
        HubClient::new(&config.client.api_url),
        SignalStore::new(kv),
        prefs,
    )
    .with_rooms(rooms)
    .with_balance(config.client.account_balance);

    tokio::select! {
        _ = watcher.run() => {}
        _ = tokio::signal::ctrl_c() => { info!("received SIGINT"); }
    }
    Ok(())
}
