//! Delete every trade and signal and reset identifiers.
//!
//! Administrative only; the server never calls this.

use tracing::info;

use signal_hub::config::Config;
use signal_hub::db::{queries, Gateway};
use signal_hub::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::load()?;
    logging::structured::init_logging(&config.logging);

    let db = Gateway::connect(&config.database).await?;
    let before = queries::count_signals(&db).await?;
    let trades = queries::count_trades(&db).await?;

    queries::purge_all(&db).await?;
    info!(backend = ?db.backend(), signals = before, trades, "database wiped");
    Ok(())
}
