//! Signal Hub entry point.
//!
//! Loads configuration, opens the store, and serves the HTTP API and
//! real-time channel until SIGINT/SIGTERM.

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use signal_hub::config::Config;
use signal_hub::db::Gateway;
use signal_hub::events::Hub;
use signal_hub::logging;
use signal_hub::notify::Notifier;
use signal_hub::service::SignalService;
use signal_hub::web::server::WebServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if missing)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    logging::structured::init_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        networked_store = config.database.networked_url().is_some(),
        hosted = config.notify.hosted,
        "signal-hub starting"
    );

    // Store is opened once and shared by every request.
    let db = Gateway::connect(&config.database).await?;

    let hub = Arc::new(Hub::new(config.web.channel_capacity));
    let notifier = Notifier::from_config(&config.notify);
    let service = Arc::new(SignalService::new(db, hub, notifier));

    let web_server = WebServer::new(config.web.clone(), service);
    let mut web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!(error = %e, "web server error");
        }
    });

    info!("all subsystems started, waiting for shutdown signal");

    let shutdown = async {
        #[cfg(unix)]
        {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = signal::ctrl_c() => { info!("received SIGINT"); }
                        _ = sigterm.recv() => { info!("received SIGTERM"); }
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    let _ = signal::ctrl_c().await;
                    info!("received SIGINT");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = signal::ctrl_c().await;
            info!("received SIGINT");
        }
    };

    tokio::select! {
        _ = shutdown => {}
        _ = &mut web_handle => { error!("web server exited"); }
    }

    web_handle.abort();
    info!("shutdown complete");
    Ok(())
}
