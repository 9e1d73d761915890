//! Axum HTTP server: REST endpoints plus the real-time channel.

use std::sync::Arc;

use axum::http::Method;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::WebConfig;
use crate::service::SignalService;

use super::{routes, ws};

/// Shared state for all web routes.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SignalService>,
}

/// Full application router.
pub fn router(state: AppState, cors_any: bool) -> Router {
    let app = Router::new()
        .merge(routes::api_routes())
        .merge(ws::ws_routes())
        .with_state(state);

    if cors_any {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
    } else {
        app
    }
}

pub struct WebServer {
    config: WebConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(config: WebConfig, service: Arc<SignalService>) -> Self {
        Self {
            config,
            state: AppState { service },
        }
    }

    /// Bind and serve until the process exits.
    pub async fn start(self) -> anyhow::Result<()> {
        let app = router(self.state, self.config.cors_any);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.port));
        info!(port = self.config.port, "signal hub listening");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
