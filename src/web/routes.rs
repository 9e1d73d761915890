//! HTTP route handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{SignalRow, Stats, TradeRow};
use crate::error::{HubError, Result};

use super::server::AppState;

pub const BANNER: &str = "AlphaScanner API Hub is running. Connect a dashboard to /ws for live signals.";

/// Build all API routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/signals", get(signals))
        .route("/signal", post(ingest))
        .route("/signal/:id/sentiment", post(sentiment))
        .route("/trade", post(trade))
        .route("/stats", get(stats))
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| HubError::InvalidInput(e.body_text()))
}

#[derive(Debug, Deserialize)]
struct SentimentRequest {
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TradeRequest {
    signal_id: Option<i64>,
    price: Option<f64>,
}

/// GET /
async fn index() -> &'static str {
    BANNER
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// GET /signals: last 50, newest first.
async fn signals(State(state): State<AppState>) -> Result<Json<Vec<Value>>> {
    Ok(Json(state.service.history().await?))
}

/// POST /signal
async fn ingest(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>> {
    let id = state.service.ingest(body(payload)?).await?;
    Ok(Json(json!({
        "message": "Signal received, broadcasted, and notified",
        "id": id,
    })))
}

/// POST /signal/:id/sentiment
async fn sentiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<SentimentRequest>, JsonRejection>,
) -> Result<Json<SignalRow>> {
    let id: i64 = id
        .parse()
        .map_err(|_| HubError::InvalidInput(format!("signal id must be an integer, got {id:?}")))?;
    let request = body(payload)?;
    Ok(Json(state.service.vote(id, &request.kind).await?))
}

/// POST /trade
async fn trade(
    State(state): State<AppState>,
    payload: std::result::Result<Json<TradeRequest>, JsonRejection>,
) -> Result<Json<TradeRow>> {
    let request = body(payload)?;
    Ok(Json(
        state
            .service
            .open_trade(request.signal_id, request.price)
            .await?,
    ))
}

/// GET /stats
async fn stats(State(state): State<AppState>) -> Result<Json<Stats>> {
    Ok(Json(state.service.stats().await?))
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use super::super::server::testing::spawn_app;
    use super::*;

    fn signal(symbol: &str) -> Value {
        json!({
            "symbol": symbol,
            "type": "SELL",
            "price": 3120.0,
            "timeframe": "4h",
            "reason": "Rejection at resistance",
            "setup_zones": {"stop_loss": 3180.0, "take_profit": 2990.0}
        })
    }

    #[tokio::test]
    async fn health_and_banner() {
        let (addr, _) = spawn_app().await;
        let client = reqwest::Client::new();

        let health: Value = client
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert!(health["timestamp"].as_str().unwrap().ends_with('Z'));

        let banner = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(banner.text().await.unwrap(), BANNER);
    }

    #[tokio::test]
    async fn signal_lifecycle_over_http() {
        let (addr, _) = spawn_app().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("http://{addr}/signal"))
            .json(&signal("ETHUSDT"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let created: Value = resp.json().await.unwrap();
        let id = created["id"].as_i64().unwrap();
        assert!(created["message"].is_string());

        let voted = client
            .post(format!("http://{addr}/signal/{id}/sentiment"))
            .json(&json!({"type": "agree"}))
            .send()
            .await
            .unwrap();
        assert_eq!(voted.status(), StatusCode::OK);
        let row: Value = voted.json().await.unwrap();
        assert_eq!(row["agree_count"], 1);
        assert_eq!(row["type"], "SELL");

        let trade: Value = client
            .post(format!("http://{addr}/trade"))
            .json(&json!({"signal_id": id, "price": 3120.0}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(trade["signal_id"], id);
        assert_eq!(trade["status"], "OPEN");
        assert_eq!(trade["pnl"], 0.0);

        let history: Vec<Value> = client
            .get(format!("http://{addr}/signals"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["timeframe"], "4h");

        let stats: Value = client
            .get(format!("http://{addr}/stats"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            stats,
            json!({"total_signals": 1, "total_trades": 1, "win_rate": 0.0, "avg_rr": 2.4})
        );
    }

    #[tokio::test]
    async fn error_statuses() {
        let (addr, _) = spawn_app().await;
        let client = reqwest::Client::new();

        let missing_type = client
            .post(format!("http://{addr}/signal"))
            .json(&json!({"symbol": "BTCUSDT"}))
            .send()
            .await
            .unwrap();
        assert_eq!(missing_type.status(), StatusCode::BAD_REQUEST);
        let err: Value = missing_type.json().await.unwrap();
        assert!(err["error"].is_string());

        let not_json = client
            .post(format!("http://{addr}/signal"))
            .header("content-type", "application/json")
            .body("{oops")
            .send()
            .await
            .unwrap();
        assert_eq!(not_json.status(), StatusCode::BAD_REQUEST);

        let bad_vote = client
            .post(format!("http://{addr}/signal/1/sentiment"))
            .json(&json!({"type": "love"}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_vote.status(), StatusCode::BAD_REQUEST);

        let unknown = client
            .post(format!("http://{addr}/signal/77/sentiment"))
            .json(&json!({"type": "agree"}))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let bad_id = client
            .post(format!("http://{addr}/signal/abc/sentiment"))
            .json(&json!({"type": "agree"}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);

        let orphan_trade = client
            .post(format!("http://{addr}/trade"))
            .json(&json!({"signal_id": 9999, "price": 1.0}))
            .send()
            .await
            .unwrap();
        assert_eq!(orphan_trade.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err: Value = orphan_trade.json().await.unwrap();
        assert_eq!(err, json!({"error": "internal server error"}));
    }

    #[tokio::test]
    async fn history_is_capped_at_fifty() {
        let (addr, service) = spawn_app().await;
        for i in 0..60 {
            service.ingest(signal(&format!("SYM{i}"))).await.unwrap();
        }
        let history: Vec<Value> = reqwest::get(format!("http://{addr}/signals"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history.len(), 50);
        let ids: Vec<i64> = history.iter().map(|s| s["id"].as_i64().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(history[0]["symbol"], "SYM59");
    }
}
