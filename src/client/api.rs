//! HTTP and WebSocket client for a running hub.

use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::db::models::{SignalRow, Stats, TradeRow, Vote};
use crate::error::{HubError, Result};
use crate::events::{ChatMessage, ClientFrame, HubEvent};

use super::store::SignalView;

/// Turn a configured address into a base URL. Bare hosts get `http` when
/// they are localhost and `https` otherwise.
pub fn base_url(api_url: &str) -> String {
    let api_url = api_url.trim().trim_end_matches('/');
    if api_url.starts_with("http") {
        api_url.to_string()
    } else if api_url.contains("localhost") {
        format!("http://{api_url}")
    } else {
        format!("https://{api_url}")
    }
}

#[derive(Clone)]
pub struct HubClient {
    base: String,
    http: reqwest::Client,
}

impl HubClient {
    pub fn new(api_url: &str) -> Self {
        Self {
            base: base_url(api_url),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn ws_url(&self) -> String {
        let rest = self
            .base
            .strip_prefix("https://")
            .map(|r| format!("wss://{r}"))
            .or_else(|| self.base.strip_prefix("http://").map(|r| format!("ws://{r}")))
            .unwrap_or_else(|| self.base.clone());
        format!("{rest}/ws")
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let message = resp
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        Err(match status {
            StatusCode::BAD_REQUEST => HubError::InvalidInput(message),
            StatusCode::NOT_FOUND => HubError::NotFound(message),
            _ => HubError::Connection(format!("hub returned {status}: {message}")),
        })
    }

    /// Last 50 signals, newest first.
    pub async fn fetch_history(&self) -> Result<Vec<SignalView>> {
        let resp = self.http.get(format!("{}/signals", self.base)).send().await?;
        Self::decode(resp).await
    }

    pub async fn stats(&self) -> Result<Stats> {
        let resp = self.http.get(format!("{}/stats", self.base)).send().await?;
        Self::decode(resp).await
    }

    pub async fn vote(&self, signal_id: i64, vote: Vote) -> Result<SignalRow> {
        let resp = self
            .http
            .post(format!("{}/signal/{}/sentiment", self.base, signal_id))
            .json(&json!({ "type": vote }))
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn execute_trade(&self, signal_id: i64, price: f64) -> Result<TradeRow> {
        let resp = self
            .http
            .post(format!("{}/trade", self.base))
            .json(&json!({ "signal_id": signal_id, "price": price }))
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Open the real-time channel.
    pub async fn connect(&self) -> Result<ChannelSubscription> {
        let url = self.ws_url();
        let (ws, _) = connect_async(url.as_str()).await?;
        info!(url = %url, "channel connected");
        Ok(ChannelSubscription { ws })
    }
}

/// A live channel connection.
pub struct ChannelSubscription {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ChannelSubscription {
    async fn send_frame(&mut self, frame: &ClientFrame) -> Result<()> {
        let text = serde_json::to_string(frame)?;
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    pub async fn join_room(&mut self, room: &str) -> Result<()> {
        self.send_frame(&ClientFrame::JoinRoom(room.to_string())).await
    }

    pub async fn send_chat(&mut self, message: ChatMessage) -> Result<()> {
        self.send_frame(&ClientFrame::Chat(message)).await
    }

    /// Next hub event. `Ok(None)` once the server closes the channel.
    pub async fn next_event(&mut self) -> Result<Option<HubEvent>> {
        while let Some(msg) = self.ws.next().await {
            match msg? {
                Message::Text(text) => match serde_json::from_str::<HubEvent>(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => warn!(error = %e, "ignoring unrecognised frame"),
                },
                Message::Close(_) => {
                    debug!("channel closed by server");
                    return Ok(None);
                }
                _ => {}
            }
        }
        Ok(None)
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::web::server::testing::spawn_app;

    #[test]
    fn scheme_is_inferred_from_host() {
        assert_eq!(base_url("localhost:4000"), "http://localhost:4000");
        assert_eq!(base_url("hub.example.com"), "https://hub.example.com");
        assert_eq!(base_url("http://10.0.0.2:4000/"), "http://10.0.0.2:4000");
        assert_eq!(HubClient::new("localhost:4000").ws_url(), "ws://localhost:4000/ws");
        assert_eq!(HubClient::new("hub.example.com").ws_url(), "wss://hub.example.com/ws");
    }

    #[tokio::test]
    async fn rest_calls_round_trip() {
        let (addr, service) = spawn_app().await;
        let client = HubClient::new(&format!("http://{addr}"));

        let id = service
            .ingest(json!({
                "symbol": "BTCUSDT",
                "type": "BUY",
                "price": 64000.0,
                "timeframe": "1h",
                "setup_zones": {"stop_loss": 63000.0, "take_profit": 66000.0}
            }))
            .await
            .unwrap();

        let history = client.fetch_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, Some(id));
        assert_eq!(history[0].timeframe.as_deref(), Some("1h"));

        let row = client.vote(id, Vote::Agree).await.unwrap();
        assert_eq!(row.agree_count, 1);

        let trade = client.execute_trade(id, 64000.0).await.unwrap();
        assert_eq!(trade.signal_id, Some(id));

        let stats = client.stats().await.unwrap();
        assert_eq!(stats.total_trades, 1);

        let err = client.vote(id + 1, Vote::Agree).await.unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }

    #[tokio::test]
    async fn channel_relays_chat_between_subscriptions() {
        let (addr, service) = spawn_app().await;
        let client = HubClient::new(&format!("http://{addr}"));
        let mut alice = client.connect().await.unwrap();
        let mut bob = client.connect().await.unwrap();

        alice.join_room("global").await.unwrap();
        for _ in 0..100 {
            if service.hub().member_count("global") == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        bob.send_chat(ChatMessage {
            room: "global".into(),
            message: "gm".into(),
            user: "Trader_2".into(),
            timestamp: 0,
        })
        .await
        .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), alice.next_event())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match event {
            HubEvent::Chat(msg) => {
                assert_eq!(msg.message, "gm");
                assert!(msg.timestamp > 0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        bob.close().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_hub_is_an_error() {
        let client = HubClient::new("http://127.0.0.1:1");
        assert!(client.fetch_history().await.is_err());
        assert!(client.connect().await.is_err());
    }
}
