//! Real-time channel: one WebSocket per dashboard.
//!
//! Frames are JSON text `{"event": ..., "data": ...}` in both directions.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::events::{ClientFrame, Session};

use super::server::AppState;

pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let session = state.service.hub().session();
    ws.on_upgrade(move |socket| handle_socket(socket, session))
}

async fn handle_socket(socket: WebSocket, mut session: Session) {
    let (mut sink, mut stream) = socket.split();
    info!(session = %session.id(), "client connected");

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => handle_frame(&mut session, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session = %session.id(), error = %e, "socket read failed");
                    break;
                }
            },
            outbound = session.recv() => {
                let Some(event) = outbound else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(error = %e, "failed to encode event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(session = %session.id(), "client disconnected");
}

fn handle_frame(session: &mut Session, text: &str) {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::JoinRoom(room)) => session.join(&room),
        Ok(ClientFrame::Chat(message)) => {
            let delivered = session.send_chat(message);
            debug!(session = %session.id(), delivered, "chat relayed");
        }
        Err(e) => warn!(session = %session.id(), error = %e, "ignoring unparseable frame"),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};

    use super::super::server::testing::spawn_app;
    use crate::events::Hub;

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    async fn connect(addr: SocketAddr) -> Client {
        let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        ws
    }

    async fn send(ws: &mut Client, frame: Value) {
        ws.send(WsMessage::Text(frame.to_string())).await.unwrap();
    }

    /// Next JSON frame, or `None` if nothing arrives shortly.
    async fn next_frame(ws: &mut Client) -> Option<Value> {
        loop {
            match tokio::time::timeout(Duration::from_millis(300), ws.next()).await {
                Ok(Some(Ok(WsMessage::Text(t)))) => return Some(serde_json::from_str(&t).unwrap()),
                Ok(Some(Ok(_))) => continue,
                _ => return None,
            }
        }
    }

    async fn wait_for_members(hub: &Hub, room: &str, n: usize) {
        for _ in 0..100 {
            if hub.member_count(room) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room} never reached {n} members");
    }

    async fn wait_for_subscribers(hub: &Hub, n: usize) {
        for _ in 0..100 {
            if hub.subscriber_count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never reached {n} subscribers");
    }

    #[tokio::test]
    async fn room_chat_reaches_only_members() {
        let (addr, service) = spawn_app().await;
        let mut member = connect(addr).await;
        let mut outsider = connect(addr).await;

        send(&mut member, json!({"event": "join_room", "data": "BTCUSDT"})).await;
        wait_for_members(service.hub(), "BTCUSDT", 1).await;

        for text in ["first", "second"] {
            send(
                &mut outsider,
                json!({"event": "chat_message", "data": {"room": "BTCUSDT", "message": text, "user": "Trader_9"}}),
            )
            .await;
        }

        for text in ["first", "second"] {
            let frame = next_frame(&mut member).await.unwrap();
            assert_eq!(frame["event"], "chat_message");
            assert_eq!(frame["data"]["message"], text);
            assert!(frame["data"]["timestamp"].as_i64().unwrap() > 0);
        }
        assert_eq!(next_frame(&mut outsider).await, None);
    }

    #[tokio::test]
    async fn lifecycle_events_reach_every_client() {
        let (addr, service) = spawn_app().await;
        let mut a = connect(addr).await;
        let mut b = connect(addr).await;
        wait_for_subscribers(service.hub(), 2).await;

        let id = service
            .ingest(json!({
                "symbol": "SOLUSDT",
                "type": "BUY",
                "price": 142.3,
                "setup_zones": {"stop_loss": 139.0, "take_profit": 150.0}
            }))
            .await
            .unwrap();
        service.vote(id, "disagree").await.unwrap();
        service.open_trade(Some(id), Some(142.3)).await.unwrap();

        for ws in [&mut a, &mut b] {
            let created = next_frame(ws).await.unwrap();
            assert_eq!(created["event"], "new-signal");
            assert_eq!(created["data"]["id"], id);

            let sentiment = next_frame(ws).await.unwrap();
            assert_eq!(
                sentiment,
                json!({"event": "sentiment-update", "data": {"id": id, "agree_count": 0, "disagree_count": 1}})
            );

            let trade = next_frame(ws).await.unwrap();
            assert_eq!(trade["event"], "trade-update");
            assert_eq!(trade["data"]["signal_id"], id);
            assert_eq!(trade["data"]["status"], "OPEN");
        }
    }

    #[tokio::test]
    async fn garbage_frames_are_ignored() {
        let (addr, service) = spawn_app().await;
        let mut ws = connect(addr).await;
        ws.send(WsMessage::Text("not json".into())).await.unwrap();
        send(&mut ws, json!({"event": "join_room", "data": "global"})).await;
        wait_for_members(service.hub(), "global", 1).await;
    }
}
