//! Real-time fan-out: a global tokio::broadcast channel plus named chat rooms.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::db::models::TradeRow;

use super::session::Session;

/// Chat line relayed to one room. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub room: String,
    pub message: String,
    pub user: String,
    /// Milliseconds since epoch; filled in by the hub when the sender omits it.
    #[serde(default)]
    pub timestamp: i64,
}

/// Counters after a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentUpdate {
    pub id: i64,
    pub agree_count: i64,
    pub disagree_count: i64,
}

/// Server → client events. On the wire: `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum HubEvent {
    /// Accepted signal: original payload plus id and zeroed counters.
    #[serde(rename = "new-signal")]
    NewSignal(Value),
    #[serde(rename = "sentiment-update")]
    SentimentUpdate(SentimentUpdate),
    #[serde(rename = "trade-update")]
    TradeUpdate(TradeRow),
    #[serde(rename = "chat_message")]
    Chat(ChatMessage),
}

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientFrame {
    #[serde(rename = "join_room")]
    JoinRoom(String),
    #[serde(rename = "chat_message")]
    Chat(ChatMessage),
}

/// Central hub: every subscriber gets global events; chat goes only to
/// subscribers that joined the message's room.
pub struct Hub {
    tx: broadcast::Sender<HubEvent>,
    rooms: DashMap<String, broadcast::Sender<ChatMessage>>,
    capacity: usize,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            rooms: DashMap::new(),
            capacity,
        }
    }

    /// Publish an event to all subscribers. Returns how many received it.
    pub fn publish(&self, event: HubEvent) -> usize {
        // No subscribers is not an error.
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to global events.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.tx.subscribe()
    }

    /// Open a per-connection session.
    pub fn session(self: &Arc<Self>) -> Session {
        Session::new(self.clone())
    }

    /// Subscribe to a room. Only messages relayed after this call are received.
    pub fn join(&self, room: &str) -> broadcast::Receiver<ChatMessage> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Relay a chat message to its room's members. Returns how many received it.
    pub fn relay(&self, mut message: ChatMessage) -> usize {
        if message.timestamp == 0 {
            message.timestamp = chrono::Utc::now().timestamp_millis();
        }
        match self.rooms.get(&message.room) {
            Some(tx) => tx.send(message).unwrap_or(0),
            None => {
                debug!(room = %message.room, "chat message for room with no members");
                0
            }
        }
    }

    /// Drop rooms nobody listens to any more.
    pub fn prune_rooms(&self) {
        self.rooms.retain(|_, tx| tx.receiver_count() > 0);
    }

    /// Current global subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Receivers currently joined to `room`.
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms
            .get(room)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}
