//! One subscriber's view of the hub: global events plus joined rooms.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::select_all;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::bus::{ChatMessage, Hub, HubEvent};

/// Room receivers are owned here, so dropping a session releases its rooms
/// immediately.
pub struct Session {
    id: Uuid,
    hub: Arc<Hub>,
    events: broadcast::Receiver<HubEvent>,
    rooms: HashMap<String, broadcast::Receiver<ChatMessage>>,
}

enum Wake {
    Global(std::result::Result<HubEvent, RecvError>),
    Room(String, std::result::Result<ChatMessage, RecvError>),
}

impl Session {
    pub(super) fn new(hub: Arc<Hub>) -> Self {
        let events = hub.subscribe();
        Self {
            id: Uuid::new_v4(),
            hub,
            events,
            rooms: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Join a room. Messages relayed after this returns are delivered;
    /// earlier ones never are. Joining twice is a no-op.
    pub fn join(&mut self, room: &str) {
        if self.rooms.contains_key(room) {
            return;
        }
        let rx = self.hub.join(room);
        debug!(session = %self.id, room, "joined room");
        self.rooms.insert(room.to_string(), rx);
    }

    pub fn joined(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Relay a chat message through the hub.
    pub fn send_chat(&self, message: ChatMessage) -> usize {
        self.hub.relay(message)
    }

    /// Next event for this subscriber. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        loop {
            let events = &mut self.events;
            let rooms = &mut self.rooms;
            let chat = async move {
                if rooms.is_empty() {
                    return std::future::pending().await;
                }
                let pending = rooms.iter_mut().map(|(name, rx)| {
                    Box::pin(async move { (name.clone(), rx.recv().await) })
                });
                select_all(pending).await.0
            };

            let wake = tokio::select! {
                event = events.recv() => Wake::Global(event),
                (room, msg) = chat => Wake::Room(room, msg),
            };

            match wake {
                Wake::Global(Ok(ev)) => return Some(ev),
                Wake::Global(Err(RecvError::Lagged(n))) => {
                    warn!(session = %self.id, skipped = n, "event receiver lagged");
                }
                Wake::Global(Err(RecvError::Closed)) => return None,
                Wake::Room(_, Ok(msg)) => return Some(HubEvent::Chat(msg)),
                Wake::Room(room, Err(RecvError::Lagged(n))) => {
                    warn!(session = %self.id, room = %room, skipped = n, "chat receiver lagged");
                }
                Wake::Room(room, Err(RecvError::Closed)) => {
                    self.rooms.remove(&room);
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.rooms.clear();
        self.hub.prune_rooms();
    }
}
