//! Dashboard-side signal store and its ports.

pub mod api;
pub mod kv;
pub mod prefs;
pub mod sizing;
pub mod store;
pub mod watcher;

pub use api::{ChannelSubscription, HubClient};
pub use kv::{FileKv, KeyValueStore, MemoryKv};
pub use prefs::Preferences;
pub use sizing::PositionSize;
pub use store::{SignalStore, SignalView};
pub use watcher::Watcher;
