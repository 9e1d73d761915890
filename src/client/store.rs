//! Client-side signal list: seeded from history, kept current by the channel.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::db::models::{SignalKind, Vote};
use crate::error::Result;
use crate::events::{HubEvent, SentimentUpdate};

use super::api::HubClient;
use super::kv::KeyValueStore;

pub const TAKEN_KEY: &str = "alpha_taken_signals";
pub const VOTED_KEY: &str = "alpha_voted_signals";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupZones {
    pub stop_loss: f64,
    pub take_profit: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A signal as the dashboard sees it. Fields the hub does not model are kept
/// in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalView {
    #[serde(default)]
    pub id: Option<i64>,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub setup_zones: Option<SetupZones>,
    #[serde(default)]
    pub agree_count: i64,
    #[serde(default)]
    pub disagree_count: i64,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct SignalStore {
    kv: Arc<dyn KeyValueStore>,
    signals: Vec<SignalView>,
    latest: Option<SignalView>,
    taken: Vec<i64>,
    voted: Vec<i64>,
    last_error: Option<String>,
}

fn load_ids(kv: &dyn KeyValueStore, key: &str) -> Vec<i64> {
    match kv.get(key) {
        Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(key, error = %e, "stored ids unreadable, starting empty");
            Vec::new()
        }),
        None => Vec::new(),
    }
}

impl SignalStore {
    /// Empty list; taken and voted ids restored from `kv`.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let taken = load_ids(kv.as_ref(), TAKEN_KEY);
        let voted = load_ids(kv.as_ref(), VOTED_KEY);
        Self {
            kv,
            signals: Vec::new(),
            latest: None,
            taken,
            voted,
            last_error: None,
        }
    }

    /// Replace the list with a history snapshot (newest first).
    pub fn seed(&mut self, history: Vec<SignalView>) {
        self.signals = history;
        self.last_error = None;
    }

    /// Fetch history from the hub. On failure the current list is kept and
    /// the error is recorded.
    pub async fn refresh(&mut self, client: &HubClient) -> bool {
        match client.fetch_history().await {
            Ok(history) => {
                debug!(count = history.len(), "history loaded");
                self.seed(history);
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch signal history");
                self.set_error(e.to_string());
                false
            }
        }
    }

    /// Merge one channel event. Returns whether the list changed.
    pub fn apply(&mut self, event: &HubEvent) -> bool {
        match event {
            HubEvent::NewSignal(payload) => {
                match serde_json::from_value::<SignalView>(payload.clone()) {
                    Ok(signal) => {
                        self.latest = Some(signal.clone());
                        self.signals.insert(0, signal);
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "ignoring malformed new-signal payload");
                        false
                    }
                }
            }
            HubEvent::SentimentUpdate(update) => self.apply_sentiment(update),
            HubEvent::TradeUpdate(_) | HubEvent::Chat(_) => false,
        }
    }

    fn apply_sentiment(&mut self, update: &SentimentUpdate) -> bool {
        match self.signals.iter_mut().find(|s| s.id == Some(update.id)) {
            Some(signal) => {
                signal.agree_count = update.agree_count;
                signal.disagree_count = update.disagree_count;
                true
            }
            None => false,
        }
    }

    /// Remember that the local user took this signal. Returns `false` if it
    /// was already taken.
    pub fn mark_taken(&mut self, id: i64) -> Result<bool> {
        if self.taken.contains(&id) {
            return Ok(false);
        }
        self.taken.insert(0, id);
        self.kv.set(TAKEN_KEY, &serde_json::to_string(&self.taken)?)?;
        Ok(true)
    }

    /// Open a trade for a signal at its listed price and mark it taken.
    /// Failures are recorded and leave the list untouched.
    pub async fn take(&mut self, client: &HubClient, signal: &SignalView) -> bool {
        let (Some(id), Some(price)) = (signal.id, signal.price) else {
            return false;
        };
        if self.is_taken(id) {
            return false;
        }
        match client.execute_trade(id, price).await {
            Ok(trade) => {
                debug!(trade_id = trade.id, signal_id = id, "trade executed");
                if let Err(e) = self.mark_taken(id) {
                    self.set_error(e.to_string());
                }
                true
            }
            Err(e) => {
                self.set_error(e.to_string());
                false
            }
        }
    }

    /// Cast one vote per signal from this client. A repeat vote is refused
    /// locally; a failed call leaves the list untouched and records the error.
    pub async fn vote(&mut self, client: &HubClient, id: i64, vote: Vote) -> bool {
        if self.has_voted(id) {
            debug!(id, "already voted on this signal");
            return false;
        }
        match client.vote(id, vote).await {
            Ok(row) => {
                self.apply_sentiment(&SentimentUpdate {
                    id: row.id,
                    agree_count: row.agree_count,
                    disagree_count: row.disagree_count,
                });
                self.voted.insert(0, id);
                if let Err(e) = self.save_voted() {
                    self.set_error(e.to_string());
                }
                true
            }
            Err(e) => {
                warn!(id, error = %e, "vote failed");
                self.set_error(e.to_string());
                false
            }
        }
    }

    fn save_voted(&self) -> Result<()> {
        self.kv.set(VOTED_KEY, &serde_json::to_string(&self.voted)?)
    }

    pub fn has_voted(&self, id: i64) -> bool {
        self.voted.contains(&id)
    }

    pub fn is_taken(&self, id: i64) -> bool {
        self.taken.contains(&id)
    }

    pub fn taken_ids(&self) -> &[i64] {
        &self.taken
    }

    pub fn signals(&self) -> &[SignalView] {
        &self.signals
    }

    /// Most recent signal received over the channel this session.
    pub fn latest(&self) -> Option<&SignalView> {
        self.latest.as_ref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::kv::MemoryKv;
    use super::*;

    fn view(id: i64, symbol: &str) -> SignalView {
        serde_json::from_value(json!({
            "id": id,
            "symbol": symbol,
            "type": "BUY",
            "price": 10.0,
            "timeframe": "5m",
            "setup_zones": {"stop_loss": 9.0, "take_profit": 12.0, "entry_zone": {"high": 10.1, "low": 9.9}},
            "agree_count": 1,
            "disagree_count": 0,
            "timestamp": 1700000000
        }))
        .unwrap()
    }

    fn store() -> SignalStore {
        SignalStore::new(Arc::new(MemoryKv::new()))
    }

    #[test]
    fn new_signals_are_prepended() {
        let mut s = store();
        s.seed(vec![view(2, "B"), view(1, "A")]);
        assert!(s.apply(&HubEvent::NewSignal(json!({
            "id": 3, "symbol": "C", "type": "SELL", "price": 5.0,
            "agree_count": 0, "disagree_count": 0, "chart_context": [1, 2]
        }))));
        let ids: Vec<_> = s.signals().iter().map(|v| v.id.unwrap()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(s.latest().unwrap().symbol, "C");
        assert_eq!(s.signals()[0].extra["chart_context"], json!([1, 2]));
    }

    #[test]
    fn sentiment_replaces_only_counters() {
        let mut s = store();
        s.seed(vec![view(2, "B"), view(1, "A")]);
        let before = s.signals()[1].clone();

        assert!(s.apply(&HubEvent::SentimentUpdate(SentimentUpdate {
            id: 1,
            agree_count: 7,
            disagree_count: 4,
        })));
        let after = &s.signals()[1];
        assert_eq!((after.agree_count, after.disagree_count), (7, 4));
        assert_eq!(
            SignalView {
                agree_count: before.agree_count,
                disagree_count: before.disagree_count,
                ..after.clone()
            },
            before
        );
    }

    #[test]
    fn sentiment_for_unknown_id_is_a_no_op() {
        let mut s = store();
        s.seed(vec![view(1, "A")]);
        let snapshot = s.signals().to_vec();
        assert!(!s.apply(&HubEvent::SentimentUpdate(SentimentUpdate {
            id: 99,
            agree_count: 1,
            disagree_count: 1,
        })));
        assert_eq!(s.signals(), snapshot.as_slice());
    }

    #[test]
    fn taken_ids_dedup_and_persist() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
        let mut s = SignalStore::new(kv.clone());
        assert!(s.mark_taken(4).unwrap());
        assert!(s.mark_taken(9).unwrap());
        assert!(!s.mark_taken(4).unwrap());
        assert_eq!(s.taken_ids(), &[9, 4]);
        assert_eq!(kv.get(TAKEN_KEY).as_deref(), Some("[9,4]"));

        let reopened = SignalStore::new(kv);
        assert!(reopened.is_taken(4));
        assert!(!reopened.is_taken(5));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_prior_state() {
        let mut s = store();
        s.seed(vec![view(1, "A")]);
        let client = HubClient::new("http://127.0.0.1:1");
        assert!(!s.refresh(&client).await);
        assert_eq!(s.signals().len(), 1);
        assert!(s.last_error().is_some());
    }

    #[tokio::test]
    async fn take_executes_once() {
        let (addr, service) = crate::web::server::testing::spawn_app().await;
        let id = service
            .ingest(json!({
                "symbol": "BTCUSDT", "type": "BUY", "price": 100.0,
                "setup_zones": {"stop_loss": 95.0, "take_profit": 110.0}
            }))
            .await
            .unwrap();
        let client = HubClient::new(&format!("http://{addr}"));

        let mut s = store();
        assert!(s.refresh(&client).await);
        let signal = s.signals()[0].clone();
        assert!(s.take(&client, &signal).await);
        assert!(!s.take(&client, &signal).await);
        assert!(s.is_taken(id));
        assert_eq!(service.stats().await.unwrap().total_trades, 1);
    }

    #[tokio::test]
    async fn vote_once_per_signal() {
        let (addr, service) = crate::web::server::testing::spawn_app().await;
        let id = service
            .ingest(json!({
                "symbol": "ETHUSDT", "type": "SELL", "price": 3100.0,
                "setup_zones": {"stop_loss": 3150.0, "take_profit": 3000.0}
            }))
            .await
            .unwrap();
        let client = HubClient::new(&format!("http://{addr}"));
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());

        let mut s = SignalStore::new(kv.clone());
        assert!(s.refresh(&client).await);
        assert!(s.vote(&client, id, Vote::Agree).await);
        assert!(!s.vote(&client, id, Vote::Disagree).await);
        assert_eq!(s.signals()[0].agree_count, 1);
        assert_eq!(s.signals()[0].disagree_count, 0);
        assert!(s.last_error().is_none());

        let server = client.fetch_history().await.unwrap();
        assert_eq!((server[0].agree_count, server[0].disagree_count), (1, 0));

        let reopened = SignalStore::new(kv);
        assert!(reopened.has_voted(id));
    }

    #[tokio::test]
    async fn failed_vote_keeps_list_and_records_error() {
        let mut s = store();
        s.seed(vec![view(1, "A")]);
        let snapshot = s.signals().to_vec();
        let client = HubClient::new("http://127.0.0.1:1");

        assert!(!s.vote(&client, 1, Vote::Agree).await);
        assert_eq!(s.signals(), snapshot.as_slice());
        assert!(s.last_error().is_some());
        assert!(!s.has_voted(1));
    }
}
