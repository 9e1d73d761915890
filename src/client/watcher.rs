//! Long-running dashboard client: seed, subscribe, merge, reconnect.

use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::events::HubEvent;

use super::api::HubClient;
use super::prefs::Preferences;
use super::sizing::PositionSize;
use super::store::{SignalStore, SignalView};

const MAX_BACKOFF_SECS: u64 = 30;
const DEFAULT_BALANCE: f64 = 20.0;

pub struct Watcher {
    client: HubClient,
    store: SignalStore,
    prefs: Preferences,
    rooms: Vec<String>,
    balance: f64,
}

impl Watcher {
    pub fn new(client: HubClient, store: SignalStore, prefs: Preferences) -> Self {
        Self {
            client,
            store,
            prefs,
            rooms: vec!["global".to_string()],
            balance: DEFAULT_BALANCE,
        }
    }

    /// Account balance positions are sized against.
    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }

    /// Rooms joined on every (re)connect.
    pub fn with_rooms(mut self, rooms: Vec<String>) -> Self {
        self.rooms = rooms;
        self
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    /// Run forever, reconnecting with exponential backoff.
    pub async fn run(mut self) {
        let mut backoff_secs = 1u64;

        loop {
            info!(url = %self.client.base_url(), "connecting to signal hub");
            match self.session().await {
                Ok(()) => {
                    warn!("signal hub closed the channel");
                    backoff_secs = 1;
                }
                Err(e) => {
                    error!(error = %e, backoff_secs, "signal hub session failed");
                }
            }

            sleep(Duration::from_secs(backoff_secs)).await;
            backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
        }
    }

    /// One connection: refresh history, subscribe, merge events until the
    /// channel ends.
    pub async fn session(&mut self) -> Result<()> {
        self.store.refresh(&self.client).await;
        let mut channel = self.client.connect().await?;
        for room in &self.rooms {
            channel.join_room(room).await?;
        }
        info!(signals = self.store.signals().len(), "watching for signals");

        while let Some(event) = channel.next_event().await? {
            self.on_event(event).await;
        }
        Ok(())
    }

    async fn on_event(&mut self, event: HubEvent) {
        match &event {
            HubEvent::NewSignal(payload) => {
                info!(
                    id = %payload["id"],
                    symbol = %payload["symbol"],
                    kind = %payload["type"],
                    "new signal"
                );
            }
            HubEvent::SentimentUpdate(u) => {
                info!(id = u.id, agree = u.agree_count, disagree = u.disagree_count, "sentiment update");
            }
            HubEvent::TradeUpdate(t) => {
                info!(trade_id = t.id, signal_id = ?t.signal_id, status = ?t.status, "trade update");
            }
            HubEvent::Chat(m) => {
                info!(room = %m.room, user = %m.user, message = %m.message, "chat");
            }
        }

        if !self.store.apply(&event) {
            return;
        }
        let HubEvent::NewSignal(_) = event else {
            return;
        };
        let Some(signal) = self.store.latest().cloned() else {
            return;
        };

        let size = self.size_for(&signal);
        match &size {
            Some(size) => info!(
                id = ?signal.id,
                risk = size.risk_amount,
                lots = size.lot_size,
                profit = size.potential_profit,
                "position size"
            ),
            None => debug!(id = ?signal.id, "signal cannot be sized"),
        }

        if self.should_auto_execute(size.as_ref())
            && self.store.take(&self.client, &signal).await
        {
            info!(id = ?signal.id, "auto-executed signal");
        }
    }

    fn size_for(&self, signal: &SignalView) -> Option<PositionSize> {
        let zones = signal.setup_zones.as_ref()?;
        PositionSize::compute(
            signal.price?,
            zones.stop_loss,
            zones.take_profit,
            self.balance,
            self.prefs.risk_per_trade,
        )
    }

    /// Auto-execution needs the preference on, a tradeable size and room
    /// under the open-trade cap.
    fn should_auto_execute(&self, size: Option<&PositionSize>) -> bool {
        if !self.prefs.auto_execute {
            return false;
        }
        match size {
            Some(s) if !s.is_dust() => {}
            Some(_) => {
                warn!("position below minimum lot, not auto-executing");
                return false;
            }
            None => return false,
        }
        let open = self.store.taken_ids().len();
        if open >= self.prefs.max_open_trades as usize {
            warn!(open, max = self.prefs.max_open_trades, "open trade cap reached");
            return false;
        }
        true
    }
}
