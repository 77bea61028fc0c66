use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use async_trait::async_trait;
use tpn_common::NanoTon;
use uuid::Uuid;

use super::{
    clamp_fetch_limit,
    AccountSummary,
    LedgerAction,
    LedgerError,
    LedgerEvent,
    TonLedger,
    TRANSFER_ACTION_TYPE,
};

/// In-memory [`TonLedger`] implementation for tests and local development.
///
/// Events are held per account, most recent first, exactly as the live feed delivers them. The
/// double can also be switched "offline" to exercise adapter-unavailable paths.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    events: HashMap<String, Vec<LedgerEvent>>,
    balances: HashMap<String, NanoTon>,
    offline: bool,
    latency: Duration,
}

impl MemoryLedger {
    /// Prepends a synthetic inbound transfer for `account`. `amount_nano` is an integer nanoTon
    /// string and `comment` the transfer annotation. Returns the generated event id.
    pub fn add_transfer(&self, account: &str, sender: &str, amount_nano: &str, comment: &str) -> String {
        let event = LedgerEvent {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Some(chrono::Utc::now().timestamp()),
            actions: vec![LedgerAction {
                action_type: TRANSFER_ACTION_TYPE.to_string(),
                amount: amount_nano.to_string(),
                sender: sender.to_string(),
                recipient: account.to_string(),
                comment: comment.to_string(),
            }],
        };
        let event_id = event.event_id.clone();
        self.write().events.entry(account.to_string()).or_default().insert(0, event);
        event_id
    }

    /// Prepends an arbitrary event, for shapes `add_transfer` cannot express.
    pub fn add_event(&self, account: &str, event: LedgerEvent) {
        self.write().events.entry(account.to_string()).or_default().insert(0, event);
    }

    pub fn set_balance(&self, account: &str, balance: NanoTon) {
        self.write().balances.insert(account.to_string(), balance);
    }

    /// When offline, every query fails with [`LedgerError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.write().offline = offline;
    }

    /// Adds an artificial delay to every query, for exercising deadline handling.
    pub fn set_latency(&self, latency: Duration) {
        self.write().latency = latency;
    }

    async fn simulate_latency(&self) {
        let latency = self.read().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TonLedger for MemoryLedger {
    async fn fetch_recent_events(&self, address: &str, limit: usize) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.simulate_latency().await;
        let state = self.read();
        if state.offline {
            return Err(LedgerError::Unavailable("memory ledger is offline".to_string()));
        }
        let limit = clamp_fetch_limit(limit);
        let events = state.events.get(address).map(|list| list.iter().take(limit).cloned().collect()).unwrap_or_default();
        Ok(events)
    }

    async fn fetch_account(&self, address: &str) -> Result<AccountSummary, LedgerError> {
        self.simulate_latency().await;
        let state = self.read();
        if state.offline {
            return Err(LedgerError::Unavailable("memory ledger is offline".to_string()));
        }
        let balance = state.balances.get(address).copied().unwrap_or_default();
        Ok(AccountSummary { balance, status: "active".to_string() })
    }
}
