//! The engine's query surface for a thin HTTP layer.
//!
//! Thin wrappers over the intent store and the matcher: create an intent synchronously, read it
//! back (expired reads as not-found), wait for its payment within a clamped timeout, and a pair
//! of account queries backed by the ledger capability.
use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tpn_common::NanoTon;
use uuid::Uuid;

use crate::{
    intents::{IntentStore, PaymentIntent},
    ledger::{LedgerError, TonLedger},
    matcher::{MatchCriteria, MatcherError, PaymentMatcher, DEFAULT_FIND_LIMIT},
};

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
/// Hard ceiling for interactively-triggered waits.
pub const MAX_WAIT_TIMEOUT: Duration = Duration::from_secs(120);
pub const WAIT_TICK: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum IntentApiError {
    #[error("Merchant address is not configured")]
    MerchantNotConfigured,
    #[error("Invalid order id '{0}': must be a UUID")]
    InvalidOrderId(String),
    #[error("Intent {0} not found or expired")]
    IntentNotFound(Uuid),
    #[error(transparent)]
    Matcher(#[from] MatcherError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Clone)]
pub struct IntentApi<L>
where L: TonLedger + Clone
{
    store: Arc<IntentStore>,
    matcher: PaymentMatcher<L>,
}

impl<L> IntentApi<L>
where L: TonLedger + Clone
{
    pub fn new(store: Arc<IntentStore>, matcher: PaymentMatcher<L>) -> Self {
        Self { store, matcher }
    }

    pub fn store(&self) -> &IntentStore {
        &self.store
    }

    /// Synchronous in-memory intent creation. The order id must be a strict UUID; a non-positive
    /// ttl falls back to the store default.
    pub fn create_intent(
        &self,
        order_id: &str,
        min_amount: &str,
        ttl: chrono::Duration,
    ) -> Result<PaymentIntent, IntentApiError> {
        if self.store.merchant_address().is_empty() {
            return Err(IntentApiError::MerchantNotConfigured);
        }
        let order_id =
            Uuid::parse_str(order_id.trim()).map_err(|_| IntentApiError::InvalidOrderId(order_id.to_string()))?;
        Ok(self.store.create(order_id, min_amount, ttl))
    }

    /// Expired intents read as not-found, even before the sweep has removed them.
    pub fn get_intent(&self, id: &Uuid) -> Option<PaymentIntent> {
        self.store.get(id)
    }

    /// Blocks (asynchronously) until the intent's payment is observed or the timeout elapses.
    /// The caller-supplied timeout is clamped to `[1 s, 120 s]` (zero selects 60 s) and never
    /// exceeds the intent's remaining TTL. Returns `Ok(false)` on timeout — "not yet paid" is a
    /// normal outcome, distinct from a ledger failure.
    pub async fn wait_for_payment(&self, intent_id: &Uuid, timeout: Duration) -> Result<bool, IntentApiError> {
        let intent = self.store.get(intent_id).ok_or(IntentApiError::IntentNotFound(*intent_id))?;
        let timeout = if timeout.is_zero() { DEFAULT_WAIT_TIMEOUT } else { timeout };
        let timeout = timeout.clamp(Duration::from_secs(1), MAX_WAIT_TIMEOUT);
        let remaining = intent.remaining_ttl(chrono::Utc::now()).to_std().unwrap_or_default();
        let timeout = timeout.min(remaining).max(Duration::from_millis(1));
        let criteria = MatchCriteria {
            merchant_address: intent.merchant_address,
            comment: intent.match_comment,
            min_amount: intent.min_amount,
            limit: DEFAULT_FIND_LIMIT,
        };
        Ok(self.matcher.wait_payment(&criteria, timeout, WAIT_TICK).await?)
    }

    pub async fn balance(&self, address: &str) -> Result<NanoTon, IntentApiError> {
        Ok(self.matcher.ledger().fetch_account(address).await?.balance)
    }

    /// Soft health probe: can the ledger source answer at all?
    pub async fn ledger_reachable(&self, address: &str) -> bool {
        self.matcher.ledger().fetch_recent_events(address, 1).await.is_ok()
    }
}
