//! The intent processor.
//!
//! A fixed-interval poll loop claims `pay.intent.create` messages from the outbox, validates
//! them strictly, registers the intent, publishes the `pay.intent.created` fact (idempotently,
//! keyed by the order id), acks the message and hands the intent to a capacity-bounded watcher.
//! Any processing error fails the message with a backoff so it is retried later; nothing in this
//! loop can terminate the process.
mod messages;
mod watcher;

use std::{sync::Arc, time::Duration};

use log::*;
use thiserror::Error;
use tokio::{
    sync::{watch, Semaphore},
    time::{interval, MissedTickBehavior},
};
use uuid::Uuid;

pub use messages::{
    confirmation_key,
    IntentCreateRequest,
    IntentCreated,
    PaymentConfirmed,
    TOPIC_INTENT_CREATE,
    TOPIC_INTENT_CREATED,
    TOPIC_PAYMENT_CONFIRMED,
};

use crate::{
    intents::{IntentStore, PaymentIntent},
    ledger::TonLedger,
    matcher::PaymentMatcher,
    outbox::{EventRow, Outbox, OutboxError},
};
use watcher::WatchTask;

pub const DEFAULT_CLAIM_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_WATCHER_TICK: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_WATCHERS: usize = 50;
pub const CLAIM_BATCH: usize = 100;
/// Backoff applied when an intent-create message cannot be processed.
pub const FAIL_BACKOFF: chrono::Duration = chrono::Duration::seconds(30);

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Merchant address is not configured")]
    MerchantNotConfigured,
    #[error("Invalid order id '{0}': must be a UUID")]
    InvalidOrderId(String),
    #[error("Malformed intent-create payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error(transparent)]
    Outbox(#[from] OutboxError),
}

pub struct IntentProcessor<L>
where L: TonLedger + Clone + Send + Sync + 'static
{
    outbox: Outbox,
    matcher: PaymentMatcher<L>,
    store: Arc<IntentStore>,
    watcher_slots: Arc<Semaphore>,
    max_watchers: usize,
    claim_tick: Duration,
    watcher_tick: Duration,
}

impl<L> IntentProcessor<L>
where L: TonLedger + Clone + Send + Sync + 'static
{
    /// A non-positive `max_watchers` falls back to the default of 50.
    pub fn new(outbox: Outbox, matcher: PaymentMatcher<L>, store: Arc<IntentStore>, max_watchers: usize) -> Self {
        let max_watchers = if max_watchers == 0 { DEFAULT_MAX_WATCHERS } else { max_watchers };
        Self {
            outbox,
            matcher,
            store,
            watcher_slots: Arc::new(Semaphore::new(max_watchers)),
            max_watchers,
            claim_tick: DEFAULT_CLAIM_TICK,
            watcher_tick: DEFAULT_WATCHER_TICK,
        }
    }

    /// Overrides the poll intervals. Mainly useful in tests, where second-scale ticks are far
    /// too slow.
    pub fn with_ticks(mut self, claim_tick: Duration, watcher_tick: Duration) -> Self {
        self.claim_tick = claim_tick;
        self.watcher_tick = watcher_tick;
        self
    }

    /// Runs the claim loop until the shutdown signal fires (or its sender is dropped). The
    /// signal unblocks an in-flight wait without waiting for the tick to elapse.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = interval(self.claim_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("⚙️ Intent processor started (watcher cap: {})", self.max_watchers);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("⚙️ Intent processor shutting down");
                    break;
                },
                _ = tick.tick() => {
                    match self.outbox.claim(&[TOPIC_INTENT_CREATE], CLAIM_BATCH).await {
                        Ok(rows) => {
                            for row in rows {
                                self.handle_create(row, &shutdown).await;
                            }
                        },
                        Err(e) => warn!("⚙️ Could not claim intent-create events: {e}"),
                    }
                    self.store.sweep_expired();
                },
            }
        }
    }

    async fn handle_create(&self, row: EventRow, shutdown: &watch::Receiver<bool>) {
        let id = row.id;
        match self.process_create(&row).await {
            Ok(intent) => {
                if let Err(e) = self.outbox.ack(id).await {
                    warn!("⚙️ Could not ack event {id}: {e}");
                }
                self.spawn_watcher(intent, shutdown.clone());
            },
            Err(e) => {
                warn!("⚙️ Could not process intent-create event {id}: {e}");
                if let Err(e) = self.outbox.fail(id, &e.to_string(), FAIL_BACKOFF).await {
                    warn!("⚙️ Could not record failure for event {id}: {e}");
                }
            },
        }
    }

    /// Validates one intent-create message and, on success, registers the intent and publishes
    /// the `pay.intent.created` fact. Re-processing the same order id registers a fresh intent
    /// but does not emit a duplicate fact — the order-keyed publish is idempotent.
    async fn process_create(&self, row: &EventRow) -> Result<PaymentIntent, ProcessorError> {
        let request: IntentCreateRequest = row.payload_as()?;
        if self.store.merchant_address().is_empty() {
            return Err(ProcessorError::MerchantNotConfigured);
        }
        let order_id = Uuid::parse_str(request.order_id.trim())
            .map_err(|_| ProcessorError::InvalidOrderId(request.order_id.clone()))?;
        let ttl = request.ttl_sec.filter(|s| *s > 0).map(chrono::Duration::seconds).unwrap_or_else(chrono::Duration::zero);
        let amount = request.amount_ton.as_deref().unwrap_or_default();
        let intent = self.store.create(order_id, amount, ttl);

        let created = IntentCreated {
            order_id,
            intent_id: intent.id,
            merchant_address: intent.merchant_address.clone(),
            ton_comment: intent.match_comment.clone(),
            amount_ton: intent.min_amount.clone(),
            expires_at: intent.expires_at,
        };
        let outcome = self.outbox.publish(TOPIC_INTENT_CREATED, &created, Some(&order_id.to_string())).await?;
        if !outcome.was_published() {
            debug!("⚙️ intent.created for order {order_id} was already published. Reprocessing is idempotent.");
        }
        info!(
            "⚙️ intent.created order={order_id} intent={} comment={} amount={} expires={}",
            intent.id, intent.match_comment, intent.min_amount, intent.expires_at
        );
        Ok(intent)
    }

    /// Admission is bounded by the watcher semaphore. When the pool is saturated the intent is
    /// accepted but left unmonitored; that degradation is logged so operators can see it.
    fn spawn_watcher(&self, intent: PaymentIntent, shutdown: watch::Receiver<bool>) {
        let permit = match Arc::clone(&self.watcher_slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    "👀 Watcher capacity ({}) exhausted. Intent {} for order {} has no automatic confirmation path.",
                    self.max_watchers, intent.id, intent.order_id
                );
                return;
            },
        };
        let task = WatchTask::new(self.outbox.clone(), self.matcher.clone(), intent, self.watcher_tick);
        tokio::spawn(task.run(permit, shutdown));
    }
}
