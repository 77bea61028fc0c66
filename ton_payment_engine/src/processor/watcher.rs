//! Per-intent payment watchers.
//!
//! One bounded-lifetime task per open intent. The task polls the matcher on a fixed tick until a
//! match appears or the intent's TTL elapses, then recovers the exact transfer details with one
//! authoritative `find_payment` call and publishes a single confirmation keyed by the underlying
//! transaction. Expiry without a match is a normal outcome, not a failure; a ledger error makes
//! the watcher exit without confirming (the intent will expire and can be re-triggered).
use chrono::Utc;
use log::*;
use tokio::{
    sync::{watch, OwnedSemaphorePermit},
    time::{interval, timeout_at, Duration, Instant, MissedTickBehavior},
};

use super::messages::{confirmation_key, PaymentConfirmed, TOPIC_PAYMENT_CONFIRMED};
use crate::{
    intents::PaymentIntent,
    ledger::TonLedger,
    matcher::{MatchCriteria, PaymentMatcher, DEFAULT_FIND_LIMIT},
    outbox::Outbox,
};

pub(super) struct WatchTask<L: TonLedger> {
    outbox: Outbox,
    matcher: PaymentMatcher<L>,
    intent: PaymentIntent,
    tick: Duration,
}

impl<L> WatchTask<L>
where L: TonLedger + Clone + Send + Sync + 'static
{
    pub(super) fn new(outbox: Outbox, matcher: PaymentMatcher<L>, intent: PaymentIntent, tick: Duration) -> Self {
        Self { outbox, matcher, intent, tick }
    }

    /// The permit is owned by the task, so the watcher slot is released on every exit path:
    /// success, expiry, ledger error or shutdown.
    pub(super) async fn run(self, permit: OwnedSemaphorePermit, mut shutdown: watch::Receiver<bool>) {
        let _permit = permit;
        let intent = &self.intent;
        let Ok(ttl) = intent.remaining_ttl(Utc::now()).to_std() else {
            return;
        };
        let deadline = Instant::now() + ttl;
        let criteria = MatchCriteria {
            merchant_address: intent.merchant_address.clone(),
            comment: intent.match_comment.clone(),
            min_amount: intent.min_amount.clone(),
            limit: DEFAULT_FIND_LIMIT,
        };
        debug!("👀 Watching intent {} for order {} (ttl {ttl:?})", intent.id, intent.order_id);

        let mut poll = interval(self.tick);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("👀 Watcher for intent {} cancelled by shutdown", intent.id);
                    return;
                },
                tick = timeout_at(deadline, poll.tick()) => {
                    if tick.is_err() {
                        debug!("⌛ Intent {} for order {} expired unpaid. Abandoning.", intent.id, intent.order_id);
                        return;
                    }
                    // the ledger call itself may not outlive the intent deadline
                    match timeout_at(deadline, self.matcher.check_payment(&criteria)).await {
                        Ok(Ok(true)) => break,
                        Ok(Ok(false)) => {},
                        Ok(Err(e)) => {
                            warn!(
                                "👀 Ledger check failed for intent {}: {e}. Watcher exiting; the intent will \
                                 expire unconfirmed unless re-triggered.",
                                intent.id
                            );
                            return;
                        },
                        Err(_) => {
                            debug!("⌛ Intent {} for order {} expired unpaid. Abandoning.", intent.id, intent.order_id);
                            return;
                        },
                    }
                },
            }
        }

        self.confirm(&criteria).await;
    }

    async fn confirm(&self, criteria: &MatchCriteria) {
        let intent = &self.intent;
        let found = match self.matcher.find_payment(criteria).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                // check_payment folds case but find_payment does not, so this gap is reachable
                warn!(
                    "👀 No payment found for comment {} and amount {} on the authoritative lookup",
                    criteria.comment, criteria.min_amount
                );
                return;
            },
            Err(e) => {
                warn!("👀 Could not recover payment details for intent {}: {e}", intent.id);
                return;
            },
        };

        let confirmed = PaymentConfirmed {
            order_id: intent.order_id,
            intent_id: intent.id,
            tx_id: found.tx_id.clone(),
            amount_ton: found.amount.clone(),
            ton_comment: found.comment.clone(),
            from_address: found.from_address.clone(),
            confirmed_at: Utc::now(),
        };
        // published exactly once; the tx-derived key collapses racing confirmations
        let key = confirmation_key(&found.tx_id);
        match self.outbox.publish(TOPIC_PAYMENT_CONFIRMED, &confirmed, Some(&key)).await {
            Ok(outcome) if outcome.was_published() => {
                info!(
                    "✅ payment.confirmed order={} intent={} tx={} amount={}",
                    intent.order_id, intent.id, found.tx_id, found.amount
                );
            },
            Ok(_) => debug!("✅ Transfer {} was already confirmed. Nothing to do.", found.tx_id),
            Err(e) => error!("✅ Could not publish confirmation for intent {}: {e}", intent.id),
        }
    }
}
