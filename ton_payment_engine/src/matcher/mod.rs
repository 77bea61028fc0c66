//! Payment matching over the normalized ledger feed.
//!
//! The matcher is a pure function of the ledger's current feed snapshot: it keeps no state of its
//! own. Amounts are compared as arbitrary-precision decimals truncated to the on-chain scale of 9
//! fractional digits, with a tolerance-free `>=` acceptance test.
use std::{str::FromStr, time::Duration};

use log::*;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::time::{interval, timeout_at, Instant, MissedTickBehavior};
use tpn_common::{NanoTon, TON_DECIMALS};

use crate::ledger::{LedgerError, TonLedger};

pub const DEFAULT_CHECK_LIMIT: usize = 50;
pub const DEFAULT_FIND_LIMIT: usize = 100;

/// What a caller wants to see on-chain before considering an intent paid.
#[derive(Debug, Clone)]
pub struct MatchCriteria {
    pub merchant_address: String,
    /// The transfer annotation the payer was asked to include, e.g. "ORD-AB12CD".
    pub comment: String,
    /// Minimum acceptable amount as a display-unit decimal string, e.g. "3.000000000".
    pub min_amount: String,
    /// Event fetch limit; zero selects the per-operation default.
    pub limit: usize,
}

/// Details of a successfully matched transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMatch {
    pub tx_id: String,
    /// Scale-9 decimal string.
    pub amount: String,
    pub comment: String,
    pub from_address: String,
}

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Invalid minimum amount '{0}'")]
    InvalidMinAmount(String),
}

/// Comment comparison rule for one scan.
///
/// The boolean check path folds case while the detail-recovery path compares exactly. This
/// asymmetry is inherited behaviour and is deliberately kept in one visible place rather than
/// silently unified; flagged for product clarification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentMatch {
    Exact,
    FoldCase,
}

#[derive(Clone)]
pub struct PaymentMatcher<L: TonLedger> {
    ledger: L,
}

impl<L: TonLedger> PaymentMatcher<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Returns true if a qualifying transfer exists in the current feed snapshot. Comment
    /// comparison is case-insensitive on this path.
    pub async fn check_payment(&self, criteria: &MatchCriteria) -> Result<bool, MatcherError> {
        Ok(self.scan(criteria, DEFAULT_CHECK_LIMIT, CommentMatch::FoldCase).await?.is_some())
    }

    /// Returns the exact details of the first qualifying transfer, or `None`. Comment comparison
    /// is case-sensitive on this path.
    pub async fn find_payment(&self, criteria: &MatchCriteria) -> Result<Option<PaymentMatch>, MatcherError> {
        self.scan(criteria, DEFAULT_FIND_LIMIT, CommentMatch::Exact).await
    }

    /// Polls [`check_payment`](Self::check_payment) on a fixed tick until a match appears or
    /// `timeout` elapses. Timing out resolves to `Ok(false)` — "not yet paid" is not an error.
    /// Ledger failures propagate immediately.
    pub async fn wait_payment(
        &self,
        criteria: &MatchCriteria,
        timeout: Duration,
        tick: Duration,
    ) -> Result<bool, MatcherError> {
        let deadline = Instant::now() + timeout;
        let mut poll = interval(tick.max(Duration::from_millis(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            match timeout_at(deadline, poll.tick()).await {
                Ok(_) => {
                    if self.check_payment(criteria).await? {
                        return Ok(true);
                    }
                },
                Err(_) => return Ok(false),
            }
        }
    }

    /// Scans events most-recent-first for the first action that
    /// * is a transfer (case-insensitive type match),
    /// * pays the merchant (case-insensitive address match),
    /// * carries the wanted comment (trimmed; comparison per `mode`), and
    /// * meets the minimum amount (exact decimal `>=`, no epsilon).
    ///
    /// Unparsable action amounts are skipped fail-soft; an unparsable criterion amount is a
    /// validation error.
    async fn scan(
        &self,
        criteria: &MatchCriteria,
        default_limit: usize,
        mode: CommentMatch,
    ) -> Result<Option<PaymentMatch>, MatcherError> {
        let min_amount = normalize_min_amount(&criteria.min_amount)?;
        let wanted = criteria.comment.trim();
        let limit = if criteria.limit == 0 { default_limit } else { criteria.limit };
        let events = self.ledger.fetch_recent_events(&criteria.merchant_address, limit).await?;
        for event in &events {
            for action in &event.actions {
                if !action.is_transfer() {
                    continue;
                }
                if !action.recipient.eq_ignore_ascii_case(&criteria.merchant_address) {
                    continue;
                }
                let comment = action.comment.trim();
                let comment_matches = match mode {
                    CommentMatch::Exact => comment == wanted,
                    CommentMatch::FoldCase => comment.eq_ignore_ascii_case(wanted),
                };
                if !comment_matches {
                    continue;
                }
                let amount = match action.amount.parse::<NanoTon>() {
                    Ok(a) => a,
                    Err(e) => {
                        debug!("💸 Skipping action in event {} with unparsable amount: {e}", event.event_id);
                        continue;
                    },
                };
                let amount_ton = amount.to_decimal();
                if amount_ton >= min_amount {
                    return Ok(Some(PaymentMatch {
                        tx_id: event.event_id.clone(),
                        amount: amount_ton.to_string(),
                        comment: comment.to_string(),
                        from_address: action.sender.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }
}

/// Normalizes a criterion amount: trim, strip a surrounding `{{…}}` template-marker wrapper that
/// sometimes leaks from upstream order templates, parse as base-10 decimal, truncate (never
/// round) to 9 fractional digits.
fn normalize_min_amount(raw: &str) -> Result<Decimal, MatcherError> {
    let mut s = raw.trim();
    if s.starts_with("{{") && s.ends_with("}}") && s.len() >= 4 {
        s = s[2..s.len() - 2].trim();
    }
    let amount = Decimal::from_str(s).map_err(|_| MatcherError::InvalidMinAmount(raw.to_string()))?;
    Ok(amount.trunc_with_scale(TON_DECIMALS))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ledger::{LedgerAction, LedgerEvent, MemoryLedger};

    const MERCHANT: &str = "EQ_MERCHANT";

    fn criteria(comment: &str, min_amount: &str) -> MatchCriteria {
        MatchCriteria {
            merchant_address: MERCHANT.to_string(),
            comment: comment.to_string(),
            min_amount: min_amount.to_string(),
            limit: 0,
        }
    }

    fn matcher_with_transfer(amount_nano: &str, comment: &str) -> PaymentMatcher<MemoryLedger> {
        let ledger = MemoryLedger::default();
        ledger.add_transfer(MERCHANT, "EQ_PAYER", amount_nano, comment);
        PaymentMatcher::new(ledger)
    }

    #[tokio::test]
    async fn matches_qualifying_transfer() {
        let matcher = matcher_with_transfer("3000000000", "ORD-AB12CD");
        assert!(matcher.check_payment(&criteria("ORD-AB12CD", "3.000000000")).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_on_comment_mismatch() {
        let matcher = matcher_with_transfer("3000000000", "ORD-AB12CD");
        assert!(!matcher.check_payment(&criteria("ORD-OTHER", "3.000000000")).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_amount_below_minimum() {
        let matcher = matcher_with_transfer("2999999999", "ORD-AB12CD");
        assert!(!matcher.check_payment(&criteria("ORD-AB12CD", "3.000000000")).await.unwrap());
    }

    #[tokio::test]
    async fn check_folds_case_but_find_does_not() {
        let matcher = matcher_with_transfer("3000000000", "ord-ab12cd");
        let want = criteria("ORD-AB12CD", "3.000000000");
        assert!(matcher.check_payment(&want).await.unwrap());
        assert!(matcher.find_payment(&want).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_returns_transfer_details() {
        let ledger = MemoryLedger::default();
        let tx_id = ledger.add_transfer(MERCHANT, "EQ_PAYER", "3000000000", "  ORD-AB12CD  ");
        let matcher = PaymentMatcher::new(ledger);
        let found = matcher.find_payment(&criteria("ORD-AB12CD", "3.000000000")).await.unwrap().unwrap();
        assert_eq!(found.tx_id, tx_id);
        assert_eq!(found.amount, "3.000000000");
        assert_eq!(found.comment, "ORD-AB12CD");
        assert_eq!(found.from_address, "EQ_PAYER");
    }

    #[tokio::test]
    async fn unparsable_action_amount_is_skipped_not_fatal() {
        let ledger = MemoryLedger::default();
        ledger.add_transfer(MERCHANT, "EQ_PAYER", "not-a-number", "ORD-AB12CD");
        ledger.add_transfer(MERCHANT, "EQ_PAYER", "3000000000", "ORD-AB12CD");
        let matcher = PaymentMatcher::new(ledger);
        assert!(matcher.check_payment(&criteria("ORD-AB12CD", "3.000000000")).await.unwrap());
    }

    #[tokio::test]
    async fn non_transfer_actions_are_skipped() {
        let ledger = MemoryLedger::default();
        ledger.add_event(MERCHANT, LedgerEvent {
            event_id: "E1".to_string(),
            timestamp: None,
            actions: vec![LedgerAction {
                action_type: "NftItemTransfer".to_string(),
                amount: "3000000000".to_string(),
                sender: "EQ_PAYER".to_string(),
                recipient: MERCHANT.to_string(),
                comment: "ORD-AB12CD".to_string(),
            }],
        });
        let matcher = PaymentMatcher::new(ledger);
        assert!(!matcher.check_payment(&criteria("ORD-AB12CD", "3.000000000")).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_recipient_is_skipped() {
        let ledger = MemoryLedger::default();
        ledger.add_event(MERCHANT, LedgerEvent {
            event_id: "E1".to_string(),
            timestamp: None,
            actions: vec![LedgerAction {
                action_type: "TonTransfer".to_string(),
                amount: "3000000000".to_string(),
                sender: "EQ_PAYER".to_string(),
                recipient: "EQ_SOMEONE_ELSE".to_string(),
                comment: "ORD-AB12CD".to_string(),
            }],
        });
        let matcher = PaymentMatcher::new(ledger);
        assert!(!matcher.check_payment(&criteria("ORD-AB12CD", "3.000000000")).await.unwrap());
    }

    #[tokio::test]
    async fn template_marker_wrapper_is_stripped() {
        let matcher = matcher_with_transfer("3000000000", "ORD-AB12CD");
        assert!(matcher.check_payment(&criteria("ORD-AB12CD", "{{ 3.0 }}")).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_min_amount_is_a_validation_error() {
        let matcher = matcher_with_transfer("3000000000", "ORD-AB12CD");
        let err = matcher.check_payment(&criteria("ORD-AB12CD", "three ton")).await.unwrap_err();
        assert!(matches!(err, MatcherError::InvalidMinAmount(_)));
    }

    #[tokio::test]
    async fn min_amount_is_truncated_not_rounded() {
        // 2.9999999999 truncates to 2.999999999, so a 3 TON transfer qualifies
        let matcher = matcher_with_transfer("3000000000", "ORD-AB12CD");
        assert!(matcher.check_payment(&criteria("ORD-AB12CD", "2.9999999999")).await.unwrap());
    }

    #[tokio::test]
    async fn ledger_failure_propagates() {
        let ledger = MemoryLedger::default();
        ledger.set_offline(true);
        let matcher = PaymentMatcher::new(ledger);
        let err = matcher.check_payment(&criteria("ORD-AB12CD", "1.0")).await.unwrap_err();
        assert!(matches!(err, MatcherError::Ledger(_)));
    }

    #[tokio::test]
    async fn wait_payment_converges_before_timeout() {
        let ledger = MemoryLedger::default();
        ledger.add_transfer(MERCHANT, "EQ_PAYER", "3000000000", "ORD-OTHER");
        let matcher = PaymentMatcher::new(ledger.clone());
        let want = criteria("ORD-AB12CD", "3.000000000");

        let waiter = {
            let matcher = matcher.clone();
            let want = want.clone();
            tokio::spawn(
                async move { matcher.wait_payment(&want, Duration::from_secs(5), Duration::from_millis(20)).await },
            )
        };
        tokio::time::sleep(Duration::from_millis(60)).await;
        ledger.add_transfer(MERCHANT, "EQ_PAYER", "3000000000", "ORD-AB12CD");
        let paid = waiter.await.unwrap().unwrap();
        assert!(paid);
    }

    #[tokio::test]
    async fn wait_payment_timeout_is_false_not_error() {
        let matcher = PaymentMatcher::new(MemoryLedger::default());
        let paid = matcher
            .wait_payment(&criteria("ORD-AB12CD", "1.0"), Duration::from_millis(50), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(!paid);
    }
}
