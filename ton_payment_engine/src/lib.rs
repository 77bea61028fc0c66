//! TON Payment Engine
//!
//! The TON Payment Engine turns "the customer paid order X" into a durable, exactly-once fact.
//! It is built from four cooperating pieces:
//! 1. A ledger capability ([`mod@ledger`]) that normalizes the TonAPI event feed (and an
//!    in-memory double of it) into one transfer shape the rest of the engine consumes.
//! 2. A stateless payment matcher ([`mod@matcher`]) that scans the feed for a transfer paying the
//!    merchant with the right comment and at least the asked-for amount, comparing amounts as
//!    scale-9 decimals with no tolerance.
//! 3. A SQLite-backed outbox ([`mod@outbox`]) acting as the inter-process event bus: idempotent
//!    keyed publishes, competing-consumer claims, ack and fail-with-backoff.
//! 4. The intent processor ([`mod@processor`]): a poll loop that consumes `pay.intent.create`
//!    requests, registers TTL-bounded intents and hands each one to a capacity-bounded watcher
//!    that publishes `pay.payment.confirmed` exactly once per on-chain transaction.
//!
//! [`IntentApi`] wraps the store and matcher for synchronous callers (a thin HTTP layer, CLI
//! tooling); [`config::PipelineConfig`] wires everything from the environment.
pub mod api;
pub mod config;
pub mod intents;
pub mod ledger;
pub mod matcher;
pub mod outbox;
pub mod processor;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{IntentApi, IntentApiError};
pub use intents::{order_code, IntentStore, PaymentIntent};
pub use ledger::{AnyLedger, LedgerError, MemoryLedger, TonApi, TonLedger};
pub use matcher::{MatchCriteria, MatcherError, PaymentMatch, PaymentMatcher};
pub use outbox::{EventRow, EventStatus, Outbox, OutboxError, PublishOutcome};
pub use processor::{IntentProcessor, ProcessorError};
