//! Ledger-event sources.
//!
//! The payment matcher only ever talks to the [`TonLedger`] capability, which exposes exactly the
//! two queries the pipeline needs: the recent-event feed for an account, and an account summary.
//! Two implementations exist and are selected at construction time, never via runtime type
//! inspection:
//!
//! 1. [`TonApi`] — the live REST adapter. It normalizes the provider's heterogeneous action
//!    schema into [`LedgerEvent`] values.
//! 2. [`MemoryLedger`] — an in-memory double that accepts synthetic transfer events, used for
//!    deterministic tests and local development.
mod event_types;
mod memory;
mod tonapi;

use async_trait::async_trait;
use thiserror::Error;

pub use event_types::{AccountSummary, LedgerAction, LedgerEvent, COMMENT_PAYLOAD_TYPE, TRANSFER_ACTION_TYPE};
pub use memory::MemoryLedger;
pub use tonapi::TonApi;

use crate::config::PipelineConfig;

pub const MAX_EVENT_FETCH_LIMIT: usize = 200;
pub const DEFAULT_EVENT_FETCH_LIMIT: usize = 50;

/// Clamps a caller-supplied event fetch limit into `[1, 200]`. Zero means "not specified" and
/// resolves to the default of 50.
pub fn clamp_fetch_limit(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_EVENT_FETCH_LIMIT
    } else {
        limit.min(MAX_EVENT_FETCH_LIMIT)
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger API is unreachable: {0}")]
    Unavailable(String),
    #[error("Ledger API returned status {status}: {body}")]
    ApiStatus { status: u16, body: String },
    #[error("Could not decode ledger response: {0}")]
    BadResponse(String),
    #[error("Could not initialize the ledger client: {0}")]
    Initialization(String),
}

/// The ledger-event query capability consumed by the matcher and the engine API.
#[async_trait]
pub trait TonLedger: Send + Sync {
    /// Fetches up to `limit` of the most recent events for `address`, most recent first.
    /// `limit` is clamped to `[1, 200]`; zero selects the default of 50.
    async fn fetch_recent_events(&self, address: &str, limit: usize) -> Result<Vec<LedgerEvent>, LedgerError>;

    /// Fetches the current balance and status for `address`.
    async fn fetch_account(&self, address: &str) -> Result<AccountSummary, LedgerError>;
}

/// A ledger source resolved from configuration.
#[derive(Clone)]
pub enum AnyLedger {
    Api(TonApi),
    Memory(MemoryLedger),
}

impl AnyLedger {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, LedgerError> {
        if config.use_mock_ledger || config.tonapi_url.eq_ignore_ascii_case("mock") {
            log::info!("🔌 Using the in-memory ledger double. No live chain data will be fetched.");
            return Ok(Self::Memory(MemoryLedger::default()));
        }
        Ok(Self::Api(TonApi::new(&config.tonapi_url, &config.tonapi_key)?))
    }
}

#[async_trait]
impl TonLedger for AnyLedger {
    async fn fetch_recent_events(&self, address: &str, limit: usize) -> Result<Vec<LedgerEvent>, LedgerError> {
        match self {
            Self::Api(api) => api.fetch_recent_events(address, limit).await,
            Self::Memory(mem) => mem.fetch_recent_events(address, limit).await,
        }
    }

    async fn fetch_account(&self, address: &str) -> Result<AccountSummary, LedgerError> {
        match self {
            Self::Api(api) => api.fetch_account(address).await,
            Self::Memory(mem) => mem.fetch_account(address).await,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fetch_limit_is_clamped() {
        assert_eq!(clamp_fetch_limit(0), 50);
        assert_eq!(clamp_fetch_limit(1), 1);
        assert_eq!(clamp_fetch_limit(200), 200);
        assert_eq!(clamp_fetch_limit(5000), 200);
    }
}
