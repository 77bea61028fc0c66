//! Environment-driven pipeline configuration.
//!
//! Loaded once at process start and handed to constructors by value — no component reads the
//! environment after this point.
use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use tpn_common::{parse_boolean_flag, Secret};

use crate::{
    intents::DEFAULT_INTENT_TTL,
    processor::{DEFAULT_CLAIM_TICK, DEFAULT_MAX_WATCHERS, DEFAULT_WATCHER_TICK},
};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/ton_payments.db";
pub const DEFAULT_TONAPI_URL: &str = "https://tonapi.io";

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// The merchant wallet every intent pays into. When blank, intent processing rejects every
    /// message until it is configured.
    pub merchant_address: String,
    pub database_url: String,
    pub tonapi_url: String,
    pub tonapi_key: Secret,
    /// When true, the in-memory ledger double replaces the live TonAPI adapter.
    pub use_mock_ledger: bool,
    pub default_ttl: Duration,
    /// System-wide cap on concurrently running watchers.
    pub max_watchers: usize,
    pub claim_tick: StdDuration,
    pub watcher_tick: StdDuration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            merchant_address: String::new(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            tonapi_url: DEFAULT_TONAPI_URL.to_string(),
            tonapi_key: Secret::default(),
            use_mock_ledger: false,
            default_ttl: DEFAULT_INTENT_TTL,
            max_watchers: DEFAULT_MAX_WATCHERS,
            claim_tick: DEFAULT_CLAIM_TICK,
            watcher_tick: DEFAULT_WATCHER_TICK,
        }
    }
}

impl PipelineConfig {
    pub fn from_env_or_default() -> Self {
        let merchant_address = env::var("TPE_MERCHANT_ADDRESS").map(|s| s.trim().to_string()).unwrap_or_else(|_| {
            warn!(
                "TPE_MERCHANT_ADDRESS is not set. Intent processing will reject every message until it is \
                 configured."
            );
            String::new()
        });
        let database_url = env::var("TPE_DATABASE_URL").unwrap_or_else(|_| {
            info!("TPE_DATABASE_URL is not set. Using the default.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let tonapi_url = env::var("TPE_TONAPI_URL").unwrap_or_else(|_| DEFAULT_TONAPI_URL.to_string());
        let tonapi_key = Secret::new(env::var("TPE_TONAPI_KEY").unwrap_or_default());
        let use_mock_ledger = parse_boolean_flag(env::var("TPE_USE_MOCK_LEDGER").ok(), false);
        let default_ttl = env::var("TPE_DEFAULT_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::seconds)
            .unwrap_or(DEFAULT_INTENT_TTL);
        let max_watchers = env::var("TPE_MAX_WATCHERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_WATCHERS);
        let claim_tick = tick_from_env("TPE_CLAIM_TICK_MS", DEFAULT_CLAIM_TICK);
        let watcher_tick = tick_from_env("TPE_WATCHER_TICK_MS", DEFAULT_WATCHER_TICK);
        Self {
            merchant_address,
            database_url,
            tonapi_url,
            tonapi_key,
            use_mock_ledger,
            default_ttl,
            max_watchers,
            claim_tick,
            watcher_tick,
        }
    }
}

/// Reads a millisecond tick override. Zero or unparsable values select the default.
fn tick_from_env(var: &str, default: StdDuration) -> StdDuration {
    env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(StdDuration::from_millis)
        .unwrap_or(default)
}
