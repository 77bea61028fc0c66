//! Payment intents and the in-process intent registry.
//!
//! An intent records what a merchant expects to see on-chain for one order. The registry is a
//! plain in-memory map guarded by a read/write lock: many concurrent readers on the request
//! path, exclusive writers on create and sweep. It is local to one process and deliberately
//! non-durable — a restart loses unconfirmed intents, which is an accepted limitation of the
//! synchronous creation path, not a bug. Expiry is lazy: a read past `expires_at` behaves as
//! "not found", and a periodic sweep deletes expired entries opportunistically.
use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Duration, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_INTENT_TTL: Duration = Duration::minutes(20);
/// Zero TON at the on-chain scale. Used when an intent does not specify a minimum amount.
pub const ZERO_TON: &str = "0.000000000";

/// Derives the deterministic on-chain transfer annotation for an order: separators stripped,
/// uppercased, last six characters, prefixed with `ORD-`.
///
/// Two different order ids collide only with the residual probability of the truncated
/// six-character suffix (16⁻⁶ for UUID hex). That risk is documented, not worked around.
pub fn order_code(order_id: &Uuid) -> String {
    let clean = order_id.to_string().replace('-', "").to_uppercase();
    let tail = &clean[clean.len().saturating_sub(6)..];
    format!("ORD-{tail}")
}

//--------------------------------------    PaymentIntent     --------------------------------------------------------
/// An expected payment for one order. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub merchant_address: String,
    /// The ORD-code the payer must include as the transfer comment.
    pub match_comment: String,
    /// Minimum acceptable amount, scale-9 decimal string.
    pub min_amount: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PaymentIntent {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry, clamped at zero.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

//--------------------------------------     IntentStore      --------------------------------------------------------
pub struct IntentStore {
    intents: RwLock<HashMap<Uuid, PaymentIntent>>,
    merchant_address: String,
    default_ttl: Duration,
}

impl IntentStore {
    /// A non-positive `default_ttl` falls back to 20 minutes.
    pub fn new<S: Into<String>>(merchant_address: S, default_ttl: Duration) -> Self {
        let default_ttl = if default_ttl <= Duration::zero() { DEFAULT_INTENT_TTL } else { default_ttl };
        Self {
            intents: RwLock::new(HashMap::new()),
            merchant_address: merchant_address.into().trim().to_string(),
            default_ttl,
        }
    }

    pub fn merchant_address(&self) -> &str {
        &self.merchant_address
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Creates and registers a new intent for `order_id`. A blank amount defaults to zero TON; a
    /// non-positive `ttl` falls back to the store default.
    pub fn create(&self, order_id: Uuid, min_amount: &str, ttl: Duration) -> PaymentIntent {
        let ttl = if ttl <= Duration::zero() { self.default_ttl } else { ttl };
        let min_amount = min_amount.trim();
        let min_amount = if min_amount.is_empty() { ZERO_TON.to_string() } else { min_amount.to_string() };
        let now = Utc::now();
        let intent = PaymentIntent {
            id: Uuid::new_v4(),
            order_id,
            merchant_address: self.merchant_address.clone(),
            match_comment: order_code(&order_id),
            min_amount,
            created_at: now,
            expires_at: now + ttl,
        };
        self.write().insert(intent.id, intent.clone());
        debug!("🗂️ Intent {} registered for order {} (expires {})", intent.id, order_id, intent.expires_at);
        intent
    }

    /// Fetches an intent by id. Expired intents behave as "not found" even before the sweep has
    /// removed them.
    pub fn get(&self, id: &Uuid) -> Option<PaymentIntent> {
        let intent = self.read().get(id).cloned()?;
        if intent.is_expired(Utc::now()) {
            return None;
        }
        Some(intent)
    }

    /// Deletes all expired intents. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut intents = self.write();
        let before = intents.len();
        intents.retain(|_, intent| !intent.is_expired(now));
        let removed = before - intents.len();
        if removed > 0 {
            debug!("🗂️ Swept {removed} expired intent(s)");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, PaymentIntent>> {
        self.intents.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, PaymentIntent>> {
        self.intents.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_code_is_deterministic_and_uppercased() {
        let order_id = Uuid::parse_str("2c340a3e-91ee-4d67-9cd2-19a700ab12cd").unwrap();
        assert_eq!(order_code(&order_id), "ORD-AB12CD");
        assert_eq!(order_code(&order_id), "ORD-AB12CD");
    }

    #[test]
    fn different_orders_get_different_codes() {
        let a = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let b = Uuid::parse_str("00000000-0000-0000-0000-000000000002").unwrap();
        assert_ne!(order_code(&a), order_code(&b));
    }

    #[test]
    fn create_applies_defaults() {
        let store = IntentStore::new("EQ_MERCHANT", Duration::zero());
        let intent = store.create(Uuid::new_v4(), "  ", Duration::zero());
        assert_eq!(intent.min_amount, ZERO_TON);
        assert_eq!(intent.merchant_address, "EQ_MERCHANT");
        assert_eq!(intent.expires_at, intent.created_at + DEFAULT_INTENT_TTL);
        assert!(intent.match_comment.starts_with("ORD-"));
        assert_eq!(store.get(&intent.id), Some(intent));
    }

    #[test]
    fn expired_intent_reads_as_not_found() {
        let store = IntentStore::new("EQ_MERCHANT", Duration::minutes(20));
        let intent = store.create(Uuid::new_v4(), "1.0", Duration::milliseconds(-1));
        // negative ttl falls back to the default, so fabricate expiry by direct construction
        assert!(store.get(&intent.id).is_some());

        let expired = PaymentIntent { expires_at: Utc::now() - Duration::seconds(1), ..intent.clone() };
        store.write().insert(expired.id, expired.clone());
        assert_eq!(store.get(&expired.id), None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.sweep_expired(), 1);
        assert!(store.is_empty());
    }
}
