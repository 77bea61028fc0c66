//! Message payloads and topics flowing through the outbox.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request topic: an upstream service asks for a payment intent.
pub const TOPIC_INTENT_CREATE: &str = "pay.intent.create";
/// Fact topic: an intent exists. Keyed by the order id.
pub const TOPIC_INTENT_CREATED: &str = "pay.intent.created";
/// Fact topic: a qualifying transfer was observed. Keyed by the transaction.
pub const TOPIC_PAYMENT_CONFIRMED: &str = "pay.payment.confirmed";

/// The idempotency key for a confirmation, derived from the underlying transaction so that
/// duplicate confirmations for the same transfer collapse to one durable record.
pub fn confirmation_key(tx_id: &str) -> String {
    format!("tx:{tx_id}")
}

//--------------------------------------  IntentCreateRequest  -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentCreateRequest {
    /// The order identifier. Must be a UUID; anything else is rejected, never coerced.
    pub order_id: String,
    #[serde(default)]
    pub amount_ton: Option<String>,
    #[serde(default)]
    pub ttl_sec: Option<i64>,
    // Upstream correlation ids, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blogger_id: Option<i64>,
}

//--------------------------------------    IntentCreated     --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentCreated {
    pub order_id: Uuid,
    pub intent_id: Uuid,
    pub merchant_address: String,
    pub ton_comment: String,
    pub amount_ton: String,
    pub expires_at: DateTime<Utc>,
}

//--------------------------------------   PaymentConfirmed   --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmed {
    pub order_id: Uuid,
    pub intent_id: Uuid,
    pub tx_id: String,
    pub amount_ton: String,
    pub ton_comment: String,
    pub from_address: String,
    pub confirmed_at: DateTime<Utc>,
}
