//! Live TonAPI REST adapter.
//!
//! The provider represents a transfer action inconsistently: fields may sit flat on the action
//! object, or nested inside a type-named sub-object, amounts may be numeric or string literals,
//! and addresses may be bare strings or `{"address": …}` objects. Normalization therefore runs an
//! ordered list of extraction strategies, each filling only the fields that are still missing.
use std::time::Duration;

use async_trait::async_trait;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
};
use serde::Deserialize;
use serde_json::Value;
use tpn_common::{NanoTon, Secret};

use super::{
    clamp_fetch_limit,
    AccountSummary,
    LedgerAction,
    LedgerError,
    LedgerEvent,
    TonLedger,
    COMMENT_PAYLOAD_TYPE,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Candidate keys for the nested transfer sub-object, probed in priority order.
const NESTED_TRANSFER_KEYS: [&str; 4] = ["TonTransfer", "ton_transfer", "transfer", "tonTransfer"];

#[derive(Clone)]
pub struct TonApi {
    base: String,
    client: Client,
}

impl TonApi {
    pub fn new(base_url: &str, api_key: &Secret) -> Result<Self, LedgerError> {
        let mut headers = HeaderMap::new();
        if !api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", api_key.reveal()))
                .map_err(|e| LedgerError::Initialization(e.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Initialization(e.to_string()))?;
        Ok(Self { base: base_url.trim_end_matches('/').to_string(), client })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, LedgerError> {
        trace!("🔌 GET {url}");
        let response = self.client.get(url).send().await.map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("🔌 TonAPI returned {status} for {url}");
            return Err(LedgerError::ApiStatus { status: status.as_u16(), body });
        }
        response.json::<T>().await.map_err(|e| LedgerError::BadResponse(e.to_string()))
    }
}

#[async_trait]
impl TonLedger for TonApi {
    async fn fetch_recent_events(&self, address: &str, limit: usize) -> Result<Vec<LedgerEvent>, LedgerError> {
        let limit = clamp_fetch_limit(limit);
        let url = format!("{}/v2/accounts/{}/events?limit={limit}", self.base, address.trim());
        let raw: RawEventsResponse = self.get_json(&url).await?;
        let events = raw.events.into_iter().map(normalize_event).collect();
        Ok(events)
    }

    async fn fetch_account(&self, address: &str) -> Result<AccountSummary, LedgerError> {
        let url = format!("{}/v2/accounts/{}", self.base, address.trim());
        let raw: RawAccountResponse = self.get_json(&url).await?;
        Ok(AccountSummary { balance: NanoTon::from(raw.balance), status: raw.status })
    }
}

//--------------------------------------   Raw wire shapes    --------------------------------------------------------

#[derive(Deserialize)]
struct RawEventsResponse {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    event_id: String,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    actions: Vec<Value>,
}

#[derive(Deserialize)]
struct RawAccountResponse {
    #[serde(default)]
    balance: i64,
    #[serde(default)]
    status: String,
}

//--------------------------------------    Normalization     --------------------------------------------------------

/// Partial transfer details accumulated across extraction strategies. Strategies only fill fields
/// that are still empty, so earlier (higher-priority) strategies win.
#[derive(Default)]
struct TransferFields {
    amount: String,
    sender: String,
    recipient: String,
    comment: String,
}

impl TransferFields {
    fn is_complete(&self) -> bool {
        !self.amount.is_empty() && !self.sender.is_empty() && !self.recipient.is_empty() && !self.comment.is_empty()
    }
}

/// The ordered extraction strategies. Each inspects the raw action value and fills any
/// still-missing fields.
const EXTRACTORS: [fn(&Value, &mut TransferFields); 3] =
    [take_flat_fields, take_named_transfer, take_any_transfer_like];

fn normalize_event(raw: RawEvent) -> LedgerEvent {
    let actions = raw.actions.iter().map(normalize_action).collect();
    LedgerEvent { event_id: raw.event_id, timestamp: raw.timestamp, actions }
}

fn normalize_action(raw: &Value) -> LedgerAction {
    let action_type = raw.get("type").and_then(Value::as_str).unwrap_or_default().to_string();
    let mut fields = TransferFields::default();
    for extract in EXTRACTORS {
        if fields.is_complete() {
            break;
        }
        extract(raw, &mut fields);
    }
    // An action with no discoverable amount is left with an empty amount; the matcher treats it
    // as "not a transfer" and skips it.
    LedgerAction {
        action_type,
        amount: fields.amount,
        sender: fields.sender,
        recipient: fields.recipient,
        comment: fields.comment,
    }
}

/// Strategy 1: the provider put the transfer fields flat on the action object.
fn take_flat_fields(raw: &Value, fields: &mut TransferFields) {
    fill_transfer_fields(raw, fields);
}

/// Strategy 2: the transfer details live in a type-named sub-object. The candidate keys are
/// probed in a fixed priority order and only the first present object is used.
fn take_named_transfer(raw: &Value, fields: &mut TransferFields) {
    for key in NESTED_TRANSFER_KEYS {
        if let Some(nested) = raw.get(key).filter(|v| v.is_object()) {
            fill_transfer_fields(nested, fields);
            return;
        }
    }
}

/// Strategy 3: last resort. Scan the remaining nested objects and use the first one that carries
/// an amount, whatever its key is called.
fn take_any_transfer_like(raw: &Value, fields: &mut TransferFields) {
    if !fields.amount.is_empty() {
        return;
    }
    let Some(map) = raw.as_object() else { return };
    for (key, nested) in map {
        if matches!(key.as_str(), "type" | "amount" | "recipient" | "sender" | "payload" | "comment") {
            continue;
        }
        if !nested.is_object() {
            continue;
        }
        if amount_of(nested.get("amount")).is_empty() && amount_of(nested.get("value")).is_empty() {
            continue;
        }
        fill_transfer_fields(nested, fields);
        return;
    }
}

/// Fills any still-missing fields from one candidate object, accepting the field aliases the
/// provider is known to use.
fn fill_transfer_fields(candidate: &Value, fields: &mut TransferFields) {
    if fields.amount.is_empty() {
        fields.amount = amount_of(candidate.get("amount"));
        if fields.amount.is_empty() {
            fields.amount = amount_of(candidate.get("value"));
        }
    }
    if fields.recipient.is_empty() {
        fields.recipient = address_of(candidate.get("recipient"));
        if fields.recipient.is_empty() {
            fields.recipient = address_of(candidate.get("destination"));
        }
    }
    if fields.sender.is_empty() {
        fields.sender = address_of(candidate.get("sender"));
        if fields.sender.is_empty() {
            fields.sender = address_of(candidate.get("source"));
        }
    }
    if fields.comment.is_empty() {
        fields.comment = comment_of(candidate);
    }
}

/// An amount may be a string literal or a bare number.
fn amount_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// An address may be a bare string or an object with an `address` field.
fn address_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Object(obj)) => obj.get("address").and_then(Value::as_str).unwrap_or_default().trim().to_string(),
        _ => String::new(),
    }
}

/// A free-text annotation appears either as `payload.text`/`comment.text` when the sub-object's
/// type is "comment", or as a bare `comment` string field.
fn comment_of(candidate: &Value) -> String {
    for key in ["payload", "comment"] {
        match candidate.get(key) {
            Some(Value::Object(obj)) => {
                let payload_type = obj.get("type").and_then(Value::as_str).unwrap_or_default();
                if payload_type.eq_ignore_ascii_case(COMMENT_PAYLOAD_TYPE) {
                    if let Some(text) = obj.get("text").and_then(Value::as_str) {
                        return text.to_string();
                    }
                }
            },
            Some(Value::String(s)) if key == "comment" => return s.clone(),
            _ => {},
        }
    }
    String::new()
}
