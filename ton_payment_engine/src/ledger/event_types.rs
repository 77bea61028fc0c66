use serde::{Deserialize, Serialize};
use tpn_common::NanoTon;

/// The action type marker for an inbound TON transfer. Providers are not consistent about casing,
/// so all comparisons against this value are case-insensitive.
pub const TRANSFER_ACTION_TYPE: &str = "TonTransfer";
/// The payload type carrying the free-text transfer annotation.
pub const COMMENT_PAYLOAD_TYPE: &str = "comment";

//--------------------------------------    LedgerAction     ---------------------------------------------------------
/// One normalized action within a ledger event.
///
/// `amount` is an integer nanoTon string (e.g. `"3000000000"` for 3 TON). An empty amount means
/// the adapter could not establish that the action moves funds; consumers treat such actions as
/// "not a transfer" and skip them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAction {
    pub action_type: String,
    pub amount: String,
    pub sender: String,
    pub recipient: String,
    pub comment: String,
}

impl LedgerAction {
    pub fn is_transfer(&self) -> bool {
        self.action_type.eq_ignore_ascii_case(TRANSFER_ACTION_TYPE) && !self.amount.is_empty()
    }
}

//--------------------------------------     LedgerEvent     ---------------------------------------------------------
/// The adapter's normalized view of one external ledger event. Transient: recomputed on every
/// fetch and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_id: String,
    pub timestamp: Option<i64>,
    pub actions: Vec<LedgerAction>,
}

//--------------------------------------    AccountSummary    --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub balance: NanoTon,
    pub status: String,
}
