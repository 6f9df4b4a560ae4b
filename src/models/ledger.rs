use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::models::conversion::Network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Collection,
    Disbursement,
    DisbursementTimeout,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Collection => "collection",
            TransactionKind::Disbursement => "disbursement",
            TransactionKind::DisbursementTimeout => "disbursement_timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Completed,
    Failed,
    Timeout,
}

/// Canonical form every provider webhook is normalized into. Downstream code
/// never looks at provider-specific fields again.
#[derive(Debug, Clone)]
pub struct InboundPaymentEvent {
    pub provider: Network,
    pub kind: TransactionKind,
    pub external_transaction_id: String,
    pub phone_number: String,
    pub amount: f64,
    pub reference: Option<String>,
    pub outcome: EventOutcome,
    pub raw_payload: serde_json::Value,
}

/// Durable, append-only record of one external transaction. Immutable after
/// insertion except for the one-time `conversion_request_id` back-reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub provider: Network,
    pub transaction_kind: TransactionKind,
    pub external_transaction_id: String,
    pub phone_number: String,
    pub amount: f64,
    pub reference: Option<String>,
    pub outcome: EventOutcome,
    pub raw_payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub conversion_request_id: Option<ObjectId>,
}

impl LedgerEntry {
    pub fn from_event(event: &InboundPaymentEvent) -> Self {
        LedgerEntry {
            id: Some(ObjectId::new()),
            provider: event.provider,
            transaction_kind: event.kind,
            external_transaction_id: event.external_transaction_id.clone(),
            phone_number: event.phone_number.clone(),
            amount: event.amount,
            reference: event.reference.clone(),
            outcome: event.outcome,
            raw_payload: event.raw_payload.clone(),
            received_at: Utc::now(),
            conversion_request_id: None,
        }
    }

    /// The idempotency key: one row per distinct external transaction.
    pub fn dedup_key(&self) -> (Network, TransactionKind, &str) {
        (self.provider, self.transaction_kind, self.external_transaction_id.as_str())
    }
}
