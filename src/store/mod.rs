use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;

use crate::errors::{AppError, Result};
use crate::models::conversion::{ConversionRequest, Network, RequestStatus};
use crate::models::ledger::{LedgerEntry, TransactionKind};

pub mod mongo;

#[cfg(test)]
pub mod memory;

/// Notes are an audit trail, not a dumping ground; provider error bodies get
/// truncated before they are appended.
pub const MAX_NOTE_LEN: usize = 256;

/// One compare-and-set status transition plus its side effects. The filter on
/// the expected source status is what makes concurrent transitions race-safe.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub to: RequestStatus,
    pub airtime_received: Option<bool>,
    pub payout_sent: Option<bool>,
    pub payout_transaction_id: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl StatusUpdate {
    pub fn to(status: RequestStatus) -> Self {
        StatusUpdate {
            to: status,
            airtime_received: None,
            payout_sent: None,
            payout_transaction_id: None,
            completed_at: None,
            note: None,
        }
    }

    pub fn airtime_received(mut self, value: bool) -> Self {
        self.airtime_received = Some(value);
        self
    }

    pub fn payout_sent(mut self, value: bool) -> Self {
        self.payout_sent = Some(value);
        self
    }

    pub fn payout_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.payout_transaction_id = Some(id.into());
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        let mut note: String = note.into();
        if note.len() > MAX_NOTE_LEN {
            let mut end = MAX_NOTE_LEN;
            while !note.is_char_boundary(end) {
                end -= 1;
            }
            note.truncate(end);
        }
        self.note = Some(note);
        self
    }
}

pub(crate) fn ensure_legal_transition(from: RequestStatus, to: RequestStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::InvalidState(format!(
            "Illegal transition {} -> {}",
            from.as_str(),
            to.as_str()
        )))
    }
}

/// Durable storage seam for the engine. The production implementation is
/// MongoDB; tests run against [`memory::MemoryStore`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_request(&self, request: &ConversionRequest) -> Result<()>;

    async fn request_by_id(&self, id: ObjectId) -> Result<Option<ConversionRequest>>;

    async fn request_by_reference(&self, reference: &str) -> Result<Option<ConversionRequest>>;

    async fn list_requests(&self, status: Option<RequestStatus>, limit: usize) -> Result<Vec<ConversionRequest>>;

    /// Compare-and-set transition: succeeds only if the stored status still
    /// equals `from`, otherwise fails with `ConcurrencyConflict` (or
    /// `NotFound` if the request does not exist). Returns the updated row.
    async fn transition(&self, id: ObjectId, from: RequestStatus, update: StatusUpdate) -> Result<ConversionRequest>;

    /// Idempotent insert keyed by `(provider, transaction_kind,
    /// external_transaction_id)`. Returns the stored row and whether this
    /// call created it. Duplicate webhook deliveries land here and come back
    /// with `is_new = false`.
    async fn record(&self, entry: LedgerEntry) -> Result<(LedgerEntry, bool)>;

    /// One-time back-reference from a ledger row to the request it settled.
    /// Linking twice to the same request is a no-op; relinking to a different
    /// request fails with `ConcurrencyConflict`.
    async fn link_entry(
        &self,
        provider: Network,
        kind: TransactionKind,
        external_transaction_id: &str,
        request_id: ObjectId,
    ) -> Result<()>;

    async fn setting(&self, key: &str) -> Result<Option<String>>;
}
