//! In-memory `Store` used by the engine tests. Mirrors the MongoDB
//! implementation's semantics: atomic insert-if-absent on the ledger key and
//! compare-and-set status transitions, both under one mutex.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;

use crate::errors::{AppError, Result};
use crate::models::conversion::{ConversionRequest, Network, RequestStatus};
use crate::models::ledger::{LedgerEntry, TransactionKind};
use crate::store::{ensure_legal_transition, StatusUpdate, Store};

#[derive(Default)]
struct Inner {
    requests: Vec<ConversionRequest>,
    ledger: Vec<LedgerEntry>,
    settings: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_setting(&self, key: &str, value: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.settings.insert(key.to_string(), value.to_string());
    }

    pub fn with_default_settings() -> Self {
        let store = Self::new();
        store.set_setting("default_conversion_rate", "0.75");
        store.set_setting("airtel_conversion_rate", "0.70");
        store.set_setting("airtime_receive_number", "+254700000000");
        store.set_setting("airtel_receive_number", "+254730000000");
        store
    }

    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.inner.lock().unwrap().ledger.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_request(&self, request: &ConversionRequest) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.requests.iter().any(|r| r.reference_code == request.reference_code) {
            return Err(AppError::conflict(format!(
                "Duplicate reference code {}",
                request.reference_code
            )));
        }
        inner.requests.push(request.clone());
        Ok(())
    }

    async fn request_by_id(&self, id: ObjectId) -> Result<Option<ConversionRequest>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.requests.iter().find(|r| r.id == Some(id)).cloned())
    }

    async fn request_by_reference(&self, reference: &str) -> Result<Option<ConversionRequest>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.requests.iter().find(|r| r.reference_code == reference).cloned())
    }

    async fn list_requests(&self, status: Option<RequestStatus>, limit: usize) -> Result<Vec<ConversionRequest>> {
        let inner = self.inner.lock().unwrap();
        let mut requests: Vec<ConversionRequest> = inner
            .requests
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests.truncate(limit);
        Ok(requests)
    }

    async fn transition(&self, id: ObjectId, from: RequestStatus, update: StatusUpdate) -> Result<ConversionRequest> {
        ensure_legal_transition(from, update.to)?;

        let mut inner = self.inner.lock().unwrap();
        let request = match inner.requests.iter_mut().find(|r| r.id == Some(id)) {
            Some(request) => request,
            None => {
                return Err(AppError::not_found(format!(
                    "Conversion request {} not found",
                    id.to_hex()
                )))
            }
        };

        if request.status != from {
            return Err(AppError::conflict(format!(
                "Request {} is {} (expected {})",
                id.to_hex(),
                request.status.as_str(),
                from.as_str()
            )));
        }

        request.status = update.to;
        request.updated_at = Utc::now();
        if let Some(received) = update.airtime_received {
            request.airtime_received = received;
        }
        if let Some(sent) = update.payout_sent {
            request.payout_sent = sent;
        }
        if let Some(transaction_id) = update.payout_transaction_id {
            request.payout_transaction_id = Some(transaction_id);
        }
        if let Some(completed_at) = update.completed_at {
            request.completed_at = Some(completed_at);
        }
        if let Some(note) = update.note {
            request.notes.push(note);
        }

        Ok(request.clone())
    }

    async fn record(&self, entry: LedgerEntry) -> Result<(LedgerEntry, bool)> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.ledger.iter().find(|e| e.dedup_key() == entry.dedup_key()) {
            return Ok((existing.clone(), false));
        }
        inner.ledger.push(entry.clone());
        Ok((entry, true))
    }

    async fn link_entry(
        &self,
        provider: Network,
        kind: TransactionKind,
        external_transaction_id: &str,
        request_id: ObjectId,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .ledger
            .iter_mut()
            .find(|e| e.dedup_key() == (provider, kind, external_transaction_id))
            .ok_or_else(|| AppError::not_found(format!("Ledger entry {} not found", external_transaction_id)))?;

        match entry.conversion_request_id {
            None => {
                entry.conversion_request_id = Some(request_id);
                Ok(())
            }
            Some(linked) if linked == request_id => Ok(()),
            Some(linked) => Err(AppError::conflict(format!(
                "Ledger entry {} already linked to request {}",
                external_transaction_id,
                linked.to_hex()
            ))),
        }
    }

    async fn setting(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.settings.get(key).cloned())
    }
}
