use async_trait::async_trait;
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};
use crate::models::conversion::{ConversionRequest, Network, RequestStatus};
use crate::models::ledger::{LedgerEntry, TransactionKind};
use crate::store::{ensure_legal_transition, StatusUpdate, Store};

pub const REQUESTS_COLLECTION: &str = "conversion_requests";
pub const LEDGER_COLLECTION: &str = "ledger_entries";
pub const SETTINGS_COLLECTION: &str = "system_settings";

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemSetting {
    pub setting_key: String,
    pub setting_value: String,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        MongoStore { db }
    }

    fn requests(&self) -> Collection<ConversionRequest> {
        self.db.collection(REQUESTS_COLLECTION)
    }

    fn ledger(&self) -> Collection<LedgerEntry> {
        self.db.collection(LEDGER_COLLECTION)
    }

    fn settings(&self) -> Collection<SystemSetting> {
        self.db.collection(SETTINGS_COLLECTION)
    }

    fn ledger_key_filter(provider: Network, kind: TransactionKind, external_transaction_id: &str) -> Document {
        doc! {
            "provider": provider.as_str(),
            "transaction_kind": kind.as_str(),
            "external_transaction_id": external_transaction_id,
        }
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) if write_error.code == 11000
    )
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_request(&self, request: &ConversionRequest) -> Result<()> {
        self.requests().insert_one(request).await?;
        Ok(())
    }

    async fn request_by_id(&self, id: ObjectId) -> Result<Option<ConversionRequest>> {
        Ok(self.requests().find_one(doc! { "_id": id }).await?)
    }

    async fn request_by_reference(&self, reference: &str) -> Result<Option<ConversionRequest>> {
        Ok(self.requests().find_one(doc! { "reference_code": reference }).await?)
    }

    async fn list_requests(&self, status: Option<RequestStatus>, limit: usize) -> Result<Vec<ConversionRequest>> {
        let mut filter = doc! {};
        if let Some(status) = status {
            filter.insert("status", status.as_str());
        }

        let cursor = self.requests().find(filter).await?;
        let mut requests: Vec<ConversionRequest> = cursor.try_collect().await?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests.truncate(limit);
        Ok(requests)
    }

    async fn transition(&self, id: ObjectId, from: RequestStatus, update: StatusUpdate) -> Result<ConversionRequest> {
        ensure_legal_transition(from, update.to)?;

        let mut set = doc! {
            "status": update.to.as_str(),
            "updated_at": Utc::now().to_rfc3339(),
        };
        if let Some(received) = update.airtime_received {
            set.insert("airtime_received", received);
        }
        if let Some(sent) = update.payout_sent {
            set.insert("payout_sent", sent);
        }
        if let Some(transaction_id) = &update.payout_transaction_id {
            set.insert("payout_transaction_id", transaction_id);
        }
        if let Some(completed_at) = update.completed_at {
            set.insert("completed_at", completed_at.to_rfc3339());
        }

        let mut update_doc = doc! { "$set": set };
        if let Some(note) = &update.note {
            update_doc.insert("$push", doc! { "notes": note });
        }

        // The status filter is the compare-and-set: a concurrent transition
        // that got there first makes this update match nothing.
        let filter = doc! { "_id": id, "status": from.as_str() };
        let updated = self
            .requests()
            .find_one_and_update(filter, update_doc)
            .return_document(ReturnDocument::After)
            .await?;

        match updated {
            Some(request) => Ok(request),
            None => match self.request_by_id(id).await? {
                Some(current) => Err(AppError::conflict(format!(
                    "Request {} is {} (expected {})",
                    id.to_hex(),
                    current.status.as_str(),
                    from.as_str()
                ))),
                None => Err(AppError::not_found(format!("Conversion request {} not found", id.to_hex()))),
            },
        }
    }

    async fn record(&self, entry: LedgerEntry) -> Result<(LedgerEntry, bool)> {
        // The unique index on the dedup key makes this a single atomic
        // insert-if-absent; no read-then-write window.
        match self.ledger().insert_one(&entry).await {
            Ok(_) => Ok((entry, true)),
            Err(err) if is_duplicate_key(&err) => {
                let filter =
                    Self::ledger_key_filter(entry.provider, entry.transaction_kind, &entry.external_transaction_id);
                let existing = self.ledger().find_one(filter).await?.ok_or_else(|| {
                    AppError::conflict(format!(
                        "Ledger entry {} vanished after duplicate-key insert",
                        entry.external_transaction_id
                    ))
                })?;
                Ok((existing, false))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn link_entry(
        &self,
        provider: Network,
        kind: TransactionKind,
        external_transaction_id: &str,
        request_id: ObjectId,
    ) -> Result<()> {
        let mut filter = Self::ledger_key_filter(provider, kind, external_transaction_id);
        filter.insert(
            "$or",
            vec![
                doc! { "conversion_request_id": Bson::Null },
                doc! { "conversion_request_id": request_id },
            ],
        );

        let result = self
            .ledger()
            .update_one(filter, doc! { "$set": { "conversion_request_id": request_id } })
            .await?;

        if result.matched_count == 0 {
            let exists = self
                .ledger()
                .find_one(Self::ledger_key_filter(provider, kind, external_transaction_id))
                .await?;
            return match exists {
                Some(entry) => Err(AppError::conflict(format!(
                    "Ledger entry {} already linked to request {:?}",
                    external_transaction_id, entry.conversion_request_id
                ))),
                None => Err(AppError::not_found(format!(
                    "Ledger entry {} not found",
                    external_transaction_id
                ))),
            };
        }
        Ok(())
    }

    async fn setting(&self, key: &str) -> Result<Option<String>> {
        let setting = self.settings().find_one(doc! { "setting_key": key }).await?;
        Ok(setting.map(|s| s.setting_value))
    }
}
