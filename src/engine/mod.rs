//! Conversion reconciliation engine: ties the ledger, the request state
//! machine, the matcher and the dispatcher together. Webhook handlers and
//! admin routes call in here; nothing in this module knows about HTTP.

use std::sync::Arc;

use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use tracing::{error, info, warn};

use crate::errors::{AppError, Result};
use crate::models::conversion::{ConversionRequest, Network, RequestStatus};
use crate::models::ledger::{EventOutcome, InboundPaymentEvent, LedgerEntry, TransactionKind};
use crate::store::{StatusUpdate, Store};

pub mod dispatcher;
pub mod matcher;

use dispatcher::{Dispatcher, DisbursementOutcome};
use matcher::MatchResult;

/// What ingesting a collection webhook did, for handler logging. The webhook
/// acknowledgment is the same in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionIngest {
    /// Ledger already had this external transaction id; nothing else ran.
    Duplicate,
    /// Recorded for audit only: failed collection, missing/unknown reference
    /// or network disagreement.
    RecordedOnly,
    /// Reference matched but the paid amount differs; request untouched.
    AmountMismatch,
    /// Matched, dispatched and the payout went through.
    Paid,
    /// Matched and dispatched but the payout failed; request is `Failed`.
    PayoutFailed,
}

/// Everything the create endpoint needs to tell the user.
#[derive(Debug)]
pub struct CreatedConversion {
    pub request: ConversionRequest,
    pub receive_number: String,
}

pub struct ConversionEngine {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
}

impl ConversionEngine {
    pub fn new(store: Arc<dyn Store>, dispatcher: Dispatcher) -> Self {
        ConversionEngine { store, dispatcher }
    }

    /// Create a pending conversion request. Rates and receive numbers come
    /// from `system_settings`; a missing receive number is a config fault.
    pub async fn create_request(&self, phone_number: &str, airtime_amount: i64, network: Network) -> Result<CreatedConversion> {
        let (rate_key, default_rate, receive_key) = match network {
            Network::Safaricom => ("default_conversion_rate", 0.75, "airtime_receive_number"),
            Network::Airtel => ("airtel_conversion_rate", 0.70, "airtel_receive_number"),
        };

        let conversion_rate = match self.store.setting(rate_key).await? {
            Some(value) => value.parse::<f64>().map_err(|_| {
                AppError::configuration(format!("Setting {} is not a number: {}", rate_key, value))
            })?,
            None => default_rate,
        };

        let receive_number = self
            .store
            .setting(receive_key)
            .await?
            .ok_or_else(|| AppError::configuration(format!("System setting {} not found", receive_key)))?;

        let request = ConversionRequest::new(phone_number, airtime_amount, conversion_rate, network)?;
        self.store.insert_request(&request).await?;

        info!(
            "Created conversion {}: KES {} airtime -> KES {} via {}",
            request.reference_code,
            request.airtime_amount,
            request.payout_amount,
            network.as_str()
        );

        Ok(CreatedConversion { request, receive_number })
    }

    /// Drive one inbound collection event through the pipeline: idempotent
    /// ledger insert, reference matching, `Pending -> Processing`, payout
    /// dispatch and the final transition.
    pub async fn ingest_collection(&self, event: InboundPaymentEvent) -> Result<CollectionIngest> {
        let (_, is_new) = self.store.record(LedgerEntry::from_event(&event)).await?;
        if !is_new {
            info!(
                "Duplicate {} collection {} ignored",
                event.provider.as_str(),
                event.external_transaction_id
            );
            return Ok(CollectionIngest::Duplicate);
        }

        if event.outcome != EventOutcome::Completed {
            info!(
                "{} collection {} arrived with non-success outcome, recorded only",
                event.provider.as_str(),
                event.external_transaction_id
            );
            return Ok(CollectionIngest::RecordedOnly);
        }

        let request = match matcher::match_collection(self.store.as_ref(), &event).await? {
            MatchResult::NoReferenceFound => {
                info!(
                    "No conversion request matches collection {} (reference {:?})",
                    event.external_transaction_id, event.reference
                );
                return Ok(CollectionIngest::RecordedOnly);
            }
            MatchResult::AmountMismatch(request) => {
                warn!(
                    "Amount mismatch for {}: expected KES {}, got KES {}",
                    request.reference_code, request.airtime_amount, event.amount
                );
                return Ok(CollectionIngest::AmountMismatch);
            }
            MatchResult::Matched(request) => request,
        };

        let request_id = request_id(&request)?;

        // Compare-and-set gate: exactly one delivery wins this transition,
        // so at most one payout is ever dispatched per request.
        let request = self
            .store
            .transition(
                request_id,
                RequestStatus::Pending,
                StatusUpdate::to(RequestStatus::Processing)
                    .airtime_received(true)
                    .note(format!(
                        "Airtime received via {}: {}",
                        request.network.wallet_name(),
                        event.external_transaction_id
                    )),
            )
            .await?;

        self.store
            .link_entry(event.provider, event.kind, &event.external_transaction_id, request_id)
            .await?;

        let settled = self.settle(request).await?;
        Ok(match settled.status {
            RequestStatus::Completed => CollectionIngest::Paid,
            _ => CollectionIngest::PayoutFailed,
        })
    }

    /// Dispatch the payout for a request already in `Processing` and apply
    /// the resulting transition. Shared by the primary flow and retries.
    async fn settle(&self, request: ConversionRequest) -> Result<ConversionRequest> {
        let request_id = request_id(&request)?;

        match self.dispatcher.dispatch(&request).await {
            DisbursementOutcome::Success { transaction_id } => {
                info!("Payout for {} succeeded: {}", request.reference_code, transaction_id);
                self.store
                    .transition(
                        request_id,
                        RequestStatus::Processing,
                        StatusUpdate::to(RequestStatus::Completed)
                            .payout_sent(true)
                            .payout_transaction_id(transaction_id.clone())
                            .completed_at(Utc::now())
                            .note(format!("Payout sent: {}", transaction_id)),
                    )
                    .await
            }
            DisbursementOutcome::Failure { reason } => {
                error!("Payout for {} failed: {}", request.reference_code, reason);
                self.store
                    .transition(
                        request_id,
                        RequestStatus::Processing,
                        StatusUpdate::to(RequestStatus::Failed).note(format!("Disbursement failed: {}", reason)),
                    )
                    .await
            }
        }
    }

    /// Record an asynchronous disbursement result or queue-timeout event.
    /// These carry no reliable correlation back to a request, so they are
    /// ledger-only; the synchronous dispatch path already settled the state.
    pub async fn ingest_disbursement(&self, event: InboundPaymentEvent) -> Result<bool> {
        let (_, is_new) = self.store.record(LedgerEntry::from_event(&event)).await?;
        if !is_new {
            info!(
                "Duplicate {} {} event {} ignored",
                event.provider.as_str(),
                event.kind.as_str(),
                event.external_transaction_id
            );
        } else if event.kind == TransactionKind::DisbursementTimeout {
            warn!("Disbursement timed out upstream: {}", event.external_transaction_id);
        }
        Ok(is_new)
    }

    pub async fn status_by_reference(&self, reference: &str) -> Result<ConversionRequest> {
        self.store
            .request_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Conversion request {} not found", reference)))
    }

    pub async fn list_requests(&self, status: Option<RequestStatus>, limit: usize) -> Result<Vec<ConversionRequest>> {
        self.store.list_requests(status, limit).await
    }

    /// Admin retry of a failed payout: re-enter the pipeline at the dispatch
    /// step. The `Failed -> Processing` compare-and-set is the re-check that
    /// keeps two racing retries from double-dispatching.
    pub async fn retry(&self, id: ObjectId) -> Result<ConversionRequest> {
        let request = self
            .store
            .request_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Conversion request {} not found", id.to_hex())))?;

        if request.status != RequestStatus::Failed {
            return Err(AppError::InvalidState(format!(
                "Conversion request {} is {}, only failed requests can be retried",
                id.to_hex(),
                request.status.as_str()
            )));
        }

        let request = self
            .store
            .transition(
                id,
                RequestStatus::Failed,
                StatusUpdate::to(RequestStatus::Processing).note("Admin retry initiated"),
            )
            .await?;

        self.settle(request).await
    }

    /// Administrative cancellation, reachable only from `Pending` or
    /// `Processing` (e.g. when a user gets blocked).
    pub async fn cancel(&self, id: ObjectId, reason: &str) -> Result<ConversionRequest> {
        let request = self
            .store
            .request_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Conversion request {} not found", id.to_hex())))?;

        if !matches!(request.status, RequestStatus::Pending | RequestStatus::Processing) {
            return Err(AppError::InvalidState(format!(
                "Conversion request {} is {}, cannot cancel",
                id.to_hex(),
                request.status.as_str()
            )));
        }

        self.store
            .transition(
                id,
                request.status,
                StatusUpdate::to(RequestStatus::Cancelled).note(format!("Cancelled: {}", reason)),
            )
            .await
    }

}

fn request_id(request: &ConversionRequest) -> Result<ObjectId> {
    request
        .id
        .ok_or_else(|| AppError::validation(format!("Request {} has no id", request.reference_code)))
}
