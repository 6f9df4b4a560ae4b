use crate::errors::Result;
use crate::models::conversion::ConversionRequest;
use crate::models::ledger::InboundPaymentEvent;
use crate::store::Store;

/// Outcome of reconciling an inbound collection against pending requests.
/// Only `Matched` may drive a state transition; the other two leave the
/// request (if any) untouched and the ledger row unlinked.
#[derive(Debug)]
pub enum MatchResult {
    Matched(ConversionRequest),
    AmountMismatch(ConversionRequest),
    NoReferenceFound,
}

/// Look up the billing reference against `reference_code`. The event's
/// network and the request's network must agree; a Safaricom payment never
/// settles an Airtel request, and that disagreement reads as "no reference".
pub async fn match_collection(store: &dyn Store, event: &InboundPaymentEvent) -> Result<MatchResult> {
    let reference = match &event.reference {
        Some(reference) => reference,
        None => return Ok(MatchResult::NoReferenceFound),
    };

    let request = match store.request_by_reference(reference).await? {
        Some(request) => request,
        None => return Ok(MatchResult::NoReferenceFound),
    };

    if request.network != event.provider {
        return Ok(MatchResult::NoReferenceFound);
    }

    // Exact match only; partial payments never progress a request.
    if event.amount == request.airtime_amount as f64 {
        Ok(MatchResult::Matched(request))
    } else {
        Ok(MatchResult::AmountMismatch(request))
    }
}
