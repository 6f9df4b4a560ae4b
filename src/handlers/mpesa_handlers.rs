// handlers/mpesa_handlers.rs
//
// Safaricom webhook endpoints. These always respond 200 in Safaricom's
// acknowledgment shape: an engine-internal failure is recorded on the
// conversion request, never echoed back, so Daraja does not enter a retry
// storm over a problem retries cannot fix.
use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::models::webhooks::{B2cResultEnvelope, B2cTimeoutEnvelope, C2bConfirmation};
use crate::state::AppState;

fn ack_ok() -> Json<Value> {
    Json(json!({ "ResultCode": 0, "ResultDesc": "Accepted" }))
}

fn ack_rejected(desc: &str) -> Json<Value> {
    Json(json!({ "ResultCode": 1, "ResultDesc": desc }))
}

/// Safaricom hits this before completing a C2B payment; registration
/// requires it and we accept everything.
pub async fn c2b_validation(Json(payload): Json<Value>) -> Json<Value> {
    info!("C2B validation received: {}", payload);
    ack_ok()
}

pub async fn c2b_confirmation(State(state): State<AppState>, Json(payload): Json<Value>) -> Json<Value> {
    info!("C2B confirmation received: {}", payload);

    let confirmation: C2bConfirmation = match serde_json::from_value(payload.clone()) {
        Ok(confirmation) => confirmation,
        Err(err) => {
            error!("C2B confirmation has unexpected shape: {}", err);
            return ack_rejected("Missing required fields");
        }
    };

    let event = match confirmation.normalize(payload) {
        Ok(event) => event,
        Err(err) => {
            error!("C2B confirmation failed validation: {}", err);
            return ack_rejected("Missing required fields");
        }
    };

    match state.engine.ingest_collection(event).await {
        Ok(outcome) => info!("C2B confirmation processed: {:?}", outcome),
        // Recorded on the request; Safaricom still gets a success ack.
        Err(err) => error!("C2B confirmation processing error: {}", err),
    }

    ack_ok()
}

pub async fn b2c_result(State(state): State<AppState>, Json(payload): Json<Value>) -> Json<Value> {
    info!("B2C result received: {}", payload);

    let envelope: B2cResultEnvelope = match serde_json::from_value(payload.clone()) {
        Ok(envelope) => envelope,
        Err(err) => {
            error!("B2C result has unexpected shape: {}", err);
            return ack_rejected("Missing required fields");
        }
    };

    match envelope.normalize(payload) {
        Ok(event) => {
            if let Err(err) = state.engine.ingest_disbursement(event).await {
                error!("B2C result processing error: {}", err);
            }
        }
        Err(err) => error!("B2C result failed validation: {}", err),
    }

    ack_ok()
}

pub async fn b2c_timeout(State(state): State<AppState>, Json(payload): Json<Value>) -> Json<Value> {
    warn!("B2C timeout received: {}", payload);

    let envelope: B2cTimeoutEnvelope = match serde_json::from_value(payload.clone()) {
        Ok(envelope) => envelope,
        Err(err) => {
            error!("B2C timeout has unexpected shape: {}", err);
            return ack_rejected("Missing required fields");
        }
    };

    match envelope.normalize(payload) {
        Ok(event) => {
            if let Err(err) = state.engine.ingest_disbursement(event).await {
                error!("B2C timeout processing error: {}", err);
            }
        }
        Err(err) => error!("B2C timeout failed validation: {}", err),
    }

    ack_ok()
}
