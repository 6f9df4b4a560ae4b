// handlers/airtel_handlers.rs
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::models::webhooks::AirtelCallback;
use crate::state::AppState;

/// Airtel Money collection callback. Failed collections (`status != "TS"`)
/// are recorded for audit but never matched to a request.
pub async fn airtel_callback(State(state): State<AppState>, Json(payload): Json<Value>) -> impl IntoResponse {
    info!("Airtel callback received: {}", payload);

    let callback: AirtelCallback = match serde_json::from_value(payload.clone()) {
        Ok(callback) => callback,
        Err(err) => {
            error!("Airtel callback has unexpected shape: {}", err);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Missing required fields" })),
            );
        }
    };

    let event = match callback.normalize(payload) {
        Ok(event) => event,
        Err(err) => {
            error!("Airtel callback failed validation: {}", err);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Missing required fields" })),
            );
        }
    };

    match state.engine.ingest_collection(event).await {
        Ok(outcome) => info!("Airtel callback processed: {:?}", outcome),
        // Internal failures are recorded on the request, not surfaced.
        Err(err) => error!("Airtel callback processing error: {}", err),
    }

    (
        StatusCode::OK,
        Json(json!({ "message": "Callback processed successfully" })),
    )
}
