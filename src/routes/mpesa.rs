use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::handlers::mpesa_handlers;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        // Health
        .route("/health", get(mpesa_health))
        // C2B: users sending airtime to our paybill
        .route("/c2b/validation", post(mpesa_handlers::c2b_validation))
        .route("/c2b/confirmation", post(mpesa_handlers::c2b_confirmation))
        // B2C: async payout outcomes
        .route("/b2c/result", post(mpesa_handlers::b2c_result))
        .route("/b2c/timeout", post(mpesa_handlers::b2c_timeout))
}

async fn mpesa_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "mpesa",
        "timestamp": Utc::now().to_rfc3339(),
        "features": ["c2b-confirmation", "b2c-result", "b2c-timeout"]
    }))
}
