// handlers/conversion_handlers.rs
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::errors::Result;
use crate::models::conversion::{ConversionRequest, Network};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversionRequest {
    pub phone_number: String,
    pub airtime_amount: i64,
    #[serde(default = "default_network")]
    pub network: String,
}

fn default_network() -> String {
    "safaricom".to_string()
}

pub fn conversion_json(request: &ConversionRequest) -> Value {
    json!({
        "id": request.id.map(|id| id.to_hex()),
        "reference": request.reference_code,
        "status": request.status.as_str(),
        "phoneNumber": request.phone_number,
        "network": request.network.as_str(),
        "airtimeAmount": request.airtime_amount,
        "payoutAmount": request.payout_amount,
        "conversionRate": request.conversion_rate,
        "airtimeReceived": request.airtime_received,
        "payoutSent": request.payout_sent,
        "payoutTransactionId": request.payout_transaction_id,
        "createdAt": request.created_at.to_rfc3339(),
        "updatedAt": request.updated_at.to_rfc3339(),
        "completedAt": request.completed_at.map(|at| at.to_rfc3339()),
        "notes": request.notes,
    })
}

pub async fn create_conversion(
    State(state): State<AppState>,
    Json(payload): Json<CreateConversionRequest>,
) -> Result<Json<Value>> {
    info!(
        "Create conversion: {} KES {} via {}",
        payload.phone_number, payload.airtime_amount, payload.network
    );

    let network = Network::parse(&payload.network)?;
    let created = state
        .engine
        .create_request(&payload.phone_number, payload.airtime_amount, network)
        .await?;
    let request = &created.request;

    Ok(Json(json!({
        "success": true,
        "data": {
            "reference": request.reference_code,
            "phoneNumber": request.phone_number,
            "airtimeAmount": request.airtime_amount,
            "payoutAmount": request.payout_amount,
            "conversionRate": request.conversion_rate,
            "network": request.network.as_str(),
            "airtimeReceiveNumber": created.receive_number,
            "instructions": {
                "step1": "Confirm your details above",
                "step2": format!(
                    "Send exactly KES {} {} airtime to {}",
                    request.airtime_amount,
                    request.network.as_str(),
                    created.receive_number
                ),
                "step3": format!(
                    "You will receive KES {} via {} within 5 minutes",
                    request.payout_amount,
                    request.network.wallet_name()
                ),
            },
        },
    })))
}

pub async fn get_conversion_status(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<Value>> {
    let request = state.engine.status_by_reference(&reference).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "reference": request.reference_code,
            "status": request.status.as_str(),
            "phoneNumber": request.phone_number,
            "network": request.network.as_str(),
            "airtimeAmount": request.airtime_amount,
            "payoutAmount": request.payout_amount,
            "airtimeReceived": request.airtime_received,
            "payoutSent": request.payout_sent,
            "payoutTransactionId": request.payout_transaction_id,
            "createdAt": request.created_at.to_rfc3339(),
            "completedAt": request.completed_at.map(|at| at.to_rfc3339()),
        },
    })))
}
