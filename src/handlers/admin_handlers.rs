// handlers/admin_handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::errors::{AppError, Result};
use crate::handlers::conversion_handlers::conversion_json;
use crate::models::conversion::RequestStatus;
use crate::state::AppState;

/// Bearer-token gate for admin operations. Full session handling lives in
/// front of this service; this token is the service-to-service check.
fn verify_admin(headers: &HeaderMap, state: &AppState) -> Result<()> {
    let token = headers
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "));

    match token {
        Some(token) if token == state.admin_token => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

#[derive(Debug, Deserialize)]
pub struct ConversionListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_conversions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConversionListQuery>,
) -> Result<Json<Value>> {
    verify_admin(&headers, &state)?;

    let status = query.status.as_deref().map(RequestStatus::parse).transpose()?;
    let limit = query.limit.unwrap_or(100).min(500);
    let requests = state.engine.list_requests(status, limit).await?;

    Ok(Json(json!({
        "success": true,
        "count": requests.len(),
        "data": requests.iter().map(conversion_json).collect::<Vec<_>>(),
    })))
}

/// Re-drive a failed payout. `NotFound` and state/concurrency conflicts are
/// surfaced to the caller, unlike on the webhook surface.
pub async fn retry_conversion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    verify_admin(&headers, &state)?;

    let id = ObjectId::parse_str(&id)?;
    info!("Admin retry requested for conversion {}", id.to_hex());

    let request = state.engine.retry(id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Retry completed",
        "data": conversion_json(&request),
    })))
}

#[derive(Debug, Deserialize)]
pub struct CancelConversionRequest {
    pub reason: Option<String>,
}

pub async fn cancel_conversion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Option<Json<CancelConversionRequest>>,
) -> Result<Json<Value>> {
    verify_admin(&headers, &state)?;

    let id = ObjectId::parse_str(&id)?;
    let reason = payload
        .and_then(|Json(payload)| payload.reason)
        .unwrap_or_else(|| "admin action".to_string());
    info!("Admin cancel requested for conversion {}: {}", id.to_hex(), reason);

    let request = state.engine.cancel(id, &reason).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Conversion cancelled",
        "data": conversion_json(&request),
    })))
}
