// providers/mpesa.rs
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info};

use crate::config::MpesaConfig;
use crate::engine::dispatcher::{DisbursementOutcome, PayoutProvider};
use crate::errors::{AppError, Result};
use crate::models::conversion::Network;

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct B2cRequest {
    #[serde(rename = "InitiatorName")]
    initiator_name: String,
    #[serde(rename = "SecurityCredential")]
    security_credential: String,
    #[serde(rename = "CommandID")]
    command_id: String,
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "PartyA")]
    party_a: String,
    #[serde(rename = "PartyB")]
    party_b: String,
    #[serde(rename = "Remarks")]
    remarks: String,
    #[serde(rename = "QueueTimeOutURL")]
    queue_timeout_url: String,
    #[serde(rename = "ResultURL")]
    result_url: String,
    #[serde(rename = "Occasion")]
    occasion: String,
}

/// Safaricom M-Pesa B2C gateway. Payouts go out as BusinessPayment
/// requests; the synchronous acknowledgment carries the success signal
/// (`ResponseCode == "0"`), the final receipt arrives on the result webhook.
#[derive(Clone)]
pub struct MpesaGateway {
    config: MpesaConfig,
    client: Client,
    cached_token: Arc<RwLock<Option<(String, DateTime<Utc>)>>>,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(MpesaGateway {
            config,
            client,
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    fn format_phone_number(phone: &str) -> String {
        let phone = phone.trim();
        if let Some(rest) = phone.strip_prefix('+') {
            return rest.to_string();
        }
        if let Some(rest) = phone.strip_prefix('0') {
            return format!("254{}", rest);
        }
        phone.to_string()
    }

    pub async fn access_token(&self) -> Result<String> {
        {
            let cached = self
                .cached_token
                .read()
                .map_err(|_| AppError::provider("Token cache poisoned"))?;
            if let Some((token, expiry)) = cached.as_ref() {
                if *expiry > Utc::now() + chrono::Duration::minutes(5) {
                    return Ok(token.clone());
                }
            }
        }

        info!("Requesting new M-Pesa access token");
        let auth_string = format!("{}:{}", self.config.consumer_key, self.config.consumer_secret);
        let encoded_auth = base64.encode(auth_string);

        let response = self
            .client
            .get(self.config.auth_url())
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .send()
            .await
            .map_err(|e| AppError::provider(format!("M-Pesa auth request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::provider(format!("M-Pesa auth failed: {}", status)));
        }

        let auth_response: AuthResponse = response
            .json()
            .await
            .map_err(|e| AppError::provider(format!("M-Pesa auth response malformed: {}", e)))?;

        {
            let expiry = Utc::now() + chrono::Duration::hours(1);
            let mut cached = self
                .cached_token
                .write()
                .map_err(|_| AppError::provider("Token cache poisoned"))?;
            *cached = Some((auth_response.access_token.clone(), expiry));
        }

        Ok(auth_response.access_token)
    }

    async fn request_payout(&self, phone_number: &str, amount: i64, reference: &str) -> Result<Value> {
        let access_token = self.access_token().await?;
        let formatted_phone = Self::format_phone_number(phone_number);

        let b2c_request = B2cRequest {
            initiator_name: self.config.initiator_name.clone(),
            security_credential: self.config.security_credential.clone(),
            command_id: "BusinessPayment".to_string(),
            amount,
            party_a: self.config.short_code.clone(),
            party_b: formatted_phone,
            remarks: format!("Airtime conversion payout - {}", reference),
            queue_timeout_url: self.config.b2c_timeout_url.clone(),
            result_url: self.config.b2c_result_url.clone(),
            occasion: format!("Conversion {}", reference),
        };

        let response = self
            .client
            .post(self.config.b2c_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&b2c_request)
            .send()
            .await
            .map_err(|e| AppError::provider(format!("B2C request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::provider(format!("B2C response malformed: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::provider(format!("B2C failed: {} - {}", status, body)));
        }
        Ok(body)
    }

    /// Safaricom signals acceptance with a string `ResponseCode` of "0"; the
    /// `ConversationID` is the handle later webhooks refer back to.
    fn interpret_outcome(body: &Value) -> DisbursementOutcome {
        match body.get("ResponseCode").and_then(Value::as_str) {
            Some("0") => match body.get("ConversationID").and_then(Value::as_str) {
                Some(conversation_id) => DisbursementOutcome::success(conversation_id),
                None => DisbursementOutcome::failure("B2C accepted without a ConversationID"),
            },
            _ => {
                let description = body
                    .get("ResponseDescription")
                    .or_else(|| body.get("errorMessage"))
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error");
                DisbursementOutcome::failure(format!("B2C rejected: {}", description))
            }
        }
    }
}

#[async_trait]
impl PayoutProvider for MpesaGateway {
    fn network(&self) -> Network {
        Network::Safaricom
    }

    async fn send_payout(&self, phone_number: &str, amount: i64, reference: &str) -> DisbursementOutcome {
        info!("B2C: sending KES {} to {} for {}", amount, phone_number, reference);

        match self.request_payout(phone_number, amount, reference).await {
            Ok(body) => Self::interpret_outcome(&body),
            Err(err) => {
                error!("B2C payout error for {}: {}", reference, err);
                DisbursementOutcome::failure(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepted_response_maps_to_success() {
        let body = json!({
            "ConversationID": "AG_20250101_000012345",
            "OriginatorConversationID": "10571-7910404-1",
            "ResponseCode": "0",
            "ResponseDescription": "Accept the service request successfully."
        });
        assert_eq!(
            MpesaGateway::interpret_outcome(&body),
            DisbursementOutcome::success("AG_20250101_000012345")
        );
    }

    #[test]
    fn rejection_and_error_bodies_map_to_failure() {
        let body = json!({
            "ResponseCode": "1",
            "ResponseDescription": "Insufficient funds"
        });
        match MpesaGateway::interpret_outcome(&body) {
            DisbursementOutcome::Failure { reason } => assert!(reason.contains("Insufficient funds")),
            other => panic!("expected Failure, got {:?}", other),
        }

        let body = json!({
            "requestId": "x",
            "errorCode": "401.002.01",
            "errorMessage": "Invalid Access Token"
        });
        match MpesaGateway::interpret_outcome(&body) {
            DisbursementOutcome::Failure { reason } => assert!(reason.contains("Invalid Access Token")),
            other => panic!("expected Failure, got {:?}", other),
        }
    }

    #[test]
    fn phone_formatting_for_b2c() {
        assert_eq!(MpesaGateway::format_phone_number("+254712345678"), "254712345678");
        assert_eq!(MpesaGateway::format_phone_number("0712345678"), "254712345678");
        assert_eq!(MpesaGateway::format_phone_number("254712345678"), "254712345678");
    }
}
