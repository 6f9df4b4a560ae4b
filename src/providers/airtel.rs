// providers/airtel.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info};

use crate::config::AirtelConfig;
use crate::engine::dispatcher::{DisbursementOutcome, PayoutProvider};
use crate::errors::{AppError, Result};
use crate::models::conversion::Network;

/// Airtel Money disbursement gateway. Unlike Safaricom's flat numeric
/// ResponseCode, Airtel nests its success signal under `status.code` as a
/// string and returns the transaction id under `data.transaction.id`.
#[derive(Clone)]
pub struct AirtelGateway {
    config: AirtelConfig,
    client: Client,
    cached_token: Arc<RwLock<Option<(String, DateTime<Utc>)>>>,
}

impl AirtelGateway {
    pub fn new(config: AirtelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(AirtelGateway {
            config,
            client,
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Airtel wants the local subscriber number without +254 or leading zero.
    fn format_phone_number(phone: &str) -> String {
        let phone = phone.trim();
        if let Some(rest) = phone.strip_prefix("+254") {
            return rest.to_string();
        }
        if let Some(rest) = phone.strip_prefix("254") {
            return rest.to_string();
        }
        if let Some(rest) = phone.strip_prefix('0') {
            return rest.to_string();
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

        info!("Requesting new Airtel Money access token");
        let response = self
            .client
            .post(self.config.auth_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "*/*")
            .json(&json!({
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
                "grant_type": "client_credentials",
            }))
            .send()
            .await
            .map_err(|e| AppError::provider(format!("Airtel auth request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::provider(format!("Airtel auth response malformed: {}", e)))?;

        if !status.is_success() {
            let message = body.get("message").and_then(Value::as_str).unwrap_or("Unknown error");
            return Err(AppError::provider(format!("Airtel auth failed: {}", message)));
        }

        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::provider("Airtel auth response missing access_token"))?
            .to_string();

        {
            let expiry = Utc::now() + chrono::Duration::hours(1);
            let mut cached = self
                .cached_token
                .write()
                .map_err(|_| AppError::provider("Token cache poisoned"))?;
            *cached = Some((token.clone(), expiry));
        }

        Ok(token)
    }

    async fn request_payout(&self, phone_number: &str, amount: i64, reference: &str) -> Result<Value> {
        let access_token = self.access_token().await?;
        let formatted_phone = Self::format_phone_number(phone_number);

        let payload = json!({
            "reference": reference,
            "subscriber": {
                "country": "KE",
                "currency": "KES",
                "msisdn": formatted_phone,
            },
            "transaction": {
                "amount": amount,
                "country": "KE",
                "currency": "KES",
                "id": reference,
            },
        });

        let response = self
            .client
            .post(self.config.disbursement_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "*/*")
            .header("X-Country", "KE")
            .header("X-Currency", "KES")
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::provider(format!("Airtel disbursement request failed: {}", e)))?;

        response
            .json()
            .await
            .map_err(|e| AppError::provider(format!("Airtel disbursement response malformed: {}", e)))
    }

    fn interpret_outcome(body: &Value) -> DisbursementOutcome {
        let code = body
            .get("status")
            .and_then(|status| status.get("code"))
            .and_then(Value::as_str);

        if code == Some("200") {
            let transaction_id = body
                .get("data")
                .and_then(|data| data.get("transaction"))
                .and_then(|transaction| transaction.get("id"))
                .and_then(Value::as_str);
            match transaction_id {
                Some(id) => DisbursementOutcome::success(id),
                None => DisbursementOutcome::failure("Airtel disbursement accepted without a transaction id"),
            }
        } else {
            let message = body
                .get("status")
                .and_then(|status| status.get("message"))
                .or_else(|| body.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            DisbursementOutcome::failure(format!("Airtel disbursement failed: {}", message))
        }
    }
}

#[async_trait]
impl PayoutProvider for AirtelGateway {
    fn network(&self) -> Network {
        Network::Airtel
    }

    async fn send_payout(&self, phone_number: &str, amount: i64, reference: &str) -> DisbursementOutcome {
        info!("Airtel: sending KES {} to {} for {}", amount, phone_number, reference);

        match self.request_payout(phone_number, amount, reference).await {
            Ok(body) => Self::interpret_outcome(&body),
            Err(err) => {
                error!("Airtel payout error for {}: {}", reference, err);
                DisbursementOutcome::failure(err.to_string())
            }
        }
    }
}
