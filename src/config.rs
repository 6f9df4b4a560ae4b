// config.rs
use std::env;

use crate::errors::{AppError, Result};

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| AppError::configuration(format!("{} must be set", key)))
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub admin_token: String,
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(AppConfig {
            database_url: required("DATABASE_URL")?,
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "aircash".to_string()),
            admin_token: required("ADMIN_TOKEN")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .map_err(|_| AppError::configuration("PORT must be a number"))?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub initiator_name: String,
    pub security_credential: String,
    pub b2c_result_url: String,
    pub b2c_timeout_url: String,
    pub environment: String,
}

impl MpesaConfig {
    pub fn from_env() -> Result<Self> {
        Ok(MpesaConfig {
            consumer_key: required("MPESA_CONSUMER_KEY")?,
            consumer_secret: required("MPESA_CONSUMER_SECRET")?,
            short_code: required("MPESA_SHORT_CODE")?,
            initiator_name: required("MPESA_INITIATOR_NAME")?,
            security_credential: required("MPESA_SECURITY_CREDENTIAL")?,
            b2c_result_url: required("MPESA_B2C_RESULT_URL")?,
            b2c_timeout_url: required("MPESA_B2C_QUEUE_TIMEOUT_URL")?,
            environment: env::var("MPESA_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string()),
        })
    }

    fn base_url(&self) -> &'static str {
        if self.environment == "production" {
            "https://api.safaricom.co.ke"
        } else {
            "https://sandbox.safaricom.co.ke"
        }
    }

    pub fn auth_url(&self) -> String {
        format!("{}/oauth/v1/generate?grant_type=client_credentials", self.base_url())
    }

    pub fn b2c_url(&self) -> String {
        format!("{}/mpesa/b2c/v1/paymentrequest", self.base_url())
    }
}

#[derive(Debug, Clone)]
pub struct AirtelConfig {
    pub client_id: String,
    pub client_secret: String,
    pub environment: String,
}

impl AirtelConfig {
    pub fn from_env() -> Result<Self> {
        Ok(AirtelConfig {
            client_id: required("AIRTEL_CLIENT_ID")?,
            client_secret: required("AIRTEL_CLIENT_SECRET")?,
            environment: env::var("AIRTEL_ENVIRONMENT").unwrap_or_else(|_| "staging".to_string()),
        })
    }

    fn base_url(&self) -> &'static str {
        if self.environment == "production" {
            "https://openapi.airtel.africa"
        } else {
            "https://openapiuat.airtel.africa"
        }
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth/oauth2/token", self.base_url())
    }

    pub fn disbursement_url(&self) -> String {
        format!("{}/standard/v1/disbursements/", self.base_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_selects_base_urls() {
        let sandbox = MpesaConfig {
            consumer_key: "k".into(),
            consumer_secret: "s".into(),
            short_code: "600000".into(),
            initiator_name: "api".into(),
            security_credential: "cred".into(),
            b2c_result_url: "https://example.com/api/mpesa/b2c/result".into(),
            b2c_timeout_url: "https://example.com/api/mpesa/b2c/timeout".into(),
            environment: "sandbox".into(),
        };
        assert!(sandbox.auth_url().starts_with("https://sandbox.safaricom.co.ke"));

        let production = MpesaConfig {
            environment: "production".into(),
            ..sandbox
        };
        assert!(production.b2c_url().starts_with("https://api.safaricom.co.ke"));

        let airtel = AirtelConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            environment: "production".into(),
        };
        assert!(airtel.disbursement_url().starts_with("https://openapi.airtel.africa"));
    }
}
