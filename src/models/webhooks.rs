//! Provider webhook shapes and their normalization into the canonical
//! [`InboundPaymentEvent`]. Shape validation only: required fields present,
//! amount parses as a non-negative number. Business rules live in the engine.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{AppError, Result};
use crate::models::conversion::Network;
use crate::models::ledger::{EventOutcome, InboundPaymentEvent, TransactionKind};

/// Safaricom delivers amounts as either a JSON number or a string.
fn parse_amount(value: &Value) -> Result<f64> {
    let amount = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| AppError::validation("Amount is not a valid number"))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| AppError::validation(format!("Amount is not a valid number: {}", s)))?,
        _ => return Err(AppError::validation("Amount is not a valid number")),
    };

    if amount < 0.0 {
        return Err(AppError::validation("Amount must not be negative"));
    }
    Ok(amount)
}

fn required<T>(field: Option<T>, name: &str) -> Result<T> {
    field.ok_or_else(|| AppError::validation(format!("Missing required field: {}", name)))
}

// M-Pesa C2B confirmation (airtime sent to our paybill)
#[derive(Debug, Deserialize)]
pub struct C2bConfirmation {
    #[serde(rename = "TransID")]
    pub trans_id: Option<String>,

    #[serde(rename = "TransAmount")]
    pub trans_amount: Option<Value>,

    #[serde(rename = "MSISDN")]
    pub msisdn: Option<String>,

    #[serde(rename = "BillRefNumber")]
    pub bill_ref_number: Option<String>,

    #[serde(rename = "TransTime")]
    pub trans_time: Option<String>,

    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: Option<String>,
}

impl C2bConfirmation {
    pub fn normalize(self, raw: Value) -> Result<InboundPaymentEvent> {
        let trans_id = required(self.trans_id, "TransID")?;
        let msisdn = required(self.msisdn, "MSISDN")?;
        let amount = parse_amount(&required(self.trans_amount, "TransAmount")?)?;

        // Empty BillRefNumber means the payer left the reference blank.
        let reference = self.bill_ref_number.filter(|r| !r.trim().is_empty());

        Ok(InboundPaymentEvent {
            provider: Network::Safaricom,
            kind: TransactionKind::Collection,
            external_transaction_id: trans_id,
            phone_number: msisdn,
            amount,
            reference,
            outcome: EventOutcome::Completed,
            raw_payload: raw,
        })
    }
}

// M-Pesa B2C result (async outcome of a disbursement)
#[derive(Debug, Deserialize)]
pub struct B2cResultEnvelope {
    #[serde(rename = "Result")]
    pub result: Option<B2cResult>,
}

#[derive(Debug, Deserialize)]
pub struct B2cResult {
    #[serde(rename = "ResultCode")]
    pub result_code: Option<i64>,

    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,

    #[serde(rename = "ConversationID")]
    pub conversation_id: Option<String>,

    #[serde(rename = "TransactionID")]
    pub transaction_id: Option<String>,

    #[serde(rename = "ResultParameters")]
    pub result_parameters: Option<B2cResultParameters>,
}

#[derive(Debug, Deserialize)]
pub struct B2cResultParameters {
    #[serde(rename = "ResultParameter")]
    pub result_parameter: Vec<B2cResultParameter>,
}

#[derive(Debug, Deserialize)]
pub struct B2cResultParameter {
    #[serde(rename = "Key")]
    pub key: String,

    #[serde(rename = "Value")]
    pub value: Value,
}

impl B2cResultEnvelope {
    pub fn normalize(self, raw: Value) -> Result<InboundPaymentEvent> {
        let result = required(self.result, "Result")?;
        let result_code = required(result.result_code, "ResultCode")?;
        let transaction_id = required(
            result.transaction_id.or(result.conversation_id),
            "TransactionID",
        )?;

        // Receipt, recipient and amount ride in the ResultParameter list.
        let mut phone_number = "unknown".to_string();
        let mut amount = 0.0;
        if let Some(params) = &result.result_parameters {
            for param in &params.result_parameter {
                match param.key.as_str() {
                    "ReceiverPartyPublicName" => {
                        if let Some(v) = param.value.as_str() {
                            phone_number = v.to_string();
                        }
                    }
                    "TransactionAmount" => {
                        if let Ok(v) = parse_amount(&param.value) {
                            amount = v;
                        }
                    }
                    _ => {}
                }
            }
        }

        let outcome = if result_code == 0 {
            EventOutcome::Completed
        } else {
            EventOutcome::Failed
        };

        Ok(InboundPaymentEvent {
            provider: Network::Safaricom,
            kind: TransactionKind::Disbursement,
            external_transaction_id: transaction_id,
            phone_number,
            amount,
            reference: None,
            outcome,
            raw_payload: raw,
        })
    }
}

// M-Pesa B2C queue timeout. Carries no phone number or amount, so it can
// never be correlated back to a request; it is recorded for audit only.
#[derive(Debug, Deserialize)]
pub struct B2cTimeoutEnvelope {
    #[serde(rename = "Result")]
    pub result: Option<B2cTimeoutResult>,
}

#[derive(Debug, Deserialize)]
pub struct B2cTimeoutResult {
    #[serde(rename = "ResultCode")]
    pub result_code: Option<i64>,

    #[serde(rename = "ResultDesc")]
    pub result_desc: Option<String>,

    #[serde(rename = "ConversationID")]
    pub conversation_id: Option<String>,
}

impl B2cTimeoutEnvelope {
    pub fn normalize(self, raw: Value) -> Result<InboundPaymentEvent> {
        let result = required(self.result, "Result")?;
        let conversation_id = required(result.conversation_id, "ConversationID")?;

        Ok(InboundPaymentEvent {
            provider: Network::Safaricom,
            kind: TransactionKind::DisbursementTimeout,
            external_transaction_id: conversation_id,
            phone_number: "unknown".to_string(),
            amount: 0.0,
            reference: None,
            outcome: EventOutcome::Timeout,
            raw_payload: raw,
        })
    }
}

// Airtel Money collection callback
#[derive(Debug, Deserialize)]
pub struct AirtelCallback {
    pub transaction: Option<AirtelTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct AirtelTransaction {
    pub id: Option<String>,
    pub status: Option<String>,
    pub amount: Option<Value>,
    pub reference: Option<String>,
    pub msisdn: Option<String>,
}

impl AirtelCallback {
    pub fn normalize(self, raw: Value) -> Result<InboundPaymentEvent> {
        let transaction = required(self.transaction, "transaction")?;
        let id = required(transaction.id, "transaction.id")?;
        let status = required(transaction.status, "transaction.status")?;
        let msisdn = required(transaction.msisdn, "transaction.msisdn")?;
        let amount = parse_amount(&required(transaction.amount, "transaction.amount")?)?;

        // "TS" = Transaction Successful in Airtel's status vocabulary.
        let outcome = if status == "TS" {
            EventOutcome::Completed
        } else {
            EventOutcome::Failed
        };

        Ok(InboundPaymentEvent {
            provider: Network::Airtel,
            kind: TransactionKind::Collection,
            external_transaction_id: id,
            phone_number: msisdn,
            amount,
            reference: transaction.reference.filter(|r| !r.trim().is_empty()),
            outcome,
            raw_payload: raw,
        })
    }
}
