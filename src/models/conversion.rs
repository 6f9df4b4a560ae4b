use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

pub const MIN_AIRTIME_AMOUNT: i64 = 20;
pub const MAX_AIRTIME_AMOUNT: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Safaricom,
    Airtel,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Safaricom => "safaricom",
            Network::Airtel => "airtel",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "safaricom" => Ok(Network::Safaricom),
            "airtel" => Ok(Network::Airtel),
            other => Err(AppError::validation(format!(
                "Network must be either safaricom or airtel, got: {}",
                other
            ))),
        }
    }

    pub fn wallet_name(&self) -> &'static str {
        match self {
            Network::Safaricom => "M-Pesa",
            Network::Airtel => "Airtel Money",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "processing" => Ok(RequestStatus::Processing),
            "completed" => Ok(RequestStatus::Completed),
            "failed" => Ok(RequestStatus::Failed),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(AppError::validation(format!("Unknown status: {}", other))),
        }
    }

    /// Legal forward edges of the request lifecycle. `Failed -> Processing`
    /// is the admin retry edge; everything else is one-way.
    pub fn can_transition_to(&self, to: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub reference_code: String,
    pub phone_number: String,
    pub network: Network,
    pub airtime_amount: i64,
    pub payout_amount: i64,
    pub conversion_rate: f64,
    pub status: RequestStatus,
    pub airtime_received: bool,
    pub payout_sent: bool,
    pub payout_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Vec<String>,
}

impl ConversionRequest {
    pub fn new(phone_number: &str, airtime_amount: i64, conversion_rate: f64, network: Network) -> Result<Self> {
        let phone_number = normalize_phone(phone_number)?;

        if !(MIN_AIRTIME_AMOUNT..=MAX_AIRTIME_AMOUNT).contains(&airtime_amount) {
            return Err(AppError::validation(format!(
                "Amount must be between KES {} and KES {}",
                MIN_AIRTIME_AMOUNT, MAX_AIRTIME_AMOUNT
            )));
        }

        if !(0.5..=1.0).contains(&conversion_rate) {
            return Err(AppError::validation(
                "Invalid conversion rate: must be between 0.5 and 1.0",
            ));
        }

        let payout_amount = payout_amount(airtime_amount, conversion_rate);
        if payout_amount >= airtime_amount {
            return Err(AppError::validation("Payout amount must be less than airtime amount"));
        }

        let now = Utc::now();
        Ok(ConversionRequest {
            id: Some(ObjectId::new()),
            reference_code: generate_reference_code(),
            phone_number,
            network,
            airtime_amount,
            payout_amount,
            conversion_rate,
            status: RequestStatus::Pending,
            airtime_received: false,
            payout_sent: false,
            payout_transaction_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            notes: Vec::new(),
        })
    }
}

pub fn payout_amount(airtime_amount: i64, conversion_rate: f64) -> i64 {
    (airtime_amount as f64 * conversion_rate).floor() as i64
}

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a unique, human-shareable reference code: `AC-<base36 millis>-<4 random>`.
/// The user quotes this as the billing reference when sending airtime.
pub fn generate_reference_code() -> String {
    let mut millis = Utc::now().timestamp_millis() as u64;
    let mut stamp = Vec::new();
    while millis > 0 {
        stamp.push(BASE36[(millis % 36) as usize]);
        millis /= 36;
    }
    stamp.reverse();

    let mut rng = rand::thread_rng();
    let random: String = (0..4).map(|_| BASE36[rng.gen_range(0..36)] as char).collect();

    format!("AC-{}-{}", String::from_utf8_lossy(&stamp), random)
}

/// Validate a Kenyan mobile number and normalize it to `+254...` form.
/// Accepts `+2547XXXXXXXX`, `2547XXXXXXXX` and `07XXXXXXXX` (also `1` prefixes).
pub fn normalize_phone(phone: &str) -> Result<String> {
    let phone = phone.trim();

    fn valid_subscriber(rest: &str) -> bool {
        rest.len() == 9
            && (rest.starts_with('7') || rest.starts_with('1'))
            && rest.chars().all(|c| c.is_ascii_digit())
    }

    if let Some(rest) = phone.strip_prefix("+254") {
        if valid_subscriber(rest) {
            return Ok(phone.to_string());
        }
    }
    if let Some(rest) = phone.strip_prefix("254") {
        if valid_subscriber(rest) {
            return Ok(format!("+254{}", rest));
        }
    }
    if let Some(rest) = phone.strip_prefix('0') {
        if valid_subscriber(rest) {
            return Ok(format!("+254{}", rest));
        }
    }

    Err(AppError::validation(format!("Invalid Kenyan phone number: {}", phone)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payout_is_floored_and_below_airtime() {
        assert_eq!(payout_amount(100, 0.75), 75);
        assert_eq!(payout_amount(99, 0.75), 74);
        assert_eq!(payout_amount(21, 0.7), 14);

        for amount in MIN_AIRTIME_AMOUNT..=MAX_AIRTIME_AMOUNT {
            for rate in [0.5, 0.7, 0.75, 0.9, 0.99] {
                let payout = payout_amount(amount, rate);
                assert_eq!(payout, (amount as f64 * rate).floor() as i64);
                assert!(payout < amount, "payout {} >= airtime {} at rate {}", payout, amount, rate);
            }
        }
    }

    #[test]
    fn rate_of_one_is_rejected_because_payout_must_shrink() {
        let err = ConversionRequest::new("+254712345678", 100, 1.0, Network::Safaricom);
        assert!(err.is_err());
    }

    #[test]
    fn new_request_starts_pending() {
        let req = ConversionRequest::new("0712345678", 100, 0.75, Network::Safaricom).unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.phone_number, "+254712345678");
        assert_eq!(req.payout_amount, 75);
        assert!(!req.airtime_received);
        assert!(!req.payout_sent);
        assert!(req.payout_transaction_id.is_none());
        assert!(req.completed_at.is_none());
    }

    #[test]
    fn amount_bounds_enforced() {
        assert!(ConversionRequest::new("0712345678", 19, 0.75, Network::Safaricom).is_err());
        assert!(ConversionRequest::new("0712345678", 1001, 0.75, Network::Safaricom).is_err());
        assert!(ConversionRequest::new("0712345678", 20, 0.75, Network::Safaricom).is_ok());
        assert!(ConversionRequest::new("0712345678", 1000, 0.75, Network::Safaricom).is_ok());
    }

    #[test]
    fn rate_bounds_enforced() {
        assert!(ConversionRequest::new("0712345678", 100, 0.49, Network::Safaricom).is_err());
        assert!(ConversionRequest::new("0712345678", 100, 1.01, Network::Safaricom).is_err());
        assert!(ConversionRequest::new("0712345678", 100, 0.5, Network::Safaricom).is_ok());
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_phone("+254712345678").unwrap(), "+254712345678");
        assert_eq!(normalize_phone("254712345678").unwrap(), "+254712345678");
        assert_eq!(normalize_phone("0712345678").unwrap(), "+254712345678");
        assert_eq!(normalize_phone("0112345678").unwrap(), "+254112345678");
        assert!(normalize_phone("0812345678").is_err());
        assert!(normalize_phone("071234567").is_err());
        assert!(normalize_phone("07123456789").is_err());
        assert!(normalize_phone("+25571234567").is_err());
        assert!(normalize_phone("not-a-number").is_err());
    }

    #[test]
    fn reference_code_format() {
        let code = generate_reference_code();
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "AC");
        assert!(!parts[1].is_empty());
        assert_eq!(parts[2].len(), 4);
        assert!(parts[1..]
            .iter()
            .all(|p| p.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())));
    }

    #[test]
    fn legal_transitions_only() {
        use RequestStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Cancelled));

        // No shortcuts into a terminal state.
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Cancelled.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Cancelled));
    }
}
