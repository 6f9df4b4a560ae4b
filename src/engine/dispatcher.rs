use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::models::conversion::{ConversionRequest, Network};

/// Definite result of one payout attempt. Providers fold every transport
/// fault, HTTP error and provider-reported failure into `Failure` so the
/// registry always has a transition to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisbursementOutcome {
    Success { transaction_id: String },
    Failure { reason: String },
}

impl DisbursementOutcome {
    pub fn success(transaction_id: impl Into<String>) -> Self {
        DisbursementOutcome::Success {
            transaction_id: transaction_id.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        DisbursementOutcome::Failure { reason: reason.into() }
    }
}

/// One mobile-money network's payout operation. Each implementation
/// interprets its own success signal (numeric ResponseCode, nested status
/// string) and must never return a transport error past this boundary.
#[async_trait]
pub trait PayoutProvider: Send + Sync {
    fn network(&self) -> Network;

    async fn send_payout(&self, phone_number: &str, amount: i64, reference: &str) -> DisbursementOutcome;
}

/// Routes a payout to the provider matching the request's network.
pub struct Dispatcher {
    providers: HashMap<Network, Arc<dyn PayoutProvider>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            providers: HashMap::new(),
        }
    }

    pub fn register(mut self, provider: Arc<dyn PayoutProvider>) -> Self {
        self.providers.insert(provider.network(), provider);
        self
    }

    pub async fn dispatch(&self, request: &ConversionRequest) -> DisbursementOutcome {
        let provider = match self.providers.get(&request.network) {
            Some(provider) => provider,
            None => {
                error!(
                    "No payout provider configured for {} (request {})",
                    request.network.as_str(),
                    request.reference_code
                );
                return DisbursementOutcome::failure(format!(
                    "No payout provider configured for {}",
                    request.network.as_str()
                ));
            }
        };

        info!(
            "Dispatching {} payout of KES {} to {} for {}",
            request.network.as_str(),
            request.payout_amount,
            request.phone_number,
            request.reference_code
        );

        provider
            .send_payout(&request.phone_number, request.payout_amount, &request.reference_code)
            .await
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider {
        network: Network,
        outcome: DisbursementOutcome,
    }

    #[async_trait]
    impl PayoutProvider for StaticProvider {
        fn network(&self) -> Network {
            self.network
        }

        async fn send_payout(&self, _phone: &str, _amount: i64, _reference: &str) -> DisbursementOutcome {
            self.outcome.clone()
        }
    }

    #[tokio::test]
    async fn routes_by_network() {
        let dispatcher = Dispatcher::new()
            .register(Arc::new(StaticProvider {
                network: Network::Safaricom,
                outcome: DisbursementOutcome::success("MPX1"),
            }))
            .register(Arc::new(StaticProvider {
                network: Network::Airtel,
                outcome: DisbursementOutcome::success("AIR1"),
            }));

        let safaricom = ConversionRequest::new("0712345678", 100, 0.75, Network::Safaricom).unwrap();
        let airtel = ConversionRequest::new("0712345678", 100, 0.7, Network::Airtel).unwrap();

        assert_eq!(dispatcher.dispatch(&safaricom).await, DisbursementOutcome::success("MPX1"));
        assert_eq!(dispatcher.dispatch(&airtel).await, DisbursementOutcome::success("AIR1"));
    }

    #[tokio::test]
    async fn missing_provider_is_a_failure_not_an_error() {
        let dispatcher = Dispatcher::new();
        let request = ConversionRequest::new("0712345678", 100, 0.75, Network::Safaricom).unwrap();
        match dispatcher.dispatch(&request).await {
            DisbursementOutcome::Failure { reason } => assert!(reason.contains("safaricom")),
            other => panic!("expected Failure, got {:?}", other),
        }
    }
}
