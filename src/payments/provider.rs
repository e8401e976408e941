//! Payment provider seam.
//!
//! The gateway only needs `charge`; retries and circuit breaking live on
//! the gateway side, never in a provider.

use async_trait::async_trait;
use rand::Rng;

use crate::config::ProviderConfig;
use crate::payments::types::{ChargeReceipt, PaymentRequest, ProviderError};

/// Message returned by [`SimulatedProvider`] on failure.
pub const PROVIDER_FAILURE: &str = "Payment failed due to provider error.";

/// External payment dependency.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn charge(&self, request: &PaymentRequest) -> Result<ChargeReceipt, ProviderError>;
}

/// Stand-in provider that fails a fixed fraction of charges at random.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    failure_rate: f64,
}

impl SimulatedProvider {
    /// `failure_rate` is clamped to [0, 1].
    pub fn new(failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        Self { failure_rate }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(config.failure_rate)
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default())
    }
}

#[async_trait]
impl PaymentProvider for SimulatedProvider {
    async fn charge(&self, request: &PaymentRequest) -> Result<ChargeReceipt, ProviderError> {
        let failed = rand::thread_rng().gen_bool(self.failure_rate);
        if failed {
            tracing::debug!(amount = request.amount, "Simulated provider failure");
            return Err(ProviderError::new(PROVIDER_FAILURE));
        }
        Ok(ChargeReceipt::for_request(request))
    }
}
