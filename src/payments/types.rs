//! Payment request, receipt and error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Reason recorded in the ledger when the breaker refuses a request.
pub const REJECTION_REASON: &str = "Circuit breaker open";

/// A charge requested by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Proof of a successful charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeReceipt {
    pub success: bool,
    pub transaction_id: Uuid,
    pub amount: f64,
    pub currency: Option<String>,
}

impl ChargeReceipt {
    pub fn for_request(request: &PaymentRequest) -> Self {
        Self {
            success: true,
            transaction_id: Uuid::new_v4(),
            amount: request.amount,
            currency: request.currency.clone(),
        }
    }
}

/// A single failed call to the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Caller-visible payment failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// The circuit is open; the provider was not called.
    #[error("Payment service temporarily unavailable (circuit breaker open).")]
    CircuitOpen,

    /// Every attempt failed; carries the last provider message.
    #[error("{reason}")]
    Failed { reason: String },
}

impl PaymentError {
    /// Stable machine-readable category.
    pub fn category(&self) -> &'static str {
        match self {
            PaymentError::CircuitOpen => "service_unavailable",
            PaymentError::Failed { .. } => "payment_failed",
        }
    }
}
