//! Payment gateway service.
//!
//! # Responsibilities
//! - Gate each payment request through the circuit breaker
//! - Call the provider with retries and fixed backoff
//! - Feed one outcome per request to the breaker, then the ledger, then metrics
//! - Answer status, metrics and summary queries from the same state
//!
//! # Design Decisions
//! - Breaker, ledger and metrics share one mutex; every admission and every
//!   outcome is applied under a single lock acquisition
//! - The lock is never held while calling the provider or sleeping
//! - Breaker rejections are recorded as failed requests but never reach
//!   the breaker itself
//! - A probe abandoned mid-flight hands its token back on drop

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::GatewayConfig;
use crate::observability::{
    metrics, summarize, AttemptLedger, AttemptRecord, MetricsSnapshot, MetricsState,
};
use crate::payments::provider::PaymentProvider;
use crate::payments::snapshot::{BreakerSnapshot, GatewaySnapshot};
use crate::payments::types::{
    ChargeReceipt, PaymentError, PaymentRequest, ProviderError, REJECTION_REASON,
};
use crate::resilience::{
    retry_with_backoff, CircuitBreaker, CircuitState, Clock, Permit, RetryPolicy, SystemClock,
};

/// Breaker view returned by the status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayStatus {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure: Option<DateTime<Utc>>,
}

struct GatewayState {
    breaker: CircuitBreaker,
    ledger: AttemptLedger,
    metrics: MetricsState,
}

impl GatewayState {
    fn admit(&mut self, now: DateTime<Utc>) -> Option<Permit> {
        let before = self.breaker.state();
        let permit = self.breaker.can_attempt(now);
        self.note_transition(before, now);
        permit
    }

    fn settle(&mut self, permit: Permit, success: bool, now: DateTime<Utc>) {
        let before = self.breaker.state();
        self.breaker.on_result(permit, success, now);
        self.note_transition(before, now);
    }

    fn note_transition(&mut self, before: CircuitState, now: DateTime<Utc>) {
        let after = self.breaker.state();
        if before != after {
            self.metrics.record_transition(before, after, now);
        }
    }
}

/// Resilient front for a [`PaymentProvider`].
pub struct PaymentGateway {
    provider: Arc<dyn PaymentProvider>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    window: Duration,
    state: Mutex<GatewayState>,
}

impl PaymentGateway {
    /// Create a gateway with a closed breaker and empty history.
    pub fn new(config: &GatewayConfig, provider: Arc<dyn PaymentProvider>) -> Self {
        Self::with_clock(config, provider, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &GatewayConfig,
        provider: Arc<dyn PaymentProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let window = config.history.window();
        Self::assemble(
            config,
            provider,
            clock,
            GatewayState {
                breaker: CircuitBreaker::new(config.breaker),
                ledger: AttemptLedger::new(window),
                metrics: MetricsState::new(),
            },
        )
    }

    /// Create a gateway that continues from a persisted snapshot.
    pub fn restore(
        config: &GatewayConfig,
        provider: Arc<dyn PaymentProvider>,
        clock: Arc<dyn Clock>,
        snapshot: GatewaySnapshot,
    ) -> Self {
        let now = clock.now();
        let breaker = CircuitBreaker::restore(
            config.breaker,
            snapshot.breaker.state,
            snapshot.breaker.failure_count,
            snapshot.breaker.opened_at,
        );
        let ledger = AttemptLedger::restore(config.history.window(), snapshot.ledger, now);
        let metrics = if snapshot.metrics.is_consistent() {
            snapshot.metrics
        } else {
            tracing::warn!(
                total_attempts = snapshot.metrics.total_attempts(),
                total_successes = snapshot.metrics.total_successes(),
                total_failures = snapshot.metrics.total_failures(),
                "Persisted metrics do not add up, resetting counters"
            );
            MetricsState::new()
        };
        metrics::set_state_gauge(breaker.state());

        tracing::info!(
            state = %breaker.state(),
            failure_count = breaker.failure_count(),
            attempts = ledger.retained().count(),
            "Restored gateway state"
        );

        Self::assemble(
            config,
            provider,
            clock,
            GatewayState {
                breaker,
                ledger,
                metrics,
            },
        )
    }

    fn assemble(
        config: &GatewayConfig,
        provider: Arc<dyn PaymentProvider>,
        clock: Arc<dyn Clock>,
        state: GatewayState,
    ) -> Self {
        Self {
            provider,
            clock,
            policy: RetryPolicy::from_config(&config.retries),
            window: config.history.window(),
            state: Mutex::new(state),
        }
    }

    /// Submit a payment.
    ///
    /// Fails fast with [`PaymentError::CircuitOpen`] while the breaker is
    /// open, otherwise calls the provider with retries and returns the
    /// first receipt or the last provider error.
    pub async fn submit(&self, request: PaymentRequest) -> Result<ChargeReceipt, PaymentError> {
        let permit = {
            let now = self.clock.now();
            let mut state = self.lock();
            match state.admit(now) {
                Some(permit) => permit,
                None => {
                    state.ledger.record(false, Some(REJECTION_REASON.to_string()), now);
                    state.metrics.record_rejection(now);
                    drop(state);

                    tracing::warn!(
                        amount = request.amount,
                        "Payment rejected, circuit breaker open"
                    );
                    return Err(PaymentError::CircuitOpen);
                }
            }
        };
        let guard = PermitGuard {
            gateway: self,
            permit,
            armed: true,
        };

        let provider = &*self.provider;
        let charge_request = &request;
        let outcome = retry_with_backoff(
            &self.policy,
            move |_| provider.charge(charge_request),
            |retry, _: &ProviderError| {
                self.lock().metrics.record_retry();
                tracing::debug!(retry, "Retrying payment");
            },
        )
        .await;

        let permit = guard.disarm();
        let success = outcome.result.is_ok();
        {
            let now = self.clock.now();
            let mut state = self.lock();
            state.settle(permit, success, now);
            let error = outcome.result.as_ref().err().map(|e| e.message.clone());
            state.ledger.record(success, error, now);
            state.metrics.record_attempt(success, now);
        }

        let retries = outcome.retries();
        match outcome.result {
            Ok(receipt) => {
                tracing::info!(
                    transaction_id = %receipt.transaction_id,
                    amount = receipt.amount,
                    retries = retries,
                    "Payment succeeded"
                );
                Ok(receipt)
            }
            Err(error) => {
                tracing::error!(
                    amount = request.amount,
                    currency = ?request.currency,
                    source = ?request.source,
                    reason = %error,
                    attempts = outcome.attempts,
                    "Failed transaction"
                );
                Err(PaymentError::Failed {
                    reason: error.message,
                })
            }
        }
    }

    pub fn status(&self) -> GatewayStatus {
        let state = self.lock();
        GatewayStatus {
            state: state.breaker.state(),
            failure_count: state.breaker.failure_count(),
            last_failure: state.metrics.last_failure_at(),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.lock().metrics.snapshot()
    }

    /// Ledger records inside the rolling window.
    pub fn recent_attempts(&self) -> Vec<AttemptRecord> {
        let now = self.clock.now();
        self.lock().ledger.snapshot(now)
    }

    pub fn summary(&self) -> String {
        let now = self.clock.now();
        let (records, breaker_state) = {
            let state = self.lock();
            (state.ledger.snapshot(now), state.breaker.state())
        };
        summarize(&records, breaker_state, now, self.window)
    }

    /// Capture breaker, metrics and ledger for persistence.
    pub fn snapshot(&self) -> GatewaySnapshot {
        let state = self.lock();
        GatewaySnapshot {
            breaker: BreakerSnapshot {
                state: state.breaker.state(),
                failure_count: state.breaker.failure_count(),
                opened_at: state.breaker.opened_at(),
            },
            metrics: state.metrics.clone(),
            ledger: state.ledger.retained().cloned().collect(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns an unsettled probe permit to the breaker if the request future
/// is dropped mid-flight.
struct PermitGuard<'a> {
    gateway: &'a PaymentGateway,
    permit: Permit,
    armed: bool,
}

impl PermitGuard<'_> {
    fn disarm(mut self) -> Permit {
        self.armed = false;
        self.permit
    }
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.permit.is_probe() {
            self.gateway.lock().breaker.release_probe(self.permit);
        }
    }
}
