//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Keep cumulative request, retry and breaker-transition counters
//! - Derive success/failure rates for the metrics endpoint
//! - Mirror every update to the Prometheus recorder when one is installed
//!
//! # Metrics
//! - `payment_requests_total` (counter): requests by outcome (success, failure, rejected)
//! - `payment_retries_total` (counter): provider calls repeated after a failure
//! - `circuit_breaker_transitions_total` (counter): state changes by from/to
//! - `circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//!
//! # Design Decisions
//! - Counters are never windowed and never decrease
//! - One attempt is counted per request, never per provider call
//! - Prometheus updates are no-ops until `init_metrics` installs a recorder

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use serde::{Deserialize, Serialize};

use crate::resilience::{CircuitState, Transition};

/// Cumulative counters for the lifetime of a gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsState {
    total_attempts: u64,
    total_successes: u64,
    total_failures: u64,
    total_retries: u64,
    circuit_transitions: Vec<Transition>,
    last_failure_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of [`MetricsState`] with derived rates.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub total_attempts: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_retries: u64,
    /// Percentage in [0, 100].
    pub success_rate: f64,
    /// Percentage in [0, 100].
    pub failure_rate: f64,
    pub circuit_transitions: Vec<Transition>,
}

impl MetricsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_retry(&mut self) {
        self.total_retries += 1;
        ::metrics::counter!("payment_retries_total").increment(1);
    }

    pub fn record_attempt(&mut self, success: bool, at: DateTime<Utc>) {
        let outcome = if success { "success" } else { "failure" };
        self.count_attempt(success, at, outcome);
    }

    /// Count a request refused by the open circuit as a failed attempt.
    pub fn record_rejection(&mut self, at: DateTime<Utc>) {
        self.count_attempt(false, at, "rejected");
    }

    fn count_attempt(&mut self, success: bool, at: DateTime<Utc>, outcome: &'static str) {
        self.total_attempts += 1;
        if success {
            self.total_successes += 1;
        } else {
            self.total_failures += 1;
            self.last_failure_at = Some(at);
        }
        ::metrics::counter!("payment_requests_total", "outcome" => outcome).increment(1);
    }

    pub fn record_transition(&mut self, from: CircuitState, to: CircuitState, at: DateTime<Utc>) {
        self.circuit_transitions.push(Transition { from, to, at });

        ::metrics::counter!(
            "circuit_breaker_transitions_total",
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
        set_state_gauge(to);
    }

    pub fn total_attempts(&self) -> u64 {
        self.total_attempts
    }

    pub fn total_successes(&self) -> u64 {
        self.total_successes
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries
    }

    pub fn circuit_transitions(&self) -> &[Transition] {
        &self.circuit_transitions
    }

    /// Whether every attempt is accounted for as a success or a failure.
    pub fn is_consistent(&self) -> bool {
        self.total_successes.checked_add(self.total_failures) == Some(self.total_attempts)
    }

    /// When the most recent request failed or was rejected.
    pub fn last_failure_at(&self) -> Option<DateTime<Utc>> {
        self.last_failure_at
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_attempts: self.total_attempts,
            total_successes: self.total_successes,
            total_failures: self.total_failures,
            total_retries: self.total_retries,
            success_rate: percentage(self.total_successes, self.total_attempts),
            failure_rate: percentage(self.total_failures, self.total_attempts),
            circuit_transitions: self.circuit_transitions.clone(),
        }
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn state_gauge(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    }
}

/// Publish the current breaker state on the `circuit_breaker_state` gauge.
pub fn set_state_gauge(state: CircuitState) {
    ::metrics::gauge!("circuit_breaker_state").set(state_gauge(state));
}

/// Install the Prometheus recorder and serve the scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    set_state_gauge(CircuitState::Closed);
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}
