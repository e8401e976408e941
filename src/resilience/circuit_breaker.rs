//! Circuit breaker for the payment provider.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: provider assumed down, calls fail fast
//! - Half-Open: a single probe call tests whether the provider recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failed requests reach failure_threshold
//! Open → Half-Open: cooldown elapsed (checked when a call asks for admission)
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - Plain state machine; the owner serializes access and supplies the time
//! - Single probe in Half-Open, enforced by a one-shot token
//! - Fail fast in Open state (no waiting)

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BreakerConfig;
use crate::resilience::clock::to_delta;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    /// Lower-case name used by the status endpoint.
    pub fn as_lowercase(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
}

/// Permission to call the provider, handed out by [`CircuitBreaker::can_attempt`].
///
/// The permit must be returned through [`CircuitBreaker::on_result`], or
/// through [`CircuitBreaker::release_probe`] if the call was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    probe: bool,
}

impl Permit {
    /// True when this call is the Half-Open recovery probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

/// Consecutive-failure circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    /// Rebuild a breaker from persisted fields.
    ///
    /// Inconsistent input is repaired rather than rejected: an Open state
    /// without `opened_at` restarts Closed, and a Closed failure count is
    /// kept below the threshold.
    pub fn restore(
        config: BreakerConfig,
        state: CircuitState,
        failure_count: u32,
        opened_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut breaker = Self::new(config);
        match (state, opened_at) {
            (CircuitState::Closed, _) => {
                breaker.failure_count = failure_count.min(breaker.failure_threshold - 1);
            }
            (CircuitState::Open, None) => {
                tracing::warn!("Persisted breaker was open without a timestamp, starting closed");
            }
            (state, opened_at) => {
                breaker.state = state;
                breaker.failure_count = failure_count;
                breaker.opened_at = opened_at;
            }
        }
        breaker
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// Ask for permission to call the provider.
    ///
    /// Returns `None` when the call must be rejected. An Open breaker whose
    /// cooldown has elapsed moves to Half-Open and hands out the probe
    /// permit; while that probe is outstanding every other caller is
    /// rejected.
    pub fn can_attempt(&mut self, now: DateTime<Utc>) -> Option<Permit> {
        match self.state {
            CircuitState::Closed => Some(Permit { probe: false }),
            CircuitState::Open => {
                let opened_at = self.opened_at?;
                if now - opened_at >= to_delta(self.cooldown) {
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = true;
                    tracing::info!("Circuit breaker HALF_OPEN, allowing probe request");
                    Some(Permit { probe: true })
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    None
                } else {
                    self.probe_in_flight = true;
                    Some(Permit { probe: true })
                }
            }
        }
    }

    /// Feed the final outcome of an admitted call.
    pub fn on_result(&mut self, permit: Permit, success: bool, now: DateTime<Utc>) {
        match self.state {
            CircuitState::Closed => {
                if success {
                    self.failure_count = 0;
                } else {
                    self.failure_count += 1;
                    if self.failure_count >= self.failure_threshold {
                        self.trip(now);
                        tracing::warn!(
                            failures = self.failure_count,
                            "Circuit breaker OPENED"
                        );
                    }
                }
            }
            CircuitState::HalfOpen if permit.probe => {
                self.probe_in_flight = false;
                if success {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    self.opened_at = None;
                    tracing::info!("Circuit breaker CLOSED after successful test request");
                } else {
                    self.trip(now);
                    self.failure_count = self.failure_threshold;
                    tracing::warn!("Circuit breaker REOPENED after failed test request");
                }
            }
            CircuitState::HalfOpen => {
                tracing::debug!("Ignoring result of a call admitted before the circuit opened");
            }
            CircuitState::Open => {
                tracing::debug!(success, "Ignoring call result while circuit is open");
            }
        }
    }

    /// Give back a probe permit whose call never produced a result.
    pub fn release_probe(&mut self, permit: Permit) {
        if permit.probe && self.state == CircuitState::HalfOpen {
            self.probe_in_flight = false;
            tracing::debug!("Probe abandoned, next caller may probe");
        }
    }

    fn trip(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn ms(n: i64) -> TimeDelta {
        TimeDelta::milliseconds(n)
    }

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown_ms,
        })
    }

    fn fail(breaker: &mut CircuitBreaker, now: DateTime<Utc>) {
        let permit = breaker.can_attempt(now).expect("call should be admitted");
        breaker.on_result(permit, false, now);
    }

    fn open_breaker() -> CircuitBreaker {
        let mut b = breaker(5, 30_000);
        for _ in 0..5 {
            fail(&mut b, t0());
        }
        b
    }

    #[test]
    fn test_opens_exactly_at_threshold() {
        let mut b = breaker(5, 30_000);
        for i in 1..5 {
            fail(&mut b, t0());
            assert_eq!(b.state(), CircuitState::Closed);
            assert_eq!(b.failure_count(), i);
        }
        fail(&mut b, t0());
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.opened_at(), Some(t0()));
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let mut b = breaker(3, 30_000);
        fail(&mut b, t0());
        fail(&mut b, t0());
        let permit = b.can_attempt(t0()).unwrap();
        b.on_result(permit, true, t0());
        assert_eq!(b.failure_count(), 0);

        fail(&mut b, t0());
        fail(&mut b, t0());
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_rejects_until_cooldown_without_side_effects() {
        let mut b = open_breaker();
        assert!(b.can_attempt(t0() + ms(29_999)).is_none());
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.opened_at(), Some(t0()));
    }

    #[test]
    fn test_open_admits_probe_at_cooldown() {
        let mut b = open_breaker();
        let permit = b.can_attempt(t0() + ms(30_000)).unwrap();
        assert!(permit.is_probe());
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_open_admits_probe_after_cooldown() {
        let mut b = open_breaker();
        assert!(b.can_attempt(t0() + ms(30_001)).is_some());
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let mut b = open_breaker();
        let now = t0() + ms(30_001);
        let _probe = b.can_attempt(now).unwrap();
        assert!(b.can_attempt(now).is_none());
        assert!(b.can_attempt(now + ms(60_000)).is_none());
    }

    #[test]
    fn test_probe_success_closes() {
        let mut b = open_breaker();
        let now = t0() + ms(30_001);
        let probe = b.can_attempt(now).unwrap();
        b.on_result(probe, true, now);

        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
        assert!(b.can_attempt(now).is_some());
    }

    #[test]
    fn test_probe_failure_reopens_at_threshold() {
        let mut b = open_breaker();
        let now = t0() + ms(30_001);
        let probe = b.can_attempt(now).unwrap();
        b.on_result(probe, false, now);

        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.failure_count(), 5);
        assert_eq!(b.opened_at(), Some(now));
        assert!(b.can_attempt(now + ms(29_999)).is_none());

        // The next cooldown expiry probes immediately, no re-accumulation.
        let probe = b.can_attempt(now + ms(30_000)).unwrap();
        assert!(probe.is_probe());
    }

    #[test]
    fn test_abandoned_probe_frees_token() {
        let mut b = open_breaker();
        let now = t0() + ms(30_001);
        let probe = b.can_attempt(now).unwrap();
        b.release_probe(probe);

        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.can_attempt(now).unwrap().is_probe());
    }

    #[test]
    fn test_results_while_open_are_ignored() {
        let mut b = breaker(1, 30_000);
        let early = b.can_attempt(t0()).unwrap();
        fail(&mut b, t0());
        assert_eq!(b.state(), CircuitState::Open);

        b.on_result(early, true, t0() + ms(10));
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.failure_count(), 1);
        assert_eq!(b.opened_at(), Some(t0()));
    }

    #[test]
    fn test_stale_result_does_not_decide_probe() {
        let mut b = breaker(1, 1_000);
        let stale = b.can_attempt(t0()).unwrap();
        fail(&mut b, t0());

        let now = t0() + ms(1_000);
        let _probe = b.can_attempt(now).unwrap();
        b.on_result(stale, true, now);
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.can_attempt(now).is_none());
    }

    #[test]
    fn test_restore_repairs_inconsistent_state() {
        let config = BreakerConfig::default();

        let b = CircuitBreaker::restore(config, CircuitState::Open, 5, None);
        assert_eq!(b.state(), CircuitState::Closed);

        let b = CircuitBreaker::restore(config, CircuitState::Closed, 9, None);
        assert_eq!(b.failure_count(), 4);

        let mut b = CircuitBreaker::restore(config, CircuitState::HalfOpen, 5, Some(t0()));
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.can_attempt(t0()).unwrap().is_probe());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!(CircuitState::HalfOpen.as_lowercase(), "half_open");
        assert_eq!(
            serde_json::to_string(&CircuitState::Open).unwrap(),
            "\"OPEN\""
        );
    }
}
