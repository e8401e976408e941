//! Plain-language status summary.
//!
//! A fixed sentence template filled from the rolling attempt history and
//! the current breaker state. Deterministic for identical inputs.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::observability::ledger::AttemptRecord;
use crate::resilience::clock::to_delta;
use crate::resilience::CircuitState;

/// Percentage of failed requests among `records` inside the window,
/// rounded to the nearest integer. Zero when the window is empty.
pub fn failure_rate(records: &[AttemptRecord], now: DateTime<Utc>, window: Duration) -> u32 {
    let cutoff = now
        .checked_sub_signed(to_delta(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let (total, failures) = records
        .iter()
        .filter(|r| r.timestamp >= cutoff)
        .fold((0u64, 0u64), |(total, failures), r| {
            (total + 1, failures + u64::from(!r.success))
        });

    if total == 0 {
        return 0;
    }
    (failures as f64 / total as f64 * 100.0).round() as u32
}

/// Render the status sentence.
pub fn summarize(
    records: &[AttemptRecord],
    state: CircuitState,
    now: DateTime<Utc>,
    window: Duration,
) -> String {
    let rate = failure_rate(records, now, window);
    let breaker = match state {
        CircuitState::Open => {
            "The circuit breaker was triggered and is currently open, blocking new attempts."
        }
        CircuitState::HalfOpen => "The circuit breaker is half-open and testing recovery.",
        CircuitState::Closed => "The circuit breaker is closed and operating normally.",
    };

    format!(
        "In the last {}, {}% of payment attempts failed due to provider instability. {}",
        describe_window(window),
        rate,
        breaker
    )
}

fn describe_window(window: Duration) -> String {
    let secs = window.as_secs();
    let (amount, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };

    if amount == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", amount, unit)
    }
}
