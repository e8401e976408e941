//! Fixed backoff schedule.

use std::time::Duration;

/// Ordered list of delays applied between retries.
///
/// The schedule is consumed by retry index: the delay before retry `n` is
/// entry `n`. Indices past the end reuse the last entry, and an empty
/// schedule never waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn from_millis(delays: &[u64]) -> Self {
        Self::new(delays.iter().copied().map(Duration::from_millis).collect())
    }

    /// Delay to wait before retry number `retry_index` (zero based).
    pub fn delay_for(&self, retry_index: usize) -> Duration {
        self.delays
            .get(retry_index)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_millis(&[500, 1000, 2000])
    }
}
