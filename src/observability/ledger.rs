//! Rolling attempt history.
//!
//! One record per externally visible request outcome, oldest first. Records
//! older than the window are evicted from the front whenever a new record
//! is appended; reads never mutate.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resilience::clock::to_delta;

/// Outcome of a single payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Time-bounded, append-only record of request outcomes.
#[derive(Debug, Clone)]
pub struct AttemptLedger {
    window: Duration,
    records: VecDeque<AttemptRecord>,
}

impl AttemptLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            records: VecDeque::new(),
        }
    }

    /// Rebuild from persisted records, keeping only those inside the window.
    pub fn restore(
        window: Duration,
        records: impl IntoIterator<Item = AttemptRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut ledger = Self::new(window);
        let cutoff = ledger.cutoff(now);
        let mut kept: Vec<_> = records
            .into_iter()
            .filter(|r| r.timestamp >= cutoff)
            .collect();
        kept.sort_by_key(|r| r.timestamp);
        ledger.records = kept.into();
        ledger
    }

    /// Append an outcome, then drop everything older than the window.
    pub fn record(&mut self, success: bool, error: Option<String>, timestamp: DateTime<Utc>) {
        self.records.push_back(AttemptRecord {
            success,
            error,
            timestamp,
        });

        let cutoff = self.cutoff(timestamp);
        while self
            .records
            .front()
            .is_some_and(|oldest| oldest.timestamp < cutoff)
        {
            self.records.pop_front();
        }
    }

    /// Records inside the window as of `now`, oldest first.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<AttemptRecord> {
        let cutoff = self.cutoff(now);
        self.records
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Every retained record, including ones a read at a later time would hide.
    pub fn retained(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.records.iter()
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(to_delta(self.window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for AttemptLedger {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}
