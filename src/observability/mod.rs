//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every payment request produces:
//!     → ledger.rs (one timestamped outcome, rolling window)
//!     → metrics.rs (cumulative counters, transition log, Prometheus mirror)
//!
//! Consumers:
//!     → summary.rs (sentence over the ledger + breaker state)
//!     → /metrics and /status endpoints
//!     → Prometheus scrape (optional)
//!     → logging.rs (structured log events)
//! ```
//!
//! # Design Decisions
//! - The ledger is windowed; metrics are not
//! - Reads never mutate either store
//! - Structured logging (JSON) for machine parsing

pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod summary;

pub use ledger::{AttemptLedger, AttemptRecord};
pub use metrics::{MetricsSnapshot, MetricsState};
pub use summary::summarize;
