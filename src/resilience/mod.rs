//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Payment request:
//!     → circuit_breaker.rs (admit, or fail fast while open)
//!     → retries.rs (call provider, retry on failure)
//!         → backoff.rs (fixed delay per retry slot)
//!     → circuit_breaker.rs (final outcome may open/close the circuit)
//! ```
//!
//! # Design Decisions
//! - The breaker sees one outcome per request, not one per attempt
//! - Time is injected through clock.rs so transitions are testable
//! - Backoff is a literal schedule, not computed

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod retries;

pub use backoff::BackoffSchedule;
pub use circuit_breaker::{CircuitBreaker, CircuitState, Permit, Transition};
pub use clock::{Clock, MockClock, SystemClock};
pub use retries::{retry_with_backoff, RetryOutcome, RetryPolicy};
