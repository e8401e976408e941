//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → HTTP server drains, snapshot writer saves → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config, logging, gateway, background tasks, listener
//! - Every long-running task subscribes before the listener starts

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
