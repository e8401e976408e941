//! Payment processing.
//!
//! # Data Flow
//! ```text
//! PaymentRequest
//!     → gateway.rs (breaker admission, retries, outcome recording)
//!     → provider.rs (external charge)
//!     → ChargeReceipt | PaymentError
//!
//! snapshot.rs saves and restores gateway state across restarts
//! ```

pub mod gateway;
pub mod provider;
pub mod snapshot;
pub mod types;

pub use gateway::{GatewayStatus, PaymentGateway};
pub use provider::{PaymentProvider, SimulatedProvider};
pub use snapshot::{load_snapshot, save_snapshot, GatewaySnapshot, SnapshotWriter};
pub use types::{ChargeReceipt, PaymentError, PaymentRequest, ProviderError};
