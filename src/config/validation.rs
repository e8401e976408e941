//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! Every problem is reported, not just the first one.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "breaker.failure_threshold",
            "must be at least 1",
        ));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    } else if config.retries.max_attempts > 1 && config.retries.backoff_ms.is_empty() {
        errors.push(ValidationError::new(
            "retries.backoff_ms",
            "must list at least one delay when retries are enabled",
        ));
    }

    if config.history.window_secs == 0 {
        errors.push(ValidationError::new("history.window_secs", "must be positive"));
    }

    let rate = config.provider.failure_rate;
    if !(0.0..=1.0).contains(&rate) {
        errors.push(ValidationError::new(
            "provider.failure_rate",
            format!("{} is outside [0, 1]", rate),
        ));
    }

    if config.persistence.enabled {
        if config.persistence.path.trim().is_empty() {
            errors.push(ValidationError::new("persistence.path", "must not be empty"));
        }
        if config.persistence.save_interval_secs == 0 {
            errors.push(ValidationError::new(
                "persistence.save_interval_secs",
                "must be positive",
            ));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
