//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, object cap within capacity)
//! - Validate addresses parse before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// Smallest accepted line limit; anything lower cannot hold a request line.
const MIN_LINE_BYTES: usize = 64;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("cache.max_object_bytes ({max_object}) exceeds cache.capacity_bytes ({capacity})")]
    ObjectExceedsCapacity { max_object: usize, capacity: usize },

    #[error("http.max_line_bytes must be at least {min}, got {value}")]
    LineLimitTooSmall { min: usize, value: usize },

    #[error("http.user_agent must be non-empty and single-line")]
    InvalidUserAgent,

    #[error("observability.log_level: unknown level {0:?}")]
    UnknownLogLevel(String),
}

/// Check a deserialized configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    let cache = &config.cache;
    if cache.capacity_bytes == 0 {
        errors.push(ValidationError::Zero { field: "cache.capacity_bytes" });
    }
    if cache.max_object_bytes == 0 {
        errors.push(ValidationError::Zero { field: "cache.max_object_bytes" });
    } else if cache.max_object_bytes > cache.capacity_bytes {
        errors.push(ValidationError::ObjectExceedsCapacity {
            max_object: cache.max_object_bytes,
            capacity: cache.capacity_bytes,
        });
    }

    let http = &config.http;
    if http.max_headers == 0 {
        errors.push(ValidationError::Zero { field: "http.max_headers" });
    }
    if http.max_line_bytes < MIN_LINE_BYTES {
        errors.push(ValidationError::LineLimitTooSmall {
            min: MIN_LINE_BYTES,
            value: http.max_line_bytes,
        });
    }
    if http.relay_chunk_bytes == 0 {
        errors.push(ValidationError::Zero { field: "http.relay_chunk_bytes" });
    }
    if http.user_agent.trim().is_empty() || http.user_agent.contains(['\r', '\n']) {
        errors.push(ValidationError::InvalidUserAgent);
    }

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(obs.log_level.clone()));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: obs.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn object_cap_must_fit_capacity() {
        let mut config = ProxyConfig::default();
        config.cache.capacity_bytes = 1000;
        config.cache.max_object_bytes = 1001;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::ObjectExceedsCapacity {
                max_object: 1001,
                capacity: 1000
            }]
        );
    }

    #[test]
    fn reports_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.http.max_headers = 0;
        config.http.relay_chunk_bytes = 0;
        config.http.user_agent = "bad\r\nInjected: yes".into();
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::Zero { field: "http.max_headers" }));
        assert!(errors.contains(&ValidationError::InvalidUserAgent));
        assert!(errors.contains(&ValidationError::UnknownLogLevel("loud".into())));
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
