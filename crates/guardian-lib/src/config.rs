//! Configuration validation errors
//!
//! Component configuration lives next to each component (threshold config
//! with the evaluator, profile config with the brownout manager, and so on).
//! This module only holds the shared validation error type; all bounds are
//! enforced once at startup, not scattered through the call sites.

use thiserror::Error;

/// Error raised when a configuration value is outside its allowed bounds
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfBounds {
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },

    #[error("{field} must be a fraction in (0, 1], got {value}")]
    InvalidFraction { field: &'static str, value: f64 },

    #[error("{field}: soft threshold {soft} must be below hard threshold {hard}")]
    ThresholdOrder {
        field: &'static str,
        soft: f64,
        hard: f64,
    },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

/// Check that a value is a usable fraction in (0, 1]
pub fn validate_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(ConfigError::InvalidFraction { field, value });
    }
    Ok(())
}

/// Check that an integer value sits inside an inclusive range
pub fn validate_range(
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfBounds {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}
