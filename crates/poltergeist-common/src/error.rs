//! Error types for Poltergeist.

use thiserror::Error;

/// Top-level error type shared by the gameplay and engine crates.
#[derive(Debug, Error)]
pub enum PoltergeistError {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Rejected tuning values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A value that must be strictly positive was not
    #[error("{field} must be positive, got {value}")]
    NotPositive {
        /// Offending field
        field: &'static str,
        /// Value found
        value: f32,
    },

    /// A `min..max` pair was inverted
    #[error("{field}: min {min} is greater than max {max}")]
    InvertedRange {
        /// Offending field
        field: &'static str,
        /// Lower bound
        min: f32,
        /// Upper bound
        max: f32,
    },

    /// A ratio fell outside `[0, 1]`
    #[error("{field} must be within [0, 1], got {value}")]
    RatioOutOfRange {
        /// Offending field
        field: &'static str,
        /// Value found
        value: f32,
    },
}

impl ConfigError {
    /// Checks `value > 0`.
    pub fn ensure_positive(field: &'static str, value: f32) -> Result<(), Self> {
        if value > 0.0 {
            Ok(())
        } else {
            Err(Self::NotPositive { field, value })
        }
    }

    /// Checks `min <= max`.
    pub fn ensure_range(field: &'static str, min: f32, max: f32) -> Result<(), Self> {
        if min <= max {
            Ok(())
        } else {
            Err(Self::InvertedRange { field, min, max })
        }
    }

    /// Checks `0 <= value <= 1`.
    pub fn ensure_ratio(field: &'static str, value: f32) -> Result<(), Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(Self::RatioOutOfRange { field, value })
        }
    }
}

/// Result type alias for Poltergeist operations.
pub type PoltergeistResult<T> = Result<T, PoltergeistError>;
