//! Error types for proq.

use std::time::Duration;

use thiserror::Error;

/// The main error type for all proq operations.
///
/// Each variant wraps the error enum of one concern. Parse errors are
/// per-line and non-fatal; store errors are not-found outcomes the caller is
/// expected to check; config errors only occur at construction.
#[derive(Error, Debug)]
pub enum ProqError {
    /// A text line could not be parsed into a sample.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A store lookup referenced a key that has not been observed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The store configuration is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while parsing one exposition line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line does not match the bracketed or bare grammar.
    #[error("invalid metric line '{line}': {reason}")]
    InvalidLine {
        /// The offending line.
        line: String,
        /// What did not match.
        reason: String,
    },

    /// The line is well-formed but its value token is not a number.
    #[error("invalid metric line '{line}': value '{value}' is not a number")]
    InvalidValue {
        /// The offending line.
        line: String,
        /// The value token that failed to parse.
        value: String,
    },
}

impl ParseError {
    /// Returns `true` for the invalid-value variant.
    pub fn is_invalid_value(&self) -> bool {
        matches!(self, Self::InvalidValue { .. })
    }

    /// Returns the line that failed to parse.
    pub fn line(&self) -> &str {
        match self {
            Self::InvalidLine { line, .. } | Self::InvalidValue { line, .. } => line,
        }
    }
}

/// Not-found outcomes of store queries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No sample has ever been written for this key.
    #[error("series not found: {key}")]
    SeriesNotFound {
        /// Canonical key that was looked up.
        key: String,
    },

    /// No histogram has been reconstructed for this key.
    #[error("histogram not found: {key}")]
    HistogramNotFound {
        /// Canonical key that was looked up.
        key: String,
    },
}

/// Errors in store configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The poll interval must be non-zero.
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    /// The ring capacity must hold at least one sample.
    #[error("ring capacity must be greater than zero")]
    ZeroCapacity,

    /// The window/interval ratio yields too many samples per series.
    #[error("window {window:?} / poll interval {poll_interval:?} gives {capacity} samples per series (max {max_capacity})")]
    CapacityTooLarge {
        /// Configured display window.
        window: Duration,
        /// Configured poll interval.
        poll_interval: Duration,
        /// The computed capacity.
        capacity: u128,
        /// The maximum allowed capacity.
        max_capacity: usize,
    },
}

/// Type alias for `Result<T, ProqError>`.
pub type Result<T> = std::result::Result<T, ProqError>;
