//! Custom error types for the application.
//!
//! This module defines the primary error type, `PsuError`, using the
//! `thiserror` crate. The taxonomy separates failures by recovery scope:
//!
//! - **`Config` / `Configuration`**: settings could not be loaded or are
//!   semantically invalid. Permanent, caught at startup.
//! - **`Connection`**: the instrument stayed unreachable for the whole
//!   bounded retry window. Fatal to session start; the caller may surface a
//!   retry affordance to the user.
//! - **`Communication`**: a single instrument transaction failed. Scoped to
//!   that transaction; pollers abort the current cycle, writers propagate it
//!   to the caller. The core never retries on its own.
//! - **`Range`**: a caller supplied an out-of-bounds set-point. Rejected
//!   before any instrument traffic is attempted.
//! - **`UnknownResponse`**: the instrument answered a numeric query with
//!   something unparseable. Enumerated status queries instead map bad
//!   responses to an `Unknown` variant and do not produce this error.

use crate::types::Channel;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type PsuResult<T> = std::result::Result<T, PsuError>;

/// Primary error type for the power supply application.
#[derive(Error, Debug)]
pub enum PsuError {
    /// Configuration file parsing failed.
    ///
    /// **Source**: wraps `config::ConfigError` from the `config` crate.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration values parsed but failed semantic validation
    /// (for example a zero polling interval).
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The instrument could not be reached within the bounded retry window.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A single command/query transaction failed on the link.
    #[error("Communication error: {0}")]
    Communication(String),

    /// A set-point or protection limit is outside the channel's valid range.
    #[error("{quantity} value {value} out of range [{min}; {max}] for {channel}")]
    Range {
        /// Which physical quantity was being set ("voltage" or "current").
        quantity: &'static str,
        /// Channel the value was destined for.
        channel: Channel,
        /// The rejected value.
        value: f64,
        /// Lower bound, inclusive.
        min: f64,
        /// Upper bound, inclusive.
        max: f64,
    },

    /// The instrument returned a response a numeric query could not parse.
    #[error("Unparseable instrument response: '{0}'")]
    UnknownResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PsuError::Communication("read timed out".to_string());
        assert_eq!(err.to_string(), "Communication error: read timed out");
    }

    #[test]
    fn test_range_error_display() {
        let err = PsuError::Range {
            quantity: "voltage",
            channel: Channel::Ch3,
            value: 12.0,
            min: 0.0,
            max: 5.0,
        };
        assert_eq!(
            err.to_string(),
            "voltage value 12 out of range [0; 5] for CH3"
        );
    }
}
