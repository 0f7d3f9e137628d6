//! Error handling for the resilience core
//!
//! Operational conditions — a probe that fails, a queue that overflows, a
//! delivery callback that reports failure — are modeled as state and outcome
//! values, not errors. The `ResilienceError` enum covers the remaining
//! failure surface: persistence problems, misconfiguration, and misuse of a
//! destroyed monitor.
//!
//! ## Error Handling Patterns
//!
//! Use the `?` operator for automatic propagation:
//!
//! ```rust
//! use connect_resilience::Result;
//!
//! fn parse_snapshot(blob: &str) -> Result<serde_json::Value> {
//!     // JSON errors convert automatically via the From trait
//!     let value: serde_json::Value = serde_json::from_str(blob)?;
//!     Ok(value)
//! }
//! ```

use thiserror::Error;

/// Result type for resilience core operations
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Errors that can occur in the resilience core
///
/// # Examples
///
/// ```rust
/// use connect_resilience::ResilienceError;
///
/// let error = ResilienceError::Configuration("heartbeat floor is zero".to_string());
/// assert_eq!(error.to_string(), "Configuration error: heartbeat floor is zero");
///
/// let error = ResilienceError::Destroyed;
/// assert_eq!(error.to_string(), "Monitor has been destroyed");
/// ```
#[derive(Error, Debug)]
pub enum ResilienceError {
    /// Snapshot serialization/deserialization error
    ///
    /// Automatically converted from `serde_json::Error`.
    #[error("Snapshot format error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Persistent store failure (save or load)
    ///
    /// The monitor treats this as non-fatal and degrades to in-memory
    /// operation for the rest of the session.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration error
    ///
    /// Raised synchronously at construction when configuration values are
    /// nonsensical (programmer error).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A listener handler reported failure
    ///
    /// Isolated per handler; never aborts notification of the remaining
    /// handlers.
    #[error("Listener error: {0}")]
    Listener(String),

    /// Operation attempted after `destroy()`
    #[error("Monitor has been destroyed")]
    Destroyed,

    /// Operation attempted in an invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ResilienceError {
    /// Check if this error is recoverable (the session can continue)
    ///
    /// Persistence and listener failures are absorbed by the core; the
    /// session continues without the failed facility. Configuration and
    /// lifecycle errors are permanent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use connect_resilience::ResilienceError;
    ///
    /// let error = ResilienceError::Persistence("disk full".to_string());
    /// assert!(error.is_recoverable());
    ///
    /// let error = ResilienceError::Destroyed;
    /// assert!(!error.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ResilienceError::Snapshot(_)
                | ResilienceError::Persistence(_)
                | ResilienceError::Listener(_)
        )
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        ResilienceError::InvalidState(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ResilienceError::Persistence("write failed".to_string());
        assert_eq!(error.to_string(), "Persistence error: write failed");

        let error = ResilienceError::Destroyed;
        assert_eq!(error.to_string(), "Monitor has been destroyed");

        let error = ResilienceError::Configuration("bad floor".to_string());
        assert_eq!(error.to_string(), "Configuration error: bad floor");
    }

    #[test]
    fn test_json_error_conversion() {
        let json = r#"{"invalid json"#;
        let json_error = serde_json::from_str::<serde_json::Value>(json).unwrap_err();
        let error: ResilienceError = json_error.into();

        assert!(matches!(error, ResilienceError::Snapshot(_)));
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_recoverability() {
        assert!(ResilienceError::Listener("handler failed".to_string()).is_recoverable());
        assert!(!ResilienceError::Configuration("bad".to_string()).is_recoverable());
        assert!(!ResilienceError::invalid_state("not started").is_recoverable());
    }
}
