//! Error types for logger setup

use thiserror::Error;

/// Result type for logger setup
pub type LogResult<T> = std::result::Result<T, LogError>;

/// Errors raised while installing the logger
#[derive(Error, Debug)]
pub enum LogError {
    /// The filter directive could not be parsed
    #[error("Invalid log filter '{directive}': {reason}")]
    Filter {
        /// The rejected directive
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,
}
