//! Error types for managed resource containers
//!
//! Every failure a container can surface is an [`Error`] variant. Failures
//! are recorded once and replayed to every later caller, so they travel as
//! an [`Escalation`]: a cheap, cloneable handle to the single recorded
//! [`Error`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::phase::Phase;

/// Boxed cause reported by a source, pool or managed object.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for container operations
pub type Result<T, E = Escalation> = std::result::Result<T, E>;

/// Closed set of failure kinds a container can escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureKind {
    /// The source (or pool) reported that it could not provide the object.
    SourcingFailure,
    /// The object was not sourced within the binding's timeout.
    SourcingTimeout,
    /// An asynchronous operation did not complete within the binding's timeout.
    OperationTimeout,
    /// The object rejected the operation listener.
    OperationRegistration,
    /// The object reported a failure while an operation was outstanding.
    OperationFailure,
    /// The object rejected its dependencies.
    CoordinationFailure,
    /// A container operation was invoked out of order.
    ProtocolViolation,
    /// The container was released before the caller got to it.
    Unloaded,
    /// The binding configuration is invalid.
    Configuration,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SourcingFailure => "sourcing-failure",
            Self::SourcingTimeout => "sourcing-timeout",
            Self::OperationTimeout => "operation-timeout",
            Self::OperationRegistration => "operation-registration",
            Self::OperationFailure => "operation-failure",
            Self::CoordinationFailure => "coordination-failure",
            Self::ProtocolViolation => "protocol-violation",
            Self::Unloaded => "unloaded",
            Self::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// Comprehensive error type for managed resource containers
#[derive(Error, Debug)]
pub enum Error {
    /// The source could not provide the object
    #[error("Failed to source '{binding}' ({object_type}): {source}")]
    SourcingFailed {
        /// The binding name
        binding: String,
        /// The declared object type
        object_type: String,
        /// The cause reported by the source
        #[source]
        source: BoxError,
    },

    /// Sourcing did not finish in time
    #[error("Sourcing '{binding}' ({object_type}) timed out after {timeout_ms}ms")]
    SourcingTimeout {
        /// The binding name
        binding: String,
        /// The declared object type
        object_type: String,
        /// The configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// An asynchronous operation did not complete in time
    #[error("Asynchronous operation on '{binding}' ({object_type}) timed out after {timeout_ms}ms")]
    OperationTimeout {
        /// The binding name
        binding: String,
        /// The declared object type
        object_type: String,
        /// The configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// The object rejected the operation listener
    #[error("'{binding}' ({object_type}) rejected the operation listener: {source}")]
    OperationRegistration {
        /// The binding name
        binding: String,
        /// The declared object type
        object_type: String,
        /// The cause reported by the object
        #[source]
        source: BoxError,
    },

    /// The object failed while an operation was outstanding
    #[error("Asynchronous operation on '{binding}' ({object_type}) failed: {source}")]
    OperationFailed {
        /// The binding name
        binding: String,
        /// The declared object type
        object_type: String,
        /// The cause reported by the object
        #[source]
        source: BoxError,
    },

    /// The object could not take its dependencies
    #[error("Failed to coordinate '{binding}' with its dependencies: {source}")]
    CoordinationFailed {
        /// The binding name
        binding: String,
        /// The cause reported by the object
        #[source]
        source: BoxError,
    },

    /// A container operation was invoked out of order
    #[error("Protocol violation on '{binding}': {operation} is not valid while {phase}")]
    ProtocolViolation {
        /// The binding name
        binding: String,
        /// The operation that was invoked
        operation: &'static str,
        /// The phase the container was in
        phase: Phase,
    },

    /// The container has been released
    #[error("'{binding}' has been unloaded")]
    Unloaded {
        /// The binding name
        binding: String,
    },

    /// The object is not of the requested concrete type
    #[error("'{binding}' does not hold a {expected}")]
    TypeMismatch {
        /// The binding name
        binding: String,
        /// The requested type
        expected: &'static str,
    },

    /// Binding configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a protocol violation
    pub fn protocol_violation(binding: impl Into<String>, operation: &'static str, phase: Phase) -> Self {
        Self::ProtocolViolation {
            binding: binding.into(),
            operation,
            phase,
        }
    }

    /// The failure kind of this error
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SourcingFailed { .. } => FailureKind::SourcingFailure,
            Self::SourcingTimeout { .. } => FailureKind::SourcingTimeout,
            Self::OperationTimeout { .. } => FailureKind::OperationTimeout,
            Self::OperationRegistration { .. } => FailureKind::OperationRegistration,
            Self::OperationFailed { .. } => FailureKind::OperationFailure,
            Self::CoordinationFailed { .. } => FailureKind::CoordinationFailure,
            Self::ProtocolViolation { .. } | Self::TypeMismatch { .. } => {
                FailureKind::ProtocolViolation
            }
            Self::Unloaded { .. } => FailureKind::Unloaded,
            Self::Configuration { .. } => FailureKind::Configuration,
        }
    }

    /// The binding associated with this error (if any)
    #[must_use]
    pub fn binding(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. } => None,
            Self::SourcingFailed { binding, .. }
            | Self::SourcingTimeout { binding, .. }
            | Self::OperationTimeout { binding, .. }
            | Self::OperationRegistration { binding, .. }
            | Self::OperationFailed { binding, .. }
            | Self::CoordinationFailed { binding, .. }
            | Self::ProtocolViolation { binding, .. }
            | Self::TypeMismatch { binding, .. }
            | Self::Unloaded { binding } => Some(binding),
        }
    }

    /// The declared object type carried for diagnostics (if any)
    #[must_use]
    pub fn object_type(&self) -> Option<&str> {
        match self {
            Self::SourcingFailed { object_type, .. }
            | Self::SourcingTimeout { object_type, .. }
            | Self::OperationTimeout { object_type, .. }
            | Self::OperationRegistration { object_type, .. }
            | Self::OperationFailed { object_type, .. } => Some(object_type),
            _ => None,
        }
    }
}

/// A recorded failure, shared by every caller it is delivered to.
///
/// Cloning an escalation never creates a new failure: clones compare equal
/// under [`Escalation::same_as`].
#[derive(Clone)]
pub struct Escalation {
    inner: Arc<Error>,
}

impl Escalation {
    /// Record a failure
    #[must_use]
    pub fn new(error: Error) -> Self {
        Self {
            inner: Arc::new(error),
        }
    }

    /// The recorded error
    #[must_use]
    pub fn error(&self) -> &Error {
        &self.inner
    }

    /// The failure kind
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.inner.kind()
    }

    /// Whether `other` replays this very failure rather than an equal one
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this failure was synthesized by a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::SourcingTimeout | FailureKind::OperationTimeout
        )
    }

    /// Whether the container was released under the caller
    #[must_use]
    pub fn is_unloaded(&self) -> bool {
        self.kind() == FailureKind::Unloaded
    }

    /// Whether this failure indicates a bug in the calling framework
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        self.kind() == FailureKind::ProtocolViolation
    }
}

impl From<Error> for Escalation {
    fn from(error: Error) -> Self {
        Self::new(error)
    }
}

impl fmt::Debug for Escalation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

impl fmt::Display for Escalation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl std::error::Error for Escalation {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}
