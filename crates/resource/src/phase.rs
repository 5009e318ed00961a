//! Container lifecycle phases

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The phase of a managed resource container.
///
/// ```text
/// Unsourced → Sourcing → Sourced → Governed → Coordinated → Ready ⇄ InOperation
/// ```
///
/// `Failed` and `Released` are absorbing and reachable from every other phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Phase {
    /// No source attempt has been made
    #[default]
    Unsourced,
    /// Waiting for the source to deliver the object
    Sourcing,
    /// The object has been delivered
    Sourced,
    /// Oversight has been attached
    Governed,
    /// Dependencies have been injected
    Coordinated,
    /// The object may be used
    Ready,
    /// The object is performing an asynchronous operation
    InOperation,
    /// A failure was recorded
    Failed,
    /// The container has been released
    Released,
}

impl Phase {
    /// Check if the phase is absorbing
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Released)
    }

    /// Check if the object has been delivered and not yet given up
    #[must_use]
    pub fn is_sourced(&self) -> bool {
        matches!(
            self,
            Self::Sourced | Self::Governed | Self::Coordinated | Self::Ready | Self::InOperation
        )
    }

    /// Check if callers may fetch the object in this phase
    #[must_use]
    pub fn exposes_object(&self) -> bool {
        matches!(self, Self::Coordinated | Self::Ready | Self::InOperation)
    }

    /// Check if callers can be queued in this phase
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Sourcing | Self::InOperation)
    }

    /// Check if the container can transition to the target phase
    #[must_use]
    pub fn can_transition_to(&self, target: Phase) -> bool {
        use Phase::{
            Coordinated, Failed, Governed, InOperation, Ready, Released, Sourced, Sourcing,
            Unsourced,
        };

        match (self, target) {
            // Nothing leaves an absorbing phase
            (Failed | Released, _) => false,

            // Every live phase can fail or be released
            (_, Failed | Released) => true,

            (Unsourced, Sourcing) => true,
            (Sourcing, Sourced) => true,
            (Sourced, Governed) => true,
            (Governed, Coordinated) => true,
            (Coordinated, Ready) => true,
            (Ready, InOperation) => true,
            (InOperation, Ready) => true,

            _ => false,
        }
    }

    /// Get the phases reachable in one step
    #[must_use]
    pub fn next_phases(&self) -> &'static [Phase] {
        use Phase::{
            Coordinated, Failed, Governed, InOperation, Ready, Released, Sourced, Sourcing,
            Unsourced,
        };

        match self {
            Unsourced => &[Sourcing, Failed, Released],
            Sourcing => &[Sourced, Failed, Released],
            Sourced => &[Governed, Failed, Released],
            Governed => &[Coordinated, Failed, Released],
            Coordinated => &[Ready, Failed, Released],
            Ready => &[InOperation, Failed, Released],
            InOperation => &[Ready, Failed, Released],
            Failed | Released => &[],
        }
    }

    /// All phases, in lifecycle order
    #[must_use]
    pub fn all() -> &'static [Phase] {
        &[
            Self::Unsourced,
            Self::Sourcing,
            Self::Sourced,
            Self::Governed,
            Self::Coordinated,
            Self::Ready,
            Self::InOperation,
            Self::Failed,
            Self::Released,
        ]
    }

    /// Get a human-readable description of the phase
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unsourced => "No source attempt has been made",
            Self::Sourcing => "Waiting for the source to deliver the object",
            Self::Sourced => "Object delivered, oversight not yet attached",
            Self::Governed => "Oversight attached, dependencies not yet injected",
            Self::Coordinated => "Dependencies injected",
            Self::Ready => "Object ready for use",
            Self::InOperation => "Object busy with an asynchronous operation",
            Self::Failed => "A failure was recorded",
            Self::Released => "Container released",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unsourced => "Unsourced",
            Self::Sourcing => "Sourcing",
            Self::Sourced => "Sourced",
            Self::Governed => "Governed",
            Self::Coordinated => "Coordinated",
            Self::Ready => "Ready",
            Self::InOperation => "InOperation",
            Self::Failed => "Failed",
            Self::Released => "Released",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_terminal() {
        assert!(Phase::Failed.is_terminal());
        assert!(Phase::Released.is_terminal());
        assert!(!Phase::Ready.is_terminal());
    }

    #[test]
    fn test_forward_path() {
        assert!(Phase::Unsourced.can_transition_to(Phase::Sourcing));
        assert!(Phase::Sourcing.can_transition_to(Phase::Sourced));
        assert!(Phase::Sourced.can_transition_to(Phase::Governed));
        assert!(Phase::Governed.can_transition_to(Phase::Coordinated));
        assert!(Phase::Coordinated.can_transition_to(Phase::Ready));
        assert!(Phase::Ready.can_transition_to(Phase::InOperation));
        assert!(Phase::InOperation.can_transition_to(Phase::Ready));
    }

    #[test]
    fn test_no_skipping() {
        assert!(!Phase::Unsourced.can_transition_to(Phase::Sourced));
        assert!(!Phase::Sourced.can_transition_to(Phase::Ready));
        assert!(!Phase::Coordinated.can_transition_to(Phase::InOperation));
        assert!(!Phase::Ready.can_transition_to(Phase::Coordinated));
    }

    #[test]
    fn test_terminal_is_absorbing() {
        for target in Phase::all() {
            assert!(!Phase::Failed.can_transition_to(*target));
            assert!(!Phase::Released.can_transition_to(*target));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Phase::InOperation.to_string(), "InOperation");
        assert!(!Phase::Sourcing.description().is_empty());
    }
}
