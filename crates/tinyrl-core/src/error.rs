//! Error types shared by engines, policies, and the collector.
//!
//! Split by origin: [`EngineFault`] is raised by a [`Simulation`](crate::Simulation)
//! instance and is recoverable by resetting that instance; [`DecisionFault`]
//! is raised by (or on behalf of) the decision function and fails the
//! whole collection request.

use std::error::Error;
use std::fmt;

use crate::obs::GridShape;

/// A single simulation instance reported an unrecoverable state.
///
/// The collector recovers by resetting the faulting instance and
/// re-running the episode, up to a configured ceiling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineFault {
    /// The engine reached a state it cannot step from.
    InvalidState {
        /// Human-readable description of the state.
        reason: String,
    },
    /// The engine reported an internal error.
    Internal {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// An observation component does not match the declared schema.
    ShapeMismatch {
        /// Name of the offending component.
        component: &'static str,
        /// Shape declared by the schema.
        expected: GridShape,
        /// Shape actually produced.
        actual: GridShape,
    },
}

impl fmt::Display for EngineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { reason } => write!(f, "invalid engine state: {reason}"),
            Self::Internal { reason } => write!(f, "engine internal error: {reason}"),
            Self::ShapeMismatch {
                component,
                expected,
                actual,
            } => write!(
                f,
                "observation component '{component}' has shape {actual}, expected {expected}"
            ),
        }
    }
}

impl Error for EngineFault {}

/// The decision function failed to produce a usable decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionFault {
    /// The policy returned an error of its own.
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The policy chose an action id outside `0..Action::COUNT`.
    InvalidAction {
        /// The offending id.
        id: u8,
    },
    /// The log-probability or value estimate was NaN or infinite.
    NonFinite {
        /// Which scalar was non-finite (`"log_prob"` or `"value"`).
        field: &'static str,
    },
    /// A batched decision call returned the wrong number of decisions.
    BatchSizeMismatch {
        /// Number of observations submitted.
        expected: usize,
        /// Number of decisions returned.
        actual: usize,
    },
    /// The request was cancelled before a decision was produced.
    Cancelled,
}

impl fmt::Display for DecisionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "decision function failed: {reason}"),
            Self::InvalidAction { id } => write!(f, "invalid action id {id}"),
            Self::NonFinite { field } => write!(f, "decision {field} is not finite"),
            Self::BatchSizeMismatch { expected, actual } => write!(
                f,
                "batched decision returned {actual} results for {expected} observations"
            ),
            Self::Cancelled => write!(f, "decision request cancelled"),
        }
    }
}

impl Error for DecisionFault {}

impl DecisionFault {
    /// Convenience constructor for [`DecisionFault::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_fault_display() {
        let err = EngineFault::ShapeMismatch {
            component: "board",
            expected: GridShape::new(24, 18),
            actual: GridShape::new(20, 10),
        };
        let msg = err.to_string();
        assert!(msg.contains("board"));
        assert!(msg.contains("20x10"));
        assert!(msg.contains("24x18"));
    }

    #[test]
    fn decision_fault_display() {
        assert_eq!(
            DecisionFault::failed("model exploded").to_string(),
            "decision function failed: model exploded"
        );
        assert_eq!(
            DecisionFault::BatchSizeMismatch {
                expected: 4,
                actual: 3
            }
            .to_string(),
            "batched decision returned 3 results for 4 observations"
        );
    }
}
