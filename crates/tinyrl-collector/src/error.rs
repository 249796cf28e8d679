//! Errors surfaced by [`Collector::request_episodes`](crate::Collector::request_episodes).

use std::error::Error;
use std::fmt;

use tinyrl_core::{DecisionFault, EngineFault};

use crate::assembler::AssemblyError;

/// Why a collection request failed.
#[derive(Clone, Debug, PartialEq)]
pub enum CollectError {
    /// `count` was zero.
    ZeroCount,
    /// The collector has been closed.
    Closed,
    /// Another request is in flight and the collector is configured
    /// to reject overlapping requests.
    Busy,
    /// The decision function failed. Policy errors are caller bugs and
    /// are never retried.
    Decision(DecisionFault),
    /// Engine faults during this request exceeded `max_engine_faults`.
    EngineFaultLimit {
        /// Number of faults observed.
        faults: u32,
        /// The fault that crossed the ceiling.
        last: EngineFault,
    },
    /// A worker panicked inside the engine or the decision function.
    WorkerPanicked {
        /// Index of the worker.
        worker: usize,
        /// Panic payload, if it was a string.
        message: String,
    },
    /// The request did not complete within `request_timeout`.
    Timeout {
        /// Episodes completed before the deadline.
        completed: usize,
        /// Episodes requested.
        requested: usize,
    },
    /// An internal channel disconnected unexpectedly.
    Disconnected,
    /// Finished episodes could not be assembled into a batch.
    Assembly(AssemblyError),
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCount => write!(f, "episode count must be at least 1"),
            Self::Closed => write!(f, "collector closed"),
            Self::Busy => write!(f, "another request is already in flight"),
            Self::Decision(e) => write!(f, "decision: {e}"),
            Self::EngineFaultLimit { faults, last } => {
                write!(f, "{faults} engine faults exceeded the limit; last: {last}")
            }
            Self::WorkerPanicked { worker, message } => {
                write!(f, "worker {worker} panicked: {message}")
            }
            Self::Timeout {
                completed,
                requested,
            } => write!(
                f,
                "request timed out with {completed} of {requested} episodes complete"
            ),
            Self::Disconnected => write!(f, "internal channel disconnected"),
            Self::Assembly(e) => write!(f, "assembly: {e}"),
        }
    }
}

impl Error for CollectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decision(e) => Some(e),
            Self::EngineFaultLimit { last, .. } => Some(last),
            Self::Assembly(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecisionFault> for CollectError {
    fn from(e: DecisionFault) -> Self {
        Self::Decision(e)
    }
}

impl From<AssemblyError> for CollectError {
    fn from(e: AssemblyError) -> Self {
        Self::Assembly(e)
    }
}
