//! Core types and traits for the TinyRL rollout collector.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the contracts the collector consumes: the grid-game [`Simulation`]
//! engine, the decision function ([`Policy`] / [`SharedPolicy`]), and
//! the value types that flow between them.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod action;
pub mod error;
pub mod obs;
pub mod traits;

pub use action::Action;
pub use error::{DecisionFault, EngineFault};
pub use obs::{Grid, GridShape, ObsSchema, Observation};
pub use traits::{Decision, Policy, SharedPolicy, Simulation, StepOutcome};
