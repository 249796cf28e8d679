//! Test engines and decision functions for TinyRL development.
//!
//! [`ScriptedGame`] is a seeded stand-in for the grid-game engine: it
//! produces correctly shaped observations and random but reproducible
//! rewards and episode lengths, with none of the real game rules.
//! [`FaultyGame`] wraps any engine to inject faults and panics on
//! chosen calls. The policies cover the decision-function behaviours
//! the collector has to cope with.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod game;
mod policy;

pub use game::{small_schema, FaultyGame, ScriptedGame};
pub use policy::{CountingPolicy, FailingPolicy, RandomPolicy, SlowPolicy};
