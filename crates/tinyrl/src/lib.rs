//! TinyRL: concurrent batched rollout collection for grid-game
//! reinforcement learning.
//!
//! This is the facade crate that re-exports the public API of the
//! TinyRL sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use tinyrl::prelude::*;
//!
//! /// A game that ends after three steps.
//! struct ThreeSteps(usize);
//! impl Simulation for ThreeSteps {
//!     fn schema(&self) -> ObsSchema { ObsSchema::with_queue_size(1) }
//!     fn reset(&mut self) -> Result<Observation, EngineFault> {
//!         self.0 = 0;
//!         Ok(Observation::zeros(&self.schema()))
//!     }
//!     fn step(&mut self, _: Action) -> Result<StepOutcome, EngineFault> {
//!         self.0 += 1;
//!         Ok(StepOutcome {
//!             observation: Observation::zeros(&self.schema()),
//!             reward: 1.0,
//!             done: self.0 == 3,
//!         })
//!     }
//! }
//!
//! let collector = Collector::new(CollectorConfig::new(2, 50, 8), |_| Ok(ThreeSteps(0))).unwrap();
//! let policy = |_: &Observation| -> Result<Decision, DecisionFault> {
//!     Ok(Decision::new(Action::HardDrop, 0.0, 0.0))
//! };
//! let batch = collector.request_episodes(4, DecisionFn::shared(policy)).unwrap();
//! assert_eq!(batch.lengths(), &[3, 3, 3, 3]);
//! assert_eq!(batch.observations_shape().as_slice(), &[4, 3, collector.obs_dim()]);
//! collector.close();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tinyrl-core` | Actions, observations, engine and policy traits |
//! | [`collector`] | `tinyrl-collector` | The collector, its configuration, batches and errors |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and traits (`tinyrl-core`).
///
/// Contains [`types::Action`], the observation types, the
/// [`types::Simulation`] engine contract and the decision-function
/// traits [`types::Policy`] and [`types::SharedPolicy`].
pub use tinyrl_core as types;

/// The batched episode collector (`tinyrl-collector`).
///
/// [`collector::Collector`] is the entry point; configure it with
/// [`collector::CollectorConfig`].
pub use tinyrl_collector as collector;

/// Common imports for typical TinyRL usage.
///
/// ```rust
/// use tinyrl::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use tinyrl_core::{
        Action, Decision, Grid, GridShape, ObsSchema, Observation, Policy, SharedPolicy,
        Simulation, StepOutcome,
    };

    // Errors
    pub use tinyrl_core::{DecisionFault, EngineFault};
    pub use tinyrl_collector::{CollectError, ConfigError};

    // Collector
    pub use tinyrl_collector::{
        Collector, CollectorConfig, CollectorMetrics, ConcurrentRequestPolicy, DecisionFn,
        EpisodeBatch, EpisodeView, PaddingPolicy, ShutdownReport, WorkerSlot,
    };
}
