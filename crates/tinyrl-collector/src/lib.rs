//! Concurrent batched episode collector.
//!
//! A [`Collector`] owns a fixed pool of worker threads, each with its
//! own [`Simulation`](tinyrl_core::Simulation) instance. A call to
//! [`Collector::request_episodes`] queues one task per requested
//! episode, drives the workers through a decision function, and
//! returns a single zero-padded [`EpisodeBatch`] once every episode has
//! finished.
//!
//! The decision function runs in one of two modes, chosen per request
//! by the [`DecisionFn`] variant: called directly on the worker threads
//! ([`SharedPolicy`](tinyrl_core::SharedPolicy)) or funnelled to the
//! requesting thread and batched
//! ([`Policy`](tinyrl_core::Policy)).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod assembler;
pub mod batch;
pub mod bridge;
pub mod collector;
pub mod config;
pub mod episode;
pub mod error;
pub mod metrics;
pub(crate) mod queue;
pub(crate) mod session;
pub mod worker;

pub use assembler::{AssemblyError, BatchAssembler};
pub use batch::{EpisodeBatch, EpisodeView};
pub use bridge::DecisionFn;
pub use collector::{Collector, CollectorState, ShutdownReport};
pub use config::{CollectorConfig, ConcurrentRequestPolicy, ConfigError, PaddingPolicy};
pub use episode::Episode;
pub use error::CollectError;
pub use metrics::CollectorMetrics;
pub use worker::WorkerSlot;
