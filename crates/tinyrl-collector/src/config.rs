//! Collector configuration, validation, and error types.
//!
//! [`CollectorConfig`] is the construction-time input for a
//! [`Collector`](crate::Collector). [`validate()`](CollectorConfig::validate)
//! checks every structural invariant before any worker thread starts.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use tinyrl_core::{EngineFault, GridShape, ObsSchema};

// ── PaddingPolicy ──────────────────────────────────────────────────

/// Width of the step axis in an [`EpisodeBatch`](crate::EpisodeBatch).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaddingPolicy {
    /// Pad every row to the longest episode in the batch.
    #[default]
    BatchMax,
    /// Pad every row to the configured `max_steps`, giving the same
    /// array shapes for every request.
    MaxSteps,
}

// ── ConcurrentRequestPolicy ────────────────────────────────────────

/// What a second `request_episodes` call does while one is in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConcurrentRequestPolicy {
    /// Fail immediately with [`CollectError::Busy`](crate::CollectError::Busy).
    #[default]
    Reject,
    /// Block until the in-flight request finishes.
    Wait,
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while constructing a collector.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// `num_workers` is zero.
    ZeroWorkers,
    /// `max_steps` is zero.
    ZeroMaxSteps,
    /// `max_steps` does not fit the `u32` episode-length column.
    MaxStepsOverflow {
        /// The configured value.
        value: usize,
    },
    /// `queue_capacity` is zero.
    ZeroQueueCapacity,
    /// `serve_batch_size` is zero.
    ZeroServeBatch,
    /// `request_timeout` is `Some(0)`.
    ZeroRequestTimeout,
    /// `shutdown_timeout` is zero.
    ZeroShutdownTimeout,
    /// An engine reported an observation schema with no cells.
    EmptySchema,
    /// Two engines in the pool reported different observation schemas.
    SchemaMismatch {
        /// Index of the first disagreeing worker.
        worker: usize,
        /// Component whose shape differs.
        component: &'static str,
        /// Shape reported by worker 0.
        expected: GridShape,
        /// Shape reported by `worker`.
        actual: GridShape,
    },
    /// The engine factory failed for a worker.
    Engine {
        /// Index of the worker whose engine could not be built.
        worker: usize,
        /// The underlying fault.
        fault: EngineFault,
    },
    /// A worker thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroWorkers => write!(f, "num_workers must be at least 1"),
            Self::ZeroMaxSteps => write!(f, "max_steps must be at least 1"),
            Self::MaxStepsOverflow { value } => {
                write!(f, "max_steps {value} exceeds u32::MAX")
            }
            Self::ZeroQueueCapacity => write!(f, "queue_capacity must be at least 1"),
            Self::ZeroServeBatch => write!(f, "serve_batch_size must be at least 1"),
            Self::ZeroRequestTimeout => write!(f, "request_timeout must be non-zero when set"),
            Self::ZeroShutdownTimeout => write!(f, "shutdown_timeout must be non-zero"),
            Self::EmptySchema => write!(f, "observation schema has zero cells"),
            Self::SchemaMismatch {
                worker,
                component,
                expected,
                actual,
            } => write!(
                f,
                "worker {worker} engine reports {component} shape {actual}, worker 0 reports {expected}"
            ),
            Self::Engine { worker, fault } => {
                write!(f, "engine for worker {worker} failed to build: {fault}")
            }
            Self::ThreadSpawnFailed { reason } => {
                write!(f, "thread spawn failed: {reason}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Engine { fault, .. } => Some(fault),
            _ => None,
        }
    }
}

// ── CollectorConfig ────────────────────────────────────────────────

/// Complete configuration for constructing a collector.
#[derive(Clone, Debug)]
pub struct CollectorConfig {
    /// Number of worker threads, each owning one engine instance.
    pub num_workers: usize,
    /// Episodes are truncated after this many steps.
    pub max_steps: usize,
    /// Maximum episode tasks queued but not yet picked up by a worker.
    pub queue_capacity: usize,
    /// Worker `i` builds its engine with seed `seed_base + i`.
    pub seed_base: u64,
    /// Engine faults tolerated per request before it fails. Default: 8.
    pub max_engine_faults: u32,
    /// Maximum decision requests handed to one
    /// [`Policy::decide_batch`](tinyrl_core::Policy::decide_batch) call
    /// in serialized mode. Default: 32.
    pub serve_batch_size: usize,
    /// Step-axis width of returned batches.
    pub padding: PaddingPolicy,
    /// Behaviour of overlapping `request_episodes` calls.
    pub concurrent_requests: ConcurrentRequestPolicy,
    /// Fail a request that has not completed within this duration.
    /// `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// How long `close()` waits for workers before detaching them.
    /// Default: 5 s.
    pub shutdown_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            num_workers: default_worker_count(),
            max_steps: 300,
            queue_capacity: 64,
            seed_base: 0,
            max_engine_faults: 8,
            serve_batch_size: 32,
            padding: PaddingPolicy::default(),
            concurrent_requests: ConcurrentRequestPolicy::default(),
            request_timeout: None,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// `available_parallelism`, clamped to `[1, 64]`.
fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(1, 64)
}

impl CollectorConfig {
    /// Configuration with the three required knobs set and defaults
    /// for everything else.
    pub fn new(num_workers: usize, max_steps: usize, queue_capacity: usize) -> Self {
        Self {
            num_workers,
            max_steps,
            queue_capacity,
            ..Self::default()
        }
    }

    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. At least one worker.
        if self.num_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        // 2. Step bound positive and representable in the lengths column.
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }
        if u32::try_from(self.max_steps).is_err() {
            return Err(ConfigError::MaxStepsOverflow {
                value: self.max_steps,
            });
        }
        // 3. Queue capacity >= 1.
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        // 4. Serving batch >= 1.
        if self.serve_batch_size == 0 {
            return Err(ConfigError::ZeroServeBatch);
        }
        // 5. Timeouts.
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::ZeroShutdownTimeout);
        }
        Ok(())
    }

    /// Check that `actual` (reported by `worker`) matches `expected`
    /// (reported by worker 0).
    pub(crate) fn check_schema(
        worker: usize,
        expected: &ObsSchema,
        actual: &ObsSchema,
    ) -> Result<(), ConfigError> {
        for ((component, want), (_, got)) in expected
            .components()
            .into_iter()
            .zip(actual.components())
        {
            if want != got {
                return Err(ConfigError::SchemaMismatch {
                    worker,
                    component,
                    expected: want,
                    actual: got,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> CollectorConfig {
        CollectorConfig::new(2, 50, 8)
    }

    #[test]
    fn validate_valid_config_succeeds() {
        assert!(valid_config().validate().is_ok());
        assert!(CollectorConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_zero_workers_fails() {
        let cfg = CollectorConfig {
            num_workers: 0,
            ..valid_config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroWorkers));
    }

    #[test]
    fn validate_zero_max_steps_fails() {
        let cfg = CollectorConfig {
            max_steps: 0,
            ..valid_config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroMaxSteps));
    }

    #[test]
    fn validate_zero_queue_capacity_fails() {
        let cfg = CollectorConfig {
            queue_capacity: 0,
            ..valid_config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroQueueCapacity));
    }

    #[test]
    fn validate_zero_serve_batch_fails() {
        let cfg = CollectorConfig {
            serve_batch_size: 0,
            ..valid_config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroServeBatch));
    }

    #[test]
    fn validate_zero_timeouts_fail() {
        let cfg = CollectorConfig {
            request_timeout: Some(Duration::ZERO),
            ..valid_config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroRequestTimeout));

        let cfg = CollectorConfig {
            shutdown_timeout: Duration::ZERO,
            ..valid_config()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroShutdownTimeout));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn validate_max_steps_overflow_fails() {
        let cfg = CollectorConfig {
            max_steps: u32::MAX as usize + 1,
            ..valid_config()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MaxStepsOverflow { .. })
        ));
    }

    #[test]
    fn default_worker_count_in_range() {
        let n = CollectorConfig::default().num_workers;
        assert!((1..=64).contains(&n), "auto count {n} out of [1,64]");
    }

    #[test]
    fn check_schema_reports_component() {
        let a = ObsSchema::with_queue_size(3);
        let b = ObsSchema::with_queue_size(5);
        match CollectorConfig::check_schema(3, &a, &b) {
            Err(ConfigError::SchemaMismatch {
                worker, component, ..
            }) => {
                assert_eq!(worker, 3);
                assert_eq!(component, "queue");
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
        assert!(CollectorConfig::check_schema(1, &a, &a).is_ok());
    }

    #[test]
    fn engine_error_has_source() {
        let err = ConfigError::Engine {
            worker: 2,
            fault: EngineFault::Internal {
                reason: "boom".into(),
            },
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("worker 2"));
    }
}
