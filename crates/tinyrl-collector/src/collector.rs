//! The collector facade: construction, synchronous collection, shutdown.
//!
//! # Request loop
//!
//! `request_episodes` runs on the caller's thread and multiplexes over:
//!
//! ```text
//!   ┌─────────────── Select ───────────────┐
//!   │ send   work queue     (while fed < count)
//!   │ recv   worker events  (Finished / Fatal)
//!   │ recv   decision requests (serialized mode)
//!   │ recv   shutdown signal  (disconnect = close)
//!   │ deadline               (request_timeout)
//!   └───────────────────────────────────────┘
//! ```
//!
//! Feeding tasks from the same loop that serves decisions means a full
//! work queue can never starve the decision server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Instant;

use crossbeam_channel::{Receiver, Select, Sender};

use tinyrl_core::{Action, EngineFault, ObsSchema, Simulation};

use crate::assembler::BatchAssembler;
use crate::batch::EpisodeBatch;
use crate::bridge::{self, DecisionFn, DecisionServer};
use crate::config::{CollectorConfig, ConcurrentRequestPolicy, ConfigError};
use crate::error::CollectError;
use crate::metrics::{CollectorMetrics, MetricsRecorder};
use crate::queue::{EpisodeTask, WorkQueue};
use crate::session::{Session, WorkerEvent};
use crate::worker::{WorkerPool, WorkerSlot};

// ── CollectorState ─────────────────────────────────────────────────

/// Lifecycle state of a [`Collector`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectorState {
    /// No request in flight.
    Idle,
    /// A `request_episodes` call is running.
    Collecting,
    /// `close()` has been called. Terminal.
    Closed,
}

// ── ShutdownReport ─────────────────────────────────────────────────

/// What [`Collector::close`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Wall time spent in `close()`.
    pub total_ms: u64,
    /// Worker threads that exited and were joined.
    pub workers_joined: usize,
    /// Worker threads still running at the deadline and left detached.
    pub workers_detached: usize,
    /// Queued tasks discarded without being run.
    pub tasks_discarded: usize,
}

// ── Collector ──────────────────────────────────────────────────────

/// A fixed pool of simulation workers that turns a decision function
/// into padded batches of complete episodes.
///
/// # Example
///
/// ```no_run
/// use tinyrl_collector::{Collector, CollectorConfig, DecisionFn};
/// use tinyrl_core::{Action, Decision, DecisionFault, Observation};
/// # use tinyrl_core::{EngineFault, ObsSchema, Simulation, StepOutcome};
/// # struct Game;
/// # impl Simulation for Game {
/// #     fn schema(&self) -> ObsSchema { ObsSchema::default() }
/// #     fn reset(&mut self) -> Result<Observation, EngineFault> { Ok(Observation::zeros(&ObsSchema::default())) }
/// #     fn step(&mut self, _: Action) -> Result<StepOutcome, EngineFault> { unimplemented!() }
/// # }
///
/// let collector = Collector::new(CollectorConfig::new(4, 300, 64), |_slot| Ok(Game)).unwrap();
/// let policy = |_: &Observation| -> Result<Decision, DecisionFault> {
///     Ok(Decision::new(Action::HardDrop, 0.0, 0.0))
/// };
/// let batch = collector.request_episodes(16, DecisionFn::shared(policy)).unwrap();
/// assert_eq!(batch.count(), 16);
/// collector.close();
/// ```
pub struct Collector {
    config: CollectorConfig,
    schema: ObsSchema,
    queue: WorkQueue,
    pool: Mutex<Option<WorkerPool>>,
    state: Mutex<CollectorState>,
    request_lock: Mutex<()>,
    active: Mutex<Option<Arc<Session>>>,
    // Never sent on. Dropping the sender is the close signal.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    metrics: Arc<MetricsRecorder>,
    next_request: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Collector {
    /// Validate `config`, build one engine per worker with `factory`,
    /// and start the worker threads.
    ///
    /// Worker `i` receives `WorkerSlot { index: i, seed: seed_base + i }`.
    /// All engines must report the same [`ObsSchema`].
    pub fn new<S, F>(config: CollectorConfig, factory: F) -> Result<Self, ConfigError>
    where
        S: Simulation + 'static,
        F: FnMut(WorkerSlot) -> Result<S, EngineFault>,
    {
        config.validate()?;
        let queue = WorkQueue::new(config.queue_capacity);
        let (pool, schema) = WorkerPool::spawn(&config, factory, &queue)?;
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        log::info!(
            "collector started: {} workers, max_steps {}, obs_dim {}",
            pool.len(),
            config.max_steps,
            schema.obs_dim()
        );
        Ok(Self {
            config,
            schema,
            queue,
            pool: Mutex::new(Some(pool)),
            state: Mutex::new(CollectorState::Idle),
            request_lock: Mutex::new(()),
            active: Mutex::new(None),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            metrics: Arc::new(MetricsRecorder::default()),
            next_request: AtomicU64::new(0),
        })
    }

    /// Collect exactly `count` complete episodes with `decision_fn`,
    /// blocking until they are all assembled.
    ///
    /// Rows are in completion order. On any error the in-flight
    /// episodes are cancelled and their partial results discarded.
    pub fn request_episodes(
        &self,
        count: usize,
        decision_fn: DecisionFn<'_>,
    ) -> Result<EpisodeBatch, CollectError> {
        if count == 0 {
            return Err(CollectError::ZeroCount);
        }
        if self.is_closed() {
            return Err(CollectError::Closed);
        }
        let _exclusive = match self.config.concurrent_requests {
            ConcurrentRequestPolicy::Reject => match self.request_lock.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => return Err(CollectError::Busy),
                Err(TryLockError::Poisoned(p)) => p.into_inner(),
            },
            ConcurrentRequestPolicy::Wait => lock(&self.request_lock),
        };

        let result = self.collect(count, decision_fn);
        self.metrics.request_finished(result.is_ok());
        match &result {
            Ok(batch) => log::debug!(
                "request complete: {} episodes, {} steps",
                batch.count(),
                batch.total_steps()
            ),
            Err(CollectError::Closed) => log::debug!("request aborted by close()"),
            Err(e) => log::error!("request failed: {e}"),
        }
        result
    }

    fn collect(&self, count: usize, decision_fn: DecisionFn<'_>) -> Result<EpisodeBatch, CollectError> {
        {
            let mut state = lock(&self.state);
            if *state == CollectorState::Closed {
                return Err(CollectError::Closed);
            }
            *state = CollectorState::Collecting;
        }

        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let serialized = decision_fn.is_serialized();
        let (route, server) = bridge::open(
            decision_fn,
            self.config.num_workers,
            self.config.serve_batch_size,
            &self.metrics,
        );
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let session = Arc::new(Session::new(
            id,
            route,
            events_tx,
            self.config.max_engine_faults,
            Arc::clone(&self.metrics),
        ));
        *lock(&self.active) = Some(Arc::clone(&session));
        let mut request = ActiveRequest {
            collector: self,
            session,
            server,
        };
        log::debug!(
            "request {id}: {count} episodes, {} mode, queue {}/{}",
            if serialized { "serialized" } else { "direct" },
            self.queue.pending(),
            self.queue.capacity()
        );

        let producer = self.queue.producer().ok_or(CollectError::Closed)?;
        request.run(count, &producer, &events_rx)
    }

    /// Shut the collector down. Idempotent; safe to call while a
    /// request is in flight, which then fails with
    /// [`CollectError::Closed`].
    ///
    /// Workers get `shutdown_timeout` to finish their current step;
    /// any still running after that are detached.
    pub fn close(&self) -> ShutdownReport {
        {
            let mut state = lock(&self.state);
            if *state == CollectorState::Closed {
                return ShutdownReport::default();
            }
            *state = CollectorState::Closed;
        }
        let start = Instant::now();
        log::info!("closing collector");

        if let Some(session) = lock(&self.active).take() {
            session.cancel();
        }
        lock(&self.shutdown_tx).take();
        self.queue.close();
        let tasks_discarded = self.queue.drain();

        let outcome = lock(&self.pool)
            .take()
            .map(|pool| pool.join_until(start + self.config.shutdown_timeout))
            .unwrap_or_default();

        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            workers_joined: outcome.joined,
            workers_detached: outcome.detached,
            tasks_discarded,
        };
        log::info!(
            "collector closed in {} ms: {} joined, {} detached",
            report.total_ms,
            report.workers_joined,
            report.workers_detached
        );
        report
    }

    /// Length of one flattened observation.
    pub fn obs_dim(&self) -> usize {
        self.schema.obs_dim()
    }

    /// Observation layout shared by every engine.
    pub fn obs_schema(&self) -> ObsSchema {
        self.schema
    }

    /// Number of discrete actions.
    pub fn action_count(&self) -> usize {
        Action::COUNT
    }

    /// Number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Step cap per episode.
    pub fn max_steps(&self) -> usize {
        self.config.max_steps
    }

    /// The configuration this collector was built with.
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CollectorState {
        *lock(&self.state)
    }

    /// `true` after `close()`.
    pub fn is_closed(&self) -> bool {
        self.state() == CollectorState::Closed
    }

    /// Snapshot of cumulative counters.
    pub fn metrics(&self) -> CollectorMetrics {
        self.metrics.snapshot()
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("num_workers", &self.config.num_workers)
            .field("max_steps", &self.config.max_steps)
            .field("obs_dim", &self.schema.obs_dim())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── ActiveRequest ──────────────────────────────────────────────────

/// One in-flight request. Dropping it cancels the session, answers
/// any queued decision requests, and returns the collector to `Idle`,
/// also when the decision function panics on this thread.
struct ActiveRequest<'c, 'p> {
    collector: &'c Collector,
    session: Arc<Session>,
    server: Option<DecisionServer<'p>>,
}

enum Ready {
    Event,
    Shutdown,
    Decision,
    Feed,
}

impl ActiveRequest<'_, '_> {
    fn run(
        &mut self,
        count: usize,
        producer: &Sender<EpisodeTask>,
        events: &Receiver<WorkerEvent>,
    ) -> Result<EpisodeBatch, CollectError> {
        let collector = self.collector;
        let config = &collector.config;
        let shutdown = &collector.shutdown_rx;
        let decisions = self.server.as_ref().map(|s| s.requests().clone());
        let deadline = config.request_timeout.map(|t| Instant::now() + t);
        let mut assembler = BatchAssembler::new(
            count,
            config.max_steps,
            collector.schema.obs_dim(),
            config.padding,
        );
        let mut fed = 0usize;

        loop {
            let mut sel = Select::new();
            let mut arms = Vec::with_capacity(4);
            arms.push((sel.recv(events), Ready::Event));
            arms.push((sel.recv(shutdown), Ready::Shutdown));
            if let Some(rx) = &decisions {
                arms.push((sel.recv(rx), Ready::Decision));
            }
            if fed < count {
                arms.push((sel.send(producer), Ready::Feed));
            }

            let op = match deadline {
                Some(d) => match sel.select_deadline(d) {
                    Ok(op) => op,
                    Err(_) => {
                        return Err(CollectError::Timeout {
                            completed: assembler.len(),
                            requested: count,
                        })
                    }
                },
                None => sel.select(),
            };
            let ready = arms
                .iter()
                .find(|(index, _)| *index == op.index())
                .map(|(_, ready)| ready);

            match ready {
                Some(Ready::Event) => match op.recv(events) {
                    Ok(WorkerEvent::Finished(episode)) => {
                        collector
                            .metrics
                            .episode(episode.len(), episode.truncated());
                        if assembler.push(episode)? {
                            return Ok(assembler.finish()?);
                        }
                    }
                    Ok(WorkerEvent::Fatal(e)) => return Err(e),
                    Err(_) => return Err(CollectError::Disconnected),
                },
                Some(Ready::Shutdown) => {
                    // Only ever completes with a disconnect.
                    let _ = op.recv(shutdown);
                    return Err(CollectError::Closed);
                }
                Some(Ready::Decision) => {
                    let (Some(rx), Some(server)) = (&decisions, self.server.as_mut()) else {
                        return Err(CollectError::Disconnected);
                    };
                    let request = op.recv(rx).map_err(|_| CollectError::Disconnected)?;
                    server.serve(request)?;
                }
                Some(Ready::Feed) => {
                    let task = collector.queue.next_task(&self.session);
                    op.send(producer, task)
                        .map_err(|_| CollectError::Closed)?;
                    fed += 1;
                }
                None => return Err(CollectError::Disconnected),
            }
        }
    }
}

impl Drop for ActiveRequest<'_, '_> {
    fn drop(&mut self) {
        self.session.cancel();
        if let Some(server) = self.server.as_mut() {
            let n = server.cancel_pending();
            if n > 0 {
                log::debug!("request {}: cancelled {n} pending decisions", self.session.id());
            }
        }
        let collector = self.collector;
        lock(&collector.active).take();
        let mut state = lock(&collector.state);
        if *state != CollectorState::Closed {
            // Tasks left in the queue all belong to this session.
            collector.queue.drain();
            *state = CollectorState::Idle;
        }
    }
}
