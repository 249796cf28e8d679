//! Worker pool: one OS thread per engine instance.
//!
//! Each worker blocks on the shared task queue, runs one episode per
//! task against its own engine, and reports the finished episode (or a
//! fatal error) to the session that queued the task. Engines never
//! leave their worker thread.
//!
//! Failure handling per task:
//!
//! - engine fault: counted against the session's ceiling and the
//!   episode is restarted from `reset()`; past the ceiling the request
//!   fails with [`CollectError::EngineFaultLimit`].
//! - decision fault: the request fails with [`CollectError::Decision`].
//!   `Cancelled` is not reported, the session is already gone.
//! - panic: caught, reported as [`CollectError::WorkerPanicked`]; the
//!   worker survives and resets its engine on the next task.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use tinyrl_core::{DecisionFault, EngineFault, ObsSchema, Simulation};

use crate::config::{CollectorConfig, ConfigError};
use crate::episode::{Episode, EpisodeBuffer};
use crate::error::CollectError;
use crate::queue::{EpisodeTask, WorkQueue};
use crate::session::{Session, WorkerEvent};

/// Identity handed to the engine factory for each worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerSlot {
    /// Worker index in `0..num_workers`.
    pub index: usize,
    /// Engine seed, `seed_base + index`.
    pub seed: u64,
}

/// Why one episode attempt stopped early.
enum EpisodeFailure {
    Engine(EngineFault),
    Decision(DecisionFault),
}

impl From<EngineFault> for EpisodeFailure {
    fn from(e: EngineFault) -> Self {
        Self::Engine(e)
    }
}

impl From<DecisionFault> for EpisodeFailure {
    fn from(e: DecisionFault) -> Self {
        Self::Decision(e)
    }
}

// ── WorkerPool ─────────────────────────────────────────────────────

/// Handles for the spawned worker threads.
pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

/// Outcome of [`WorkerPool::join_until`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct JoinOutcome {
    pub joined: usize,
    pub detached: usize,
}

impl WorkerPool {
    /// Build one engine per worker, check their schemas agree, and
    /// start the threads.
    ///
    /// Engines are built on the calling thread before any thread is
    /// spawned, so a factory failure leaves nothing running. If a spawn
    /// fails, `queue` is closed and the threads already started are
    /// joined before returning.
    pub fn spawn<S, F>(
        config: &CollectorConfig,
        mut factory: F,
        queue: &WorkQueue,
    ) -> Result<(Self, ObsSchema), ConfigError>
    where
        S: Simulation + 'static,
        F: FnMut(WorkerSlot) -> Result<S, EngineFault>,
    {
        let mut engines = Vec::with_capacity(config.num_workers);
        let mut schema: Option<ObsSchema> = None;
        for index in 0..config.num_workers {
            let slot = WorkerSlot {
                index,
                seed: config.seed_base.wrapping_add(index as u64),
            };
            let engine =
                factory(slot).map_err(|fault| ConfigError::Engine { worker: index, fault })?;
            let reported = engine.schema();
            match &schema {
                None => {
                    if reported.obs_dim() == 0 {
                        return Err(ConfigError::EmptySchema);
                    }
                    schema = Some(reported);
                }
                Some(expected) => CollectorConfig::check_schema(index, expected, &reported)?,
            }
            engines.push(engine);
        }
        let schema = schema.ok_or(ConfigError::ZeroWorkers)?;

        let mut handles = Vec::with_capacity(engines.len());
        for (index, engine) in engines.into_iter().enumerate() {
            let tasks = queue.consumer();
            let max_steps = config.max_steps;
            let spawned = thread::Builder::new()
                .name(format!("tinyrl-worker-{index}"))
                .spawn(move || worker_loop(index, engine, tasks, schema, max_steps));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    queue.close();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(ConfigError::ThreadSpawnFailed {
                        reason: format!("worker {index}: {e}"),
                    });
                }
            }
        }
        Ok((Self { handles }, schema))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Wait until every worker has exited or `deadline` passes, then
    /// join the exited ones and detach the rest.
    pub fn join_until(self, deadline: Instant) -> JoinOutcome {
        while !self.handles.iter().all(JoinHandle::is_finished) {
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let mut outcome = JoinOutcome::default();
        for handle in self.handles {
            if handle.is_finished() {
                // A worker thread never unwinds out of its loop; an Err
                // here would only mean a panic in logging.
                let _ = handle.join();
                outcome.joined += 1;
            } else {
                let name = handle.thread().name().unwrap_or("tinyrl-worker").to_owned();
                log::warn!("{name} did not exit before the shutdown deadline; detaching");
                outcome.detached += 1;
            }
        }
        outcome
    }
}

// ── Worker loop ────────────────────────────────────────────────────

fn worker_loop<S: Simulation>(
    index: usize,
    mut engine: S,
    tasks: Receiver<EpisodeTask>,
    schema: ObsSchema,
    max_steps: usize,
) {
    log::debug!("worker {index} started");
    let mut buffer = EpisodeBuffer::new(max_steps, schema.obs_dim());
    while let Ok(task) = tasks.recv() {
        run_task(index, &mut engine, &mut buffer, &task, &schema, max_steps);
    }
    log::debug!("worker {index} exiting");
}

/// Run `task` to completion, retrying on engine faults within the
/// session's ceiling.
fn run_task<S: Simulation>(
    index: usize,
    engine: &mut S,
    buffer: &mut EpisodeBuffer,
    task: &EpisodeTask,
    schema: &ObsSchema,
    max_steps: usize,
) {
    let session = &task.session;
    loop {
        if session.is_cancelled() {
            return;
        }
        buffer.clear();
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            run_episode(index, engine, buffer, session, schema, max_steps, task.id)
        }));
        match attempt {
            Ok(Ok(episode)) => {
                session.emit(WorkerEvent::Finished(episode));
                return;
            }
            Ok(Err(EpisodeFailure::Engine(fault))) => {
                session.metrics.engine_fault();
                match session.record_engine_fault() {
                    Ok(count) => {
                        log::warn!(
                            "worker {index}: engine fault {count} in request {}, restarting episode {}: {fault}",
                            session.id(),
                            task.id
                        );
                    }
                    Err(faults) => {
                        log::error!(
                            "worker {index}: engine fault limit exceeded in request {}: {fault}",
                            session.id()
                        );
                        session.emit(WorkerEvent::Fatal(CollectError::EngineFaultLimit {
                            faults,
                            last: fault,
                        }));
                        return;
                    }
                }
            }
            Ok(Err(EpisodeFailure::Decision(DecisionFault::Cancelled))) => return,
            Ok(Err(EpisodeFailure::Decision(fault))) => {
                session.emit(WorkerEvent::Fatal(CollectError::Decision(fault)));
                return;
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                session.metrics.worker_panic();
                log::error!("worker {index} panicked in episode {}: {message}", task.id);
                session.emit(WorkerEvent::Fatal(CollectError::WorkerPanicked {
                    worker: index,
                    message,
                }));
                return;
            }
        }
    }
}

/// Play one episode from `reset()` until the game ends or `max_steps`
/// steps have been taken.
fn run_episode<S: Simulation>(
    index: usize,
    engine: &mut S,
    buffer: &mut EpisodeBuffer,
    session: &Session,
    schema: &ObsSchema,
    max_steps: usize,
    id: u64,
) -> Result<Episode, EpisodeFailure> {
    let mut observation = engine.reset()?;
    observation.validate(schema)?;
    loop {
        if session.is_cancelled() {
            return Err(DecisionFault::Cancelled.into());
        }
        let decision = session.decide(index, &observation)?;
        let outcome = engine.step(decision.action)?;
        outcome.observation.validate(schema)?;
        let truncated = !outcome.done && buffer.len() + 1 >= max_steps;
        buffer.push(
            &observation,
            &decision,
            outcome.reward,
            outcome.done || truncated,
        );
        if outcome.done || truncated {
            return Ok(buffer.finish(id, index, truncated));
        }
        observation = outcome.observation;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tinyrl_core::{Action, Decision, GridShape, Observation, StepOutcome};

    use crate::bridge::{self, DecisionFn};
    use crate::metrics::MetricsRecorder;

    fn tiny_schema() -> ObsSchema {
        ObsSchema {
            board: GridShape::new(2, 2),
            active_piece: GridShape::new(1, 1),
            queue: GridShape::new(1, 1),
            held: GridShape::new(1, 1),
        }
    }

    /// Ends after `horizon` steps, optionally faulting on chosen resets.
    struct Countdown {
        horizon: usize,
        t: usize,
        resets: usize,
        fault_on_reset: Vec<usize>,
        panic_on_step: bool,
    }

    impl Countdown {
        fn new(horizon: usize) -> Self {
            Self {
                horizon,
                t: 0,
                resets: 0,
                fault_on_reset: Vec::new(),
                panic_on_step: false,
            }
        }
    }

    impl Simulation for Countdown {
        fn schema(&self) -> ObsSchema {
            tiny_schema()
        }

        fn reset(&mut self) -> Result<Observation, EngineFault> {
            self.resets += 1;
            self.t = 0;
            if self.fault_on_reset.contains(&self.resets) {
                return Err(EngineFault::Internal {
                    reason: format!("reset {}", self.resets),
                });
            }
            Ok(Observation::zeros(&tiny_schema()))
        }

        fn step(&mut self, _action: Action) -> Result<StepOutcome, EngineFault> {
            assert!(!self.panic_on_step, "step exploded");
            self.t += 1;
            Ok(StepOutcome {
                observation: Observation::zeros(&tiny_schema()),
                reward: 1.0,
                done: self.t >= self.horizon,
            })
        }
    }

    fn session(max_faults: u32) -> (Arc<Session>, Receiver<WorkerEvent>) {
        let metrics = Arc::new(MetricsRecorder::default());
        let policy = |_: &Observation| -> Result<Decision, DecisionFault> {
            Ok(Decision::new(Action::SoftDrop, -0.5, 0.0))
        };
        let (route, _) = bridge::open(DecisionFn::shared(policy), 1, 1, &metrics);
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(Session::new(0, route, tx, max_faults, metrics)), rx)
    }

    fn run(engine: &mut Countdown, max_steps: usize, max_faults: u32) -> WorkerEvent {
        let (session, rx) = session(max_faults);
        let task = EpisodeTask { id: 9, session };
        let schema = tiny_schema();
        let mut buffer = EpisodeBuffer::new(max_steps, schema.obs_dim());
        run_task(0, engine, &mut buffer, &task, &schema, max_steps);
        rx.try_recv().expect("worker emitted nothing")
    }

    #[test]
    fn terminal_episode_is_not_truncated() {
        let mut engine = Countdown::new(3);
        match run(&mut engine, 10, 0) {
            WorkerEvent::Finished(ep) => {
                assert_eq!(ep.len(), 3);
                assert_eq!(ep.id(), 9);
                assert!(!ep.truncated());
                assert_eq!(ep.dones, vec![0, 0, 1]);
            }
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[test]
    fn long_episode_truncated_at_max_steps() {
        let mut engine = Countdown::new(100);
        match run(&mut engine, 4, 0) {
            WorkerEvent::Finished(ep) => {
                assert_eq!(ep.len(), 4);
                assert!(ep.truncated());
                assert_eq!(ep.dones, vec![0, 0, 0, 1]);
            }
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[test]
    fn engine_fault_is_retried_within_ceiling() {
        let mut engine = Countdown::new(2);
        engine.fault_on_reset = vec![1, 2];
        match run(&mut engine, 10, 2) {
            WorkerEvent::Finished(ep) => assert_eq!(ep.len(), 2),
            other => panic!("expected Finished, got {other:?}"),
        }
        assert_eq!(engine.resets, 3);
    }

    #[test]
    fn engine_fault_past_ceiling_is_fatal() {
        let mut engine = Countdown::new(2);
        engine.fault_on_reset = vec![1, 2];
        match run(&mut engine, 10, 1) {
            WorkerEvent::Fatal(CollectError::EngineFaultLimit { faults, .. }) => {
                assert_eq!(faults, 2)
            }
            other => panic!("expected EngineFaultLimit, got {other:?}"),
        }
    }

    #[test]
    fn panic_is_caught_and_reported() {
        let mut engine = Countdown::new(2);
        engine.panic_on_step = true;
        match run(&mut engine, 10, 0) {
            WorkerEvent::Fatal(CollectError::WorkerPanicked { worker, message }) => {
                assert_eq!(worker, 0);
                assert!(message.contains("step exploded"));
            }
            other => panic!("expected WorkerPanicked, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_session_skips_task() {
        let (session, rx) = session(0);
        session.cancel();
        let task = EpisodeTask { id: 0, session };
        let schema = tiny_schema();
        let mut engine = Countdown::new(2);
        let mut buffer = EpisodeBuffer::new(4, schema.obs_dim());
        run_task(0, &mut engine, &mut buffer, &task, &schema, 4);
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.resets, 0);
    }

    #[test]
    fn pool_rejects_mismatched_schemas() {
        struct Wide;
        impl Simulation for Wide {
            fn schema(&self) -> ObsSchema {
                ObsSchema::with_queue_size(2)
            }
            fn reset(&mut self) -> Result<Observation, EngineFault> {
                Ok(Observation::zeros(&self.schema()))
            }
            fn step(&mut self, _: Action) -> Result<StepOutcome, EngineFault> {
                unreachable!()
            }
        }
        let config = CollectorConfig::new(2, 5, 4);
        let queue = WorkQueue::new(4);
        let mut built = 0;
        let result = WorkerPool::spawn(
            &config,
            |slot: WorkerSlot| -> Result<Box<dyn Simulation>, EngineFault> {
                built += 1;
                if slot.index == 0 {
                    Ok(Box::new(Countdown::new(1)))
                } else {
                    Ok(Box::new(Wide))
                }
            },
            &queue,
        );
        assert!(matches!(result, Err(ConfigError::SchemaMismatch { worker: 1, .. })));
        assert_eq!(built, 2);
    }

    #[test]
    fn pool_reports_factory_failure_and_seeds() {
        let config = CollectorConfig {
            seed_base: 100,
            ..CollectorConfig::new(3, 5, 4)
        };
        let queue = WorkQueue::new(4);
        let mut seeds = Vec::new();
        let result = WorkerPool::spawn(
            &config,
            |slot: WorkerSlot| {
                seeds.push(slot.seed);
                if slot.index == 2 {
                    Err(EngineFault::Internal {
                        reason: "no gpu".into(),
                    })
                } else {
                    Ok(Countdown::new(1))
                }
            },
            &queue,
        );
        assert!(matches!(result, Err(ConfigError::Engine { worker: 2, .. })));
        assert_eq!(seeds, vec![100, 101, 102]);
    }

    #[test]
    fn pool_spawns_and_joins_after_close() {
        let config = CollectorConfig::new(2, 5, 4);
        let queue = WorkQueue::new(4);
        let (pool, schema) =
            WorkerPool::spawn(&config, |_| Ok(Countdown::new(1)), &queue).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(schema, tiny_schema());
        queue.close();
        let outcome = pool.join_until(Instant::now() + Duration::from_secs(5));
        assert_eq!(outcome, JoinOutcome { joined: 2, detached: 0 });
    }
}
