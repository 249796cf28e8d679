//! Per-request state shared by the request thread and the workers.
//!
//! One [`Session`] exists per `request_episodes` call. Every task queued
//! for that call carries an `Arc<Session>`, so a worker always reports
//! to the request that created its task, and a cancelled session makes
//! its leftover tasks inert.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use tinyrl_core::{Decision, DecisionFault, Observation};

use crate::bridge::DecisionRoute;
use crate::episode::Episode;
use crate::error::CollectError;
use crate::metrics::MetricsRecorder;

/// Message from a worker to the request thread.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    /// An episode finished.
    Finished(Episode),
    /// The request cannot complete.
    Fatal(CollectError),
}

pub(crate) struct Session {
    id: u64,
    cancelled: AtomicBool,
    engine_faults: AtomicU32,
    max_engine_faults: u32,
    route: DecisionRoute,
    events: Sender<WorkerEvent>,
    pub(crate) metrics: Arc<MetricsRecorder>,
}

impl Session {
    pub fn new(
        id: u64,
        route: DecisionRoute,
        events: Sender<WorkerEvent>,
        max_engine_faults: u32,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            id,
            cancelled: AtomicBool::new(false),
            engine_faults: AtomicU32::new(0),
            max_engine_faults,
            route,
            events,
            metrics,
        }
    }

    /// Request number, for log lines.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Stop workers from starting or continuing episodes for this
    /// session. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Count one engine fault. Returns `Err(count)` once the ceiling
    /// is exceeded.
    pub fn record_engine_fault(&self) -> Result<u32, u32> {
        let count = self.engine_faults.fetch_add(1, Ordering::AcqRel) + 1;
        if count > self.max_engine_faults {
            Err(count)
        } else {
            Ok(count)
        }
    }

    /// Send an event to the request thread. A closed channel means the
    /// request has already returned; the event is dropped.
    pub fn emit(&self, event: WorkerEvent) {
        if self.events.send(event).is_err() {
            self.cancel();
        }
    }

    pub fn decide(&self, worker: usize, observation: &Observation) -> Result<Decision, DecisionFault> {
        if self.is_cancelled() {
            return Err(DecisionFault::Cancelled);
        }
        self.route.decide(worker, observation, &self.cancelled)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .field("engine_faults", &self.engine_faults.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
