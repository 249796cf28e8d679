//! Cumulative collector counters.
//!
//! Workers and the request thread bump [`MetricsRecorder`] atomics;
//! [`Collector::metrics`](crate::Collector::metrics) returns a
//! [`CollectorMetrics`] snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of cumulative counters since the collector was built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectorMetrics {
    /// `request_episodes` calls that returned a batch.
    pub requests_completed: u64,
    /// `request_episodes` calls that returned an error.
    pub requests_failed: u64,
    /// Episodes delivered to the assembler.
    pub episodes_completed: u64,
    /// Steps in delivered episodes.
    pub steps_executed: u64,
    /// Decisions returned by the decision function.
    pub decisions_served: u64,
    /// `decide_batch` calls made by the serialized serving loop.
    pub decision_batches: u64,
    /// Engine faults recovered or escalated.
    pub engine_faults: u64,
    /// Delivered episodes that hit the step cap.
    pub truncated_episodes: u64,
    /// Panics caught on worker threads.
    pub worker_panics: u64,
}

#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    requests_completed: AtomicU64,
    requests_failed: AtomicU64,
    episodes_completed: AtomicU64,
    steps_executed: AtomicU64,
    decisions_served: AtomicU64,
    decision_batches: AtomicU64,
    engine_faults: AtomicU64,
    truncated_episodes: AtomicU64,
    worker_panics: AtomicU64,
}

impl MetricsRecorder {
    pub fn request_finished(&self, ok: bool) {
        let counter = if ok {
            &self.requests_completed
        } else {
            &self.requests_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn episode(&self, steps: usize, truncated: bool) {
        self.episodes_completed.fetch_add(1, Ordering::Relaxed);
        self.steps_executed
            .fetch_add(steps as u64, Ordering::Relaxed);
        if truncated {
            self.truncated_episodes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn decisions(&self, n: usize) {
        self.decisions_served.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn decision_batch(&self) {
        self.decision_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn engine_fault(&self) {
        self.engine_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_panic(&self) {
        self.worker_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CollectorMetrics {
        CollectorMetrics {
            requests_completed: self.requests_completed.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            episodes_completed: self.episodes_completed.load(Ordering::Relaxed),
            steps_executed: self.steps_executed.load(Ordering::Relaxed),
            decisions_served: self.decisions_served.load(Ordering::Relaxed),
            decision_batches: self.decision_batches.load(Ordering::Relaxed),
            engine_faults: self.engine_faults.load(Ordering::Relaxed),
            truncated_episodes: self.truncated_episodes.load(Ordering::Relaxed),
            worker_panics: self.worker_panics.load(Ordering::Relaxed),
        }
    }
}
