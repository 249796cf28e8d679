//! Bounded multi-producer multi-consumer queue of episode tasks.
//!
//! The request thread is the only producer; every worker is a consumer.
//! Closing the queue drops the last sender, so each worker's blocking
//! `recv` returns `Err` once the backlog is drained and the worker
//! exits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};

use crate::session::Session;

/// One unit of work: run a single episode for `session`.
#[derive(Debug)]
pub(crate) struct EpisodeTask {
    /// Collector-wide unique, monotonically increasing.
    pub id: u64,
    pub session: Arc<Session>,
}

pub(crate) struct WorkQueue {
    tx: Mutex<Option<Sender<EpisodeTask>>>,
    rx: Receiver<EpisodeTask>,
    capacity: usize,
    next_id: AtomicU64,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            capacity,
            next_id: AtomicU64::new(0),
        }
    }

    /// A producer handle, or `None` once the queue is closed.
    pub fn producer(&self) -> Option<Sender<EpisodeTask>> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A consumer handle for a worker.
    pub fn consumer(&self) -> Receiver<EpisodeTask> {
        self.rx.clone()
    }

    /// Build the next task for `session` with a fresh id.
    pub fn next_task(&self, session: &Arc<Session>) -> EpisodeTask {
        EpisodeTask {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            session: Arc::clone(session),
        }
    }

    /// Drop the queue's sender. Workers drain what is left and exit.
    /// Returns `false` if the queue was already closed.
    pub fn close(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    /// Discard queued tasks. Returns how many were dropped.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Tasks queued but not yet taken by a worker.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
