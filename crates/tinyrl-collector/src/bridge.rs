//! Decision bridge between worker threads and the decision function.
//!
//! Two disciplines, selected by the [`DecisionFn`] variant passed to
//! `request_episodes`:
//!
//! ```text
//! Direct (SharedPolicy)            Serialized (Policy)
//!
//! Worker 0 ──decide()──┐           Worker 0 ──DecisionRequest──┐
//! Worker 1 ──decide()──┼─> policy  Worker 1 ──DecisionRequest──┼─> [req_tx: bounded(N)]
//! Worker N ──decide()──┘           Worker N ──DecisionRequest──┘          │
//!                                                       request thread: drain ≤ serve_batch_size
//!                                                       policy.decide_batch(&obs)
//!                                                       reply via per-request bounded(1)
//! ```
//!
//! Every request gets exactly one reply. A worker blocks on its reply
//! before issuing the next request, so per-worker order is preserved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use tinyrl_core::{Decision, DecisionFault, Observation, Policy, SharedPolicy};

use crate::metrics::MetricsRecorder;

/// How often a worker blocked on a reply re-checks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// The decision function for one collection request.
pub enum DecisionFn<'p> {
    /// Safe for concurrent calls; invoked directly on worker threads.
    Shared(Arc<dyn SharedPolicy>),
    /// Single-threaded; invoked only on the thread that called
    /// `request_episodes`.
    Exclusive(&'p mut dyn Policy),
}

impl<'p> DecisionFn<'p> {
    /// Wrap a thread-safe policy for direct-call mode.
    pub fn shared<P: SharedPolicy + 'static>(policy: P) -> Self {
        Self::Shared(Arc::new(policy))
    }

    /// Borrow a single-threaded policy for serialized mode.
    pub fn exclusive<P: Policy>(policy: &'p mut P) -> Self {
        Self::Exclusive(policy)
    }

    /// `true` for serialized mode.
    pub fn is_serialized(&self) -> bool {
        matches!(self, Self::Exclusive(_))
    }
}

impl std::fmt::Debug for DecisionFn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared(_) => f.write_str("DecisionFn::Shared"),
            Self::Exclusive(_) => f.write_str("DecisionFn::Exclusive"),
        }
    }
}

/// A worker's request for a decision, serialized mode only.
pub(crate) struct DecisionRequest {
    pub worker: usize,
    pub observation: Observation,
    pub reply: Sender<Result<Decision, DecisionFault>>,
}

/// Worker-side handle onto the bridge.
pub(crate) enum DecisionRoute {
    Direct {
        policy: Arc<dyn SharedPolicy>,
        metrics: Arc<MetricsRecorder>,
    },
    Serialized {
        requests: Sender<DecisionRequest>,
    },
}

impl DecisionRoute {
    /// Obtain a decision for `observation`, blocking until one is
    /// available or `cancelled` is raised.
    pub fn decide(
        &self,
        worker: usize,
        observation: &Observation,
        cancelled: &AtomicBool,
    ) -> Result<Decision, DecisionFault> {
        match self {
            Self::Direct { policy, metrics } => {
                let decision = policy.decide(observation)?;
                decision.validate()?;
                metrics.decisions(1);
                Ok(decision)
            }
            Self::Serialized { requests } => {
                let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
                requests
                    .send(DecisionRequest {
                        worker,
                        observation: observation.clone(),
                        reply: reply_tx,
                    })
                    .map_err(|_| DecisionFault::Cancelled)?;
                loop {
                    match reply_rx.recv_timeout(CANCEL_POLL) {
                        Ok(result) => return result,
                        Err(RecvTimeoutError::Timeout) => {
                            if cancelled.load(Ordering::Acquire) {
                                return Err(DecisionFault::Cancelled);
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(DecisionFault::Cancelled)
                        }
                    }
                }
            }
        }
    }
}

/// Request-thread side of serialized mode.
pub(crate) struct DecisionServer<'p> {
    policy: &'p mut dyn Policy,
    requests: Receiver<DecisionRequest>,
    batch_size: usize,
    metrics: Arc<MetricsRecorder>,
}

impl<'p> DecisionServer<'p> {
    /// Receiver the request loop selects on.
    pub fn requests(&self) -> &Receiver<DecisionRequest> {
        &self.requests
    }

    /// Serve `first` together with whatever else is already queued, up
    /// to `batch_size` requests, with one `decide_batch` call.
    ///
    /// Every drained request is answered, including on failure.
    /// Returns the number of decisions served.
    pub fn serve(&mut self, first: DecisionRequest) -> Result<usize, DecisionFault> {
        let mut batch = Vec::with_capacity(self.batch_size);
        batch.push(first);
        while batch.len() < self.batch_size {
            match self.requests.try_recv() {
                Ok(req) => batch.push(req),
                Err(_) => break,
            }
        }

        let observations: Vec<&Observation> = batch.iter().map(|r| &r.observation).collect();
        let result = self
            .policy
            .decide_batch(&observations)
            .and_then(|decisions| {
                if decisions.len() != observations.len() {
                    return Err(DecisionFault::BatchSizeMismatch {
                        expected: observations.len(),
                        actual: decisions.len(),
                    });
                }
                decisions.iter().try_for_each(Decision::validate)?;
                Ok(decisions)
            });
        self.metrics.decision_batch();

        match result {
            Ok(decisions) => {
                let n = decisions.len();
                for (req, decision) in batch.into_iter().zip(decisions) {
                    // Best-effort: the worker may have abandoned the episode.
                    let _ = req.reply.send(Ok(decision));
                }
                self.metrics.decisions(n);
                Ok(n)
            }
            Err(fault) => {
                let workers: Vec<usize> = batch.iter().map(|r| r.worker).collect();
                log::debug!("decide_batch failed for workers {workers:?}: {fault}");
                for req in batch {
                    let _ = req.reply.send(Err(fault.clone()));
                }
                Err(fault)
            }
        }
    }

    /// Answer every queued request with [`DecisionFault::Cancelled`].
    pub fn cancel_pending(&mut self) -> usize {
        let mut n = 0;
        while let Ok(req) = self.requests.try_recv() {
            let _ = req.reply.send(Err(DecisionFault::Cancelled));
            n += 1;
        }
        n
    }
}

/// Open the bridge for one request.
///
/// Returns the worker-side route and, in serialized mode, the server
/// the request thread must drive.
pub(crate) fn open<'p>(
    decision_fn: DecisionFn<'p>,
    num_workers: usize,
    serve_batch_size: usize,
    metrics: &Arc<MetricsRecorder>,
) -> (DecisionRoute, Option<DecisionServer<'p>>) {
    match decision_fn {
        DecisionFn::Shared(policy) => (
            DecisionRoute::Direct {
                policy,
                metrics: Arc::clone(metrics),
            },
            None,
        ),
        DecisionFn::Exclusive(policy) => {
            // Each worker has at most one request outstanding.
            let (tx, rx) = crossbeam_channel::bounded(num_workers);
            (
                DecisionRoute::Serialized { requests: tx },
                Some(DecisionServer {
                    policy,
                    requests: rx,
                    batch_size: serve_batch_size,
                    metrics: Arc::clone(metrics),
                }),
            )
        }
    }
}
