use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use tinyrl_core::{Action, Decision, DecisionFault, Observation, Policy, SharedPolicy};

/// Uniform over the seven actions, with a seeded RNG.
///
/// Deterministic when called from a single thread.
pub struct RandomPolicy {
    rng: Mutex<ChaCha8Rng>,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    fn sample(&self) -> Decision {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let action = Action::ALL[rng.random_range(0..Action::COUNT)];
        let value = rng.random::<f64>() * 2.0 - 1.0;
        Decision::new(action, -(Action::COUNT as f64).ln(), value)
    }
}

impl SharedPolicy for RandomPolicy {
    fn decide(&self, _: &Observation) -> Result<Decision, DecisionFault> {
        Ok(self.sample())
    }
}

impl Policy for RandomPolicy {
    fn decide(&mut self, _: &Observation) -> Result<Decision, DecisionFault> {
        Ok(self.sample())
    }
}

/// Always returns the same action and counts every call.
///
/// `decide_batch` is overridden so batched serving is visible in
/// [`batches`](CountingPolicy::batches).
pub struct CountingPolicy {
    action: Action,
    calls: AtomicUsize,
    batches: AtomicUsize,
}

impl CountingPolicy {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            calls: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
        }
    }

    /// Observations decided so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `decide_batch` invocations so far.
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn count(&self, n: usize) -> Decision {
        self.calls.fetch_add(n, Ordering::SeqCst);
        Decision::new(self.action, 0.0, 0.0)
    }
}

impl SharedPolicy for CountingPolicy {
    fn decide(&self, _: &Observation) -> Result<Decision, DecisionFault> {
        Ok(self.count(1))
    }
}

impl Policy for CountingPolicy {
    fn decide(&mut self, _: &Observation) -> Result<Decision, DecisionFault> {
        Ok(self.count(1))
    }

    fn decide_batch(&mut self, observations: &[&Observation]) -> Result<Vec<Decision>, DecisionFault> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let d = self.count(observations.len());
        Ok(vec![d; observations.len()])
    }
}

/// Sleeps before every decision.
pub struct SlowPolicy {
    delay: Duration,
}

impl SlowPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl SharedPolicy for SlowPolicy {
    fn decide(&self, _: &Observation) -> Result<Decision, DecisionFault> {
        thread::sleep(self.delay);
        Ok(Decision::new(Action::SoftDrop, 0.0, 0.0))
    }
}

impl Policy for SlowPolicy {
    fn decide(&mut self, obs: &Observation) -> Result<Decision, DecisionFault> {
        SharedPolicy::decide(self, obs)
    }
}

/// Succeeds `ok_calls` times, then fails every call.
pub struct FailingPolicy {
    ok_calls: usize,
    calls: AtomicUsize,
}

impl FailingPolicy {
    pub fn new(ok_calls: usize) -> Self {
        Self {
            ok_calls,
            calls: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> Result<Decision, DecisionFault> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.ok_calls {
            Ok(Decision::new(Action::MoveRight, 0.0, 0.0))
        } else {
            Err(DecisionFault::failed(format!("policy failure after {} calls", self.ok_calls)))
        }
    }
}

impl SharedPolicy for FailingPolicy {
    fn decide(&self, _: &Observation) -> Result<Decision, DecisionFault> {
        self.next()
    }
}

impl Policy for FailingPolicy {
    fn decide(&mut self, _: &Observation) -> Result<Decision, DecisionFault> {
        self.next()
    }
}
