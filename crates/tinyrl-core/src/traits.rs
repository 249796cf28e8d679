//! Contracts for the simulation engine and the decision function.

use crate::action::Action;
use crate::error::{DecisionFault, EngineFault};
use crate::obs::{ObsSchema, Observation};

/// Result of one [`Simulation::step`].
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    /// Observation after the action was applied.
    pub observation: Observation,
    /// Reward earned by this step.
    pub reward: f64,
    /// `true` if the game ended on this step.
    pub done: bool,
}

/// One instance of the grid-game engine.
///
/// The collector creates one instance per worker thread and never
/// shares it: all calls for an instance come from the same thread, so
/// implementations need `Send` but not `Sync`.
pub trait Simulation: Send {
    /// Observation layout produced by this instance. Must not change
    /// over the instance's lifetime.
    fn schema(&self) -> ObsSchema;

    /// Re-initialise to a fresh start state and return the first
    /// observation.
    fn reset(&mut self) -> Result<Observation, EngineFault>;

    /// Apply `action` and advance the game by one decision point.
    fn step(&mut self, action: Action) -> Result<StepOutcome, EngineFault>;
}

impl<S: Simulation + ?Sized> Simulation for Box<S> {
    fn schema(&self) -> ObsSchema {
        (**self).schema()
    }

    fn reset(&mut self) -> Result<Observation, EngineFault> {
        (**self).reset()
    }

    fn step(&mut self, action: Action) -> Result<StepOutcome, EngineFault> {
        (**self).step(action)
    }
}

/// The output of a decision function for one observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    /// Chosen action.
    pub action: Action,
    /// Log-probability of `action` under the policy.
    pub log_prob: f64,
    /// Value estimate of the observed state.
    pub value: f64,
}

impl Decision {
    /// Create a decision.
    pub fn new(action: Action, log_prob: f64, value: f64) -> Self {
        Self {
            action,
            log_prob,
            value,
        }
    }

    /// Build a decision from a raw action id, as returned by most
    /// model heads.
    pub fn from_raw(action_id: u8, log_prob: f64, value: f64) -> Result<Self, DecisionFault> {
        Ok(Self::new(Action::from_id(action_id)?, log_prob, value))
    }

    /// Reject NaN or infinite scalars before they reach a batch.
    pub fn validate(&self) -> Result<(), DecisionFault> {
        if !self.log_prob.is_finite() {
            return Err(DecisionFault::NonFinite { field: "log_prob" });
        }
        if !self.value.is_finite() {
            return Err(DecisionFault::NonFinite { field: "value" });
        }
        Ok(())
    }
}

/// A decision function that must be called from a single thread.
///
/// Typical for model inference that is not safe to run concurrently.
/// The collector only ever calls it from the thread that issued the
/// collection request.
pub trait Policy {
    /// Decide on one observation.
    fn decide(&mut self, observation: &Observation) -> Result<Decision, DecisionFault>;

    /// Decide on several observations at once.
    ///
    /// Must return exactly one decision per observation, in order.
    /// The default calls [`decide`](Policy::decide) for each.
    fn decide_batch(
        &mut self,
        observations: &[&Observation],
    ) -> Result<Vec<Decision>, DecisionFault> {
        observations.iter().map(|obs| self.decide(obs)).collect()
    }
}

impl<F> Policy for F
where
    F: FnMut(&Observation) -> Result<Decision, DecisionFault>,
{
    fn decide(&mut self, observation: &Observation) -> Result<Decision, DecisionFault> {
        self(observation)
    }
}

/// A decision function safe to call concurrently from many threads.
pub trait SharedPolicy: Send + Sync {
    /// Decide on one observation.
    fn decide(&self, observation: &Observation) -> Result<Decision, DecisionFault>;
}

impl<F> SharedPolicy for F
where
    F: Fn(&Observation) -> Result<Decision, DecisionFault> + Send + Sync,
{
    fn decide(&self, observation: &Observation) -> Result<Decision, DecisionFault> {
        self(observation)
    }
}
