//! Finished episodes and the per-worker buffer that records them.
//!
//! Each worker owns one [`EpisodeBuffer`] preallocated to `max_steps`
//! rows. Recording a step writes into it in place; finishing copies the
//! recorded prefix into an owned [`Episode`] that is handed to the
//! assembler.

use tinyrl_core::{Decision, Observation};

/// One complete episode as produced by a single worker.
///
/// All per-step columns have exactly `len()` entries; `observations`
/// has `len() * obs_dim` entries.
#[derive(Clone, Debug, PartialEq)]
pub struct Episode {
    pub(crate) id: u64,
    pub(crate) worker: usize,
    pub(crate) truncated: bool,
    pub(crate) observations: Vec<f32>,
    pub(crate) actions: Vec<u8>,
    pub(crate) rewards: Vec<f64>,
    pub(crate) log_probs: Vec<f64>,
    pub(crate) values: Vec<f64>,
    pub(crate) dones: Vec<u8>,
}

impl Episode {
    /// Task id this episode was produced for.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Index of the producing worker.
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// `true` if the episode has no steps. Never the case for
    /// episodes produced by a worker.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// `true` if the episode ended at the step cap rather than on a
    /// terminal game state.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Sum of rewards.
    pub fn total_reward(&self) -> f64 {
        self.rewards.iter().sum()
    }
}

/// Preallocated per-worker step storage.
#[derive(Debug)]
pub(crate) struct EpisodeBuffer {
    obs_dim: usize,
    len: usize,
    observations: Vec<f32>,
    actions: Vec<u8>,
    rewards: Vec<f64>,
    log_probs: Vec<f64>,
    values: Vec<f64>,
    dones: Vec<u8>,
}

impl EpisodeBuffer {
    pub fn new(max_steps: usize, obs_dim: usize) -> Self {
        Self {
            obs_dim,
            len: 0,
            observations: vec![0.0; max_steps * obs_dim],
            actions: vec![0; max_steps],
            rewards: vec![0.0; max_steps],
            log_probs: vec![0.0; max_steps],
            values: vec![0.0; max_steps],
            dones: vec![0; max_steps],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.actions.len()
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Record one step. `observation` is the state the decision was
    /// made on.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is full. The worker truncates at
    /// `max_steps`, so this is unreachable from the collector.
    pub fn push(&mut self, observation: &Observation, decision: &Decision, reward: f64, done: bool) {
        let i = self.len;
        assert!(i < self.capacity(), "episode buffer overflow at step {i}");
        let row = &mut self.observations[i * self.obs_dim..(i + 1) * self.obs_dim];
        let written = observation.flatten_into(row);
        row[written..].fill(0.0);
        self.actions[i] = decision.action.id();
        self.log_probs[i] = decision.log_prob;
        self.values[i] = decision.value;
        self.rewards[i] = reward;
        self.dones[i] = u8::from(done);
        self.len += 1;
    }

    /// Copy the recorded prefix into an owned episode and clear.
    pub fn finish(&mut self, id: u64, worker: usize, truncated: bool) -> Episode {
        let n = self.len;
        self.len = 0;
        Episode {
            id,
            worker,
            truncated,
            observations: self.observations[..n * self.obs_dim].to_vec(),
            actions: self.actions[..n].to_vec(),
            rewards: self.rewards[..n].to_vec(),
            log_probs: self.log_probs[..n].to_vec(),
            values: self.values[..n].to_vec(),
            dones: self.dones[..n].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyrl_core::{Action, GridShape, ObsSchema};

    fn tiny_schema() -> ObsSchema {
        ObsSchema {
            board: GridShape::new(1, 2),
            active_piece: GridShape::new(1, 1),
            queue: GridShape::new(1, 1),
            held: GridShape::new(1, 1),
        }
    }

    #[test]
    fn finish_copies_only_recorded_prefix() {
        let schema = tiny_schema();
        let mut buf = EpisodeBuffer::new(4, schema.obs_dim());
        let mut obs = Observation::zeros(&schema);
        obs.board.set(0, 1, 3);

        buf.push(&obs, &Decision::new(Action::RotateCw, -0.5, 1.0), 2.0, false);
        buf.push(&obs, &Decision::new(Action::HardDrop, -0.25, 0.5), 1.0, true);
        assert_eq!(buf.len(), 2);

        let ep = buf.finish(7, 1, false);
        assert_eq!(buf.len(), 0);
        assert_eq!(ep.id(), 7);
        assert_eq!(ep.worker(), 1);
        assert_eq!(ep.len(), 2);
        assert_eq!(ep.actions, vec![3, 5]);
        assert_eq!(ep.dones, vec![0, 1]);
        assert_eq!(ep.observations.len(), 2 * schema.obs_dim());
        assert_eq!(ep.observations[..5], [0.0, 0.0, 3.0, 0.0, 0.0]);
        assert!((ep.total_reward() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    #[should_panic(expected = "episode buffer overflow")]
    fn push_past_capacity_panics() {
        let schema = tiny_schema();
        let mut buf = EpisodeBuffer::new(1, schema.obs_dim());
        let obs = Observation::zeros(&schema);
        let d = Decision::new(Action::MoveLeft, 0.0, 0.0);
        buf.push(&obs, &d, 0.0, false);
        buf.push(&obs, &d, 0.0, false);
    }
}
