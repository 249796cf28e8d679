//! The padded, rectangular output of one collection request.

use smallvec::smallvec;

use tinyrl_core::obs::Shape;

/// `count` episodes laid out row-major and zero-padded to a common
/// step width.
///
/// Per-step columns are `count * width` long; `observations` is
/// `count * width * obs_dim` long. Entries at step index
/// `>= lengths()[i]` in row `i` are zero and are not steps.
#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeBatch {
    pub(crate) count: usize,
    pub(crate) width: usize,
    pub(crate) obs_dim: usize,
    pub(crate) observations: Vec<f32>,
    pub(crate) actions: Vec<u8>,
    pub(crate) rewards: Vec<f64>,
    pub(crate) log_probs: Vec<f64>,
    pub(crate) values: Vec<f64>,
    pub(crate) dones: Vec<u8>,
    pub(crate) lengths: Vec<u32>,
    pub(crate) truncated: Vec<bool>,
    pub(crate) episode_ids: Vec<u64>,
}

impl EpisodeBatch {
    /// Number of rows (episodes).
    pub fn count(&self) -> usize {
        self.count
    }

    /// Padded step width shared by every row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Length of one flattened observation.
    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    /// `[count, width, obs_dim]`.
    pub fn observations_shape(&self) -> Shape {
        smallvec![self.count, self.width, self.obs_dim]
    }

    /// `[count, width]`, the shape of every per-step column.
    pub fn step_shape(&self) -> Shape {
        smallvec![self.count, self.width]
    }

    /// Flattened observations, `[count, width, obs_dim]` row-major.
    pub fn observations(&self) -> &[f32] {
        &self.observations
    }

    /// Action ids, `[count, width]`.
    pub fn actions(&self) -> &[u8] {
        &self.actions
    }

    /// Rewards, `[count, width]`.
    pub fn rewards(&self) -> &[f64] {
        &self.rewards
    }

    /// Log-probabilities of the chosen actions, `[count, width]`.
    pub fn log_probs(&self) -> &[f64] {
        &self.log_probs
    }

    /// Value estimates, `[count, width]`.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Done flags (0/1), `[count, width]`. Set on the last real step of
    /// every row, including truncated ones.
    pub fn dones(&self) -> &[u8] {
        &self.dones
    }

    /// True length of each row. The only authority on which entries
    /// are real steps.
    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }

    /// Whether each row hit the step cap.
    pub fn truncated(&self) -> &[bool] {
        &self.truncated
    }

    /// Task id of each row.
    pub fn episode_ids(&self) -> &[u64] {
        &self.episode_ids
    }

    /// Sum of `lengths`.
    pub fn total_steps(&self) -> usize {
        self.lengths.iter().map(|&l| l as usize).sum()
    }

    /// Row `i` with padding cut off, or `None` if out of range.
    pub fn row(&self, i: usize) -> Option<EpisodeView<'_>> {
        if i >= self.count {
            return None;
        }
        let len = self.lengths[i] as usize;
        let steps = i * self.width..i * self.width + len;
        let obs_start = i * self.width * self.obs_dim;
        Some(EpisodeView {
            id: self.episode_ids[i],
            truncated: self.truncated[i],
            obs_dim: self.obs_dim,
            observations: &self.observations[obs_start..obs_start + len * self.obs_dim],
            actions: &self.actions[steps.clone()],
            rewards: &self.rewards[steps.clone()],
            log_probs: &self.log_probs[steps.clone()],
            values: &self.values[steps.clone()],
            dones: &self.dones[steps],
        })
    }

    /// Every row in storage order.
    pub fn iter_rows(&self) -> impl Iterator<Item = EpisodeView<'_>> + '_ {
        (0..self.count).filter_map(move |i| self.row(i))
    }
}

/// One unpadded row of an [`EpisodeBatch`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpisodeView<'a> {
    /// Task id.
    pub id: u64,
    /// `true` if the episode hit the step cap.
    pub truncated: bool,
    obs_dim: usize,
    /// Flattened observations, `len() * obs_dim` values.
    pub observations: &'a [f32],
    /// Action ids.
    pub actions: &'a [u8],
    /// Rewards.
    pub rewards: &'a [f64],
    /// Log-probabilities.
    pub log_probs: &'a [f64],
    /// Value estimates.
    pub values: &'a [f64],
    /// Done flags.
    pub dones: &'a [u8],
}

impl<'a> EpisodeView<'a> {
    /// Number of real steps.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Always `false` for rows of a collected batch.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Observation at step `t`.
    pub fn observation(&self, t: usize) -> Option<&'a [f32]> {
        (t < self.len()).then(|| &self.observations[t * self.obs_dim..(t + 1) * self.obs_dim])
    }

    /// Sum of rewards.
    pub fn total_reward(&self) -> f64 {
        self.rewards.iter().sum()
    }
}
