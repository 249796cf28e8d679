//! Folds finished episodes into one zero-padded [`EpisodeBatch`].
//!
//! The assembler is owned by the thread running `request_episodes`.
//! Workers hand episodes over the event channel, so appending and the
//! completion check happen on a single thread with no extra locking.

use std::error::Error;
use std::fmt;

use crate::batch::EpisodeBatch;
use crate::config::PaddingPolicy;
use crate::episode::Episode;

/// Errors from [`BatchAssembler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssemblyError {
    /// More episodes were pushed than the batch holds.
    Overflow {
        /// Batch size.
        count: usize,
    },
    /// `finish` was called before every episode arrived.
    Incomplete {
        /// Episodes received.
        have: usize,
        /// Episodes required.
        want: usize,
    },
    /// An episode was empty or longer than `max_steps`.
    InvalidLength {
        /// Offending length.
        len: usize,
        /// Configured step cap.
        max_steps: usize,
    },
    /// An episode's observations do not match the batch's `obs_dim`.
    ObsDimMismatch {
        /// Expected values per step.
        expected: usize,
        /// Values found per step.
        actual: usize,
    },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow { count } => write!(f, "batch already holds {count} episodes"),
            Self::Incomplete { have, want } => {
                write!(f, "batch incomplete: {have} of {want} episodes")
            }
            Self::InvalidLength { len, max_steps } => {
                write!(f, "episode length {len} outside [1, {max_steps}]")
            }
            Self::ObsDimMismatch { expected, actual } => {
                write!(f, "observation dim {actual}, batch expects {expected}")
            }
        }
    }
}

impl Error for AssemblyError {}

/// Accumulates exactly `count` episodes, then lays them out.
#[derive(Debug)]
pub struct BatchAssembler {
    count: usize,
    max_steps: usize,
    obs_dim: usize,
    padding: PaddingPolicy,
    episodes: Vec<Episode>,
}

impl BatchAssembler {
    /// An empty assembler for `count` episodes of at most `max_steps`
    /// steps and `obs_dim` values per observation.
    pub fn new(count: usize, max_steps: usize, obs_dim: usize, padding: PaddingPolicy) -> Self {
        Self {
            count,
            max_steps,
            obs_dim,
            padding,
            episodes: Vec::with_capacity(count),
        }
    }

    /// Add a finished episode. Returns `true` once the batch is full.
    pub fn push(&mut self, episode: Episode) -> Result<bool, AssemblyError> {
        if self.episodes.len() == self.count {
            return Err(AssemblyError::Overflow { count: self.count });
        }
        let len = episode.len();
        if len == 0 || len > self.max_steps {
            return Err(AssemblyError::InvalidLength {
                len,
                max_steps: self.max_steps,
            });
        }
        if episode.observations.len() != len * self.obs_dim {
            return Err(AssemblyError::ObsDimMismatch {
                expected: self.obs_dim,
                actual: episode.observations.len() / len,
            });
        }
        self.episodes.push(episode);
        Ok(self.is_complete())
    }

    /// Episodes received so far.
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    /// `true` before any episode has arrived.
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// `true` once `count` episodes have arrived.
    pub fn is_complete(&self) -> bool {
        self.episodes.len() == self.count
    }

    /// Episodes still missing.
    pub fn remaining(&self) -> usize {
        self.count - self.episodes.len()
    }

    /// Build the batch. Rows are in arrival order.
    pub fn finish(self) -> Result<EpisodeBatch, AssemblyError> {
        if !self.is_complete() {
            return Err(AssemblyError::Incomplete {
                have: self.episodes.len(),
                want: self.count,
            });
        }
        let width = match self.padding {
            PaddingPolicy::BatchMax => self
                .episodes
                .iter()
                .map(Episode::len)
                .max()
                .unwrap_or(0)
                .min(self.max_steps),
            PaddingPolicy::MaxSteps => self.max_steps,
        };

        let (n, d) = (self.count, self.obs_dim);
        let mut batch = EpisodeBatch {
            count: n,
            width,
            obs_dim: d,
            observations: vec![0.0; n * width * d],
            actions: vec![0; n * width],
            rewards: vec![0.0; n * width],
            log_probs: vec![0.0; n * width],
            values: vec![0.0; n * width],
            dones: vec![0; n * width],
            lengths: Vec::with_capacity(n),
            truncated: Vec::with_capacity(n),
            episode_ids: Vec::with_capacity(n),
        };

        for (i, ep) in self.episodes.into_iter().enumerate() {
            let len = ep.len();
            let at = i * width;
            batch.observations[at * d..(at + len) * d].copy_from_slice(&ep.observations);
            batch.actions[at..at + len].copy_from_slice(&ep.actions);
            batch.rewards[at..at + len].copy_from_slice(&ep.rewards);
            batch.log_probs[at..at + len].copy_from_slice(&ep.log_probs);
            batch.values[at..at + len].copy_from_slice(&ep.values);
            batch.dones[at..at + len].copy_from_slice(&ep.dones);
            // len <= max_steps, which config validation bounds by u32::MAX.
            batch.lengths.push(len as u32);
            batch.truncated.push(ep.truncated);
            batch.episode_ids.push(ep.id);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const D: usize = 3;

    /// An episode whose every value is non-zero so padding is visible.
    fn episode(id: u64, len: usize, truncated: bool) -> Episode {
        let mut dones = vec![0; len];
        if let Some(last) = dones.last_mut() {
            *last = 1;
        }
        Episode {
            id,
            worker: 0,
            truncated,
            observations: vec![1.0; len * D],
            actions: vec![6; len],
            rewards: vec![0.5; len],
            log_probs: vec![-0.1; len],
            values: vec![2.0; len],
            dones,
        }
    }

    #[test]
    fn batch_max_pads_to_longest() {
        let mut asm = BatchAssembler::new(3, 50, D, PaddingPolicy::BatchMax);
        assert!(!asm.push(episode(0, 4, false)).unwrap());
        assert!(!asm.push(episode(1, 9, false)).unwrap());
        assert!(asm.push(episode(2, 1, false)).unwrap());
        let batch = asm.finish().unwrap();
        assert_eq!(batch.width(), 9);
        assert_eq!(batch.observations_shape().as_slice(), &[3, 9, D]);
        assert_eq!(batch.lengths(), &[4, 9, 1]);
        assert_eq!(batch.total_steps(), 14);
        assert_eq!(batch.episode_ids(), &[0, 1, 2]);
    }

    #[test]
    fn max_steps_pads_to_cap() {
        let mut asm = BatchAssembler::new(2, 20, D, PaddingPolicy::MaxSteps);
        asm.push(episode(5, 3, false)).unwrap();
        asm.push(episode(6, 20, true)).unwrap();
        let batch = asm.finish().unwrap();
        assert_eq!(batch.step_shape().as_slice(), &[2, 20]);
        assert_eq!(batch.truncated(), &[false, true]);
    }

    #[test]
    fn overflow_and_incomplete_rejected() {
        let mut asm = BatchAssembler::new(1, 10, D, PaddingPolicy::BatchMax);
        asm.push(episode(0, 2, false)).unwrap();
        assert_eq!(
            asm.push(episode(1, 2, false)),
            Err(AssemblyError::Overflow { count: 1 })
        );

        let mut asm = BatchAssembler::new(2, 10, D, PaddingPolicy::BatchMax);
        asm.push(episode(0, 2, false)).unwrap();
        assert_eq!(asm.remaining(), 1);
        assert_eq!(
            asm.finish().unwrap_err(),
            AssemblyError::Incomplete { have: 1, want: 2 }
        );
    }

    #[test]
    fn bad_episodes_rejected() {
        let mut asm = BatchAssembler::new(2, 10, D, PaddingPolicy::BatchMax);
        assert!(matches!(
            asm.push(episode(0, 11, true)),
            Err(AssemblyError::InvalidLength { len: 11, .. })
        ));
        assert!(matches!(
            asm.push(episode(0, 0, false)),
            Err(AssemblyError::InvalidLength { len: 0, .. })
        ));
        let mut wide = episode(1, 2, false);
        wide.observations.push(1.0);
        wide.observations.push(1.0);
        assert!(matches!(
            asm.push(wide),
            Err(AssemblyError::ObsDimMismatch { expected: D, actual: 4 })
        ));
        assert!(asm.is_empty());
    }

    #[test]
    fn row_view_excludes_padding() {
        let mut asm = BatchAssembler::new(2, 10, D, PaddingPolicy::BatchMax);
        asm.push(episode(0, 2, false)).unwrap();
        asm.push(episode(1, 5, false)).unwrap();
        let batch = asm.finish().unwrap();
        let row = batch.row(0).unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row.observations.len(), 2 * D);
        assert_eq!(row.observation(1), Some(&[1.0f32; D][..]));
        assert_eq!(row.observation(2), None);
        assert_eq!(row.dones, &[0, 1]);
        assert!((row.total_reward() - 1.0).abs() < 1e-12);
        assert!(batch.row(2).is_none());
        assert_eq!(batch.iter_rows().count(), 2);
    }

    proptest! {
        #[test]
        fn padding_is_zero_and_lengths_sum(
            lens in prop::collection::vec(1usize..=30, 1..12),
            fixed in any::<bool>(),
        ) {
            let padding = if fixed { PaddingPolicy::MaxSteps } else { PaddingPolicy::BatchMax };
            let mut asm = BatchAssembler::new(lens.len(), 30, D, padding);
            for (i, &len) in lens.iter().enumerate() {
                asm.push(episode(i as u64, len, len == 30)).unwrap();
            }
            let batch = asm.finish().unwrap();
            let width = batch.width();
            prop_assert_eq!(batch.total_steps(), lens.iter().sum::<usize>());
            prop_assert_eq!(width, if fixed { 30 } else { *lens.iter().max().unwrap() });

            for (i, &len) in lens.iter().enumerate() {
                prop_assert_eq!(batch.lengths()[i] as usize, len);
                for t in 0..width {
                    let k = i * width + t;
                    let real = t < len;
                    prop_assert_eq!(batch.actions()[k] != 0, real);
                    prop_assert_eq!(batch.rewards()[k] != 0.0, real);
                    prop_assert_eq!(batch.log_probs()[k] != 0.0, real);
                    prop_assert_eq!(batch.values()[k] != 0.0, real);
                    prop_assert_eq!(batch.dones()[k] == 1, t + 1 == len);
                    let obs = &batch.observations()[k * D..(k + 1) * D];
                    prop_assert!(obs.iter().all(|&v| (v != 0.0) == real));
                }
            }
        }
    }
}
