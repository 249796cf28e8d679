use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use tinyrl_core::obs::PIECE_SIZE;
use tinyrl_core::{Action, EngineFault, GridShape, ObsSchema, Observation, Simulation, StepOutcome};

/// Seven piece types; ids are `0..7`, cells store `id + 1`.
const PIECE_TYPES: u8 = 7;

/// A reduced layout (8x6 board, one-piece queue) for fast tests.
pub fn small_schema() -> ObsSchema {
    ObsSchema {
        board: GridShape::new(8, 6),
        active_piece: GridShape::new(8, 6),
        queue: GridShape::new(PIECE_SIZE, PIECE_SIZE),
        held: GridShape::new(PIECE_SIZE, PIECE_SIZE),
    }
}

// ── ScriptedGame ───────────────────────────────────────────────────

/// Seeded fake engine.
///
/// The RNG is seeded once at construction and never reseeded, so the
/// sequence of episodes an instance produces is a pure function of its
/// seed and the actions it is given.
pub struct ScriptedGame {
    rng: ChaCha8Rng,
    schema: ObsSchema,
    end_probability: f64,
    horizon: usize,
    t: usize,
    piece: u8,
    held: Option<u8>,
    queue: Vec<u8>,
    col: usize,
    obs: Observation,
}

impl ScriptedGame {
    /// Default layout, 5% chance of ending per step, no forced horizon.
    pub fn new(seed: u64) -> Self {
        Self::with_schema(seed, ObsSchema::default())
    }

    pub fn with_schema(seed: u64, schema: ObsSchema) -> Self {
        let queue_len = (schema.queue.rows / PIECE_SIZE).max(1);
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            schema,
            end_probability: 0.05,
            horizon: usize::MAX,
            t: 0,
            piece: 0,
            held: None,
            queue: vec![0; queue_len],
            col: 0,
            obs: Observation::zeros(&schema),
        }
    }

    /// Per-step probability that the game ends.
    pub fn end_probability(mut self, p: f64) -> Self {
        self.end_probability = p.clamp(0.0, 1.0);
        self
    }

    /// Force the game to end after `steps` steps.
    pub fn horizon(mut self, steps: usize) -> Self {
        self.horizon = steps.max(1);
        self
    }

    fn next_piece(&mut self) -> u8 {
        let piece = self.queue.remove(0);
        self.queue.push(self.rng.random_range(0..PIECE_TYPES));
        piece
    }

    fn stamp(grid: &mut tinyrl_core::Grid, row: usize, col: usize, value: u8) {
        for dr in 0..2 {
            for dc in 0..2 {
                grid.set(row + dr, col + dc, value);
            }
        }
    }

    fn render(&mut self) {
        let rows = self.schema.active_piece.rows;
        let cols = self.schema.active_piece.cols.max(1);
        self.obs.active_piece.clear();
        Self::stamp(&mut self.obs.active_piece, self.t % rows.max(1), self.col % cols, 1);

        self.obs.held.clear();
        if let Some(piece) = self.held {
            Self::stamp(&mut self.obs.held, 1, 1, piece + 1);
        }

        self.obs.queue.clear();
        for (i, &piece) in self.queue.iter().enumerate() {
            Self::stamp(&mut self.obs.queue, i * PIECE_SIZE + 1, 1, piece + 1);
        }
    }
}

impl Simulation for ScriptedGame {
    fn schema(&self) -> ObsSchema {
        self.schema
    }

    fn reset(&mut self) -> Result<Observation, EngineFault> {
        self.t = 0;
        self.held = None;
        self.col = self.schema.board.cols / 2;
        for slot in self.queue.iter_mut() {
            *slot = self.rng.random_range(0..PIECE_TYPES);
        }
        self.piece = self.rng.random_range(0..PIECE_TYPES);
        self.obs.board.clear();
        self.render();
        Ok(self.obs.clone())
    }

    fn step(&mut self, action: Action) -> Result<StepOutcome, EngineFault> {
        self.t += 1;
        let cols = self.schema.board.cols.max(1);
        let mut reward = 0.0;
        match action {
            Action::MoveLeft => self.col = self.col.saturating_sub(1),
            Action::MoveRight => self.col = (self.col + 1).min(cols - 1),
            Action::Hold => {
                let next = match self.held {
                    Some(held) => held,
                    None => self.next_piece(),
                };
                self.held = Some(self.piece);
                self.piece = next;
            }
            Action::HardDrop => {
                let row = self.rng.random_range(0..self.schema.board.rows.max(1));
                let value = self.piece + 1;
                self.obs.board.set(row, self.col, value);
                self.piece = self.next_piece();
                if self.rng.random_bool(0.2) {
                    reward = f64::from(self.rng.random_range(1..=4u8));
                }
            }
            Action::SoftDrop | Action::RotateCw | Action::RotateCcw => {}
        }
        self.render();
        let done = self.t >= self.horizon || self.rng.random_bool(self.end_probability);
        Ok(StepOutcome {
            observation: self.obs.clone(),
            reward,
            done,
        })
    }
}

// ── FaultyGame ─────────────────────────────────────────────────────

/// Wraps an engine and fails chosen calls.
///
/// Call numbers are 1-based and count every call to `reset` (or
/// `step`) over the instance's lifetime.
pub struct FaultyGame<S> {
    inner: S,
    resets: usize,
    steps: usize,
    fail_resets: Vec<usize>,
    fail_steps: Vec<usize>,
    panic_step: Option<usize>,
    bad_shape_reset: Option<usize>,
}

impl<S: Simulation> FaultyGame<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            resets: 0,
            steps: 0,
            fail_resets: Vec::new(),
            fail_steps: Vec::new(),
            panic_step: None,
            bad_shape_reset: None,
        }
    }

    /// Return an `EngineFault` from the given `reset` calls.
    pub fn fail_resets(mut self, calls: &[usize]) -> Self {
        self.fail_resets = calls.to_vec();
        self
    }

    /// Return an `EngineFault` from the given `step` calls.
    pub fn fail_steps(mut self, calls: &[usize]) -> Self {
        self.fail_steps = calls.to_vec();
        self
    }

    /// Panic inside the given `step` call.
    pub fn panic_on_step(mut self, call: usize) -> Self {
        self.panic_step = Some(call);
        self
    }

    /// Return a wrongly shaped observation from the given `reset` call.
    pub fn bad_shape_on_reset(mut self, call: usize) -> Self {
        self.bad_shape_reset = Some(call);
        self
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl<S: Simulation> Simulation for FaultyGame<S> {
    fn schema(&self) -> ObsSchema {
        self.inner.schema()
    }

    fn reset(&mut self) -> Result<Observation, EngineFault> {
        self.resets += 1;
        if self.fail_resets.contains(&self.resets) {
            return Err(EngineFault::InvalidState {
                reason: format!("injected fault on reset {}", self.resets),
            });
        }
        let mut obs = self.inner.reset()?;
        if self.bad_shape_reset == Some(self.resets) {
            obs.held = tinyrl_core::Grid::zeros(GridShape::new(1, 1));
        }
        Ok(obs)
    }

    fn step(&mut self, action: Action) -> Result<StepOutcome, EngineFault> {
        self.steps += 1;
        if self.panic_step == Some(self.steps) {
            panic!("injected panic on step {}", self.steps);
        }
        if self.fail_steps.contains(&self.steps) {
            return Err(EngineFault::Internal {
                reason: format!("injected fault on step {}", self.steps),
            });
        }
        self.inner.step(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rollout(game: &mut ScriptedGame) -> Vec<(f64, bool)> {
        game.reset().unwrap();
        let mut out = Vec::new();
        for i in 0..50 {
            let r = game.step(Action::ALL[i % Action::COUNT]).unwrap();
            out.push((r.reward, r.done));
            if r.done {
                break;
            }
        }
        out
    }

    #[test]
    fn observations_match_schema() {
        let schema = small_schema();
        let mut game = ScriptedGame::with_schema(3, schema);
        assert!(game.reset().unwrap().validate(&schema).is_ok());
        for action in Action::ALL {
            assert!(game.step(action).unwrap().observation.validate(&schema).is_ok());
        }
    }

    #[test]
    fn same_seed_same_rollout() {
        let mut a = ScriptedGame::new(42);
        let mut b = ScriptedGame::new(42);
        assert_eq!(rollout(&mut a), rollout(&mut b));
    }

    #[test]
    fn horizon_forces_done() {
        let mut game = ScriptedGame::with_schema(0, small_schema())
            .end_probability(0.0)
            .horizon(3);
        let steps = rollout(&mut game);
        assert_eq!(steps.len(), 3);
        assert!(steps[2].1);
    }

    #[test]
    fn faulty_game_injects_on_chosen_calls() {
        let mut game = FaultyGame::new(ScriptedGame::with_schema(1, small_schema()))
            .fail_resets(&[1])
            .fail_steps(&[2]);
        assert!(game.reset().is_err());
        assert!(game.reset().is_ok());
        assert!(game.step(Action::SoftDrop).is_ok());
        assert!(game.step(Action::SoftDrop).is_err());
        assert_eq!(game.resets(), 2);
        assert_eq!(game.steps(), 2);
    }

    #[test]
    fn bad_shape_is_detectable() {
        let schema = small_schema();
        let mut game =
            FaultyGame::new(ScriptedGame::with_schema(1, schema)).bad_shape_on_reset(1);
        let obs = game.reset().unwrap();
        assert!(obs.validate(&schema).is_err());
    }
}
