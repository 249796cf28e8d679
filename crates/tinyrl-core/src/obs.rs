//! Observation grids and the schema that fixes their shapes.
//!
//! An [`Observation`] is four small grids of non-negative integers:
//! the settled `board`, the `active_piece` mask, the look-ahead `queue`
//! and the `held` slot. The collector stores observations flattened to
//! `f32` in the canonical order `active_piece, board, held, queue`
//! (component names in alphabetical order).

use std::fmt;

use smallvec::{smallvec, SmallVec};

use crate::error::EngineFault;

/// Side length of one piece cell block.
pub const PIECE_SIZE: usize = 4;

/// Default board height (rows), including the spawn area.
pub const BOARD_ROWS: usize = 24;

/// Default board width (columns), including the wall padding.
pub const BOARD_COLS: usize = 18;

/// Default number of upcoming pieces shown in the queue.
pub const DEFAULT_QUEUE_SIZE: usize = 3;

/// Tensor shape, used for flattened observations and batch layouts.
pub type Shape = SmallVec<[usize; 4]>;

/// Rows × columns of one observation component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridShape {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl GridShape {
    /// Create a shape.
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of cells (`rows * cols`).
    pub const fn cell_count(&self) -> usize {
        self.rows * self.cols
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// A row-major grid of small non-negative integers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    shape: GridShape,
    cells: Vec<u8>,
}

impl Grid {
    /// An all-zero grid of the given shape.
    pub fn zeros(shape: GridShape) -> Self {
        Self {
            shape,
            cells: vec![0; shape.cell_count()],
        }
    }

    /// Wrap existing cells. Returns `None` if `cells.len()` does not
    /// match the shape.
    pub fn from_cells(shape: GridShape, cells: Vec<u8>) -> Option<Self> {
        (cells.len() == shape.cell_count()).then_some(Self { shape, cells })
    }

    /// The grid's shape.
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Row-major cells.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Mutable row-major cells.
    pub fn cells_mut(&mut self) -> &mut [u8] {
        &mut self.cells
    }

    /// Cell at `(row, col)`, or `None` if out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        if row < self.shape.rows && col < self.shape.cols {
            Some(self.cells[row * self.shape.cols + col])
        } else {
            None
        }
    }

    /// Set the cell at `(row, col)`. Out-of-bounds writes are ignored
    /// and return `false`.
    pub fn set(&mut self, row: usize, col: usize, value: u8) -> bool {
        if row < self.shape.rows && col < self.shape.cols {
            self.cells[row * self.shape.cols + col] = value;
            true
        } else {
            false
        }
    }

    /// Zero every cell.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }
}

/// Shapes of the four observation components.
///
/// Fixed when a collector is constructed and identical for every
/// episode it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObsSchema {
    /// Settled cells; 0 = empty, 1..=7 = piece type + 1.
    pub board: GridShape,
    /// 0/1 mask of the falling piece.
    pub active_piece: GridShape,
    /// Upcoming pieces stacked vertically, `PIECE_SIZE` rows each.
    pub queue: GridShape,
    /// The held piece, or all zero when the slot is empty.
    pub held: GridShape,
}

impl ObsSchema {
    /// The reference grid-game layout with a `queue_size`-piece look-ahead.
    pub const fn with_queue_size(queue_size: usize) -> Self {
        Self {
            board: GridShape::new(BOARD_ROWS, BOARD_COLS),
            active_piece: GridShape::new(BOARD_ROWS, BOARD_COLS),
            queue: GridShape::new(queue_size * PIECE_SIZE, PIECE_SIZE),
            held: GridShape::new(PIECE_SIZE, PIECE_SIZE),
        }
    }

    /// Components in canonical flattening order.
    pub fn components(&self) -> [(&'static str, GridShape); 4] {
        [
            ("active_piece", self.active_piece),
            ("board", self.board),
            ("held", self.held),
            ("queue", self.queue),
        ]
    }

    /// Length of one flattened observation.
    pub fn obs_dim(&self) -> usize {
        self.components()
            .iter()
            .map(|(_, shape)| shape.cell_count())
            .sum()
    }

    /// Flattened observation shape, `[obs_dim]`.
    pub fn flat_shape(&self) -> Shape {
        smallvec![self.obs_dim()]
    }
}

impl Default for ObsSchema {
    fn default() -> Self {
        Self::with_queue_size(DEFAULT_QUEUE_SIZE)
    }
}

/// One observation of the grid game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    /// Settled cells.
    pub board: Grid,
    /// Falling-piece mask.
    pub active_piece: Grid,
    /// Look-ahead queue.
    pub queue: Grid,
    /// Held slot.
    pub held: Grid,
}

impl Observation {
    /// An all-zero observation laid out per `schema`.
    pub fn zeros(schema: &ObsSchema) -> Self {
        Self {
            board: Grid::zeros(schema.board),
            active_piece: Grid::zeros(schema.active_piece),
            queue: Grid::zeros(schema.queue),
            held: Grid::zeros(schema.held),
        }
    }

    fn grids(&self) -> [(&'static str, &Grid); 4] {
        [
            ("active_piece", &self.active_piece),
            ("board", &self.board),
            ("held", &self.held),
            ("queue", &self.queue),
        ]
    }

    /// Check every component against `schema`.
    pub fn validate(&self, schema: &ObsSchema) -> Result<(), EngineFault> {
        for ((component, grid), (_, expected)) in self.grids().into_iter().zip(schema.components())
        {
            if grid.shape() != expected {
                return Err(EngineFault::ShapeMismatch {
                    component,
                    expected,
                    actual: grid.shape(),
                });
            }
        }
        Ok(())
    }

    /// Total number of cells across all components.
    pub fn len(&self) -> usize {
        self.grids().iter().map(|(_, g)| g.cells().len()).sum()
    }

    /// `true` if every component is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the flattened observation into `out`.
    ///
    /// Returns the number of values written, which is
    /// `min(self.len(), out.len())`.
    pub fn flatten_into(&self, out: &mut [f32]) -> usize {
        let mut written = 0;
        for (_, grid) in self.grids() {
            for &cell in grid.cells() {
                if written == out.len() {
                    return written;
                }
                out[written] = f32::from(cell);
                written += 1;
            }
        }
        written
    }

    /// The flattened observation as a new vector.
    pub fn to_flat_vec(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.len()];
        self.flatten_into(&mut out);
        out
    }
}
