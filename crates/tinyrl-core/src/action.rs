//! The discrete action set of the grid game.

use std::fmt;

use crate::error::DecisionFault;

/// One of the seven discrete moves accepted by [`Simulation::step`](crate::Simulation::step).
///
/// The numeric ids (`0..=6`) are the values stored in
/// `EpisodeBatch::actions` and are stable across releases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Action {
    /// Shift the active piece one column left.
    MoveLeft = 0,
    /// Shift the active piece one column right.
    MoveRight = 1,
    /// Move the active piece one row down.
    SoftDrop = 2,
    /// Rotate the active piece clockwise.
    RotateCw = 3,
    /// Rotate the active piece counter-clockwise.
    RotateCcw = 4,
    /// Drop the active piece to its resting row and lock it.
    HardDrop = 5,
    /// Swap the active piece with the held slot.
    Hold = 6,
}

impl Action {
    /// Number of distinct actions.
    pub const COUNT: usize = 7;

    /// All actions in id order.
    pub const ALL: [Action; Self::COUNT] = [
        Action::MoveLeft,
        Action::MoveRight,
        Action::SoftDrop,
        Action::RotateCw,
        Action::RotateCcw,
        Action::HardDrop,
        Action::Hold,
    ];

    /// Numeric id of this action.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Decode an action id.
    ///
    /// Ids outside `0..COUNT` are a policy bug and surface as
    /// [`DecisionFault::InvalidAction`].
    pub fn from_id(id: u8) -> Result<Self, DecisionFault> {
        Self::ALL
            .get(id as usize)
            .copied()
            .ok_or(DecisionFault::InvalidAction { id })
    }
}

impl TryFrom<u8> for Action {
    type Error = DecisionFault;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id)
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        action.id()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MoveLeft => "move-left",
            Self::MoveRight => "move-right",
            Self::SoftDrop => "soft-drop",
            Self::RotateCw => "rotate-cw",
            Self::RotateCcw => "rotate-ccw",
            Self::HardDrop => "hard-drop",
            Self::Hold => "hold",
        };
        f.write_str(name)
    }
}
