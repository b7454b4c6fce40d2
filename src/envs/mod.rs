//! Screen environments
mod move_to_beacon;
mod screen;
#[cfg(test)]
pub mod testing;

pub use move_to_beacon::{MoveToBeacon, MoveToBeaconConfig};
pub use screen::{self_position, target_mask, Point, Screen, UnitTracker};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Ownership label of a screen cell relative to the controlling player.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlayerRelative {
    Background = 0,
    SelfUnit = 1,
    Ally = 2,
    /// Neutral units, including the beacon.
    Neutral = 3,
    Enemy = 4,
}

impl PlayerRelative {
    #[inline]
    pub const fn label(self) -> u8 {
        self as u8
    }
}

/// Position of a time step within its episode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepType {
    First,
    Mid,
    Last,
}

/// Identifier of an environment function (action type).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FunctionId {
    NoOp,
    SelectArmy,
    MoveScreen,
    AttackScreen,
}

/// An action issued to the environment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionCall {
    NoOp,
    /// Select all army units. With `add` the units are added to the current selection.
    SelectArmy { add: bool },
    /// Move the selected units to a screen point.
    ///
    /// A queued command runs after the current orders; otherwise it replaces them.
    MoveScreen { queued: bool, target: Point },
    /// Attack-move the selected units to a screen point.
    AttackScreen { queued: bool, target: Point },
}

impl FunctionCall {
    /// Select all army units, replacing the current selection.
    pub const SELECT_ALL: Self = Self::SelectArmy { add: false };

    /// Issue an immediate (not queued) move to `target`.
    #[must_use]
    pub const fn move_now(target: Point) -> Self {
        Self::MoveScreen {
            queued: false,
            target,
        }
    }

    #[must_use]
    pub const fn id(&self) -> FunctionId {
        match self {
            Self::NoOp => FunctionId::NoOp,
            Self::SelectArmy { .. } => FunctionId::SelectArmy,
            Self::MoveScreen { .. } => FunctionId::MoveScreen,
            Self::AttackScreen { .. } => FunctionId::AttackScreen,
        }
    }
}

/// Environment observation of a single time step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Player-relative label of every screen cell, indexed as `[y, x]`.
    pub player_relative: Array2<u8>,
    /// Functions that may be issued on the next step.
    pub available_actions: BTreeSet<FunctionId>,
}

impl Observation {
    #[must_use]
    pub fn is_available(&self, id: FunctionId) -> bool {
        self.available_actions.contains(&id)
    }
}

/// Result of resetting or stepping an environment.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeStep {
    pub step_type: StepType,
    pub reward: f64,
    pub observation: Observation,
}

impl TimeStep {
    /// Whether this step ends the episode.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.step_type == StepType::Last
    }
}

/// Error interacting with an environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("function {0:?} is not available on this step")]
    UnavailableAction(FunctionId),
    #[error("point ({}, {}) is outside the {size}x{size} screen", .point.x, .point.y)]
    OutOfBounds { point: Point, size: usize },
    #[error("the environment must be reset before stepping")]
    NeedsReset,
}

/// An environment observed through a square screen of player-relative labels.
pub trait ScreenEnvironment {
    /// Side length of the (square) screen in cells.
    fn screen_size(&self) -> usize;

    /// Start a new episode.
    fn reset(&mut self) -> Result<TimeStep, EnvError>;

    /// Apply one action and advance the environment by one agent step.
    ///
    /// The environment must be reset after a step of type [`StepType::Last`].
    fn step(&mut self, action: &FunctionCall) -> Result<TimeStep, EnvError>;
}

impl<E: ScreenEnvironment + ?Sized> ScreenEnvironment for Box<E> {
    fn screen_size(&self) -> usize {
        E::screen_size(self)
    }
    fn reset(&mut self) -> Result<TimeStep, EnvError> {
        E::reset(self)
    }
    fn step(&mut self, action: &FunctionCall) -> Result<TimeStep, EnvError> {
        E::step(self, action)
    }
}

impl<E: ScreenEnvironment + ?Sized> ScreenEnvironment for &mut E {
    fn screen_size(&self) -> usize {
        E::screen_size(self)
    }
    fn reset(&mut self) -> Result<TimeStep, EnvError> {
        E::reset(self)
    }
    fn step(&mut self, action: &FunctionCall) -> Result<TimeStep, EnvError> {
        E::step(self, action)
    }
}
