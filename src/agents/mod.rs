//! Per-axis action-value policies and coordinate selection
mod selector;
#[cfg(test)]
pub mod testing;

pub use selector::CoordinateSelector;

use crate::buffers::SampledBatch;
use crate::envs::Screen;
use crate::schedules::ExplorationUpdate;
use crate::utils::save::SerdeSaveLoadError;
use crate::Prng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::path::Path;
use thiserror::Error;

/// A spatial screen axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub const ALL: [Self; 2] = [Self::X, Self::Y];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value for each screen axis.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerAxis<T> {
    pub x: T,
    pub y: T,
}

impl<T> PerAxis<T> {
    pub const fn new(x: T, y: T) -> Self {
        Self { x, y }
    }

    /// Build from a function of the axis.
    pub fn from_fn<F: FnMut(Axis) -> T>(mut f: F) -> Self {
        Self {
            x: f(Axis::X),
            y: f(Axis::Y),
        }
    }

    /// Iterate over `(axis, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, &T)> {
        [(Axis::X, &self.x), (Axis::Y, &self.y)].into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Axis, &mut T)> {
        [(Axis::X, &mut self.x), (Axis::Y, &mut self.y)].into_iter()
    }
}

impl<T> Index<Axis> for PerAxis<T> {
    type Output = T;
    fn index(&self, axis: Axis) -> &T {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        }
    }
}

impl<T> IndexMut<Axis> for PerAxis<T> {
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
        }
    }
}

/// An action chosen by a single-axis policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisAction {
    /// Coordinate index in `[0, num_actions)`.
    pub index: usize,
    /// Whether the action differs from what the unperturbed greedy policy would choose.
    pub exploratory: bool,
}

/// Statistics of one training step of a policy.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainStats {
    /// Importance-weighted mean loss.
    pub loss: f64,
    /// Temporal difference error of each batch element.
    pub td_errors: Vec<f64>,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),
    #[error("state of shape {shape:?} given to a policy of {expected}x{expected} screens")]
    StateShape {
        shape: (usize, usize),
        expected: usize,
    },
    #[error("cannot train on an empty batch")]
    EmptyBatch,
    #[error(transparent)]
    SaveLoad(#[from] SerdeSaveLoadError),
    #[error("saved policy does not match: {0}")]
    Incompatible(String),
}

/// Error building a policy.
#[derive(Debug, Error)]
pub enum BuildAgentError {
    #[error("error building network")]
    Network(#[from] crate::torch::BuildNetworkError),
    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),
}

/// A learning action-value policy over the coordinates of one screen axis.
pub trait ActionValuePolicy {
    /// Number of discrete coordinates.
    fn num_actions(&self) -> usize;

    /// Choose a coordinate for the given screen.
    fn act(
        &mut self,
        state: &Screen,
        exploration: &ExplorationUpdate,
        rng: &mut Prng,
    ) -> Result<AxisAction, PolicyError>;

    /// Take one optimization step on a batch of transitions.
    fn train(&mut self, batch: &SampledBatch) -> Result<TrainStats, PolicyError>;

    /// Copy the online parameters into the target network.
    fn update_target(&mut self) -> Result<(), PolicyError>;
}

/// Policies that can be saved to and restored from a file.
pub trait PersistPolicy {
    fn save(&self, path: &Path) -> Result<(), PolicyError>;

    /// Replace the parameters with those saved at `path`.
    fn restore(&mut self, path: &Path) -> Result<(), PolicyError>;
}

impl<P: ActionValuePolicy + ?Sized> ActionValuePolicy for Box<P> {
    fn num_actions(&self) -> usize {
        P::num_actions(self)
    }
    fn act(
        &mut self,
        state: &Screen,
        exploration: &ExplorationUpdate,
        rng: &mut Prng,
    ) -> Result<AxisAction, PolicyError> {
        P::act(self, state, exploration, rng)
    }
    fn train(&mut self, batch: &SampledBatch) -> Result<TrainStats, PolicyError> {
        P::train(self, batch)
    }
    fn update_target(&mut self) -> Result<(), PolicyError> {
        P::update_target(self)
    }
}
