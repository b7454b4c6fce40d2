//! Experience replay stores
mod prioritized;
mod replay;
mod segment_tree;

pub use prioritized::PrioritizedReplayBuffer;
pub use replay::ReplayBuffer;
pub use segment_tree::{MinTree, SumTree};

use crate::envs::Screen;
use crate::schedules::LinearSchedule;
use crate::Prng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single-step transition for one action axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Screen,
    pub action: usize,
    pub reward: f64,
    pub next_state: Screen,
    pub done: bool,
}

/// A batch of transitions sampled from an [`ExperienceStore`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampledBatch {
    pub states: Vec<Screen>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f64>,
    pub next_states: Vec<Screen>,
    pub dones: Vec<bool>,
    /// Importance sampling weights. All ones for uniform sampling.
    pub weights: Vec<f64>,
    /// Store indices of the sampled transitions, if the store tracks priorities.
    pub indices: Option<Vec<usize>>,
}

impl SampledBatch {
    fn with_capacity(batch_size: usize) -> Self {
        Self {
            states: Vec::with_capacity(batch_size),
            actions: Vec::with_capacity(batch_size),
            rewards: Vec::with_capacity(batch_size),
            next_states: Vec::with_capacity(batch_size),
            dones: Vec::with_capacity(batch_size),
            weights: Vec::with_capacity(batch_size),
            indices: None,
        }
    }

    fn push(&mut self, transition: &Transition, weight: f64) {
        self.states.push(transition.state.clone());
        self.actions.push(transition.action);
        self.rewards.push(transition.reward);
        self.next_states.push(transition.next_state.clone());
        self.dones.push(transition.done);
        self.weights.push(weight);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("cannot sample from an empty store")]
    Empty,
    #[error("prioritization exponent {0} is not non-negative and finite")]
    InvalidAlpha(f64),
    #[error("priority {0} is not positive and finite")]
    InvalidPriority(f64),
    #[error("index {index} out of range for a store of size {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{indices} indices given with {priorities} priorities")]
    LengthMismatch { indices: usize, priorities: usize },
}

/// Transition storage with batched sampling.
pub trait ExperienceStore {
    /// Add a transition, evicting the oldest one when full.
    fn add(&mut self, transition: Transition);

    /// Sample a batch of transitions with replacement.
    ///
    /// `beta` is the importance sampling exponent; ignored by uniform stores.
    fn sample(
        &self,
        batch_size: usize,
        beta: Option<f64>,
        rng: &mut Prng,
    ) -> Result<SampledBatch, StoreError>;

    /// Set the priorities of previously sampled transitions.
    ///
    /// A no-op for stores without priorities.
    fn update_priorities(&mut self, indices: &[usize], priorities: &[f64])
        -> Result<(), StoreError>;

    /// Number of stored transitions.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: ExperienceStore + ?Sized> ExperienceStore for Box<S> {
    fn add(&mut self, transition: Transition) {
        S::add(self, transition)
    }
    fn sample(
        &self,
        batch_size: usize,
        beta: Option<f64>,
        rng: &mut Prng,
    ) -> Result<SampledBatch, StoreError> {
        S::sample(self, batch_size, beta, rng)
    }
    fn update_priorities(
        &mut self,
        indices: &[usize],
        priorities: &[f64],
    ) -> Result<(), StoreError> {
        S::update_priorities(self, indices, priorities)
    }
    fn len(&self) -> usize {
        S::len(self)
    }
}

/// Experience store configuration.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreConfig {
    Uniform {
        capacity: usize,
    },
    Prioritized {
        capacity: usize,
        /// Prioritization exponent. 0 is uniform sampling.
        alpha: f64,
        /// Initial importance sampling exponent, annealed to 1.
        beta0: f64,
        /// Number of steps over which beta is annealed. Defaults to the training length.
        beta_iters: Option<u64>,
        /// Added to absolute TD errors to form new priorities.
        eps: f64,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::prioritized(5000)
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn uniform(capacity: usize) -> Self {
        Self::Uniform { capacity }
    }

    #[must_use]
    pub const fn prioritized(capacity: usize) -> Self {
        Self::Prioritized {
            capacity,
            alpha: 0.6,
            beta0: 0.4,
            beta_iters: None,
            eps: 1e-6,
        }
    }

    pub fn build_store(&self) -> Result<Box<dyn ExperienceStore>, StoreError> {
        Ok(match *self {
            Self::Uniform { capacity } => Box::new(ReplayBuffer::new(capacity)),
            Self::Prioritized {
                capacity, alpha, ..
            } => Box::new(PrioritizedReplayBuffer::new(capacity, alpha)?),
        })
    }

    /// Annealing schedule of the importance sampling exponent, if prioritized.
    #[must_use]
    pub fn beta_schedule(&self, max_timesteps: u64) -> Option<LinearSchedule> {
        match *self {
            Self::Uniform { .. } => None,
            Self::Prioritized {
                beta0, beta_iters, ..
            } => Some(LinearSchedule::new(
                beta_iters.unwrap_or(max_timesteps),
                beta0,
                1.0,
            )),
        }
    }

    /// Priority offset added to absolute TD errors, if prioritized.
    #[must_use]
    pub const fn priority_eps(&self) -> Option<f64> {
        match self {
            Self::Uniform { .. } => None,
            Self::Prioritized { eps, .. } => Some(*eps),
        }
    }
}
