//! Deep Q-learning for moving a unit onto a beacon, one Q-network per screen axis.
#![warn(clippy::cast_lossless)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::use_self)]
pub mod agents;
pub mod buffers;
pub mod cli;
pub mod envs;
mod error;
pub mod logging;
pub mod schedules;
pub mod simulation;
pub mod torch;
pub mod utils;

pub use agents::{ActionValuePolicy, Axis, AxisAction, CoordinateSelector, PerAxis};
pub use envs::{ScreenEnvironment, TimeStep};
pub use error::RLError;
pub use simulation::{train, TrainConfig, TrainError, TrainSummary};

/// Pseudo-random number generator used throughout the crate.
pub type Prng = rand_chacha::ChaCha8Rng;
