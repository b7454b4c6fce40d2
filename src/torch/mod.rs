//! Torch components
pub mod dqn;
pub mod modules;
pub mod optimizers;
pub mod serialize;

pub use dqn::{DqnAxisPolicy, DqnConfig, SavedQNetwork};
pub use modules::{BuildNetworkError, ConvLayer, QNetConfig, QNetwork};
pub use optimizers::{AdamConfig, BuildOptimizer};
pub use serialize::DeviceDef;
