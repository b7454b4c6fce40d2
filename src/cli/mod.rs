//! Command-line interface
mod logger;
mod options;

pub use options::{
    Algorithm, Command, LogBackend, Options, BUFFER_CAPACITY, EXPLORATION_FINAL_EPS,
    LEARNING_RATE_RANGE,
};
