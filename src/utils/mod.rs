//! Utilities
pub mod save;
pub mod stats;
