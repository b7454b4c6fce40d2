//! Error type
use crate::agents::{BuildAgentError, PolicyError};
use crate::buffers::StoreError;
use crate::simulation::TrainError;
use std::io;
use thiserror::Error;

/// Error from running the beacon DQN crate.
#[derive(Error, Debug)]
pub enum RLError {
    #[error("error building agent")]
    BuildAgent(#[from] BuildAgentError),
    #[error("error building experience store")]
    BuildStore(#[from] StoreError),
    #[error("policy error")]
    Policy(#[from] PolicyError),
    #[error("training failed")]
    Train(#[from] TrainError),
    #[error("i/o error")]
    Io(#[from] io::Error),
    #[error("error writing run configuration")]
    Json(#[from] serde_json::Error),
}
