//! Running the training loop
pub mod checkpoint;
mod evaluate;
pub mod hooks;
pub mod stats;
mod train;

pub use checkpoint::{model_path, BestModelRecord, BestModelSaver, ModelSelection};
pub use evaluate::evaluate;
pub use hooks::{EpisodeLimit, EpisodeSnapshot, StepLimit, TrainingHook};
pub use stats::{EpisodeMeans, EpisodeStatistics};
pub use train::{train, TrainConfig, TrainError, TrainSummary};
