use super::{LogBackend, Options};
use crate::logging::{ByCounter, DisplayLogger, StatsLogger, TensorBoardLogger};

/// Counter closing each logged chunk.
const EPISODE_COUNTER: &str = "episodes";

impl Options {
    /// Logger for a training run started at `start`.
    ///
    /// Summaries are written every `print_freq` episodes.
    pub fn build_logger(&self, start: &str) -> Box<dyn StatsLogger> {
        let display = DisplayLogger::new(ByCounter::of_path([EPISODE_COUNTER], self.print_freq));
        match self.log {
            LogBackend::Stdout => Box::new(display),
            LogBackend::Tensorboard => Box::new((
                display,
                TensorBoardLogger::new(
                    ByCounter::of_path([EPISODE_COUNTER], self.print_freq),
                    self.tensorboard_dir(start),
                ),
            )),
        }
    }
}
