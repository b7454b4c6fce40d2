//! Tensorboard logger
use super::chunk::{ChunkLogger, ChunkSummary, Chunker, SummaryWriter};
use super::{ByCounter, Id, LogError, Loggable, StatsLogger};
use std::fmt::{self, Write};
use std::path::{Path, PathBuf};
use tensorboard_rs::summary_writer::SummaryWriter as TbSummaryWriter;

/// Logger that saves chunk summaries to a tensorboard event file.
#[derive(Debug)]
pub struct TensorBoardLogger<C: Chunker = ByCounter>(ChunkLogger<C, TensorBoardBackend>);

impl<C: Chunker> TensorBoardLogger<C> {
    pub fn new<P: AsRef<Path>>(chunker: C, log_dir: P) -> Self {
        Self(ChunkLogger::new(chunker, TensorBoardBackend::new(log_dir)))
    }
}

impl<C: Chunker> StatsLogger for TensorBoardLogger<C> {
    fn group_start(&mut self) {
        self.0.group_start()
    }
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.0.group_log(id, value)
    }
    fn group_end(&mut self) {
        self.0.group_end()
    }
    fn flush(&mut self) {
        self.0.flush()
    }
}

/// Writes chunk summaries to a tensorboard event file, one step per chunk.
pub struct TensorBoardBackend {
    writer: TbSummaryWriter,
    log_dir: PathBuf,
    summary_index: usize,
}

impl fmt::Debug for TensorBoardBackend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TensorBoardBackend")
            .field("log_dir", &self.log_dir)
            .field("summary_index", &self.summary_index)
            .finish()
    }
}

impl TensorBoardBackend {
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Self {
        let log_dir = log_dir.as_ref().to_path_buf();
        Self {
            writer: TbSummaryWriter::new(&log_dir),
            log_dir,
            summary_index: 0,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn write_summary(&mut self, tag: &str, summary: &ChunkSummary) {
        match summary {
            ChunkSummary::Counter {
                increment,
                initial_value,
            } => self.writer.add_scalar(
                tag,
                (initial_value + increment) as f32,
                self.summary_index,
            ),
            ChunkSummary::Scalar { stats } => {
                if let Some(mean) = stats.mean() {
                    self.writer.add_scalar(tag, mean as f32, self.summary_index)
                }
            }
            ChunkSummary::Index { counts } => {
                // Buckets are centred on each index
                let total: f64 = counts.iter().map(|n| *n as f64).sum();
                let sum = counts
                    .iter()
                    .enumerate()
                    .map(|(i, n)| (i * n) as f64)
                    .sum();
                let sum_squares = counts
                    .iter()
                    .enumerate()
                    .map(|(i, n)| (i * i * n) as f64)
                    .sum();
                let limits: Vec<f64> = (0..counts.len()).map(|i| i as f64 + 0.5).collect();
                let bucket_counts: Vec<f64> = counts.iter().map(|n| *n as f64).collect();
                self.writer.add_histogram_raw(
                    tag,
                    -0.5,
                    counts.len() as f64 - 0.5,
                    total,
                    sum,
                    sum_squares,
                    &limits,
                    &bucket_counts,
                    self.summary_index,
                )
            }
            ChunkSummary::Nothing | ChunkSummary::Message { .. } => {}
        }
    }
}

impl SummaryWriter for TensorBoardBackend {
    fn write_summaries<'a, I>(&mut self, summaries: I)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>,
    {
        let mut tag = String::new();
        for (id, summary) in summaries {
            tag.clear();
            // Writing to a String cannot fail
            let _ = write!(tag, "{}", id);
            self.write_summary(&tag, summary);
        }
        self.summary_index += 1;
        self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_event_file() {
        let dir = tempdir().unwrap();
        {
            let mut logger = TensorBoardLogger::new(ByCounter::of_path(["episodes"], 1), dir.path());
            logger.group_start();
            logger.group_log("mean_100ep_reward".into(), Loggable::Scalar(1.0)).unwrap();
            logger
                .group_log("episodes".into(), Loggable::CounterIncrement(1))
                .unwrap();
            logger.group_end();
        }
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(!files.is_empty());
    }
}
