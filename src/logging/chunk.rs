use super::{Id, LogError, Loggable, StatsLogger};
use crate::utils::stats::OnlineMeanVariance;
use std::borrow::Cow;
use std::collections::{btree_map::Entry, BTreeMap};

/// Decides when the accumulated summaries form a complete chunk.
pub trait Chunker {
    /// Note an entry about to be logged.
    fn note_log(&mut self, _id: &Id, _value: &Loggable) {}
    /// Note the summary that resulted from the previous `note_log` entry.
    fn note_log_summary(&mut self, _summary: &ChunkSummary) {}
    /// End the current group and decide whether to flush.
    fn flush_group_end(&mut self) -> bool {
        false
    }
    /// The current chunk has been flushed.
    fn note_flush(&mut self);
}

/// Writes chunk summaries to an output.
pub trait SummaryWriter {
    fn write_summaries<'a, I>(&mut self, summaries: I)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>;
}

/// Logger that splits the stream of logged values into chunks and writes one summary per chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkLogger<C: Chunker, W: SummaryWriter> {
    chunker: C,
    writer: W,
    /// Ordered so that summaries are written sorted by id.
    summaries: BTreeMap<Id, Node>,
}

impl<C: Chunker, W: SummaryWriter> ChunkLogger<C, W> {
    pub fn new(chunker: C, writer: W) -> Self {
        Self {
            chunker,
            writer,
            summaries: BTreeMap::new(),
        }
    }

    pub const fn writer(&self) -> &W {
        &self.writer
    }
}

impl<C: Chunker, W: SummaryWriter> StatsLogger for ChunkLogger<C, W> {
    fn group_start(&mut self) {}

    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.chunker.note_log(&id, &value);
        let node = match self.summaries.entry(id) {
            Entry::Vacant(e) => e.insert(Node::new(ChunkSummary::new(value)?)),
            Entry::Occupied(e) => {
                let node = e.into_mut();
                node.push(value)?;
                node
            }
        };
        self.chunker.note_log_summary(&node.summary);
        Ok(())
    }

    fn group_end(&mut self) {
        if self.chunker.flush_group_end() {
            self.flush()
        }
    }

    fn flush(&mut self) {
        self.writer.write_summaries(
            self.summaries
                .iter()
                .filter(|(_, node)| node.dirty)
                .map(|(id, node)| (id, &node.summary)),
        );
        for node in self.summaries.values_mut() {
            node.reset();
        }
        self.chunker.note_flush();
    }
}

impl<C: Chunker, W: SummaryWriter> Drop for ChunkLogger<C, W> {
    fn drop(&mut self) {
        if self.summaries.values().any(|node| node.dirty) {
            self.flush();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    summary: ChunkSummary,
    /// Updated since the last flush
    dirty: bool,
}

impl Node {
    const fn new(summary: ChunkSummary) -> Self {
        Self {
            summary,
            dirty: true,
        }
    }

    fn push(&mut self, value: Loggable) -> Result<(), LogError> {
        self.summary.push(value)?;
        self.dirty = true;
        Ok(())
    }

    fn reset(&mut self) {
        self.dirty = false;
        self.summary.reset()
    }
}

/// Summary of the values logged under one id within a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkSummary {
    Nothing,
    Counter {
        /// Total increment within this chunk
        increment: u64,
        /// Counter value at the start of this chunk
        initial_value: u64,
    },
    Scalar {
        stats: OnlineMeanVariance<f64>,
    },
    Index {
        counts: Vec<usize>,
    },
    Message {
        counts: BTreeMap<Cow<'static, str>, usize>,
    },
}

impl ChunkSummary {
    /// Summary of a single value.
    pub fn new(value: Loggable) -> Result<Self, LogError> {
        let mut summary = match &value {
            Loggable::Nothing => return Ok(Self::Nothing),
            Loggable::CounterIncrement(_) => Self::Counter {
                increment: 0,
                initial_value: 0,
            },
            Loggable::Scalar(_) => Self::Scalar {
                stats: OnlineMeanVariance::new(),
            },
            Loggable::Index { size, .. } => Self::Index {
                counts: vec![0; *size],
            },
            Loggable::Message(_) => Self::Message {
                counts: BTreeMap::new(),
            },
        };
        summary.push(value)?;
        Ok(summary)
    }

    /// Add a value to the summary.
    ///
    /// The value is rejected if it has a different variant or index size than the summary.
    fn push(&mut self, value: Loggable) -> Result<(), LogError> {
        match (self, value) {
            (Self::Nothing, Loggable::Nothing) => {}
            (Self::Counter { increment, .. }, Loggable::CounterIncrement(i)) => *increment += i,
            (Self::Scalar { stats }, Loggable::Scalar(v)) => stats.push(v),
            (Self::Index { counts }, Loggable::Index { value, size }) => {
                if counts.len() != size {
                    return Err(LogError::IncompatibleIndexSize {
                        prev: counts.len(),
                        now: size,
                    });
                }
                let count = counts
                    .get_mut(value)
                    .ok_or(LogError::IndexOutOfRange { value, size })?;
                *count += 1;
            }
            (Self::Message { counts }, Loggable::Message(s)) => {
                *counts.entry(s).or_insert(0) += 1;
            }
            (summary, value) => {
                return Err(LogError::IncompatibleValue {
                    prev: summary.loggable_variant_name(),
                    now: value.variant_name(),
                })
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        match self {
            Self::Nothing => {}
            Self::Counter {
                increment,
                initial_value,
            } => {
                *initial_value += *increment;
                *increment = 0;
            }
            Self::Scalar { stats } => *stats = OnlineMeanVariance::new(),
            Self::Index { counts } => counts.iter_mut().for_each(|c| *c = 0),
            Self::Message { counts } => counts.clear(),
        }
    }

    const fn loggable_variant_name(&self) -> &'static str {
        match self {
            Self::Nothing => "Nothing",
            Self::Counter { .. } => "CounterIncrement",
            Self::Scalar { .. } => "Scalar",
            Self::Index { .. } => "Index",
            Self::Message { .. } => "Message",
        }
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;

    /// Flush after every group
    #[derive(Debug, Default)]
    pub struct EveryGroup;

    impl Chunker for EveryGroup {
        fn flush_group_end(&mut self) -> bool {
            true
        }
        fn note_flush(&mut self) {}
    }

    /// Records the written chunks as `id: summary` strings.
    #[derive(Debug, Default)]
    pub struct RecordWriter {
        pub chunks: Vec<Vec<(String, ChunkSummary)>>,
    }

    impl SummaryWriter for RecordWriter {
        fn write_summaries<'a, I>(&mut self, summaries: I)
        where
            I: Iterator<Item = (&'a Id, &'a ChunkSummary)>,
        {
            self.chunks.push(
                summaries
                    .map(|(id, summary)| (id.to_string(), summary.clone()))
                    .collect(),
            );
        }
    }

    #[test]
    fn scalar_summary_mean() {
        let mut logger = ChunkLogger::new(EveryGroup, RecordWriter::default());
        logger.group_start();
        logger.group_log("loss".into(), Loggable::Scalar(1.0)).unwrap();
        logger.group_log("loss".into(), Loggable::Scalar(3.0)).unwrap();
        logger.group_end();

        let chunks = &logger.writer().chunks;
        assert_eq!(chunks.len(), 1);
        match &chunks[0][..] {
            [(id, ChunkSummary::Scalar { stats })] => {
                assert_eq!(id, "loss");
                assert_eq!(stats.mean(), Some(2.0));
            }
            other => panic!("unexpected chunk {:?}", other),
        }
    }

    #[test]
    fn counter_carries_initial_value() {
        let mut logger = ChunkLogger::new(EveryGroup, RecordWriter::default());
        logger.log_counter_increment("episodes", 2).unwrap();
        logger.log_counter_increment("episodes", 3).unwrap();
        assert_eq!(
            logger.writer().chunks[1],
            [(
                "episodes".to_string(),
                ChunkSummary::Counter {
                    increment: 3,
                    initial_value: 2
                }
            )]
        );
    }

    #[test]
    fn clean_entries_not_written() {
        let mut logger = ChunkLogger::new(EveryGroup, RecordWriter::default());
        logger.log_scalar("a", 1.0).unwrap();
        logger.log_scalar("b", 1.0).unwrap();
        let ids: Vec<_> = logger.writer().chunks[1]
            .iter()
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn incompatible_value_rejected() {
        let mut logger = ChunkLogger::new(EveryGroup, RecordWriter::default());
        logger.log_scalar("a", 1.0).unwrap();
        assert_eq!(
            logger.log_counter_increment("a", 1),
            Err(LogError::IncompatibleValue {
                prev: "Scalar",
                now: "CounterIncrement"
            })
        );
    }

    #[test]
    fn index_out_of_range_rejected() {
        assert_eq!(
            ChunkSummary::new(Loggable::Index { value: 3, size: 3 }),
            Err(LogError::IndexOutOfRange { value: 3, size: 3 })
        );
    }

    #[test]
    fn messages_counted() {
        let mut summary = ChunkSummary::new(Loggable::Message("saved".into())).unwrap();
        summary.push(Loggable::Message("saved".into())).unwrap();
        summary.push(Loggable::Message("failed".into())).unwrap();
        match summary {
            ChunkSummary::Message { counts } => {
                assert_eq!(counts.get("saved"), Some(&2));
                assert_eq!(counts.get("failed"), Some(&1));
            }
            other => panic!("unexpected summary {:?}", other),
        }
    }
}
