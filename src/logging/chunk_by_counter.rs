use super::chunk::{ChunkSummary, Chunker};
use super::{Id, Loggable};

/// Chunk whenever a counter reaches a multiple of `interval`.
///
/// The flush happens at the end of the group containing the counter increment,
/// so log the counter after the other values of its group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByCounter {
    /// Id of the counter
    pub counter: Id,
    /// Chunk length in counter units
    pub interval: u64,
    state: State,
}

impl ByCounter {
    pub const fn new(counter: Id, interval: u64) -> Self {
        Self {
            counter,
            interval,
            state: State::Wait,
        }
    }

    pub fn of_path<T: IntoIterator<Item = &'static str>>(path: T, interval: u64) -> Self {
        Self::new(path.into_iter().collect(), interval)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum State {
    Wait,
    CounterLogged,
    Flush,
}

impl Chunker for ByCounter {
    fn note_log(&mut self, id: &Id, _: &Loggable) {
        if self.state == State::Wait && &self.counter == id {
            self.state = State::CounterLogged;
        }
    }

    fn note_log_summary(&mut self, summary: &ChunkSummary) {
        if self.state != State::CounterLogged {
            return;
        }
        self.state = match summary {
            ChunkSummary::Counter {
                increment,
                initial_value,
            } if self.interval > 0 && (increment + initial_value) % self.interval == 0 => {
                State::Flush
            }
            _ => State::Wait,
        };
    }

    fn flush_group_end(&mut self) -> bool {
        self.state == State::Flush
    }

    fn note_flush(&mut self) {
        self.state = State::Wait;
    }
}
