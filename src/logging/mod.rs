//! Logging statistics from training runs
mod chunk;
mod chunk_by_counter;
mod display;
mod tensorboard;

pub use chunk::{ChunkLogger, ChunkSummary, Chunker, SummaryWriter};
pub use chunk_by_counter::ByCounter;
pub use display::{DisplayBackend, DisplayLogger};
pub use tensorboard::{TensorBoardBackend, TensorBoardLogger};

use std::borrow::Cow;
use std::fmt;
use std::iter::FromIterator;
use thiserror::Error;

/// Hierarchical identifier of a logged value, displayed as a `/`-separated path.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    path: Vec<Cow<'static, str>>,
}

impl Id {
    #[must_use]
    pub const fn new() -> Self {
        Self { path: Vec::new() }
    }

    /// Append a path component.
    #[must_use]
    pub fn with<S: Into<Cow<'static, str>>>(mut self, name: S) -> Self {
        self.path.push(name.into());
        self
    }
}

/// Split a `/`-separated path.
impl From<&'static str> for Id {
    fn from(path: &'static str) -> Self {
        path.split('/').collect()
    }
}

impl<S: Into<Cow<'static, str>>> FromIterator<S> for Id {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            path: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let [name] = &self.path[..] {
            return f.pad(name);
        }
        f.pad(&self.path.join("/"))
    }
}

/// A value that can be logged.
#[derive(Debug, Clone, PartialEq)]
pub enum Loggable {
    /// Nothing. No data to log.
    ///
    /// Logging Nothing data may still produce a placeholder entry for the name.
    Nothing,
    /// Increment a counter by the given amount.
    CounterIncrement(u64),
    /// A scalar value. Aggregate by taking means.
    Scalar(f64),
    /// A sample from a distrbution over `0 .. size`.
    Index { value: usize, size: usize },
    /// A message. Aggregate by counting occurrences.
    Message(Cow<'static, str>),
}

impl Loggable {
    /// The name of this variant
    #[must_use]
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::Nothing => "Nothing",
            Self::CounterIncrement(_) => "CounterIncrement",
            Self::Scalar(_) => "Scalar",
            Self::Index { .. } => "Index",
            Self::Message(_) => "Message",
        }
    }
}

impl From<f64> for Loggable {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<f32> for Loggable {
    fn from(value: f32) -> Self {
        Self::Scalar(value.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("incompatible value type; previously {prev} now {now}")]
    IncompatibleValue {
        prev: &'static str,
        now: &'static str,
    },
    #[error("incompatible index size; previously {prev} now {now}")]
    IncompatibleIndexSize { prev: usize, now: usize },
    #[error("index {value} out of range for size {size}")]
    IndexOutOfRange { value: usize, size: usize },
}

/// Log statistics from a training run.
///
/// Values are logged in groups. A logger may summarize the values of many groups together
/// but never splits a group between summaries.
pub trait StatsLogger {
    /// Start a new group of values.
    fn group_start(&mut self);

    /// Log a value within the current group.
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError>;

    /// End the current group.
    fn group_end(&mut self);

    /// Write out all pending summaries.
    fn flush(&mut self);

    /// Log a value as its own group.
    fn log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        self.group_start();
        let result = self.group_log(id, value);
        self.group_end();
        result
    }

    fn log_scalar(&mut self, name: &'static str, value: f64) -> Result<(), LogError> {
        self.log(name.into(), Loggable::Scalar(value))
    }

    fn log_counter_increment(&mut self, name: &'static str, increment: u64) -> Result<(), LogError> {
        self.log(name.into(), Loggable::CounterIncrement(increment))
    }

    fn log_message(&mut self, name: &'static str, message: String) -> Result<(), LogError> {
        self.log(name.into(), Loggable::Message(message.into()))
    }
}

/// Logger that does nothing
impl StatsLogger for () {
    fn group_start(&mut self) {}
    fn group_log(&mut self, _: Id, _: Loggable) -> Result<(), LogError> {
        Ok(())
    }
    fn group_end(&mut self) {}
    fn flush(&mut self) {}
}

impl<L: StatsLogger + ?Sized> StatsLogger for Box<L> {
    fn group_start(&mut self) {
        L::group_start(self)
    }
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        L::group_log(self, id, value)
    }
    fn group_end(&mut self) {
        L::group_end(self)
    }
    fn flush(&mut self) {
        L::flush(self)
    }
}

impl<L: StatsLogger + ?Sized> StatsLogger for &mut L {
    fn group_start(&mut self) {
        L::group_start(self)
    }
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        L::group_log(self, id, value)
    }
    fn group_end(&mut self) {
        L::group_end(self)
    }
    fn flush(&mut self) {
        L::flush(self)
    }
}

/// Log to both loggers. Returns the first error after logging to both.
impl<A: StatsLogger, B: StatsLogger> StatsLogger for (A, B) {
    fn group_start(&mut self) {
        self.0.group_start();
        self.1.group_start();
    }
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        let r0 = self.0.group_log(id.clone(), value.clone());
        let r1 = self.1.group_log(id, value);
        r0.and(r1)
    }
    fn group_end(&mut self) {
        self.0.group_end();
        self.1.group_end();
    }
    fn flush(&mut self) {
        self.0.flush();
        self.1.flush();
    }
}

/// Logger recording every logged value, for tests.
#[cfg(test)]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VecLogger {
    pub groups: Vec<Vec<(String, Loggable)>>,
    open: bool,
}

#[cfg(test)]
impl VecLogger {
    /// All values logged under the given id, in order.
    pub fn values(&self, id: &str) -> Vec<&Loggable> {
        self.groups
            .iter()
            .flatten()
            .filter(|(name, _)| name == id)
            .map(|(_, value)| value)
            .collect()
    }

    /// All scalars logged under the given id, in order.
    pub fn scalars(&self, id: &str) -> Vec<f64> {
        self.values(id)
            .into_iter()
            .filter_map(|value| match value {
                Loggable::Scalar(v) => Some(*v),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl StatsLogger for VecLogger {
    fn group_start(&mut self) {
        self.groups.push(Vec::new());
        self.open = true;
    }
    fn group_log(&mut self, id: Id, value: Loggable) -> Result<(), LogError> {
        if !self.open {
            self.group_start();
        }
        if let Some(group) = self.groups.last_mut() {
            group.push((id.to_string(), value));
        }
        Ok(())
    }
    fn group_end(&mut self) {
        self.open = false;
    }
    fn flush(&mut self) {}
}
