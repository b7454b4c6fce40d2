//! Command-line logger
use super::chunk::{ChunkLogger, ChunkSummary, Chunker, SummaryWriter};
use super::{ByCounter, Id, LogError, Loggable, StatsLogger};
use std::fmt;
use std::io::{self, Write};
use yansi::Paint;

/// Logger that prints a table of chunk summaries to standard output.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayLogger<C: Chunker = ByCounter>(ChunkLogger<C, DisplayBackend>);

impl<C: Chunker> DisplayLogger<C> {
    pub fn new(chunker: C) -> Self {
        Self(ChunkLogger::new(chunker, DisplayBackend))
    }
}

impl<C: Chunker> StatsLogger for DisplayLogger<C> {
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

/// Writes summaries to standard output as one table per chunk.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DisplayBackend;

impl SummaryWriter for DisplayBackend {
    fn write_summaries<'a, I>(&mut self, summaries: I)
    where
        I: Iterator<Item = (&'a Id, &'a ChunkSummary)>,
    {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        // Nothing sensible to do if stdout is closed
        let _ = write_table(&mut out, summaries);
    }
}

fn write_table<'a, W, I>(out: &mut W, summaries: I) -> io::Result<()>
where
    W: Write,
    I: Iterator<Item = (&'a Id, &'a ChunkSummary)>,
{
    let rule = "-".repeat(52);
    writeln!(out, "{}", rule)?;
    for (id, summary) in summaries {
        writeln!(
            out,
            "| {:<24} {}",
            Paint::fixed(35, id),
            DisplaySummary(summary)
        )?;
    }
    writeln!(out, "{}", rule)?;
    out.flush()
}

struct DisplaySummary<'a>(&'a ChunkSummary);

impl fmt::Display for DisplaySummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            ChunkSummary::Nothing => Ok(()),
            ChunkSummary::Counter {
                increment,
                initial_value,
            } => write!(
                f,
                "{}  {}",
                initial_value + increment,
                Paint::fixed(253, format_args!("(+{})", increment))
            ),
            ChunkSummary::Scalar { stats } => {
                if let Some(mean) = stats.mean() {
                    write!(f, "{:.3}", mean)?;
                }
                if stats.count() > 1 {
                    if let Some(stddev) = stats.stddev() {
                        write!(f, " {}", Paint::fixed(8, format_args!("(σ {:.3})", stddev)))?;
                    }
                }
                Ok(())
            }
            ChunkSummary::Index { counts } => {
                let n: usize = counts.iter().sum();
                write!(f, "(n {})  [", n)?;
                for (i, c) in counts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", c * 100 / n.max(1))?;
                }
                f.write_str("]%")
            }
            ChunkSummary::Message { counts } => {
                for (i, (message, count)) in counts.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    f.write_str(message)?;
                    if *count > 1 {
                        write!(f, " {}", Paint::fixed(8, format_args!("(x{})", count)))?;
                    }
                }
                Ok(())
            }
        }
    }
}
