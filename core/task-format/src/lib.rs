//! Task Input Format
//!
//! Data model shared by the lane scheduler and its tooling, plus the
//! reader for `<group_key>,<cost cost ...>` input records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::time::Duration;

/// A unit of simulated work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    pub group_key: String,
    pub cost: u64, // milliseconds
}

impl Task {
    pub fn new(group_key: impl Into<String>, cost: u64) -> Self {
        Self {
            group_key: group_key.into(),
            cost,
        }
    }

    /// Lane this task is routed to under `threshold`
    pub fn lane(&self, threshold: f64) -> Lane {
        Lane::classify(self.cost, threshold)
    }

    /// Simulated processing time for a given scale (ms per cost unit)
    pub fn work_time(&self, time_scale: f64) -> Duration {
        Duration::from_secs_f64(self.cost as f64 * time_scale / 1000.0)
    }
}

/// Task class, fixed at routing time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Fast,
    Slow,
}

impl Lane {
    pub const ALL: [Lane; 2] = [Lane::Fast, Lane::Slow];

    /// `cost <= threshold` goes fast, everything else slow.
    ///
    /// A NaN threshold compares false and sends every task to the slow lane;
    /// configuration validation rejects it before a run starts.
    pub fn classify(cost: u64, threshold: f64) -> Lane {
        if (cost as f64) <= threshold {
            Lane::Fast
        } else {
            Lane::Slow
        }
    }

    pub fn other(self) -> Lane {
        match self {
            Lane::Fast => Lane::Slow,
            Lane::Slow => Lane::Fast,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Fast => "fast",
            Lane::Slow => "slow",
        }
    }

    /// Position in per-lane arrays
    pub fn index(self) -> usize {
        match self {
            Lane::Fast => 0,
            Lane::Slow => 1,
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input line: a group key and the costs of its tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub group_key: String,
    pub costs: Vec<u64>,
}

impl Record {
    pub fn new(group_key: impl Into<String>, costs: Vec<u64>) -> Self {
        Self {
            group_key: group_key.into(),
            costs,
        }
    }

    /// Expand into one task per cost, in input order
    pub fn tasks(&self) -> impl Iterator<Item = Task> + '_ {
        self.costs
            .iter()
            .map(move |&cost| Task::new(self.group_key.clone(), cost))
    }
}

/// Reasons an input record is rejected
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("line {line}: missing cost field")]
    MissingCosts { line: u64 },

    #[error("line {line}: empty group key")]
    EmptyKey { line: u64 },

    #[error("line {line}: expected 2 fields, found {fields}")]
    ExtraFields { line: u64, fields: usize },

    #[error("line {line}: invalid cost {value:?}")]
    InvalidCost { line: u64, value: String },

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
}

impl RecordError {
    /// Line the error was found on, when known
    pub fn line(&self) -> Option<u64> {
        match self {
            RecordError::MissingCosts { line }
            | RecordError::EmptyKey { line }
            | RecordError::ExtraFields { line, .. }
            | RecordError::InvalidCost { line, .. } => Some(*line),
            RecordError::Csv(e) => e.position().map(|p| p.line()),
        }
    }

    /// Whether reading can continue past this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RecordError::Csv(e) if e.is_io_error())
    }
}

/// Streaming reader over input records
///
/// Yields one `Result` per non-blank line so callers can skip and count
/// malformed records. An I/O error is yielded once and ends the stream.
pub struct RecordReader<R: io::Read> {
    records: csv::StringRecordsIntoIter<R>,
    done: bool,
}

impl<R: io::Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        let records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader)
            .into_records();

        Self {
            records,
            done: false,
        }
    }

    fn parse(record: &csv::StringRecord) -> Result<Record, RecordError> {
        let line = record.position().map_or(0, |p| p.line());

        if record.len() < 2 {
            return Err(RecordError::MissingCosts { line });
        }
        if record.len() > 2 {
            return Err(RecordError::ExtraFields {
                line,
                fields: record.len(),
            });
        }

        let group_key = &record[0];
        if group_key.is_empty() {
            return Err(RecordError::EmptyKey { line });
        }

        let costs = record[1]
            .split_whitespace()
            .map(|raw| {
                raw.parse::<u64>().map_err(|_| RecordError::InvalidCost {
                    line,
                    value: raw.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Record::new(group_key, costs))
    }
}

impl RecordReader<std::fs::File> {
    pub fn open(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        Ok(Self::new(std::fs::File::open(path)?))
    }
}

impl<R: io::Read> Iterator for RecordReader<R> {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.records.next()? {
                Ok(record) => {
                    // Whitespace-only lines
                    if record.iter().all(str::is_empty) {
                        continue;
                    }
                    return Some(Self::parse(&record));
                }
                Err(e) => {
                    let err = RecordError::from(e);
                    if !err.is_recoverable() {
                        self.done = true;
                    }
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Summary statistics over a parsed dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetStats {
    pub records: usize,
    pub tasks: usize,
    pub min_cost: u64,
    pub max_cost: u64,
    pub mean_cost: f64,
    pub p50_cost: u64,
    pub p95_cost: u64,
    pub p99_cost: u64,
    pub mean_tasks_per_record: f64,
    #[serde(skip)]
    sorted_costs: Vec<u64>,
}

impl DatasetStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut record_count = 0;
        let mut costs = Vec::new();
        for record in records {
            record_count += 1;
            costs.extend_from_slice(&record.costs);
        }
        costs.sort_unstable();

        if costs.is_empty() {
            return Self {
                records: record_count,
                ..Self::default()
            };
        }

        let total: u64 = costs.iter().sum();
        let tasks = costs.len();

        Self {
            records: record_count,
            tasks,
            min_cost: costs[0],
            max_cost: costs[tasks - 1],
            mean_cost: total as f64 / tasks as f64,
            p50_cost: percentile(&costs, 0.50),
            p95_cost: percentile(&costs, 0.95),
            p99_cost: percentile(&costs, 0.99),
            mean_tasks_per_record: tasks as f64 / record_count as f64,
            sorted_costs: costs,
        }
    }

    /// (fast, slow) task counts at `threshold`
    pub fn lane_split(&self, threshold: f64) -> (usize, usize) {
        let fast = self
            .sorted_costs
            .partition_point(|&c| Lane::classify(c, threshold) == Lane::Fast);
        (fast, self.sorted_costs.len() - fast)
    }

    /// Sum of all costs (ms), the serial lower bound on processing time
    pub fn total_cost(&self) -> u64 {
        self.sorted_costs.iter().sum()
    }
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    let idx = ((sorted.len() as f64) * p).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
