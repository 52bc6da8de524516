//! Report sinks

use parking_lot::Mutex;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::StatsReport;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report io: {0}")]
    Io(#[from] io::Error),

    #[error("report encoding: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination for stats reports
pub trait ReportSink: Send {
    fn emit(&mut self, report: &StatsReport) -> Result<(), ReportError>;

    fn flush(&mut self) -> Result<(), ReportError> {
        Ok(())
    }
}

impl<S: ReportSink + ?Sized> ReportSink for Box<S> {
    fn emit(&mut self, report: &StatsReport) -> Result<(), ReportError> {
        (**self).emit(report)
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        (**self).flush()
    }
}

/// One JSON object per line
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn emit(&mut self, report: &StatsReport) -> Result<(), ReportError> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// One timestamped JSON file per report inside a run directory
///
/// Files already in the directory are removed on creation so a directory
/// only ever holds the reports of one run.
#[derive(Debug)]
pub struct RunDirSink {
    dir: PathBuf,
}

impl RunDirSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let dir = dir.into();
        if dir.exists() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_file() {
                    fs::remove_file(&path)?;
                }
            }
        } else {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReportSink for RunDirSink {
    fn emit(&mut self, report: &StatsReport) -> Result<(), ReportError> {
        let name = format!(
            "{}-{:04}.json",
            report.timestamp.timestamp_millis(),
            report.sequence
        );
        let mut writer = io::BufWriter::new(fs::File::create(self.dir.join(name))?);
        serde_json::to_writer_pretty(&mut writer, report)?;
        writer.flush()?;
        Ok(())
    }
}

/// Shared in-memory buffer; clones see the same reports
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    reports: Arc<Mutex<Vec<StatsReport>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<StatsReport> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ReportSink for MemorySink {
    fn emit(&mut self, report: &StatsReport) -> Result<(), ReportError> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

/// Emits reports as structured log events
#[derive(Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn emit(&mut self, report: &StatsReport) -> Result<(), ReportError> {
        info!(
            sequence = report.sequence,
            final_report = report.final_report,
            sent = report.router.sent(),
            malformed = report.router.malformed_records,
            received = report.reducer_received,
            fast_steals = report.fast_pool.steals,
            slow_steals = report.slow_pool.steals,
            backpressure_pct = report.backpressure.overall.percent,
            throughput = report.throughput.overall,
            "stats report"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_report;

    #[test]
    fn test_json_lines_sink() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let report = sample_report();
        sink.emit(&report).unwrap();
        sink.emit(&report).unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let decoded: StatsReport = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(decoded.sequence, report.sequence);
        assert_eq!(decoded.router, report.router);
    }

    #[test]
    fn test_run_dir_sink_cleans_previous_run() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("run-2fast-1slow");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stale.txt"), "old").unwrap();

        let mut sink = RunDirSink::create(&dir).unwrap();
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        let mut report = sample_report();
        sink.emit(&report).unwrap();
        report.sequence += 1;
        sink.emit(&report).unwrap();

        let files: Vec<PathBuf> = fs::read_dir(sink.dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 2);
        for path in files {
            let decoded: StatsReport =
                serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
            assert_eq!(decoded.reducer_received, 4);
        }
    }

    #[test]
    fn test_memory_sink_shares_buffer() {
        let sink = MemorySink::new();
        let mut boxed: Box<dyn ReportSink> = Box::new(sink.clone());
        boxed.emit(&sample_report()).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.reports()[0].sequence, 3);
    }
}
