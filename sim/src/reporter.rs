//! Stats reporter
//!
//! Emits a `StatsReport` every report interval and a final one after the
//! run finishes. Steal counts in each report cover the interval since the
//! previous report.

use chrono::Utc;
use lane_telemetry::{ReportSink, StatsReport, Throughput};
use std::sync::Arc;
use std::time::Instant;
use task_format::Lane;
use tracing::info;

use crate::context::RunContext;
use crate::error::SchedError;

pub struct StatsReporter {
    ctx: Arc<RunContext>,
    sink: Box<dyn ReportSink>,
    sequence: u64,
}

impl StatsReporter {
    pub fn new(ctx: Arc<RunContext>, sink: Box<dyn ReportSink>) -> Self {
        Self {
            ctx,
            sink,
            sequence: 0,
        }
    }

    /// Build the next report, resetting interval steal counts
    pub fn snapshot(&mut self, final_report: bool) -> StatsReport {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.ctx.started_at);
        let router = self.ctx.router.snapshot();
        let fast_pool = self.ctx.pool_stats(Lane::Fast, true);
        let slow_pool = self.ctx.pool_stats(Lane::Slow, true);
        let reducer_received = self.ctx.reducer_received();
        let backpressure = self.ctx.backpressure.lock().settled(now).into();

        self.sequence += 1;
        StatsReport {
            sequence: self.sequence,
            timestamp: Utc::now(),
            elapsed_secs: elapsed.as_secs_f64(),
            final_report,
            router,
            fast_pool,
            slow_pool,
            reducer_received,
            backpressure,
            throughput: Throughput::compute(reducer_received, fast_pool.sent, slow_pool.sent, elapsed),
        }
    }

    pub fn emit(&mut self, final_report: bool) -> Result<StatsReport, SchedError> {
        let report = self.snapshot(final_report);
        self.sink.emit(&report)?;
        Ok(report)
    }

    /// Report periodically until the run finishes, then once more
    pub fn run(mut self) -> Result<StatsReport, SchedError> {
        let interval = self.ctx.config.report_interval();
        while !self.ctx.signal.wait(interval) {
            self.emit(false)?;
        }

        let last = self.emit(true)?;
        self.sink.flush()?;
        info!(
            reports = last.sequence,
            received = last.reducer_received,
            elapsed_secs = last.elapsed_secs,
            "final report emitted"
        );
        Ok(last)
    }
}
