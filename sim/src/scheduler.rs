//! Lane scheduler
//!
//! Wires one run together: spawns the monitor, the reporter, both worker
//! pools and the reducer, routes the input on the calling thread, then
//! closes the lanes and joins everything.

use crossbeam_channel::unbounded;
use lane_telemetry::{LogSink, ReportSink, RouterStats, StatsReport};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use task_format::{Lane, Record, RecordError};
use tracing::{error, info};

use crate::config::LaneConfig;
use crate::context::RunContext;
use crate::error::{Component, SchedError};
use crate::monitor::BackpressureMonitor;
use crate::reducer::{Reducer, ReducerOutput};
use crate::reporter::StatsReporter;
use crate::router::LaneRouter;
use crate::worker::{SleepExecutor, TaskExecutor, Worker, WorkerReport};

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub counts: BTreeMap<String, u64>,
    pub received: u64,
    pub router: RouterStats,
    pub workers: Vec<WorkerReport>,
    pub backpressure_samples: u64,
    pub elapsed: Duration,
    pub final_report: StatsReport,
}

impl RunSummary {
    pub fn count(&self, group_key: &str) -> u64 {
        self.counts.get(group_key).copied().unwrap_or(0)
    }

    /// Tasks completed by workers of `pool`
    pub fn processed_by(&self, pool: Lane) -> u64 {
        self.workers.iter().filter(|w| w.pool == pool).map(|w| w.processed).sum()
    }

    /// Tasks workers of `pool` took from the other lane
    pub fn stolen_by(&self, pool: Lane) -> u64 {
        self.workers.iter().filter(|w| w.pool == pool).map(|w| w.stolen).sum()
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.received as f64 / secs
        } else {
            0.0
        }
    }
}

pub struct LaneScheduler {
    config: LaneConfig,
    executor: Arc<dyn TaskExecutor>,
    sink: Box<dyn ReportSink>,
}

impl LaneScheduler {
    pub fn new(config: LaneConfig) -> Self {
        let executor = Arc::new(SleepExecutor::new(config.time_scale));
        Self {
            config,
            executor,
            sink: Box::new(LogSink),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_sink<S: ReportSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    /// Run over already-parsed records
    pub fn run_records<I>(self, records: I) -> Result<RunSummary, SchedError>
    where
        I: IntoIterator<Item = Record>,
    {
        self.run(records.into_iter().map(Ok))
    }

    /// Run over an input stream that may contain malformed records
    pub fn run<I>(self, records: I) -> Result<RunSummary, SchedError>
    where
        I: IntoIterator<Item = Result<Record, RecordError>>,
    {
        self.config.validate()?;
        let start = Instant::now();
        let ctx = RunContext::new(self.config.clone());
        info!(
            fast_workers = ctx.config.fast_workers,
            slow_workers = ctx.config.slow_workers,
            threshold = ctx.config.threshold,
            "starting lane scheduler"
        );

        let monitor = {
            let monitor = BackpressureMonitor::new(Arc::clone(&ctx));
            spawn(Component::Monitor, "bp-monitor".into(), move || monitor.run())?
        };

        let reporter = {
            let reporter = StatsReporter::new(Arc::clone(&ctx), self.sink);
            match spawn(Component::Reporter, "stats-reporter".into(), move || reporter.run()) {
                Ok(handle) => handle,
                Err(e) => {
                    ctx.signal.finish();
                    let _ = monitor.join();
                    return Err(e);
                }
            }
        };

        let (tx, rx) = unbounded();
        let mut workers = Vec::with_capacity(ctx.config.total_workers());
        for pool in Lane::ALL {
            for (id, counters) in ctx.workers(pool).iter().enumerate() {
                let worker = Worker::new(
                    id,
                    pool,
                    Arc::clone(&ctx),
                    Arc::clone(counters),
                    tx.clone(),
                    Arc::clone(&self.executor),
                );
                match spawn(Component::Worker, worker.name(), move || worker.run()) {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        drop(tx);
                        abort(&ctx, workers, monitor, reporter);
                        return Err(e);
                    }
                }
            }
        }
        drop(tx);

        let reducer = {
            let reducer = Reducer::new(Arc::clone(&ctx), rx);
            match spawn(Component::Reducer, "reducer".into(), move || reducer.run()) {
                Ok(handle) => handle,
                Err(e) => {
                    abort(&ctx, workers, monitor, reporter);
                    return Err(e);
                }
            }
        };

        let router = LaneRouter::new(Arc::clone(&ctx));
        let routed = router.route_all(records);
        router.close();

        let reduced = join(reducer, Component::Reducer).and_then(|r| r);
        // The reducer normally raises this itself; a panicked reducer can't
        ctx.signal.finish();
        let reports: Vec<Result<WorkerReport, SchedError>> =
            workers.into_iter().map(|h| join(h, Component::Worker)).collect();
        let samples = join(monitor, Component::Monitor);
        let final_report = join(reporter, Component::Reporter).and_then(|r| r);

        let fail = |e: SchedError| {
            error!(component = %e.component(), error = %e, "run failed");
            e
        };
        routed.map_err(fail)?;
        let ReducerOutput { counts, received, .. } = reduced.map_err(fail)?;
        let reports = reports.into_iter().collect::<Result<Vec<_>, _>>().map_err(fail)?;
        let samples = samples.map_err(fail)?;
        let final_report = final_report.map_err(fail)?;

        let summary = RunSummary {
            counts,
            received,
            router: ctx.router.snapshot(),
            workers: reports,
            backpressure_samples: samples,
            elapsed: start.elapsed(),
            final_report,
        };
        info!(
            received = summary.received,
            groups = summary.counts.len(),
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "run complete"
        );
        Ok(summary)
    }
}

fn spawn<T, F>(component: Component, name: String, f: F) -> Result<JoinHandle<T>, SchedError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name)
        .spawn(f)
        .map_err(|source| SchedError::Spawn { component, source })
}

fn join<T>(handle: JoinHandle<T>, component: Component) -> Result<T, SchedError> {
    let thread = handle.thread().name().unwrap_or("unnamed").to_string();
    handle.join().map_err(|_| SchedError::Panicked { component, thread })
}

/// Tear down a partially started run
fn abort<M, R>(
    ctx: &RunContext,
    workers: Vec<JoinHandle<WorkerReport>>,
    monitor: JoinHandle<M>,
    reporter: JoinHandle<R>,
) {
    ctx.close_lanes();
    for handle in workers {
        let _ = handle.join();
    }
    ctx.signal.finish();
    let _ = monitor.join();
    let _ = reporter.join();
}
