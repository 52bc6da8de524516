//! Lane Scheduler
//!
//! Work-stealing scheduler that splits tasks into a fast and a slow lane by
//! cost, serves each lane with its own worker pool, counts completions per
//! group key and reports queue backpressure over the run.

pub mod config;
pub mod context;
pub mod error;
pub mod monitor;
pub mod queue;
pub mod reducer;
pub mod reporter;
pub mod router;
pub mod scheduler;
pub mod worker;
pub mod workload;

pub use config::{ConfigError, LaneConfig};
pub use context::{RunContext, RunSignal};
pub use error::{Component, SchedError};
pub use monitor::BackpressureMonitor;
pub use queue::{Dequeued, LaneQueue, QueueClosed};
pub use reducer::{Reducer, ReducerOutput};
pub use reporter::StatsReporter;
pub use router::{LaneRouter, RouterCounters};
pub use scheduler::{LaneScheduler, RunSummary};
pub use worker::{Completion, NoopExecutor, SleepExecutor, TaskExecutor, Worker, WorkerCounters, WorkerReport};
pub use workload::{HeavyTailWorkload, ShiftingWorkload, UniformWorkload, WorkloadGenerator, WorkloadKind};

/// Install the `tracing` subscriber used by the binaries
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
