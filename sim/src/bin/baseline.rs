//! Single-pool baseline
//!
//! Every task goes to one lane served by one pool, the head-of-line
//! blocking setup the lane split is compared against.

use anyhow::{Context, Result};
use clap::Parser;
use lane_sim::{LaneConfig, LaneScheduler, WorkloadKind};
use lane_telemetry::LogSink;
use std::path::PathBuf;
use task_format::RecordReader;

#[derive(Parser)]
#[command(name = "baseline", version, about = "Single shared queue baseline")]
struct Cli {
    /// Worker threads in the single pool
    #[arg(short = 'n', long, default_value_t = 4)]
    workers: usize,

    #[arg(long, default_value_t = 1.0)]
    time_scale: f64,

    #[arg(short, long)]
    input: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = WorkloadKind::HeavyTail)]
    workload: WorkloadKind,

    #[arg(long, default_value_t = 1000)]
    records: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    lane_sim::init_tracing();
    let cli = Cli::parse();

    let config = LaneConfig {
        fast_workers: cli.workers,
        slow_workers: 0,
        threshold: f64::INFINITY,
        time_scale: cli.time_scale,
        ..LaneConfig::default()
    };

    println!("=== Lane Scheduler: Baseline ===");
    println!("Policy: single queue, N={} workers\n", cli.workers);

    let scheduler = LaneScheduler::new(config).with_sink(LogSink);
    let summary = match &cli.input {
        Some(path) => {
            let reader = RecordReader::open(path).with_context(|| format!("opening {}", path.display()))?;
            scheduler.run(reader)?
        }
        None => scheduler.run_records(cli.workload.records(cli.records, cli.seed))?,
    };

    println!("\n=== Results ===");
    println!("Tasks completed: {}", summary.received);
    println!("Group keys: {}", summary.counts.len());
    println!("Elapsed: {:.2}s", summary.elapsed.as_secs_f64());
    println!("Throughput: {:.2} tasks/s", summary.throughput());
    println!(
        "Queue back-pressure: {:.2}s ({:.1}%)",
        summary.final_report.backpressure.overall.seconds,
        summary.final_report.backpressure.overall.percent
    );
    Ok(())
}
