//! Lane scheduler runner
//!
//! Runs the fast/slow lane scheduler over an input file or a synthetic
//! workload and prints the final stats.

use anyhow::{Context, Result};
use clap::Parser;
use lane_sim::{LaneConfig, LaneScheduler, RunSummary, WorkloadKind};
use lane_telemetry::{JsonLinesSink, LogSink, ReportSink, RunDirSink};
use std::path::PathBuf;
use task_format::{Lane, RecordReader};

#[derive(Parser)]
#[command(name = "lanes", version, about = "Work-stealing fast/slow lane scheduler")]
struct Cli {
    /// TOML config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of fast-lane workers
    #[arg(long)]
    fast_count: Option<usize>,

    /// Number of slow-lane workers
    #[arg(long)]
    slow_count: Option<usize>,

    /// Cost threshold between the fast and slow lanes
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Milliseconds of simulated work per cost unit
    #[arg(long)]
    time_scale: Option<f64>,

    /// Stats report interval in milliseconds
    #[arg(long)]
    report_interval_ms: Option<u64>,

    /// Input file of `<group_key>,<cost cost ...>` lines
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Synthetic workload used when no input file is given
    #[arg(long, value_enum, default_value_t = WorkloadKind::HeavyTail)]
    workload: WorkloadKind,

    /// Records generated for the synthetic workload
    #[arg(long, default_value_t = 1000)]
    records: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write one JSON file per report into this directory
    #[arg(long, conflicts_with = "json")]
    report_dir: Option<PathBuf>,

    /// Print reports as JSON lines on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    lane_sim::init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LaneConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => LaneConfig::default(),
    };
    if let Some(n) = cli.fast_count {
        config.fast_workers = n;
    }
    if let Some(n) = cli.slow_count {
        config.slow_workers = n;
    }
    if let Some(t) = cli.threshold {
        config.threshold = t;
    }
    if let Some(scale) = cli.time_scale {
        config.time_scale = scale;
    }
    if let Some(ms) = cli.report_interval_ms {
        config.report_interval_ms = ms;
    }
    config.validate().context("invalid configuration")?;

    let sink: Box<dyn ReportSink> = if let Some(dir) = &cli.report_dir {
        Box::new(RunDirSink::create(dir).with_context(|| format!("creating {}", dir.display()))?)
    } else if cli.json {
        Box::new(JsonLinesSink::new(std::io::stdout()))
    } else {
        Box::new(LogSink)
    };

    println!("=== Lane Scheduler ===");
    println!(
        "Workers: {} fast / {} slow | Threshold: {} | Time scale: {} ms/unit\n",
        config.fast_workers, config.slow_workers, config.threshold, config.time_scale
    );

    let scheduler = LaneScheduler::new(config).with_sink(sink);
    let summary = match &cli.input {
        Some(path) => {
            let reader = RecordReader::open(path).with_context(|| format!("opening {}", path.display()))?;
            scheduler.run(reader)?
        }
        None => scheduler.run_records(cli.workload.records(cli.records, cli.seed))?,
    };

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== Results ===");
    println!("Tasks completed: {}", summary.received);
    println!("Group keys: {}", summary.counts.len());
    println!("Malformed records: {}", summary.router.malformed_records);
    println!("Elapsed: {:.2}s", summary.elapsed.as_secs_f64());
    println!("Throughput: {:.2} tasks/s", summary.throughput());
    for pool in Lane::ALL {
        println!(
            "{} pool: routed {} | processed {} | stolen {}",
            pool,
            summary.router.sent_to(pool),
            summary.processed_by(pool),
            summary.stolen_by(pool)
        );
    }
    println!("{}", summary.final_report);
}
