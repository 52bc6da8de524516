//! Threshold / pool split sweep
//!
//! Runs the same seeded workload under every threshold and worker split
//! and prints one row per run.

use anyhow::{bail, Result};
use clap::Parser;
use lane_sim::{LaneConfig, LaneScheduler, RunSummary, WorkloadKind};
use lane_telemetry::MemorySink;
use task_format::Lane;

#[derive(Parser)]
#[command(name = "sweep", version, about = "Sweep lane thresholds and worker splits")]
struct Cli {
    /// Lane thresholds to try
    #[arg(short, long, value_delimiter = ',', default_values_t = vec![1000.0, 3000.0, 6000.0, 8000.0])]
    thresholds: Vec<f64>,

    /// Worker splits as FAST:SLOW
    #[arg(short, long, value_delimiter = ',', value_parser = parse_split,
          default_values = ["3:1", "1:3", "2:2", "5:3", "3:5", "4:4"])]
    splits: Vec<(usize, usize)>,

    #[arg(long, default_value_t = 0.05)]
    time_scale: f64,

    #[arg(long, value_enum, default_value_t = WorkloadKind::HeavyTail)]
    workload: WorkloadKind,

    #[arg(long, default_value_t = 500)]
    records: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn parse_split(s: &str) -> Result<(usize, usize), String> {
    let (fast, slow) = s
        .split_once(':')
        .ok_or_else(|| format!("expected FAST:SLOW, got {s:?}"))?;
    let fast = fast.trim().parse().map_err(|e| format!("fast count {fast:?}: {e}"))?;
    let slow = slow.trim().parse().map_err(|e| format!("slow count {slow:?}: {e}"))?;
    Ok((fast, slow))
}

struct Row {
    threshold: f64,
    fast: usize,
    slow: usize,
    summary: RunSummary,
}

fn main() -> Result<()> {
    lane_sim::init_tracing();
    let cli = Cli::parse();
    if cli.thresholds.is_empty() || cli.splits.is_empty() {
        bail!("need at least one threshold and one split");
    }

    println!("=== Lane Sweep ===");
    println!(
        "Workload: {:?}, {} records, seed {}, {} ms/unit\n",
        cli.workload, cli.records, cli.seed, cli.time_scale
    );
    println!(
        "{:>9} {:>5} {:>5} {:>10} {:>12} {:>8} {:>8} {:>8} {:>8}",
        "Threshold", "Fast", "Slow", "Elapsed", "Throughput", "FastBP%", "SlowBP%", "FStolen", "SStolen"
    );
    println!("{:-<85}", "");

    let mut rows = Vec::new();
    for &threshold in &cli.thresholds {
        for &(fast, slow) in &cli.splits {
            let config = LaneConfig {
                fast_workers: fast,
                slow_workers: slow,
                threshold,
                time_scale: cli.time_scale,
                ..LaneConfig::default()
            };
            let summary = LaneScheduler::new(config)
                .with_sink(MemorySink::new())
                .run_records(cli.workload.records(cli.records, cli.seed))?;

            let bp = &summary.final_report.backpressure;
            println!(
                "{:>9} {:>5} {:>5} {:>9.2}s {:>12.2} {:>8.1} {:>8.1} {:>8} {:>8}",
                threshold,
                fast,
                slow,
                summary.elapsed.as_secs_f64(),
                summary.throughput(),
                bp.fast.percent,
                bp.slow.percent,
                summary.stolen_by(Lane::Fast),
                summary.stolen_by(Lane::Slow)
            );
            rows.push(Row { threshold, fast, slow, summary });
        }
    }

    let best = rows
        .iter()
        .max_by(|a, b| a.summary.throughput().total_cmp(&b.summary.throughput()));
    if let Some(best) = best {
        println!("\n=== Empirical Optimum ===");
        println!(
            "Threshold {} with {} fast / {} slow ({:.2} tasks/s)",
            best.threshold,
            best.fast,
            best.slow,
            best.summary.throughput()
        );
    }
    Ok(())
}
