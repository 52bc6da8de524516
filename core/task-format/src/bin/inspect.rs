//! Inspect a task input file

use anyhow::{Context, Result};
use clap::Parser;
use task_format::{DatasetStats, RecordReader};

#[derive(Parser, Debug)]
#[command(name = "inspect", version, about = "Summarize a task input file")]
struct Cli {
    /// Input file of `<group_key>,<cost cost ...>` lines
    input: String,

    /// Lane threshold used for the fast/slow split
    #[arg(short = 't', long, default_value_t = 1000.0)]
    threshold: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    println!("Loading {}...", cli.input);

    let reader = RecordReader::open(&cli.input)
        .with_context(|| format!("failed to open {}", cli.input))?;

    let mut records = Vec::new();
    let mut malformed = 0usize;
    for parsed in reader {
        match parsed {
            Ok(record) => records.push(record),
            Err(e) if e.is_recoverable() => {
                eprintln!("skipping: {}", e);
                malformed += 1;
            }
            Err(e) => return Err(e).context("failed to read input"),
        }
    }

    let stats = DatasetStats::from_records(&records);
    let (fast, slow) = stats.lane_split(cli.threshold);

    println!("\n=== Records ===");
    println!("Records: {}", stats.records);
    println!("Malformed (skipped): {}", malformed);
    println!("Tasks: {}", stats.tasks);
    println!("Tasks per record (mean): {:.2}", stats.mean_tasks_per_record);

    println!("\n=== Cost (ms) ===");
    println!("Min: {}", stats.min_cost);
    println!("Mean: {:.2}", stats.mean_cost);
    println!("p50: {}", stats.p50_cost);
    println!("p95: {}", stats.p95_cost);
    println!("p99: {}", stats.p99_cost);
    println!("Max: {}", stats.max_cost);
    println!("Total: {}", stats.total_cost());

    println!("\n=== Lanes (threshold {}) ===", cli.threshold);
    println!("Fast: {}", fast);
    println!("Slow: {}", slow);

    Ok(())
}
