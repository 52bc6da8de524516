//! Stats report schema
//!
//! One record per report tick, plus a final one at shutdown. Serialized as
//! JSON for external plotting; `Display` gives the human-readable block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use task_format::Lane;

use crate::{BackpressureSnapshot, BackpressureTotals};

/// Router-side counts (cumulative)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    pub sent_fast: u64,
    pub sent_slow: u64,
    pub malformed_records: u64,
}

impl RouterStats {
    pub fn sent(&self) -> u64 {
        self.sent_fast + self.sent_slow
    }

    pub fn sent_to(&self, lane: Lane) -> u64 {
        match lane {
            Lane::Fast => self.sent_fast,
            Lane::Slow => self.sent_slow,
        }
    }
}

/// Per-pool counts. `steals` covers the last report interval only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub workers: usize,
    pub received: u64,
    pub sent: u64,
    pub steals: u64,
    pub steals_total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneBackpressure {
    pub seconds: f64,
    pub idle_seconds: f64,
    pub percent: f64,
}

impl From<BackpressureTotals> for LaneBackpressure {
    fn from(totals: BackpressureTotals) -> Self {
        Self {
            seconds: totals.in_backpressure.as_secs_f64(),
            idle_seconds: totals.idle.as_secs_f64(),
            percent: totals.percent(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BackpressureReport {
    pub overall: LaneBackpressure,
    pub fast: LaneBackpressure,
    pub slow: LaneBackpressure,
}

impl From<BackpressureSnapshot> for BackpressureReport {
    fn from(snap: BackpressureSnapshot) -> Self {
        Self {
            overall: snap.overall.into(),
            fast: snap.fast.into(),
            slow: snap.slow.into(),
        }
    }
}

/// Completed tasks per second since the run started
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub overall: f64,
    pub fast: f64,
    pub slow: f64,
}

impl Throughput {
    pub fn compute(reducer_received: u64, fast_sent: u64, slow_sent: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return Self::default();
        }
        Self {
            overall: reducer_received as f64 / secs,
            fast: fast_sent as f64 / secs,
            slow: slow_sent as f64 / secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub final_report: bool,
    pub router: RouterStats,
    pub fast_pool: PoolStats,
    pub slow_pool: PoolStats,
    pub reducer_received: u64,
    pub backpressure: BackpressureReport,
    pub throughput: Throughput,
}

impl StatsReport {
    pub fn pool(&self, lane: Lane) -> &PoolStats {
        match lane {
            Lane::Fast => &self.fast_pool,
            Lane::Slow => &self.slow_pool,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "------------------------";
        let bp = &self.backpressure;
        writeln!(f, "{rule}")?;
        writeln!(f, "  Router       - Sent: {} (fast {} | slow {}) | Malformed: {}",
            self.router.sent(), self.router.sent_fast, self.router.sent_slow, self.router.malformed_records)?;
        writeln!(f, "  Fast Workers - Recv: {} | Sent: {}", self.fast_pool.received, self.fast_pool.sent)?;
        writeln!(f, "  Slow Workers - Recv: {} | Sent: {}", self.slow_pool.received, self.slow_pool.sent)?;
        writeln!(f, "  Reducer      - Recv: {}", self.reducer_received)?;
        writeln!(f, "{rule}")?;
        writeln!(f, "  Overall back-pressure : {:.2}s ({:.1}%)", bp.overall.seconds, bp.overall.percent)?;
        writeln!(f, "  Fast back-pressure    : {:.2}s ({:.1}%)", bp.fast.seconds, bp.fast.percent)?;
        writeln!(f, "  Slow back-pressure    : {:.2}s ({:.1}%)", bp.slow.seconds, bp.slow.percent)?;
        writeln!(f, "{rule}")?;
        writeln!(f, "  Fast steals: {} (total {})", self.fast_pool.steals, self.fast_pool.steals_total)?;
        writeln!(f, "  Slow steals: {} (total {})", self.slow_pool.steals, self.slow_pool.steals_total)?;
        writeln!(f, "{rule}")?;
        writeln!(f, "  Overall throughput : {:.3}", self.throughput.overall)?;
        writeln!(f, "  Fast throughput    : {:.3}", self.throughput.fast)?;
        writeln!(f, "  Slow throughput    : {:.3}", self.throughput.slow)?;
        write!(f, "{rule}")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_report() -> StatsReport {
        StatsReport {
            sequence: 3,
            timestamp: Utc::now(),
            elapsed_secs: 2.0,
            final_report: false,
            router: RouterStats {
                sent_fast: 3,
                sent_slow: 1,
                malformed_records: 1,
            },
            fast_pool: PoolStats {
                workers: 2,
                received: 3,
                sent: 3,
                steals: 0,
                steals_total: 0,
            },
            slow_pool: PoolStats {
                workers: 1,
                received: 1,
                sent: 1,
                steals: 1,
                steals_total: 2,
            },
            reducer_received: 4,
            backpressure: BackpressureReport::default(),
            throughput: Throughput::compute(4, 3, 1, Duration::from_secs(2)),
        }
    }

    #[test]
    fn test_throughput() {
        let t = Throughput::compute(10, 6, 4, Duration::from_secs(2));
        assert_eq!(t.overall, 5.0);
        assert_eq!(t.fast, 3.0);
        assert_eq!(t.slow, 2.0);
        assert_eq!(Throughput::compute(10, 6, 4, Duration::ZERO), Throughput::default());
    }

    #[test]
    fn test_json_shape() {
        let report = sample_report();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["router"]["sent_fast"], 3);
        assert_eq!(value["slow_pool"]["steals_total"], 2);
        assert_eq!(value["reducer_received"], 4);
        assert_eq!(value["throughput"]["overall"], 2.0);
        assert!(value["backpressure"]["overall"]["percent"].is_number());
    }

    #[test]
    fn test_display_mentions_each_stage() {
        let text = sample_report().to_string();
        assert!(text.contains("Router       - Sent: 4"));
        assert!(text.contains("Reducer      - Recv: 4"));
        assert!(text.contains("Slow steals: 1 (total 2)"));
    }

    #[test]
    fn test_lane_backpressure_from_totals() {
        let lb = LaneBackpressure::from(BackpressureTotals {
            in_backpressure: Duration::from_millis(500),
            idle: Duration::from_millis(1500),
        });
        assert_eq!(lb.seconds, 0.5);
        assert_eq!(lb.idle_seconds, 1.5);
        assert_eq!(lb.percent, 25.0);
    }
}
