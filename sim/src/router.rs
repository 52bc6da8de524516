//! Lane router
//!
//! Expands input records into tasks and pushes each onto the lane its cost
//! selects. Runs on the caller's thread; closing the lanes afterwards is the
//! end-of-input signal for the workers.

use lane_telemetry::RouterStats;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use task_format::{Lane, Record, RecordError, Task};
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::SchedError;

#[derive(Debug, Default)]
pub struct RouterCounters {
    sent_fast: AtomicU64,
    sent_slow: AtomicU64,
    malformed: AtomicU64,
}

impl RouterCounters {
    fn record_sent(&self, lane: Lane) {
        let counter = match lane {
            Lane::Fast => &self.sent_fast,
            Lane::Slow => &self.sent_slow,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self, lane: Lane) -> u64 {
        match lane {
            Lane::Fast => self.sent_fast.load(Ordering::Relaxed),
            Lane::Slow => self.sent_slow.load(Ordering::Relaxed),
        }
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RouterStats {
        RouterStats {
            sent_fast: self.sent(Lane::Fast),
            sent_slow: self.sent(Lane::Slow),
            malformed_records: self.malformed(),
        }
    }
}

pub struct LaneRouter {
    ctx: Arc<RunContext>,
}

impl LaneRouter {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    /// Enqueue one task on its lane
    pub fn route(&self, task: Task) -> Result<Lane, SchedError> {
        let lane = task.lane(self.ctx.config.threshold);
        self.ctx
            .queue(lane)
            .enqueue(task)
            .map_err(|_| SchedError::QueueClosed { lane })?;
        self.ctx.router.record_sent(lane);
        Ok(lane)
    }

    /// Route every task of a record, in order
    pub fn route_record(&self, record: &Record) -> Result<usize, SchedError> {
        let mut routed = 0;
        for task in record.tasks() {
            self.route(task)?;
            routed += 1;
        }
        Ok(routed)
    }

    /// Route a whole input stream. Malformed records are logged and
    /// skipped; an unreadable input stops routing.
    pub fn route_all<I>(&self, records: I) -> Result<RouterStats, SchedError>
    where
        I: IntoIterator<Item = Result<Record, RecordError>>,
    {
        for record in records {
            match record {
                Ok(record) => {
                    let routed = self.route_record(&record)?;
                    debug!(group_key = %record.group_key, tasks = routed, "routed record");
                }
                Err(e) if e.is_recoverable() => {
                    warn!(line = e.line(), error = %e, "skipping malformed record");
                    self.ctx.router.malformed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => return Err(SchedError::Input(e)),
            }
        }
        Ok(self.ctx.router.snapshot())
    }

    pub fn close(&self) {
        self.ctx.close_lanes();
        let stats = self.ctx.router.snapshot();
        info!(
            sent_fast = stats.sent_fast,
            sent_slow = stats.sent_slow,
            malformed = stats.malformed_records,
            "input exhausted, lanes closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaneConfig;
    use task_format::RecordReader;

    fn router(threshold: f64) -> LaneRouter {
        LaneRouter::new(RunContext::new(LaneConfig {
            threshold,
            ..LaneConfig::default()
        }))
    }

    #[test]
    fn test_route_by_threshold() {
        let router = router(10.0);
        assert_eq!(router.route(Task::new("a", 10)).unwrap(), Lane::Fast);
        assert_eq!(router.route(Task::new("a", 11)).unwrap(), Lane::Slow);

        let ctx = &router.ctx;
        assert_eq!(ctx.fast.len(), 1);
        assert_eq!(ctx.slow.len(), 1);
        assert_eq!(ctx.router.sent(Lane::Fast), 1);
        assert_eq!(ctx.router.sent(Lane::Slow), 1);
    }

    #[test]
    fn test_route_records_counts_malformed() {
        let router = router(10.0);
        let input = "e1,1 2 3\nbroken\ne2,100\n,5\n";
        let stats = router
            .route_all(RecordReader::new(input.as_bytes()))
            .unwrap();

        assert_eq!(stats.sent_fast, 3);
        assert_eq!(stats.sent_slow, 1);
        assert_eq!(stats.malformed_records, 2);
    }

    #[test]
    fn test_route_after_close_fails() {
        let router = router(10.0);
        router.close();
        let err = router.route(Task::new("late", 1)).unwrap_err();
        assert!(matches!(err, SchedError::QueueClosed { lane: Lane::Fast }));
        assert_eq!(router.ctx.router.sent(Lane::Fast), 0);
    }

    #[test]
    fn test_infinite_threshold_routes_everything_fast() {
        let router = router(f64::INFINITY);
        router
            .route_record(&Record::new("k", vec![0, 1, u64::MAX]))
            .unwrap();
        assert_eq!(router.ctx.fast.len(), 3);
        assert!(router.ctx.slow.is_empty());
    }
}
