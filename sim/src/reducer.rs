//! Reducer
//!
//! Single consumer of the completion queue. Counts finished tasks per group
//! key and declares the run finished once every worker has sent its exit
//! sentinel.

use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::RunContext;
use crate::error::SchedError;
use crate::worker::{Completion, WorkerReport};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReducerOutput {
    pub counts: BTreeMap<String, u64>,
    pub received: u64,
    pub exited: Vec<WorkerReport>,
}

impl ReducerOutput {
    pub fn count(&self, group_key: &str) -> u64 {
        self.counts.get(group_key).copied().unwrap_or(0)
    }
}

pub struct Reducer {
    ctx: Arc<RunContext>,
    completions: Receiver<Completion>,
    expected: usize,
}

impl Reducer {
    pub fn new(ctx: Arc<RunContext>, completions: Receiver<Completion>) -> Self {
        let expected = ctx.config.total_workers();
        Self {
            ctx,
            completions,
            expected,
        }
    }

    pub fn run(self) -> Result<ReducerOutput, SchedError> {
        let mut out = ReducerOutput::default();

        while out.exited.len() < self.expected {
            match self.completions.recv() {
                Ok(Completion::Done(task)) => {
                    *out.counts.entry(task.group_key).or_insert(0) += 1;
                    out.received += 1;
                    self.ctx.reducer_received.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Completion::Exited(report)) => {
                    debug!(
                        worker = report.id,
                        pool = %report.pool,
                        exited = out.exited.len() + 1,
                        expected = self.expected,
                        "worker exit sentinel"
                    );
                    out.exited.push(report);
                }
                Err(_) => {
                    self.ctx.signal.finish();
                    return Err(SchedError::CompletionDisconnected {
                        exited: out.exited.len(),
                        expected: self.expected,
                    });
                }
            }
        }

        self.ctx.signal.finish();
        info!(received = out.received, groups = out.counts.len(), "reducer finished");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaneConfig;
    use crossbeam_channel::unbounded;
    use task_format::{Lane, Task};

    fn exited(id: usize, pool: Lane) -> Completion {
        Completion::Exited(WorkerReport {
            id,
            pool,
            processed: 0,
            stolen: 0,
            panicked: false,
        })
    }

    #[test]
    fn test_reducer_counts_until_all_exit() {
        let ctx = RunContext::new(LaneConfig {
            fast_workers: 1,
            slow_workers: 1,
            ..LaneConfig::default()
        });
        let (tx, rx) = unbounded();
        for key in ["e1", "e1", "e2", "e1"] {
            tx.send(Completion::Done(Task::new(key, 1))).unwrap();
        }
        tx.send(exited(0, Lane::Fast)).unwrap();
        tx.send(Completion::Done(Task::new("e2", 500))).unwrap();
        tx.send(exited(0, Lane::Slow)).unwrap();

        let out = Reducer::new(Arc::clone(&ctx), rx).run().unwrap();
        assert_eq!(out.count("e1"), 3);
        assert_eq!(out.count("e2"), 2);
        assert_eq!(out.count("missing"), 0);
        assert_eq!(out.received, 5);
        assert_eq!(out.exited.len(), 2);
        assert_eq!(ctx.reducer_received(), 5);
        assert!(ctx.signal.is_finished());
    }

    #[test]
    fn test_reducer_reports_disconnect() {
        let ctx = RunContext::new(LaneConfig {
            fast_workers: 2,
            slow_workers: 0,
            ..LaneConfig::default()
        });
        let (tx, rx) = unbounded();
        tx.send(exited(0, Lane::Fast)).unwrap();
        drop(tx);

        let err = Reducer::new(Arc::clone(&ctx), rx).run().unwrap_err();
        assert!(matches!(
            err,
            SchedError::CompletionDisconnected { exited: 1, expected: 2 }
        ));
        assert!(ctx.signal.is_finished());
    }
}
