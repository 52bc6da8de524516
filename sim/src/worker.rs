//! Lane workers
//!
//! Each worker belongs to a pool and prefers its own lane. When its own lane
//! is empty it steals from the other lane; when both are empty it blocks on
//! one of them with a bounded, growing timeout. A worker exits once it has
//! seen its own lane drained and then the other lane drained.

use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use task_format::{Lane, Task};
use tracing::{debug, error};

use crate::context::RunContext;
use crate::queue::Dequeued;

/// Performs the work a task stands for
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: &Task);
}

/// Sleeps for `cost * time_scale` milliseconds
#[derive(Debug, Clone, Copy)]
pub struct SleepExecutor {
    time_scale: f64,
}

impl SleepExecutor {
    pub fn new(time_scale: f64) -> Self {
        Self { time_scale }
    }
}

impl TaskExecutor for SleepExecutor {
    fn execute(&self, task: &Task) {
        let work = task.work_time(self.time_scale);
        if !work.is_zero() {
            thread::sleep(work);
        }
    }
}

/// Completes tasks immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl TaskExecutor for NoopExecutor {
    fn execute(&self, _task: &Task) {}
}

/// Per-worker counters; the owning worker is the only writer
#[derive(Debug, Default)]
pub struct WorkerCounters {
    received: AtomicU64,
    sent: AtomicU64,
    steals: AtomicU64, // since last report
    steals_total: AtomicU64,
}

impl WorkerCounters {
    pub fn record_received(&self, stolen: bool) {
        self.received.fetch_add(1, Ordering::Relaxed);
        if stolen {
            self.steals.fetch_add(1, Ordering::Relaxed);
            self.steals_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn steals(&self) -> u64 {
        self.steals.load(Ordering::Relaxed)
    }

    /// Read and reset the interval steal count
    pub fn take_steals(&self) -> u64 {
        self.steals.swap(0, Ordering::Relaxed)
    }

    pub fn steals_total(&self) -> u64 {
        self.steals_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub pool: Lane,
    pub processed: u64,
    pub stolen: u64,
    pub panicked: bool,
}

/// Messages on the completion queue
#[derive(Debug)]
pub enum Completion {
    Done(Task),
    /// Sent exactly once per worker, on any exit path
    Exited(WorkerReport),
}

/// Sends the exit sentinel when dropped, including during unwinding
struct ExitGuard {
    completions: Sender<Completion>,
    report: WorkerReport,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut report = self.report.clone();
        report.panicked = thread::panicking();
        if self.completions.send(Completion::Exited(report)).is_err() {
            debug!(worker = self.report.id, pool = %self.report.pool, "reducer gone before exit sentinel");
        }
    }
}

struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    const INITIAL: Duration = Duration::from_millis(1);

    fn new(max: Duration) -> Self {
        Self {
            current: Self::INITIAL.min(max),
            max,
        }
    }

    fn next(&mut self) -> Duration {
        let wait = self.current;
        self.current = (self.current * 2).min(self.max);
        wait
    }

    fn reset(&mut self) {
        self.current = Self::INITIAL.min(self.max);
    }
}

pub struct Worker {
    id: usize,
    pool: Lane,
    ctx: Arc<RunContext>,
    counters: Arc<WorkerCounters>,
    completions: Sender<Completion>,
    executor: Arc<dyn TaskExecutor>,
}

impl Worker {
    pub fn new(
        id: usize,
        pool: Lane,
        ctx: Arc<RunContext>,
        counters: Arc<WorkerCounters>,
        completions: Sender<Completion>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            id,
            pool,
            ctx,
            counters,
            completions,
            executor,
        }
    }

    pub fn name(&self) -> String {
        format!("{}-worker-{}", self.pool, self.id)
    }

    pub fn run(self) -> WorkerReport {
        let mut guard = ExitGuard {
            completions: self.completions.clone(),
            report: WorkerReport {
                id: self.id,
                pool: self.pool,
                processed: 0,
                stolen: 0,
                panicked: false,
            },
        };
        let own = self.ctx.queue(self.pool);
        let other = self.ctx.queue(self.pool.other());
        let mut backoff = Backoff::new(self.ctx.config.idle_backoff_max());

        loop {
            let own_state = match own.try_dequeue() {
                Dequeued::Item(task) => {
                    backoff.reset();
                    if !self.process(task, false, &mut guard.report) {
                        break;
                    }
                    continue;
                }
                state => state,
            };

            let other_state = match other.try_dequeue() {
                Dequeued::Item(task) => {
                    backoff.reset();
                    if !self.process(task, true, &mut guard.report) {
                        break;
                    }
                    continue;
                }
                state => state,
            };

            if own_state.is_drained() && other_state.is_drained() {
                break;
            }

            // Both lanes empty: block on our own lane while it can still
            // produce work, otherwise on the other one.
            let wait = backoff.next();
            let (lane, stolen) = if own_state.is_drained() {
                (other, true)
            } else {
                (own, false)
            };
            if let Dequeued::Item(task) = lane.dequeue(wait) {
                backoff.reset();
                if !self.process(task, stolen, &mut guard.report) {
                    break;
                }
            }
        }

        debug!(
            worker = self.id,
            pool = %self.pool,
            processed = guard.report.processed,
            stolen = guard.report.stolen,
            "worker exiting"
        );
        guard.report.clone()
    }

    /// Execute one task and forward it to the reducer.
    /// Returns false if the reducer is gone.
    fn process(&self, task: Task, stolen: bool, report: &mut WorkerReport) -> bool {
        self.counters.record_received(stolen);
        if stolen {
            report.stolen += 1;
        }

        self.executor.execute(&task);

        if self.completions.send(Completion::Done(task)).is_err() {
            error!(worker = self.id, pool = %self.pool, "completion queue closed, stopping");
            return false;
        }
        self.counters.record_sent();
        report.processed += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaneConfig;
    use crossbeam_channel::unbounded;
    use std::time::Instant;

    fn context(fast: usize, slow: usize) -> Arc<RunContext> {
        RunContext::new(LaneConfig {
            fast_workers: fast,
            slow_workers: slow,
            threshold: 10.0,
            time_scale: 0.0,
            ..LaneConfig::default()
        })
    }

    fn worker(ctx: &Arc<RunContext>, pool: Lane, tx: Sender<Completion>) -> Worker {
        let counters = Arc::clone(&ctx.workers(pool)[0]);
        Worker::new(0, pool, Arc::clone(ctx), counters, tx, Arc::new(NoopExecutor))
    }

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let mut b = Backoff::new(Duration::from_millis(5));
        let waits: Vec<u128> = (0..5).map(|_| b.next().as_millis()).collect();
        assert_eq!(waits, vec![1, 2, 4, 5, 5]);
        b.reset();
        assert_eq!(b.next(), Duration::from_millis(1));
    }

    #[test]
    fn test_worker_drains_own_then_steals() {
        let ctx = context(1, 0);
        ctx.fast.enqueue(Task::new("a", 1)).unwrap();
        ctx.fast.enqueue(Task::new("a", 2)).unwrap();
        ctx.slow.enqueue(Task::new("b", 50)).unwrap();
        ctx.close_lanes();

        let (tx, rx) = unbounded();
        let report = worker(&ctx, Lane::Fast, tx).run();

        assert_eq!(report.processed, 3);
        assert_eq!(report.stolen, 1);
        assert!(!report.panicked);

        let msgs: Vec<Completion> = rx.try_iter().collect();
        assert_eq!(msgs.len(), 4);
        assert!(matches!(&msgs[0], Completion::Done(t) if t.cost == 1));
        assert!(matches!(&msgs[2], Completion::Done(t) if t.cost == 50));
        assert!(matches!(&msgs[3], Completion::Exited(r) if r.processed == 3));

        let counters = &ctx.fast_workers[0];
        assert_eq!(counters.received(), 3);
        assert_eq!(counters.sent(), 3);
        assert_eq!(counters.steals_total(), 1);
    }

    #[test]
    fn test_worker_waits_for_late_tasks() {
        let ctx = context(0, 1);
        let (tx, rx) = unbounded();
        let handle = {
            let w = worker(&ctx, Lane::Slow, tx);
            thread::spawn(move || w.run())
        };

        thread::sleep(Duration::from_millis(30));
        ctx.slow.enqueue(Task::new("late", 20)).unwrap();
        ctx.fast.enqueue(Task::new("late", 1)).unwrap();
        thread::sleep(Duration::from_millis(30));
        ctx.close_lanes();

        let report = handle.join().unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.stolen, 1);
        assert_eq!(rx.try_iter().count(), 3);
    }

    #[test]
    fn test_worker_exits_promptly_on_close() {
        let ctx = context(1, 0);
        let (tx, rx) = unbounded();
        let handle = {
            let w = worker(&ctx, Lane::Fast, tx);
            thread::spawn(move || w.run())
        };

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        ctx.close_lanes();
        let report = handle.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(report.processed, 0);

        let msgs: Vec<Completion> = rx.try_iter().collect();
        assert_eq!(msgs.len(), 1);
        assert!(matches!(&msgs[0], Completion::Exited(_)));
    }

    struct PanicExecutor;

    impl TaskExecutor for PanicExecutor {
        fn execute(&self, task: &Task) {
            if task.cost == 13 {
                panic!("bad task");
            }
        }
    }

    #[test]
    fn test_exit_sentinel_sent_on_panic() {
        let ctx = context(1, 0);
        ctx.fast.enqueue(Task::new("a", 1)).unwrap();
        ctx.fast.enqueue(Task::new("a", 13)).unwrap();
        ctx.close_lanes();

        let (tx, rx) = unbounded();
        let counters = Arc::clone(&ctx.fast_workers[0]);
        let w = Worker::new(0, Lane::Fast, Arc::clone(&ctx), counters, tx, Arc::new(PanicExecutor));
        assert!(thread::spawn(move || w.run()).join().is_err());

        let msgs: Vec<Completion> = rx.try_iter().collect();
        assert_eq!(msgs.len(), 2);
        match &msgs[1] {
            Completion::Exited(report) => {
                assert!(report.panicked);
                assert_eq!(report.processed, 1);
            }
            other => panic!("expected exit sentinel, got {other:?}"),
        }
    }

    #[test]
    fn test_sleep_executor_scales_cost() {
        let exec = SleepExecutor::new(1.0);
        let start = Instant::now();
        exec.execute(&Task::new("a", 15));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
