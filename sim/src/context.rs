//! Shared run state
//!
//! Everything the pipeline components share lives in one `RunContext`,
//! created per run and handed to each component at construction.

use lane_telemetry::{BackpressureTracker, PoolStats};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use task_format::{Lane, Task};

use crate::config::LaneConfig;
use crate::queue::LaneQueue;
use crate::router::RouterCounters;
use crate::worker::WorkerCounters;

/// One-shot "run finished" flag that periodic threads can sleep on
#[derive(Debug, Default)]
pub struct RunSignal {
    finished: Mutex<bool>,
    cond: Condvar,
}

impl RunSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(&self) {
        *self.finished.lock() = true;
        self.cond.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock()
    }

    /// Sleep up to `timeout`, returning early once finished.
    /// Returns whether the run has finished.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut finished = self.finished.lock();
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while !*finished {
                self.cond.wait(&mut finished);
            }
            return true;
        };
        while !*finished {
            if self.cond.wait_until(&mut finished, deadline).timed_out() {
                break;
            }
        }
        *finished
    }
}

pub struct RunContext {
    pub config: LaneConfig,
    pub started_at: Instant,
    pub fast: LaneQueue<Task>,
    pub slow: LaneQueue<Task>,
    pub router: RouterCounters,
    pub fast_workers: Vec<Arc<WorkerCounters>>,
    pub slow_workers: Vec<Arc<WorkerCounters>>,
    pub reducer_received: AtomicU64,
    pub backpressure: Mutex<BackpressureTracker>,
    pub signal: RunSignal,
}

impl RunContext {
    pub fn new(config: LaneConfig) -> Arc<Self> {
        let started_at = Instant::now();
        let counters = |n: usize| -> Vec<Arc<WorkerCounters>> {
            (0..n).map(|_| Arc::new(WorkerCounters::default())).collect()
        };
        Arc::new(Self {
            fast_workers: counters(config.fast_workers),
            slow_workers: counters(config.slow_workers),
            config,
            started_at,
            fast: LaneQueue::new(),
            slow: LaneQueue::new(),
            router: RouterCounters::default(),
            reducer_received: AtomicU64::new(0),
            backpressure: Mutex::new(BackpressureTracker::new(started_at)),
            signal: RunSignal::new(),
        })
    }

    pub fn queue(&self, lane: Lane) -> &LaneQueue<Task> {
        match lane {
            Lane::Fast => &self.fast,
            Lane::Slow => &self.slow,
        }
    }

    pub fn workers(&self, lane: Lane) -> &[Arc<WorkerCounters>] {
        match lane {
            Lane::Fast => &self.fast_workers,
            Lane::Slow => &self.slow_workers,
        }
    }

    /// Close both lanes; workers drain what is left and exit
    pub fn close_lanes(&self) {
        self.fast.close();
        self.slow.close();
    }

    /// Sum the pool's worker counters. With `take_steals` the interval
    /// steal counters are reset as they are read.
    pub fn pool_stats(&self, lane: Lane, take_steals: bool) -> PoolStats {
        let workers = self.workers(lane);
        let mut stats = PoolStats {
            workers: workers.len(),
            ..PoolStats::default()
        };
        for w in workers {
            stats.received += w.received();
            stats.sent += w.sent();
            stats.steals += if take_steals { w.take_steals() } else { w.steals() };
            stats.steals_total += w.steals_total();
        }
        stats
    }

    pub fn reducer_received(&self) -> u64 {
        self.reducer_received.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
