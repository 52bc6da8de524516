//! Lane Telemetry
//!
//! Backpressure accounting for the lane queues and the stats report
//! schema emitted by the scheduler.

mod report;
mod sink;

pub use report::{BackpressureReport, LaneBackpressure, PoolStats, RouterStats, StatsReport, Throughput};
pub use sink::{JsonLinesSink, LogSink, MemorySink, ReportError, ReportSink, RunDirSink};

use std::time::{Duration, Instant};
use task_format::Lane;

/// Accumulated time split between backpressure and idle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackpressureTotals {
    pub in_backpressure: Duration,
    pub idle: Duration,
}

impl BackpressureTotals {
    pub fn total(&self) -> Duration {
        self.in_backpressure + self.idle
    }

    /// Share of time in backpressure, 0 when nothing was accumulated
    pub fn percent(&self) -> f64 {
        let total = self.total().as_secs_f64();
        if total > 0.0 {
            self.in_backpressure.as_secs_f64() / total * 100.0
        } else {
            0.0
        }
    }
}

/// Edge-triggered backpressure accumulator for one queue (or the union)
///
/// Time is only credited on a state change, so the raw accumulators lag
/// wall-clock time by the still-open interval. `settled` closes that
/// interval at the observation instant.
#[derive(Debug, Clone)]
pub struct BackpressureAccount {
    started_at: Instant,
    in_backpressure: Duration,
    idle: Duration,
    last_transition: Instant,
    state: bool, // true = queue non-empty
}

impl BackpressureAccount {
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            in_backpressure: Duration::ZERO,
            idle: Duration::ZERO,
            last_transition: started_at,
            state: false,
        }
    }

    /// Record the state seen at `now`. Returns true on a transition.
    pub fn observe(&mut self, nonempty: bool, now: Instant) -> bool {
        if nonempty == self.state {
            return false;
        }

        let delta = now.saturating_duration_since(self.last_transition);
        if self.state {
            self.in_backpressure += delta;
        } else {
            self.idle += delta;
        }
        self.last_transition = now;
        self.state = nonempty;
        true
    }

    /// Totals credited at transitions only
    pub fn accumulated(&self) -> BackpressureTotals {
        BackpressureTotals {
            in_backpressure: self.in_backpressure,
            idle: self.idle,
        }
    }

    /// Totals with the open interval credited to the current state.
    /// Sums to `now - started_at`.
    pub fn settled(&self, now: Instant) -> BackpressureTotals {
        let mut totals = self.accumulated();
        let open = now.saturating_duration_since(self.last_transition);
        if self.state {
            totals.in_backpressure += open;
        } else {
            totals.idle += open;
        }
        totals
    }

    pub fn in_backpressure(&self) -> bool {
        self.state
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn last_transition(&self) -> Instant {
        self.last_transition
    }
}

/// Settled totals for the union and each lane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackpressureSnapshot {
    pub overall: BackpressureTotals,
    pub fast: BackpressureTotals,
    pub slow: BackpressureTotals,
}

impl BackpressureSnapshot {
    pub fn lane(&self, lane: Lane) -> &BackpressureTotals {
        match lane {
            Lane::Fast => &self.fast,
            Lane::Slow => &self.slow,
        }
    }
}

/// Overall + per-lane accounts, advanced together on each sample
#[derive(Debug, Clone)]
pub struct BackpressureTracker {
    overall: BackpressureAccount,
    lanes: [BackpressureAccount; 2],
    samples: u64,
}

impl BackpressureTracker {
    pub fn new(started_at: Instant) -> Self {
        Self {
            overall: BackpressureAccount::new(started_at),
            lanes: [
                BackpressureAccount::new(started_at),
                BackpressureAccount::new(started_at),
            ],
            samples: 0,
        }
    }

    /// Feed one sample of the lane queue lengths
    pub fn observe(&mut self, fast_len: usize, slow_len: usize, now: Instant) {
        self.overall.observe(fast_len + slow_len > 0, now);
        self.lanes[Lane::Fast.index()].observe(fast_len > 0, now);
        self.lanes[Lane::Slow.index()].observe(slow_len > 0, now);
        self.samples += 1;
    }

    pub fn overall(&self) -> &BackpressureAccount {
        &self.overall
    }

    pub fn lane(&self, lane: Lane) -> &BackpressureAccount {
        &self.lanes[lane.index()]
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn settled(&self, now: Instant) -> BackpressureSnapshot {
        BackpressureSnapshot {
            overall: self.overall.settled(now),
            fast: self.lane(Lane::Fast).settled(now),
            slow: self.lane(Lane::Slow).settled(now),
        }
    }
}
