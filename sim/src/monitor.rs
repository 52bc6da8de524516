//! Backpressure monitor
//!
//! Samples both lane lengths on a fixed period and feeds the shared
//! tracker. Sampling stops when the run finishes.

use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::context::RunContext;

pub struct BackpressureMonitor {
    ctx: Arc<RunContext>,
}

impl BackpressureMonitor {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    pub fn sample(&self, now: Instant) {
        let fast_len = self.ctx.fast.len();
        let slow_len = self.ctx.slow.len();
        self.ctx.backpressure.lock().observe(fast_len, slow_len, now);
    }

    /// Sample until the run finishes; returns the number of samples taken
    pub fn run(self) -> u64 {
        let interval = self.ctx.config.sampling_interval();
        self.sample(Instant::now());
        while !self.ctx.signal.wait(interval) {
            self.sample(Instant::now());
        }
        self.sample(Instant::now());

        let samples = self.ctx.backpressure.lock().samples();
        debug!(samples, "backpressure monitor stopped");
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaneConfig;
    use std::thread;
    use std::time::Duration;
    use task_format::{Lane, Task};

    #[test]
    fn test_sample_tracks_lane_state() {
        let ctx = RunContext::new(LaneConfig::default());
        let monitor = BackpressureMonitor::new(Arc::clone(&ctx));

        ctx.slow.enqueue(Task::new("a", 5000)).unwrap();
        monitor.sample(Instant::now());
        {
            let tracker = ctx.backpressure.lock();
            assert!(tracker.overall().in_backpressure());
            assert!(tracker.lane(Lane::Slow).in_backpressure());
            assert!(!tracker.lane(Lane::Fast).in_backpressure());
        }

        ctx.slow.try_dequeue();
        monitor.sample(Instant::now());
        assert!(!ctx.backpressure.lock().overall().in_backpressure());
    }

    #[test]
    fn test_monitor_stops_on_finish() {
        let ctx = RunContext::new(LaneConfig {
            sampling_interval_ms: 2,
            ..LaneConfig::default()
        });
        let handle = {
            let monitor = BackpressureMonitor::new(Arc::clone(&ctx));
            thread::spawn(move || monitor.run())
        };

        thread::sleep(Duration::from_millis(30));
        ctx.signal.finish();
        let samples = handle.join().unwrap();
        assert!(samples >= 3);
    }
}
