//! Synthetic workloads
//!
//! Record generators for runs without an input file. All generators are
//! seeded so a sweep compares configurations on identical input.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use task_format::Record;

pub trait WorkloadGenerator {
    fn next_record(&mut self) -> Option<Record>;
}

/// Named synthetic workloads for the binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WorkloadKind {
    Uniform,
    HeavyTail,
    Shifting,
}

impl WorkloadKind {
    pub fn records(self, count: usize, seed: u64) -> Box<dyn Iterator<Item = Record>> {
        match self {
            WorkloadKind::Uniform => Box::new(records(UniformWorkload::new(count, 4, (1, 2_000), seed))),
            WorkloadKind::HeavyTail => Box::new(records(HeavyTailWorkload::new(count, seed))),
            WorkloadKind::Shifting => Box::new(records(ShiftingWorkload::new(
                count,
                (1, 200),
                (2_000, 8_000),
                seed,
            ))),
        }
    }
}

/// Drain a generator as an iterator
pub fn records<G: WorkloadGenerator + 'static>(mut generator: G) -> impl Iterator<Item = Record> {
    std::iter::from_fn(move || generator.next_record())
}

/// Costs drawn uniformly from a fixed range
pub struct UniformWorkload {
    remaining: usize,
    emitted: usize,
    tasks_per_record: usize,
    cost_range: (u64, u64),
    rng: StdRng,
}

impl UniformWorkload {
    pub fn new(records: usize, tasks_per_record: usize, cost_range: (u64, u64), seed: u64) -> Self {
        Self {
            remaining: records,
            emitted: 0,
            tasks_per_record: tasks_per_record.max(1),
            cost_range,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl WorkloadGenerator for UniformWorkload {
    fn next_record(&mut self) -> Option<Record> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let (lo, hi) = self.cost_range;
        let costs = (0..self.tasks_per_record)
            .map(|_| self.rng.gen_range(lo..=hi.max(lo)))
            .collect();
        let record = Record::new(format!("u{}", self.emitted), costs);
        self.emitted += 1;
        Some(record)
    }
}

/// Mostly cheap tasks with an occasional very expensive one: the mix that
/// causes head-of-line blocking in a single shared queue
pub struct HeavyTailWorkload {
    remaining: usize,
    emitted: usize,
    max_tasks_per_record: usize,
    light: (u64, u64),
    heavy: (u64, u64),
    heavy_probability: f64,
    rng: StdRng,
}

impl HeavyTailWorkload {
    pub fn new(records: usize, seed: u64) -> Self {
        Self {
            remaining: records,
            emitted: 0,
            max_tasks_per_record: 8,
            light: (1, 200),
            heavy: (2_000, 10_000),
            heavy_probability: 0.05,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_heavy_probability(mut self, p: f64) -> Self {
        self.heavy_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn with_costs(mut self, light: (u64, u64), heavy: (u64, u64)) -> Self {
        self.light = light;
        self.heavy = heavy;
        self
    }
}

impl WorkloadGenerator for HeavyTailWorkload {
    fn next_record(&mut self) -> Option<Record> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let n = self.rng.gen_range(1..=self.max_tasks_per_record);
        let costs = (0..n)
            .map(|_| {
                let (lo, hi) = if self.rng.gen_bool(self.heavy_probability) {
                    self.heavy
                } else {
                    self.light
                };
                self.rng.gen_range(lo..=hi.max(lo))
            })
            .collect();
        let record = Record::new(format!("e{}", self.emitted), costs);
        self.emitted += 1;
        Some(record)
    }
}

/// Alternates between light and heavy phases of random length
pub struct ShiftingWorkload {
    remaining: usize,
    emitted: usize,
    phase_left: usize,
    heavy_phase: bool,
    light: (u64, u64),
    heavy: (u64, u64),
    rng: StdRng,
}

impl ShiftingWorkload {
    pub fn new(records: usize, light: (u64, u64), heavy: (u64, u64), seed: u64) -> Self {
        Self {
            remaining: records,
            emitted: 0,
            phase_left: 0,
            heavy_phase: true,
            light,
            heavy,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl WorkloadGenerator for ShiftingWorkload {
    fn next_record(&mut self) -> Option<Record> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        if self.phase_left == 0 {
            self.heavy_phase = !self.heavy_phase;
            self.phase_left = self.rng.gen_range(10..=100);
        }
        self.phase_left -= 1;

        let (lo, hi) = if self.heavy_phase { self.heavy } else { self.light };
        let n = self.rng.gen_range(1..=4);
        let costs = (0..n).map(|_| self.rng.gen_range(lo..=hi.max(lo))).collect();
        let record = Record::new(format!("s{}", self.emitted), costs);
        self.emitted += 1;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_respects_range() {
        let all: Vec<Record> = records(UniformWorkload::new(20, 3, (5, 9), 1)).collect();
        assert_eq!(all.len(), 20);
        assert!(all.iter().all(|r| r.costs.len() == 3));
        assert!(all.iter().flat_map(|r| &r.costs).all(|&c| (5..=9).contains(&c)));
        assert_eq!(all[7].group_key, "u7");
    }

    #[test]
    fn test_heavy_tail_is_reproducible() {
        let a: Vec<Record> = records(HeavyTailWorkload::new(50, 7)).collect();
        let b: Vec<Record> = records(HeavyTailWorkload::new(50, 7)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_heavy_tail_mix() {
        let costs: Vec<u64> = records(HeavyTailWorkload::new(2000, 3).with_heavy_probability(0.2))
            .flat_map(|r| r.costs)
            .collect();
        let heavy = costs.iter().filter(|&&c| c >= 2_000).count();
        assert!(heavy > 0);
        assert!(heavy < costs.len() / 2);
        assert!(costs.iter().all(|&c| (1..=10_000).contains(&c)));
    }

    #[test]
    fn test_workload_kind_record_count() {
        for kind in [WorkloadKind::Uniform, WorkloadKind::HeavyTail, WorkloadKind::Shifting] {
            assert_eq!(kind.records(25, 1).count(), 25);
        }
    }

    #[test]
    fn test_shifting_phases() {
        let all: Vec<Record> = records(ShiftingWorkload::new(500, (1, 10), (1000, 2000), 9)).collect();
        assert_eq!(all.len(), 500);
        let heavy_records = all.iter().filter(|r| r.costs[0] >= 1000).count();
        assert!(heavy_records > 0 && heavy_records < 500);
    }
}
