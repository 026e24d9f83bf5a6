//! Step performance collection for the ParticipantController

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Number of recent execution times kept for percentile estimates
const EXEC_HISTORY_SIZE: usize = 1000;

/// Nanoseconds of `duration`, clamped to `u64::MAX`
pub(crate) fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Snapshot of the step timing statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Completed simulation steps
    pub total_steps: u64,

    /// Steps that exceeded the soft execution time limit
    pub soft_limit_violations: u64,

    /// Execution time of the simulation step in nanoseconds
    pub exec_min_ns: u64,
    pub exec_max_ns: u64,
    pub exec_avg_ns: u64,
    pub exec_p99_ns: u64,

    /// Time spent between two steps in nanoseconds
    pub wait_min_ns: u64,
    pub wait_max_ns: u64,
    pub wait_avg_ns: u64,
}

/// Running min / max / average over measured intervals
#[derive(Debug, Clone, Default)]
pub struct IntervalMonitor {
    started: Option<Instant>,
    samples: u64,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

impl IntervalMonitor {
    pub fn start_measurement(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Close the open interval, if any, and record its length
    pub fn stop_measurement(&mut self) -> Option<Duration> {
        let elapsed = self.started.take()?.elapsed();
        self.record(elapsed);
        Some(elapsed)
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.samples += 1;
        self.total += elapsed;
        self.min = Some(self.min.map_or(elapsed, |min| min.min(elapsed)));
        self.max = self.max.max(elapsed);
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    pub fn min(&self) -> Duration {
        self.min.unwrap_or_default()
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn average(&self) -> Duration {
        if self.samples == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.total.as_nanos() / self.samples as u128) as u64)
    }
}

/// Execution and wait time of the simulation step
#[derive(Debug, Clone)]
pub struct StepPerformance {
    exec: IntervalMonitor,
    wait: IntervalMonitor,
    exec_history: Vec<u64>,
    soft_limit: Option<Duration>,
    soft_limit_violations: u64,
}

impl StepPerformance {
    pub fn new(soft_limit: Option<Duration>) -> Self {
        Self {
            exec: IntervalMonitor::default(),
            wait: IntervalMonitor::default(),
            exec_history: Vec::with_capacity(EXEC_HISTORY_SIZE),
            soft_limit,
            soft_limit_violations: 0,
        }
    }

    /// Called when the participant starts waiting for its next step
    pub fn begin_wait(&mut self) {
        self.wait.start_measurement();
    }

    /// Called right before the simulation step runs
    pub fn begin_step(&mut self) {
        self.wait.stop_measurement();
        self.exec.start_measurement();
    }

    /// Called right after the simulation step returns. Returns the step's
    /// execution time and whether it exceeded the soft limit.
    pub fn end_step(&mut self) -> (Duration, bool) {
        let elapsed = self.exec.stop_measurement().unwrap_or_default();

        let index = (self.exec.sample_count() as usize).saturating_sub(1) % EXEC_HISTORY_SIZE;
        if self.exec_history.len() < EXEC_HISTORY_SIZE {
            self.exec_history.push(saturating_nanos(elapsed));
        } else {
            self.exec_history[index] = saturating_nanos(elapsed);
        }

        let exceeded = self.soft_limit.is_some_and(|limit| elapsed > limit);
        if exceeded {
            self.soft_limit_violations += 1;
        }

        self.wait.start_measurement();
        (elapsed, exceeded)
    }

    pub fn soft_limit(&self) -> Option<Duration> {
        self.soft_limit
    }

    pub fn total_steps(&self) -> u64 {
        self.exec.sample_count()
    }

    pub fn stats(&self) -> PerformanceStats {
        let mut history = self.exec_history.clone();
        history.sort_unstable();

        let exec_p99_ns = if !history.is_empty() {
            let index = (history.len() as f64 * 0.99) as usize;
            history[index.min(history.len() - 1)]
        } else {
            0
        };

        PerformanceStats {
            total_steps: self.exec.sample_count(),
            soft_limit_violations: self.soft_limit_violations,
            exec_min_ns: saturating_nanos(self.exec.min()),
            exec_max_ns: saturating_nanos(self.exec.max()),
            exec_avg_ns: saturating_nanos(self.exec.average()),
            exec_p99_ns,
            wait_min_ns: saturating_nanos(self.wait.min()),
            wait_max_ns: saturating_nanos(self.wait.max()),
            wait_avg_ns: saturating_nanos(self.wait.average()),
        }
    }
}
