use std::time::Duration;

use crate::config::Stage;

/// Wall-clock concurrency schedule for one scenario.
///
/// The target ramps linearly from the previous stage's target (0 before the
/// first stage) to the stage's own target over the stage duration. Virtual
/// users poll this to decide whether they should be running sessions.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

struct StageWindow {
    start: Duration,
    end: Duration,
    start_target: u64,
    end_target: u64,
}

impl RampSchedule {
    pub fn new(stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            stages,
            cumulative_ends,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    fn window_at(&self, elapsed: Duration) -> Option<StageWindow> {
        if self.stages.is_empty() {
            return None;
        }

        let idx = match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) => i,
            Err(i) => i,
        };
        if idx >= self.stages.len() {
            return None;
        }

        let start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        let start_target = if idx == 0 { 0 } else { self.stages[idx - 1].target };

        Some(StageWindow {
            start,
            end: self.cumulative_ends[idx],
            start_target,
            end_target: self.stages[idx].target,
        })
    }

    /// Desired concurrent-session count at `elapsed` into the run.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if elapsed >= self.total_duration() {
            return 0;
        }
        let Some(win) = self.window_at(elapsed) else {
            return 0;
        };

        let stage_duration = win.end.saturating_sub(win.start);
        if stage_duration.is_zero() {
            return win.end_target;
        }

        // Linear interpolation across the stage.
        let start_i = win.start_target as i128;
        let delta = win.end_target as i128 - start_i;
        let num = elapsed.saturating_sub(win.start).as_nanos() as i128;
        let den = stage_duration.as_nanos() as i128;

        let cur = start_i + (delta.saturating_mul(num) / den.max(1));
        cur.clamp(0, u64::MAX as i128) as u64
    }

    /// How long VU `vu_index` (1-based) should wait before re-checking whether
    /// it is within the active target.
    pub fn next_recheck_in(&self, elapsed: Duration, vu_index: u64) -> Duration {
        let default_sleep = Duration::from_millis(50);

        if elapsed >= self.total_duration() {
            return Duration::ZERO;
        }
        let Some(win) = self.window_at(elapsed) else {
            return default_sleep;
        };

        if vu_index <= self.target_at(elapsed) {
            // Already active; re-check soon to notice ramp-down.
            return Duration::from_millis(1);
        }

        // A flat or descending stage can never activate this VU.
        if win.end_target <= win.start_target {
            return win.end.saturating_sub(elapsed).min(default_sleep);
        }

        let start_i = win.start_target as i128;
        let delta = win.end_target as i128 - start_i;
        let want = vu_index as i128;
        if want > win.end_target as i128 {
            return win.end.saturating_sub(elapsed).min(default_sleep);
        }

        // Solve for the stage offset where the ramp first reaches vu_index.
        let stage_ns = win.end.saturating_sub(win.start).as_nanos() as i128;
        let elapsed_ns = elapsed.saturating_sub(win.start).as_nanos() as i128;
        let needed_ns = ((want - start_i).saturating_mul(stage_ns) / delta.max(1)).max(0);
        let wait_ns = needed_ns.saturating_sub(elapsed_ns).max(0);
        let wait = Duration::from_nanos(wait_ns.min(u64::MAX as i128) as u64);

        wait.min(default_sleep)
    }
}
