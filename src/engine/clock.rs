//! Step timing primitives for both clock sources.
//!
//! [`StepTimer`] drives free-running playback from an absolute deadline that
//! advances by exactly one interval per fired step, so scheduling jitter
//! never accumulates into drift. [`ClockStats`] derives tempo from an
//! externally supplied 24 PPQN pulse stream.

use crate::config::PULSES_PER_QUARTER;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Deadline accumulator for the internal clock.
#[derive(Debug, Default)]
pub struct StepTimer {
    deadline: Option<Instant>,
}

impl StepTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer so the first step fires immediately.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Number of steps due at `now`. Each fired step moves the deadline
    /// forward by one `interval`; `now` is never re-sampled into it.
    pub fn due_steps(&mut self, now: Instant, interval: Duration) -> u32 {
        let mut deadline = match self.deadline {
            Some(d) => d,
            None => return 0,
        };
        let mut fired = 0;
        while now >= deadline {
            fired += 1;
            deadline += interval;
        }
        self.deadline = Some(deadline);
        fired
    }
}

/// Rolling window of inter-pulse intervals, deriving tempo once a full
/// quarter note's worth of samples (24 at 24 PPQN) has arrived.
#[derive(Debug, Default)]
pub struct ClockStats {
    last_pulse: Option<Instant>,
    intervals: VecDeque<Duration>,
}

impl ClockStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a pulse arrival. Returns the derived BPM (rounded to 0.1)
    /// once the window is full.
    pub fn record(&mut self, at: Instant) -> Option<f64> {
        if let Some(last) = self.last_pulse {
            let interval = at.saturating_duration_since(last);
            self.intervals.push_back(interval);
            while self.intervals.len() > PULSES_PER_QUARTER {
                self.intervals.pop_front();
            }
        }
        self.last_pulse = Some(at);

        if self.intervals.len() < PULSES_PER_QUARTER {
            return None;
        }
        let total: Duration = self.intervals.iter().sum();
        let mean = total.as_secs_f64() / self.intervals.len() as f64;
        if mean <= 0.0 {
            return None;
        }
        let bpm = 60.0 / (mean * PULSES_PER_QUARTER as f64);
        Some((bpm * 10.0).round() / 10.0)
    }

    pub fn reset(&mut self) {
        self.last_pulse = None;
        self.intervals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_fires_immediately_when_armed() {
        let base = Instant::now();
        let mut timer = StepTimer::new();
        timer.arm(base);

        assert_eq!(timer.due_steps(base, Duration::from_millis(125)), 1);
        assert_eq!(timer.due_steps(base, Duration::from_millis(125)), 0);
    }

    #[test]
    fn test_timer_accumulates_without_drift() {
        let base = Instant::now();
        let interval = Duration::from_millis(125);
        let mut timer = StepTimer::new();
        timer.arm(base);

        // Poll far from the deadline boundaries; fired count tracks the
        // absolute schedule, not the poll times.
        assert_eq!(timer.due_steps(base + Duration::from_millis(130), interval), 2);
        assert_eq!(timer.due_steps(base + Duration::from_millis(130), interval), 0);
        assert_eq!(timer.due_steps(base + Duration::from_millis(260), interval), 1);
        assert_eq!(timer.due_steps(base + Duration::from_millis(500), interval), 2);
    }

    #[test]
    fn test_disarmed_timer_never_fires() {
        let base = Instant::now();
        let mut timer = StepTimer::new();
        assert_eq!(timer.due_steps(base, Duration::from_millis(10)), 0);

        timer.arm(base);
        timer.disarm();
        assert!(!timer.is_armed());
        assert_eq!(
            timer.due_steps(base + Duration::from_secs(1), Duration::from_millis(10)),
            0
        );
    }

    #[test]
    fn test_stats_need_full_window() {
        let base = Instant::now();
        let interval = Duration::from_secs_f64(60.0 / (120.0 * 24.0));
        let mut stats = ClockStats::new();

        // 24 pulses produce only 23 intervals: no reading yet.
        for i in 0..24 {
            assert_eq!(stats.record(base + interval * i), None);
        }
        let bpm = stats.record(base + interval * 24).unwrap();
        assert!((bpm - 120.0).abs() < 0.1, "derived {} bpm", bpm);
    }

    #[test]
    fn test_stats_track_tempo_change() {
        let base = Instant::now();
        let fast = Duration::from_secs_f64(60.0 / (150.0 * 24.0));
        let mut stats = ClockStats::new();

        let mut at = base;
        let mut last = None;
        // Two full windows at 150 BPM swamp any earlier samples.
        for _ in 0..49 {
            last = stats.record(at);
            at += fast;
        }
        let bpm = last.unwrap();
        assert!((bpm - 150.0).abs() < 0.1, "derived {} bpm", bpm);
    }

    #[test]
    fn test_stats_reset_clears_window() {
        let base = Instant::now();
        let interval = Duration::from_secs_f64(60.0 / (120.0 * 24.0));
        let mut stats = ClockStats::new();

        for i in 0..25 {
            stats.record(base + interval * i);
        }
        stats.reset();
        assert_eq!(stats.record(base + interval * 26), None);
    }
}
