use std::{collections::VecDeque, time::Duration};

use comms::rpc::DashboardMetrics;

pub const DEFAULT_FPS_WINDOW: usize = 60;
pub const DEFAULT_STATUS_EVERY: u64 = 30;

/// Rendering performance as seen from the consumer.
///
/// FPS is the inverse of the mean interval between consecutive image batches over
/// a rolling window, latency the age of the last metrics sample on arrival.
#[derive(Debug, Clone)]
pub struct Performance {
    intervals: VecDeque<f64>,
    window: usize,
    status_every: u64,
    frames: u64,
    latency_ms: f64,
}

impl Default for Performance {
    fn default() -> Self {
        Self::new(DEFAULT_FPS_WINDOW, DEFAULT_STATUS_EVERY)
    }
}

impl Performance {
    /// Creates a new `Performance` tracker.
    ///
    /// # Arguments
    /// * `window` - How many intervals the FPS average spans.
    /// * `status_every` - A status report is due every this many frames.
    pub fn new(window: usize, status_every: u64) -> Self {
        let window = window.max(1);

        Self {
            intervals: VecDeque::with_capacity(window),
            window,
            status_every: status_every.max(1),
            frames: 0,
            latency_ms: 0.0,
        }
    }

    /// Records the time elapsed between two image batches.
    ///
    /// # Returns
    /// Whether a status report to the producer is due.
    pub fn record_interval(&mut self, interval: Duration) -> bool {
        if self.intervals.len() == self.window {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval.as_secs_f64());
        self.frames += 1;

        self.frames % self.status_every == 0
    }

    pub fn record_latency(&mut self, latency_ms: f64) {
        self.latency_ms = latency_ms;
    }

    pub fn fps(&self) -> f64 {
        if self.intervals.is_empty() {
            return 0.0;
        }

        let mean = self.intervals.iter().sum::<f64>() / self.intervals.len() as f64;
        if mean > 0.0 { 1.0 / mean } else { 0.0 }
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn snapshot(&self) -> DashboardMetrics {
        DashboardMetrics {
            fps: self.fps(),
            latency_ms: self.latency_ms,
            frames_rendered: self.frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_one_second_intervals() {
        let mut perf = Performance::default();

        for _ in 0..60 {
            perf.record_interval(Duration::from_secs(1));
        }

        assert!((perf.fps() - 1.0).abs() < 1e-9);
        assert_eq!(perf.frames(), 60);
    }

    #[test]
    fn test_no_samples_means_zero_fps() {
        assert_eq!(Performance::default().fps(), 0.0);
    }

    #[test]
    fn test_zero_mean_interval_means_zero_fps() {
        let mut perf = Performance::default();
        perf.record_interval(Duration::ZERO);
        perf.record_interval(Duration::ZERO);

        assert_eq!(perf.fps(), 0.0);
    }

    #[test]
    fn test_window_forgets_old_intervals() {
        let mut perf = Performance::default();

        for _ in 0..60 {
            perf.record_interval(Duration::from_secs(2));
        }
        for _ in 0..60 {
            perf.record_interval(Duration::from_millis(500));
        }

        assert!((perf.fps() - 2.0).abs() < 1e-9);
        assert_eq!(perf.frames(), 120);
    }

    #[test]
    fn test_status_is_due_every_thirty_frames() {
        let mut perf = Performance::default();

        let due: Vec<u64> = (1..=90)
            .filter(|_| perf.record_interval(Duration::from_millis(16)))
            .collect();

        assert_eq!(due, [30, 60, 90]);
    }

    #[test]
    fn test_snapshot_carries_latency() {
        let mut perf = Performance::default();
        perf.record_latency(12.5);
        perf.record_interval(Duration::from_millis(250));

        let snapshot = perf.snapshot();
        assert_eq!(snapshot.latency_ms, 12.5);
        assert_eq!(snapshot.frames_rendered, 1);
        assert!((snapshot.fps - 4.0).abs() < 1e-9);
    }
}
