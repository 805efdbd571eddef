use std::time::{Duration, Instant};

/// Default sliding window for speed calculation.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default cap on retained samples.
const DEFAULT_MAX_SAMPLES: usize = 100;

#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    bytes: i64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
///
/// Samples carry an explicit timestamp so the engine can feed it the
/// same clock it ticks with.
#[derive(Debug, Clone)]
pub struct SpeedCalculator {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: Vec::new(),
            max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES),
            window_size: window_size
                .filter(|w| !w.is_zero())
                .unwrap_or(DEFAULT_WINDOW),
        }
    }

    /// Records `bytes` transferred at `at`.
    pub fn add_sample(&mut self, bytes: i64, at: Instant) {
        self.samples.push(SpeedSample {
            bytes,
            timestamp: at,
        });

        // Prune samples outside the window.
        if let Some(cutoff) = at.checked_sub(self.window_size) {
            self.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if self.samples.len() > self.max_samples {
            let excess = self.samples.len() - self.max_samples;
            self.samples.drain(..excess);
        }
    }

    /// Average speed in bytes/second between the oldest and newest sample.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: i64 = self.samples.iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Throughput over the full window ending at `now`, idle time included.
    pub fn rate_over_window(&self, now: Instant) -> f64 {
        let cutoff = now.checked_sub(self.window_size);
        let total_bytes: i64 = self
            .samples
            .iter()
            .filter(|sample| cutoff.is_none_or(|c| sample.timestamp >= c))
            .map(|sample| sample.bytes)
            .sum();
        total_bytes as f64 / self.window_size.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: i64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes.max(0) as f64 / speed))
    }

    /// Window length used for pruning and [`rate_over_window`](Self::rate_over_window).
    pub fn window_size(&self) -> Duration {
        self.window_size
    }

    /// Clears all recorded samples.
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
