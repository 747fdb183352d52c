//! Smoothed throughput and ETA from cumulative size samples.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::session::ProgressSample;

pub const RATE_WINDOW_CAPACITY: usize = 5;

/// Bounded FIFO of recent instantaneous rates.
#[derive(Debug, Clone)]
pub struct RateWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RateWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, rate: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(rate);
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.samples.iter()
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new(RATE_WINDOW_CAPACITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateUpdate {
    pub rate_bytes_per_sec: f64,
    /// Seconds until the estimated total is reached. Zero when the rate is
    /// unknown; may go negative once the estimate is exceeded.
    pub eta_secs: f64,
}

#[derive(Debug, Clone)]
pub struct RateEstimator {
    window: RateWindow,
    last_accepted: (Instant, u64),
    current_rate: f64,
    total_estimated_bytes: u64,
    min_interval: Duration,
}

impl RateEstimator {
    /// `origin` is the session start; it acts as an accepted zero-byte sample.
    pub fn new(origin: Instant, total_estimated_bytes: u64, min_interval: Duration) -> Self {
        Self {
            window: RateWindow::default(),
            last_accepted: (origin, 0),
            current_rate: 0.0,
            total_estimated_bytes,
            min_interval,
        }
    }

    pub fn with_window(mut self, window: RateWindow) -> Self {
        self.window = window;
        self
    }

    pub fn update(&mut self, sample: &ProgressSample) -> RateUpdate {
        let (last_time, last_bytes) = self.last_accepted;
        let elapsed = sample.timestamp.saturating_duration_since(last_time);

        if elapsed >= self.min_interval
            && !elapsed.is_zero()
            && sample.cumulative_bytes >= last_bytes
        {
            let delta = (sample.cumulative_bytes - last_bytes) as f64;
            self.window.push(delta / elapsed.as_secs_f64());
            self.current_rate = self.window.mean();
            self.last_accepted = (sample.timestamp, sample.cumulative_bytes);
        }

        RateUpdate {
            rate_bytes_per_sec: self.current_rate,
            eta_secs: self.eta_for(sample.cumulative_bytes),
        }
    }

    fn eta_for(&self, current_bytes: u64) -> f64 {
        if self.current_rate > 0.0 {
            (self.total_estimated_bytes as f64 - current_bytes as f64) / self.current_rate
        } else {
            0.0
        }
    }

    pub fn current_rate(&self) -> f64 {
        self.current_rate
    }

    pub fn window(&self) -> &RateWindow {
        &self.window
    }
}
