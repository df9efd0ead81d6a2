//! Throughput meter over a short ring of one-second samples

use std::time::{Duration, Instant};

/// Number of one-second samples kept
pub const FPS_SAMPLES: usize = 10;

const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    samples: [u32; FPS_SAMPLES],
    filled: usize,
    next: usize,
    current: u32,
    period_start: Instant,
}

impl ThroughputMeter {
    pub fn new(now: Instant) -> Self {
        Self {
            samples: [0; FPS_SAMPLES],
            filled: 0,
            next: 0,
            current: 0,
            period_start: now,
        }
    }

    /// Count `frames` handed out
    pub fn record(&mut self, frames: usize, now: Instant) {
        self.roll(now);
        self.current = self.current.saturating_add(frames as u32);
    }

    /// Close every full period that ended before `now`
    pub fn roll(&mut self, now: Instant) {
        while now.saturating_duration_since(self.period_start) >= SAMPLE_PERIOD {
            self.samples[self.next] = self.current;
            self.next = (self.next + 1) % FPS_SAMPLES;
            self.filled = (self.filled + 1).min(FPS_SAMPLES);
            self.current = 0;
            self.period_start += SAMPLE_PERIOD;
        }
    }

    /// Average frames per second over the completed samples
    pub fn average_fps(&self) -> f64 {
        if self.filled == 0 {
            return 0.0;
        }
        // Unfilled slots are still zero.
        let total: u64 = self.samples.iter().map(|s| *s as u64).sum();
        total as f64 / self.filled as f64
    }
}
