//! Smoothed delta-time tracking for periodic loops
//!
//! The attitude loop nominally runs at a fixed rate, but the true period
//! jitters with sensor timing and scheduler load. Integrating the quaternion
//! with the raw instantaneous period injects that jitter straight into the
//! estimate, so the loop consumes an exponentially smoothed average instead,
//! clamped to a sane range so a stalled cycle cannot produce a wild step.

use embassy_time::Instant;

/// Smoothed elapsed-time tracker.
///
/// Configured with an expected period and a smoothing factor; each call to
/// [`update`](DeltaTime::update) folds the measured period into a running
/// average `avg += (raw - avg) * alpha` and returns the average in seconds.
#[derive(Debug, Clone, Copy)]
pub struct DeltaTime {
    average_s: f32,
    min_s: f32,
    max_s: f32,
    alpha: f32,
    last: Option<Instant>,
}

impl DeltaTime {
    /// Expected attitude loop period (500 Hz nominal).
    pub const UPDATE_EXPECTED_S: f32 = 1.0 / 500.0;
    /// Shortest credible period.
    pub const UPDATE_MIN_S: f32 = 1.0e-6;
    /// Longest credible period.
    pub const UPDATE_MAX_S: f32 = 1.0;
    /// Smoothing factor for the running average.
    pub const UPDATE_ALPHA: f32 = 1.0e-2;

    /// Create a tracker with explicit bounds.
    pub const fn new(expected_s: f32, min_s: f32, max_s: f32, alpha: f32) -> Self {
        Self {
            average_s: expected_s,
            min_s,
            max_s,
            alpha,
            last: None,
        }
    }

    /// Create a tracker tuned for the attitude loop.
    pub const fn for_attitude_loop() -> Self {
        Self::new(
            Self::UPDATE_EXPECTED_S,
            Self::UPDATE_MIN_S,
            Self::UPDATE_MAX_S,
            Self::UPDATE_ALPHA,
        )
    }

    /// Record an iteration at `now` and return the smoothed period in seconds.
    ///
    /// The first call has no reference point and returns the expected period.
    pub fn update(&mut self, now: Instant) -> f32 {
        if let Some(last) = self.last {
            let raw_s = (now.duration_since(last).as_micros() as f32) * 1.0e-6;
            let raw_s = raw_s.clamp(self.min_s, self.max_s);
            self.average_s += (raw_s - self.average_s) * self.alpha;
        }
        self.last = Some(now);
        self.average_s
    }

    /// Current smoothed period without recording a new iteration.
    pub fn average_seconds(&self) -> f32 {
        self.average_s
    }
}
