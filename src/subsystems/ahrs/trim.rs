//! Accelerometer trim calibration
//!
//! Averages accelerometer samples over a window of level, armed,
//! throttled flight to compute a bias trim. Driven by the `trim_flight`
//! flag in `AttitudeSettings`: `Start` resets and begins accumulation,
//! `Load` computes the mean and hands it back for writing into
//! `SensorSettings`, anything else cancels.

use nalgebra::Vector3;

/// Accumulation stops silently at this many samples.
pub const TRIM_SAMPLE_CAP: u16 = 65535;
/// Local gravity, m/s^2.
pub const GRAVITY_MSS: f32 = 9.81;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Accumulating,
}

/// Trim accumulator state machine.
pub struct TrimManager {
    state: State,
    sum: Vector3<f32>,
    count: u16,
}

impl TrimManager {
    pub const fn new() -> Self {
        Self {
            state: State::Idle,
            sum: Vector3::new(0.0, 0.0, 0.0),
            count: 0,
        }
    }

    pub fn active(&self) -> bool {
        self.state == State::Accumulating
    }

    pub fn sample_count(&self) -> u16 {
        self.count
    }

    /// Reset and begin accumulating.
    pub fn start(&mut self) {
        self.sum = Vector3::zeros();
        self.count = 0;
        self.state = State::Accumulating;
    }

    /// Stop without computing anything.
    pub fn cancel(&mut self) {
        self.state = State::Idle;
    }

    /// Feed one corrected accel sample. Samples count only while armed
    /// with positive throttle; past the cap they are dropped without
    /// resetting the accumulated window.
    pub fn accumulate(&mut self, accel: Vector3<f32>, armed: bool, throttle: f32) {
        if self.state != State::Accumulating || !armed || throttle <= 0.0 {
            return;
        }
        if self.count >= TRIM_SAMPLE_CAP {
            return;
        }
        self.sum += accel;
        self.count += 1;
    }

    /// Consume the window: mean accel bias per axis, with gravity added
    /// back on Z so a level measurement yields zero residual. `None`
    /// when no samples were collected.
    pub fn load(&mut self) -> Option<Vector3<f32>> {
        self.state = State::Idle;
        if self.count == 0 {
            return None;
        }
        let mut mean = self.sum * (1.0 / f32::from(self.count));
        mean.z += GRAVITY_MSS;
        self.sum = Vector3::zeros();
        self.count = 0;
        Some(mean)
    }
}

impl Default for TrimManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_only_while_armed_and_throttled() {
        let mut trim = TrimManager::new();
        trim.start();
        trim.accumulate(Vector3::new(1.0, 0.0, 0.0), false, 0.5);
        trim.accumulate(Vector3::new(1.0, 0.0, 0.0), true, 0.0);
        assert_eq!(trim.sample_count(), 0);
        trim.accumulate(Vector3::new(1.0, 0.0, 0.0), true, 0.5);
        assert_eq!(trim.sample_count(), 1);
    }

    #[test]
    fn load_subtracts_gravity_on_z() {
        let mut trim = TrimManager::new();
        trim.start();
        // Perfectly level vehicle: accel reads -g on z.
        for _ in 0..100 {
            trim.accumulate(Vector3::new(0.02, -0.01, -GRAVITY_MSS), true, 0.4);
        }
        let bias = trim.load().unwrap();
        assert!((bias.x - 0.02).abs() < 1e-5);
        assert!((bias.y + 0.01).abs() < 1e-5);
        assert!(bias.z.abs() < 1e-4, "level flight must yield zero z bias");
        assert!(!trim.active());
    }

    #[test]
    fn cap_freezes_accumulation() {
        let mut trim = TrimManager::new();
        trim.start();
        for _ in 0..(TRIM_SAMPLE_CAP as u32 + 500) {
            trim.accumulate(Vector3::new(0.0, 0.0, -GRAVITY_MSS), true, 0.5);
        }
        assert_eq!(trim.sample_count(), TRIM_SAMPLE_CAP);
        // Frozen, not reset: loading still yields the capped window.
        assert!(trim.load().is_some());
    }

    #[test]
    fn load_without_samples_is_none() {
        let mut trim = TrimManager::new();
        trim.start();
        assert!(trim.load().is_none());
    }

    #[test]
    fn start_resets_a_previous_window() {
        let mut trim = TrimManager::new();
        trim.start();
        trim.accumulate(Vector3::new(5.0, 5.0, 5.0), true, 0.5);
        trim.start();
        assert_eq!(trim.sample_count(), 0);
    }
}
