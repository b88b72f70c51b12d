//! Complementary-filter attitude estimator
//!
//! Blends high-frequency gyro integration with low-frequency
//! accelerometer tilt correction. Each cycle:
//!
//! 1. Low-pass filter the accel vector and the body-frame gravity
//!    estimate derived from the current quaternion (skipped when the
//!    configured time constant is below [`TAU_MIN`]).
//! 2. Error vector = cross(accel, gravity estimate), normalised by the
//!    product of their magnitudes. Magnitudes under [`MAG_FLOOR`] skip
//!    the whole update (free fall, dead sensor).
//! 3. Integral correction on roll and pitch only, folded into the
//!    persistent gyro-bias integral the sensor adapter applies next
//!    cycle. Yaw is unobservable from gravity and gets no integral.
//! 4. Proportional correction of the instantaneous rates, `Kp / dT`.
//! 5. Quaternion kinematic integration of the corrected rates (deg/s
//!    converted to rad/s), then scalar-sign canonicalisation.
//! 6. Renormalisation, with a hard reset to identity on NaN or a
//!    collapsed norm. Corrupt orientation never propagates.
//! 7. Euler angles derived in the roll-pitch-yaw convention.
//!
//! The filter is a plain context struct: no statics, no blocking,
//! deterministic given inputs and state. Gain changes arrive through a
//! pending slot and take effect at the top of the next update.

use nalgebra::{Quaternion, Vector3};

use crate::objects::{AttitudeSettings, AttitudeState};

/// Reference interval for the accel low-pass coefficient.
pub const DT_REF_S: f32 = 0.0025;
/// Below this magnitude a vector is considered degenerate.
pub const MAG_FLOOR: f32 = 1e-3;
/// Accel filter time constants below this disable the filter.
const TAU_MIN: f32 = 1e-4;

const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Active tuning profile of the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterGains {
    pub accel_kp: f32,
    pub accel_ki: f32,
    pub accel_tau: f32,
    /// Leak rate of the yaw bias integrator.
    pub yaw_bias_rate: f32,
    /// Leak rate of the roll/pitch bias integrators. Nonzero only in the
    /// aggressive convergence profile.
    pub roll_pitch_bias_rate: f32,
}

impl FilterGains {
    /// Nominal profile from the configured settings.
    pub fn nominal(settings: &AttitudeSettings) -> Self {
        Self {
            accel_kp: settings.accel_kp,
            accel_ki: settings.accel_ki,
            accel_tau: settings.accel_tau,
            yaw_bias_rate: settings.yaw_bias_rate,
            roll_pitch_bias_rate: 0.0,
        }
    }

    /// Aggressive convergence profile used during the startup window and
    /// zeroed arming: snaps the estimate to level and learns bias fast.
    pub fn aggressive() -> Self {
        Self {
            accel_kp: 1.0,
            accel_ki: 0.0,
            accel_tau: 0.0,
            yaw_bias_rate: 0.01,
            roll_pitch_bias_rate: 0.01,
        }
    }
}

/// Complementary-filter state.
pub struct ComplementaryFilter {
    q: Quaternion<f32>,
    accel_filtered: Vector3<f32>,
    grot_filtered: Vector3<f32>,
    gains: FilterGains,
    pending: Option<FilterGains>,
}

impl ComplementaryFilter {
    pub fn new(gains: FilterGains) -> Self {
        Self {
            q: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            accel_filtered: Vector3::zeros(),
            grot_filtered: Vector3::new(0.0, 0.0, -1.0),
            gains,
            pending: None,
        }
    }

    /// Stage a gain change, applied atomically at the next update.
    pub fn queue_gains(&mut self, gains: FilterGains) {
        self.pending = Some(gains);
    }

    pub fn gains(&self) -> &FilterGains {
        &self.gains
    }

    pub fn quaternion(&self) -> Quaternion<f32> {
        self.q
    }

    /// Run one estimation cycle. `gyro_dps` in deg/s, `accel` in any
    /// consistent unit. Roll/pitch integral corrections accumulate into
    /// `bias_integral` for the sensor adapter to apply next cycle.
    pub fn update(
        &mut self,
        dt_s: f32,
        gyro_dps: Vector3<f32>,
        accel: Vector3<f32>,
        bias_integral: &mut Vector3<f32>,
    ) -> AttitudeState {
        if let Some(gains) = self.pending.take() {
            self.gains = gains;
        }

        let q = self.q;
        // Gravity in body frame for the current orientation.
        let grot = Vector3::new(
            -(2.0 * (q.i * q.k - q.w * q.j)),
            -(2.0 * (q.j * q.k + q.w * q.i)),
            -(q.w * q.w - q.i * q.i - q.j * q.j + q.k * q.k),
        );

        if self.gains.accel_tau >= TAU_MIN {
            let alpha = libm::expf(-DT_REF_S / self.gains.accel_tau);
            self.accel_filtered = self.accel_filtered * alpha + accel * (1.0 - alpha);
            self.grot_filtered = self.grot_filtered * alpha + grot * (1.0 - alpha);
        } else {
            self.accel_filtered = accel;
            self.grot_filtered = grot;
        }

        let accel_mag = self.accel_filtered.norm();
        let grot_mag = self.grot_filtered.norm();
        if accel_mag < MAG_FLOOR || grot_mag < MAG_FLOOR {
            return self.state();
        }

        let error = self.accel_filtered.cross(&self.grot_filtered) / (accel_mag * grot_mag);

        // Integral on roll/pitch only; yaw drift is handled by the bias
        // leak in the sensor adapter.
        bias_integral.x += error.x * self.gains.accel_ki;
        bias_integral.y += error.y * self.gains.accel_ki;

        let gyro = gyro_dps + error * (self.gains.accel_kp / dt_s);
        let w = gyro * DEG_TO_RAD;

        let half_dt = 0.5 * dt_s;
        let qdot = Quaternion::new(
            -(q.i * w.x + q.j * w.y + q.k * w.z),
            q.w * w.x - q.k * w.y + q.j * w.z,
            q.k * w.x + q.w * w.y - q.i * w.z,
            -(q.j * w.x) + q.i * w.y + q.w * w.z,
        ) * half_dt;

        let mut next = q + qdot;
        if next.w < 0.0 {
            next = -next;
        }

        let norm = next.norm();
        if !norm.is_finite() || norm < MAG_FLOOR {
            next = Quaternion::new(1.0, 0.0, 0.0, 0.0);
        } else {
            next = next * (1.0 / norm);
        }
        self.q = next;

        self.state()
    }

    fn state(&self) -> AttitudeState {
        let q = self.q;
        let roll = libm::atan2f(
            2.0 * (q.w * q.i + q.j * q.k),
            1.0 - 2.0 * (q.i * q.i + q.j * q.j),
        );
        let sinp = 2.0 * (q.w * q.j - q.k * q.i);
        let pitch = libm::asinf(sinp.clamp(-1.0, 1.0));
        let yaw = libm::atan2f(
            2.0 * (q.w * q.k + q.i * q.j),
            1.0 - 2.0 * (q.j * q.j + q.k * q.k),
        );
        AttitudeState {
            q: [q.w, q.i, q.j, q.k],
            roll_deg: roll * RAD_TO_DEG,
            pitch_deg: pitch * RAD_TO_DEG,
            yaw_deg: yaw * RAD_TO_DEG,
        }
    }
}
