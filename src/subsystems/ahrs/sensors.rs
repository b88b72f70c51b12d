//! IMU acquisition and sample correction
//!
//! Two acquisition strategies sit behind the [`ImuSource`] trait, chosen
//! once at startup from the board capability:
//! - [`CombinedImu`]: a 6-axis sensor delivering complete samples; waits
//!   at most [`COMBINED_TIMEOUT_MS`] for the next one.
//! - [`SplitImu`]: an analog gyro queue paired with a burst accelerometer
//!   FIFO; waits up to [`SPLIT_TIMEOUT_MS`] (twice the nominal loop
//!   period) for a gyro sample, then drains and averages up to
//!   [`FIFO_BURST_MAX`] accel samples.
//!
//! [`SensorAdapter::correct`] turns a raw sample into engineering units:
//! scale, temperature compensation (quadratic for gyro, linear for accel,
//! temperature clamped to the calibrated extent), board rotation, accel
//! bias, then the persistent gyro-bias integral. After applying the bias
//! it leaks each integrator by `-rate * gyro`, driving the long-run
//! average rate toward zero.

use embassy_sync::channel::DynamicReceiver;
use embassy_time::{with_timeout, Duration};
use nalgebra::{Matrix3, Vector3};

use crate::objects::SensorSettings;

/// Wait budget for a combined 6-axis sample.
pub const COMBINED_TIMEOUT_MS: u64 = 4;
/// Wait budget for an analog gyro sample, twice the nominal loop period.
pub const SPLIT_TIMEOUT_MS: u64 = 50;
/// Accel FIFO samples averaged per burst.
pub const FIFO_BURST_MAX: usize = 32;
/// ADC neutral level of the analog gyro channels.
pub const GYRO_NEUTRAL: f32 = 1665.0;

/// One raw IMU sample, sensor units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub gyro: Vector3<f32>,
    pub accel: Vector3<f32>,
    pub temperature: f32,
}

/// Raw analog gyro reading, ADC counts plus the temperature channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogGyroSample {
    pub raw: [f32; 3],
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// No sample arrived before the timeout.
    NoData,
}

/// IMU acquisition strategy.
pub trait ImuSource {
    async fn read(&mut self) -> Result<RawSample, SensorError>;
}

/// Combined 6-axis sensor fed by a driver task.
pub struct CombinedImu {
    samples: DynamicReceiver<'static, RawSample>,
}

impl CombinedImu {
    pub fn new(samples: DynamicReceiver<'static, RawSample>) -> Self {
        Self { samples }
    }
}

impl ImuSource for CombinedImu {
    async fn read(&mut self) -> Result<RawSample, SensorError> {
        with_timeout(
            Duration::from_millis(COMBINED_TIMEOUT_MS),
            self.samples.receive(),
        )
        .await
        .map_err(|_| SensorError::NoData)
    }
}

/// Split analog-gyro / FIFO-accelerometer pair.
pub struct SplitImu {
    gyro: DynamicReceiver<'static, AnalogGyroSample>,
    accel_fifo: DynamicReceiver<'static, Vector3<f32>>,
}

impl SplitImu {
    pub fn new(
        gyro: DynamicReceiver<'static, AnalogGyroSample>,
        accel_fifo: DynamicReceiver<'static, Vector3<f32>>,
    ) -> Self {
        Self { gyro, accel_fifo }
    }
}

impl ImuSource for SplitImu {
    async fn read(&mut self) -> Result<RawSample, SensorError> {
        let gyro = with_timeout(Duration::from_millis(SPLIT_TIMEOUT_MS), self.gyro.receive())
            .await
            .map_err(|_| SensorError::NoData)?;

        // Drain the accel FIFO, averaging whatever burst arrived since the
        // last cycle.
        let mut sum = Vector3::zeros();
        let mut count = 0usize;
        while count < FIFO_BURST_MAX {
            match self.accel_fifo.try_receive() {
                Ok(sample) => {
                    sum += sample;
                    count += 1;
                }
                Err(_) => break,
            }
        }
        if count == 0 {
            return Err(SensorError::NoData);
        }

        Ok(RawSample {
            gyro: Vector3::new(
                gyro.raw[0] - GYRO_NEUTRAL,
                gyro.raw[1] - GYRO_NEUTRAL,
                gyro.raw[2] - GYRO_NEUTRAL,
            ),
            accel: sum * (1.0 / count as f32),
            temperature: gyro.temperature,
        })
    }
}

/// Per-axis calibration loaded from [`SensorSettings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorCalibration {
    pub gyro_scale: Vector3<f32>,
    pub accel_scale: Vector3<f32>,
    pub gyro_bias: Vector3<f32>,
    pub accel_bias: Vector3<f32>,
    pub gyro_temp_coeff: [f32; 6],
    pub accel_temp_coeff: [f32; 3],
    pub temp_min: f32,
    pub temp_max: f32,
}

impl SensorCalibration {
    pub fn from_settings(settings: &SensorSettings) -> Self {
        Self {
            gyro_scale: Vector3::from(settings.gyro_scale),
            accel_scale: Vector3::from(settings.accel_scale),
            gyro_bias: Vector3::from(settings.gyro_bias),
            accel_bias: Vector3::from(settings.accel_bias),
            gyro_temp_coeff: settings.gyro_temp_coeff,
            accel_temp_coeff: settings.accel_temp_coeff,
            temp_min: settings.temp_calibrated_min,
            temp_max: settings.temp_calibrated_max,
        }
    }
}

/// Board mounting rotation, precomputed from configured RPY offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardRotation(Option<Matrix3<f32>>);

impl BoardRotation {
    /// Build from roll/pitch/yaw offsets in degrees. Near-zero offsets
    /// skip the rotation entirely.
    pub fn from_rpy_deg(offsets: [f32; 3]) -> Self {
        let nonzero = offsets.iter().any(|o| libm::fabsf(*o) > 1e-3);
        if !nonzero {
            return Self(None);
        }
        let (sr, cr) = sincos(offsets[0].to_radians());
        let (sp, cp) = sincos(offsets[1].to_radians());
        let (sy, cy) = sincos(offsets[2].to_radians());
        // Z-Y-X rotation, world from body.
        let m = Matrix3::new(
            cp * cy,
            cp * sy,
            -sp,
            sr * sp * cy - cr * sy,
            sr * sp * sy + cr * cy,
            sr * cp,
            cr * sp * cy + sr * sy,
            cr * sp * sy - sr * cy,
            cr * cp,
        );
        Self(Some(m))
    }

    pub fn rotate(&self, v: Vector3<f32>) -> Vector3<f32> {
        match &self.0 {
            Some(m) => m * v,
            None => v,
        }
    }
}

fn sincos(angle: f32) -> (f32, f32) {
    (libm::sinf(angle), libm::cosf(angle))
}

/// Bias integrator leak rates taken from the active filter gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasRates {
    pub roll_pitch: f32,
    pub yaw: f32,
}

/// Sample correction pipeline plus the persistent gyro-bias integral.
pub struct SensorAdapter {
    pub calibration: SensorCalibration,
    pub rotation: BoardRotation,
    /// Slow-moving gyro bias estimate, also fed by the estimator's
    /// integral term.
    pub bias_integral: Vector3<f32>,
    pub bias_correct_gyro: bool,
}

impl SensorAdapter {
    pub fn new(calibration: SensorCalibration, rotation: BoardRotation) -> Self {
        Self {
            calibration,
            rotation,
            bias_integral: Vector3::zeros(),
            bias_correct_gyro: true,
        }
    }

    /// Convert a raw sample to corrected engineering units, returning
    /// `(gyro deg/s, accel)`.
    pub fn correct(&mut self, raw: &RawSample, rates: BiasRates) -> (Vector3<f32>, Vector3<f32>) {
        let cal = &self.calibration;
        let temp = raw.temperature.clamp(cal.temp_min, cal.temp_max);
        let temp_sq = temp * temp;

        let mut gyro = raw.gyro.component_mul(&cal.gyro_scale) - cal.gyro_bias;
        gyro.x -= cal.gyro_temp_coeff[0] + cal.gyro_temp_coeff[3] * temp_sq;
        gyro.y -= cal.gyro_temp_coeff[1] + cal.gyro_temp_coeff[4] * temp_sq;
        gyro.z -= cal.gyro_temp_coeff[2] + cal.gyro_temp_coeff[5] * temp_sq;

        let mut accel = raw.accel.component_mul(&cal.accel_scale);
        accel.x -= cal.accel_temp_coeff[0] * temp;
        accel.y -= cal.accel_temp_coeff[1] * temp;
        accel.z -= cal.accel_temp_coeff[2] * temp;

        gyro = self.rotation.rotate(gyro);
        accel = self.rotation.rotate(accel) - cal.accel_bias;

        if self.bias_correct_gyro {
            gyro += self.bias_integral;
        }

        // Leak: drive the long-run average rate toward zero.
        self.bias_integral.x += -gyro.x * rates.roll_pitch;
        self.bias_integral.y += -gyro.y * rates.roll_pitch;
        self.bias_integral.z += -gyro.z * rates.yaw;

        (gyro, accel)
    }
}
