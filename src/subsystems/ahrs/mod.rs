//! AHRS: attitude and heading reference
//!
//! Fuses gyroscope and accelerometer samples into an orientation
//! quaternion with a complementary filter; publishes `AttitudeState`
//! through the object store every cycle.
//!
//! # Architecture
//!
//! ```text
//!  ImuSource ──raw──> SensorAdapter ──corrected──> ComplementaryFilter
//!  (combined/split)   (scale, temp,   gyro/accel   │
//!                      rotation,                    ▼
//!                      bias learning)          AttitudeState ──> store
//! ```
//!
//! - [`sensors`]: the two IMU acquisition strategies and the correction
//!   pipeline, including the slow gyro-bias learning law
//! - [`estimator`]: the complementary filter itself, a pure numeric
//!   context struct with no blocking
//! - [`trim`]: accelerometer bias trim accumulated during level armed
//!   flight
//! - [`task`]: the periodic estimator task wiring them together, with
//!   startup/arming gain scheduling

pub mod estimator;
pub mod sensors;
pub mod task;
pub mod trim;

pub use estimator::{ComplementaryFilter, FilterGains};
pub use sensors::{
    AnalogGyroSample, BoardRotation, CombinedImu, ImuSource, RawSample, SensorAdapter,
    SensorCalibration, SensorError, SplitImu,
};
pub use task::run_attitude_task;
pub use trim::{TrimManager, GRAVITY_MSS, TRIM_SAMPLE_CAP};
