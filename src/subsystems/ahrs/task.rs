//! Periodic attitude estimation task
//!
//! Wires the IMU source, sensor adapter, trim manager, and complementary
//! filter into one loop. Settings changes arrive as store events on a
//! dedicated queue; cached copies are re-read only then, never mid-cycle.
//!
//! Gain scheduling: during the startup window ([`STARTUP_WINDOW_START_MS`]
//! to [`STARTUP_WINDOW_END_MS`] after boot), and during an arming
//! transition when `zero_during_arming` is set, the filter runs the
//! aggressive convergence profile (Kp=1, Ki=0, fast bias leak, filter
//! off) to snap the estimate level. Nominal gains apply otherwise.

use embassy_sync::channel::DynamicReceiver;
use embassy_time::Instant;
use nalgebra::Vector3;

use crate::core::DeltaTime;
use crate::objects::{
    AccelState, ArmedState, AttitudeSettings, AttitudeState, FlightStatus, GyroState,
    ManualCommand, SensorSettings, SharedStore, TrimFlight, UpdateEvent,
};
use crate::{log_info, log_warn};

use super::estimator::{ComplementaryFilter, FilterGains};
use super::sensors::{BiasRates, BoardRotation, ImuSource, SensorAdapter, SensorCalibration};
use super::trim::TrimManager;

/// Startup gain window, milliseconds after boot.
pub const STARTUP_WINDOW_START_MS: u64 = 1000;
pub const STARTUP_WINDOW_END_MS: u64 = 7000;

/// Pick the gain profile for this cycle.
pub fn gain_profile(
    settings: &AttitudeSettings,
    now_ms: u64,
    armed: ArmedState,
) -> FilterGains {
    let in_startup_window =
        now_ms > STARTUP_WINDOW_START_MS && now_ms < STARTUP_WINDOW_END_MS;
    let zeroing_while_arming = settings.zero_during_arming && armed == ArmedState::Arming;
    if in_startup_window || zeroing_while_arming {
        FilterGains::aggressive()
    } else {
        FilterGains::nominal(settings)
    }
}

/// Estimator loop. The caller subscribes `settings_events` to
/// `AttitudeSettings` and `SensorSettings` updates before spawning.
pub async fn run_attitude_task<S: ImuSource>(
    imu: &mut S,
    store: &SharedStore,
    settings_events: DynamicReceiver<'static, UpdateEvent>,
) -> ! {
    let mut settings: AttitudeSettings =
        store.with(|s| s.get_object()).unwrap_or_default();
    let mut adapter = SensorAdapter::new(
        SensorCalibration::from_settings(
            &store.with(|s| s.get_object()).unwrap_or_default(),
        ),
        BoardRotation::from_rpy_deg(settings.board_rotation_deg),
    );
    adapter.bias_correct_gyro = settings.bias_correct_gyro;

    let mut filter = ComplementaryFilter::new(FilterGains::nominal(&settings));
    let mut trim = TrimManager::new();
    let mut dt = DeltaTime::for_attitude_loop();
    let mut aggressive = false;

    loop {
        let mut settings_changed = false;
        while settings_events.try_receive().is_ok() {
            settings = store.with(|s| s.get_object()).unwrap_or_default();
            let sensor_config: SensorSettings =
                store.with(|s| s.get_object()).unwrap_or_default();
            adapter.calibration = SensorCalibration::from_settings(&sensor_config);
            adapter.rotation = BoardRotation::from_rpy_deg(settings.board_rotation_deg);
            adapter.bias_correct_gyro = settings.bias_correct_gyro;
            settings_changed = true;
            handle_trim_request(store, &mut trim, &mut adapter, &settings);
        }

        let (armed, throttle) = store.with(|s| {
            let status: FlightStatus = s.get_object().unwrap_or_default();
            let command: ManualCommand = s.get_object().unwrap_or_default();
            (status.armed, command.throttle)
        });

        let now_ms = Instant::now().as_millis();
        let want_aggressive =
            gain_profile(&settings, now_ms, armed).roll_pitch_bias_rate > 0.0;
        if settings_changed || want_aggressive != aggressive {
            if want_aggressive != aggressive {
                aggressive = want_aggressive;
                log_info!("attitude gains {}", if aggressive { "aggressive" } else { "nominal" });
            }
            filter.queue_gains(gain_profile(&settings, now_ms, armed));
        }

        let raw = match imu.read().await {
            Ok(raw) => raw,
            Err(_) => {
                // Transient: alarm, skip the cycle, retry immediately.
                log_warn!("attitude sensor timeout");
                continue;
            }
        };

        let gains = *filter.gains();
        let (gyro, accel) = adapter.correct(
            &raw,
            BiasRates {
                roll_pitch: gains.roll_pitch_bias_rate,
                yaw: gains.yaw_bias_rate,
            },
        );
        trim.accumulate(accel, armed == ArmedState::Armed, throttle);

        let dt_s = dt.update(Instant::now());
        let attitude = filter.update(dt_s, gyro, accel, &mut adapter.bias_integral);

        publish(store, &attitude, gyro, accel);
    }
}

fn handle_trim_request(
    store: &SharedStore,
    trim: &mut TrimManager,
    adapter: &mut SensorAdapter,
    settings: &AttitudeSettings,
) {
    match settings.trim_flight {
        TrimFlight::Start => {
            if !trim.active() {
                log_info!("trim accumulation started");
                trim.start();
            }
        }
        TrimFlight::Load => {
            if let Some(bias) = trim.load() {
                store.with_mut(|s| {
                    let mut sensor_config: SensorSettings =
                        s.get_object().unwrap_or_default();
                    // The window was corrected with the old bias already in
                    // place, so the mean is a residual on top of it.
                    sensor_config.accel_bias[0] += bias.x;
                    sensor_config.accel_bias[1] += bias.y;
                    sensor_config.accel_bias[2] += bias.z;
                    let _ = s.set_object(&sensor_config);

                    let mut attitude_config: AttitudeSettings =
                        s.get_object().unwrap_or_default();
                    attitude_config.trim_flight = TrimFlight::Normal;
                    let _ = s.set_object(&attitude_config);
                });
                adapter.calibration.accel_bias += bias;
                log_info!("trim bias loaded");
            }
        }
        TrimFlight::Normal => trim.cancel(),
    }
}

fn publish(
    store: &SharedStore,
    attitude: &AttitudeState,
    gyro: Vector3<f32>,
    accel: Vector3<f32>,
) {
    store.with_mut(|s| {
        let _ = s.set_object(attitude);
        let _ = s.set_object(&GyroState {
            x: gyro.x,
            y: gyro.y,
            z: gyro.z,
        });
        let _ = s.set_object(&AccelState {
            x: accel.x,
            y: accel.y,
            z: accel.z,
        });
    });
}
