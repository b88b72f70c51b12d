//! Typed state objects
//!
//! Concrete data objects exchanged through the store and over telemetry.
//! Each carries a fixed little-endian wire layout; `encode`/`decode` are the
//! only place that layout lives.

use super::types::ObjectId;

/// A named, versioned, typed binary record held in the object store.
///
/// Implementations must keep `SIZE` in sync with the encoded layout;
/// `encode` receives a buffer of exactly `SIZE` bytes.
pub trait StateObject: Sized + Default {
    const ID: ObjectId;
    const NAME: &'static str;
    const SIZE: usize;
    /// Single-instance objects omit the instance id on the wire.
    const SINGLE_INSTANCE: bool = true;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Option<Self>;
}

fn put_f32(buf: &mut [u8], off: usize, v: f32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn get_f32(buf: &[u8], off: usize) -> f32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    f32::from_le_bytes(b)
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn get_u32(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

// ---------------------------------------------------------------------------
// Attitude / sensor state
// ---------------------------------------------------------------------------

/// Orientation estimate: unit quaternion plus derived Euler angles (deg).
///
/// Owned exclusively by the attitude estimator; everyone else reads it
/// through the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeState {
    pub q: [f32; 4],
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub yaw_deg: f32,
}

impl Default for AttitudeState {
    fn default() -> Self {
        Self {
            q: [1.0, 0.0, 0.0, 0.0],
            roll_deg: 0.0,
            pitch_deg: 0.0,
            yaw_deg: 0.0,
        }
    }
}

impl StateObject for AttitudeState {
    const ID: ObjectId = ObjectId(0xD7E0_4E92);
    const NAME: &'static str = "AttitudeState";
    const SIZE: usize = 28;

    fn encode(&self, buf: &mut [u8]) {
        for (i, q) in self.q.iter().enumerate() {
            put_f32(buf, i * 4, *q);
        }
        put_f32(buf, 16, self.roll_deg);
        put_f32(buf, 20, self.pitch_deg);
        put_f32(buf, 24, self.yaw_deg);
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            q: [
                get_f32(buf, 0),
                get_f32(buf, 4),
                get_f32(buf, 8),
                get_f32(buf, 12),
            ],
            roll_deg: get_f32(buf, 16),
            pitch_deg: get_f32(buf, 20),
            yaw_deg: get_f32(buf, 24),
        })
    }
}

/// Corrected gyro rates (deg/s), bias correction already applied.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GyroState {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl StateObject for GyroState {
    const ID: ObjectId = ObjectId(0x8C2A_0F12);
    const NAME: &'static str = "GyroState";
    const SIZE: usize = 12;

    fn encode(&self, buf: &mut [u8]) {
        put_f32(buf, 0, self.x);
        put_f32(buf, 4, self.y);
        put_f32(buf, 8, self.z);
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            x: get_f32(buf, 0),
            y: get_f32(buf, 4),
            z: get_f32(buf, 8),
        })
    }
}

/// Corrected accelerometer sample (m/s²).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccelState {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl StateObject for AccelState {
    const ID: ObjectId = ObjectId(0x41D1_77C4);
    const NAME: &'static str = "AccelState";
    const SIZE: usize = 12;

    fn encode(&self, buf: &mut [u8]) {
        put_f32(buf, 0, self.x);
        put_f32(buf, 4, self.y);
        put_f32(buf, 8, self.z);
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            x: get_f32(buf, 0),
            y: get_f32(buf, 4),
            z: get_f32(buf, 8),
        })
    }
}

// ---------------------------------------------------------------------------
// Settings objects
// ---------------------------------------------------------------------------

/// Trim-flight request flag carried in [`AttitudeSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrimFlight {
    #[default]
    Normal = 0,
    Start = 1,
    Load = 2,
}

impl TrimFlight {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Normal),
            1 => Some(Self::Start),
            2 => Some(Self::Load),
            _ => None,
        }
    }
}

/// Estimator tuning: complementary-filter gains, accel filter time
/// constant, board rotation, and behaviour flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeSettings {
    pub accel_kp: f32,
    pub accel_ki: f32,
    pub yaw_bias_rate: f32,
    /// Accel low-pass time constant (s); below 1e-4 the filter is disabled.
    pub accel_tau: f32,
    /// Board mounting offset, roll/pitch/yaw degrees.
    pub board_rotation_deg: [f32; 3],
    pub zero_during_arming: bool,
    pub bias_correct_gyro: bool,
    pub trim_flight: TrimFlight,
}

impl Default for AttitudeSettings {
    fn default() -> Self {
        Self {
            accel_kp: 0.05,
            accel_ki: 0.0001,
            yaw_bias_rate: 1.0e-6,
            accel_tau: 0.0,
            board_rotation_deg: [0.0; 3],
            zero_during_arming: false,
            bias_correct_gyro: true,
            trim_flight: TrimFlight::Normal,
        }
    }
}

impl StateObject for AttitudeSettings {
    const ID: ObjectId = ObjectId(0x32A5_6D08);
    const NAME: &'static str = "AttitudeSettings";
    const SIZE: usize = 31;

    fn encode(&self, buf: &mut [u8]) {
        put_f32(buf, 0, self.accel_kp);
        put_f32(buf, 4, self.accel_ki);
        put_f32(buf, 8, self.yaw_bias_rate);
        put_f32(buf, 12, self.accel_tau);
        for (i, v) in self.board_rotation_deg.iter().enumerate() {
            put_f32(buf, 16 + i * 4, *v);
        }
        buf[28] = self.zero_during_arming as u8;
        buf[29] = self.bias_correct_gyro as u8;
        buf[30] = self.trim_flight as u8;
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            accel_kp: get_f32(buf, 0),
            accel_ki: get_f32(buf, 4),
            yaw_bias_rate: get_f32(buf, 8),
            accel_tau: get_f32(buf, 12),
            board_rotation_deg: [get_f32(buf, 16), get_f32(buf, 20), get_f32(buf, 24)],
            zero_during_arming: buf[28] != 0,
            bias_correct_gyro: buf[29] != 0,
            trim_flight: TrimFlight::from_u8(buf[30])?,
        })
    }
}

/// Per-axis sensor calibration: scale, bias, and temperature coefficients,
/// with the temperature range they were calibrated over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSettings {
    pub gyro_scale: [f32; 3],
    pub accel_scale: [f32; 3],
    /// Persistent gyro bias estimate, written back on calibration.
    pub gyro_bias: [f32; 3],
    pub accel_bias: [f32; 3],
    /// Quadratic gyro drift: (x, y, z, x², y², z²) coefficients.
    pub gyro_temp_coeff: [f32; 6],
    /// Linear accel drift per axis.
    pub accel_temp_coeff: [f32; 3],
    /// Calibrated temperature extent (min, max); compensation clamps to it.
    pub temp_calibrated_min: f32,
    pub temp_calibrated_max: f32,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            gyro_scale: [1.0; 3],
            accel_scale: [1.0; 3],
            gyro_bias: [0.0; 3],
            accel_bias: [0.0; 3],
            gyro_temp_coeff: [0.0; 6],
            accel_temp_coeff: [0.0; 3],
            temp_calibrated_min: -30.0,
            temp_calibrated_max: 70.0,
        }
    }
}

impl StateObject for SensorSettings {
    const ID: ObjectId = ObjectId(0x6B92_31F0);
    const NAME: &'static str = "SensorSettings";
    const SIZE: usize = 92;

    fn encode(&self, buf: &mut [u8]) {
        let mut off = 0;
        for group in [
            &self.gyro_scale[..],
            &self.accel_scale[..],
            &self.gyro_bias[..],
            &self.accel_bias[..],
            &self.gyro_temp_coeff[..],
            &self.accel_temp_coeff[..],
        ] {
            for v in group {
                put_f32(buf, off, *v);
                off += 4;
            }
        }
        put_f32(buf, 84, self.temp_calibrated_min);
        put_f32(buf, 88, self.temp_calibrated_max);
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        let v3 = |off: usize| [get_f32(buf, off), get_f32(buf, off + 4), get_f32(buf, off + 8)];
        Some(Self {
            gyro_scale: v3(0),
            accel_scale: v3(12),
            gyro_bias: v3(24),
            accel_bias: v3(36),
            gyro_temp_coeff: [
                get_f32(buf, 48),
                get_f32(buf, 52),
                get_f32(buf, 56),
                get_f32(buf, 60),
                get_f32(buf, 64),
                get_f32(buf, 68),
            ],
            accel_temp_coeff: v3(72),
            temp_calibrated_min: get_f32(buf, 84),
            temp_calibrated_max: get_f32(buf, 88),
        })
    }
}

// ---------------------------------------------------------------------------
// Flight status / manual command
// ---------------------------------------------------------------------------

/// Vehicle arming state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmedState {
    #[default]
    Disarmed = 0,
    /// Arming transition in progress.
    Arming = 1,
    Armed = 2,
}

impl ArmedState {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Disarmed),
            1 => Some(Self::Arming),
            2 => Some(Self::Armed),
            _ => None,
        }
    }
}

/// Which control stages are active for the current flight mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlChain {
    pub stabilization: bool,
    pub path_follower: bool,
    pub path_planner: bool,
}

/// Shared flight status: arming, active mode, and the control chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlightStatus {
    pub armed: ArmedState,
    /// Active flight mode (see `vehicle::FlightMode` for the mapping).
    pub flight_mode: u8,
    pub control_chain: ControlChain,
}

impl StateObject for FlightStatus {
    const ID: ObjectId = ObjectId(0x1F3C_9A04);
    const NAME: &'static str = "FlightStatus";
    const SIZE: usize = 5;

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.armed as u8;
        buf[1] = self.flight_mode;
        buf[2] = self.control_chain.stabilization as u8;
        buf[3] = self.control_chain.path_follower as u8;
        buf[4] = self.control_chain.path_planner as u8;
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            armed: ArmedState::from_u8(buf[0])?,
            flight_mode: buf[1],
            control_chain: ControlChain {
                stabilization: buf[2] != 0,
                path_follower: buf[3] != 0,
                path_planner: buf[4] != 0,
            },
        })
    }
}

/// Decoded manual-control input: throttle, mode switch, and raw button
/// banks. Input decoding itself is an external collaborator; this object is
/// the handover point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManualCommand {
    pub throttle: f32,
    pub switch_position: u8,
    /// Raw button bitmaps, one byte per bank.
    pub buttons: [u8; 2],
}

impl StateObject for ManualCommand {
    const ID: ObjectId = ObjectId(0x5E10_22B6);
    const NAME: &'static str = "ManualCommand";
    const SIZE: usize = 7;

    fn encode(&self, buf: &mut [u8]) {
        put_f32(buf, 0, self.throttle);
        buf[4] = self.switch_position;
        buf[5] = self.buttons[0];
        buf[6] = self.buttons[1];
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            throttle: get_f32(buf, 0),
            switch_position: buf[4],
            buttons: [buf[5], buf[6]],
        })
    }
}

// ---------------------------------------------------------------------------
// Telemetry link statistics
// ---------------------------------------------------------------------------

/// Connection handshake state, one per telemetry engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    #[default]
    Disconnected = 0,
    /// Peer requested a handshake (peer side only).
    HandshakeReq = 1,
    /// Handshake acknowledged, waiting for peer confirmation.
    HandshakeAck = 2,
    Connected = 3,
}

impl LinkStatus {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Disconnected),
            1 => Some(Self::HandshakeReq),
            2 => Some(Self::HandshakeAck),
            3 => Some(Self::Connected),
            _ => None,
        }
    }
}

/// Our side of the telemetry link: handshake status plus transfer
/// statistics, recomputed on a fixed period.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalLinkStats {
    pub status: LinkStatus,
    pub tx_data_rate: f32,
    pub tx_bytes: u32,
    pub tx_failures: u32,
    pub tx_retries: u32,
    pub rx_data_rate: f32,
    pub rx_bytes: u32,
    pub rx_failures: u32,
    pub rx_sync_errors: u32,
    pub rx_crc_errors: u32,
}

impl StateObject for LocalLinkStats {
    const ID: ObjectId = ObjectId(0x91C4_5A88);
    const NAME: &'static str = "LocalLinkStats";
    const SIZE: usize = 37;

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.status as u8;
        put_f32(buf, 1, self.tx_data_rate);
        put_u32(buf, 5, self.tx_bytes);
        put_u32(buf, 9, self.tx_failures);
        put_u32(buf, 13, self.tx_retries);
        put_f32(buf, 17, self.rx_data_rate);
        put_u32(buf, 21, self.rx_bytes);
        put_u32(buf, 25, self.rx_failures);
        put_u32(buf, 29, self.rx_sync_errors);
        put_u32(buf, 33, self.rx_crc_errors);
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            status: LinkStatus::from_u8(buf[0])?,
            tx_data_rate: get_f32(buf, 1),
            tx_bytes: get_u32(buf, 5),
            tx_failures: get_u32(buf, 9),
            tx_retries: get_u32(buf, 13),
            rx_data_rate: get_f32(buf, 17),
            rx_bytes: get_u32(buf, 21),
            rx_failures: get_u32(buf, 25),
            rx_sync_errors: get_u32(buf, 29),
            rx_crc_errors: get_u32(buf, 33),
        })
    }
}

/// The peer's (ground station's) view of the link, written to us over
/// telemetry; drives the handshake state machine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PeerLinkStats {
    pub status: LinkStatus,
    pub tx_data_rate: f32,
    pub rx_data_rate: f32,
}

impl StateObject for PeerLinkStats {
    const ID: ObjectId = ObjectId(0xC0B7_3D1A);
    const NAME: &'static str = "PeerLinkStats";
    const SIZE: usize = 9;

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.status as u8;
        put_f32(buf, 1, self.tx_data_rate);
        put_f32(buf, 5, self.rx_data_rate);
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            status: LinkStatus::from_u8(buf[0])?,
            tx_data_rate: get_f32(buf, 1),
            rx_data_rate: get_f32(buf, 5),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: StateObject + PartialEq + core::fmt::Debug>(value: T) {
        let mut buf = [0u8; 128];
        value.encode(&mut buf[..T::SIZE]);
        let back = T::decode(&buf[..T::SIZE]).expect("decode");
        assert_eq!(back, value);
    }

    #[test]
    fn attitude_settings_round_trip() {
        round_trip(AttitudeSettings {
            accel_kp: 0.07,
            accel_ki: 0.0002,
            yaw_bias_rate: 1e-5,
            accel_tau: 0.1,
            board_rotation_deg: [10.0, -5.0, 90.0],
            zero_during_arming: true,
            bias_correct_gyro: false,
            trim_flight: TrimFlight::Start,
        });
    }

    #[test]
    fn flight_status_round_trip() {
        round_trip(FlightStatus {
            armed: ArmedState::Arming,
            flight_mode: 3,
            control_chain: ControlChain {
                stabilization: true,
                path_follower: true,
                path_planner: false,
            },
        });
    }

    #[test]
    fn link_stats_round_trip() {
        round_trip(LocalLinkStats {
            status: LinkStatus::Connected,
            tx_data_rate: 120.5,
            tx_bytes: 48_000,
            tx_failures: 2,
            tx_retries: 5,
            rx_data_rate: 80.25,
            rx_bytes: 32_000,
            rx_failures: 1,
            rx_sync_errors: 3,
            rx_crc_errors: 4,
        });
    }

    #[test]
    fn decode_rejects_bad_enum() {
        let mut buf = [0u8; FlightStatus::SIZE];
        FlightStatus::default().encode(&mut buf);
        buf[0] = 0xFF;
        assert!(FlightStatus::decode(&buf).is_none());
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let buf = [0u8; 4];
        assert!(GyroState::decode(&buf).is_none());
    }
}
