//! Wire format definitions
//!
//! Object update packet layout (little endian):
//!
//! ```text
//! [sync 0x3C][type/flags][length u16][object id u32]
//! [instance id u16, multi-instance objects only][payload][crc8]
//! ```
//!
//! `length` counts every byte from the sync byte through the end of the
//! payload; the checksum is excluded. The type byte carries the protocol
//! version in its high bits; any other version is treated as a framing
//! error.

use heapless::Vec;

use crate::objects::{InstanceId, ObjectId};

/// Frame sync byte.
pub const SYNC: u8 = 0x3C;
/// Protocol version bits carried in the type byte.
pub const VERSION: u8 = 0x20;
/// Mask selecting the version bits.
pub const VERSION_MASK: u8 = 0xF8;
/// Mask selecting the packet type bits.
pub const TYPE_MASK: u8 = 0x07;

/// Fixed header: sync + type + length + object id.
pub const HEADER_SIZE: usize = 8;
/// Instance id field size for multi-instance objects.
pub const INSTANCE_SIZE: usize = 2;
/// Largest payload (bounded by the object store).
pub const MAX_PAYLOAD: usize = crate::objects::store::MAX_OBJECT_SIZE;
/// Largest complete frame.
pub const MAX_FRAME: usize = HEADER_SIZE + INSTANCE_SIZE + MAX_PAYLOAD + 1;

/// Packet type carried in the low bits of the type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketType {
    /// Object value, no acknowledgement expected.
    Obj = 0,
    /// Request for the peer's copy of an object.
    ObjReq = 1,
    /// Object value, acknowledgement expected.
    ObjAck = 2,
    /// Acknowledgement of a received `ObjAck`.
    Ack = 3,
    /// Rejection (unknown object or failed apply).
    Nack = 4,
}

impl PacketType {
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        if byte & VERSION_MASK != VERSION {
            return None;
        }
        match byte & TYPE_MASK {
            0 => Some(Self::Obj),
            1 => Some(Self::ObjReq),
            2 => Some(Self::ObjAck),
            3 => Some(Self::Ack),
            4 => Some(Self::Nack),
            _ => None,
        }
    }

    pub fn type_byte(self) -> u8 {
        VERSION | self as u8
    }

    /// Whether frames of this type carry an object payload.
    pub fn has_payload(self) -> bool {
        matches!(self, Self::Obj | Self::ObjAck)
    }
}

/// A completely parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_type: PacketType,
    pub object: ObjectId,
    pub instance: InstanceId,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

/// Per-link transfer statistics, reset on every rollup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub rx_bytes: u32,
    pub tx_bytes: u32,
    /// Complete object frames applied to the store.
    pub rx_objects: u32,
    pub tx_objects: u32,
    /// Bytes rejected while hunting for a frame boundary.
    pub rx_sync_errors: u32,
    /// Frames discarded at the checksum stage.
    pub rx_crc_errors: u32,
    /// Frames discarded for other reasons (unknown object, bad length).
    pub rx_errors: u32,
}

impl LinkStats {
    pub const fn new() -> Self {
        Self {
            rx_bytes: 0,
            tx_bytes: 0,
            rx_objects: 0,
            tx_objects: 0,
            rx_sync_errors: 0,
            rx_crc_errors: 0,
            rx_errors: 0,
        }
    }

    /// Fold another stats block into this one.
    pub fn absorb(&mut self, other: LinkStats) {
        self.rx_bytes = self.rx_bytes.wrapping_add(other.rx_bytes);
        self.tx_bytes = self.tx_bytes.wrapping_add(other.tx_bytes);
        self.rx_objects = self.rx_objects.wrapping_add(other.rx_objects);
        self.tx_objects = self.tx_objects.wrapping_add(other.tx_objects);
        self.rx_sync_errors = self.rx_sync_errors.wrapping_add(other.rx_sync_errors);
        self.rx_crc_errors = self.rx_crc_errors.wrapping_add(other.rx_crc_errors);
        self.rx_errors = self.rx_errors.wrapping_add(other.rx_errors);
    }

    /// Return the current counters and reset to zero.
    pub fn take(&mut self) -> LinkStats {
        core::mem::take(self)
    }
}
