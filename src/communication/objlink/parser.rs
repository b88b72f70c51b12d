//! Frame parsing state machine
//!
//! Byte-at-a-time parser: Sync → Type → Length → ObjectId → InstanceId →
//! Data → Checksum → Complete. Any detected misalignment (illegal type
//! byte, impossible length, unknown object, checksum mismatch) resets the
//! machine to Sync so the stream re-synchronises on the next sync byte.
//! Nothing beyond the malformed frame is lost.
//!
//! The parser consults the object store to validate object ids, expected
//! payload sizes, and whether an instance id field is present on the wire.

use heapless::Vec;

use super::crc;
use super::frame::{Frame, LinkStats, PacketType, HEADER_SIZE, INSTANCE_SIZE, MAX_PAYLOAD, SYNC};
use crate::objects::{ObjectId, ObjectStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Sync,
    Type,
    Length,
    ObjId,
    InstId,
    Data,
    Checksum,
}

/// Result of feeding one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus {
    /// Frame incomplete, keep feeding.
    InProgress,
    /// A full frame passed its checksum.
    Complete(Frame),
    /// Misalignment detected; the machine has reset to Sync.
    Error,
}

/// Byte-stream frame parser with statistics.
pub struct Parser {
    state: State,
    packet_type: PacketType,
    length: u16,
    object: ObjectId,
    instance: u16,
    /// Bytes collected for the current multi-byte field.
    scratch: [u8; 4],
    field_count: usize,
    expected_payload: usize,
    has_instance_field: bool,
    payload: Vec<u8, MAX_PAYLOAD>,
    crc: u8,
    stats: LinkStats,
}

impl Parser {
    pub const fn new() -> Self {
        Self {
            state: State::Sync,
            packet_type: PacketType::Obj,
            length: 0,
            object: ObjectId::NONE,
            instance: 0,
            scratch: [0; 4],
            field_count: 0,
            expected_payload: 0,
            has_instance_field: false,
            payload: Vec::new(),
            crc: 0,
            stats: LinkStats::new(),
        }
    }

    /// Take and reset the accumulated statistics.
    pub fn take_stats(&mut self) -> LinkStats {
        self.stats.take()
    }

    /// Peek at the accumulated statistics.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    fn reset(&mut self) {
        self.state = State::Sync;
        self.field_count = 0;
        self.payload.clear();
        self.crc = 0;
    }

    fn desync(&mut self) -> ParseStatus {
        self.stats.rx_sync_errors = self.stats.rx_sync_errors.wrapping_add(1);
        self.reset();
        ParseStatus::Error
    }

    fn frame_error(&mut self) -> ParseStatus {
        self.stats.rx_errors = self.stats.rx_errors.wrapping_add(1);
        self.reset();
        ParseStatus::Error
    }

    /// Feed one received byte through the state machine.
    pub fn process_byte(&mut self, byte: u8, store: &ObjectStore) -> ParseStatus {
        self.stats.rx_bytes = self.stats.rx_bytes.wrapping_add(1);

        match self.state {
            State::Sync => {
                if byte != SYNC {
                    self.stats.rx_sync_errors = self.stats.rx_sync_errors.wrapping_add(1);
                    return ParseStatus::Error;
                }
                self.crc = crc::update(0, byte);
                self.state = State::Type;
                ParseStatus::InProgress
            }
            State::Type => match PacketType::from_type_byte(byte) {
                Some(t) => {
                    self.crc = crc::update(self.crc, byte);
                    self.packet_type = t;
                    self.field_count = 0;
                    self.state = State::Length;
                    ParseStatus::InProgress
                }
                None => self.desync(),
            },
            State::Length => {
                self.crc = crc::update(self.crc, byte);
                self.scratch[self.field_count] = byte;
                self.field_count += 1;
                if self.field_count == 2 {
                    self.length = u16::from_le_bytes([self.scratch[0], self.scratch[1]]);
                    self.field_count = 0;
                    self.state = State::ObjId;
                }
                ParseStatus::InProgress
            }
            State::ObjId => {
                self.crc = crc::update(self.crc, byte);
                self.scratch[self.field_count] = byte;
                self.field_count += 1;
                if self.field_count < 4 {
                    return ParseStatus::InProgress;
                }
                self.object = ObjectId(u32::from_le_bytes(self.scratch));
                self.field_count = 0;

                // The wire layout from here depends on the registered object.
                let (size, single) = match (store.size_of(self.object), store.is_single_instance(self.object)) {
                    (Ok(size), Ok(single)) => (size, single),
                    _ => return self.frame_error(),
                };
                self.has_instance_field = !single;
                self.expected_payload = if self.packet_type.has_payload() {
                    size
                } else {
                    0
                };

                let expected_len = HEADER_SIZE
                    + if self.has_instance_field {
                        INSTANCE_SIZE
                    } else {
                        0
                    }
                    + self.expected_payload;
                if usize::from(self.length) != expected_len {
                    return self.frame_error();
                }

                self.instance = 0;
                self.state = if self.has_instance_field {
                    State::InstId
                } else if self.expected_payload > 0 {
                    State::Data
                } else {
                    State::Checksum
                };
                ParseStatus::InProgress
            }
            State::InstId => {
                self.crc = crc::update(self.crc, byte);
                self.scratch[self.field_count] = byte;
                self.field_count += 1;
                if self.field_count == 2 {
                    self.instance = u16::from_le_bytes([self.scratch[0], self.scratch[1]]);
                    self.field_count = 0;
                    self.state = if self.expected_payload > 0 {
                        State::Data
                    } else {
                        State::Checksum
                    };
                }
                ParseStatus::InProgress
            }
            State::Data => {
                self.crc = crc::update(self.crc, byte);
                // Capacity is MAX_PAYLOAD and expected_payload is bounded by
                // the store, so the push cannot fail.
                let _ = self.payload.push(byte);
                if self.payload.len() == self.expected_payload {
                    self.state = State::Checksum;
                }
                ParseStatus::InProgress
            }
            State::Checksum => {
                if byte != self.crc {
                    self.stats.rx_crc_errors = self.stats.rx_crc_errors.wrapping_add(1);
                    self.reset();
                    return ParseStatus::Error;
                }
                let frame = Frame {
                    packet_type: self.packet_type,
                    object: self.object,
                    instance: self.instance,
                    payload: self.payload.clone(),
                };
                self.reset();
                ParseStatus::Complete(frame)
            }
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
