//! Frame encoding
//!
//! Serialises a frame into a caller-provided buffer:
//! `[sync][type][length lo][length hi][objid x4][instid x2?][payload][crc]`.
//! The length field covers sync through payload; the trailing CRC byte is
//! excluded. The instance id is present only for multi-instance objects.

use super::crc;
use super::frame::{PacketType, HEADER_SIZE, INSTANCE_SIZE, SYNC, VERSION};
use crate::objects::{InstanceId, ObjectId};

/// Encoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Destination buffer too small for the frame.
    BufferTooSmall,
}

/// Encode a frame, returning the number of bytes written.
pub fn encode(
    buf: &mut [u8],
    packet_type: PacketType,
    object: ObjectId,
    instance: InstanceId,
    single_instance: bool,
    payload: &[u8],
) -> Result<usize, EncodeError> {
    let instance_len = if single_instance { 0 } else { INSTANCE_SIZE };
    let length = HEADER_SIZE + instance_len + payload.len();
    if buf.len() < length + 1 {
        return Err(EncodeError::BufferTooSmall);
    }

    buf[0] = SYNC;
    buf[1] = VERSION | packet_type.type_byte();
    buf[2..4].copy_from_slice(&(length as u16).to_le_bytes());
    buf[4..8].copy_from_slice(&object.0.to_le_bytes());
    let mut at = HEADER_SIZE;
    if !single_instance {
        buf[at..at + 2].copy_from_slice(&instance.to_le_bytes());
        at += 2;
    }
    buf[at..at + payload.len()].copy_from_slice(payload);
    at += payload.len();
    buf[at] = crc::compute(&buf[..at]);
    Ok(at + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_instance_layout() {
        let mut buf = [0u8; 64];
        let n = encode(
            &mut buf,
            PacketType::Obj,
            ObjectId(0x1122_3344),
            0,
            true,
            &[0xAA, 0xBB],
        )
        .unwrap();
        assert_eq!(n, HEADER_SIZE + 2 + 1);
        assert_eq!(buf[0], SYNC);
        assert_eq!(buf[1], VERSION);
        assert_eq!(u16::from_le_bytes([buf[2], buf[3]]), (n - 1) as u16);
        assert_eq!(&buf[4..8], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(&buf[8..10], &[0xAA, 0xBB]);
        assert_eq!(buf[n - 1], crc::compute(&buf[..n - 1]));
    }

    #[test]
    fn multi_instance_carries_instance_id() {
        let mut buf = [0u8; 64];
        let n = encode(&mut buf, PacketType::ObjAck, ObjectId(1), 0x0102, false, &[0x7F]).unwrap();
        assert_eq!(n, HEADER_SIZE + INSTANCE_SIZE + 1 + 1);
        assert_eq!(buf[1], VERSION | PacketType::ObjAck.type_byte());
        assert_eq!(&buf[8..10], &[0x02, 0x01]);
    }

    #[test]
    fn rejects_small_buffer() {
        let mut buf = [0u8; 4];
        assert_eq!(
            encode(&mut buf, PacketType::Ack, ObjectId(1), 0, true, &[]),
            Err(EncodeError::BufferTooSmall)
        );
    }
}
