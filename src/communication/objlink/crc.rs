//! CRC-8 frame checksum
//!
//! Polynomial 0x07 (ATM HEC), init 0, no reflection. Computed over every
//! frame byte from the sync byte through the last payload byte.

/// Update a running CRC with one byte.
pub fn update(crc: u8, byte: u8) -> u8 {
    let mut crc = crc ^ byte;
    for _ in 0..8 {
        if crc & 0x80 != 0 {
            crc = (crc << 1) ^ 0x07;
        } else {
            crc <<= 1;
        }
    }
    crc
}

/// CRC over a whole buffer.
pub fn compute(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &b| update(crc, b))
}
