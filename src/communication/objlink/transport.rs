//! Byte transport abstraction
//!
//! The link layer is transport agnostic: anything that can move raw bytes
//! in both directions can carry object frames. Radio and USB serial ports
//! implement this on hardware; [`ChannelTransport`] provides an in-memory
//! loopback pair for host tests.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// Depth of each direction of a [`ChannelTransport`] pair.
pub const CHANNEL_DEPTH: usize = 512;

/// Transport-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// No byte arrived within the caller's deadline.
    Timeout,
    /// The physical link reported loss of signal.
    SignalLost,
    /// The peer endpoint went away.
    Disconnected,
    /// Driver-level read or write failure.
    Io,
}

/// Bidirectional byte stream carrying object frames.
///
/// Methods take `&self` so a single transport can be shared between the
/// transmit and receive tasks.
pub trait Transport {
    /// Write the whole buffer.
    async fn write(&self, buf: &[u8]) -> Result<(), TransportError>;

    /// Read at least one byte into `buf`, returning the count. Blocks until
    /// a byte is available; callers impose deadlines with `with_timeout`.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// In-memory transport backed by two byte channels.
///
/// [`ChannelTransport::pair`] wires two endpoints back to back, so frames
/// written on one side are read on the other.
#[derive(Clone, Copy)]
pub struct ChannelTransport {
    tx: &'static Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH>,
    rx: &'static Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH>,
}

impl ChannelTransport {
    /// Build a connected endpoint pair over two static byte channels.
    pub fn pair(
        a_to_b: &'static Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH>,
        b_to_a: &'static Channel<CriticalSectionRawMutex, u8, CHANNEL_DEPTH>,
    ) -> (Self, Self) {
        (
            Self {
                tx: a_to_b,
                rx: b_to_a,
            },
            Self {
                tx: b_to_a,
                rx: a_to_b,
            },
        )
    }
}

impl Transport for ChannelTransport {
    async fn write(&self, buf: &[u8]) -> Result<(), TransportError> {
        for &b in buf {
            self.tx.send(b).await;
        }
        Ok(())
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.rx.receive().await;
        let mut n = 1;
        while n < buf.len() {
            match self.rx.try_receive() {
                Ok(b) => {
                    buf[n] = b;
                    n += 1;
                }
                Err(_) => break,
            }
        }
        Ok(n)
    }
}
