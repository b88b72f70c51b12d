//! Object-telemetry protocol engine
//!
//! A length-prefixed, checksummed, object-identified serial protocol for
//! exchanging typed state objects, in the UAVTalk tradition.
//!
//! # Architecture
//!
//! ```text
//!  ObjectStore ──events──> queues ──> TelemetryEngine ──frames──> Link(s)
//!       ▲                                                           │
//!       └───────────── Parser <──bytes── Transport <────────────────┘
//! ```
//!
//! - [`parser`] / [`writer`]: byte-level framing state machine and encoder
//! - [`policy`]: per-object update-mode policy (periodic / on-change /
//!   throttled / manual), governing telemetry and logging independently
//! - [`connection`]: per-transport link state (pending acknowledgement,
//!   statistics, inbound frame handling)
//! - [`supervisor`]: connection handshake and periodic statistics rollup
//! - [`engine`]: outbound dispatch loop with priority queues, acked sends
//!   with retry, and fan-out across transports
//! - [`task`]: async task entry points (tx loop, one rx loop per transport)

pub mod connection;
pub mod crc;
pub mod engine;
pub mod frame;
pub mod parser;
pub mod policy;
pub mod supervisor;
pub mod task;
pub mod transport;
pub mod writer;

pub use connection::{Link, LinkError, REQ_TIMEOUT_MS};
pub use engine::{LogSink, NullLog, TelemetryEngine, MAX_RETRIES};
pub use frame::{Frame, LinkStats, PacketType};
pub use parser::{ParseStatus, Parser};
pub use supervisor::{Supervisor, CONNECTION_TIMEOUT_MS, STATS_PERIOD_MS};
pub use task::{run_control_rx, run_engine_loop, run_rx_task, AUX_SILENCE_MS, RX_POLL_MS};
pub use transport::{ChannelTransport, Transport, TransportError};
