//! Communication protocols
//!
//! The object-telemetry link (`objlink`) exchanges registered data objects
//! with a ground station or companion processor over any byte-stream
//! transport.

pub mod objlink;
