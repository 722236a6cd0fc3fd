//! Liveness protocol between peers.
//!
//! A prober opens a connection to a server by public key and sends one of
//! three requests; the server answers each with exactly one response:
//!
//! | request            | response                                   |
//! |--------------------|--------------------------------------------|
//! | `ping`             | `pong{server, category, timestamp, publicKey}` |
//! | `challenge{nonce}` | `challenge-response{signature, publicKey, ...}` |
//! | `status`           | `status-report{uptime, version, ...}`      |
//!
//! Any request can instead be answered with `error{message}`. Messages are
//! framed by [`codec`].

pub mod codec;
mod messages;
mod monitor;
mod probe;
mod server;

pub use codec::{CodecError, MAX_FRAME_SIZE};
pub use messages::{Request, Response};
pub use monitor::{Monitor, MonitorHandle, ServerRecord, ServerStatus, DEFAULT_MONITOR_INTERVAL};
pub use probe::{
    BulkCheckResult, ProbeError, ProbeKind, ProbeOptions, ProbeReport, ProbeTarget, Prober,
    DEFAULT_PROBE_TIMEOUT,
};
pub use server::{LivenessServer, ServerIdentity};
