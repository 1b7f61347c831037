//! Tally Core
//!
//! Core building blocks for the tally line service:
//! - `protocol`: fixed-length line validation and wire responses
//! - `state`: the shared counter state (admission gate, dedup set,
//!   running totals, shutdown flag)
//! - `sink`: durable recording of newly unique values
//! - `config`: server configuration
//!
//! Nothing in this crate touches sockets. The runtime crate drives these
//! types from its accept loop, connection handlers and reporters.

pub mod config;
pub mod errors;
pub mod protocol;
pub mod sink;
pub mod state;

pub use config::ServerConfig;
pub use errors::{ProtocolError, TallyError, TallyResult};
pub use protocol::{validate_line, Record, BUSY_MESSAGE, LINE_LENGTH, MIN_VALUE};
pub use sink::{FileSink, MemorySink, UniqueSink};
pub use state::{AdmissionPermit, GateStats, TallyState};
