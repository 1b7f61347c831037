//! Tally Runtime
//!
//! Drives the shared state from `tally-core` over TCP:
//! - `server`: accept loop with non-blocking admission
//! - `handler`: one-line request handling per connection
//! - `reporters`: the output (delta) and log (cumulative) interval tasks
//! - `runtime` / `builder`: lifecycle controller tying the pieces together
//!
//! Client input errors stay inside the connection handler. Internal faults
//! surface as fatal [`RuntimeError`]s and stop the runtime.

pub mod builder;
pub mod error;
pub mod handler;
pub mod reporters;
mod runtime;
pub mod server;

pub use builder::RuntimeBuilder;
pub use error::{RuntimeError, RuntimeResult};
pub use handler::HandlerOutcome;
pub use reporters::{ChannelEmitter, LogReporter, OutputReporter, Report, ReportEmitter, StdoutEmitter};
pub use runtime::*;
pub use server::TallyServer;

// Re-export core types for convenience
pub use tally_core::{
    AdmissionPermit, FileSink, GateStats, MemorySink, ServerConfig, TallyError, TallyState,
    UniqueSink,
};
