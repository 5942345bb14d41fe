//! The session layer: per-command dispatch against the backend and the
//! single-threaded loop that multiplexes peer commands and debug events.
mod controller;
mod debugger;
mod provider;

pub use controller::Session;
pub use debugger::Debugger;
pub use provider::InformationProvider;
