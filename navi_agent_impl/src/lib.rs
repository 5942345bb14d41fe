//! Do not use this crate directly.
//!
//! This is the implementation crate for `navi_agent`, the host-side debug
//! agent of the NAVI remote debugging protocol: it accepts a frontend
//! connection on a stream transport, executes debug primitives against a
//! platform backend, and streams asynchronous debug events back.

#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
extern crate log;

mod agent_error;
pub mod bp;
pub mod conn;
pub mod protocol;
pub mod session;
pub mod target;

pub use crate::agent_error::{AgentError, AgentResult, ErrorCode};
pub use crate::bp::{Breakpoint, BreakpointKind, BreakpointManager, ConditionTree};
pub use crate::conn::{TcpServer, Transport};
pub use crate::protocol::{CommandCode, Packet};
pub use crate::session::{Debugger, InformationProvider, Session};
pub use crate::target::{
    Address, DebugEvent, DebuggerOptions, PlatformBackend, SimSystem, TargetEvent, ThreadId,
};

/// The default port the agent listens on.
pub const DEFAULT_PORT: u16 = 2222;
