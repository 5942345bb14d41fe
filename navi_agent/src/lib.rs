//! Host-side debug agent for the NAVI remote debugging protocol.
//!
//! The agent is the server end of a remote debugger: a reverse-engineering
//! frontend connects over TCP, selects or confirms a target, and then
//! drives the debuggee through commands (read and write memory, manage
//! breakpoints, step, resume, inspect registers) while the agent streams
//! asynchronous debug events back over the same connection.
//!
//! The crate splits into three replaceable layers:
//!
//! * [`Transport`] carries packets; [`TcpServer`] is the bundled
//!   single-peer TCP implementation.
//! * [`Session`] owns the protocol: packet dispatch, reply shapes, the
//!   pre-attach settings exchange, and the event drain.
//! * [`PlatformBackend`] performs the actual debugging. [`SimSystem`] is a
//!   simulated in-memory target that exercises the full contract.
//!
//! ```rust,no_run
//! use navi_agent::{Debugger, Session, SimSystem, TcpServer};
//!
//! # fn main() -> navi_agent::AgentResult<()> {
//! let transport = TcpServer::bind(2222)?;
//! let backend = SimSystem::builder()
//!     .region(0x40_0000, vec![0x90; 0x1000])
//!     .thread(1, 0x40_0000)
//!     .build();
//! let debugger = Debugger::with_executable(Box::new(backend), "/bin/target", vec![]);
//! Session::new(transport, debugger).run()
//! # }
//! ```

#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

pub use navi_agent_impl::{
    Address, AgentError, AgentResult, Breakpoint, BreakpointKind, BreakpointManager,
    CommandCode, ConditionTree, Debugger, DebugEvent, DebuggerOptions, ErrorCode,
    InformationProvider, Packet, PlatformBackend, Session, SimSystem, TargetEvent, TcpServer,
    ThreadId, Transport, DEFAULT_PORT,
};

/// The breakpoint subsystem: kinds, tables, conditions.
pub mod bp {
    pub use navi_agent_impl::bp::*;
}

/// Wire codec: command codes, packet parsing, reply encoding.
pub mod protocol {
    pub use navi_agent_impl::protocol::*;
}

/// Backend contract and the data types it reports.
pub mod target {
    pub use navi_agent_impl::target::*;
}

/// Transports between agent and frontend.
pub mod conn {
    pub use navi_agent_impl::conn::*;
}
