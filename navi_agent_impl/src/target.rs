//! The debuggee side: the platform backend contract, the data it reports,
//! and a simulated in-memory target.
mod backend;
mod event;
mod options;
mod sim;
mod types;

pub use backend::PlatformBackend;
pub use event::{DebugEvent, TargetEvent};
pub use options::DebuggerOptions;
pub use sim::{SimSystem, SimSystemBuilder};
pub use types::{
    Address, DebugException, DebuggerEventSettings, ExceptionAction, FileListing, Module,
    ProcessDescription, RegisterContainer, RegisterDescription, RegisterValue, Thread, ThreadId,
    ThreadRegisters, ThreadState,
};
