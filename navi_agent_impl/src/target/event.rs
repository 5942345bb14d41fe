use crate::{
    bp::BreakpointKind,
    target::{Address, Module, RegisterContainer, Thread, ThreadId, ThreadState},
};

/// A raw occurrence in the debuggee, reported by the backend.
///
/// Stops at patched addresses have not been classified yet; the breakpoint
/// manager decides which breakpoint kind (if any) was hit.
#[derive(Clone, Debug)]
pub enum TargetEvent {
    /// The debuggee stopped at `addr` in thread `tid`. `code` carries the
    /// platform exception code of the stop, if the platform reports one.
    Stopped {
        tid: ThreadId,
        addr: Address,
        code: Option<u64>,
    },
    /// The engine consumed an echo breakpoint on its own (debug stubs that
    /// cannot re-arm them report this instead of a remove confirmation).
    EchoBreakpointRemoved {
        addr: Address,
    },
    ThreadCreated {
        tid: ThreadId,
        state: ThreadState,
    },
    ThreadExited {
        tid: ThreadId,
    },
    ModuleLoaded {
        module: Module,
        tid: ThreadId,
    },
    ModuleUnloaded {
        module: Module,
    },
    Exception {
        tid: ThreadId,
        addr: Address,
        code: u64,
    },
    ProcessStarted {
        module: Module,
        thread: Thread,
    },
    ProcessExited,
}

/// A debug event ready to be delivered to the peer, queued by the session
/// core and drained between commands as unsolicited replies with id 0.
#[derive(Clone, Debug)]
pub enum DebugEvent {
    BreakpointHit {
        kind: BreakpointKind,
        addr: Address,
        tid: ThreadId,
        registers: RegisterContainer,
    },
    EchoBreakpointRemoved {
        addr: Address,
    },
    ThreadCreated {
        tid: ThreadId,
        state: ThreadState,
    },
    ThreadExited {
        tid: ThreadId,
    },
    ModuleLoaded {
        module: Module,
        tid: ThreadId,
    },
    ModuleUnloaded {
        module: Module,
    },
    Exception {
        tid: ThreadId,
        addr: Address,
        code: u64,
    },
    ProcessStarted {
        module: Module,
        thread: Thread,
    },
    ProcessExited,
}
