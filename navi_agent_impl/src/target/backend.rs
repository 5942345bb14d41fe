use crate::{
    bp::Breakpoint,
    target::{
        Address, DebugException, DebuggerOptions, ExceptionAction, FileListing,
        ProcessDescription, RegisterContainer, RegisterDescription, TargetEvent, ThreadId,
    },
    AgentResult,
};

/// The capability set a platform implementation has to provide.
///
/// All operations that modify the debuggee are synchronous and return
/// promptly; the only call that may block is [`PlatformBackend::pump_events`].
/// A backend that uses an internal worker to wait on its debug engine hands
/// events over through a queue that is drained via
/// [`PlatformBackend::next_event`] on the session thread.
pub trait PlatformBackend: std::fmt::Debug + Send {
    /// Attaches to the already running target process.
    fn attach(&mut self) -> AgentResult<()>;

    /// Starts the target executable under debugger control.
    fn start(&mut self, path: &str, argv: &[String]) -> AgentResult<()>;

    fn detach(&mut self) -> AgentResult<()>;

    fn terminate(&mut self) -> AgentResult<()>;

    /// Suspends the whole debuggee.
    fn halt(&mut self) -> AgentResult<()>;

    fn resume_process(&mut self) -> AgentResult<()>;

    fn resume_thread(&mut self, tid: ThreadId) -> AgentResult<()>;

    fn suspend_thread(&mut self, tid: ThreadId) -> AgentResult<()>;

    /// Executes a single instruction in the given thread. Returns the
    /// thread that finished the step and the new program counter.
    fn single_step(&mut self, tid: ThreadId) -> AgentResult<(ThreadId, Address)>;

    fn read_memory(&mut self, address: Address, size: u64) -> AgentResult<Vec<u8>>;

    fn write_memory(&mut self, address: Address, data: &[u8]) -> AgentResult<()>;

    /// Reads the registers of all threads.
    fn read_registers(&mut self) -> AgentResult<RegisterContainer>;

    fn set_register(&mut self, tid: ThreadId, index: u32, value: Address) -> AgentResult<()>;

    fn ip(&mut self, tid: ThreadId) -> AgentResult<Address>;

    fn set_ip(&mut self, tid: ThreadId, address: Address) -> AgentResult<()>;

    /// Saves the original code bytes at the breakpoint address. Called once
    /// before the first patch; the bytes stay available for the rest of the
    /// session.
    fn store_original(&mut self, bp: &Breakpoint) -> AgentResult<()>;

    /// Patches the breakpoint into debuggee code. `more_to_come` tells the
    /// backend that further patches follow immediately, allowing it to
    /// defer cache flushes.
    fn set_bp_raw(&mut self, bp: &Breakpoint, more_to_come: bool) -> AgentResult<()>;

    /// Restores the original bytes at the breakpoint address.
    fn remove_bp_raw(&mut self, bp: &Breakpoint, more_to_come: bool) -> AgentResult<()>;

    /// Returns the bounds of the memory region the anchor address falls
    /// into.
    fn valid_memory(&mut self, anchor: Address) -> AgentResult<(Address, Address)>;

    /// Returns the boundaries of all memory regions of the debuggee.
    fn mem_map(&mut self) -> AgentResult<Vec<Address>>;

    fn list_processes(&mut self) -> AgentResult<Vec<ProcessDescription>>;

    /// Lists the given directory of the target system, or the system root
    /// when no path is given.
    fn list_files(&mut self, path: Option<&str>) -> AgentResult<FileListing>;

    /// Drains pending occurrences from the debug engine into the backend's
    /// event queue.
    fn pump_events(&mut self) -> AgentResult<()>;

    /// Takes the next queued occurrence, in the order the engine reported
    /// them.
    fn next_event(&mut self) -> Option<TargetEvent>;

    fn register_descriptors(&self) -> Vec<RegisterDescription>;

    /// 32 or 64.
    fn address_size(&self) -> u32;

    fn options(&self) -> DebuggerOptions;

    fn platform_exceptions(&self) -> Vec<DebugException>;

    fn set_exception_action(&mut self, code: u64, action: ExceptionAction) -> AgentResult<()>;

    /// Resumes the debuggee after a thread was stepped away from a
    /// breakpoint. Platforms whose engine needs no special handling simply
    /// resume the process.
    fn resume_after_stepping(&mut self, tid: ThreadId, address: Address) -> AgentResult<()>;
}
