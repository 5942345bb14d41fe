//! Plain data carried between the backend, the session core, and the peer.

/// A memory address of the debuggee. Stored at full width internally; the
/// backend reports whether the target is a 32 or 64 bit machine.
pub type Address = u64;

/// Identifies a thread of the debuggee.
pub type ThreadId = u32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ThreadState {
    Running = 0,
    Suspended = 1,
}

impl ThreadState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Suspended => "Suspended",
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Thread {
    pub tid: ThreadId,
    pub state: ThreadState,
}

/// The value of one register in one thread, with an optional snapshot of
/// the memory the register points to.
#[derive(Clone, Debug)]
pub struct RegisterValue {
    pub name: String,
    pub value: Address,
    pub memory: Vec<u8>,
    pub is_pc: bool,
    pub is_sp: bool,
}

impl RegisterValue {
    pub fn new(name: &str, value: Address) -> Self {
        Self {
            name: name.to_string(),
            value,
            memory: Vec::new(),
            is_pc: false,
            is_sp: false,
        }
    }
}

/// The registers of one thread.
#[derive(Clone, Debug)]
pub struct ThreadRegisters {
    pub tid: ThreadId,
    pub registers: Vec<RegisterValue>,
}

/// A full register snapshot of the debuggee, one entry per thread.
#[derive(Clone, Debug, Default)]
pub struct RegisterContainer {
    pub threads: Vec<ThreadRegisters>,
}

impl RegisterContainer {
    /// Looks up a register by name in the given thread.
    pub fn value_of(&self, tid: ThreadId, name: &str) -> Option<Address> {
        self.threads
            .iter()
            .find(|t| t.tid == tid)?
            .registers
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .map(|r| r.value)
    }
}

/// Describes one register of the target platform for the info string.
#[derive(Clone, Debug)]
pub struct RegisterDescription {
    pub name: String,
    pub size: u32,
    pub editable: bool,
}

impl RegisterDescription {
    pub fn new(name: &str, size: u32, editable: bool) -> Self {
        Self {
            name: name.to_string(),
            size,
            editable,
        }
    }
}

/// A module mapped into the address space of the debuggee.
#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub path: String,
    pub base_address: Address,
    pub size: u64,
}

impl Module {
    /// True if the address falls into `[base, base + size)`.
    pub fn contains(&self, address: Address) -> bool {
        address >= self.base_address && address < self.base_address + self.size
    }
}

#[derive(Clone, Debug)]
pub struct ProcessDescription {
    pub name: String,
    pub pid: u32,
}

/// The content of one directory of the target system.
#[derive(Clone, Debug, Default)]
pub struct FileListing {
    pub directory: String,
    pub drives: Vec<String>,
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

/// What the debugger does when the debuggee raises a given exception.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ExceptionAction {
    Halt = 0,
    PassToApp = 1,
    SkipAppHandler = 2,
}

impl ExceptionAction {
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Halt),
            1 => Some(Self::PassToApp),
            2 => Some(Self::SkipAppHandler),
            _ => None,
        }
    }
}

/// One exception type of the target platform.
#[derive(Clone, Debug)]
pub struct DebugException {
    pub name: String,
    pub code: u64,
    pub action: ExceptionAction,
}

/// Controls whether the debugger halts the debuggee on module events.
#[derive(Copy, Clone, Debug, Default)]
pub struct DebuggerEventSettings {
    pub break_on_module_load: bool,
    pub break_on_module_unload: bool,
}
