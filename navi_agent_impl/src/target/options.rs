use crate::target::DebugException;

/// The debug commands a backend supports. Sent to the peer once per session
/// as part of the information string.
#[derive(Clone, Debug)]
pub struct DebuggerOptions {
    pub can_attach: bool,
    pub can_detach: bool,
    pub can_terminate: bool,
    pub can_memmap: bool,
    pub can_valid_memory: bool,
    pub can_multithread: bool,
    pub can_software_breakpoint: bool,
    /// `None` means the backend supports an unlimited number of
    /// breakpoints.
    pub breakpoint_count: Option<u32>,
    pub can_halt: bool,
    pub halt_before_communicating: bool,
    pub has_stack: bool,
    pub page_size: u32,

    // Whether the debugger can handle breakpoint hit counts greater than
    // one (echo breakpoints are re-armed after a hit).
    pub can_trace_count: bool,

    // Whether the debugger can halt the process when a library is mapped
    // into or unmapped from the address space.
    pub can_break_on_module_load: bool,
    pub can_break_on_module_unload: bool,

    /// The exceptions the target platform can raise.
    pub exceptions: Vec<DebugException>,
}

impl Default for DebuggerOptions {
    fn default() -> Self {
        Self {
            can_attach: true,
            can_detach: true,
            can_terminate: true,
            can_memmap: true,
            can_valid_memory: true,
            can_multithread: true,
            can_software_breakpoint: true,
            breakpoint_count: None,
            can_halt: false,
            halt_before_communicating: false,
            has_stack: true,
            page_size: 0,
            can_trace_count: true,
            can_break_on_module_load: true,
            can_break_on_module_unload: true,
            exceptions: Vec::new(),
        }
    }
}
