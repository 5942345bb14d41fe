//! The attribute-bearing text payloads the peer consumes: register values,
//! process and file listings, module descriptions, and the per-session
//! information string. The layout is fixed by the peer; every producer of
//! these strings lives here.
use crate::target::{
    Address, DebuggerOptions, FileListing, Module, ProcessDescription, RegisterContainer,
    RegisterDescription, Thread, ThreadId,
};

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// The names and values of all registers of all threads.
pub fn register_values_string(registers: &RegisterContainer) -> String {
    let mut ret = String::from("<Registers>");
    for thread in &registers.threads {
        ret += &format!("<Thread id=\"{}\">", thread.tid);
        for register in &thread.registers {
            ret += &format!(
                "<Register name=\"{}\" value=\"{:x}\" memory=\"{}\"",
                register.name,
                register.value,
                hex::encode(&register.memory)
            );
            if register.is_pc {
                ret += " pc=\"true\"";
            }
            if register.is_sp {
                ret += " sp=\"true\"";
            }
            ret += "/>";
        }
        ret += "</Thread>";
    }
    ret += "</Registers>";
    trace!("Register string created: {ret}");
    ret
}

/// The names and process IDs of all running processes.
pub fn process_list_string(processes: &[ProcessDescription]) -> String {
    let mut ret =
        String::from("<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><Processes>");
    for process in processes {
        ret += &format!(
            "<Process name=\"{}\" pid=\"{}\"/>",
            process.name, process.pid
        );
    }
    ret += "</Processes>";
    trace!("Process list string created: {ret}");
    ret
}

/// Drives, files, and directories of one directory of the target system.
pub fn file_list_string(listing: &FileListing) -> String {
    let mut ret =
        String::from("<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><FileSystem>");
    ret += &format!("<Directory name=\"{}\"/><Drives>", listing.directory);
    for drive in &listing.drives {
        ret += &format!("<Drive name=\"{drive}\"/>");
    }
    ret += "</Drives><Directories>";
    for dir in &listing.directories {
        ret += &format!("<Directory name=\"{dir}\"/>");
    }
    ret += "</Directories><Files>";
    for file in &listing.files {
        ret += &format!("<File name=\"{file}\"/>");
    }
    ret += "</Files></FileSystem>";
    trace!("File system string created: {ret}");
    ret
}

/// Describes a loaded or unloaded module. The thread id is only part of
/// load notifications.
pub fn module_string(module: &Module, tid: Option<ThreadId>) -> String {
    let mut ret = format!(
        "<module name=\"{}\" path=\"{}\" address=\"{}\" size=\"{}\"",
        module.name, module.path, module.base_address, module.size
    );
    if let Some(tid) = tid {
        ret += &format!(" threadid=\"{tid}\"");
    }
    ret += " />";
    ret
}

/// Describes the initial module and thread of a freshly started process.
pub fn process_start_string(module: &Module, thread: &Thread) -> String {
    format!(
        "<processStart><module name=\"{}\" path=\"{}\" address=\"{}\" size=\"{}\" />\
         <thread threadId=\"{}\" threadState=\"{}\" /></processStart>",
        module.name,
        module.path,
        module.base_address,
        module.size,
        thread.tid,
        thread.state as u32
    )
}

/// Describes an exception the debuggee raised.
pub fn exception_raised_string(
    tid: ThreadId,
    address: Address,
    code: u64,
    name: &str,
) -> String {
    format!(
        "<exception_raised threadId=\"{tid}\" address=\"{address}\" \
         exceptionCode=\"{code}\" exceptionName=\"{name}\" />"
    )
}

fn options_string(options: &DebuggerOptions) -> String {
    let mut ret = String::from("<options>");
    ret += &format!(
        "<option name=\"attach\" value=\"{}\" />",
        bool_str(options.can_attach)
    );
    ret += &format!(
        "<option name=\"detach\" value=\"{}\" />",
        bool_str(options.can_detach)
    );
    ret += &format!(
        "<option name=\"terminate\" value=\"{}\" />",
        bool_str(options.can_terminate)
    );
    ret += &format!(
        "<option name=\"memmap\" value=\"{}\" />",
        bool_str(options.can_memmap)
    );
    ret += &format!(
        "<option name=\"multithread\" value=\"{}\" />",
        bool_str(options.can_multithread)
    );
    ret += &format!(
        "<option name=\"validmemory\" value=\"{}\" />",
        bool_str(options.can_valid_memory)
    );
    ret += &format!(
        "<option name=\"softwareBreakpoints\" value=\"{}\" />",
        bool_str(options.can_software_breakpoint)
    );
    ret += &format!(
        "<option name=\"halt\" value=\"{}\" />",
        bool_str(options.can_halt)
    );
    ret += &format!(
        "<option name=\"haltBeforeCommunicating\" value=\"{}\" />",
        bool_str(options.halt_before_communicating)
    );
    // An unlimited breakpoint count is expressed by leaving the option out.
    if let Some(count) = options.breakpoint_count {
        ret += &format!("<option name=\"breakpointCount\" value=\"{count}\" />");
    }
    ret += &format!(
        "<option name=\"hasStack\" value=\"{}\" />",
        bool_str(options.has_stack)
    );
    ret += &format!(
        "<option name=\"pageSize\" value=\"{}\" />",
        options.page_size
    );
    ret += &format!(
        "<option name=\"canBreakOnModuleLoad\" value=\"{}\" />",
        bool_str(options.can_break_on_module_load)
    );
    ret += &format!(
        "<option name=\"canBreakOnModuleUnload\" value=\"{}\" />",
        bool_str(options.can_break_on_module_unload)
    );
    ret += &format!(
        "<option name=\"canTraceCount\" value=\"{}\" />",
        bool_str(options.can_trace_count)
    );
    for exception in &options.exceptions {
        ret += &format!(
            "<option name=\"exception\" exceptionName=\"{}\" exceptionCode=\"{}\" \
             handlingAction=\"{}\" />",
            exception.name, exception.code, exception.action as u32
        );
    }
    ret += "</options>";
    ret
}

fn register_descriptors_string(registers: &[RegisterDescription]) -> String {
    let mut ret = String::from("<registers>");
    for register in registers {
        ret += &format!(
            "<register name=\"{}\" size=\"{}\" editable=\"{}\"/>",
            register.name, register.size, register.editable as u32
        );
    }
    ret += "</registers>";
    ret
}

/// The per-session information string: backend capabilities, register
/// descriptors, and the target address size.
pub fn information_string(
    options: &DebuggerOptions,
    address_size: u32,
    registers: &[RegisterDescription],
) -> String {
    let ret = format!(
        "<info>{}{}<size>{address_size}</size></info>",
        options_string(options),
        register_descriptors_string(registers)
    );
    trace!("Created info string {ret}");
    ret
}
