use std::collections::VecDeque;

use crate::{
    bp::{BreakpointKind, BreakpointManager},
    protocol::{
        file_list_string, process_list_string, register_values_string, CommandCode, Packet,
    },
    session::InformationProvider,
    target::{
        Address, DebugEvent, DebuggerEventSettings, DebuggerOptions, ExceptionAction,
        PlatformBackend, RegisterDescription, TargetEvent, ThreadId,
    },
    AgentResult, ErrorCode,
};

// How many memory ranges the idle refresh cycles through.
const CACHED_READS: usize = 5;

// Window size of the memory search.
const SEARCH_CHUNK: u64 = 1000;

/// Executes peer commands against the platform backend and turns raw
/// target occurrences into peer-visible debug events.
#[derive(Debug)]
pub struct Debugger {
    backend: Box<dyn PlatformBackend>,
    bp: BreakpointManager,
    events: VecDeque<DebugEvent>,
    pid: u32,
    active_thread: ThreadId,
    target_path: Option<String>,
    argv: Vec<String>,
    // The last few requested memory ranges, re-read during idle times.
    cached_reads: Vec<(Address, u64)>,
    cached_index: usize,
    event_settings: DebuggerEventSettings,
}

impl Debugger {
    pub fn new(backend: Box<dyn PlatformBackend>) -> Self {
        Self {
            backend,
            bp: BreakpointManager::new(),
            events: VecDeque::new(),
            pid: 0,
            active_thread: 0,
            target_path: None,
            argv: Vec::new(),
            cached_reads: Vec::new(),
            cached_index: 0,
            event_settings: DebuggerEventSettings::default(),
        }
    }

    /// A debugger that starts the given executable on attach.
    pub fn with_executable(
        backend: Box<dyn PlatformBackend>,
        path: &str,
        argv: Vec<String>,
    ) -> Self {
        let mut debugger = Self::new(backend);
        debugger.target_path = Some(normalize_path(path));
        debugger.argv = argv;
        debugger
    }

    /// A debugger that attaches to the given process id.
    pub fn with_pid(backend: Box<dyn PlatformBackend>, pid: u32) -> Self {
        let mut debugger = Self::new(backend);
        debugger.pid = pid;
        debugger
    }

    /// Whether a debug target has been chosen, by path or by pid.
    pub fn has_target(&self) -> bool {
        self.target_path.is_some() || self.pid != 0
    }

    pub fn active_thread(&self) -> ThreadId {
        self.active_thread
    }

    pub fn event_settings(&self) -> DebuggerEventSettings {
        self.event_settings
    }

    pub fn options(&self) -> DebuggerOptions {
        self.backend.options()
    }

    pub fn address_size(&self) -> u32 {
        self.backend.address_size()
    }

    pub fn register_descriptors(&self) -> Vec<RegisterDescription> {
        self.backend.register_descriptors()
    }

    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.bp
    }

    /// Resolves an exception code to the platform's name for it.
    pub fn exception_name(&self, code: u64) -> String {
        self.backend
            .platform_exceptions()
            .into_iter()
            .find(|e| e.code == code)
            .map(|e| e.name)
            .unwrap_or_default()
    }

    /// Starts the target: spawns the executable if one was selected,
    /// otherwise attaches to the selected process.
    pub fn start(&mut self) -> AgentResult<()> {
        if let Some(path) = self.target_path.clone() {
            debug!("Starting new process {path}");
            self.backend.start(&path, &self.argv)
        } else {
            debug!("Attaching to existing process {}", self.pid);
            self.backend.attach()
        }
    }

    /// Dispatches one parsed packet to its handler. The reply payload is
    /// collected in the provider; errors carry the code for the error
    /// reply.
    pub fn process_packet(
        &mut self,
        packet: &Packet,
        provider: &mut InformationProvider,
    ) -> AgentResult<()> {
        match packet.header.command {
            CommandCode::SetBreakpoints => {
                self.process_set_breakpoints(packet, BreakpointKind::Simple, provider)
            }
            CommandCode::SetEchoBreakpoints => {
                self.process_set_breakpoints(packet, BreakpointKind::Echo, provider)
            }
            CommandCode::SetSteppingBreakpoints => {
                if packet.addresses.is_empty() {
                    warn!("Stepping breakpoint packet without addresses");
                    return Err(ErrorCode::MalformedPacket.into());
                }
                self.process_set_breakpoints(packet, BreakpointKind::Stepping, provider)
            }
            CommandCode::RemoveBreakpoints => {
                let results = self.bp.remove_batch(
                    &mut *self.backend,
                    BreakpointKind::Simple,
                    &packet.addresses,
                );
                provider.set_breakpoint_results(results);
                Ok(())
            }
            CommandCode::RemoveEchoBreakpoints => {
                // Engines that cannot re-arm echo breakpoints have already
                // consumed them; the removal only needs to be confirmed.
                let results = if self.backend.options().can_trace_count {
                    self.bp.remove_batch(
                        &mut *self.backend,
                        BreakpointKind::Echo,
                        &packet.addresses,
                    )
                } else {
                    BreakpointManager::fake_remove_batch(&packet.addresses)
                };
                provider.set_breakpoint_results(results);
                Ok(())
            }
            CommandCode::RemoveSteppingBreakpoints => {
                let results = self.bp.remove_batch(
                    &mut *self.backend,
                    BreakpointKind::Stepping,
                    &packet.addresses,
                );
                provider.set_breakpoint_results(results);
                Ok(())
            }
            CommandCode::Resume => {
                provider.set_tid(self.active_thread);
                self.bp
                    .resume(&mut *self.backend, &mut self.events, self.active_thread)
            }
            CommandCode::Halt => {
                self.backend.halt()?;
                self.bp.clear_removed();
                Ok(())
            }
            CommandCode::Detach => {
                if let Err(e) = self.bp.clear_all(&mut *self.backend) {
                    error!("Couldn't delete all breakpoints before detaching ({e})");
                }
                self.backend.detach()
            }
            CommandCode::Terminate => self.backend.terminate(),
            CommandCode::ClearAll => self.bp.clear_all(&mut *self.backend),
            CommandCode::Registers => {
                debug!("Trying to read the registers of all threads");
                let registers = self.backend.read_registers()?;
                provider.set_text(register_values_string(&registers));
                Ok(())
            }
            CommandCode::ReadMemory => self.process_read_memory(packet, provider),
            CommandCode::WriteMemory => {
                self.backend.write_memory(packet.addresses[0], &packet.data)
            }
            CommandCode::SetRegister => {
                self.backend
                    .set_register(packet.ints[0], packet.ints[1], packet.addresses[0])
            }
            CommandCode::SingleStep => {
                let (tid, address) = self.backend.single_step(self.active_thread)?;
                self.active_thread = tid;
                provider.set_tid(tid);
                provider.add_address(address);
                let registers = self.backend.read_registers()?;
                provider.set_text(register_values_string(&registers));
                Ok(())
            }
            CommandCode::ValidMemory => {
                debug!("Trying to find the valid memory around {:#x}", packet.addresses[0]);
                let (from, to) = self.backend.valid_memory(packet.addresses[0])?;
                provider.add_address(from);
                provider.add_address(to);
                Ok(())
            }
            CommandCode::Search => self.process_search(packet, provider),
            CommandCode::MemoryMap => {
                let addresses = self.backend.mem_map()?;
                for address in addresses {
                    provider.add_address(address);
                }
                Ok(())
            }
            CommandCode::ListProcesses => {
                debug!("Trying to read the process list of the target system");
                let processes = self.backend.list_processes()?;
                provider.set_text(process_list_string(&processes));
                Ok(())
            }
            CommandCode::CancelTargetSelection => Ok(()),
            CommandCode::SelectProcess => {
                self.pid = packet.ints[0];
                Ok(())
            }
            CommandCode::ListFiles => {
                let listing = self.backend.list_files(None)?;
                provider.set_text(file_list_string(&listing));
                Ok(())
            }
            CommandCode::ListFilesPath => {
                let path = String::from_utf8_lossy(&packet.data).into_owned();
                let listing = self.backend.list_files(Some(&path))?;
                provider.set_text(file_list_string(&listing));
                Ok(())
            }
            CommandCode::SelectFile => {
                let path = String::from_utf8_lossy(&packet.data).into_owned();
                self.target_path = Some(normalize_path(&path));
                Ok(())
            }
            CommandCode::SuspendThread => self.backend.suspend_thread(packet.ints[0]),
            CommandCode::ResumeThread => self.backend.resume_thread(packet.ints[0]),
            CommandCode::SetActiveThread => {
                self.active_thread = packet.ints[0];
                Ok(())
            }
            CommandCode::SetBreakpointCondition => {
                self.bp.set_condition(packet.addresses[0], &packet.data)
            }
            CommandCode::SetExceptionSettings => {
                for (code, raw_action) in packet.addresses.iter().zip(&packet.ints) {
                    let action = ExceptionAction::from_u32(*raw_action)
                        .ok_or(ErrorCode::CouldntSetExceptionAction)?;
                    self.backend.set_exception_action(*code, action).map_err(|e| {
                        error!("Can't change action for exception {code:#x}");
                        e
                    })?;
                }
                Ok(())
            }
            CommandCode::SetDebuggerEventSettings => {
                if packet.ints.len() != 2 {
                    warn!(
                        "Event settings packet has invalid number of arguments: {}",
                        packet.ints.len()
                    );
                    return Err(ErrorCode::InvalidPacket.into());
                }
                self.event_settings = DebuggerEventSettings {
                    break_on_module_load: packet.ints[0] != 0,
                    break_on_module_unload: packet.ints[1] != 0,
                };
                Ok(())
            }
            other => {
                error!("Couldn't process packet (unexpected command {other:?})");
                Err(ErrorCode::UnknownCommand.into())
            }
        }
    }

    fn process_set_breakpoints(
        &mut self,
        packet: &Packet,
        kind: BreakpointKind,
        provider: &mut InformationProvider,
    ) -> AgentResult<()> {
        let results = self
            .bp
            .set_batch(&mut *self.backend, kind, &packet.addresses);
        provider.set_breakpoint_results(results);
        Ok(())
    }

    fn process_read_memory(
        &mut self,
        packet: &Packet,
        provider: &mut InformationProvider,
    ) -> AgentResult<()> {
        let address = packet.addresses[0];
        let size = packet.addresses[1];
        debug!("Reading {size} bytes from memory address {address:#x}");
        if size == 0 {
            warn!("Memory read with zero size");
            return Err(ErrorCode::InvalidMemoryRange.into());
        }
        let data = self.backend.read_memory(address, size)?;
        provider.set_memory(data);
        if self.cached_reads.len() == CACHED_READS {
            self.cached_reads.truncate(CACHED_READS - 1);
        }
        self.cached_reads.insert(0, (address, size));
        Ok(())
    }

    fn process_search(
        &mut self,
        packet: &Packet,
        provider: &mut InformationProvider,
    ) -> AgentResult<()> {
        if packet.data.is_empty() {
            warn!("Search packet without a search pattern");
            return Err(ErrorCode::MalformedPacket.into());
        }
        let from = packet.addresses[0];
        let to = packet.addresses[1];
        let found = self.search_data(from, to.saturating_sub(from), &packet.data)?;
        provider.add_address(found);
        Ok(())
    }

    // Searches the pattern in [address, address + size), reading the range
    // in overlapping windows.
    fn search_data(&mut self, address: Address, size: u64, pattern: &[u8]) -> AgentResult<Address> {
        let pattern_len = pattern.len() as u64;
        debug!("Searching data in {size} bytes from address {address:#x}");
        let mut current = address;
        while current + SEARCH_CHUNK < address + size {
            let buffer = self.backend.read_memory(current, SEARCH_CHUNK)?;
            if let Some(position) = find_pattern(&buffer, pattern) {
                return Ok(current + position as u64);
            }
            current += SEARCH_CHUNK - pattern_len;
        }
        let rest = (address + size).saturating_sub(current);
        if rest >= pattern_len {
            let buffer = self.backend.read_memory(current, rest)?;
            if let Some(position) = find_pattern(&buffer, pattern) {
                return Ok(current + position as u64);
            }
        }
        debug!("Couldn't find search pattern");
        Err(ErrorCode::CouldntFindData.into())
    }

    /// Pulls pending occurrences out of the backend and routes them:
    /// stops go through breakpoint dispatch, module unloads prune the
    /// breakpoint tables, everything else becomes a peer event directly.
    pub fn pump_events(&mut self) -> AgentResult<()> {
        self.backend.pump_events()?;
        while let Some(event) = self.backend.next_event() {
            match event {
                TargetEvent::Stopped { tid, addr, code } => {
                    self.active_thread = tid;
                    match self
                        .bp
                        .hit(&mut *self.backend, &mut self.events, addr, tid, true)
                    {
                        Ok(()) => {}
                        Err(e) if e.code() == ErrorCode::NoBreakpointAtAddress => {
                            if let Some(code) = code {
                                self.events.push_back(DebugEvent::Exception {
                                    tid,
                                    addr,
                                    code,
                                });
                            } else if self.backend.options().can_halt {
                                debug!("Stop at {addr:#x} treated as user halt");
                            } else {
                                self.events.push_back(DebugEvent::Exception {
                                    tid,
                                    addr,
                                    code: 0,
                                });
                            }
                        }
                        Err(e) => error!("Breakpoint handler failed ({e})"),
                    }
                }
                TargetEvent::EchoBreakpointRemoved { addr } => {
                    self.events
                        .push_back(DebugEvent::EchoBreakpointRemoved { addr });
                }
                TargetEvent::ThreadCreated { tid, state } => {
                    self.events.push_back(DebugEvent::ThreadCreated { tid, state });
                }
                TargetEvent::ThreadExited { tid } => {
                    self.events.push_back(DebugEvent::ThreadExited { tid });
                }
                TargetEvent::ModuleLoaded { module, tid } => {
                    self.events.push_back(DebugEvent::ModuleLoaded { module, tid });
                }
                TargetEvent::ModuleUnloaded { module } => {
                    self.bp.prune_module(&module);
                    self.events.push_back(DebugEvent::ModuleUnloaded { module });
                }
                TargetEvent::Exception { tid, addr, code } => {
                    self.events.push_back(DebugEvent::Exception { tid, addr, code });
                }
                TargetEvent::ProcessStarted { module, thread } => {
                    self.events
                        .push_back(DebugEvent::ProcessStarted { module, thread });
                }
                TargetEvent::ProcessExited => {
                    self.events.push_back(DebugEvent::ProcessExited);
                }
            }
        }
        Ok(())
    }

    pub fn is_event_available(&self) -> bool {
        !self.events.is_empty()
    }

    /// Removes and returns the oldest pending debug event.
    pub fn take_event(&mut self) -> Option<DebugEvent> {
        self.events.pop_front()
    }

    /// Re-reads one of the recently requested memory ranges, in rotation.
    pub fn reload_memory(&mut self) -> AgentResult<(Address, Vec<u8>)> {
        self.cached_index = (self.cached_index + 1) % CACHED_READS;
        let (address, size) = *self
            .cached_reads
            .get(self.cached_index)
            .ok_or(crate::AgentError::Command(ErrorCode::NothingToRefresh))?;
        let data = self.backend.read_memory(address, size)?;
        Ok((address, data))
    }
}

fn find_pattern(buffer: &[u8], pattern: &[u8]) -> Option<usize> {
    if pattern.is_empty() || buffer.len() < pattern.len() {
        return None;
    }
    buffer.windows(pattern.len()).position(|w| w == pattern)
}

// Collapses duplicated path separators; frontends tend to send those.
fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous = '\0';
    for c in path.chars() {
        if (c == '/' || c == '\\') && c == previous {
            continue;
        }
        out.push(c);
        previous = c;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{find_pattern, normalize_path};

    #[test]
    fn pattern_search() {
        assert_eq!(find_pattern(b"abcdef", b"cd"), Some(2));
        assert_eq!(find_pattern(b"abcdef", b"fg"), None);
        assert_eq!(find_pattern(b"ab", b"abc"), None);
    }

    #[test]
    fn path_normalization() {
        assert_eq!(normalize_path("/tmp//target"), "/tmp/target");
        assert_eq!(normalize_path("C:\\\\bin\\\\app.exe"), "C:\\bin\\app.exe");
        assert_eq!(normalize_path("/already/clean"), "/already/clean");
    }
}
