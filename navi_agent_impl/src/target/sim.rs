//! A simulated target process.
//!
//! Implements the complete backend contract against an in-memory machine:
//! byte-addressed memory regions, threads with a small x86-style register
//! file, overwrite patching with original-byte backup, and scripted debug
//! events. The agent binary serves it when no real platform is selected,
//! and the test suite drives whole sessions against it.
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{
    bp::Breakpoint,
    target::{
        Address, DebugException, DebuggerOptions, ExceptionAction, FileListing, Module,
        ProcessDescription, RegisterContainer, RegisterDescription, RegisterValue, TargetEvent,
        ThreadId, ThreadRegisters, ThreadState,
    },
    AgentResult, ErrorCode,
};

const PATCH_BYTE: u8 = 0xcc;
const REGISTER_NAMES: [&str; 9] = [
    "EAX", "EBX", "ECX", "EDX", "ESI", "EDI", "EBP", "ESP", "EIP",
];
const REG_SP: usize = 7;
const REG_PC: usize = 8;

#[derive(Clone, Debug)]
struct SimThread {
    tid: ThreadId,
    state: ThreadState,
    registers: [Address; REGISTER_NAMES.len()],
}

#[derive(Debug)]
pub struct SimSystem {
    regions: BTreeMap<Address, Vec<u8>>,
    threads: Vec<SimThread>,
    originals: BTreeMap<Address, u8>,
    // Events the engine has produced but the session has not pumped yet.
    staged: VecDeque<TargetEvent>,
    pending: VecDeque<TargetEvent>,
    on_attach: Vec<TargetEvent>,
    on_resume: VecDeque<Vec<TargetEvent>>,
    modules: Vec<Module>,
    processes: Vec<ProcessDescription>,
    files: FileListing,
    options: DebuggerOptions,
    exception_actions: BTreeMap<u64, ExceptionAction>,
    target_path: Option<String>,
    attached: bool,
    running: bool,
    already_stepped: BTreeSet<ThreadId>,
}

impl SimSystem {
    pub fn builder() -> SimSystemBuilder {
        SimSystemBuilder::default()
    }

    fn thread(&self, tid: ThreadId) -> AgentResult<&SimThread> {
        self.threads
            .iter()
            .find(|t| t.tid == tid)
            .ok_or_else(|| ErrorCode::CouldntOpenTargetProcess.into())
    }

    fn thread_mut(&mut self, tid: ThreadId) -> AgentResult<&mut SimThread> {
        self.threads
            .iter_mut()
            .find(|t| t.tid == tid)
            .ok_or_else(|| ErrorCode::CouldntOpenTargetProcess.into())
    }

    fn region_of(&self, address: Address) -> Option<(Address, &Vec<u8>)> {
        let (base, bytes) = self.regions.range(..=address).next_back()?;
        if address < base + bytes.len() as u64 {
            Some((*base, bytes))
        } else {
            None
        }
    }

    fn byte_at(&self, address: Address) -> Option<u8> {
        let (base, bytes) = self.region_of(address)?;
        Some(bytes[(address - base) as usize])
    }

    fn write_byte(&mut self, address: Address, value: u8) -> AgentResult<()> {
        let (base, _) = self
            .region_of(address)
            .ok_or(crate::AgentError::Command(ErrorCode::PageNotWritable))?;
        let bytes = self
            .regions
            .get_mut(&base)
            .ok_or(crate::AgentError::Command(ErrorCode::PageNotWritable))?;
        bytes[(address - base) as usize] = value;
        Ok(())
    }

    /// True while the patch byte sits at the address.
    pub fn is_patched(&self, address: Address) -> bool {
        self.byte_at(address) == Some(PATCH_BYTE) && self.originals.contains_key(&address)
    }

    /// Makes the engine report an event at the next pump.
    pub fn inject(&mut self, event: TargetEvent) {
        self.staged.push_back(event);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn target_path(&self) -> Option<&str> {
        self.target_path.as_deref()
    }

    pub fn loaded_modules(&self) -> &[Module] {
        &self.modules
    }

    /// Threads whose last single step has completed.
    pub fn stepped_threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.already_stepped.iter().copied()
    }

    /// The action configured for an exception code; halting is the default.
    pub fn exception_action(&self, code: u64) -> ExceptionAction {
        self.exception_actions
            .get(&code)
            .copied()
            .unwrap_or(ExceptionAction::Halt)
    }
}

impl crate::target::PlatformBackend for SimSystem {
    fn attach(&mut self) -> AgentResult<()> {
        if self.attached {
            return Err(ErrorCode::CouldntDebugTargetProcess.into());
        }
        self.attached = true;
        self.running = true;
        let scripted = std::mem::take(&mut self.on_attach);
        self.staged.extend(scripted);
        Ok(())
    }

    fn start(&mut self, path: &str, argv: &[String]) -> AgentResult<()> {
        debug!("Starting simulated target {path} with {} arguments", argv.len());
        self.target_path = Some(path.to_string());
        self.attach()
    }

    fn detach(&mut self) -> AgentResult<()> {
        if !self.attached {
            return Err(ErrorCode::CouldntDetach.into());
        }
        self.attached = false;
        Ok(())
    }

    fn terminate(&mut self) -> AgentResult<()> {
        if !self.attached {
            return Err(ErrorCode::CouldntTerminateTargetProcess.into());
        }
        self.attached = false;
        self.running = false;
        Ok(())
    }

    fn halt(&mut self) -> AgentResult<()> {
        self.running = false;
        Ok(())
    }

    fn resume_process(&mut self) -> AgentResult<()> {
        self.running = true;
        for thread in &mut self.threads {
            thread.state = ThreadState::Running;
        }
        if let Some(batch) = self.on_resume.pop_front() {
            self.staged.extend(batch);
        }
        Ok(())
    }

    fn resume_thread(&mut self, tid: ThreadId) -> AgentResult<()> {
        self.thread_mut(tid)
            .map_err(|_| crate::AgentError::Command(ErrorCode::CouldntResumeThread))?
            .state = ThreadState::Running;
        Ok(())
    }

    fn suspend_thread(&mut self, tid: ThreadId) -> AgentResult<()> {
        self.thread_mut(tid)
            .map_err(|_| crate::AgentError::Command(ErrorCode::CouldntSuspendThread))?
            .state = ThreadState::Suspended;
        Ok(())
    }

    fn single_step(&mut self, tid: ThreadId) -> AgentResult<(ThreadId, Address)> {
        // Instructions of the simulated machine are one byte wide.
        let thread = self
            .thread_mut(tid)
            .map_err(|_| crate::AgentError::Command(ErrorCode::CouldntSingleStep))?;
        thread.registers[REG_PC] += 1;
        let pc = thread.registers[REG_PC];
        self.already_stepped.insert(tid);
        Ok((tid, pc))
    }

    fn read_memory(&mut self, address: Address, size: u64) -> AgentResult<Vec<u8>> {
        let (base, bytes) = self
            .region_of(address)
            .ok_or(crate::AgentError::Command(ErrorCode::CouldntReadMemory))?;
        let offset = (address - base) as usize;
        let end = offset
            .checked_add(usize::try_from(size).map_err(|_| ErrorCode::InvalidMemoryRange)?)
            .ok_or(ErrorCode::InvalidMemoryRange)?;
        if end > bytes.len() {
            return Err(ErrorCode::CouldntReadMemory.into());
        }
        Ok(bytes[offset..end].to_vec())
    }

    fn write_memory(&mut self, address: Address, data: &[u8]) -> AgentResult<()> {
        for (i, byte) in data.iter().enumerate() {
            self.write_byte(address + i as u64, *byte)?;
        }
        Ok(())
    }

    fn read_registers(&mut self) -> AgentResult<RegisterContainer> {
        let threads = self
            .threads
            .iter()
            .map(|thread| ThreadRegisters {
                tid: thread.tid,
                registers: REGISTER_NAMES
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        let mut value = RegisterValue::new(name, thread.registers[i]);
                        value.is_pc = i == REG_PC;
                        value.is_sp = i == REG_SP;
                        value
                    })
                    .collect(),
            })
            .collect();
        Ok(RegisterContainer { threads })
    }

    fn set_register(&mut self, tid: ThreadId, index: u32, value: Address) -> AgentResult<()> {
        let thread = self
            .thread_mut(tid)
            .map_err(|_| crate::AgentError::Command(ErrorCode::CouldntWriteRegisters))?;
        let slot = thread
            .registers
            .get_mut(index as usize)
            .ok_or(crate::AgentError::Command(ErrorCode::InvalidRegisterIndex))?;
        *slot = value;
        Ok(())
    }

    fn ip(&mut self, tid: ThreadId) -> AgentResult<Address> {
        Ok(self.thread(tid)?.registers[REG_PC])
    }

    fn set_ip(&mut self, tid: ThreadId, address: Address) -> AgentResult<()> {
        self.thread_mut(tid)?.registers[REG_PC] = address;
        Ok(())
    }

    fn store_original(&mut self, bp: &Breakpoint) -> AgentResult<()> {
        if self.originals.contains_key(&bp.addr) {
            return Ok(());
        }
        let byte = self
            .byte_at(bp.addr)
            .ok_or(crate::AgentError::Command(ErrorCode::CouldntReadMemory))?;
        self.originals.insert(bp.addr, byte);
        Ok(())
    }

    fn set_bp_raw(&mut self, bp: &Breakpoint, _more_to_come: bool) -> AgentResult<()> {
        if !self.originals.contains_key(&bp.addr) {
            return Err(ErrorCode::OriginalDataNotAvailable.into());
        }
        self.write_byte(bp.addr, PATCH_BYTE)
            .map_err(|_| crate::AgentError::Command(ErrorCode::CouldntSetBreakpoint))
    }

    fn remove_bp_raw(&mut self, bp: &Breakpoint, _more_to_come: bool) -> AgentResult<()> {
        let original = *self
            .originals
            .get(&bp.addr)
            .ok_or(crate::AgentError::Command(ErrorCode::OriginalDataNotAvailable))?;
        self.write_byte(bp.addr, original)
            .map_err(|_| crate::AgentError::Command(ErrorCode::CouldntRemoveBreakpoint))
    }

    fn valid_memory(&mut self, anchor: Address) -> AgentResult<(Address, Address)> {
        let (base, bytes) = self
            .region_of(anchor)
            .ok_or(crate::AgentError::Command(ErrorCode::NoValidMemory))?;
        Ok((base, base + bytes.len() as u64))
    }

    fn mem_map(&mut self) -> AgentResult<Vec<Address>> {
        let mut result = Vec::with_capacity(self.regions.len() * 2);
        for (base, bytes) in &self.regions {
            result.push(*base);
            result.push(base + bytes.len() as u64);
        }
        Ok(result)
    }

    fn list_processes(&mut self) -> AgentResult<Vec<ProcessDescription>> {
        Ok(self.processes.clone())
    }

    fn list_files(&mut self, path: Option<&str>) -> AgentResult<FileListing> {
        let mut listing = self.files.clone();
        if let Some(path) = path {
            listing.directory = path.to_string();
        }
        Ok(listing)
    }

    fn pump_events(&mut self) -> AgentResult<()> {
        while let Some(event) = self.staged.pop_front() {
            self.pending.push_back(event);
        }
        Ok(())
    }

    fn next_event(&mut self) -> Option<TargetEvent> {
        let event = self.pending.pop_front();
        if matches!(event, Some(TargetEvent::Stopped { .. })) {
            self.running = false;
        }
        event
    }

    fn register_descriptors(&self) -> Vec<RegisterDescription> {
        REGISTER_NAMES
            .iter()
            .map(|name| RegisterDescription::new(name, 4, true))
            .collect()
    }

    fn address_size(&self) -> u32 {
        32
    }

    fn options(&self) -> DebuggerOptions {
        self.options.clone()
    }

    fn platform_exceptions(&self) -> Vec<DebugException> {
        self.options.exceptions.clone()
    }

    fn set_exception_action(&mut self, code: u64, action: ExceptionAction) -> AgentResult<()> {
        self.exception_actions.insert(code, action);
        for exception in &mut self.options.exceptions {
            if exception.code == code {
                exception.action = action;
            }
        }
        Ok(())
    }

    fn resume_after_stepping(&mut self, _tid: ThreadId, _address: Address) -> AgentResult<()> {
        self.resume_process()
    }
}

/// Assembles a [`SimSystem`].
#[derive(Debug, Default)]
pub struct SimSystemBuilder {
    regions: BTreeMap<Address, Vec<u8>>,
    threads: Vec<SimThread>,
    modules: Vec<Module>,
    processes: Vec<ProcessDescription>,
    files: Option<FileListing>,
    options: Option<DebuggerOptions>,
    on_attach: Vec<TargetEvent>,
    on_resume: VecDeque<Vec<TargetEvent>>,
}

impl SimSystemBuilder {
    pub fn region(mut self, base: Address, bytes: Vec<u8>) -> Self {
        self.regions.insert(base, bytes);
        self
    }

    pub fn thread(mut self, tid: ThreadId, pc: Address) -> Self {
        let mut registers = [0; REGISTER_NAMES.len()];
        registers[REG_PC] = pc;
        self.threads.push(SimThread {
            tid,
            state: ThreadState::Running,
            registers,
        });
        self
    }

    pub fn register(mut self, tid: ThreadId, name: &str, value: Address) -> Self {
        if let Some(thread) = self.threads.iter_mut().find(|t| t.tid == tid) {
            if let Some(index) = REGISTER_NAMES.iter().position(|n| *n == name) {
                thread.registers[index] = value;
            }
        }
        self
    }

    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    pub fn process(mut self, name: &str, pid: u32) -> Self {
        self.processes.push(ProcessDescription {
            name: name.to_string(),
            pid,
        });
        self
    }

    pub fn files(mut self, files: FileListing) -> Self {
        self.files = Some(files);
        self
    }

    pub fn options(mut self, options: DebuggerOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Events delivered right after attach succeeds.
    pub fn on_attach(mut self, events: Vec<TargetEvent>) -> Self {
        self.on_attach = events;
        self
    }

    /// One batch of events per subsequent `resume_process` call, in order.
    pub fn on_resume(mut self, events: Vec<TargetEvent>) -> Self {
        self.on_resume.push_back(events);
        self
    }

    pub fn build(self) -> SimSystem {
        let options = self.options.unwrap_or_else(|| DebuggerOptions {
            can_halt: true,
            page_size: 0x1000,
            exceptions: vec![DebugException {
                name: "SIM_ACCESS_VIOLATION".to_string(),
                code: 0xc000_0005,
                action: ExceptionAction::Halt,
            }],
            ..DebuggerOptions::default()
        });
        let files = self.files.unwrap_or_else(|| FileListing {
            directory: "/".to_string(),
            drives: vec!["/".to_string()],
            directories: Vec::new(),
            files: Vec::new(),
        });
        SimSystem {
            regions: self.regions,
            threads: self.threads,
            originals: BTreeMap::new(),
            staged: VecDeque::new(),
            pending: VecDeque::new(),
            on_attach: self.on_attach,
            on_resume: self.on_resume,
            modules: self.modules,
            processes: self.processes,
            files,
            options,
            exception_actions: BTreeMap::new(),
            target_path: None,
            attached: false,
            running: false,
            already_stepped: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SimSystem;
    use crate::{
        bp::{Breakpoint, BreakpointKind},
        target::PlatformBackend,
    };

    #[test]
    fn patch_and_restore() {
        let mut sim = SimSystem::builder()
            .region(0x1000, vec![0x90, 0x91, 0x92])
            .thread(1, 0x1000)
            .build();
        let bp = Breakpoint::new(0x1001, BreakpointKind::Simple);
        sim.store_original(&bp).unwrap();
        sim.set_bp_raw(&bp, false).unwrap();
        assert!(sim.is_patched(0x1001));
        assert_eq!(sim.read_memory(0x1001, 1).unwrap(), vec![0xcc]);
        sim.remove_bp_raw(&bp, false).unwrap();
        assert_eq!(sim.read_memory(0x1001, 1).unwrap(), vec![0x91]);
    }

    #[test]
    fn patch_without_backup_is_refused() {
        let mut sim = SimSystem::builder()
            .region(0x1000, vec![0x90])
            .thread(1, 0x1000)
            .build();
        let bp = Breakpoint::new(0x1000, BreakpointKind::Simple);
        assert!(sim.set_bp_raw(&bp, false).is_err());
    }

    #[test]
    fn single_step_advances_pc() {
        let mut sim = SimSystem::builder()
            .region(0x1000, vec![0x90; 16])
            .thread(7, 0x1004)
            .build();
        let (tid, pc) = sim.single_step(7).unwrap();
        assert_eq!((tid, pc), (7, 0x1005));
        assert_eq!(sim.ip(7).unwrap(), 0x1005);
    }

    #[test]
    fn reads_outside_regions_fail() {
        let mut sim = SimSystem::builder()
            .region(0x1000, vec![0x90; 16])
            .thread(1, 0x1000)
            .build();
        assert!(sim.read_memory(0x2000, 4).is_err());
        assert!(sim.read_memory(0x100c, 8).is_err());
    }
}
