use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{
    bp::{Breakpoint, BreakpointKind, ConditionTree},
    target::{Address, DebugEvent, Module, PlatformBackend, ThreadId},
    AgentResult, ErrorCode,
};

/// Owner of all breakpoint state of a session.
///
/// For every address at most one of the three live sets holds it. The
/// "recently removed" sets resolve the race between a remove command and a
/// hit event for the same address that the OS had already queued: such a
/// hit must still be dispatched through the regular handler for its former
/// kind instead of being reported as an unknown breakpoint.
#[derive(Debug, Default)]
pub struct BreakpointManager {
    simple: BTreeSet<Address>,
    echo: BTreeSet<Address>,
    stepping: BTreeSet<Address>,
    removed_simple: BTreeSet<Address>,
    removed_echo: BTreeSet<Address>,
    removed_stepping: BTreeSet<Address>,

    // Per thread, the simple breakpoint it is currently parked on.
    current_hit: BTreeMap<ThreadId, Address>,

    conditions: BTreeMap<Address, ConditionTree>,
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, address: Address, kind: BreakpointKind) -> bool {
        self.live_set(kind).contains(&address)
    }

    pub fn recently_removed(&self, address: Address, kind: BreakpointKind) -> bool {
        self.removed_set(kind).contains(&address)
    }

    pub fn current_hit_of(&self, tid: ThreadId) -> Option<Address> {
        self.current_hit.get(&tid).copied()
    }

    pub fn parked_thread_count(&self) -> usize {
        self.current_hit.len()
    }

    fn live_set(&self, kind: BreakpointKind) -> &BTreeSet<Address> {
        match kind {
            BreakpointKind::Simple => &self.simple,
            BreakpointKind::Echo => &self.echo,
            BreakpointKind::Stepping => &self.stepping,
        }
    }

    fn live_set_mut(&mut self, kind: BreakpointKind) -> &mut BTreeSet<Address> {
        match kind {
            BreakpointKind::Simple => &mut self.simple,
            BreakpointKind::Echo => &mut self.echo,
            BreakpointKind::Stepping => &mut self.stepping,
        }
    }

    fn removed_set(&self, kind: BreakpointKind) -> &BTreeSet<Address> {
        match kind {
            BreakpointKind::Simple => &self.removed_simple,
            BreakpointKind::Echo => &self.removed_echo,
            BreakpointKind::Stepping => &self.removed_stepping,
        }
    }

    // Moves a breakpoint from its live set to the matching removed set.
    fn remove_from_list(&mut self, address: Address, kind: BreakpointKind) {
        if !self.has(address, kind) {
            error!("Trying to remove non-existing breakpoint {address:#x} ({kind:?})");
            return;
        }
        self.live_set_mut(kind).remove(&address);
        match kind {
            BreakpointKind::Simple => self.removed_simple.insert(address),
            BreakpointKind::Echo => self.removed_echo.insert(address),
            BreakpointKind::Stepping => self.removed_stepping.insert(address),
        };
    }

    // Backs up the original bytes, patches the debuggee, and records the
    // breakpoint. Failures leave the tables unchanged.
    fn set_one(
        &mut self,
        backend: &mut dyn PlatformBackend,
        address: Address,
        kind: BreakpointKind,
        more_to_come: bool,
    ) -> Result<(), ErrorCode> {
        debug!("Setting {kind:?} breakpoint at {address:#x}");
        if self.has(address, kind) {
            warn!("Duplicate breakpoint at {address:#x}");
            return Err(ErrorCode::DuplicateBreakpoint);
        }
        let bp = Breakpoint::new(address, kind);
        backend.store_original(&bp).map_err(|e| {
            error!("Couldn't store original data at {address:#x}");
            e.code()
        })?;
        backend.set_bp_raw(&bp, more_to_come).map_err(|e| {
            error!("Couldn't set breakpoint at {address:#x} in the target process");
            e.code()
        })?;
        self.live_set_mut(kind).insert(address);
        Ok(())
    }

    fn code_of(result: Result<(), ErrorCode>) -> u32 {
        match result {
            Ok(()) => 0,
            Err(code) => code.as_u32(),
        }
    }

    /// Installs a batch of breakpoints of one kind, applying the overlap
    /// policy per address. Returns one (address, code) pair per requested
    /// address, code 0 meaning success.
    pub fn set_batch(
        &mut self,
        backend: &mut dyn PlatformBackend,
        kind: BreakpointKind,
        addresses: &[Address],
    ) -> Vec<(Address, u32)> {
        let mut results = Vec::with_capacity(addresses.len());
        let to_set = addresses.len();
        for (counter, address) in addresses.iter().copied().enumerate() {
            let more = counter != to_set - 1;
            let code = match kind {
                BreakpointKind::Simple => {
                    if self.has(address, BreakpointKind::Echo) {
                        // Upgrade: the patch byte stays, only the class
                        // changes.
                        self.remove_from_list(address, BreakpointKind::Echo);
                        self.simple.insert(address);
                        Ok(())
                    } else if self.has(address, BreakpointKind::Stepping) {
                        self.remove_from_list(address, BreakpointKind::Stepping);
                        self.simple.insert(address);
                        Ok(())
                    } else {
                        self.set_one(backend, address, kind, more)
                    }
                }
                BreakpointKind::Echo => {
                    if self.has(address, BreakpointKind::Simple)
                        || self.has(address, BreakpointKind::Stepping)
                    {
                        Err(ErrorCode::HigherBreakpointExists)
                    } else {
                        self.set_one(backend, address, kind, more)
                    }
                }
                BreakpointKind::Stepping => {
                    if self.has(address, BreakpointKind::Simple) {
                        Err(ErrorCode::HigherBreakpointExists)
                    } else if self.has(address, BreakpointKind::Echo) {
                        self.remove_from_list(address, BreakpointKind::Echo);
                        self.stepping.insert(address);
                        Ok(())
                    } else {
                        self.set_one(backend, address, kind, more)
                    }
                }
            };
            results.push((address, Self::code_of(code)));
        }
        results
    }

    /// Removes a batch of breakpoints of one kind. Every removed address
    /// moves to the "recently removed" set, and threads parked on it are
    /// unparked.
    pub fn remove_batch(
        &mut self,
        backend: &mut dyn PlatformBackend,
        kind: BreakpointKind,
        addresses: &[Address],
    ) -> Vec<(Address, u32)> {
        let mut results = Vec::with_capacity(addresses.len());
        let to_remove = addresses.len();
        let mut removed = 0_usize;
        for address in addresses.iter().copied() {
            if !self.has(address, kind) {
                debug!("No {kind:?} breakpoint set at address {address:#x}");
                results.push((address, ErrorCode::InvalidBreakpoint.as_u32()));
                continue;
            }
            let bp = Breakpoint::new(address, kind);
            removed += 1;
            if let Err(e) = backend.remove_bp_raw(&bp, removed != to_remove) {
                error!("Couldn't remove breakpoint {address:#x} from the target process");
                results.push((address, e.code().as_u32()));
                continue;
            }
            self.remove_from_list(address, kind);
            self.current_hit.retain(|_, hit| *hit != address);
            if kind == BreakpointKind::Simple {
                self.conditions.remove(&address);
            }
            results.push((address, 0));
        }
        results
    }

    /// Pretends to remove breakpoints. Used for echo breakpoints when the
    /// backend cannot re-arm them: the hit already consumed the breakpoint,
    /// so there is nothing left to remove in the target.
    pub fn fake_remove_batch(addresses: &[Address]) -> Vec<(Address, u32)> {
        addresses.iter().map(|address| (*address, 0)).collect()
    }

    /// Removes all breakpoints of one kind from the target process.
    pub fn clear_kind(
        &mut self,
        backend: &mut dyn PlatformBackend,
        kind: BreakpointKind,
    ) -> AgentResult<()> {
        let addresses: Vec<Address> = self.live_set(kind).iter().copied().collect();
        let max_remove = addresses.len();
        let mut result = Ok(());
        for (counter, address) in addresses.into_iter().enumerate() {
            let bp = Breakpoint::new(address, kind);
            match backend.remove_bp_raw(&bp, counter != max_remove - 1) {
                Ok(()) => self.remove_from_list(address, kind),
                Err(e) => {
                    error!("Couldn't remove breakpoint {address:#x}");
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Removes every breakpoint of every kind; issued on detach, terminate
    /// and clear-all commands.
    pub fn clear_all(&mut self, backend: &mut dyn PlatformBackend) -> AgentResult<()> {
        let echo = self.clear_kind(backend, BreakpointKind::Echo);
        let stepping = self.clear_kind(backend, BreakpointKind::Stepping);
        let simple = self.clear_kind(backend, BreakpointKind::Simple);
        self.conditions.clear();
        echo.and(stepping).and(simple)
    }

    /// Forgets the "recently removed" bookkeeping. Called at natural
    /// resynchronization points to bound its size.
    pub fn clear_removed(&mut self) {
        self.removed_simple.clear();
        self.removed_echo.clear();
        self.removed_stepping.clear();
    }

    /// Drops every breakpoint that lies inside an unloaded module. No
    /// per-breakpoint event is generated; the unload event itself is the
    /// notification.
    pub fn prune_module(&mut self, module: &Module) {
        for set in [
            &mut self.simple,
            &mut self.echo,
            &mut self.stepping,
            &mut self.removed_simple,
            &mut self.removed_echo,
            &mut self.removed_stepping,
        ] {
            set.retain(|address| !module.contains(*address));
        }
        self.conditions.retain(|address, _| !module.contains(*address));
    }

    /// Attaches a condition to the simple breakpoint at the address,
    /// replacing any previous one. An empty payload clears the condition.
    pub fn set_condition(&mut self, address: Address, data: &[u8]) -> AgentResult<()> {
        if !self.has(address, BreakpointKind::Simple) {
            return Err(ErrorCode::InvalidBreakpoint.into());
        }
        self.conditions.remove(&address);
        if !data.is_empty() {
            debug!("Received a new breakpoint condition for breakpoint {address:#x}");
            let tree = ConditionTree::parse(data)?;
            self.conditions.insert(address, tree);
        }
        Ok(())
    }

    /// Dispatches a stop reported by the backend at `address` in thread
    /// `tid` to the matching breakpoint class.
    pub fn hit(
        &mut self,
        backend: &mut dyn PlatformBackend,
        events: &mut VecDeque<DebugEvent>,
        address: Address,
        tid: ThreadId,
        resume_on_echo: bool,
    ) -> AgentResult<()> {
        if self.has(address, BreakpointKind::Echo) {
            self.echo_hit(backend, events, address, tid, true, resume_on_echo)
        } else if self.has(address, BreakpointKind::Stepping) {
            self.stepping_hit(backend, events, address, tid, true)
        } else if self.has(address, BreakpointKind::Simple)
            || self.removed_simple.contains(&address)
        {
            self.simple_hit(backend, events, address, tid, true)
        } else if self.removed_echo.contains(&address) {
            self.echo_hit(backend, events, address, tid, true, resume_on_echo)
        } else if self.removed_stepping.contains(&address) {
            self.stepping_hit(backend, events, address, tid, true)
        } else {
            debug!("No breakpoint found at the reported address {address:#x}");
            Err(ErrorCode::NoBreakpointAtAddress.into())
        }
    }

    // A simple breakpoint fired: rewind the pc, snapshot registers,
    // evaluate the condition, unpatch so the original instruction can
    // execute, then either report the hit or step the thread transparently.
    fn simple_hit(
        &mut self,
        backend: &mut dyn PlatformBackend,
        events: &mut VecDeque<DebugEvent>,
        address: Address,
        tid: ThreadId,
        correct_pc: bool,
    ) -> AgentResult<()> {
        if !self.has(address, BreakpointKind::Simple) && !self.removed_simple.contains(&address) {
            error!("Non-existing breakpoint at address {address:#x} was hit");
            return Err(ErrorCode::NoBreakpointAtAddress.into());
        }
        let mut pre_error = None;
        if correct_pc {
            if let Err(e) = backend.set_ip(tid, address) {
                error!("Couldn't set instruction pointer to address {address:#x}");
                pre_error = Some(e);
            }
        }
        let registers = if pre_error.is_none() {
            match backend.read_registers() {
                Ok(registers) => registers,
                Err(e) => {
                    error!("Couldn't read register values");
                    pre_error = Some(e);
                    crate::target::RegisterContainer::default()
                }
            }
        } else {
            crate::target::RegisterContainer::default()
        };

        let condition_met = if pre_error.is_some() {
            true
        } else if let Some(tree) = self.conditions.get(&address) {
            debug!("Hit breakpoint is conditional");
            let met = tree.is_met(tid, &registers, &mut |addr, size| {
                backend.read_memory(addr, size)
            });
            debug!(
                "Breakpoint condition was {}",
                if met { "met" } else { "not met" }
            );
            met
        } else {
            true
        };

        self.current_hit.insert(tid, address);
        backend
            .remove_bp_raw(&Breakpoint::new(address, BreakpointKind::Simple), false)
            .map_err(|e| {
                error!("Couldn't remove breakpoint at address {address:#x}");
                e
            })?;
        if let Some(e) = pre_error {
            return Err(e);
        }
        if condition_met {
            events.push_back(DebugEvent::BreakpointHit {
                kind: BreakpointKind::Simple,
                addr: address,
                tid,
                registers,
            });
            Ok(())
        } else {
            self.resume(backend, events, tid)
        }
    }

    // An echo breakpoint fired. The live entry is consumed by the hit; the
    // process is resumed automatically only when the backend supports an
    // unlimited breakpoint count, otherwise the peer simulates trace mode
    // with the limited set.
    fn echo_hit(
        &mut self,
        backend: &mut dyn PlatformBackend,
        events: &mut VecDeque<DebugEvent>,
        address: Address,
        tid: ThreadId,
        correct_pc: bool,
        do_resume: bool,
    ) -> AgentResult<()> {
        let exists = self.has(address, BreakpointKind::Echo);
        if !exists && !self.removed_echo.contains(&address) {
            error!("Non-existing echo breakpoint at address {address:#x} was hit");
            return Err(ErrorCode::NoBreakpointAtAddress.into());
        }
        if exists {
            backend
                .remove_bp_raw(&Breakpoint::new(address, BreakpointKind::Echo), false)
                .map_err(|e| {
                    error!("Couldn't remove echo breakpoint at address {address:#x}");
                    e
                })?;
            self.echo.remove(&address);
        }
        if correct_pc {
            backend.set_ip(tid, address).map_err(|e| {
                error!("Couldn't set instruction pointer to address {address:#x}");
                e
            })?;
        }
        let registers = backend.read_registers().map_err(|e| {
            error!("Couldn't read register values");
            e
        })?;
        events.push_back(DebugEvent::BreakpointHit {
            kind: BreakpointKind::Echo,
            addr: address,
            tid,
            registers,
        });

        let options = backend.options();
        if do_resume && options.breakpoint_count.is_none() {
            if exists && options.can_trace_count {
                match backend.single_step(tid) {
                    Ok(_) => {
                        if let Err(code) =
                            self.set_one(backend, address, BreakpointKind::Echo, false)
                        {
                            warn!("Couldn't re-arm echo breakpoint at {address:#x} (code {code:?})");
                        }
                    }
                    Err(e) => warn!("Couldn't step over echo breakpoint at {address:#x} ({e})"),
                }
            }
            backend.resume_process().map_err(|e| {
                error!("Couldn't resume target process");
                e
            })?;
        }
        Ok(())
    }

    // A stepping breakpoint fired: all stepping breakpoints are one batch
    // belonging to a single step-over, so every one of them is cleared
    // before the event goes out.
    fn stepping_hit(
        &mut self,
        backend: &mut dyn PlatformBackend,
        events: &mut VecDeque<DebugEvent>,
        address: Address,
        tid: ThreadId,
        correct_pc: bool,
    ) -> AgentResult<()> {
        if !self.has(address, BreakpointKind::Stepping)
            && !self.removed_stepping.contains(&address)
        {
            error!("Non-existing stepping breakpoint at address {address:#x} was hit");
            return Err(ErrorCode::NoBreakpointAtAddress.into());
        }
        if let Err(e) = self.clear_kind(backend, BreakpointKind::Stepping) {
            warn!("Couldn't clear all stepping breakpoints ({e})");
        }
        if correct_pc {
            backend.set_ip(tid, address).map_err(|e| {
                error!("Couldn't set instruction pointer to address {address:#x}");
                e
            })?;
        }
        let registers = backend.read_registers().map_err(|e| {
            error!("Couldn't read register values");
            e
        })?;
        events.push_back(DebugEvent::BreakpointHit {
            kind: BreakpointKind::Stepping,
            addr: address,
            tid,
            registers,
        });
        Ok(())
    }

    /// Resumes the given thread. A thread parked on a simple breakpoint is
    /// first stepped over the original instruction, the breakpoint is
    /// re-armed, and the platform hook finishes the resume. A step that
    /// lands on a stepping breakpoint is rerouted through regular hit
    /// dispatch, because some debug engines swallow that exception.
    pub fn resume(
        &mut self,
        backend: &mut dyn PlatformBackend,
        events: &mut VecDeque<DebugEvent>,
        tid: ThreadId,
    ) -> AgentResult<()> {
        let Some(address) = self.current_hit_of(tid) else {
            return backend.resume_process().map_err(|e| {
                error!("Couldn't resume target process");
                e
            });
        };
        if !self.has(address, BreakpointKind::Simple) {
            error!("Could not find breakpoint at address {address:#x}");
            let _ = backend.resume_process();
            return Err(ErrorCode::NoBreakpointAtAddress.into());
        }
        let (_, stepped_to) = backend.single_step(tid).map_err(|e| {
            error!("Couldn't perform a single step");
            e
        })?;
        self.current_hit.remove(&tid);
        backend
            .set_bp_raw(&Breakpoint::new(address, BreakpointKind::Simple), false)
            .map_err(|e| {
                error!("Couldn't re-arm breakpoint at {address:#x}");
                e
            })?;
        if self.has(stepped_to, BreakpointKind::Stepping) {
            backend.remove_bp_raw(
                &Breakpoint::new(stepped_to, BreakpointKind::Stepping),
                false,
            )?;
            self.hit(backend, events, stepped_to, tid, true)
        } else {
            backend.resume_after_stepping(tid, stepped_to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BreakpointManager;
    use crate::{
        bp::BreakpointKind,
        target::{DebugEvent, SimSystem},
        ErrorCode,
    };
    use std::collections::VecDeque;

    fn sim() -> SimSystem {
        SimSystem::builder()
            .region(0x1000, vec![0x90; 0x100])
            .thread(1, 0x1000)
            .build()
    }

    #[test]
    fn disjointness_is_preserved_by_upgrades() {
        let mut backend = sim();
        let mut mgr = BreakpointManager::new();
        let results = mgr.set_batch(&mut backend, BreakpointKind::Echo, &[0x1010]);
        assert_eq!(results, vec![(0x1010, 0)]);
        let results = mgr.set_batch(&mut backend, BreakpointKind::Simple, &[0x1010]);
        assert_eq!(results, vec![(0x1010, 0)]);
        assert!(mgr.has(0x1010, BreakpointKind::Simple));
        assert!(!mgr.has(0x1010, BreakpointKind::Echo));
        assert!(mgr.recently_removed(0x1010, BreakpointKind::Echo));
    }

    #[test]
    fn echo_over_simple_is_rejected() {
        let mut backend = sim();
        let mut mgr = BreakpointManager::new();
        mgr.set_batch(&mut backend, BreakpointKind::Simple, &[0x1010]);
        let results = mgr.set_batch(&mut backend, BreakpointKind::Echo, &[0x1010]);
        assert_eq!(
            results,
            vec![(0x1010, ErrorCode::HigherBreakpointExists.as_u32())]
        );
        assert!(mgr.has(0x1010, BreakpointKind::Simple));
    }

    #[test]
    fn duplicate_set_leaves_state_unchanged() {
        let mut backend = sim();
        let mut mgr = BreakpointManager::new();
        mgr.set_batch(&mut backend, BreakpointKind::Simple, &[0x1010]);
        let results = mgr.set_batch(&mut backend, BreakpointKind::Simple, &[0x1010]);
        assert_eq!(
            results,
            vec![(0x1010, ErrorCode::DuplicateBreakpoint.as_u32())]
        );
        assert!(mgr.has(0x1010, BreakpointKind::Simple));
    }

    #[test]
    fn remove_of_nonexistent_breakpoint() {
        let mut backend = sim();
        let mut mgr = BreakpointManager::new();
        let results = mgr.remove_batch(&mut backend, BreakpointKind::Simple, &[0x1010]);
        assert_eq!(
            results,
            vec![(0x1010, ErrorCode::InvalidBreakpoint.as_u32())]
        );
    }

    #[test]
    fn batch_with_one_failure_itemizes_results() {
        let mut backend = sim();
        let mut mgr = BreakpointManager::new();
        mgr.set_batch(&mut backend, BreakpointKind::Simple, &[0x1010]);
        let results = mgr.set_batch(
            &mut backend,
            BreakpointKind::Simple,
            &[0x1010, 0x1020, 0x1030],
        );
        assert_eq!(
            results,
            vec![
                (0x1010, ErrorCode::DuplicateBreakpoint.as_u32()),
                (0x1020, 0),
                (0x1030, 0),
            ]
        );
    }

    #[test]
    fn removed_breakpoint_hit_still_dispatches() {
        let mut backend = sim();
        let mut mgr = BreakpointManager::new();
        let mut events = VecDeque::new();
        mgr.set_batch(&mut backend, BreakpointKind::Simple, &[0x1010]);
        mgr.remove_batch(&mut backend, BreakpointKind::Simple, &[0x1010]);
        assert!(mgr.recently_removed(0x1010, BreakpointKind::Simple));

        mgr.hit(&mut backend, &mut events, 0x1010, 1, true).unwrap();
        assert!(matches!(
            events.pop_front(),
            Some(DebugEvent::BreakpointHit {
                kind: BreakpointKind::Simple,
                addr: 0x1010,
                tid: 1,
                ..
            })
        ));
    }

    #[test]
    fn unknown_hit_is_reported() {
        let mut backend = sim();
        let mut mgr = BreakpointManager::new();
        let mut events = VecDeque::new();
        assert!(mgr
            .hit(&mut backend, &mut events, 0x1010, 1, true)
            .is_err());
        assert!(events.is_empty());
    }

    #[test]
    fn stepping_hit_clears_all_stepping_breakpoints() {
        let mut backend = sim();
        let mut mgr = BreakpointManager::new();
        let mut events = VecDeque::new();
        mgr.set_batch(
            &mut backend,
            BreakpointKind::Stepping,
            &[0x1010, 0x1020, 0x1030],
        );
        mgr.hit(&mut backend, &mut events, 0x1020, 1, true).unwrap();
        for addr in [0x1010, 0x1020, 0x1030] {
            assert!(!mgr.has(addr, BreakpointKind::Stepping));
            assert!(mgr.recently_removed(addr, BreakpointKind::Stepping));
        }
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn module_unload_prunes_by_range() {
        let mut backend = sim();
        let mut mgr = BreakpointManager::new();
        mgr.set_batch(&mut backend, BreakpointKind::Simple, &[0x1010, 0x1080]);
        let module = crate::target::Module {
            name: "m".to_string(),
            path: "/m".to_string(),
            base_address: 0x1000,
            size: 0x40,
        };
        mgr.prune_module(&module);
        assert!(!mgr.has(0x1010, BreakpointKind::Simple));
        assert!(mgr.has(0x1080, BreakpointKind::Simple));
    }
}
