use std::time::Duration;

use crate::{
    conn::{Transport, TransportReader},
    protocol::{
        exception_raised_string, information_string, module_string, process_start_string,
        register_values_string, reply, CommandCode, Packet,
    },
    session::{Debugger, InformationProvider},
    target::DebugEvent,
    AgentError, AgentResult, ErrorCode,
};

// Sent to the peer right after it connects.
const MAGIC: &[u8; 4] = b"NAVI";

// Idle backoff when neither commands nor events are pending.
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// One debugging session: exactly one peer on one transport driving one
/// debugger.
///
/// Single-threaded and cooperative: incoming commands and pending debug
/// events are multiplexed by round-robin polling; the only blocking points
/// are accepting the peer and reading a packet that has started to arrive.
#[derive(Debug)]
pub struct Session<T: Transport> {
    transport: T,
    debugger: Debugger,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, debugger: Debugger) -> Self {
        Self {
            transport,
            debugger,
        }
    }

    /// Runs the session to completion: accept, handshake, attach or target
    /// selection, then the command/event loop until detach, terminate, or
    /// peer disconnect.
    pub fn run(&mut self) -> AgentResult<()> {
        self.transport.wait_for_peer()?;
        self.transport.send(MAGIC).map_err(|e| {
            error!("Couldn't send the protocol magic");
            e
        })?;

        if self.debugger.has_target() {
            self.attach()?;
        } else {
            debug!("No target selected yet, asking the peer to pick one");
            self.transport
                .send(&reply::simple(CommandCode::RequestTarget, 0))?;
        }

        let result = self.process_packets();
        let _ = self.transport.close();
        match result {
            Err(AgentError::ConnectionClosed) => {
                info!("Peer closed the connection, session finished");
                Ok(())
            }
            other => other,
        }
    }

    // The settings exchange and attach sequence that precedes debugging:
    // query event settings, apply the answer, publish the info string,
    // start the target, confirm.
    fn attach(&mut self) -> AgentResult<()> {
        self.transport
            .send(&reply::simple(CommandCode::QueryDebuggerEventSettings, 0))?;
        match Packet::parse(&mut TransportReader::new(&mut self.transport)) {
            Ok(packet) if packet.header.command == CommandCode::SetDebuggerEventSettings => {
                let mut provider = InformationProvider::new();
                if let Err(e) = self.debugger.process_packet(&packet, &mut provider) {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!("Couldn't apply debugger event settings ({e})");
                }
            }
            Ok(packet) => {
                warn!(
                    "Expected debugger event settings, received {:?}",
                    packet.header.command
                );
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Failed to retrieve the debugger event settings packet ({e})"),
        }

        let info = information_string(
            &self.debugger.options(),
            self.debugger.address_size(),
            &self.debugger.register_descriptors(),
        );
        self.transport
            .send(&reply::data(CommandCode::Info, 0, info.as_bytes()))?;
        debug!("Sent the information string to the peer");

        match self.debugger.start() {
            Ok(()) => {
                debug!("Attaching to the target process succeeded");
                self.transport
                    .send(&reply::simple(CommandCode::AttachSuccess, 0))
            }
            Err(e) => {
                error!("Couldn't attach to the target process ({e})");
                self.transport
                    .send(&reply::simple(CommandCode::AttachError, 0))?;
                Err(e)
            }
        }
    }

    fn process_packets(&mut self) -> AgentResult<()> {
        loop {
            if self.transport.has_data()? {
                let parsed = Packet::parse(&mut TransportReader::new(&mut self.transport));
                let packet = match parsed {
                    Ok(packet) => packet,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        error!("Reading packet failed ({e})");
                        continue;
                    }
                };
                debug!("Processing command {:?}", packet.header.command);

                // Work off events the target produced up to this point
                // before the command changes any state.
                if let Err(e) = self.debugger.pump_events() {
                    warn!("Couldn't read debug events ({e})");
                }

                let mut provider = InformationProvider::new();
                match self.debugger.process_packet(&packet, &mut provider) {
                    Ok(()) => self.send_success_reply(&packet, &provider)?,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        debug!("Couldn't process packet (code {:?})", e.code());
                        self.send_error_reply(&packet, e.code())?;
                    }
                }

                match packet.header.command {
                    CommandCode::Terminate | CommandCode::Detach => return Ok(()),
                    CommandCode::CancelTargetSelection => {
                        debug!("Canceling target selection");
                        return Ok(());
                    }
                    CommandCode::SelectProcess | CommandCode::SelectFile => {
                        debug!("Target selected, attaching");
                        self.attach()?;
                    }
                    _ => {}
                }
            } else if self.debugger.has_target() {
                if !self.debugger.is_event_available() {
                    if let Err(e) = self.debugger.pump_events() {
                        warn!("Couldn't read debug events ({e})");
                    }
                }
                let mut sent_any = false;
                while let Some(event) = self.debugger.take_event() {
                    sent_any = true;
                    let ends_session = matches!(event, DebugEvent::ProcessExited);
                    self.send_debug_event(&event)?;
                    if ends_session {
                        info!("Target process exited, session finished");
                        return Ok(());
                    }
                }
                match self.debugger.reload_memory() {
                    Ok((address, data)) => {
                        self.transport.send(&reply::memory(0, address, &data))?;
                    }
                    Err(e) if e.code() == ErrorCode::NothingToRefresh => {}
                    Err(e) => debug!("Could not update memory ({e})"),
                }
                if !sent_any {
                    std::thread::sleep(IDLE_WAIT);
                }
            } else {
                std::thread::sleep(IDLE_WAIT);
            }
        }
    }

    // The fixed request-to-success-reply mapping. The reply shape decides
    // which provider fields are consumed.
    fn send_success_reply(
        &mut self,
        packet: &Packet,
        provider: &InformationProvider,
    ) -> AgentResult<()> {
        let id = packet.header.id;
        let buf = match packet.header.command {
            CommandCode::SetBreakpoints => reply::breakpoint_results(
                CommandCode::BpSetSucc,
                id,
                provider.breakpoint_results(),
            ),
            CommandCode::SetEchoBreakpoints => reply::breakpoint_results(
                CommandCode::BpEchoSetSucc,
                id,
                provider.breakpoint_results(),
            ),
            CommandCode::SetSteppingBreakpoints => reply::breakpoint_results(
                CommandCode::BpSteppingSetSucc,
                id,
                provider.breakpoint_results(),
            ),
            CommandCode::RemoveBreakpoints => reply::breakpoint_results(
                CommandCode::BpRemSucc,
                id,
                provider.breakpoint_results(),
            ),
            CommandCode::RemoveEchoBreakpoints => reply::breakpoint_results(
                CommandCode::BpEchoRemSucc,
                id,
                provider.breakpoint_results(),
            ),
            CommandCode::RemoveSteppingBreakpoints => reply::breakpoint_results(
                CommandCode::BpSteppingRemSucc,
                id,
                provider.breakpoint_results(),
            ),
            CommandCode::Resume => reply::simple(CommandCode::Resumed, id),
            CommandCode::Halt => reply::integers(CommandCode::HaltedSucc, id, &[0]),
            CommandCode::Detach => reply::simple(CommandCode::DetachSucc, id),
            CommandCode::Terminate => reply::simple(CommandCode::TerminateSucc, id),
            CommandCode::ClearAll => reply::simple(CommandCode::ClearAllSucc, id),
            CommandCode::Registers => reply::data(
                CommandCode::RegistersReply,
                id,
                provider.text().as_bytes(),
            ),
            CommandCode::ReadMemory => {
                reply::memory(id, packet.addresses[0], provider.memory())
            }
            CommandCode::WriteMemory => reply::simple(CommandCode::WriteMemorySucc, id),
            CommandCode::SetRegister => reply::integers(
                CommandCode::SetRegisterSucc,
                id,
                &[packet.ints[0], packet.ints[1]],
            ),
            CommandCode::SingleStep => {
                // An empty register string means there is nothing to
                // report.
                if provider.text().is_empty() {
                    return Ok(());
                }
                let address = provider
                    .address(0)
                    .ok_or(AgentError::Command(ErrorCode::InvalidPacket))?;
                reply::suspended(
                    CommandCode::SingleStepSucc,
                    id,
                    provider.tid(),
                    address,
                    provider.text().as_bytes(),
                )
            }
            CommandCode::ValidMemory => {
                if provider.addresses().len() != 2 {
                    warn!("Not enough information provided for a valid-memory reply");
                    return Err(ErrorCode::InvalidPacket.into());
                }
                reply::addresses(CommandCode::ValidMemorySucc, id, provider.addresses())
            }
            CommandCode::Search => {
                let found = provider.address(0).ok_or_else(|| {
                    warn!("Not enough information provided for a search reply");
                    AgentError::Command(ErrorCode::InvalidPacket)
                })?;
                reply::addresses(CommandCode::SearchSucc, id, &[found])
            }
            CommandCode::MemoryMap => {
                reply::addresses(CommandCode::MemoryMapSucc, id, provider.addresses())
            }
            CommandCode::ListProcesses => reply::data(
                CommandCode::ListProcessesReply,
                id,
                provider.text().as_bytes(),
            ),
            CommandCode::CancelTargetSelection => return Ok(()),
            CommandCode::SelectProcess => reply::simple(CommandCode::SelectProcessSucc, id),
            CommandCode::ListFiles | CommandCode::ListFilesPath => {
                reply::data(CommandCode::ListFilesSucc, id, provider.text().as_bytes())
            }
            CommandCode::SelectFile => reply::simple(CommandCode::SelectFileSucc, id),
            CommandCode::SuspendThread => {
                reply::integers(CommandCode::SuspendThreadSucc, id, &[packet.ints[0]])
            }
            CommandCode::ResumeThread => {
                reply::integers(CommandCode::ResumeThreadSucc, id, &[packet.ints[0]])
            }
            CommandCode::SetActiveThread => {
                reply::integers(CommandCode::SetActiveThreadSucc, id, &[packet.ints[0]])
            }
            CommandCode::SetBreakpointCondition => {
                reply::simple(CommandCode::SetBreakpointConditionSucc, id)
            }
            CommandCode::SetExceptionSettings => {
                reply::simple(CommandCode::SetExceptionSettingsSucc, id)
            }
            CommandCode::SetDebuggerEventSettings => {
                reply::simple(CommandCode::SetDebuggerEventSettingsSucc, id)
            }
            other => {
                error!("No success reply defined for command {other:?}");
                return Err(ErrorCode::UnknownCommand.into());
            }
        };
        self.transport.send(&buf)
    }

    // The fixed request-to-error-reply mapping. Error replies carry the
    // numeric status; the thread commands echo the thread id after it.
    fn send_error_reply(&mut self, packet: &Packet, code: ErrorCode) -> AgentResult<()> {
        let id = packet.header.id;
        let error = code.as_u32();
        let single = |command: CommandCode| reply::integers(command, id, &[error]);
        let buf = match packet.header.command {
            CommandCode::SetBreakpoints => single(CommandCode::BpSetErr),
            CommandCode::SetEchoBreakpoints => single(CommandCode::BpEchoSetErr),
            CommandCode::SetSteppingBreakpoints => single(CommandCode::BpSteppingSetErr),
            CommandCode::RemoveBreakpoints => single(CommandCode::BpRemErr),
            CommandCode::RemoveEchoBreakpoints => single(CommandCode::BpEchoRemErr),
            CommandCode::RemoveSteppingBreakpoints => single(CommandCode::BpSteppingRemErr),
            CommandCode::Resume => single(CommandCode::ResumeErr),
            CommandCode::Halt => single(CommandCode::HaltedErr),
            CommandCode::Detach => single(CommandCode::DetachErr),
            CommandCode::Terminate => single(CommandCode::TerminateErr),
            CommandCode::ClearAll => single(CommandCode::ClearAllErr),
            CommandCode::Registers => single(CommandCode::RegistersErr),
            CommandCode::ReadMemory => single(CommandCode::ReadMemoryErr),
            CommandCode::WriteMemory => single(CommandCode::WriteMemoryErr),
            CommandCode::SetRegister => single(CommandCode::SetRegisterErr),
            CommandCode::SingleStep => single(CommandCode::SingleStepErr),
            CommandCode::ValidMemory => single(CommandCode::ValidMemoryErr),
            CommandCode::Search => single(CommandCode::SearchErr),
            CommandCode::MemoryMap => single(CommandCode::MemoryMapErr),
            CommandCode::ListProcesses => single(CommandCode::SelectProcessErr),
            CommandCode::ListFiles | CommandCode::ListFilesPath => {
                single(CommandCode::ListFilesErr)
            }
            CommandCode::SuspendThread | CommandCode::ResumeThread => reply::integers(
                CommandCode::ResumeThreadErr,
                id,
                &[error, packet.ints[0]],
            ),
            CommandCode::SetActiveThread => reply::integers(
                CommandCode::SetActiveThreadErr,
                id,
                &[error, packet.ints[0]],
            ),
            CommandCode::SetBreakpointCondition => {
                single(CommandCode::SetBreakpointConditionErr)
            }
            CommandCode::SetExceptionSettings => single(CommandCode::SetExceptionSettingsErr),
            CommandCode::SetDebuggerEventSettings => {
                single(CommandCode::SetDebuggerEventSettingsErr)
            }
            other => {
                error!("No error reply defined for command {other:?}");
                return Ok(());
            }
        };
        self.transport.send(&buf)
    }

    // Unsolicited replies: every queued debug event maps to a fixed event
    // command and is sent with id 0.
    fn send_debug_event(&mut self, event: &DebugEvent) -> AgentResult<()> {
        trace!("Sending debug event to the peer: {event:?}");
        let buf = match event {
            DebugEvent::BreakpointHit {
                kind,
                tid,
                registers,
                ..
            } => {
                let command = match kind {
                    crate::bp::BreakpointKind::Simple => CommandCode::BpHit,
                    crate::bp::BreakpointKind::Echo => CommandCode::BpEchoHit,
                    crate::bp::BreakpointKind::Stepping => CommandCode::BpSteppingHit,
                };
                reply::event(
                    command,
                    0,
                    *tid,
                    register_values_string(registers).as_bytes(),
                )
            }
            DebugEvent::EchoBreakpointRemoved { addr } => {
                reply::addresses(CommandCode::BpEchoRemSucc, 0, &[*addr])
            }
            DebugEvent::ProcessExited => reply::simple(CommandCode::ProcessClosed, 0),
            DebugEvent::ThreadCreated { tid, state } => {
                reply::integers(CommandCode::ThreadCreated, 0, &[*tid, *state as u32])
            }
            DebugEvent::ThreadExited { tid } => {
                reply::integers(CommandCode::ThreadClosed, 0, &[*tid])
            }
            DebugEvent::ModuleLoaded { module, tid } => reply::data(
                CommandCode::ModuleLoaded,
                0,
                module_string(module, Some(*tid)).as_bytes(),
            ),
            DebugEvent::ModuleUnloaded { module } => reply::data(
                CommandCode::ModuleUnloaded,
                0,
                module_string(module, None).as_bytes(),
            ),
            DebugEvent::Exception { tid, addr, code } => {
                let name = self.debugger.exception_name(*code);
                reply::data(
                    CommandCode::ExceptionOccured,
                    0,
                    exception_raised_string(*tid, *addr, *code, &name).as_bytes(),
                )
            }
            DebugEvent::ProcessStarted { module, thread } => reply::data(
                CommandCode::ProcessStart,
                0,
                process_start_string(module, thread).as_bytes(),
            ),
        };
        self.transport.send(&buf)
    }
}
