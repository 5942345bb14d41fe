
use navi_agent::{
    target::{DebuggerOptions, SimSystem, SimSystemBuilder, TargetEvent},
    BreakpointKind, CommandCode, Debugger, DebugEvent, ErrorCode, InformationProvider,
};
use test_utils::packet;

fn sim_builder() -> SimSystemBuilder {
    SimSystem::builder()
        .region(0x1000, vec![0x90; 0x100])
        .thread(1, 0x1000)
}

fn started(sim: SimSystem) -> Debugger {
    let mut debugger = Debugger::with_executable(Box::new(sim), "/bin/target", vec![]);
    debugger.start().unwrap();
    debugger
}

fn run_ok(debugger: &mut Debugger, p: &navi_agent::Packet) -> InformationProvider {
    let mut provider = InformationProvider::new();
    debugger.process_packet(p, &mut provider).unwrap();
    provider
}

fn read_byte(debugger: &mut Debugger, addr: u64) -> u8 {
    let provider = run_ok(
        debugger,
        &packet(CommandCode::ReadMemory, vec![], vec![addr, 1], vec![]),
    );
    provider.memory()[0]
}

#[test]
fn set_hit_resume_restores_and_rearms() {
    let _log_handle = test_utils::init_logger();
    let mut debugger = started(
        sim_builder()
            .on_resume(vec![TargetEvent::Stopped {
                tid: 1,
                addr: 0x1010,
                code: None,
            }])
            .build(),
    );

    let provider = run_ok(
        &mut debugger,
        &packet(CommandCode::SetBreakpoints, vec![1], vec![0x1010], vec![]),
    );
    assert_eq!(provider.breakpoint_results(), &[(0x1010, 0)]);
    assert_eq!(read_byte(&mut debugger, 0x1010), 0xcc);

    run_ok(&mut debugger, &packet(CommandCode::Resume, vec![], vec![], vec![]));
    debugger.pump_events().unwrap();

    match debugger.take_event().unwrap() {
        DebugEvent::BreakpointHit {
            kind: BreakpointKind::Simple,
            addr: 0x1010,
            tid: 1,
            registers,
        } => {
            // the pc was rewound to the breakpoint address
            assert_eq!(registers.value_of(1, "EIP"), Some(0x1010));
        }
        other => panic!("unexpected event {other:?}"),
    }
    // parked: the original byte is back in place
    assert_eq!(read_byte(&mut debugger, 0x1010), 0x90);
    assert_eq!(debugger.breakpoints().current_hit_of(1), Some(0x1010));

    run_ok(&mut debugger, &packet(CommandCode::Resume, vec![], vec![], vec![]));
    // stepped over and re-armed
    assert_eq!(read_byte(&mut debugger, 0x1010), 0xcc);
    assert_eq!(debugger.breakpoints().current_hit_of(1), None);
}

#[test]
fn echo_upgrade_to_simple() {
    let mut debugger = started(sim_builder().build());
    let provider = run_ok(
        &mut debugger,
        &packet(CommandCode::SetEchoBreakpoints, vec![1], vec![0x1000], vec![]),
    );
    assert_eq!(provider.breakpoint_results(), &[(0x1000, 0)]);
    let provider = run_ok(
        &mut debugger,
        &packet(CommandCode::SetBreakpoints, vec![1], vec![0x1000], vec![]),
    );
    assert_eq!(provider.breakpoint_results(), &[(0x1000, 0)]);
    assert!(debugger.breakpoints().has(0x1000, BreakpointKind::Simple));
    assert!(!debugger.breakpoints().has(0x1000, BreakpointKind::Echo));
}

#[test]
fn batch_set_with_one_failure() {
    let mut debugger = started(sim_builder().build());
    run_ok(
        &mut debugger,
        &packet(CommandCode::SetBreakpoints, vec![1], vec![0x1010], vec![]),
    );
    let provider = run_ok(
        &mut debugger,
        &packet(
            CommandCode::SetBreakpoints,
            vec![3],
            vec![0x1010, 0x1020, 0x1030],
            vec![],
        ),
    );
    assert_eq!(
        provider.breakpoint_results(),
        &[
            (0x1010, ErrorCode::DuplicateBreakpoint.as_u32()),
            (0x1020, 0),
            (0x1030, 0),
        ]
    );
}

#[test]
fn echo_hit_reports_and_resumes_on_its_own() {
    let mut debugger = started(
        sim_builder()
            .on_resume(vec![TargetEvent::Stopped {
                tid: 1,
                addr: 0x1020,
                code: None,
            }])
            .build(),
    );
    run_ok(
        &mut debugger,
        &packet(CommandCode::SetEchoBreakpoints, vec![1], vec![0x1020], vec![]),
    );
    run_ok(&mut debugger, &packet(CommandCode::Resume, vec![], vec![], vec![]));
    debugger.pump_events().unwrap();
    assert!(matches!(
        debugger.take_event().unwrap(),
        DebugEvent::BreakpointHit {
            kind: BreakpointKind::Echo,
            addr: 0x1020,
            tid: 1,
            ..
        }
    ));
    // re-armed after the self-resume, and no thread is parked
    assert!(debugger.breakpoints().has(0x1020, BreakpointKind::Echo));
    assert_eq!(debugger.breakpoints().parked_thread_count(), 0);
}

#[test]
fn echo_remove_is_faked_without_trace_count() {
    let options = DebuggerOptions {
        can_trace_count: false,
        breakpoint_count: Some(4),
        ..DebuggerOptions::default()
    };
    let mut debugger = started(sim_builder().options(options).build());
    // never set; the removal is confirmed anyway
    let provider = run_ok(
        &mut debugger,
        &packet(
            CommandCode::RemoveEchoBreakpoints,
            vec![2],
            vec![0x1010, 0x1020],
            vec![],
        ),
    );
    assert_eq!(provider.breakpoint_results(), &[(0x1010, 0), (0x1020, 0)]);
}

#[test]
fn remove_scrubs_parked_threads() {
    let mut debugger = started(
        sim_builder()
            .on_resume(vec![TargetEvent::Stopped {
                tid: 1,
                addr: 0x1010,
                code: None,
            }])
            .build(),
    );
    run_ok(
        &mut debugger,
        &packet(CommandCode::SetBreakpoints, vec![1], vec![0x1010], vec![]),
    );
    run_ok(&mut debugger, &packet(CommandCode::Resume, vec![], vec![], vec![]));
    debugger.pump_events().unwrap();
    debugger.take_event().unwrap();
    assert_eq!(debugger.breakpoints().current_hit_of(1), Some(0x1010));

    let provider = run_ok(
        &mut debugger,
        &packet(CommandCode::RemoveBreakpoints, vec![1], vec![0x1010], vec![]),
    );
    assert_eq!(provider.breakpoint_results(), &[(0x1010, 0)]);
    assert_eq!(debugger.breakpoints().current_hit_of(1), None);
    assert!(debugger
        .breakpoints()
        .recently_removed(0x1010, BreakpointKind::Simple));
}

#[test]
fn step_onto_stepping_breakpoint_raises_synthetic_hit() {
    let mut debugger = started(
        sim_builder()
            .on_resume(vec![TargetEvent::Stopped {
                tid: 1,
                addr: 0x1010,
                code: None,
            }])
            .build(),
    );
    run_ok(
        &mut debugger,
        &packet(CommandCode::SetBreakpoints, vec![1], vec![0x1010], vec![]),
    );
    run_ok(
        &mut debugger,
        &packet(
            CommandCode::SetSteppingBreakpoints,
            vec![1],
            vec![0x1011],
            vec![],
        ),
    );
    run_ok(&mut debugger, &packet(CommandCode::Resume, vec![], vec![], vec![]));
    debugger.pump_events().unwrap();
    assert!(matches!(
        debugger.take_event().unwrap(),
        DebugEvent::BreakpointHit {
            kind: BreakpointKind::Simple,
            ..
        }
    ));

    // the step-over lands exactly on the stepping breakpoint
    run_ok(&mut debugger, &packet(CommandCode::Resume, vec![], vec![], vec![]));
    assert!(matches!(
        debugger.take_event().unwrap(),
        DebugEvent::BreakpointHit {
            kind: BreakpointKind::Stepping,
            addr: 0x1011,
            tid: 1,
            ..
        }
    ));
    assert!(!debugger.breakpoints().has(0x1011, BreakpointKind::Stepping));
}

#[test]
fn halt_forgets_recently_removed() {
    let mut debugger = started(sim_builder().build());
    run_ok(
        &mut debugger,
        &packet(CommandCode::SetBreakpoints, vec![1], vec![0x1010], vec![]),
    );
    run_ok(
        &mut debugger,
        &packet(CommandCode::RemoveBreakpoints, vec![1], vec![0x1010], vec![]),
    );
    assert!(debugger
        .breakpoints()
        .recently_removed(0x1010, BreakpointKind::Simple));
    run_ok(&mut debugger, &packet(CommandCode::Halt, vec![], vec![], vec![]));
    assert!(!debugger
        .breakpoints()
        .recently_removed(0x1010, BreakpointKind::Simple));
}

#[test]
fn search_finds_pattern_in_memory() {
    let mut region = vec![0_u8; 0x100];
    region[0x80..0x84].copy_from_slice(b"find");
    let mut debugger = started(
        SimSystem::builder()
            .region(0x1000, region)
            .thread(1, 0x1000)
            .build(),
    );
    let mut provider = InformationProvider::new();
    debugger
        .process_packet(
            &packet(
                CommandCode::Search,
                vec![],
                vec![0x1000, 0x1100],
                b"find".to_vec(),
            ),
            &mut provider,
        )
        .unwrap();
    assert_eq!(provider.address(0), Some(0x1080));

    let err = debugger
        .process_packet(
            &packet(
                CommandCode::Search,
                vec![],
                vec![0x1000, 0x1100],
                b"mars".to_vec(),
            ),
            &mut provider,
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CouldntFindData);
}

#[test]
fn zero_sized_memory_read_is_invalid() {
    let mut debugger = started(sim_builder().build());
    let mut provider = InformationProvider::new();
    let err = debugger
        .process_packet(
            &packet(CommandCode::ReadMemory, vec![], vec![0x1000, 0], vec![]),
            &mut provider,
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMemoryRange);
}
