// The single contiguous enumeration of all packet command codes: requests,
// success replies, error replies, and unsolicited event replies.
// The numeric values are shared with the frontend build and must not be
// renumbered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandCode {
    // Requests sent by the frontend.
    ClearAll = 0,
    SetBreakpoints = 1,
    SetEchoBreakpoints = 2,
    SetSteppingBreakpoints = 3,
    RemoveBreakpoints = 4,
    RemoveEchoBreakpoints = 5,
    RemoveSteppingBreakpoints = 6,
    Resume = 7,
    Halt = 8,
    Detach = 9,
    Terminate = 10,
    Registers = 11,
    ReadMemory = 12,
    WriteMemory = 13,
    SetRegister = 14,
    SingleStep = 15,
    ValidMemory = 16,
    Search = 17,
    MemoryMap = 18,
    ListProcesses = 19,
    CancelTargetSelection = 20,
    SelectProcess = 21,
    ListFiles = 22,
    ListFilesPath = 23,
    SelectFile = 24,
    SuspendThread = 25,
    ResumeThread = 26,
    SetActiveThread = 27,
    SetBreakpointCondition = 28,
    SetExceptionSettings = 29,
    SetDebuggerEventSettings = 30,

    // Success replies.
    BpSetSucc = 32,
    BpEchoSetSucc = 33,
    BpSteppingSetSucc = 34,
    BpRemSucc = 35,
    BpEchoRemSucc = 36,
    BpSteppingRemSucc = 37,
    Resumed = 38,
    HaltedSucc = 39,
    DetachSucc = 40,
    TerminateSucc = 41,
    RegistersReply = 42,
    ReadMemorySucc = 43,
    WriteMemorySucc = 44,
    SetRegisterSucc = 45,
    SingleStepSucc = 46,
    ValidMemorySucc = 47,
    SearchSucc = 48,
    MemoryMapSucc = 49,
    ListProcessesReply = 50,
    SelectProcessSucc = 51,
    ListFilesSucc = 52,
    SelectFileSucc = 53,
    SuspendThreadSucc = 54,
    ResumeThreadSucc = 55,
    SetActiveThreadSucc = 56,
    SetBreakpointConditionSucc = 57,
    SetExceptionSettingsSucc = 58,
    SetDebuggerEventSettingsSucc = 59,
    ClearAllSucc = 60,

    // Error replies.
    BpSetErr = 64,
    BpEchoSetErr = 65,
    BpSteppingSetErr = 66,
    BpRemErr = 67,
    BpEchoRemErr = 68,
    BpSteppingRemErr = 69,
    ResumeErr = 70,
    HaltedErr = 71,
    DetachErr = 72,
    TerminateErr = 73,
    RegistersErr = 74,
    ReadMemoryErr = 75,
    WriteMemoryErr = 76,
    SetRegisterErr = 77,
    SingleStepErr = 78,
    ValidMemoryErr = 79,
    SearchErr = 80,
    MemoryMapErr = 81,
    SelectProcessErr = 82,
    ListFilesErr = 83,
    ResumeThreadErr = 84,
    SetActiveThreadErr = 85,
    SetBreakpointConditionErr = 86,
    SetExceptionSettingsErr = 87,
    SetDebuggerEventSettingsErr = 88,
    ClearAllErr = 89,

    // Unsolicited event replies, always sent with packet id 0.
    ProcessClosed = 96,
    ThreadCreated = 97,
    ThreadClosed = 98,
    ModuleLoaded = 99,
    ModuleUnloaded = 100,
    ProcessStart = 101,
    ExceptionOccured = 102,
    BpHit = 103,
    BpEchoHit = 104,
    BpSteppingHit = 105,
    Info = 106,
    QueryDebuggerEventSettings = 107,
    RequestTarget = 108,
    AttachSuccess = 109,
    AttachError = 110,
}

impl CommandCode {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::ClearAll,
            1 => Self::SetBreakpoints,
            2 => Self::SetEchoBreakpoints,
            3 => Self::SetSteppingBreakpoints,
            4 => Self::RemoveBreakpoints,
            5 => Self::RemoveEchoBreakpoints,
            6 => Self::RemoveSteppingBreakpoints,
            7 => Self::Resume,
            8 => Self::Halt,
            9 => Self::Detach,
            10 => Self::Terminate,
            11 => Self::Registers,
            12 => Self::ReadMemory,
            13 => Self::WriteMemory,
            14 => Self::SetRegister,
            15 => Self::SingleStep,
            16 => Self::ValidMemory,
            17 => Self::Search,
            18 => Self::MemoryMap,
            19 => Self::ListProcesses,
            20 => Self::CancelTargetSelection,
            21 => Self::SelectProcess,
            22 => Self::ListFiles,
            23 => Self::ListFilesPath,
            24 => Self::SelectFile,
            25 => Self::SuspendThread,
            26 => Self::ResumeThread,
            27 => Self::SetActiveThread,
            28 => Self::SetBreakpointCondition,
            29 => Self::SetExceptionSettings,
            30 => Self::SetDebuggerEventSettings,
            32 => Self::BpSetSucc,
            33 => Self::BpEchoSetSucc,
            34 => Self::BpSteppingSetSucc,
            35 => Self::BpRemSucc,
            36 => Self::BpEchoRemSucc,
            37 => Self::BpSteppingRemSucc,
            38 => Self::Resumed,
            39 => Self::HaltedSucc,
            40 => Self::DetachSucc,
            41 => Self::TerminateSucc,
            42 => Self::RegistersReply,
            43 => Self::ReadMemorySucc,
            44 => Self::WriteMemorySucc,
            45 => Self::SetRegisterSucc,
            46 => Self::SingleStepSucc,
            47 => Self::ValidMemorySucc,
            48 => Self::SearchSucc,
            49 => Self::MemoryMapSucc,
            50 => Self::ListProcessesReply,
            51 => Self::SelectProcessSucc,
            52 => Self::ListFilesSucc,
            53 => Self::SelectFileSucc,
            54 => Self::SuspendThreadSucc,
            55 => Self::ResumeThreadSucc,
            56 => Self::SetActiveThreadSucc,
            57 => Self::SetBreakpointConditionSucc,
            58 => Self::SetExceptionSettingsSucc,
            59 => Self::SetDebuggerEventSettingsSucc,
            60 => Self::ClearAllSucc,
            64 => Self::BpSetErr,
            65 => Self::BpEchoSetErr,
            66 => Self::BpSteppingSetErr,
            67 => Self::BpRemErr,
            68 => Self::BpEchoRemErr,
            69 => Self::BpSteppingRemErr,
            70 => Self::ResumeErr,
            71 => Self::HaltedErr,
            72 => Self::DetachErr,
            73 => Self::TerminateErr,
            74 => Self::RegistersErr,
            75 => Self::ReadMemoryErr,
            76 => Self::WriteMemoryErr,
            77 => Self::SetRegisterErr,
            78 => Self::SingleStepErr,
            79 => Self::ValidMemoryErr,
            80 => Self::SearchErr,
            81 => Self::MemoryMapErr,
            82 => Self::SelectProcessErr,
            83 => Self::ListFilesErr,
            84 => Self::ResumeThreadErr,
            85 => Self::SetActiveThreadErr,
            86 => Self::SetBreakpointConditionErr,
            87 => Self::SetExceptionSettingsErr,
            88 => Self::SetDebuggerEventSettingsErr,
            89 => Self::ClearAllErr,
            96 => Self::ProcessClosed,
            97 => Self::ThreadCreated,
            98 => Self::ThreadClosed,
            99 => Self::ModuleLoaded,
            100 => Self::ModuleUnloaded,
            101 => Self::ProcessStart,
            102 => Self::ExceptionOccured,
            103 => Self::BpHit,
            104 => Self::BpEchoHit,
            105 => Self::BpSteppingHit,
            106 => Self::Info,
            107 => Self::QueryDebuggerEventSettings,
            108 => Self::RequestTarget,
            109 => Self::AttachSuccess,
            110 => Self::AttachError,
            _ => return None,
        })
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

// The argument tuple a request command must carry. The wire never describes
// per-packet schema, so the parser selects the layout from this table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgSchema {
    // No arguments.
    Simple,
    // 1 x integer.
    Integer,
    // 1 x integer `n`, followed by n x address.
    AddressList,
    // 1 x address.
    Address,
    // 2 x address (base, size).
    AddressPair,
    // 2 x integer (tid, register index) + 1 x address (value).
    SetRegister,
    // 2 x address (from, to) + 1 x data.
    Search,
    // 1 x data.
    Data,
    // 1 x address + 1 x data.
    AddressData,
    // 2k arguments, alternating long (code) and integer (action).
    ExceptionSettings,
    // arg_count x integer.
    IntegerList,
}

impl CommandCode {
    /// The argument layout of this command, or `None` if the code is not a
    /// request.
    pub fn arg_schema(self) -> Option<ArgSchema> {
        Some(match self {
            Self::ClearAll
            | Self::Detach
            | Self::Terminate
            | Self::MemoryMap
            | Self::Halt
            | Self::ListProcesses
            | Self::CancelTargetSelection
            | Self::ListFiles
            | Self::Registers
            | Self::Resume
            | Self::SingleStep => ArgSchema::Simple,

            Self::SelectProcess
            | Self::SuspendThread
            | Self::ResumeThread
            | Self::SetActiveThread => ArgSchema::Integer,

            Self::SetBreakpoints
            | Self::SetEchoBreakpoints
            | Self::SetSteppingBreakpoints
            | Self::RemoveBreakpoints
            | Self::RemoveEchoBreakpoints
            | Self::RemoveSteppingBreakpoints => ArgSchema::AddressList,

            Self::ValidMemory => ArgSchema::Address,
            Self::ReadMemory => ArgSchema::AddressPair,
            Self::SetRegister => ArgSchema::SetRegister,
            Self::Search => ArgSchema::Search,
            Self::ListFilesPath | Self::SelectFile => ArgSchema::Data,
            Self::SetBreakpointCondition | Self::WriteMemory => ArgSchema::AddressData,
            Self::SetExceptionSettings => ArgSchema::ExceptionSettings,
            Self::SetDebuggerEventSettings => ArgSchema::IntegerList,

            _ => return None,
        })
    }
}
