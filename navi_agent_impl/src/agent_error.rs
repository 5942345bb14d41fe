use thiserror::Error;

/// Abbreviation of `Result<T, AgentError>`.
pub type AgentResult<T> = Result<T, AgentError>;

/// Numeric status codes that appear on the wire, either as the single
/// integer argument of an error reply or as the per-address result code in
/// batch breakpoint replies.
///
/// The values are part of the protocol contract with the frontend and must
/// not be renumbered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ErrorCode {
    CouldntStartServer = 1,
    ConnectionClosed = 3,
    ConnectionError = 4,
    PageNotWritable = 5,
    CouldntWriteMemory = 6,
    CouldntOpenTargetProcess = 8,
    CouldntDebugTargetProcess = 9,
    OriginalDataNotAvailable = 11,
    CouldntReadRegisters = 12,
    CouldntWriteRegisters = 13,
    PageNotReadable = 14,
    CouldntReadMemory = 15,
    InvalidMemoryRange = 16,
    CouldntResumeThread = 18,
    CouldntSingleStep = 19,
    CouldntTerminateTargetProcess = 22,
    InvalidRegisterIndex = 23,
    NoValidMemory = 24,
    InvalidPacket = 25,
    UnknownCommand = 26,
    InvalidDebugEvent = 27,
    InvalidBreakpointType = 28,
    UnknownDebugEvent = 29,
    MalformedPacket = 30,
    CouldntFindData = 31,
    InvalidBreakpoint = 32,
    HigherBreakpointExists = 33,
    DuplicateBreakpoint = 35,
    NoBreakpointAtAddress = 36,
    SendError = 37,
    CouldntSetBreakpoint = 38,
    CouldntDetach = 39,
    CouldntRemoveBreakpoint = 40,
    Unsupported = 44,
    CouldntGetProcesslist = 49,
    CouldntGetFilelist = 50,
    CouldntSuspendThread = 53,
    InvalidConditionTree = 54,
    NothingToRefresh = 55,
    CouldntSetExceptionAction = 60,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// A list specifying the failure categories of the debug agent.
///
/// Transport failures terminate the session; everything else is converted
/// into the numeric error code of the matching error reply and the session
/// continues.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AgentError {
    /// The peer ended the connection.
    #[error("Connection to the frontend is closed")]
    ConnectionClosed,

    /// Reading from the transport failed.
    #[error("Connection to the frontend is broken")]
    Connection {
        /// The causing Error.
        source: std::io::Error,
    },

    /// Writing to the transport failed.
    #[error("Sending to the frontend failed")]
    Send {
        /// The causing Error.
        source: std::io::Error,
    },

    /// A command could not be executed; the code is reported to the peer in
    /// the error reply that matches the originating command.
    #[error("Command failed with code {0:?}")]
    Command(ErrorCode),
}

impl AgentError {
    /// True for errors that end the session rather than producing an error
    /// reply.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::Connection { .. } | Self::Send { .. }
        )
    }

    /// The numeric code sent to the peer for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ConnectionClosed => ErrorCode::ConnectionClosed,
            Self::Connection { .. } => ErrorCode::ConnectionError,
            Self::Send { .. } => ErrorCode::SendError,
            Self::Command(code) => *code,
        }
    }
}

impl From<ErrorCode> for AgentError {
    fn from(code: ErrorCode) -> Self {
        Self::Command(code)
    }
}

// Read failures on the transport; an unexpected EOF means the peer hung up.
impl From<std::io::Error> for AgentError {
    fn from(source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::ConnectionClosed
        } else {
            Self::Connection { source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentError, ErrorCode};

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(ErrorCode::ConnectionClosed.as_u32(), 3);
        assert_eq!(ErrorCode::MalformedPacket.as_u32(), 30);
        assert_eq!(ErrorCode::DuplicateBreakpoint.as_u32(), 35);
        assert_eq!(ErrorCode::NothingToRefresh.as_u32(), 55);
    }

    #[test]
    fn fatality() {
        assert!(AgentError::ConnectionClosed.is_fatal());
        assert!(!AgentError::Command(ErrorCode::InvalidBreakpoint).is_fatal());
    }
}
