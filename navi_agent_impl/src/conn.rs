//! The transport between agent and frontend: a byte-oriented reliable
//! duplex stream with single-peer server semantics.
mod tcp_server;

pub use tcp_server::TcpServer;

use crate::AgentResult;

/// What the session needs from a transport. One peer at a time; reads and
/// sends are blocking-exact, `has_data` is a non-blocking peek.
pub trait Transport: std::fmt::Debug {
    /// Blocks until a peer is connected.
    fn wait_for_peer(&mut self) -> AgentResult<()>;

    /// Reads exactly `buf.len()` bytes.
    fn read_exact(&mut self, buf: &mut [u8]) -> AgentResult<()>;

    /// Sends the whole buffer.
    fn send(&mut self, buf: &[u8]) -> AgentResult<()>;

    /// True if at least one byte can be read without blocking.
    fn has_data(&mut self) -> AgentResult<bool>;

    fn close(&mut self) -> AgentResult<()>;
}

/// Adapts a [`Transport`] to [`std::io::Read`] for the packet parser.
#[derive(Debug)]
pub struct TransportReader<'a> {
    transport: &'a mut dyn Transport,
}

impl<'a> TransportReader<'a> {
    pub fn new(transport: &'a mut dyn Transport) -> Self {
        Self { transport }
    }
}

impl std::io::Read for TransportReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.transport.read_exact(buf).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, e.to_string())
        })?;
        Ok(buf.len())
    }
}
