use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

use crate::{conn::Transport, AgentError, AgentResult, ErrorCode};

/// A TCP transport with server semantics: bind, listen, accept exactly one
/// peer, then stream until the peer disconnects.
#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
    stream: Option<TcpStream>,
}

impl TcpServer {
    /// Binds to the given port on all interfaces. Port 0 lets the OS pick
    /// a free port.
    pub fn bind(port: u16) -> AgentResult<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).map_err(|e| {
            error!("Couldn't bind to port {port}: {e}");
            AgentError::Command(ErrorCode::CouldntStartServer)
        })?;
        info!("Listening on port {}", listener.local_addr().map(|a| a.port()).unwrap_or(port));
        Ok(Self {
            listener,
            stream: None,
        })
    }

    /// The port the listener ended up on.
    pub fn local_port(&self) -> AgentResult<u16> {
        Ok(self
            .listener
            .local_addr()
            .map_err(|source| AgentError::Connection { source })?
            .port())
    }

    fn stream(&mut self) -> AgentResult<&mut TcpStream> {
        self.stream.as_mut().ok_or(AgentError::ConnectionClosed)
    }
}

impl Transport for TcpServer {
    fn wait_for_peer(&mut self) -> AgentResult<()> {
        let (stream, peer) = self
            .listener
            .accept()
            .map_err(|source| AgentError::Connection { source })?;
        info!("Accepted connection from {peer}");
        stream
            .set_nodelay(true)
            .map_err(|source| AgentError::Connection { source })?;
        self.stream = Some(stream);
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> AgentResult<()> {
        self.stream()?.read_exact(buf).map_err(AgentError::from)
    }

    fn send(&mut self, buf: &[u8]) -> AgentResult<()> {
        self.stream()?
            .write_all(buf)
            .map_err(|source| AgentError::Send { source })
    }

    fn has_data(&mut self) -> AgentResult<bool> {
        let stream = self.stream()?;
        stream
            .set_nonblocking(true)
            .map_err(|source| AgentError::Connection { source })?;
        let mut probe = [0_u8; 1];
        let result = match stream.peek(&mut probe) {
            Ok(0) => Err(AgentError::ConnectionClosed),
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(source) => Err(AgentError::Connection { source }),
        };
        stream
            .set_nonblocking(false)
            .map_err(|source| AgentError::Connection { source })?;
        result
    }

    fn close(&mut self) -> AgentResult<()> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        Ok(())
    }
}
