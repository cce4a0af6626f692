//! Controller links.
//!
//! A link performs a complete connection cycle for every frame: nothing is
//! kept open between commands, so a dropped connection cannot corrupt the
//! framing of the next one.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use armbridge_types::ArmError;
use thiserror::Error;
use tracing::{debug, info};

/// Largest response frame read back from the controller.
pub const MAX_RESPONSE_BYTES: usize = 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// A failure on the motion link for a single command.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("cannot resolve {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        source: std::io::Error,
    },
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },
    #[error("send to {endpoint} failed: {source}")]
    Send {
        endpoint: String,
        source: std::io::Error,
    },
    #[error("receive from {endpoint} failed: {source}")]
    Receive {
        endpoint: String,
        source: std::io::Error,
    },
}

impl TransportError {
    pub fn endpoint(&self) -> &str {
        match self {
            TransportError::Resolve { endpoint, .. }
            | TransportError::Connect { endpoint, .. }
            | TransportError::Send { endpoint, .. }
            | TransportError::Receive { endpoint, .. } => endpoint,
        }
    }
}

impl From<TransportError> for ArmError {
    fn from(err: TransportError) -> Self {
        ArmError::Transport {
            endpoint: err.endpoint().to_string(),
            details: err.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A connection-per-command channel to the robot controller.
pub trait ControllerLink: Send {
    /// `host:port` (or another label) used in logs and errors.
    fn endpoint(&self) -> &str;

    /// Open a connection, send `frame`, optionally read one response frame,
    /// and close the connection on every exit path.
    ///
    /// Returns `Ok(None)` when no response was requested or none arrived.
    fn exchange(&mut self, frame: &str) -> Result<Option<String>, TransportError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// TcpControllerLink
// ─────────────────────────────────────────────────────────────────────────────

/// Plain TCP link with bounded connect, write and read timeouts.
pub struct TcpControllerLink {
    host: String,
    port: u16,
    endpoint: String,
    connect_timeout: Duration,
    io_timeout: Duration,
    await_response: bool,
}

impl TcpControllerLink {
    /// Both timeouts must be non-zero.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, ArmError> {
        if connect_timeout.is_zero() || io_timeout.is_zero() {
            return Err(ArmError::Config(
                "controller timeouts must be greater than zero".to_string(),
            ));
        }
        let host = host.into();
        Ok(Self {
            endpoint: format!("{host}:{port}"),
            host,
            port,
            connect_timeout,
            io_timeout,
            await_response: true,
        })
    }

    /// Whether to wait for a single response frame after each send.
    pub fn with_await_response(mut self, await_response: bool) -> Self {
        self.await_response = await_response;
        self
    }

    fn connect(&self) -> Result<TcpStream, TransportError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(TransportError::Connect {
            endpoint: self.endpoint.clone(),
            source: last_err
                .unwrap_or_else(|| std::io::Error::new(ErrorKind::NotFound, "no address resolved")),
        })
    }
}

impl ControllerLink for TcpControllerLink {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn exchange(&mut self, frame: &str) -> Result<Option<String>, TransportError> {
        // The stream is dropped (and the socket closed) when this returns.
        let mut stream = self.connect()?;
        debug!(endpoint = %self.endpoint, "connected");

        let send_err = |source| TransportError::Send {
            endpoint: self.endpoint.clone(),
            source,
        };
        stream.set_write_timeout(Some(self.io_timeout)).map_err(send_err)?;
        stream.write_all(frame.as_bytes()).map_err(send_err)?;
        stream.flush().map_err(send_err)?;
        debug!(endpoint = %self.endpoint, frame = frame.trim_end(), "sent");

        if !self.await_response {
            return Ok(None);
        }

        let recv_err = |source| TransportError::Receive {
            endpoint: self.endpoint.clone(),
            source,
        };
        stream.set_read_timeout(Some(self.io_timeout)).map_err(recv_err)?;
        let mut buf = [0u8; MAX_RESPONSE_BYTES];
        match stream.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(
                String::from_utf8_lossy(&buf[..n]).trim_end().to_string(),
            )),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                debug!(endpoint = %self.endpoint, "no response before timeout");
                Ok(None)
            }
            Err(e) => Err(recv_err(e)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DryRunLink
// ─────────────────────────────────────────────────────────────────────────────

/// Records frames instead of sending them.  Always succeeds.
#[derive(Debug, Default)]
pub struct DryRunLink {
    frames: Vec<String>,
}

impl DryRunLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames "sent" so far, without their terminator.
    pub fn frames(&self) -> &[String] {
        &self.frames
    }
}

impl ControllerLink for DryRunLink {
    fn endpoint(&self) -> &str {
        "dry-run"
    }

    fn exchange(&mut self, frame: &str) -> Result<Option<String>, TransportError> {
        let frame = frame.trim_end().to_string();
        info!(frame = %frame, "dry run; not sent");
        self.frames.push(frame);
        Ok(None)
    }
}
