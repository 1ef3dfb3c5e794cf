use crate::error::SweepError;
use log::{debug, trace, warn};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Bidirectional request/response channel to one instrument.
///
/// Implementations are exclusively owned by a single device facade; the
/// orchestrator never shares a handle between instruments.
pub trait Transport {
    /// Send one terminated command, expecting no response.
    fn write_line(&mut self, command: &str) -> Result<(), SweepError>;

    /// Send one terminated command and read the terminated ASCII response.
    fn query(&mut self, command: &str) -> Result<String, SweepError>;

    /// Read exactly `len` raw bytes. Used for terminator-less binary blocks
    /// whose size is computed before the read is issued.
    fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>, SweepError>;
}

/// Line terminator appended to outgoing commands and expected on responses.
///
/// GPIB gateways commonly use CR, LAN sockets CR or CRLF, depending on the
/// instrument's communication settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Cr,
    Lf,
    CrLf,
}

impl Terminator {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Terminator::Cr => b"\r",
            Terminator::Lf => b"\n",
            Terminator::CrLf => b"\r\n",
        }
    }

    /// Byte that ends a response line.
    fn final_byte(self) -> u8 {
        match self {
            Terminator::Cr => b'\r',
            Terminator::Lf | Terminator::CrLf => b'\n',
        }
    }
}

/// Timeouts for the different phases of the TCP connection lifecycle.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Builder for [`TcpTransport`] instances.
///
/// ```no_run
/// use std::time::Duration;
/// use sme_sweep::{TcpTransport, Terminator};
///
/// let transport = TcpTransport::builder()
///     .address("192.168.1.161")
///     .port(5000)
///     .terminator(Terminator::Cr)
///     .read_timeout(Duration::from_secs(30))
///     .build()?;
/// # Ok::<(), sme_sweep::SweepError>(())
/// ```
#[derive(Default)]
pub struct TcpTransportBuilder {
    address: Option<String>,
    port: Option<u16>,
    terminator: Option<Terminator>,
    config: ConnectionConfig,
}

impl TcpTransportBuilder {
    pub fn address(mut self, addr: &str) -> Self {
        self.address = Some(addr.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// Set the full connection configuration
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Build the TcpTransport
    pub fn build(self) -> Result<TcpTransport, SweepError> {
        let address = self
            .address
            .ok_or_else(|| SweepError::InvalidAddress("address must be specified".to_string()))?;

        let port = self
            .port
            .ok_or_else(|| SweepError::InvalidAddress("port must be specified".to_string()))?;

        let socket_addr: SocketAddr = format!("{address}:{port}")
            .parse()
            .map_err(|_| SweepError::InvalidAddress(address.clone()))?;

        debug!("Connecting to instrument at {socket_addr}");

        let stream = TcpStream::connect_timeout(&socket_addr, self.config.connect_timeout)
            .map_err(|e| {
                warn!("Failed to connect to {socket_addr}: {e}");
                if e.kind() == std::io::ErrorKind::TimedOut {
                    SweepError::Timeout
                } else {
                    SweepError::Io(e)
                }
            })?;

        stream.set_read_timeout(Some(self.config.read_timeout))?;
        stream.set_write_timeout(Some(self.config.write_timeout))?;

        debug!("Connected to instrument at {socket_addr}");

        Ok(TcpTransport {
            stream,
            terminator: self.terminator.unwrap_or(Terminator::CrLf),
        })
    }
}

/// LAN socket transport carrying the ASCII command dialect plus raw binary
/// block reads.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    terminator: Terminator,
}

impl TcpTransport {
    pub fn new(addr: &str, port: u16, terminator: Terminator) -> Result<Self, SweepError> {
        Self::builder()
            .address(addr)
            .port(port)
            .terminator(terminator)
            .build()
    }

    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder::default()
    }

    fn map_io(e: std::io::Error) -> SweepError {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => SweepError::Timeout,
            _ => SweepError::Io(e),
        }
    }

    fn read_line(&mut self) -> Result<String, SweepError> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        let final_byte = self.terminator.final_byte();

        loop {
            self.stream.read_exact(&mut byte).map_err(Self::map_io)?;
            if byte[0] == final_byte {
                break;
            }
            line.push(byte[0]);
        }

        let text = String::from_utf8_lossy(&line)
            .trim_matches(['\r', '\n'])
            .to_string();
        Ok(text)
    }
}

impl Transport for TcpTransport {
    fn write_line(&mut self, command: &str) -> Result<(), SweepError> {
        trace!("-> {command}");
        self.stream
            .write_all(command.as_bytes())
            .map_err(Self::map_io)?;
        self.stream
            .write_all(self.terminator.as_bytes())
            .map_err(Self::map_io)?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, SweepError> {
        self.write_line(command)?;

        // A stray terminator can linger after a binary block read; skip
        // empty lines until the actual response arrives.
        loop {
            let line = self.read_line()?;
            if !line.is_empty() {
                trace!("<- {line}");
                return Ok(line);
            }
        }
    }

    fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>, SweepError> {
        let mut buffer = vec![0u8; len];
        self.stream.read_exact(&mut buffer).map_err(Self::map_io)?;
        trace!("<- {len} raw bytes");
        Ok(buffer)
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! In-memory transport stub used across the crate's tests. Records every
    //! outgoing command and replays canned responses.

    use super::Transport;
    use crate::error::SweepError;
    use std::collections::{HashMap, VecDeque};

    #[derive(Default)]
    pub struct ScriptedTransport {
        /// Every command sent, writes and queries alike, in order.
        pub writes: Vec<String>,
        replies: HashMap<String, VecDeque<String>>,
        sticky: HashMap<String, String>,
        binary: VecDeque<u8>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue one response for `command`; consumed in FIFO order.
        pub fn reply(&mut self, command: &str, response: &str) {
            self.replies
                .entry(command.to_string())
                .or_default()
                .push_back(response.to_string());
        }

        /// Respond with `response` whenever the queue for `command` is empty.
        pub fn stick(&mut self, command: &str, response: &str) {
            self.sticky
                .insert(command.to_string(), response.to_string());
        }

        pub fn set_binary(&mut self, bytes: Vec<u8>) {
            self.binary = bytes.into();
        }

        pub fn remaining_replies(&self, command: &str) -> usize {
            self.replies.get(command).map_or(0, VecDeque::len)
        }
    }

    impl Transport for ScriptedTransport {
        fn write_line(&mut self, command: &str) -> Result<(), SweepError> {
            self.writes.push(command.to_string());
            Ok(())
        }

        fn query(&mut self, command: &str) -> Result<String, SweepError> {
            self.writes.push(command.to_string());

            if let Some(queue) = self.replies.get_mut(command) {
                if let Some(response) = queue.pop_front() {
                    return Ok(response);
                }
            }
            if let Some(response) = self.sticky.get(command) {
                return Ok(response.clone());
            }
            Err(SweepError::Parse(format!("unscripted query: {command}")))
        }

        fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>, SweepError> {
            if self.binary.len() < len {
                return Err(SweepError::Timeout);
            }
            Ok(self.binary.drain(..len).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_bytes() {
        assert_eq!(Terminator::Cr.as_bytes(), b"\r");
        assert_eq!(Terminator::Lf.as_bytes(), b"\n");
        assert_eq!(Terminator::CrLf.as_bytes(), b"\r\n");
    }

    #[test]
    fn builder_requires_address_and_port() {
        let err = TcpTransport::builder().build().unwrap_err();
        assert!(matches!(err, SweepError::InvalidAddress(_)));

        let err = TcpTransport::builder().address("10.0.0.1").build().unwrap_err();
        assert!(matches!(err, SweepError::InvalidAddress(_)));
    }

    #[test]
    fn builder_rejects_unparsable_address() {
        let err = TcpTransport::builder()
            .address("not an address")
            .port(5000)
            .build()
            .unwrap_err();
        assert!(matches!(err, SweepError::InvalidAddress(_)));
    }
}
