// src/transport.rs
//! Blocking transports for the STUN client
//!
//! A [`Transport`] is one connected socket plus read and write deadlines.
//! Deadlines are absolute instants; before every operation the socket
//! timeout is set to the time remaining, and an elapsed deadline fails with
//! [`io::ErrorKind::TimedOut`].

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{
    IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket,
};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::Protocol;
use crate::error::{StunError, StunResult};

/// Connected, deadline-aware byte transport
pub trait Transport: fmt::Debug + Send {
    /// Write one message; returns the number of bytes accepted
    fn send(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read once into `buf`; returns the number of bytes received
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()>;

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

/// Time left until `deadline`, or `TimedOut` once it has passed
fn time_left(deadline: Option<Instant>) -> io::Result<Option<Duration>> {
    let Some(deadline) = deadline else {
        return Ok(None);
    };

    let now = Instant::now();
    if now >= deadline {
        return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
    }
    Ok(Some(deadline - now))
}

/// Unix sockets report an expired timeout as `WouldBlock`
fn normalize_timeout(err: io::Error) -> io::Error {
    if err.kind() == io::ErrorKind::WouldBlock {
        io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")
    } else {
        err
    }
}

fn unspecified_for(peer: &SocketAddr) -> SocketAddr {
    match peer {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

/// Connected UDP socket
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

impl UdpTransport {
    /// Bind an ephemeral port of the peer's family and connect it to `peer`
    pub fn connect(peer: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(unspecified_for(&peer))?;
        socket.connect(peer)?;
        Ok(Self::from_socket(socket))
    }

    /// Wrap an already connected socket
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            read_deadline: None,
            write_deadline: None,
        }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.socket.set_write_timeout(time_left(self.write_deadline)?)?;
        self.socket.send(data).map_err(normalize_timeout)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.set_read_timeout(time_left(self.read_deadline)?)?;
        self.socket.recv(buf).map_err(normalize_timeout)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.read_deadline = deadline;
        Ok(())
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.write_deadline = deadline;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        // Nothing to tear down for a connectionless socket
        Ok(())
    }
}

/// TCP stream
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

impl TcpTransport {
    pub fn connect(peer: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(&peer, timeout)?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            read_deadline: None,
            write_deadline: None,
        }
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.set_write_timeout(time_left(self.write_deadline)?)?;
        self.stream.write_all(data).map_err(normalize_timeout)?;
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_read_timeout(time_left(self.read_deadline)?)?;
        self.stream.read(buf).map_err(normalize_timeout)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.read_deadline = deadline;
        Ok(())
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.write_deadline = deadline;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

fn dial_error(server: &str, protocol: Protocol, source: io::Error) -> StunError {
    StunError::Dial {
        server: server.to_string(),
        protocol,
        source,
    }
}

/// Resolve `server` and connect to the first address that answers.
///
/// `timeout` bounds the whole dial, shared by every TCP connect attempt;
/// UDP "connects" without network traffic.
pub fn dial(protocol: Protocol, server: &str, timeout: Duration) -> StunResult<Box<dyn Transport>> {
    let candidates: Vec<SocketAddr> = server
        .to_socket_addrs()
        .map_err(|e| dial_error(server, protocol, e))?
        .filter(|addr| protocol.accepts(addr))
        .collect();

    if candidates.is_empty() {
        return Err(dial_error(
            server,
            protocol,
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no {} address found", protocol),
            ),
        ));
    }

    connect_any(protocol, &candidates, timeout).map_err(|e| dial_error(server, protocol, e))
}

/// Try `candidates` in order until one connects or `timeout` is spent
fn connect_any(
    protocol: Protocol,
    candidates: &[SocketAddr],
    timeout: Duration,
) -> io::Result<Box<dyn Transport>> {
    let deadline = Instant::now() + timeout;
    let mut last_error = None;

    for &peer in candidates {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!("Dial budget spent before trying {}", peer);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "dial deadline exceeded"));
        }

        let result: io::Result<Box<dyn Transport>> = if protocol.is_datagram() {
            UdpTransport::connect(peer).map(|t| Box::new(t) as Box<dyn Transport>)
        } else {
            TcpTransport::connect(peer, remaining).map(|t| Box::new(t) as Box<dyn Transport>)
        };

        match result {
            Ok(transport) => {
                debug!(
                    "Dialed {} over {} from {:?}",
                    peer,
                    protocol,
                    transport.local_addr().ok()
                );
                return Ok(transport);
            }
            Err(e) => {
                debug!("Failed to dial {} over {}: {}", peer, protocol, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no address dialed")))
}
