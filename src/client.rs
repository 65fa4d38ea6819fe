// src/client.rs
//! Blocking STUN Binding client
//!
//! One [`Client`] owns one transport connection for its whole life. A call
//! to [`Client::request`] performs exactly one write and one read, each
//! bounded by the deadline armed when the client was created. There is no
//! retransmission and no way to extend the deadline.
//!
//! The Binding Request carries an XOR-MAPPED-ADDRESS holding the address of
//! the connection's peer. Plain Binding Requests normally carry no address
//! attribute and servers ignore it.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::attributes::XorMappedAddress;
use crate::config::{ClientConfig, Protocol};
use crate::error::{StunError, StunResult};
use crate::protocol::{Class, Message, Method};
use crate::transaction::TransactionId;
use crate::transport::{self, Transport};

/// STUN client bound to a single server connection.
///
/// `request` takes `&mut self`: one request at a time per client. Share a
/// client across threads only behind a `Mutex`, or open one per thread.
#[derive(Debug)]
pub struct Client {
    transport: Box<dyn Transport>,
    max_message_size: usize,
    verify_transaction_id: bool,
}

impl Client {
    /// Dial `server` over `protocol`; the connection attempt and all later
    /// I/O are each bounded by `deadline`
    pub fn new(protocol: Protocol, server: &str, deadline: Duration) -> StunResult<Self> {
        Self::with_config(&ClientConfig::new(protocol, server, deadline))
    }

    /// Dial using every setting of `config`
    pub fn with_config(config: &ClientConfig) -> StunResult<Self> {
        config.validate()?;
        let transport = transport::dial(config.protocol, &config.server, config.deadline())?;
        Self::with_transport(transport, config)
    }

    /// Wrap an established transport and arm its deadlines.
    ///
    /// `config.protocol` and `config.server` are ignored here.
    pub fn with_transport(mut transport: Box<dyn Transport>, config: &ClientConfig) -> StunResult<Self> {
        config.validate()?;

        let deadline = Instant::now() + config.deadline();
        transport.set_read_deadline(Some(deadline))?;
        transport.set_write_deadline(Some(deadline))?;

        Ok(Self {
            transport,
            max_message_size: config.max_message_size,
            verify_transaction_id: config.verify_transaction_id,
        })
    }

    pub fn local_addr(&self) -> StunResult<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    pub fn peer_addr(&self) -> StunResult<SocketAddr> {
        Ok(self.transport.peer_addr()?)
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Disconnect the client
    pub fn close(mut self) -> StunResult<()> {
        debug!("Closing STUN client");
        self.transport.close()?;
        Ok(())
    }

    /// Build the Binding Request sent by [`Client::request`]
    fn binding_request(&self) -> StunResult<Message> {
        let peer = self.transport.peer_addr()?;
        let transaction_id = TransactionId::generate()?;
        Message::build(
            Class::Request,
            Method::BINDING,
            transaction_id,
            &[&XorMappedAddress::new(peer)],
        )
    }

    /// Send one Binding Request and decode the reply.
    ///
    /// Transport errors, including elapsed deadlines, are returned as they
    /// come. A reply longer than the configured maximum yields
    /// [`StunError::ResponseTooBig`]. The reply's transaction ID is only
    /// checked when the client was configured to verify it.
    pub fn request(&mut self) -> StunResult<Message> {
        let request = self.binding_request()?;
        let transaction_id = request.transaction_id();
        let packed = request.pack();

        let written = self.transport.send(&packed)?;
        if written != packed.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, packed.len()),
            )
            .into());
        }
        debug!("Sent Binding Request {} ({} bytes)", transaction_id, written);

        let mut buf = vec![0u8; self.max_message_size];
        let received = self.transport.recv(&mut buf)?;
        if received > self.max_message_size {
            return Err(StunError::ResponseTooBig {
                received,
                limit: self.max_message_size,
            });
        }
        debug!("Received {} bytes", received);

        let response = Message::parse(&buf[..received])?;

        if response.transaction_id() != transaction_id {
            if self.verify_transaction_id {
                return Err(StunError::TransactionIdMismatch {
                    sent: transaction_id,
                    received: response.transaction_id(),
                });
            }
            warn!(
                "Response transaction ID {} does not match request {}",
                response.transaction_id(),
                transaction_id
            );
        }

        Ok(response)
    }
}
