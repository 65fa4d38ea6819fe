// src/error.rs
//! Error types for the STUN client
//!
//! Three layers: transport failures (I/O, dial), framing failures on the
//! message level and decode failures on the attribute level. Everything
//! surfaces to callers as [`StunError`].

use std::io;
use thiserror::Error;

use crate::config::Protocol;
use crate::transaction::TransactionId;

/// Top-level error returned by every fallible operation of the crate
#[derive(Debug, Error)]
pub enum StunError {
    /// Network I/O errors, including elapsed deadlines
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Connection could not be established
    #[error("Failed to dial {server} over {protocol}: {source}")]
    Dial {
        server: String,
        protocol: Protocol,
        #[source]
        source: io::Error,
    },

    /// The server returned more bytes than the configured maximum
    #[error("received too much data ({received} bytes, limit {limit})")]
    ResponseTooBig { received: usize, limit: usize },

    /// Attribute value could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Attribute value cannot be put on the wire
    #[error("Cannot encode {attribute}: {reason}")]
    InvalidAttribute {
        attribute: &'static str,
        reason: String,
    },

    /// Message framing is broken
    #[error(transparent)]
    Malformed(#[from] MalformedMessageError),

    /// The operating system random source failed
    #[error("Entropy source failure: {0}")]
    Entropy(String),

    /// Transport name not understood
    #[error("Unsupported transport protocol: {0}")]
    UnsupportedProtocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Response does not answer our request (strict mode only)
    #[error("Transaction ID mismatch: sent {sent}, received {received}")]
    TransactionIdMismatch {
        sent: TransactionId,
        received: TransactionId,
    },

    /// Method does not fit in the 12 bits of the message type field
    #[error("Invalid STUN method 0x{0:04X}")]
    InvalidMethod(u16),
}

impl StunError {
    /// True for the oversized-response sentinel
    pub fn is_response_too_big(&self) -> bool {
        matches!(self, Self::ResponseTooBig { .. })
    }

    /// True when the transport gave up because the deadline passed
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Io(e) | Self::Dial { source: e, .. } => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Attribute-level decode errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fixed-size attribute with the wrong length
    #[error("invalid {attribute} length {actual} != {expected} (expected)")]
    InvalidLength {
        attribute: &'static str,
        actual: usize,
        expected: usize,
    },

    /// Variable-size attribute shorter than its fixed prefix
    #[error("invalid {attribute} length {actual} < {minimum} (minimum)")]
    TooShort {
        attribute: &'static str,
        actual: usize,
        minimum: usize,
    },

    /// Address family other than IPv4 (0x01) or IPv6 (0x02)
    #[error("Invalid address family: 0x{0:02X}")]
    InvalidAddressFamily(u8),

    /// Value is well-sized but its content is not acceptable
    #[error("invalid {attribute} value: {reason}")]
    InvalidValue {
        attribute: &'static str,
        reason: String,
    },
}

/// Message-level framing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessageError {
    #[error("Message too short: {actual} bytes, header needs {minimum}")]
    TooShort { actual: usize, minimum: usize },

    #[error("Invalid message type field: 0x{0:04X}")]
    InvalidMessageType(u16),

    #[error("Invalid magic cookie: expected 0x2112A442, got 0x{0:08X}")]
    InvalidMagicCookie(u32),

    #[error("Invalid message length: declared {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Message length {0} is not a multiple of 4")]
    UnalignedLength(usize),

    #[error("Incomplete attribute header: {remaining} bytes left")]
    TruncatedAttributeHeader { remaining: usize },

    #[error("Attribute 0x{attr_type:04X} declares {declared} bytes, only {remaining} left")]
    AttributeOverflow {
        attr_type: u16,
        declared: usize,
        remaining: usize,
    },

    #[error("Attribute 0x{attr_type:04X} is missing its padding")]
    MissingPadding { attr_type: u16 },

    #[error("Attribute block of {0} bytes does not fit the length field")]
    MessageTooLarge(usize),
}

/// Result type for STUN operations
pub type StunResult<T> = Result<T, StunError>;
