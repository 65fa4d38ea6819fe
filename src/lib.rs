//! SHARP STUN Library (lib.rs)
//!
//! Minimal blocking STUN client: builds a Binding Request, sends it over
//! UDP or TCP, and decodes the server's reply into typed attributes.
//!
//! ```no_run
//! use std::time::Duration;
//! use sharp_stun::{Client, Protocol};
//!
//! let mut client = Client::new(Protocol::Udp, "stun.l.google.com:19302", Duration::from_secs(3))?;
//! let response = client.request()?;
//! println!("Public address: {:?}", response.xor_mapped_address());
//! client.close()?;
//! # Ok::<(), sharp_stun::StunError>(())
//! ```

#![warn(clippy::all)]

pub mod attributes;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transaction;
pub mod transport;

// Re-export main types
pub use attributes::{
    Attribute, AttributeRegistry, AttributeType, ErrorCode, Lifetime, MappedAddress, Software,
    XorMappedAddress,
};
pub use client::Client;
pub use config::{ClientConfig, Protocol, DEFAULT_MAX_MESSAGE_SIZE};
pub use error::{DecodeError, MalformedMessageError, StunError, StunResult};
pub use protocol::{Class, Message, Method, RawAttribute, HEADER_SIZE, MAGIC_COOKIE};
pub use transaction::{generate_transaction_id, TransactionId, TRANSACTION_ID_SIZE};
pub use transport::{TcpTransport, Transport, UdpTransport};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging system with custom configuration
///
/// `RUST_LOG` wins over `level`; an unparsable level falls back to `info`.
/// Fails if a global subscriber is already installed.
///
/// # Arguments
/// * `level` - Log level (trace/debug/info/warn/error)
pub fn init_logging(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init()
}
