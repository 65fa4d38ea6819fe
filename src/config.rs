// src/config.rs
//! Client configuration

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StunError, StunResult};
use crate::protocol::HEADER_SIZE;

/// Response buffer size suggested by RFC 5389 Section 7.1
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1280;

/// Largest message a 16-bit length field allows
pub const MAX_MESSAGE_SIZE_LIMIT: usize = HEADER_SIZE + u16::MAX as usize;

pub const DEFAULT_SERVER: &str = "stun.l.google.com:19302";

pub const DEFAULT_DEADLINE_MS: u64 = 5000;

/// Transport selected by name, Go-style: `udp`, `udp4`, `udp6`, `tcp`, `tcp4`, `tcp6`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Udp,
    Udp4,
    Udp6,
    Tcp,
    Tcp4,
    Tcp6,
}

impl Protocol {
    /// Connectionless transport
    pub fn is_datagram(&self) -> bool {
        matches!(self, Self::Udp | Self::Udp4 | Self::Udp6)
    }

    /// Whether a resolved server address belongs to this protocol's family
    pub fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Self::Udp4 | Self::Tcp4 => addr.is_ipv4(),
            Self::Udp6 | Self::Tcp6 => addr.is_ipv6(),
            Self::Udp | Self::Tcp => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = StunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            "udp4" => Ok(Self::Udp4),
            "udp6" => Ok(Self::Udp6),
            "tcp" => Ok(Self::Tcp),
            "tcp4" => Ok(Self::Tcp4),
            "tcp6" => Ok(Self::Tcp6),
            _ => Err(StunError::UnsupportedProtocol(s.to_string())),
        }
    }
}

/// STUN client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Transport to dial
    pub protocol: Protocol,

    /// Server address as `host:port`
    pub server: String,

    /// Budget for dialing and, separately, for all reads and writes
    pub deadline_ms: u64,

    /// Receive buffer size; larger responses are rejected
    pub max_message_size: usize,

    /// Reject responses whose transaction ID differs from the request's
    pub verify_transaction_id: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Udp,
            server: DEFAULT_SERVER.to_string(),
            deadline_ms: DEFAULT_DEADLINE_MS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            verify_transaction_id: false,
        }
    }
}

impl ClientConfig {
    pub fn new(protocol: Protocol, server: impl Into<String>, deadline: Duration) -> Self {
        Self::default()
            .with_protocol(protocol)
            .with_server(server)
            .with_deadline(deadline)
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Sub-millisecond remainders are dropped
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_transaction_verification(mut self, enabled: bool) -> Self {
        self.verify_transaction_id = enabled;
        self
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> StunResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StunError::Configuration(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> StunResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            StunError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> StunResult<()> {
        if self.server.trim().is_empty() {
            return Err(StunError::Configuration("server address is empty".into()));
        }
        if self.deadline_ms == 0 {
            return Err(StunError::Configuration("deadline must be positive".into()));
        }
        if self.max_message_size < HEADER_SIZE {
            return Err(StunError::Configuration(format!(
                "max_message_size {} is smaller than the {}-byte header",
                self.max_message_size, HEADER_SIZE
            )));
        }
        if self.max_message_size > MAX_MESSAGE_SIZE_LIMIT {
            return Err(StunError::Configuration(format!(
                "max_message_size {} exceeds {}",
                self.max_message_size, MAX_MESSAGE_SIZE_LIMIT
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_message_size, 1280);
        assert_eq!(config.protocol, Protocol::Udp);
        assert!(!config.verify_transaction_id);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!("UDP".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert_eq!("tcp6".parse::<Protocol>().unwrap(), Protocol::Tcp6);
        assert!(matches!(
            "sctp".parse::<Protocol>(),
            Err(StunError::UnsupportedProtocol(_))
        ));
        assert!(Protocol::Udp4.is_datagram());
        assert!(!Protocol::Tcp.is_datagram());

        let v6: SocketAddr = "[::1]:3478".parse().unwrap();
        assert!(!Protocol::Udp4.accepts(&v6));
        assert!(Protocol::Udp.accepts(&v6));
    }

    #[test]
    fn test_partial_json() {
        let config =
            ClientConfig::from_json_str(r#"{"protocol": "tcp", "deadline_ms": 250}"#).unwrap();
        assert_eq!(config.protocol, Protocol::Tcp);
        assert_eq!(config.deadline(), Duration::from_millis(250));
        assert_eq!(config.server, DEFAULT_SERVER);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_validation() {
        let bad = [
            ClientConfig::default().with_server(" "),
            ClientConfig::default().with_deadline(Duration::ZERO),
            ClientConfig::default().with_max_message_size(19),
            ClientConfig::default().with_max_message_size(MAX_MESSAGE_SIZE_LIMIT + 1),
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(StunError::Configuration(_))));
        }
        assert!(ClientConfig::from_json_str(r#"{"max_message_size": 4}"#).is_err());
        assert!(ClientConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server": "127.0.0.1:3478", "verify_transaction_id": true}}"#
        )
        .unwrap();

        let config = ClientConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.server, "127.0.0.1:3478");
        assert!(config.verify_transaction_id);
    }
}
