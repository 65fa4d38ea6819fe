// src/transaction.rs
//! STUN transaction identifiers

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{StunError, StunResult};

/// Size of a transaction ID on the wire (96 bits)
pub const TRANSACTION_ID_SIZE: usize = 12;

/// Bytes drawn from the OS per ID; the tail is discarded
const ENTROPY_SIZE: usize = 16;

/// STUN transaction ID (96 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId([u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    /// Generate a new random transaction ID from the OS random source
    pub fn generate() -> StunResult<Self> {
        generate_transaction_id()
    }

    /// Create from bytes
    pub fn from_bytes(bytes: [u8; TRANSACTION_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; TRANSACTION_ID_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for TransactionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; TRANSACTION_ID_SIZE]> for TransactionId {
    fn from(bytes: [u8; TRANSACTION_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Draw a fresh transaction ID.
///
/// Fails with [`StunError::Entropy`] when the OS random source does.
pub fn generate_transaction_id() -> StunResult<TransactionId> {
    let mut entropy = [0u8; ENTROPY_SIZE];
    OsRng
        .try_fill_bytes(&mut entropy)
        .map_err(|e| StunError::Entropy(e.to_string()))?;

    let mut id = [0u8; TRANSACTION_ID_SIZE];
    id.copy_from_slice(&entropy[..TRANSACTION_ID_SIZE]);
    Ok(TransactionId(id))
}
