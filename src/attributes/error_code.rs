// src/attributes/error_code.rs
//! ERROR-CODE attribute carried by error responses
//!
//! ```text
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Reserved, should be 0         |Class|     Number    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Reason Phrase (variable)                                ..
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use std::any::Any;

use bytes::{BufMut, BytesMut};

use super::{Attribute, AttributeType};
use crate::error::{DecodeError, StunError, StunResult};
use crate::protocol::{Message, RawAttribute};

const ERROR_CODE_PREFIX_SIZE: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorCode {
    /// 300..=699
    pub code: u16,
    pub reason: String,
}

impl ErrorCode {
    pub const TRY_ALTERNATE: u16 = 300;
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const UNKNOWN_ATTRIBUTE: u16 = 420;
    pub const STALE_NONCE: u16 = 438;
    pub const SERVER_ERROR: u16 = 500;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    fn invalid(reason: String) -> DecodeError {
        DecodeError::InvalidValue {
            attribute: "error-code",
            reason,
        }
    }
}

impl Attribute for ErrorCode {
    fn attr_type(&self) -> AttributeType {
        AttributeType::ERROR_CODE
    }

    fn pack(&self, message: &mut Message) -> StunResult<()> {
        if !(300..=699).contains(&self.code) {
            return Err(StunError::InvalidAttribute {
                attribute: "error-code",
                reason: format!("code {} outside 300..=699", self.code),
            });
        }

        let mut buf = BytesMut::with_capacity(ERROR_CODE_PREFIX_SIZE + self.reason.len());
        buf.put_u16(0); // Reserved
        buf.put_u8((self.code / 100) as u8);
        buf.put_u8((self.code % 100) as u8);
        buf.put_slice(self.reason.as_bytes());

        message.add_attribute(AttributeType::ERROR_CODE, buf)
    }

    fn unpack(&mut self, _message: &Message, raw: &RawAttribute) -> Result<(), DecodeError> {
        let value = &raw.value[..];
        if value.len() < ERROR_CODE_PREFIX_SIZE {
            return Err(DecodeError::TooShort {
                attribute: "error-code",
                actual: value.len(),
                minimum: ERROR_CODE_PREFIX_SIZE,
            });
        }

        let class = u16::from(value[2] & 0x07);
        let number = u16::from(value[3]);
        if !(3..=6).contains(&class) || number > 99 {
            return Err(Self::invalid(format!("class {} number {}", class, number)));
        }

        let reason = std::str::from_utf8(&value[ERROR_CODE_PREFIX_SIZE..])
            .map_err(|e| Self::invalid(e.to_string()))?;

        self.code = class * 100 + number;
        self.reason = reason.to_owned();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
