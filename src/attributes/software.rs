// src/attributes/software.rs
//! SOFTWARE attribute: free-form UTF-8 agent description

use std::any::Any;

use super::{Attribute, AttributeType};
use crate::error::{DecodeError, StunError, StunResult};
use crate::protocol::{Message, RawAttribute};

/// RFC 5389 Section 15.10
pub const MAX_SOFTWARE_SIZE: usize = 763;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Software {
    pub text: String,
}

impl Software {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Attribute for Software {
    fn attr_type(&self) -> AttributeType {
        AttributeType::SOFTWARE
    }

    fn pack(&self, message: &mut Message) -> StunResult<()> {
        if self.text.len() > MAX_SOFTWARE_SIZE {
            return Err(StunError::InvalidAttribute {
                attribute: "software",
                reason: format!("{} bytes exceeds {}", self.text.len(), MAX_SOFTWARE_SIZE),
            });
        }
        message.add_attribute(AttributeType::SOFTWARE, self.text.clone().into_bytes())
    }

    fn unpack(&mut self, _message: &Message, raw: &RawAttribute) -> Result<(), DecodeError> {
        if raw.len() > MAX_SOFTWARE_SIZE {
            return Err(DecodeError::InvalidValue {
                attribute: "software",
                reason: format!("{} bytes exceeds {}", raw.len(), MAX_SOFTWARE_SIZE),
            });
        }
        let text = std::str::from_utf8(&raw.value).map_err(|e| DecodeError::InvalidValue {
            attribute: "software",
            reason: e.to_string(),
        })?;

        self.text = text.to_owned();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
