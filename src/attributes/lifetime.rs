// src/attributes/lifetime.rs
//! LIFETIME attribute: a 32-bit duration in seconds

use std::any::Any;
use std::time::Duration;

use super::{Attribute, AttributeType};
use crate::error::{DecodeError, StunResult};
use crate::protocol::{Message, RawAttribute};

const LIFETIME_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifetime {
    /// Seconds
    pub duration: u32,
}

impl Lifetime {
    pub fn new(duration: u32) -> Self {
        Self { duration }
    }

    /// Whole seconds of `duration`, saturating at `u32::MAX`
    pub fn from_duration(duration: Duration) -> Self {
        Self::new(u32::try_from(duration.as_secs()).unwrap_or(u32::MAX))
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration))
    }
}

impl Attribute for Lifetime {
    fn attr_type(&self) -> AttributeType {
        AttributeType::LIFETIME
    }

    fn pack(&self, message: &mut Message) -> StunResult<()> {
        message.add_attribute(AttributeType::LIFETIME, self.duration.to_be_bytes().to_vec())
    }

    fn unpack(&mut self, _message: &Message, raw: &RawAttribute) -> Result<(), DecodeError> {
        let bytes: [u8; LIFETIME_SIZE] =
            raw.value[..]
                .try_into()
                .map_err(|_| DecodeError::InvalidLength {
                    attribute: "lifetime",
                    actual: raw.len(),
                    expected: LIFETIME_SIZE,
                })?;

        self.duration = u32::from_be_bytes(bytes);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Class, Method};
    use crate::transaction::TransactionId;
    use proptest::prelude::*;

    fn empty_message() -> Message {
        Message::new(Class::Request, Method::BINDING, TransactionId::from_bytes([0; 12]))
    }

    fn roundtrip(value: u32) -> u32 {
        let mut message = empty_message();
        Lifetime::new(value).pack(&mut message).unwrap();

        let raw = &message.raw_attributes()[0];
        let mut decoded = Lifetime::default();
        decoded.unpack(&message, raw).unwrap();
        decoded.duration
    }

    #[test]
    fn test_lifetime_wire_bytes() {
        let mut message = empty_message();
        Lifetime::new(0x0102_0304).pack(&mut message).unwrap();

        let raw = &message.raw_attributes()[0];
        assert_eq!(raw.attr_type, AttributeType::LIFETIME);
        assert_eq!(&raw.value[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_lifetime_bounds() {
        assert_eq!(roundtrip(0), 0);
        assert_eq!(roundtrip(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_wrong_length_leaves_value_untouched() {
        let message = empty_message();
        for len in [0usize, 1, 3, 5, 8] {
            let raw = RawAttribute::new(AttributeType::LIFETIME, vec![0xAA; len]);
            let mut lifetime = Lifetime::new(77);

            let err = lifetime.unpack(&message, &raw).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("invalid lifetime length {} != 4 (expected)", len)
            );
            assert_eq!(lifetime.duration, 77);
        }
    }

    #[test]
    fn test_duration_conversion() {
        assert_eq!(Lifetime::from_duration(Duration::from_secs(600)).duration, 600);
        assert_eq!(
            Lifetime::from_duration(Duration::from_secs(u64::MAX)).duration,
            u32::MAX
        );
        assert_eq!(Lifetime::new(90).as_duration(), Duration::from_secs(90));
    }

    proptest! {
        #[test]
        fn prop_lifetime_roundtrip(value in any::<u32>()) {
            prop_assert_eq!(roundtrip(value), value);
        }

        #[test]
        fn prop_lifetime_rejects_other_lengths(len in 0usize..64) {
            prop_assume!(len != LIFETIME_SIZE);
            let raw = RawAttribute::new(AttributeType::LIFETIME, vec![0u8; len]);
            let err = Lifetime::default().unpack(&empty_message(), &raw).unwrap_err();
            let text = err.to_string();
            prop_assert!(text.contains(&len.to_string()));
            prop_assert!(text.contains("4"));
        }
    }
}
