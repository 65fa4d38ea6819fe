// src/protocol.rs
//! STUN message framing (RFC 5389 Section 6)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0 0|     STUN Message Type     |         Message Length        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Magic Cookie                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Transaction ID (96 bits)                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! A [`Message`] is either built (request path) or parsed (response path).
//! Built messages carry only raw TLV records; parsed messages additionally
//! hold the typed attributes the [`AttributeRegistry`] knows how to decode.

use std::fmt;
use std::net::SocketAddr;
use std::sync::OnceLock;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::attributes::{Attribute, AttributeRegistry, AttributeType, XorMappedAddress};
use crate::error::{MalformedMessageError, StunError, StunResult};
use crate::transaction::{TransactionId, TRANSACTION_ID_SIZE};

/// STUN magic cookie as defined in RFC 5389
pub const MAGIC_COOKIE: u32 = 0x2112A442;

/// STUN header size (20 bytes)
pub const HEADER_SIZE: usize = 20;

/// Type and length prefix of every attribute
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;

/// Largest attribute block a 16-bit length field can describe
pub const MAX_ATTRIBUTES_SIZE: usize = u16::MAX as usize;

const CLASS_MASK: u16 = 0x0110;

/// Zero bytes needed after a value of `len` bytes to reach a 4-byte boundary
pub fn padding_for(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

/// STUN message class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl Class {
    fn bits(self) -> u16 {
        match self {
            Self::Request => 0x0000,
            Self::Indication => 0x0010,
            Self::SuccessResponse => 0x0100,
            Self::ErrorResponse => 0x0110,
        }
    }

    fn from_type_field(value: u16) -> Self {
        match value & CLASS_MASK {
            0x0000 => Self::Request,
            0x0010 => Self::Indication,
            0x0100 => Self::SuccessResponse,
            _ => Self::ErrorResponse,
        }
    }

    /// Success or error response
    pub fn is_response(&self) -> bool {
        matches!(self, Self::SuccessResponse | Self::ErrorResponse)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "Request",
            Self::Indication => "Indication",
            Self::SuccessResponse => "Success Response",
            Self::ErrorResponse => "Error Response",
        };
        f.write_str(name)
    }
}

/// STUN method (12 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Method(u16);

impl Method {
    pub const BINDING: Method = Method(0x001);

    /// Largest value that fits the message type field
    pub const MAX: u16 = 0x0FFF;

    /// Validate a raw method number
    pub fn new(value: u16) -> StunResult<Self> {
        if value > Self::MAX {
            return Err(StunError::InvalidMethod(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    fn from_type_field(value: u16) -> Self {
        Self((value & 0x000F) | ((value & 0x00E0) >> 1) | ((value & 0x3E00) >> 2))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::BINDING => f.write_str("Binding"),
            Self(other) => write!(f, "Method(0x{:03X})", other),
        }
    }
}

/// Interleave class and method bits into the 14-bit message type
pub fn encode_message_type(class: Class, method: Method) -> u16 {
    let m = method.0;
    (m & 0x000F) | ((m & 0x0070) << 1) | ((m & 0x0F80) << 2) | class.bits()
}

/// Split a message type field into class and method
pub fn decode_message_type(value: u16) -> (Class, Method) {
    (Class::from_type_field(value), Method::from_type_field(value))
}

/// Undecoded type-length-value record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub attr_type: AttributeType,
    pub value: Bytes,
}

impl RawAttribute {
    pub fn new(attr_type: AttributeType, value: impl Into<Bytes>) -> Self {
        Self {
            attr_type,
            value: value.into(),
        }
    }

    /// Value length as carried in the TLV length field
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Bytes this record occupies on the wire, header and padding included
    pub fn wire_len(&self) -> usize {
        ATTRIBUTE_HEADER_SIZE + self.value.len() + padding_for(self.value.len())
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.attr_type.value());
        buf.put_u16(self.value.len() as u16);
        buf.put_slice(&self.value);
        buf.put_bytes(0, padding_for(self.value.len()));
    }
}

/// STUN message
#[derive(Debug)]
pub struct Message {
    class: Class,
    method: Method,
    transaction_id: TransactionId,
    raw_attributes: Vec<RawAttribute>,
    attributes: Vec<Box<dyn Attribute>>,
}

impl Message {
    /// Create an empty message
    pub fn new(class: Class, method: Method, transaction_id: TransactionId) -> Self {
        Self {
            class,
            method,
            transaction_id,
            raw_attributes: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Create a message and pack every attribute into it, in order.
    ///
    /// The first attribute that fails to pack aborts construction.
    pub fn build(
        class: Class,
        method: Method,
        transaction_id: TransactionId,
        attributes: &[&dyn Attribute],
    ) -> StunResult<Self> {
        let mut message = Self::new(class, method, transaction_id);
        for attribute in attributes {
            attribute.pack(&mut message)?;
        }
        Ok(message)
    }

    /// Append a TLV record. Called by [`Attribute::pack`] implementations.
    pub fn add_attribute(
        &mut self,
        attr_type: AttributeType,
        value: impl Into<Bytes>,
    ) -> StunResult<()> {
        let raw = RawAttribute::new(attr_type, value);
        let new_len = self.attributes_len() + raw.wire_len();
        if raw.len() > u16::MAX as usize || new_len > MAX_ATTRIBUTES_SIZE {
            return Err(MalformedMessageError::MessageTooLarge(new_len).into());
        }
        self.raw_attributes.push(raw);
        Ok(())
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Every TLV record in wire order, known or not
    pub fn raw_attributes(&self) -> &[RawAttribute] {
        &self.raw_attributes
    }

    /// First raw record of the given type
    pub fn raw_attribute(&self, attr_type: AttributeType) -> Option<&RawAttribute> {
        self.raw_attributes.iter().find(|a| a.attr_type == attr_type)
    }

    /// Typed attributes decoded during parsing, in wire order
    pub fn attributes(&self) -> impl Iterator<Item = &dyn Attribute> {
        self.attributes.iter().map(|a| a.as_ref())
    }

    /// First decoded attribute of type `T`
    pub fn attribute<T: Attribute + 'static>(&self) -> Option<&T> {
        self.attributes
            .iter()
            .find_map(|a| a.as_any().downcast_ref::<T>())
    }

    /// Reflexive address reported by the server, if any
    pub fn xor_mapped_address(&self) -> Option<SocketAddr> {
        self.attribute::<XorMappedAddress>().map(|a| a.address)
    }

    /// Size of the attribute block, i.e. the header length field
    pub fn attributes_len(&self) -> usize {
        self.raw_attributes.iter().map(RawAttribute::wire_len).sum()
    }

    /// Serialize header and attributes
    pub fn pack(&self) -> Bytes {
        let attributes_len = self.attributes_len();
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + attributes_len);

        buf.put_u16(encode_message_type(self.class, self.method));
        buf.put_u16(attributes_len as u16);
        buf.put_u32(MAGIC_COOKIE);
        buf.put_slice(self.transaction_id.as_bytes());

        for raw in &self.raw_attributes {
            raw.encode(&mut buf);
        }

        buf.freeze()
    }

    /// Parse a message, decoding attributes with the built-in registry
    pub fn parse(data: &[u8]) -> StunResult<Self> {
        static DEFAULT_REGISTRY: OnceLock<AttributeRegistry> = OnceLock::new();
        Self::parse_with(data, DEFAULT_REGISTRY.get_or_init(AttributeRegistry::default))
    }

    /// Parse a message, decoding attributes with `registry`.
    ///
    /// Fails as a whole on the first framing or decode error.
    pub fn parse_with(data: &[u8], registry: &AttributeRegistry) -> StunResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(MalformedMessageError::TooShort {
                actual: data.len(),
                minimum: HEADER_SIZE,
            }
            .into());
        }

        let mut buf = data;
        let message_type = buf.get_u16();
        if message_type & 0xC000 != 0 {
            return Err(MalformedMessageError::InvalidMessageType(message_type).into());
        }

        let declared = buf.get_u16() as usize;
        let cookie = buf.get_u32();
        if cookie != MAGIC_COOKIE {
            return Err(MalformedMessageError::InvalidMagicCookie(cookie).into());
        }

        let mut tid = [0u8; TRANSACTION_ID_SIZE];
        buf.copy_to_slice(&mut tid);

        if buf.remaining() != declared {
            return Err(MalformedMessageError::LengthMismatch {
                declared,
                actual: buf.remaining(),
            }
            .into());
        }
        if declared % 4 != 0 {
            return Err(MalformedMessageError::UnalignedLength(declared).into());
        }

        let (class, method) = decode_message_type(message_type);
        let mut message = Self::new(class, method, TransactionId::from_bytes(tid));
        message.raw_attributes = split_attributes(buf)?;

        let mut decoded = Vec::new();
        for raw in &message.raw_attributes {
            let Some(mut attribute) = registry.instantiate(raw.attr_type) else {
                trace!("Keeping unknown attribute {} as raw", raw.attr_type);
                continue;
            };
            trace!("Decoding attribute {} ({} bytes)", raw.attr_type, raw.len());
            attribute.unpack(&message, raw)?;
            decoded.push(attribute);
        }
        message.attributes = decoded;

        Ok(message)
    }
}

/// Cut the attribute block into TLV records
fn split_attributes(mut buf: &[u8]) -> StunResult<Vec<RawAttribute>> {
    let mut records = Vec::new();

    while buf.has_remaining() {
        if buf.remaining() < ATTRIBUTE_HEADER_SIZE {
            return Err(MalformedMessageError::TruncatedAttributeHeader {
                remaining: buf.remaining(),
            }
            .into());
        }

        let attr_type = buf.get_u16();
        let len = buf.get_u16() as usize;

        if len > buf.remaining() {
            return Err(MalformedMessageError::AttributeOverflow {
                attr_type,
                declared: len,
                remaining: buf.remaining(),
            }
            .into());
        }
        let value = Bytes::copy_from_slice(&buf[..len]);
        buf.advance(len);

        let padding = padding_for(len);
        if buf.remaining() < padding {
            return Err(MalformedMessageError::MissingPadding { attr_type }.into());
        }
        buf.advance(padding);

        records.push(RawAttribute::new(AttributeType::new(attr_type), value));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{Lifetime, Software};
    use crate::error::DecodeError;

    fn tid() -> TransactionId {
        TransactionId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12])
    }

    #[test]
    fn test_message_type_encoding() {
        assert_eq!(encode_message_type(Class::Request, Method::BINDING), 0x0001);
        assert_eq!(encode_message_type(Class::Indication, Method::BINDING), 0x0011);
        assert_eq!(encode_message_type(Class::SuccessResponse, Method::BINDING), 0x0101);
        assert_eq!(encode_message_type(Class::ErrorResponse, Method::BINDING), 0x0111);

        // Allocate (0x003) and a method using every bit group
        let allocate = Method::new(0x003).unwrap();
        assert_eq!(encode_message_type(Class::SuccessResponse, allocate), 0x0103);
        let wide = Method::new(0x0FFF).unwrap();
        let field = encode_message_type(Class::ErrorResponse, wide);
        assert_eq!(field, 0x3FFF);
        assert_eq!(decode_message_type(field), (Class::ErrorResponse, wide));
    }

    #[test]
    fn test_method_range() {
        assert!(Method::new(0x1000).is_err());
        assert_eq!(Method::new(0x001).unwrap(), Method::BINDING);
    }

    #[test]
    fn test_empty_binding_request_bytes() {
        let msg = Message::new(Class::Request, Method::BINDING, tid());
        let bytes = msg.pack();

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], &[0x00, 0x01, 0x00, 0x00]);
        assert_eq!(&bytes[4..8], &MAGIC_COOKIE.to_be_bytes());
        assert_eq!(&bytes[8..20], tid().as_bytes());
    }

    #[test]
    fn test_padding_and_length_field() {
        let software = Software::new("abcde");
        let msg = Message::build(Class::Request, Method::BINDING, tid(), &[&software]).unwrap();
        let bytes = msg.pack();

        // 4 header + 5 value + 3 padding
        assert_eq!(msg.attributes_len(), 12);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 12);
        assert_eq!(&bytes[22..24], &[0x00, 0x05]);
        assert_eq!(&bytes[29..32], &[0, 0, 0]);
    }

    #[test]
    fn test_attribute_order_preserved() {
        let lifetime = Lifetime::new(600);
        let software = Software::new("sharp");
        let msg = Message::build(
            Class::Request,
            Method::BINDING,
            tid(),
            &[&software, &lifetime],
        )
        .unwrap();

        let parsed = Message::parse(&msg.pack()).unwrap();
        let order: Vec<_> = parsed.raw_attributes().iter().map(|a| a.attr_type).collect();
        assert_eq!(order, vec![AttributeType::SOFTWARE, AttributeType::LIFETIME]);
        assert_eq!(parsed.pack(), msg.pack());
    }

    #[test]
    fn test_unknown_attribute_kept_raw() {
        let mut msg = Message::new(Class::SuccessResponse, Method::BINDING, tid());
        msg.add_attribute(AttributeType::new(0x8055), vec![9u8, 9, 9]).unwrap();

        let parsed = Message::parse(&msg.pack()).unwrap();
        let raw = parsed.raw_attribute(AttributeType::new(0x8055)).unwrap();
        assert_eq!(&raw.value[..], &[9, 9, 9]);
        assert_eq!(parsed.attributes().count(), 0);
    }

    #[test]
    fn test_too_short() {
        let err = Message::parse(&[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            StunError::Malformed(MalformedMessageError::TooShort { actual: 10, .. })
        ));
    }

    #[test]
    fn test_bad_magic_cookie() {
        let mut bytes = Message::new(Class::Request, Method::BINDING, tid()).pack().to_vec();
        bytes[4] = 0xFF;
        let err = Message::parse(&bytes).unwrap_err();
        assert!(matches!(
            err,
            StunError::Malformed(MalformedMessageError::InvalidMagicCookie(_))
        ));
    }

    #[test]
    fn test_top_bits_rejected() {
        let mut bytes = Message::new(Class::Request, Method::BINDING, tid()).pack().to_vec();
        bytes[0] |= 0x80;
        assert!(matches!(
            Message::parse(&bytes),
            Err(StunError::Malformed(MalformedMessageError::InvalidMessageType(_)))
        ));
    }

    #[test]
    fn test_declared_length_mismatch() {
        let lifetime = Lifetime::new(30);
        let msg = Message::build(Class::Request, Method::BINDING, tid(), &[&lifetime]).unwrap();
        let mut bytes = msg.pack().to_vec();

        // Trailing garbage
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            Message::parse(&bytes),
            Err(StunError::Malformed(MalformedMessageError::LengthMismatch {
                declared: 8,
                actual: 12
            }))
        ));

        // Truncated
        let bytes = msg.pack();
        assert!(matches!(
            Message::parse(&bytes[..bytes.len() - 4]),
            Err(StunError::Malformed(MalformedMessageError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn test_attribute_overflow() {
        let mut bytes = Message::new(Class::Request, Method::BINDING, tid()).pack().to_vec();
        // Length field 8, attribute claims 12 bytes of value
        bytes[3] = 8;
        bytes.extend_from_slice(&[0x80, 0x22, 0x00, 0x0C, b'a', b'b', b'c', b'd']);

        assert!(matches!(
            Message::parse(&bytes),
            Err(StunError::Malformed(MalformedMessageError::AttributeOverflow {
                attr_type: 0x8022,
                declared: 12,
                remaining: 4
            }))
        ));
    }

    #[test]
    fn test_decode_error_aborts_parse() {
        let mut msg = Message::new(Class::SuccessResponse, Method::BINDING, tid());
        msg.add_attribute(AttributeType::LIFETIME, vec![0u8, 0, 1]).unwrap();

        let err = Message::parse(&msg.pack()).unwrap_err();
        assert!(matches!(
            err,
            StunError::Decode(DecodeError::InvalidLength {
                actual: 3,
                expected: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_oversized_attribute_rejected() {
        let mut msg = Message::new(Class::Request, Method::BINDING, tid());
        let err = msg
            .add_attribute(AttributeType::new(0x8055), vec![0u8; 70_000])
            .unwrap_err();
        assert!(matches!(
            err,
            StunError::Malformed(MalformedMessageError::MessageTooLarge(_))
        ));
        assert!(msg.raw_attributes().is_empty());
    }
}
