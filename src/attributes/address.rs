// src/attributes/address.rs
//! MAPPED-ADDRESS and XOR-MAPPED-ADDRESS
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0 0 0 0 0 0 0 0|    Family     |         (X-)Port              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 (X-)Address (32 bits or 128 bits)             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The XOR variant masks the port with the top half of the magic cookie and
//! the address with the magic cookie followed by the transaction ID.

use std::any::Any;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{BufMut, BytesMut};

use super::{Attribute, AttributeType};
use crate::error::{DecodeError, StunResult};
use crate::protocol::{Message, RawAttribute, MAGIC_COOKIE};
use crate::transaction::TransactionId;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

const ADDRESS_PREFIX_SIZE: usize = 4;
const IPV4_VALUE_SIZE: usize = ADDRESS_PREFIX_SIZE + 4;
const IPV6_VALUE_SIZE: usize = ADDRESS_PREFIX_SIZE + 16;

/// Magic cookie followed by the transaction ID
fn xor_mask(tid: &TransactionId) -> [u8; 16] {
    let mut mask = [0u8; 16];
    mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    mask[4..].copy_from_slice(tid.as_bytes());
    mask
}

fn encode_address(addr: &SocketAddr, xor: Option<&TransactionId>) -> BytesMut {
    let mask = xor.map(xor_mask);
    let port = match mask {
        Some(_) => addr.port() ^ (MAGIC_COOKIE >> 16) as u16,
        None => addr.port(),
    };

    let mut buf = BytesMut::with_capacity(IPV6_VALUE_SIZE);
    buf.put_u8(0); // Reserved

    match addr.ip() {
        IpAddr::V4(ip) => {
            buf.put_u8(FAMILY_IPV4);
            buf.put_u16(port);
            let mut octets = ip.octets();
            if let Some(mask) = mask {
                octets.iter_mut().zip(mask).for_each(|(b, m)| *b ^= m);
            }
            buf.put_slice(&octets);
        }
        IpAddr::V6(ip) => {
            buf.put_u8(FAMILY_IPV6);
            buf.put_u16(port);
            let mut octets = ip.octets();
            if let Some(mask) = mask {
                octets.iter_mut().zip(mask).for_each(|(b, m)| *b ^= m);
            }
            buf.put_slice(&octets);
        }
    }

    buf
}

fn decode_address(
    attribute: &'static str,
    value: &[u8],
    xor: Option<&TransactionId>,
) -> Result<SocketAddr, DecodeError> {
    if value.len() < ADDRESS_PREFIX_SIZE {
        return Err(DecodeError::TooShort {
            attribute,
            actual: value.len(),
            minimum: ADDRESS_PREFIX_SIZE,
        });
    }

    let family = value[1];
    let expected = match family {
        FAMILY_IPV4 => IPV4_VALUE_SIZE,
        FAMILY_IPV6 => IPV6_VALUE_SIZE,
        other => return Err(DecodeError::InvalidAddressFamily(other)),
    };
    if value.len() != expected {
        return Err(DecodeError::InvalidLength {
            attribute,
            actual: value.len(),
            expected,
        });
    }

    let mask = xor.map(xor_mask);
    let mut port = u16::from_be_bytes([value[2], value[3]]);
    if mask.is_some() {
        port ^= (MAGIC_COOKIE >> 16) as u16;
    }

    let ip = if family == FAMILY_IPV4 {
        let mut octets = [0u8; 4];
        octets.copy_from_slice(&value[ADDRESS_PREFIX_SIZE..]);
        if let Some(mask) = mask {
            octets.iter_mut().zip(mask).for_each(|(b, m)| *b ^= m);
        }
        IpAddr::V4(Ipv4Addr::from(octets))
    } else {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&value[ADDRESS_PREFIX_SIZE..]);
        if let Some(mask) = mask {
            octets.iter_mut().zip(mask).for_each(|(b, m)| *b ^= m);
        }
        IpAddr::V6(Ipv6Addr::from(octets))
    };

    Ok(SocketAddr::new(ip, port))
}

fn unspecified() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
}

/// Reflexive transport address, XOR-obfuscated on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorMappedAddress {
    pub address: SocketAddr,
}

impl XorMappedAddress {
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }
}

impl Default for XorMappedAddress {
    fn default() -> Self {
        Self::new(unspecified())
    }
}

impl Attribute for XorMappedAddress {
    fn attr_type(&self) -> AttributeType {
        AttributeType::XOR_MAPPED_ADDRESS
    }

    fn pack(&self, message: &mut Message) -> StunResult<()> {
        let tid = message.transaction_id();
        message.add_attribute(
            AttributeType::XOR_MAPPED_ADDRESS,
            encode_address(&self.address, Some(&tid)),
        )
    }

    fn unpack(&mut self, message: &Message, raw: &RawAttribute) -> Result<(), DecodeError> {
        let tid = message.transaction_id();
        self.address = decode_address("xor-mapped-address", &raw.value, Some(&tid))?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Reflexive transport address in the clear (RFC 3489 servers)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedAddress {
    pub address: SocketAddr,
}

impl MappedAddress {
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }
}

impl Default for MappedAddress {
    fn default() -> Self {
        Self::new(unspecified())
    }
}

impl Attribute for MappedAddress {
    fn attr_type(&self) -> AttributeType {
        AttributeType::MAPPED_ADDRESS
    }

    fn pack(&self, message: &mut Message) -> StunResult<()> {
        message.add_attribute(
            AttributeType::MAPPED_ADDRESS,
            encode_address(&self.address, None),
        )
    }

    fn unpack(&mut self, _message: &Message, raw: &RawAttribute) -> Result<(), DecodeError> {
        self.address = decode_address("mapped-address", &raw.value, None)?;
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
    use proptest::prelude::*;

    const TID: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

    fn message() -> Message {
        Message::new(Class::SuccessResponse, Method::BINDING, TransactionId::from_bytes(TID))
    }

    #[test]
    fn test_xor_ipv4_known_vector() {
        // 192.168.1.100:8080 masked with the magic cookie
        let mut msg = message();
        XorMappedAddress::new("192.168.1.100:8080".parse().unwrap())
            .pack(&mut msg)
            .unwrap();

        let raw = &msg.raw_attributes()[0];
        assert_eq!(
            &raw.value[..],
            &[0x00, 0x01, 0x3E, 0x82, 0xE1, 0xBA, 0xA5, 0x26]
        );
    }

    #[test]
    fn test_xor_ipv6_uses_transaction_id() {
        let addr: SocketAddr = "[2001:db8::1]:8080".parse().unwrap();
        let mut msg = message();
        XorMappedAddress::new(addr).pack(&mut msg).unwrap();

        let raw = &msg.raw_attributes()[0];
        assert_eq!(raw.len(), IPV6_VALUE_SIZE);
        assert_eq!(
            &raw.value[4..],
            &[
                0x01, 0x13, 0xA9, 0xFA, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09,
                0x0A, 0x0B, 0x0D
            ]
        );

        let mut decoded = XorMappedAddress::default();
        decoded.unpack(&msg, raw).unwrap();
        assert_eq!(decoded.address, addr);
    }

    #[test]
    fn test_mapped_address_in_clear() {
        let mut msg = message();
        MappedAddress::new("10.0.0.1:3478".parse().unwrap())
            .pack(&mut msg)
            .unwrap();

        let raw = &msg.raw_attributes()[0];
        assert_eq!(&raw.value[..], &[0x00, 0x01, 0x0D, 0x96, 10, 0, 0, 1]);
    }

    #[test]
    fn test_invalid_family() {
        let raw = RawAttribute::new(
            AttributeType::XOR_MAPPED_ADDRESS,
            vec![0x00, 0xFF, 0x1F, 0x90, 192, 168, 1, 100],
        );
        let mut attr = XorMappedAddress::default();
        assert_eq!(
            attr.unpack(&message(), &raw),
            Err(DecodeError::InvalidAddressFamily(0xFF))
        );
        assert_eq!(attr, XorMappedAddress::default());
    }

    #[test]
    fn test_wrong_lengths() {
        let short = RawAttribute::new(AttributeType::XOR_MAPPED_ADDRESS, vec![0x00, 0x01]);
        assert!(matches!(
            XorMappedAddress::default().unpack(&message(), &short),
            Err(DecodeError::TooShort { actual: 2, minimum: 4, .. })
        ));

        // IPv4 family with an IPv6-sized body
        let mut value = vec![0x00, 0x01, 0x00, 0x00];
        value.extend_from_slice(&[0u8; 16]);
        let long = RawAttribute::new(AttributeType::MAPPED_ADDRESS, value);
        assert!(matches!(
            MappedAddress::default().unpack(&message(), &long),
            Err(DecodeError::InvalidLength { actual: 20, expected: 8, .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_xor_address_roundtrip(ip in any::<IpAddr>(), port in any::<u16>(), tid in any::<[u8; 12]>()) {
            let addr = SocketAddr::new(ip, port);
            let mut msg = Message::new(Class::Request, Method::BINDING, TransactionId::from_bytes(tid));
            XorMappedAddress::new(addr).pack(&mut msg).unwrap();

            let mut decoded = XorMappedAddress::default();
            decoded.unpack(&msg, &msg.raw_attributes()[0]).unwrap();
            prop_assert_eq!(decoded.address, addr);
        }
    }
}
