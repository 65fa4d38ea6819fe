// src/attributes/mod.rs
//! STUN attribute codecs
//!
//! Each attribute kind implements [`Attribute`]: it packs itself into a
//! [`Message`] as a TLV record and unpacks itself from a [`RawAttribute`].
//! The message layer never looks inside values; it asks an
//! [`AttributeRegistry`] for a decoder by type code and keeps everything
//! it has no decoder for as raw bytes.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::error::{DecodeError, StunResult};
use crate::protocol::{Message, RawAttribute};

mod address;
mod error_code;
mod lifetime;
mod software;

pub use address::{MappedAddress, XorMappedAddress};
pub use error_code::ErrorCode;
pub use lifetime::Lifetime;
pub use software::Software;

/// STUN attribute type code (RFC 5389 Section 18.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeType(u16);

impl AttributeType {
    pub const MAPPED_ADDRESS: AttributeType = AttributeType(0x0001);
    pub const ERROR_CODE: AttributeType = AttributeType(0x0009);
    pub const LIFETIME: AttributeType = AttributeType(0x000D);
    pub const XOR_MAPPED_ADDRESS: AttributeType = AttributeType(0x0020);
    pub const SOFTWARE: AttributeType = AttributeType(0x8022);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Check if attribute is comprehension-required
    pub fn is_comprehension_required(&self) -> bool {
        self.0 < 0x8000
    }

    fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::MAPPED_ADDRESS => "MAPPED-ADDRESS",
            Self::ERROR_CODE => "ERROR-CODE",
            Self::LIFETIME => "LIFETIME",
            Self::XOR_MAPPED_ADDRESS => "XOR-MAPPED-ADDRESS",
            Self::SOFTWARE => "SOFTWARE",
            _ => return None,
        })
    }
}

impl From<u16> for AttributeType {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:04X})", name, self.0),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}

/// A typed STUN attribute.
///
/// `unpack` must leave `self` untouched when it returns an error.
pub trait Attribute: fmt::Debug + Send + Sync {
    /// Wire type code of this attribute kind
    fn attr_type(&self) -> AttributeType;

    /// Append this attribute's TLV record to `message`
    fn pack(&self, message: &mut Message) -> StunResult<()>;

    /// Decode `raw` into `self`. `message` supplies context such as the
    /// transaction ID.
    fn unpack(&mut self, message: &Message, raw: &RawAttribute) -> Result<(), DecodeError>;

    fn as_any(&self) -> &dyn Any;
}

/// Creates an empty attribute ready to be unpacked
pub type AttributeConstructor = fn() -> Box<dyn Attribute>;

fn construct<T: Attribute + Default + 'static>() -> Box<dyn Attribute> {
    Box::new(T::default())
}

/// Maps wire type codes to decoders
#[derive(Clone)]
pub struct AttributeRegistry {
    constructors: HashMap<AttributeType, AttributeConstructor>,
}

impl AttributeRegistry {
    /// Registry that decodes nothing; every attribute stays raw
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register `T` under the type code it reports
    pub fn register<T: Attribute + Default + 'static>(&mut self) -> &mut Self {
        let attr_type = T::default().attr_type();
        self.constructors.insert(attr_type, construct::<T>);
        self
    }

    /// Register an explicit constructor, replacing any previous one
    pub fn register_with(
        &mut self,
        attr_type: AttributeType,
        constructor: AttributeConstructor,
    ) -> &mut Self {
        self.constructors.insert(attr_type, constructor);
        self
    }

    pub fn unregister(&mut self, attr_type: AttributeType) -> &mut Self {
        self.constructors.remove(&attr_type);
        self
    }

    pub fn contains(&self, attr_type: AttributeType) -> bool {
        self.constructors.contains_key(&attr_type)
    }

    /// Fresh decoder for `attr_type`, if one is registered
    pub fn instantiate(&self, attr_type: AttributeType) -> Option<Box<dyn Attribute>> {
        self.constructors.get(&attr_type).map(|constructor| constructor())
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register::<MappedAddress>()
            .register::<ErrorCode>()
            .register::<Lifetime>()
            .register::<XorMappedAddress>()
            .register::<Software>();
        registry
    }
}

impl fmt::Debug for AttributeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.constructors.keys().collect();
        types.sort();
        f.debug_struct("AttributeRegistry")
            .field("types", &types)
            .finish()
    }
}
