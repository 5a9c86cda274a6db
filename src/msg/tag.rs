//! Property tags, type codes and property addressing keys.

use super::guid::PropertySetId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A MAPI property type code (the low 16 bits of a property tag).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyType(pub u16);

impl PropertyType {
    /// Any type; used for tags resolved from the name mapping
    pub const UNSPECIFIED: Self = Self(0x0000);
    pub const NULL: Self = Self(0x0001);
    pub const INTEGER16: Self = Self(0x0002);
    pub const INTEGER32: Self = Self(0x0003);
    pub const FLOATING32: Self = Self(0x0004);
    pub const FLOATING64: Self = Self(0x0005);
    /// Fixed-point, scaled by 10,000
    pub const CURRENCY: Self = Self(0x0006);
    /// OLE automation date (days since 1899-12-30)
    pub const FLOATING_TIME: Self = Self(0x0007);
    pub const ERROR_CODE: Self = Self(0x000A);
    pub const BOOLEAN: Self = Self(0x000B);
    /// Embedded object; the value is a storage, not a stream
    pub const OBJECT: Self = Self(0x000D);
    pub const INTEGER64: Self = Self(0x0014);
    /// Narrow string in the entity's code page
    pub const STRING8: Self = Self(0x001E);
    /// UTF-16LE string
    pub const UNICODE: Self = Self(0x001F);
    /// FILETIME
    pub const TIME: Self = Self(0x0040);
    pub const GUID: Self = Self(0x0048);
    pub const BINARY: Self = Self(0x0102);

    pub const MULTI_VALUED_FLAG: u16 = 0x1000;

    #[inline]
    pub const fn code(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn is_unspecified(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_multi_valued(self) -> bool {
        self.0 & Self::MULTI_VALUED_FLAG != 0
    }

    /// Width of a value stored inline in the properties stream, or `None`
    /// for types stored in their own stream.
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            Self::INTEGER16 | Self::BOOLEAN => Some(2),
            Self::INTEGER32 | Self::FLOATING32 | Self::ERROR_CODE => Some(4),
            Self::FLOATING64 | Self::CURRENCY | Self::FLOATING_TIME | Self::INTEGER64 | Self::TIME => {
                Some(8)
            },
            _ => None,
        }
    }

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::UNSPECIFIED => "PtypUnspecified",
            Self::NULL => "PtypNull",
            Self::INTEGER16 => "PtypInteger16",
            Self::INTEGER32 => "PtypInteger32",
            Self::FLOATING32 => "PtypFloating32",
            Self::FLOATING64 => "PtypFloating64",
            Self::CURRENCY => "PtypCurrency",
            Self::FLOATING_TIME => "PtypFloatingTime",
            Self::ERROR_CODE => "PtypErrorCode",
            Self::BOOLEAN => "PtypBoolean",
            Self::OBJECT => "PtypObject",
            Self::INTEGER64 => "PtypInteger64",
            Self::STRING8 => "PtypString8",
            Self::UNICODE => "PtypString",
            Self::TIME => "PtypTime",
            Self::GUID => "PtypGuid",
            Self::BINARY => "PtypBinary",
            _ => return None,
        })
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#06X}", self.0),
        }
    }
}

impl fmt::Debug for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Canonical property tag: property id in the high 16 bits, type code in the
/// low 16 bits.
///
/// Tags produced by the name mapping carry [`PropertyType::UNSPECIFIED`] and
/// match whatever type is stored for that id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyTag(pub u32);

impl PropertyTag {
    /// First property id handed out to named properties
    pub const FIRST_NAMED_ID: u16 = 0x8000;

    pub const MESSAGE_CLASS: Self = Self::new(0x001A, PropertyType::UNSPECIFIED);
    pub const SUBJECT: Self = Self::new(0x0037, PropertyType::UNSPECIFIED);
    pub const STORE_SUPPORT_MASK: Self = Self::new(0x340D, PropertyType::INTEGER32);
    pub const INTERNET_CPID: Self = Self::new(0x3FDE, PropertyType::INTEGER32);
    pub const MESSAGE_CODEPAGE: Self = Self::new(0x3FFD, PropertyType::INTEGER32);

    #[inline]
    pub const fn new(id: u16, prop_type: PropertyType) -> Self {
        Self(((id as u32) << 16) | prop_type.0 as u32)
    }

    #[inline]
    pub const fn id(self) -> u16 {
        (self.0 >> 16) as u16
    }

    #[inline]
    pub const fn prop_type(self) -> PropertyType {
        PropertyType(self.0 as u16)
    }

    #[inline]
    pub const fn with_type(self, prop_type: PropertyType) -> Self {
        Self::new(self.id(), prop_type)
    }

    #[inline]
    pub const fn is_named(self) -> bool {
        self.id() >= Self::FIRST_NAMED_ID
    }

    /// Whether a stored tag satisfies this (possibly type-less) request.
    #[inline]
    pub fn matches(self, stored: PropertyTag) -> bool {
        self.id() == stored.id()
            && (self.prop_type().is_unspecified() || self.prop_type() == stored.prop_type())
    }

    /// Name of the stream that holds this property's value.
    pub fn stream_name(self) -> String {
        format!("{}{:08X}", SUBSTG_PREFIX, self.0)
    }

    /// Parse a `__substg1.0_XXXXXXXX` stream name.
    pub fn from_stream_name(name: &str) -> Option<Self> {
        let prefix = name.get(..SUBSTG_PREFIX.len())?;
        let hex = name.get(SUBSTG_PREFIX.len()..)?;
        if !prefix.eq_ignore_ascii_case(SUBSTG_PREFIX)
            || hex.len() != 8
            || !hex.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return None;
        }
        u32::from_str_radix(hex, 16).ok().map(Self)
    }
}

/// Prefix of every property value stream name
pub const SUBSTG_PREFIX: &str = "__substg1.0_";

impl fmt::Display for PropertyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.0)
    }
}

impl fmt::Debug for PropertyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyTag({:#06X}, {})", self.id(), self.prop_type())
    }
}

impl From<u32> for PropertyTag {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// The name-or-number half of a named property key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Discriminator {
    Id(u32),
    /// A string name, matched exactly against the container's string
    /// records. A hex string such as `"8101"` is a name, not the numeric id
    /// `0x8101`; use [`Discriminator::Id`] for numbered properties.
    Name(String),
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discriminator::Id(id) => write!(f, "{:#06X}", id),
            Discriminator::Name(name) => write!(f, "{:?}", name),
        }
    }
}

impl fmt::Debug for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<u32> for Discriminator {
    fn from(id: u32) -> Self {
        Discriminator::Id(id)
    }
}

impl From<&str> for Discriminator {
    fn from(name: &str) -> Self {
        Discriminator::Name(name.to_string())
    }
}

impl From<String> for Discriminator {
    fn from(name: String) -> Self {
        Discriminator::Name(name)
    }
}

/// External address of a named property: `{property set, name or id}`.
///
/// Only meaningful within one container; the tag a key maps to is assigned
/// when the container is authored.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamedPropertyKey {
    pub set: PropertySetId,
    pub discriminator: Discriminator,
}

impl NamedPropertyKey {
    pub fn new(set: PropertySetId, discriminator: impl Into<Discriminator>) -> Self {
        Self { set, discriminator: discriminator.into() }
    }
}

impl fmt::Display for NamedPropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.set, self.discriminator)
    }
}

impl fmt::Debug for NamedPropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// How a caller addresses a property on an entity.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    /// A standard property addressed by its tag
    Standard(PropertyTag),
    /// A named property, resolved through the container's name mapping
    Named(NamedPropertyKey),
}

impl PropertyKey {
    pub fn named(set: PropertySetId, discriminator: impl Into<Discriminator>) -> Self {
        PropertyKey::Named(NamedPropertyKey::new(set, discriminator))
    }

    pub fn standard(tag: impl Into<PropertyTag>) -> Self {
        PropertyKey::Standard(tag.into())
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Standard(tag) => write!(f, "{}", tag),
            PropertyKey::Named(key) => write!(f, "{}", key),
        }
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<PropertyTag> for PropertyKey {
    fn from(tag: PropertyTag) -> Self {
        PropertyKey::Standard(tag)
    }
}

impl From<NamedPropertyKey> for PropertyKey {
    fn from(key: NamedPropertyKey) -> Self {
        PropertyKey::Named(key)
    }
}
