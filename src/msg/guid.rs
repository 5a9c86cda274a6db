//! Property set identifiers.
//!
//! A property set is named by a 16-byte GUID. Bytes are kept in the on-disk
//! order used by the mapping stream (little-endian `Data1`..`Data3`, then the
//! eight `Data4` bytes as is), so values read from a container compare
//! directly against the constants below.

use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 16-byte property set identifier, compared by value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertySetId([u8; 16]);

impl PropertySetId {
    /// Build from the canonical GUID fields.
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        let a = data1.to_le_bytes();
        let b = data2.to_le_bytes();
        let c = data3.to_le_bytes();
        Self([
            a[0], a[1], a[2], a[3], b[0], b[1], c[0], c[1], data4[0], data4[1], data4[2], data4[3],
            data4[4], data4[5], data4[6], data4[7],
        ])
    }

    /// Wrap 16 bytes in on-disk order.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Name of a well-known property set, if this is one.
    pub fn well_known_name(&self) -> Option<&'static str> {
        WELL_KNOWN_NAMES.get(self.to_string().as_str()).copied()
    }

    fn data1(&self) -> u32 {
        u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    fn data2(&self) -> u16 {
        u16::from_le_bytes([self.0[4], self.0[5]])
    }

    fn data3(&self) -> u16 {
        u16::from_le_bytes([self.0[6], self.0[7]])
    }
}

impl fmt::Display for PropertySetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.0;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1(),
            self.data2(),
            self.data3(),
            d[8],
            d[9],
            d[10],
            d[11],
            d[12],
            d[13],
            d[14],
            d[15]
        )
    }
}

impl fmt::Debug for PropertySetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.well_known_name() {
            Some(name) => write!(f, "{}", name),
            None => fmt::Display::fmt(self, f),
        }
    }
}

/// Error returned when a property set identifier string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid property set identifier: {0}")]
pub struct ParsePropertySetIdError(String);

impl FromStr for PropertySetId {
    type Err = ParsePropertySetIdError;

    /// Parse `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`, braces optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePropertySetIdError(s.to_string());
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(trimmed);

        if !inner.chars().all(|c| c == '-' || c.is_ascii_hexdigit()) {
            return Err(err());
        }

        let groups: Vec<&str> = inner.split('-').collect();
        let [g1, g2, g3, g4, g5] = groups.as_slice() else {
            return Err(err());
        };
        if g1.len() != 8 || g2.len() != 4 || g3.len() != 4 || g4.len() != 4 || g5.len() != 12 {
            return Err(err());
        }

        let data1 = u32::from_str_radix(g1, 16).map_err(|_| err())?;
        let data2 = u16::from_str_radix(g2, 16).map_err(|_| err())?;
        let data3 = u16::from_str_radix(g3, 16).map_err(|_| err())?;
        let tail = format!("{}{}", g4, g5);
        let mut data4 = [0u8; 8];
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }

        Ok(Self::from_fields(data1, data2, data3, data4))
    }
}

const MAPI_TAIL: [u8; 8] = [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46];

/// Standard (non-named) MAPI properties. Numeric discriminators in this set
/// are property tags themselves.
pub const PS_MAPI: PropertySetId = PropertySetId::from_fields(0x00020328, 0, 0, MAPI_TAIL);
pub const PS_PUBLIC_STRINGS: PropertySetId = PropertySetId::from_fields(0x00020329, 0, 0, MAPI_TAIL);
pub const PS_INTERNET_HEADERS: PropertySetId = PropertySetId::from_fields(0x00020386, 0, 0, MAPI_TAIL);
pub const PSETID_APPOINTMENT: PropertySetId = PropertySetId::from_fields(0x00062002, 0, 0, MAPI_TAIL);
pub const PSETID_TASK: PropertySetId = PropertySetId::from_fields(0x00062003, 0, 0, MAPI_TAIL);
pub const PSETID_ADDRESS: PropertySetId = PropertySetId::from_fields(0x00062004, 0, 0, MAPI_TAIL);
pub const PSETID_COMMON: PropertySetId = PropertySetId::from_fields(0x00062008, 0, 0, MAPI_TAIL);
pub const PSETID_LOG: PropertySetId = PropertySetId::from_fields(0x0006200A, 0, 0, MAPI_TAIL);
pub const PSETID_NOTE: PropertySetId = PropertySetId::from_fields(0x0006200E, 0, 0, MAPI_TAIL);
pub const PSETID_MEETING: PropertySetId = PropertySetId::from_fields(
    0x6ED8DA90,
    0x450B,
    0x101B,
    [0x98, 0xDA, 0x00, 0xAA, 0x00, 0x3F, 0x13, 0x05],
);

static WELL_KNOWN_NAMES: phf::Map<&'static str, &'static str> = phf_map! {
    "{00020328-0000-0000-C000-000000000046}" => "PS_MAPI",
    "{00020329-0000-0000-C000-000000000046}" => "PS_PUBLIC_STRINGS",
    "{00020386-0000-0000-C000-000000000046}" => "PS_INTERNET_HEADERS",
    "{00062002-0000-0000-C000-000000000046}" => "PSETID_Appointment",
    "{00062003-0000-0000-C000-000000000046}" => "PSETID_Task",
    "{00062004-0000-0000-C000-000000000046}" => "PSETID_Address",
    "{00062008-0000-0000-C000-000000000046}" => "PSETID_Common",
    "{0006200A-0000-0000-C000-000000000046}" => "PSETID_Log",
    "{0006200E-0000-0000-C000-000000000046}" => "PSETID_Note",
    "{6ED8DA90-450B-101B-98DA-00AA003F1305}" => "PSETID_Meeting",
};
