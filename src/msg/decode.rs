//! Typed decoding of raw property bytes.
//!
//! [`decode`] converts the bytes stored for one property into a
//! [`DecodedValue`] according to the declared type of the stored tag or an
//! explicit override. Byte-length or encoding mismatches are reported as
//! [`PropertyError::DecodeError`]; nothing is coerced to a default.

use super::tag::{PropertyTag, PropertyType};
use crate::common::error::PropertyError;
use crate::ole::binary::{read_f32_le, read_f64_le, read_i16_le, read_i32_le, read_i64_le, read_u32_le};
use crate::ole::codepage::{decode_bytes, decode_utf16le};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// Width of a value slot in the properties stream
const INLINE_SLOT_SIZE: usize = 8;

/// Undecoded bytes for one property, tagged with the stored (declared) type.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPropertyValue {
    pub tag: PropertyTag,
    pub data: Bytes,
}

/// Entity-wide settings that influence decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeContext {
    /// Code page for narrow (`STRING8`) strings
    pub codepage: u32,
}

/// A FILETIME value: 100-nanosecond ticks since 1601-01-01 00:00:00 UTC.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const TICKS_PER_SECOND: u64 = 10_000_000;
    /// Ticks between 1601-01-01 and 1970-01-01
    pub const UNIX_EPOCH_TICKS: u64 = 116_444_736_000_000_000;
    /// Ticks between 1601-01-01 and 1899-12-30, the OLE automation epoch
    pub const OLE_EPOCH_TICKS: u64 = 94_353_120_000_000_000;
    /// Tick values writers use to mean "no date"
    pub const NULL_DATE_TICKS: [u64; 2] = [915_151_392_000_000_000, 915_046_235_400_000_000];

    const TICKS_PER_DAY: f64 = 864_000_000_000.0;

    /// Wrap a tick count. Counts above `i64::MAX` are not valid FILETIMEs.
    pub fn from_ticks(ticks: u64) -> Option<Self> {
        (ticks <= i64::MAX as u64).then_some(Self(ticks))
    }

    /// Convert a point in time, truncating to tick resolution. Instants
    /// before 1601 cannot be represented.
    pub fn from_datetime(instant: DateTime<Utc>) -> Option<Self> {
        let unix_ticks = instant
            .timestamp()
            .checked_mul(Self::TICKS_PER_SECOND as i64)?
            .checked_add(instant.timestamp_subsec_nanos() as i64 / 100)?;
        let ticks = unix_ticks.checked_add(Self::UNIX_EPOCH_TICKS as i64)?;
        u64::try_from(ticks).ok().map(Self)
    }

    /// Convert an OLE automation date (fractional days since 1899-12-30).
    pub fn from_ole_date(days: f64) -> Option<Self> {
        if !days.is_finite() {
            return None;
        }
        let ticks = Self::OLE_EPOCH_TICKS as f64 + days * Self::TICKS_PER_DAY;
        if !(0.0..=i64::MAX as f64).contains(&ticks) {
            return None;
        }
        Self::from_ticks(ticks as u64)
    }

    #[inline]
    pub fn ticks(self) -> u64 {
        self.0
    }

    /// Whether this is one of the "no date" sentinels.
    #[inline]
    pub fn is_null(self) -> bool {
        Self::NULL_DATE_TICKS.contains(&self.0)
    }

    /// The instant this timestamp names. Null dates map to
    /// [`Timestamp::null_date`].
    pub fn to_datetime(self) -> DateTime<Utc> {
        if self.is_null() {
            return Self::null_date();
        }
        let seconds = (self.0 / Self::TICKS_PER_SECOND) as i64 - (Self::UNIX_EPOCH_TICKS / Self::TICKS_PER_SECOND) as i64;
        let nanos = ((self.0 % Self::TICKS_PER_SECOND) * 100) as u32;
        // Every tick count up to i64::MAX lies inside chrono's range
        DateTime::from_timestamp(seconds, nanos).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// The recognizable default standing in for "no date": 4500-08-31 23:59 UTC.
    pub fn null_date() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(4500, 8, 31)
            .and_then(|date| date.and_hms_opt(23, 59, 0))
            .map(|naive| naive.and_utc())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Timestamp(null)")
        } else {
            write!(f, "Timestamp({})", self)
        }
    }
}

/// The raw value an enumerated property carried.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawCode {
    Integer(i64),
    Text(String),
}

impl fmt::Display for RawCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawCode::Integer(n) => write!(f, "{}", n),
            RawCode::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// An enumerated value. `name` is `None` when the code is not one the decoder
/// knows; the raw value is kept either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeValue {
    pub raw: RawCode,
    pub name: Option<&'static str>,
}

impl CodeValue {
    #[inline]
    pub fn is_recognized(&self) -> bool {
        self.name.is_some()
    }
}

impl fmt::Display for CodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "unrecognized code {}", self.raw),
        }
    }
}

/// A fixed set of named codes, implemented by domain enums.
pub trait PropertyCode: Sized + Copy + 'static {
    /// Identifies the code set; part of the cache slot key.
    const CODE_SET: &'static str;

    fn from_code(raw: i64) -> Option<Self>;

    fn code(self) -> i64;

    fn name(self) -> &'static str;

    /// Codes carried as strings. Most code sets are numeric only.
    fn from_text(_text: &str) -> Option<Self> {
        None
    }
}

/// A typed enumerated value that keeps unknown codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coded<T> {
    Known(T),
    Unrecognized(RawCode),
}

impl<T: PropertyCode> Coded<T> {
    pub fn from_value(value: &CodeValue) -> Self {
        let known = match &value.raw {
            RawCode::Integer(n) => T::from_code(*n),
            RawCode::Text(s) => T::from_text(s),
        };
        known.map_or_else(|| Coded::Unrecognized(value.raw.clone()), Coded::Known)
    }

    pub fn known(&self) -> Option<T> {
        match self {
            Coded::Known(code) => Some(*code),
            Coded::Unrecognized(_) => None,
        }
    }
}

impl<T: PropertyCode> fmt::Display for Coded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coded::Known(code) => f.write_str(code.name()),
            Coded::Unrecognized(raw) => write!(f, "unrecognized code {}", raw),
        }
    }
}

/// Maps raw integer or text values to code names.
///
/// The name identifies the code set. Cached outcomes are keyed by it, so
/// decoders that share a name must map every code the same way.
#[derive(Clone, Copy)]
pub struct CodeDecoder {
    name: &'static str,
    integer: fn(i64) -> Option<&'static str>,
    text: fn(&str) -> Option<&'static str>,
}

impl CodeDecoder {
    /// A decoder for the code set called `name`, which must be unique among
    /// the code sets used on one entity.
    pub const fn new(name: &'static str, integer: fn(i64) -> Option<&'static str>) -> Self {
        Self {
            name,
            integer,
            text: |_| None,
        }
    }

    pub const fn with_text(mut self, text: fn(&str) -> Option<&'static str>) -> Self {
        self.text = text;
        self
    }

    /// The decoder for a [`PropertyCode`] enum.
    pub fn of<T: PropertyCode>() -> Self {
        Self {
            name: T::CODE_SET,
            integer: |raw| T::from_code(raw).map(T::name),
            text: |text| T::from_text(text).map(T::name),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, raw: RawCode) -> CodeValue {
        let name = match &raw {
            RawCode::Integer(n) => (self.integer)(*n),
            RawCode::Text(s) => (self.text)(s),
        };
        CodeValue { raw, name }
    }
}

impl fmt::Debug for CodeDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CodeDecoder").field(&self.name).finish()
    }
}

/// A decoded property value.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Integer(i64),
    Boolean(bool),
    Float(f64),
    Timestamp(Timestamp),
    Text(String),
    Binary(Bytes),
    Code(CodeValue),
}

impl DecodedValue {
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedValue::Integer(_) => "integer",
            DecodedValue::Boolean(_) => "boolean",
            DecodedValue::Float(_) => "float",
            DecodedValue::Timestamp(_) => "timestamp",
            DecodedValue::Text(_) => "text",
            DecodedValue::Binary(_) => "binary",
            DecodedValue::Code(_) => "code",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DecodedValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DecodedValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DecodedValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            DecodedValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DecodedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            DecodedValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<&CodeValue> {
        match self {
            DecodedValue::Code(c) => Some(c),
            _ => None,
        }
    }
}

/// Decode `raw` as its declared type, or as `type_override` when one is
/// given, then map it through `codes` when a code decoder is supplied.
pub fn decode(
    raw: &RawPropertyValue,
    type_override: Option<PropertyType>,
    codes: Option<&CodeDecoder>,
    ctx: &DecodeContext,
) -> Result<DecodedValue, PropertyError> {
    let as_type = type_override
        .filter(|t| !t.is_unspecified())
        .unwrap_or_else(|| raw.tag.prop_type());
    let value = decode_as(raw, as_type, ctx)?;

    let Some(codes) = codes else {
        return Ok(value);
    };
    let code = match value {
        DecodedValue::Integer(n) => RawCode::Integer(n),
        DecodedValue::Boolean(b) => RawCode::Integer(b as i64),
        DecodedValue::Text(s) => RawCode::Text(s),
        other => {
            return Err(PropertyError::decode(
                raw.tag,
                as_type,
                format!("a {} value cannot carry a {} code", other.kind(), codes.name()),
            ));
        },
    };
    Ok(DecodedValue::Code(codes.apply(code)))
}

fn decode_as(raw: &RawPropertyValue, as_type: PropertyType, ctx: &DecodeContext) -> Result<DecodedValue, PropertyError> {
    let data = &raw.data[..];
    let fail = |reason: String| PropertyError::decode(raw.tag, as_type, reason);

    if as_type.is_multi_valued() {
        return Err(fail("multi-valued properties are not supported".to_string()));
    }

    Ok(match as_type {
        PropertyType::INTEGER16 => DecodedValue::Integer(read_i16_le(fixed(data, 2).map_err(fail)?, 0).map_err(|e| fail(e.to_string()))? as i64),
        PropertyType::INTEGER32 => DecodedValue::Integer(read_i32_le(fixed(data, 4).map_err(fail)?, 0).map_err(|e| fail(e.to_string()))? as i64),
        PropertyType::ERROR_CODE => DecodedValue::Integer(read_u32_le(fixed(data, 4).map_err(fail)?, 0).map_err(|e| fail(e.to_string()))? as i64),
        PropertyType::INTEGER64 => DecodedValue::Integer(read_i64_le(fixed(data, 8).map_err(fail)?, 0).map_err(|e| fail(e.to_string()))?),
        PropertyType::FLOATING32 => DecodedValue::Float(read_f32_le(fixed(data, 4).map_err(fail)?, 0).map_err(|e| fail(e.to_string()))? as f64),
        PropertyType::FLOATING64 => DecodedValue::Float(read_f64_le(fixed(data, 8).map_err(fail)?, 0).map_err(|e| fail(e.to_string()))?),
        PropertyType::CURRENCY => {
            let scaled = read_i64_le(fixed(data, 8).map_err(fail)?, 0).map_err(|e| fail(e.to_string()))?;
            DecodedValue::Float(scaled as f64 / 10_000.0)
        },
        PropertyType::BOOLEAN => {
            if data.is_empty() || data.len() > INLINE_SLOT_SIZE {
                return Err(fail(format!("expected 1 to 8 bytes, found {}", data.len())));
            }
            DecodedValue::Boolean(data.iter().any(|&b| b != 0))
        },
        PropertyType::TIME => {
            let ticks = read_i64_le(fixed(data, 8).map_err(fail)?, 0).map_err(|e| fail(e.to_string()))?;
            let timestamp = u64::try_from(ticks)
                .ok()
                .and_then(Timestamp::from_ticks)
                .ok_or_else(|| fail(format!("tick count {} is before 1601", ticks)))?;
            DecodedValue::Timestamp(timestamp)
        },
        PropertyType::FLOATING_TIME => {
            let days = read_f64_le(fixed(data, 8).map_err(fail)?, 0).map_err(|e| fail(e.to_string()))?;
            let timestamp = Timestamp::from_ole_date(days).ok_or_else(|| fail(format!("OLE date {} is out of range", days)))?;
            DecodedValue::Timestamp(timestamp)
        },
        PropertyType::STRING8 => DecodedValue::Text(decode_bytes(data, ctx.codepage).map_err(|e| fail(e.to_string()))?),
        PropertyType::UNICODE => DecodedValue::Text(decode_utf16le(data).map_err(|e| fail(e.to_string()))?),
        PropertyType::BINARY => DecodedValue::Binary(raw.data.clone()),
        PropertyType::GUID => {
            if data.len() != 16 {
                return Err(fail(format!("expected 16 bytes, found {}", data.len())));
            }
            DecodedValue::Binary(raw.data.clone())
        },
        other => return Err(fail(format!("type {} is not supported", other))),
    })
}

/// The value bytes of a fixed-width type: exactly `width` bytes, or a whole
/// 8-byte inline slot whose low bytes hold the value.
fn fixed(data: &[u8], width: usize) -> Result<&[u8], String> {
    if data.len() == width || (data.len() == INLINE_SLOT_SIZE && width < INLINE_SLOT_SIZE) {
        Ok(&data[..width])
    } else {
        Err(format!("expected {} bytes, found {}", width, data.len()))
    }
}
