//! Codepage decoding utilities for narrow and wide property strings
//!
//! Unlike display-oriented text extraction, property decoding is strict: a
//! malformed byte sequence is reported instead of being replaced with U+FFFD.
//! Decoding stops at the first NUL terminator.

use encoding_rs::Encoding;
use thiserror::Error;

/// Windows-1252, the code page assumed when an entity declares none
pub const DEFAULT_CODEPAGE: u32 = 1252;

/// Reasons a string value cannot be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextDecodeError {
    #[error("unsupported code page {0}")]
    UnsupportedCodepage(u32),
    #[error("malformed byte sequence for {0}")]
    Malformed(&'static str),
    #[error("odd UTF-16 byte length {0}")]
    OddLength(usize),
}

/// Decode bytes using the specified Windows codepage
///
/// # Examples
///
/// ```
/// use oxmsg::ole::codepage::decode_bytes;
///
/// assert_eq!(decode_bytes(b"caf\xE9\0\0", 1252).unwrap(), "caf\u{e9}");
/// assert!(decode_bytes(b"Hello", 99999).is_err());
/// ```
pub fn decode_bytes(bytes: &[u8], codepage: u32) -> Result<String, TextDecodeError> {
    let encoding = codepage_to_encoding(codepage).ok_or(TextDecodeError::UnsupportedCodepage(codepage))?;
    if encoding == encoding_rs::UTF_16LE {
        return decode_utf16le(bytes);
    }

    let bytes = strip_null_terminators(bytes);
    if bytes.is_empty() {
        return Ok(String::new());
    }

    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or(TextDecodeError::Malformed(encoding.name()))
}

/// Strip everything from the first null terminator on
#[inline]
fn strip_null_terminators(bytes: &[u8]) -> &[u8] {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    &bytes[..end]
}

/// Map Windows codepage identifier to encoding_rs Encoding
#[inline]
pub fn codepage_to_encoding(codepage: u32) -> Option<&'static Encoding> {
    match codepage {
        // DOS codepages
        437 => Some(encoding_rs::IBM866), // IBM866 (close approximation to CP437)
        866 => Some(encoding_rs::IBM866),

        // Windows codepages (Western scripts)
        874 => Some(encoding_rs::WINDOWS_874),   // Thai
        1250 => Some(encoding_rs::WINDOWS_1250), // Central European
        1251 => Some(encoding_rs::WINDOWS_1251), // Cyrillic
        1252 => Some(encoding_rs::WINDOWS_1252), // Western European (most common)
        1253 => Some(encoding_rs::WINDOWS_1253), // Greek
        1254 => Some(encoding_rs::WINDOWS_1254), // Turkish
        1255 => Some(encoding_rs::WINDOWS_1255), // Hebrew
        1256 => Some(encoding_rs::WINDOWS_1256), // Arabic
        1257 => Some(encoding_rs::WINDOWS_1257), // Baltic
        1258 => Some(encoding_rs::WINDOWS_1258), // Vietnamese

        // East Asian codepages
        932 => Some(encoding_rs::SHIFT_JIS), // Japanese Shift-JIS
        936 => Some(encoding_rs::GBK),       // Simplified Chinese (GB2312/GBK)
        949 => Some(encoding_rs::EUC_KR),    // Korean
        950 => Some(encoding_rs::BIG5),      // Traditional Chinese (Big5)
        20932 => Some(encoding_rs::EUC_JP),  // Japanese EUC-JP
        50220 => Some(encoding_rs::ISO_2022_JP),
        51932 => Some(encoding_rs::EUC_JP),
        54936 => Some(encoding_rs::GB18030), // Chinese GB18030

        // ISO 8859 series (Latin and others); 28591 is served by windows-1252
        28591 => Some(encoding_rs::WINDOWS_1252),
        28592 => Some(encoding_rs::ISO_8859_2), // Latin 2 (Central European)
        28593 => Some(encoding_rs::ISO_8859_3), // Latin 3 (South European)
        28594 => Some(encoding_rs::ISO_8859_4), // Latin 4 (North European)
        28595 => Some(encoding_rs::ISO_8859_5), // Cyrillic
        28596 => Some(encoding_rs::ISO_8859_6), // Arabic
        28597 => Some(encoding_rs::ISO_8859_7), // Greek
        28598 => Some(encoding_rs::ISO_8859_8), // Hebrew
        28605 => Some(encoding_rs::ISO_8859_15), // Latin 9 (Western European with Euro)

        20866 => Some(encoding_rs::KOI8_R),
        21866 => Some(encoding_rs::KOI8_U),

        // Macintosh
        10000 => Some(encoding_rs::MACINTOSH), // Macintosh Roman

        // Unicode
        1200 => Some(encoding_rs::UTF_16LE), // UTF-16 Little Endian
        65001 => Some(encoding_rs::UTF_8),   // UTF-8

        // Unsupported codepage
        _ => None,
    }
}

/// Decode UTF-16LE bytes, stopping at the first NUL code unit.
///
/// An odd byte count or an unpaired surrogate is an error.
///
/// ```
/// use oxmsg::ole::codepage::decode_utf16le;
///
/// assert_eq!(decode_utf16le(b"H\x00i\x00\x00\x00").unwrap(), "Hi");
/// assert!(decode_utf16le(b"H\x00i").is_err());
/// ```
pub fn decode_utf16le(bytes: &[u8]) -> Result<String, TextDecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(TextDecodeError::OddLength(bytes.len()));
    }

    let units = bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .take_while(|&unit| unit != 0);

    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|_| TextDecodeError::Malformed("UTF-16LE"))
}
