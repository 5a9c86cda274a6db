//! Little-endian fixed-width readers over byte slices.

use super::OleError;
use zerocopy::{FromBytes, F32, F64, I16, I32, I64, LE, U16, U32, U64};

macro_rules! le_reader {
    ($(#[$meta:meta])* $name:ident, $wire:ty, $out:ty, $width:expr) => {
        $(#[$meta])*
        #[inline]
        pub fn $name(data: &[u8], offset: usize) -> Result<$out, OleError> {
            let end = offset.checked_add($width).filter(|&end| end <= data.len()).ok_or_else(|| {
                OleError::InvalidFormat(format!(
                    "Not enough data for {} at offset {} ({} bytes available)",
                    stringify!($out),
                    offset,
                    data.len()
                ))
            })?;
            <$wire>::read_from_bytes(&data[offset..end])
                .map(|v| v.get())
                .map_err(|_| OleError::InvalidFormat(format!("Failed to read {}", stringify!($out))))
        }
    };
}

le_reader!(
    /// Read a little-endian u16 from a byte slice at the given offset.
    read_u16_le, U16<LE>, u16, 2
);
le_reader!(
    /// Read a little-endian i16 from a byte slice at the given offset.
    read_i16_le, I16<LE>, i16, 2
);
le_reader!(
    /// Read a little-endian u32 from a byte slice at the given offset.
    read_u32_le, U32<LE>, u32, 4
);
le_reader!(
    /// Read a little-endian i32 from a byte slice at the given offset.
    read_i32_le, I32<LE>, i32, 4
);
le_reader!(
    /// Read a little-endian u64 from a byte slice at the given offset.
    read_u64_le, U64<LE>, u64, 8
);
le_reader!(
    /// Read a little-endian i64 from a byte slice at the given offset.
    read_i64_le, I64<LE>, i64, 8
);
le_reader!(
    /// Read a little-endian f32 from a byte slice at the given offset.
    read_f32_le, F32<LE>, f32, 4
);
le_reader!(
    /// Read a little-endian f64 from a byte slice at the given offset.
    read_f64_le, F64<LE>, f64, 8
);
