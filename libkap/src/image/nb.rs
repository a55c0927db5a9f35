//! Two-digit base-128 numbers shared by row headers and run lengths.
//!
//! Values up to 127 take a single byte with the high bit clear. Larger values take two
//! bytes: the high digit with the high bit set, then the low digit. The high digit has to
//! fit in the seven low bits of the first byte, which caps the range at [`MAX_NB`].

use crate::Error;

/// Largest value representable by [`encode_nb`]
pub const MAX_NB: u16 = 127 * 128 + 127;

const CONTINUATION: u8 = 0x80;

/// Appends the encoded form of `value` to `out`, returning the number of bytes written
///
/// # Errors
///
/// Returns [`Error::ValueOutOfRange`] if `value` is larger than [`MAX_NB`]. Nothing is
/// written in that case.
pub fn encode_nb(value: u32, out: &mut Vec<u8>) -> Result<usize, Error> {
    let value = u16::try_from(value)
        .ok()
        .filter(|v| *v <= MAX_NB)
        .ok_or(Error::ValueOutOfRange { value, max: MAX_NB })?;
    // both digits are below 128 after the range check
    let high = (value >> 7) as u8;
    let low = (value & 0x7F) as u8;
    if high == 0 {
        out.push(low);
        Ok(1)
    } else {
        out.extend([CONTINUATION | high, low]);
        Ok(2)
    }
}

/// Decodes a number from the start of `bytes`, returning the value and the bytes consumed
///
/// Returns [`None`] if `bytes` is empty or a two-byte number is truncated.
#[must_use]
pub fn decode_nb(bytes: &[u8]) -> Option<(u16, usize)> {
    let first = *bytes.first()?;
    if first & CONTINUATION == 0 {
        return Some((u16::from(first), 1));
    }
    let second = *bytes.get(1)?;
    let value = (u16::from(first & 0x7F) << 7) | u16::from(second & 0x7F);
    Some((value, 2))
}
