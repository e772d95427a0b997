//! Variable-length integer primitives used throughout dex and vdex structures.
//!
//! See: <https://source.android.com/docs/core/runtime/dex-format#leb128>

use winnow::binary::u8;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;

/// Parse an unsigned LEB128 value.
#[inline]
pub fn uleb128(input: &mut &[u8]) -> ModalResult<u64> {
    let mut val = 0u64;
    let mut shift = 0u32;

    let mut byte: u8;

    loop {
        byte = u8.parse_next(input)?;
        let b = (byte & 0x7f) as u64;
        val |= b
            .checked_shl(shift)
            .ok_or(ErrMode::Cut(ContextError::new()))?;

        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    Ok(val)
}

/// Parse a signed LEB128 value.
#[inline]
pub fn sleb128(input: &mut &[u8]) -> ModalResult<i64> {
    let mut val = 0i64;
    let mut shift = 0u32;

    let mut byte: u8;

    loop {
        byte = u8.parse_next(input)?;
        let b = (byte & 0x7f) as i64;
        val |= b
            .checked_shl(shift)
            .ok_or(ErrMode::Cut(ContextError::new()))?;
        shift += 7;

        if byte & 0x80 == 0 {
            break;
        }
    }

    // sign-extend from the last payload bit
    if shift < 64 && byte & 0x40 != 0 {
        val |= -1i64 << shift;
    }

    Ok(val)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uleb128_single_byte() {
        let mut input: &[u8] = &[0x7f, 0xaa];
        assert_eq!(uleb128(&mut input).unwrap(), 127);
        assert_eq!(input, &[0xaa]);
    }

    #[test]
    fn uleb128_multi_byte() {
        let mut input: &[u8] = &[0xe5, 0x8e, 0x26];
        assert_eq!(uleb128(&mut input).unwrap(), 624485);
    }

    #[test]
    fn uleb128_truncated() {
        let mut input: &[u8] = &[0x80];
        assert!(uleb128(&mut input).is_err());
    }

    #[test]
    fn sleb128_negative() {
        let mut input: &[u8] = &[0x7f];
        assert_eq!(sleb128(&mut input).unwrap(), -1);

        let mut input: &[u8] = &[0x80, 0x7f];
        assert_eq!(sleb128(&mut input).unwrap(), -128);
    }

    #[test]
    fn sleb128_positive() {
        let mut input: &[u8] = &[0x3f];
        assert_eq!(sleb128(&mut input).unwrap(), 63);
    }
}
