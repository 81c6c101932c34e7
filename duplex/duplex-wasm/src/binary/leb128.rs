//! LEB128 readers with width checks.
//!
//! An encoding may use at most `ceil(bits / 7)` bytes, and the unused high
//! bits of the final byte must be a zero (unsigned) or sign (signed)
//! extension of the value.

use super::{Cursor, DecodeError, Result};

/// Read an unsigned LEB128 value of at most `bits` bits (`bits <= 64`).
pub fn read_unsigned(cur: &mut Cursor<'_>, bits: u32) -> Result<u64> {
    let start = cur.offset();
    let max_bytes = bits.div_ceil(7);
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    for _ in 0..max_bytes {
        let byte = cur.read_u8()?;
        let payload = u64::from(byte & 0x7F);
        if shift == 63 && payload > 1 {
            return Err(DecodeError::Leb128Overflow { bits, offset: start });
        }
        result |= payload << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if bits < 64 && result >> bits != 0 {
                return Err(DecodeError::Leb128Overflow { bits, offset: start });
            }
            return Ok(result);
        }
    }
    Err(DecodeError::Leb128TooLong { offset: start })
}

/// Read a signed LEB128 value of at most `bits` bits (`bits <= 64`).
pub fn read_signed(cur: &mut Cursor<'_>, bits: u32) -> Result<i64> {
    let start = cur.offset();
    let max_bytes = bits.div_ceil(7);
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    for _ in 0..max_bytes {
        let byte = cur.read_u8()?;
        if shift == 63 {
            // last byte of a 64-bit value: only the sign bit may be set
            let rest = byte & 0x7F;
            if rest != 0 && rest != 0x7F {
                return Err(DecodeError::Leb128Overflow { bits, offset: start });
            }
        }
        result |= i64::from(byte & 0x7F) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if result < min || result > max {
                    return Err(DecodeError::Leb128Overflow { bits, offset: start });
                }
            }
            return Ok(result);
        }
    }
    Err(DecodeError::Leb128TooLong { offset: start })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsigned(bytes: &[u8], bits: u32) -> Result<u64> {
        read_unsigned(&mut Cursor::new(bytes), bits)
    }

    fn signed(bytes: &[u8], bits: u32) -> Result<i64> {
        read_signed(&mut Cursor::new(bytes), bits)
    }

    #[test]
    fn unsigned_basic() {
        assert_eq!(unsigned(&[0x00], 32).unwrap(), 0);
        assert_eq!(unsigned(&[0x7F], 32).unwrap(), 127);
        assert_eq!(unsigned(&[0xE5, 0x8E, 0x26], 32).unwrap(), 624_485);
        assert_eq!(unsigned(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], 32).unwrap(), u64::from(u32::MAX));
    }

    #[test]
    fn unsigned_rejects_overflow_and_length() {
        assert!(matches!(
            unsigned(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F], 32),
            Err(DecodeError::Leb128Overflow { .. })
        ));
        assert!(matches!(
            unsigned(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00], 32),
            Err(DecodeError::Leb128TooLong { .. })
        ));
        assert!(matches!(unsigned(&[0x80], 32), Err(DecodeError::UnexpectedEof { .. })));
    }

    #[test]
    fn signed_basic() {
        assert_eq!(signed(&[0x7F], 32).unwrap(), -1);
        assert_eq!(signed(&[0x3F], 32).unwrap(), 63);
        assert_eq!(signed(&[0x40], 32).unwrap(), -64);
        assert_eq!(signed(&[0xC0, 0xBB, 0x78], 32).unwrap(), -123_456);
        assert_eq!(signed(&[0x80, 0x80, 0x80, 0x80, 0x78], 32).unwrap(), i64::from(i32::MIN));
        assert_eq!(signed(&[0xFF, 0xFF, 0xFF, 0xFF, 0x07], 32).unwrap(), i64::from(i32::MAX));
    }

    #[test]
    fn signed_width_checks() {
        // 2^31 does not fit in i32 but does fit in s33
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x08];
        assert!(matches!(signed(&bytes, 32), Err(DecodeError::Leb128Overflow { .. })));
        assert_eq!(signed(&bytes, 33).unwrap(), 1i64 << 31);

        let min64 = [0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7F];
        assert_eq!(signed(&min64, 64).unwrap(), i64::MIN);
        let bad64 = [0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(signed(&bad64, 64), Err(DecodeError::Leb128Overflow { .. })));
    }
}
