//! Seekable byte cursor over a code buffer.

use super::{leb128, DecodeError};

/// Cursor over a code buffer. Offsets are absolute within the buffer, so a
/// cursor can be parked at a saved program counter and resumed later.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Cursor positioned at `pos` within `data`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn peek_u8(&self) -> super::Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof { offset: self.pos })
    }

    #[inline]
    pub fn read_u8(&mut self) -> super::Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    /// Read exactly `n` bytes as a view into the underlying buffer.
    pub fn read_bytes(&mut self, n: usize) -> super::Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Malformed {
            offset: self.pos,
            msg: "position overflow",
        })?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(DecodeError::UnexpectedEof { offset: self.pos })?;
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> super::Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Unsigned 32-bit LEB128 (indices, counts, offsets).
    pub fn read_u32(&mut self) -> super::Result<u32> {
        leb128::read_unsigned(self, 32).map(|v| v as u32)
    }

    /// Signed 32-bit LEB128 (`i32.const`).
    pub fn read_i32(&mut self) -> super::Result<i32> {
        leb128::read_signed(self, 32).map(|v| v as i32)
    }

    /// Signed 64-bit LEB128 (`i64.const`).
    pub fn read_i64(&mut self) -> super::Result<i64> {
        leb128::read_signed(self, 64)
    }

    /// Signed 33-bit LEB128, the encoding of block types.
    pub fn read_s33(&mut self) -> super::Result<i64> {
        leb128::read_signed(self, 33)
    }

    /// Raw little-endian bit pattern of an `f32.const` immediate.
    pub fn read_f32_bits(&mut self) -> super::Result<u32> {
        self.read_array::<4>().map(u32::from_le_bytes)
    }

    /// Raw little-endian bit pattern of an `f64.const` immediate.
    pub fn read_f64_bits(&mut self) -> super::Result<u64> {
        self.read_array::<8>().map(u64::from_le_bytes)
    }
}
