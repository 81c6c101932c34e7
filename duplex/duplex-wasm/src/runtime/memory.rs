//! Linear memory instance (32-bit index space).
//! Page-based growth plus range-checked little-endian loads/stores and bulk operations.

use std::ops::Range;

use thiserror::Error;
use tracing::debug;

use crate::model::MemoryType;

/// WASM page size in bytes (64 KiB).
pub const PAGE_SIZE: usize = 64 * 1024;

/// Largest page count addressable with 32-bit indices.
pub const MAX_PAGES: u32 = 65536;

/// An access touched bytes outside the memory (or outside a data segment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{len} bytes at {addr} exceed size {size}")]
pub struct OutOfBounds {
    pub addr: u64,
    pub len: u64,
    pub size: u64,
}

/// Check that `[addr, addr + len)` lies inside a buffer of `size` bytes.
pub(crate) fn checked_range(addr: u64, len: u64, size: usize) -> Result<Range<usize>, OutOfBounds> {
    let oob = OutOfBounds { addr, len, size: size as u64 };
    let end = addr.checked_add(len).ok_or(oob)?;
    if end > size as u64 {
        return Err(oob);
    }
    Ok(addr as usize..end as usize)
}

#[derive(Debug, Clone)]
pub struct MemoryInstance {
    buf: Vec<u8>,
    ty: MemoryType,
    // effective maximum in pages after applying caps
    max: u32,
}

impl MemoryInstance {
    /// Create a memory from its declared type, with the maximum additionally capped at `cap_pages`.
    ///
    /// `None` when the initial size is above that maximum or cannot be allocated.
    pub fn new(ty: &MemoryType, cap_pages: u32) -> Option<Self> {
        let max = ty.limits.max.unwrap_or(MAX_PAGES).min(MAX_PAGES).min(cap_pages);
        let min = ty.limits.min;
        if min > max {
            debug!(min, max, "memory minimum above maximum");
            return None;
        }
        let len = (min as usize).checked_mul(PAGE_SIZE)?;
        let mut buf = Vec::new();
        if buf.try_reserve_exact(len).is_err() {
            debug!(min, "memory allocation failed");
            return None;
        }
        buf.resize(len, 0);
        Some(Self { buf, ty: *ty, max })
    }

    pub fn ty(&self) -> &MemoryType {
        &self.ty
    }

    /// Current size in pages.
    pub fn size_pages(&self) -> u32 {
        (self.buf.len() / PAGE_SIZE) as u32
    }

    /// Grow by `delta` pages. Returns the previous size, or `None` when the
    /// maximum would be exceeded or the allocation fails; the memory is
    /// unchanged on failure.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let prev = self.size_pages();
        let new = match prev.checked_add(delta) {
            Some(n) if n <= self.max => n,
            _ => {
                debug!(prev, delta, max = self.max, "memory.grow beyond maximum");
                return None;
            }
        };
        let extra = delta as usize * PAGE_SIZE;
        if self.buf.try_reserve_exact(extra).is_err() {
            debug!(prev, delta, "memory.grow allocation failed");
            return None;
        }
        self.buf.resize(new as usize * PAGE_SIZE, 0);
        Some(prev)
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Load `N` bytes at effective address `ea`.
    pub fn load<const N: usize>(&self, ea: u64) -> Result<[u8; N], OutOfBounds> {
        let r = checked_range(ea, N as u64, self.buf.len())?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[r]);
        Ok(out)
    }

    /// Store `N` bytes at effective address `ea`.
    pub fn store<const N: usize>(&mut self, ea: u64, bytes: [u8; N]) -> Result<(), OutOfBounds> {
        let r = checked_range(ea, N as u64, self.buf.len())?;
        self.buf[r].copy_from_slice(&bytes);
        Ok(())
    }

    /// `memory.fill`: set `n` bytes at `dst` to `val`.
    pub fn fill(&mut self, dst: u32, val: u8, n: u32) -> Result<(), OutOfBounds> {
        let r = checked_range(u64::from(dst), u64::from(n), self.buf.len())?;
        self.buf[r].fill(val);
        Ok(())
    }

    /// `memory.copy`: overlapping ranges behave as if copied through a temporary buffer.
    pub fn copy_within(&mut self, dst: u32, src: u32, n: u32) -> Result<(), OutOfBounds> {
        let s = checked_range(u64::from(src), u64::from(n), self.buf.len())?;
        let d = checked_range(u64::from(dst), u64::from(n), self.buf.len())?;
        self.buf.copy_within(s, d.start);
        Ok(())
    }

    /// `memory.init`: copy `n` bytes of `data` starting at `src` into memory at `dst`.
    pub fn init(&mut self, dst: u32, data: &[u8], src: u32, n: u32) -> Result<(), OutOfBounds> {
        let s = checked_range(u64::from(src), u64::from(n), data.len())?;
        let d = checked_range(u64::from(dst), u64::from(n), self.buf.len())?;
        self.buf[d].copy_from_slice(&data[s]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Limits;

    fn memory(min: u32, max: Option<u32>) -> MemoryInstance {
        MemoryInstance::new(&MemoryType::new(Limits::new(min, max)), MAX_PAGES).unwrap()
    }

    #[test]
    fn grow_and_bounds() {
        let mut mem = memory(1, Some(2));
        assert_eq!(mem.size_pages(), 1);
        assert!(mem.load::<1>((PAGE_SIZE - 1) as u64).is_ok());
        assert!(mem.load::<1>(PAGE_SIZE as u64).is_err());
        assert!(mem.load::<4>((PAGE_SIZE - 3) as u64).is_err());
        assert_eq!(mem.grow(1), Some(1));
        assert_eq!(mem.size_pages(), 2);
        assert!(mem.load::<1>((2 * PAGE_SIZE - 1) as u64).is_ok());
        assert_eq!(mem.grow(1), None);
        assert_eq!(mem.size_pages(), 2);
        assert_eq!(mem.grow(0), Some(2));
    }

    #[test]
    fn cap_limits_growth() {
        let mut mem = MemoryInstance::new(&MemoryType::new(Limits::new(0, None)), 3).unwrap();
        assert_eq!(mem.grow(3), Some(0));
        assert_eq!(mem.grow(1), None);
        assert_eq!(mem.grow(u32::MAX), None);
    }

    #[test]
    fn le_load_store() {
        let mut mem = memory(1, None);
        mem.store(0, 0x1122_3344u32.to_le_bytes()).unwrap();
        assert_eq!(mem.load::<1>(0).unwrap(), [0x44]);
        assert_eq!(u16::from_le_bytes(mem.load(0).unwrap()), 0x3344);
        assert_eq!(u32::from_le_bytes(mem.load(0).unwrap()), 0x1122_3344);

        mem.store(40, 0x7FF8_0000_0000_0001u64.to_le_bytes()).unwrap();
        assert_eq!(u64::from_le_bytes(mem.load(40).unwrap()), 0x7FF8_0000_0000_0001);
    }

    #[test]
    fn effective_address_does_not_wrap() {
        let mem = memory(1, None);
        let ea = u64::from(u32::MAX) + 4;
        assert_eq!(
            mem.load::<4>(ea),
            Err(OutOfBounds { addr: ea, len: 4, size: PAGE_SIZE as u64 })
        );
    }

    #[test]
    fn bulk_ops_check_whole_range_first() {
        let mut mem = memory(1, None);
        mem.fill(0, 0xAA, 8).unwrap();
        assert!(mem.fill((PAGE_SIZE - 4) as u32, 0xBB, 8).is_err());
        assert!(mem.data()[PAGE_SIZE - 4..].iter().all(|&b| b == 0));

        // zero-length access at the very end is in bounds
        assert!(mem.fill(PAGE_SIZE as u32, 0, 0).is_ok());
        assert!(mem.fill(PAGE_SIZE as u32 + 1, 0, 0).is_err());
    }

    #[test]
    fn copy_overlapping_both_directions() {
        let mut mem = memory(1, None);
        mem.data_mut()[..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        mem.copy_within(2, 0, 4).unwrap();
        assert_eq!(&mem.data()[..6], &[1, 2, 1, 2, 3, 4]);
        mem.copy_within(0, 1, 5).unwrap();
        assert_eq!(&mem.data()[..6], &[2, 1, 2, 3, 4, 4]);
    }

    #[test]
    fn init_checks_segment_range() {
        let mut mem = memory(1, None);
        mem.init(10, &[9, 8, 7], 1, 2).unwrap();
        assert_eq!(&mem.data()[10..12], &[8, 7]);
        assert!(mem.init(10, &[9, 8, 7], 2, 2).is_err());
    }
}
