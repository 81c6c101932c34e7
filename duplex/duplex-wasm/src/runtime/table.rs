//! Table instance: typed reference slots with growth and bulk operations.

use thiserror::Error;
use tracing::debug;

use crate::model::{RefType, TableType, Value};

/// A reference slot: a function address or host handle, `None` for null.
pub type Ref = Option<u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{len} elements at {index} exceed table size {size}")]
pub struct TableOutOfBounds {
    pub index: u64,
    pub len: u64,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct TableInstance {
    elems: Vec<Ref>,
    ty: TableType,
    max: u32,
}

impl TableInstance {
    /// Create a table of `ty.limits.min` null slots; the maximum is capped at `cap`.
    ///
    /// `None` when the initial size is above that maximum or cannot be allocated.
    pub fn new(ty: &TableType, cap: u32) -> Option<Self> {
        let max = ty.limits.max.unwrap_or(u32::MAX).min(cap);
        let min = ty.limits.min;
        if min > max {
            debug!(min, max, "table minimum above maximum");
            return None;
        }
        let mut elems = Vec::new();
        if elems.try_reserve_exact(min as usize).is_err() {
            debug!(min, "table allocation failed");
            return None;
        }
        elems.resize(min as usize, None);
        Some(Self { elems, ty: *ty, max })
    }

    pub fn ty(&self) -> &TableType {
        &self.ty
    }

    pub fn elem_type(&self) -> RefType {
        self.ty.elem
    }

    pub fn size(&self) -> u32 {
        self.elems.len() as u32
    }

    fn range(&self, index: u32, len: u32) -> Result<std::ops::Range<usize>, TableOutOfBounds> {
        let end = u64::from(index) + u64::from(len);
        if end > self.elems.len() as u64 {
            return Err(TableOutOfBounds {
                index: u64::from(index),
                len: u64::from(len),
                size: self.elems.len() as u64,
            });
        }
        Ok(index as usize..end as usize)
    }

    pub fn get(&self, index: u32) -> Result<Ref, TableOutOfBounds> {
        let r = self.range(index, 1)?;
        Ok(self.elems[r.start])
    }

    /// Slot at `index` as a typed value.
    pub fn get_value(&self, index: u32) -> Result<Value, TableOutOfBounds> {
        self.get(index).map(|r| self.ty.elem.value(r))
    }

    pub fn set(&mut self, index: u32, val: Ref) -> Result<(), TableOutOfBounds> {
        let r = self.range(index, 1)?;
        self.elems[r.start] = val;
        Ok(())
    }

    /// Grow by `delta` slots filled with `init`. Returns the previous size, or
    /// `None` (table unchanged) when the maximum would be exceeded or allocation fails.
    pub fn grow(&mut self, delta: u32, init: Ref) -> Option<u32> {
        let prev = self.size();
        let new = prev.checked_add(delta).filter(|&n| n <= self.max)?;
        self.elems.try_reserve_exact(delta as usize).ok()?;
        self.elems.resize(new as usize, init);
        Some(prev)
    }

    pub fn fill(&mut self, index: u32, val: Ref, n: u32) -> Result<(), TableOutOfBounds> {
        let r = self.range(index, n)?;
        self.elems[r].fill(val);
        Ok(())
    }

    /// Copy inside one table; overlapping ranges behave as if copied through a temporary.
    pub fn copy_within(&mut self, dst: u32, src: u32, n: u32) -> Result<(), TableOutOfBounds> {
        let s = self.range(src, n)?;
        let d = self.range(dst, n)?;
        self.elems.copy_within(s, d.start);
        Ok(())
    }

    /// Read `n` slots starting at `src`.
    pub fn slice(&self, src: u32, n: u32) -> Result<&[Ref], TableOutOfBounds> {
        let r = self.range(src, n)?;
        Ok(&self.elems[r])
    }

    /// Write `vals` starting at `dst`, checking the whole range first.
    pub fn write(&mut self, dst: u32, vals: &[Ref]) -> Result<(), TableOutOfBounds> {
        let r = self.range(dst, vals.len() as u32)?;
        self.elems[r].copy_from_slice(vals);
        Ok(())
    }

    /// `table.init`: copy `n` slots of `segment` starting at `src` into the table at `dst`.
    pub fn init(&mut self, dst: u32, segment: &[Ref], src: u32, n: u32) -> Result<(), TableOutOfBounds> {
        let s_end = u64::from(src) + u64::from(n);
        if s_end > segment.len() as u64 {
            return Err(TableOutOfBounds {
                index: u64::from(src),
                len: u64::from(n),
                size: segment.len() as u64,
            });
        }
        let d = self.range(dst, n)?;
        self.elems[d].copy_from_slice(&segment[src as usize..s_end as usize]);
        Ok(())
    }
}
