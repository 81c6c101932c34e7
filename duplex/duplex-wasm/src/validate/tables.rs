//! Side tables produced by validation and read by execution.

use crate::model::ValType;

/// Concrete types resolved for value-polymorphic instructions (`drop`,
/// `select`, `ref.is_null`), keyed by the code offset just past the opcode.
///
/// Validation visits code linearly, so entries arrive in ascending offset
/// order and lookups are binary searches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeAnnotations {
    entries: Vec<(u32, ValType)>,
}

impl TypeAnnotations {
    pub fn record(&mut self, offset: usize, ty: ValType) {
        let offset = offset as u32;
        debug_assert!(self.entries.last().map_or(true, |&(last, _)| last < offset));
        self.entries.push((offset, ty));
    }

    pub fn get(&self, offset: usize) -> Option<ValType> {
        let offset = u32::try_from(offset).ok()?;
        self.entries
            .binary_search_by_key(&offset, |&(o, _)| o)
            .ok()
            .map(|i| self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Matching `else` / `end` offsets of one `block`, `loop` or `if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpSlot {
    /// Offset of the opening opcode.
    pub start: u32,
    /// Offset of the `else` opcode, if the construct has one.
    pub else_pc: Option<u32>,
    /// Offset of the matching `end` opcode.
    pub end_pc: u32,
}

/// Jump slots of a function body, ordered by opening offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JumpTable {
    slots: Vec<JumpSlot>,
}

impl JumpTable {
    /// Allocate the slot for a construct opening at `start`; returns its index.
    pub fn open(&mut self, start: usize) -> usize {
        self.slots.push(JumpSlot { start: start as u32, else_pc: None, end_pc: 0 });
        self.slots.len() - 1
    }

    pub fn set_else(&mut self, slot: usize, pc: usize) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.else_pc = Some(pc as u32);
        }
    }

    pub fn set_end(&mut self, slot: usize, pc: usize) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.end_pc = pc as u32;
        }
    }

    /// Slot of the construct whose opening opcode sits at `start`.
    pub fn get(&self, start: usize) -> Option<&JumpSlot> {
        let start = u32::try_from(start).ok()?;
        self.slots
            .binary_search_by_key(&start, |s| s.start)
            .ok()
            .map(|i| &self.slots[i])
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotations_lookup_by_offset() {
        let mut a = TypeAnnotations::default();
        a.record(3, ValType::I64);
        a.record(9, ValType::FuncRef);
        assert_eq!(a.get(3), Some(ValType::I64));
        assert_eq!(a.get(9), Some(ValType::FuncRef));
        assert_eq!(a.get(4), None);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn jump_slots_resolve_nested_blocks() {
        let mut j = JumpTable::default();
        let outer = j.open(0);
        let inner = j.open(2);
        j.set_else(inner, 6);
        j.set_end(inner, 9);
        j.set_end(outer, 12);
        assert_eq!(j.get(2), Some(&JumpSlot { start: 2, else_pc: Some(6), end_pc: 9 }));
        assert_eq!(j.get(0).map(|s| s.end_pc), Some(12));
        assert!(j.get(1).is_none());
    }
}
