//! Operand stack shared by both modes: 32-bit cells while executing,
//! value types while validating.

use crate::model::{ValType, Value, RESERVED_REF};

/// One untyped execution stack slot. 64-bit values take two cells (low word first).
pub type Cell = u32;

/// Cell encoding of a null reference.
pub const NULL_REF: Cell = RESERVED_REF;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stack<T> {
    items: Vec<T>,
}

impl<T: Copy> Stack<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn push(&mut self, v: T) {
        self.items.push(v);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Entry `depth` positions below the top (0 = top).
    pub fn peek(&self, depth: usize) -> Option<T> {
        let i = self.items.len().checked_sub(depth + 1)?;
        self.items.get(i).copied()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn extend_from_slice(&mut self, items: &[T]) {
        self.items.extend_from_slice(items);
    }

    pub fn truncate(&mut self, height: usize) {
        self.items.truncate(height);
    }

    /// Remove the top `n` entries, returning false if fewer are present.
    pub fn drop_n(&mut self, n: usize) -> bool {
        match self.items.len().checked_sub(n) {
            Some(h) => {
                self.items.truncate(h);
                true
            }
            None => false,
        }
    }

    /// Cut the stack down to `height`, keeping the topmost `keep` entries on top of it.
    pub fn rewind(&mut self, height: usize, keep: usize) {
        let len = self.items.len();
        let top = len.saturating_sub(keep);
        if top > height {
            self.items.copy_within(top..len, height);
            self.items.truncate(height + (len - top));
        }
    }
}

/// Numeric types that move between Rust values and stack cells.
pub(crate) trait Scalar: Copy + Default {
    const TYPE: ValType;
    fn read(cells: &[Cell]) -> Self;
    fn write(self, stack: &mut Stack<Cell>);
}

fn read_u64(cells: &[Cell]) -> u64 {
    u64::from(cells[0]) | (u64::from(cells[1]) << 32)
}

fn write_u64(v: u64, stack: &mut Stack<Cell>) {
    stack.push(v as u32);
    stack.push((v >> 32) as u32);
}

impl Scalar for i32 {
    const TYPE: ValType = ValType::I32;
    fn read(cells: &[Cell]) -> Self {
        cells[0] as i32
    }
    fn write(self, stack: &mut Stack<Cell>) {
        stack.push(self as u32);
    }
}

impl Scalar for i64 {
    const TYPE: ValType = ValType::I64;
    fn read(cells: &[Cell]) -> Self {
        read_u64(cells) as i64
    }
    fn write(self, stack: &mut Stack<Cell>) {
        write_u64(self as u64, stack);
    }
}

impl Scalar for f32 {
    const TYPE: ValType = ValType::F32;
    fn read(cells: &[Cell]) -> Self {
        f32::from_bits(cells[0])
    }
    fn write(self, stack: &mut Stack<Cell>) {
        stack.push(self.to_bits());
    }
}

impl Scalar for f64 {
    const TYPE: ValType = ValType::F64;
    fn read(cells: &[Cell]) -> Self {
        f64::from_bits(read_u64(cells))
    }
    fn write(self, stack: &mut Stack<Cell>) {
        write_u64(self.to_bits(), stack);
    }
}

pub(crate) fn cell_to_ref(c: Cell) -> Option<u32> {
    (c != NULL_REF).then_some(c)
}

pub(crate) fn ref_to_cell(r: Option<u32>) -> Cell {
    r.unwrap_or(NULL_REF)
}

impl Stack<Cell> {
    pub(crate) fn pop_scalar<S: Scalar>(&mut self) -> Option<S> {
        let base = self.items.len().checked_sub(S::TYPE.cells())?;
        let v = S::read(&self.items[base..]);
        self.items.truncate(base);
        Some(v)
    }

    pub(crate) fn push_scalar<S: Scalar>(&mut self, v: S) {
        v.write(self);
    }

    /// Pop a value, interpreting the cells as `ty`.
    pub fn pop_value(&mut self, ty: ValType) -> Option<Value> {
        Some(match ty {
            ValType::I32 => Value::I32(self.pop_scalar()?),
            ValType::I64 => Value::I64(self.pop_scalar()?),
            ValType::F32 => Value::F32(self.pop()?),
            ValType::F64 => Value::F64(self.pop_scalar::<i64>()? as u64),
            ValType::FuncRef | ValType::AnyRef => Value::FuncRef(cell_to_ref(self.pop()?)),
            ValType::ExternRef => Value::ExternRef(cell_to_ref(self.pop()?)),
            ValType::Unknown => return None,
        })
    }

    pub fn push_value(&mut self, v: Value) {
        match v {
            Value::I32(x) => self.push_scalar(x),
            Value::I64(x) => self.push_scalar(x),
            Value::F32(bits) => self.push(bits),
            Value::F64(bits) => write_u64(bits, self),
            Value::FuncRef(r) | Value::ExternRef(r) => self.push(ref_to_cell(r)),
        }
    }
}
