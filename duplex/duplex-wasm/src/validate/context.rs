//! Validation-mode state: the type stack and the control-frame stack.

use std::borrow::Cow;
use std::collections::HashSet;

use crate::error::CodeError;
use crate::model::{
    BlockType, FuncIdx, FuncType, GlobalType, IndexSpaces, Module, TableType, ValType,
};
use crate::validate::tables::{JumpTable, TypeAnnotations};
use crate::vm::stack::Stack;

/// Which opcode opened a control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOp {
    Block,
    Loop,
    If,
    Else,
    /// Synthesized at `end` of an `if` that had no `else`.
    EmptyElse,
    /// Function body.
    Invoke,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    pub op: FrameOp,
    /// Offset of the opening opcode.
    pub start: usize,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
    /// Type stack height at entry; pops below it are forbidden.
    pub height: usize,
    pub unreachable: bool,
    /// Index into the jump table; `None` for the function body.
    pub slot: Option<usize>,
}

impl ControlFrame {
    /// Types carried by a branch to this frame's label.
    pub fn label_types(&self) -> &[ValType] {
        if self.op == FrameOp::Loop {
            &self.params
        } else {
            &self.results
        }
    }
}

/// Operand types at one reachable instruction boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackShape {
    pub offset: usize,
    pub types: Vec<ValType>,
}

fn compatible(expect: ValType, actual: ValType) -> bool {
    expect == actual
        || expect == ValType::Unknown
        || actual == ValType::Unknown
        || (expect == ValType::AnyRef && actual.is_ref())
}

pub struct ValidationContext<'m> {
    pub(crate) module: &'m Module,
    pub(crate) spaces: &'m IndexSpaces,
    /// Functions `ref.func` may name. Constant expressions add to it.
    pub(crate) declared: Cow<'m, HashSet<FuncIdx>>,
    pub(crate) const_expr: bool,
    /// Globals a constant expression may read: those defined before the one being initialized.
    pub(crate) global_limit: u32,
    pub(crate) locals: Vec<ValType>,
    pub(crate) stack: Stack<ValType>,
    pub(crate) frames: Vec<ControlFrame>,
    pub(crate) annotations: TypeAnnotations,
    pub(crate) jumps: JumpTable,
    pub(crate) shapes: Option<Vec<StackShape>>,
}

impl<'m> ValidationContext<'m> {
    pub fn new(
        module: &'m Module,
        spaces: &'m IndexSpaces,
        declared: Cow<'m, HashSet<FuncIdx>>,
    ) -> Self {
        Self {
            module,
            spaces,
            declared,
            const_expr: false,
            global_limit: u32::MAX,
            locals: Vec::new(),
            stack: Stack::new(),
            frames: Vec::new(),
            annotations: TypeAnnotations::default(),
            jumps: JumpTable::default(),
            shapes: None,
        }
    }

    fn top(&self) -> Result<&ControlFrame, CodeError> {
        self.frames.last().ok_or(CodeError::UnexpectedEnd)
    }

    pub(crate) fn is_reachable(&self) -> bool {
        self.frames.last().is_some_and(|f| !f.unreachable)
    }

    pub(crate) fn push_valtype(&mut self, t: ValType) {
        self.stack.push(t);
    }

    pub(crate) fn push_valtypes(&mut self, types: &[ValType]) {
        self.stack.extend_from_slice(types);
    }

    /// Pop one operand of type `expect` and return the type actually found.
    /// In an unreachable frame, popping at the floor yields `Unknown`.
    pub(crate) fn pop_valtype(&mut self, expect: ValType) -> Result<ValType, CodeError> {
        let frame = self.top()?;
        if self.stack.len() == frame.height {
            if frame.unreachable {
                return Ok(ValType::Unknown);
            }
            return Err(CodeError::StackUnderflow);
        }
        let actual = self.stack.pop().ok_or(CodeError::StackUnderflow)?;
        if !compatible(expect, actual) {
            return Err(CodeError::TypeMismatch { expected: expect, found: actual });
        }
        Ok(if actual == ValType::Unknown { expect } else { actual })
    }

    pub(crate) fn pop_valtypes(&mut self, types: &[ValType]) -> Result<(), CodeError> {
        for &t in types.iter().rev() {
            self.pop_valtype(t)?;
        }
        Ok(())
    }

    /// Check the stack top against `types` without popping.
    pub(crate) fn peek_valtypes(&self, types: &[ValType]) -> Result<(), CodeError> {
        let frame = self.top()?;
        let avail = self.stack.len() - frame.height;
        for (depth, &expect) in types.iter().rev().enumerate() {
            if depth >= avail {
                if frame.unreachable {
                    return Ok(());
                }
                return Err(CodeError::StackUnderflow);
            }
            let actual = self.stack.peek(depth).ok_or(CodeError::StackUnderflow)?;
            if !compatible(expect, actual) {
                return Err(CodeError::TypeMismatch { expected: expect, found: actual });
            }
        }
        Ok(())
    }

    /// Enter the polymorphic state after an unconditional transfer.
    pub(crate) fn mark_unreachable(&mut self) -> Result<(), CodeError> {
        let frame = self.frames.last_mut().ok_or(CodeError::UnexpectedEnd)?;
        frame.unreachable = true;
        self.stack.truncate(frame.height);
        Ok(())
    }

    /// Open a frame; its parameters must already have been popped by the caller.
    pub(crate) fn push_ctrlframe(
        &mut self,
        op: FrameOp,
        start: usize,
        params: Vec<ValType>,
        results: Vec<ValType>,
        slot: Option<usize>,
    ) {
        let slot = match (op, slot) {
            (FrameOp::Invoke, _) => None,
            (_, Some(s)) => Some(s),
            (_, None) => Some(self.jumps.open(start)),
        };
        let height = self.stack.len();
        self.push_valtypes(&params);
        self.frames.push(ControlFrame {
            op,
            start,
            params,
            results,
            height,
            unreachable: false,
            slot,
        });
    }

    /// Close the top frame: its results must be exactly what is left above its floor.
    pub(crate) fn pop_ctrlframe(&mut self) -> Result<ControlFrame, CodeError> {
        let results = self.top()?.results.clone();
        self.pop_valtypes(&results)?;
        let frame = self.frames.pop().ok_or(CodeError::UnexpectedEnd)?;
        if self.stack.len() != frame.height {
            return Err(CodeError::ValuesRemaining(self.stack.len() - frame.height));
        }
        Ok(frame)
    }

    /// Types carried by a branch `depth` labels out.
    pub(crate) fn label_types(&self, depth: u32) -> Result<Vec<ValType>, CodeError> {
        let i = self
            .frames
            .len()
            .checked_sub(depth as usize + 1)
            .ok_or(CodeError::UnknownLabel(depth))?;
        Ok(self.frames[i].label_types().to_vec())
    }

    /// Declared results of the function being validated.
    pub(crate) fn return_types(&self) -> Result<Vec<ValType>, CodeError> {
        self.frames
            .first()
            .map(|f| f.results.clone())
            .ok_or(CodeError::UnexpectedEnd)
    }

    pub(crate) fn block_signature(&self, bt: BlockType) -> Result<FuncType, CodeError> {
        self.module.block_signature(bt).ok_or(CodeError::UnknownIndex {
            space: "type",
            index: match bt {
                BlockType::Func(i) => i,
                _ => 0,
            },
        })
    }

    pub(crate) fn func_type(&self, idx: FuncIdx) -> Result<&'m FuncType, CodeError> {
        self.spaces
            .func_type(self.module, idx)
            .ok_or(CodeError::UnknownIndex { space: "function", index: idx })
    }

    pub(crate) fn type_at(&self, idx: u32) -> Result<&'m FuncType, CodeError> {
        self.module
            .types
            .get(idx as usize)
            .ok_or(CodeError::UnknownIndex { space: "type", index: idx })
    }

    pub(crate) fn local(&self, idx: u32) -> Result<ValType, CodeError> {
        self.locals
            .get(idx as usize)
            .copied()
            .ok_or(CodeError::UnknownIndex { space: "local", index: idx })
    }

    pub(crate) fn global(&self, idx: u32) -> Result<GlobalType, CodeError> {
        self.spaces
            .globals
            .get(idx as usize)
            .copied()
            .ok_or(CodeError::UnknownIndex { space: "global", index: idx })
    }

    pub(crate) fn table(&self, idx: u32) -> Result<TableType, CodeError> {
        self.spaces
            .tables
            .get(idx as usize)
            .copied()
            .ok_or(CodeError::UnknownIndex { space: "table", index: idx })
    }

    pub(crate) fn require_memory(&self, idx: u32) -> Result<(), CodeError> {
        if (idx as usize) < self.spaces.memories.len() {
            Ok(())
        } else {
            Err(CodeError::UnknownIndex { space: "memory", index: idx })
        }
    }

    pub(crate) fn record_shape(&mut self, offset: usize) {
        let reachable = self.is_reachable();
        if let Some(shapes) = self.shapes.as_mut() {
            if reachable {
                shapes.push(StackShape { offset, types: self.stack.as_slice().to_vec() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'m>(m: &'m Module, spaces: &'m IndexSpaces) -> ValidationContext<'m> {
        let mut v = ValidationContext::new(m, spaces, Cow::Owned(HashSet::new()));
        v.push_ctrlframe(FrameOp::Invoke, 0, vec![], vec![ValType::I32], None);
        v
    }

    #[test]
    fn polymorphic_after_unreachable() {
        let m = Module::default();
        let spaces = IndexSpaces::default();
        let mut v = ctx(&m, &spaces);
        assert_eq!(v.pop_valtype(ValType::I32), Err(CodeError::StackUnderflow));
        v.push_valtype(ValType::F32);
        v.mark_unreachable().unwrap();
        assert!(v.stack.is_empty());
        assert_eq!(v.pop_valtype(ValType::I64), Ok(ValType::Unknown));
        assert_eq!(v.pop_valtype(ValType::Unknown), Ok(ValType::Unknown));
        v.push_valtype(ValType::Unknown);
        assert_eq!(v.pop_valtype(ValType::F64), Ok(ValType::F64));
    }

    #[test]
    fn pop_ctrlframe_requires_exact_results() {
        let m = Module::default();
        let spaces = IndexSpaces::default();
        let mut v = ctx(&m, &spaces);
        v.push_ctrlframe(FrameOp::Block, 1, vec![], vec![ValType::I32], None);
        v.push_valtype(ValType::I32);
        v.push_valtype(ValType::I32);
        assert_eq!(v.pop_ctrlframe(), Err(CodeError::ValuesRemaining(1)));
    }

    #[test]
    fn peek_does_not_consume() {
        let m = Module::default();
        let spaces = IndexSpaces::default();
        let mut v = ctx(&m, &spaces);
        v.push_valtypes(&[ValType::I64, ValType::FuncRef]);
        v.peek_valtypes(&[ValType::I64, ValType::AnyRef]).unwrap();
        assert_eq!(
            v.peek_valtypes(&[ValType::FuncRef]),
            Ok(())
        );
        assert!(matches!(
            v.peek_valtypes(&[ValType::I32, ValType::FuncRef]),
            Err(CodeError::TypeMismatch { expected: ValType::I32, found: ValType::I64 })
        ));
        assert_eq!(v.stack.len(), 2);
        assert_eq!(v.label_types(0), Ok(vec![ValType::I32]));
        assert_eq!(v.label_types(1), Err(CodeError::UnknownLabel(1)));
    }
}
