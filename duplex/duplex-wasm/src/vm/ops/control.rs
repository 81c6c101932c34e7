//! Structured control flow and calls.

use tracing::trace;

use crate::binary::Cursor;
use crate::error::{CodeError, TrapKind};
use crate::model::{BlockType, RefType};
use crate::validate::{ControlFrame, FrameOp};
use crate::vm::event::Event;
use crate::vm::frames::LabelKind;
use crate::vm::mode::Cx;

fn read_block_type(cur: &mut Cursor<'_>) -> Result<BlockType, CodeError> {
    let raw = cur.read_s33()?;
    BlockType::from_s33(raw).ok_or(CodeError::BadImmediate("block type"))
}

/// Open a frame (validation) or label (execution) for the construct at `start`.
fn open(
    cx: &mut Cx<'_, '_>,
    start: usize,
    bt: BlockType,
    body: usize,
    op: FrameOp,
    kind: LabelKind,
) -> Result<(), CodeError> {
    match cx {
        Cx::Validate(v) => {
            let sig = v.block_signature(bt)?;
            v.pop_valtypes(&sig.params)?;
            v.push_ctrlframe(op, start, sig.params, sig.results, None);
            Ok(())
        }
        Cx::Execute(e) => e.push_label(kind, start, bt, body),
    }
}

pub(crate) fn unreachable(cx: &mut Cx<'_, '_>, _: &mut Cursor<'_>) -> Result<(), CodeError> {
    match cx {
        Cx::Validate(v) => v.mark_unreachable(),
        Cx::Execute(e) => e.trap(TrapKind::Unreachable, ""),
    }
}

pub(crate) fn nop(_: &mut Cx<'_, '_>, _: &mut Cursor<'_>) -> Result<(), CodeError> {
    Ok(())
}

pub(crate) fn block(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let start = cur.offset() - 1;
    let bt = read_block_type(cur)?;
    open(cx, start, bt, cur.offset(), FrameOp::Block, LabelKind::Block)
}

pub(crate) fn loop_(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let start = cur.offset() - 1;
    let bt = read_block_type(cur)?;
    open(cx, start, bt, cur.offset(), FrameOp::Loop, LabelKind::Loop)
}

pub(crate) fn if_(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let start = cur.offset() - 1;
    let bt = read_block_type(cur)?;
    let cond = cx.pop::<i32>()?;
    open(cx, start, bt, cur.offset(), FrameOp::If, LabelKind::If)?;
    match cx {
        Cx::Execute(e) if cond == 0 => e.raise(Event::Branch { level: 0, goto_else: true }),
        _ => Ok(()),
    }
}

pub(crate) fn else_(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let pc = cur.offset() - 1;
    match cx {
        Cx::Validate(v) => {
            if v.frames.last().map(|f| f.op) != Some(FrameOp::If) {
                return Err(CodeError::ElseWithoutIf);
            }
            let ControlFrame { start, params, results, slot, .. } = v.pop_ctrlframe()?;
            if let Some(slot) = slot {
                v.jumps.set_else(slot, pc);
            }
            v.push_ctrlframe(FrameOp::Else, start, params, results, slot);
            Ok(())
        }
        // Falling out of the then arm: leave the construct.
        Cx::Execute(e) => e.raise(Event::branch(0)),
    }
}

pub(crate) fn end(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let pc = cur.offset() - 1;
    match cx {
        Cx::Validate(v) => {
            let mut frame = v.pop_ctrlframe()?;
            if let Some(slot) = frame.slot {
                v.jumps.set_end(slot, pc);
            }
            if frame.op == FrameOp::If {
                // `if` without `else` behaves as `if .. else end`.
                trace!(start = frame.start, "checking implicit empty else");
                let ControlFrame { start, params, results, slot, .. } = frame;
                v.push_ctrlframe(FrameOp::EmptyElse, start, params, results, slot);
                frame = v.pop_ctrlframe()?;
            }
            if frame.op == FrameOp::Invoke {
                if !cur.is_eof() {
                    return Err(CodeError::TrailingBytes);
                }
            } else {
                v.push_valtypes(&frame.results);
            }
            Ok(())
        }
        Cx::Execute(e) => {
            if e.labels_in_frame()? > 0 {
                e.labels.pop();
                Ok(())
            } else {
                e.frame_exit()
            }
        }
    }
}

pub(crate) fn br(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let depth = cur.read_u32()?;
    match cx {
        Cx::Validate(v) => {
            let types = v.label_types(depth)?;
            v.pop_valtypes(&types)?;
            v.mark_unreachable()
        }
        Cx::Execute(e) => e.raise(Event::branch(depth)),
    }
}

pub(crate) fn br_if(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let depth = cur.read_u32()?;
    let cond = cx.pop::<i32>()?;
    match cx {
        Cx::Validate(v) => {
            let types = v.label_types(depth)?;
            v.pop_valtypes(&types)?;
            v.push_valtypes(&types);
            Ok(())
        }
        Cx::Execute(e) if cond != 0 => e.raise(Event::branch(depth)),
        Cx::Execute(_) => Ok(()),
    }
}

pub(crate) fn br_table(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let count = cur.read_u32()?;
    let index = cx.pop::<i32>()? as u32;
    let validating = cx.is_validating();
    let mut targets = Vec::new();
    let mut chosen = None;
    for i in 0..count {
        let depth = cur.read_u32()?;
        if validating {
            targets.push(depth);
        } else if i == index {
            chosen = Some(depth);
        }
    }
    let default = cur.read_u32()?;
    match cx {
        Cx::Validate(v) => {
            let default_types = v.label_types(default)?;
            for depth in targets {
                let types = v.label_types(depth)?;
                if types.len() != default_types.len() {
                    return Err(CodeError::BrTableArity {
                        default: default_types.len(),
                        target: types.len(),
                    });
                }
                v.peek_valtypes(&types)?;
            }
            v.pop_valtypes(&default_types)?;
            v.mark_unreachable()
        }
        // An out-of-range index takes the default.
        Cx::Execute(e) => e.raise(Event::branch(chosen.unwrap_or(default))),
    }
}

pub(crate) fn return_(cx: &mut Cx<'_, '_>, _: &mut Cursor<'_>) -> Result<(), CodeError> {
    match cx {
        Cx::Validate(v) => {
            let types = v.return_types()?;
            v.pop_valtypes(&types)?;
            v.mark_unreachable()
        }
        Cx::Execute(e) => {
            let level = e.labels_in_frame()?;
            e.raise(Event::branch(level))
        }
    }
}

pub(crate) fn call(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let callee = cur.read_u32()?;
    match cx {
        Cx::Validate(v) => {
            let ty = v.func_type(callee)?;
            v.pop_valtypes(&ty.params)?;
            v.push_valtypes(&ty.results);
            Ok(())
        }
        Cx::Execute(e) => e.raise(Event::Call { callee }),
    }
}

pub(crate) fn call_indirect(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let type_idx = cur.read_u32()?;
    let table_idx = cur.read_u32()?;
    let index = cx.pop::<i32>()? as u32;
    match cx {
        Cx::Validate(v) => {
            let ty = v.type_at(type_idx)?;
            if v.table(table_idx)?.elem != RefType::FuncRef {
                return Err(CodeError::Mismatch("call_indirect requires a funcref table"));
            }
            v.pop_valtypes(&ty.params)?;
            v.push_valtypes(&ty.results);
            Ok(())
        }
        Cx::Execute(e) => {
            let slot = e.table(table_idx)?.get(index);
            let addr = match slot {
                Ok(Some(addr)) => addr,
                Ok(None) => {
                    return e.trap(TrapKind::NullReference, format_args!("table {table_idx} slot {index}"))
                }
                Err(oob) => return e.trap(TrapKind::OutOfBoundsTable, oob),
            };
            let same = {
                let actual = e
                    .instance
                    .func(addr)
                    .ok_or(CodeError::UnknownIndex { space: "function", index: addr })?;
                let expected = e
                    .module
                    .module()
                    .types
                    .get(type_idx as usize)
                    .ok_or(CodeError::UnknownIndex { space: "type", index: type_idx })?;
                actual.ty == *expected
            };
            if !same {
                return e.trap(
                    TrapKind::IndirectCallTypeMismatch,
                    format_args!("function {addr} is not of type {type_idx}"),
                );
            }
            e.raise(Event::Call { callee: addr })
        }
    }
}
