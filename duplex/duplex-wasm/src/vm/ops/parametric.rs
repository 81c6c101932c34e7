//! `drop`, `select` and reference instructions.
//!
//! `drop`, untyped `select` and `ref.is_null` accept operands of any type.
//! Validation records the type it resolved at the site so execution knows
//! how many cells to move.

use crate::binary::Cursor;
use crate::error::CodeError;
use crate::model::{RefType, ValType};
use crate::vm::mode::Cx;
use crate::vm::stack::{Cell, Stack, NULL_REF};

/// Keep the first of two `n`-cell operands when `cond` is nonzero, else the second.
fn choose(stack: &mut Stack<Cell>, cond: i32, n: usize) -> Result<(), CodeError> {
    let len = stack.len();
    let first = len.checked_sub(2 * n).ok_or(CodeError::StackUnderflow)?;
    if cond != 0 {
        stack.truncate(len - n);
    } else {
        stack.rewind(first, n);
    }
    Ok(())
}

pub(crate) fn drop(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let site = cur.offset();
    match cx {
        Cx::Validate(v) => {
            let t = v.pop_valtype(ValType::Unknown)?;
            v.annotations.record(site, t);
            Ok(())
        }
        Cx::Execute(e) => {
            let n = e.annotation(site)?.cells();
            if e.stack.drop_n(n) {
                Ok(())
            } else {
                Err(CodeError::StackUnderflow)
            }
        }
    }
}

pub(crate) fn select(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let site = cur.offset();
    let cond = cx.pop::<i32>()?;
    match cx {
        Cx::Validate(v) => {
            let t2 = v.pop_valtype(ValType::Unknown)?;
            let t1 = v.pop_valtype(t2)?;
            let t = if t2 == ValType::Unknown { t1 } else { t2 };
            if !(t.is_num() || t == ValType::Unknown) {
                return Err(CodeError::Mismatch("select without a type annotation needs numeric operands"));
            }
            v.annotations.record(site, t);
            v.push_valtype(t);
            Ok(())
        }
        Cx::Execute(e) => {
            let n = e.annotation(site)?.cells();
            choose(&mut e.stack, cond, n)
        }
    }
}

pub(crate) fn select_typed(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    if cur.read_u32()? != 1 {
        return Err(CodeError::BadImmediate("select type count"));
    }
    let t = ValType::from_byte(cur.read_u8()?).ok_or(CodeError::BadImmediate("value type"))?;
    let cond = cx.pop::<i32>()?;
    match cx {
        Cx::Validate(v) => {
            v.pop_valtype(t)?;
            v.pop_valtype(t)?;
            v.push_valtype(t);
            Ok(())
        }
        Cx::Execute(e) => choose(&mut e.stack, cond, t.cells()),
    }
}

pub(crate) fn ref_null(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let t = RefType::from_byte(cur.read_u8()?).ok_or(CodeError::BadImmediate("reference type"))?;
    cx.push_ref(t.into(), None);
    Ok(())
}

// Accepts any reference type; the resolved type is recorded like `drop`'s.
pub(crate) fn ref_is_null(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let site = cur.offset();
    match cx {
        Cx::Validate(v) => {
            // An operand from unreachable code stays `Unknown` rather than `AnyRef`.
            let t = match v.pop_valtype(ValType::AnyRef)? {
                ValType::AnyRef => ValType::Unknown,
                t => t,
            };
            v.annotations.record(site, t);
            v.push_valtype(ValType::I32);
        }
        Cx::Execute(e) => {
            let n = e.annotation(site)?.cells();
            let top = e.stack.len().checked_sub(n).ok_or(CodeError::StackUnderflow)?;
            let is_null = e.stack.as_slice()[top] == NULL_REF;
            e.stack.truncate(top);
            e.stack.push_scalar(is_null as i32);
        }
    }
    Ok(())
}

pub(crate) fn ref_func(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    if let Cx::Validate(v) = cx {
        v.func_type(idx)?;
        if v.const_expr {
            v.declared.to_mut().insert(idx);
        } else if !v.declared.contains(&idx) {
            return Err(CodeError::UndeclaredFuncRef(idx));
        }
    }
    cx.push_ref(ValType::FuncRef, Some(idx));
    Ok(())
}
