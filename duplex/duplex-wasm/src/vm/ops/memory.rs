//! Linear memory loads, stores, size/grow and bulk operations.

use crate::binary::Cursor;
use crate::error::{CodeError, TrapKind};
use crate::model::ValType;
use crate::vm::mode::Cx;
use crate::vm::stack::Scalar;

/// Read a memarg and return its offset. Validation checks the alignment
/// against the access width and that memory 0 exists.
fn memarg(cx: &Cx<'_, '_>, cur: &mut Cursor<'_>, width: usize) -> Result<u32, CodeError> {
    let align = cur.read_u32()?;
    let offset = cur.read_u32()?;
    if let Cx::Validate(v) = cx {
        if align > width.trailing_zeros() {
            return Err(CodeError::BadAlignment);
        }
        v.require_memory(0)?;
    }
    Ok(offset)
}

/// Reserved memory index byte; must be zero.
fn reserved(cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    match cur.read_u8()? {
        0 => Ok(()),
        _ => Err(CodeError::BadImmediate("memory index")),
    }
}

fn effective(addr: i32, offset: u32) -> u64 {
    u64::from(addr as u32) + u64::from(offset)
}

macro_rules! load {
    ($name:ident, $t:ty, $n:literal, $conv:expr) => {
        pub(crate) fn $name(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
            let offset = memarg(cx, cur, $n)?;
            let addr = cx.pop::<i32>()?;
            match cx {
                Cx::Validate(v) => {
                    v.push_valtype(<$t as Scalar>::TYPE);
                    Ok(())
                }
                Cx::Execute(e) => {
                    let loaded = e.memory()?.load::<$n>(effective(addr, offset));
                    match loaded {
                        Ok(bytes) => {
                            let conv: fn([u8; $n]) -> $t = $conv;
                            e.stack.push_scalar(conv(bytes));
                            Ok(())
                        }
                        Err(oob) => e.trap(TrapKind::OutOfBoundsMemory, oob),
                    }
                }
            }
        }
    };
}

macro_rules! store {
    ($name:ident, $t:ty, $n:literal, $conv:expr) => {
        pub(crate) fn $name(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
            let offset = memarg(cx, cur, $n)?;
            let val = cx.pop::<$t>()?;
            let addr = cx.pop::<i32>()?;
            if let Cx::Execute(e) = cx {
                let conv: fn($t) -> [u8; $n] = $conv;
                let stored = e.memory()?.store(effective(addr, offset), conv(val));
                if let Err(oob) = stored {
                    return e.trap(TrapKind::OutOfBoundsMemory, oob);
                }
            }
            Ok(())
        }
    };
}

load!(i32_load, i32, 4, i32::from_le_bytes);
load!(i64_load, i64, 8, i64::from_le_bytes);
load!(f32_load, f32, 4, f32::from_le_bytes);
load!(f64_load, f64, 8, f64::from_le_bytes);
load!(i32_load8_s, i32, 1, |b| i8::from_le_bytes(b) as i32);
load!(i32_load8_u, i32, 1, |b| u8::from_le_bytes(b) as i32);
load!(i32_load16_s, i32, 2, |b| i16::from_le_bytes(b) as i32);
load!(i32_load16_u, i32, 2, |b| u16::from_le_bytes(b) as i32);
load!(i64_load8_s, i64, 1, |b| i8::from_le_bytes(b) as i64);
load!(i64_load8_u, i64, 1, |b| u8::from_le_bytes(b) as i64);
load!(i64_load16_s, i64, 2, |b| i16::from_le_bytes(b) as i64);
load!(i64_load16_u, i64, 2, |b| u16::from_le_bytes(b) as i64);
load!(i64_load32_s, i64, 4, |b| i32::from_le_bytes(b) as i64);
load!(i64_load32_u, i64, 4, |b| u32::from_le_bytes(b) as i64);

store!(i32_store, i32, 4, i32::to_le_bytes);
store!(i64_store, i64, 8, i64::to_le_bytes);
store!(f32_store, f32, 4, f32::to_le_bytes);
store!(f64_store, f64, 8, f64::to_le_bytes);
store!(i32_store8, i32, 1, |v| (v as u8).to_le_bytes());
store!(i32_store16, i32, 2, |v| (v as u16).to_le_bytes());
store!(i64_store8, i64, 1, |v| (v as u8).to_le_bytes());
store!(i64_store16, i64, 2, |v| (v as u16).to_le_bytes());
store!(i64_store32, i64, 4, |v| (v as u32).to_le_bytes());

pub(crate) fn memory_size(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    reserved(cur)?;
    match cx {
        Cx::Validate(v) => {
            v.require_memory(0)?;
            v.push_valtype(ValType::I32);
        }
        Cx::Execute(e) => {
            let pages = e.memory()?.size_pages();
            e.stack.push_scalar(pages as i32);
        }
    }
    Ok(())
}

// Failure to grow yields -1 and never traps.
pub(crate) fn memory_grow(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    reserved(cur)?;
    let delta = cx.pop::<i32>()?;
    match cx {
        Cx::Validate(v) => {
            v.require_memory(0)?;
            v.push_valtype(ValType::I32);
        }
        Cx::Execute(e) => {
            let prev = e.memory()?.grow(delta as u32).map_or(-1, |p| p as i32);
            e.stack.push_scalar(prev);
        }
    }
    Ok(())
}

/// Check a data segment index for `memory.init` / `data.drop`.
fn data_index(cx: &Cx<'_, '_>, idx: u32, opcode: &'static str) -> Result<(), CodeError> {
    if let Cx::Validate(v) = cx {
        match v.module.data_count {
            None => return Err(CodeError::DataCountRequired(opcode)),
            Some(count) if idx >= count => {
                return Err(CodeError::UnknownIndex { space: "data segment", index: idx })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Pop the `(dst, src_or_value, len)` operands of a bulk instruction.
fn pop_range(cx: &mut Cx<'_, '_>) -> Result<(u32, u32, u32), CodeError> {
    let n = cx.pop::<i32>()?;
    let s = cx.pop::<i32>()?;
    let d = cx.pop::<i32>()?;
    Ok((d as u32, s as u32, n as u32))
}

pub(crate) fn memory_init(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    reserved(cur)?;
    data_index(cx, idx, "memory.init")?;
    if let Cx::Validate(v) = cx {
        v.require_memory(0)?;
    }
    let (dst, src, n) = pop_range(cx)?;
    if let Cx::Execute(e) = cx {
        let segment = e
            .module
            .module()
            .data
            .get(idx as usize)
            .ok_or(CodeError::UnknownIndex { space: "data segment", index: idx })?;
        let inst = &mut *e.instance;
        let bytes: &[u8] = if inst.data_dropped.get(idx as usize).copied().unwrap_or(true) {
            &[]
        } else {
            &segment.init
        };
        let mem = inst
            .memories
            .first_mut()
            .ok_or(CodeError::UnknownIndex { space: "memory", index: 0 })?;
        let copied = mem.init(dst, bytes, src, n);
        if let Err(oob) = copied {
            return e.trap(TrapKind::OutOfBoundsMemory, oob);
        }
    }
    Ok(())
}

pub(crate) fn data_drop(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    data_index(cx, idx, "data.drop")?;
    if let Cx::Execute(e) = cx {
        let flag = e
            .instance
            .data_dropped
            .get_mut(idx as usize)
            .ok_or(CodeError::UnknownIndex { space: "data segment", index: idx })?;
        *flag = true;
    }
    Ok(())
}

pub(crate) fn memory_copy(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    reserved(cur)?;
    reserved(cur)?;
    if let Cx::Validate(v) = cx {
        v.require_memory(0)?;
    }
    let (dst, src, n) = pop_range(cx)?;
    if let Cx::Execute(e) = cx {
        let copied = e.memory()?.copy_within(dst, src, n);
        if let Err(oob) = copied {
            return e.trap(TrapKind::OutOfBoundsMemory, oob);
        }
    }
    Ok(())
}

pub(crate) fn memory_fill(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    reserved(cur)?;
    if let Cx::Validate(v) = cx {
        v.require_memory(0)?;
    }
    let (dst, val, n) = pop_range(cx)?;
    if let Cx::Execute(e) = cx {
        let filled = e.memory()?.fill(dst, val as u8, n);
        if let Err(oob) = filled {
            return e.trap(TrapKind::OutOfBoundsMemory, oob);
        }
    }
    Ok(())
}
