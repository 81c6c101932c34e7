//! Table access, growth and bulk operations.

use crate::binary::Cursor;
use crate::error::{CodeError, TrapKind};
use crate::model::ValType;
use crate::vm::mode::Cx;
use crate::vm::stack::ref_to_cell;

/// Element type of table `idx` as a value type.
fn elem_type(cx: &mut Cx<'_, '_>, idx: u32) -> Result<ValType, CodeError> {
    match cx {
        Cx::Validate(v) => Ok(v.table(idx)?.elem.into()),
        Cx::Execute(e) => Ok(e.table(idx)?.elem_type().into()),
    }
}

fn pop_u32(cx: &mut Cx<'_, '_>) -> Result<u32, CodeError> {
    cx.pop::<i32>().map(|v| v as u32)
}

pub(crate) fn table_get(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    let t = elem_type(cx, idx)?;
    let i = pop_u32(cx)?;
    match cx {
        Cx::Validate(v) => {
            v.push_valtype(t);
            Ok(())
        }
        Cx::Execute(e) => {
            let slot = e.table(idx)?.get(i);
            match slot {
                Ok(r) => {
                    e.stack.push(ref_to_cell(r));
                    Ok(())
                }
                Err(oob) => e.trap(TrapKind::OutOfBoundsTable, oob),
            }
        }
    }
}

pub(crate) fn table_set(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    let t = elem_type(cx, idx)?;
    let val = cx.pop_ref(t)?;
    let i = pop_u32(cx)?;
    if let Cx::Execute(e) = cx {
        let set = e.table(idx)?.set(i, val);
        if let Err(oob) = set {
            return e.trap(TrapKind::OutOfBoundsTable, oob);
        }
    }
    Ok(())
}

pub(crate) fn table_size(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    elem_type(cx, idx)?;
    let size = match cx {
        Cx::Validate(_) => 0,
        Cx::Execute(e) => e.table(idx)?.size(),
    };
    cx.push(size as i32);
    Ok(())
}

// Failure to grow yields -1 and never traps.
pub(crate) fn table_grow(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    let t = elem_type(cx, idx)?;
    let n = pop_u32(cx)?;
    let init = cx.pop_ref(t)?;
    let prev = match cx {
        Cx::Validate(_) => 0,
        Cx::Execute(e) => e.table(idx)?.grow(n, init).map_or(-1, |p| p as i32),
    };
    cx.push(prev);
    Ok(())
}

pub(crate) fn table_fill(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    let t = elem_type(cx, idx)?;
    let n = pop_u32(cx)?;
    let val = cx.pop_ref(t)?;
    let i = pop_u32(cx)?;
    if let Cx::Execute(e) = cx {
        let filled = e.table(idx)?.fill(i, val, n);
        if let Err(oob) = filled {
            return e.trap(TrapKind::OutOfBoundsTable, oob);
        }
    }
    Ok(())
}

pub(crate) fn table_copy(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let dst_table = cur.read_u32()?;
    let src_table = cur.read_u32()?;
    if elem_type(cx, dst_table)? != elem_type(cx, src_table)? {
        return Err(CodeError::Mismatch("table.copy between tables of different element types"));
    }
    let n = pop_u32(cx)?;
    let src = pop_u32(cx)?;
    let dst = pop_u32(cx)?;
    let Cx::Execute(e) = cx else {
        return Ok(());
    };
    let copied = if dst_table == src_table {
        e.table(dst_table)?.copy_within(dst, src, n)
    } else {
        let tmp = e.table(src_table)?.slice(src, n).map(<[_]>::to_vec);
        match tmp {
            Ok(tmp) => e.table(dst_table)?.write(dst, &tmp),
            Err(oob) => Err(oob),
        }
    };
    match copied {
        Ok(()) => Ok(()),
        Err(oob) => e.trap(TrapKind::OutOfBoundsTable, oob),
    }
}

pub(crate) fn table_init(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let elem_idx = cur.read_u32()?;
    let table_idx = cur.read_u32()?;
    let t = elem_type(cx, table_idx)?;
    if let Cx::Validate(v) = cx {
        let seg = v
            .module
            .elements
            .get(elem_idx as usize)
            .ok_or(CodeError::UnknownIndex { space: "element segment", index: elem_idx })?;
        if ValType::from(seg.ty) != t {
            return Err(CodeError::Mismatch("table.init segment type differs from table"));
        }
    }
    let n = pop_u32(cx)?;
    let src = pop_u32(cx)?;
    let dst = pop_u32(cx)?;
    if let Cx::Execute(e) = cx {
        let inst = &mut *e.instance;
        let segment = inst
            .elems
            .get(elem_idx as usize)
            .ok_or(CodeError::UnknownIndex { space: "element segment", index: elem_idx })?;
        let table = inst
            .tables
            .get_mut(table_idx as usize)
            .ok_or(CodeError::UnknownIndex { space: "table", index: table_idx })?;
        let copied = table.init(dst, segment, src, n);
        if let Err(oob) = copied {
            return e.trap(TrapKind::OutOfBoundsTable, oob);
        }
    }
    Ok(())
}

pub(crate) fn elem_drop(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    match cx {
        Cx::Validate(v) => {
            if idx as usize >= v.module.elements.len() {
                return Err(CodeError::UnknownIndex { space: "element segment", index: idx });
            }
        }
        Cx::Execute(e) => {
            let seg = e
                .instance
                .elems
                .get_mut(idx as usize)
                .ok_or(CodeError::UnknownIndex { space: "element segment", index: idx })?;
            *seg = Vec::new();
        }
    }
    Ok(())
}
