//! Locals and globals.

use crate::binary::Cursor;
use crate::error::CodeError;
use crate::vm::mode::Cx;

pub(crate) fn local_get(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    match cx {
        Cx::Validate(v) => {
            let t = v.local(idx)?;
            v.push_valtype(t);
            Ok(())
        }
        Cx::Execute(e) => e.local_get(idx),
    }
}

pub(crate) fn local_set(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    match cx {
        Cx::Validate(v) => {
            let t = v.local(idx)?;
            v.pop_valtype(t)?;
            Ok(())
        }
        Cx::Execute(e) => e.local_set(idx, false),
    }
}

pub(crate) fn local_tee(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    match cx {
        Cx::Validate(v) => {
            let t = v.local(idx)?;
            v.pop_valtype(t)?;
            v.push_valtype(t);
            Ok(())
        }
        Cx::Execute(e) => e.local_set(idx, true),
    }
}

pub(crate) fn global_get(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    match cx {
        Cx::Validate(v) => {
            let g = v.global(idx)?;
            if v.const_expr {
                if idx >= v.global_limit {
                    return Err(CodeError::UnknownIndex { space: "global", index: idx });
                }
                if g.mutable {
                    return Err(CodeError::MutableGlobalInConst(idx));
                }
            }
            v.push_valtype(g.val_type);
            Ok(())
        }
        Cx::Execute(e) => {
            let val = e
                .instance
                .globals
                .get(idx as usize)
                .ok_or(CodeError::UnknownIndex { space: "global", index: idx })?
                .get();
            e.stack.push_value(val);
            Ok(())
        }
    }
}

pub(crate) fn global_set(cx: &mut Cx<'_, '_>, cur: &mut Cursor<'_>) -> Result<(), CodeError> {
    let idx = cur.read_u32()?;
    match cx {
        Cx::Validate(v) => {
            let g = v.global(idx)?;
            if !g.mutable {
                return Err(CodeError::ImmutableGlobal(idx));
            }
            v.pop_valtype(g.val_type)?;
            Ok(())
        }
        Cx::Execute(e) => {
            let global = e
                .instance
                .globals
                .get_mut(idx as usize)
                .ok_or(CodeError::UnknownIndex { space: "global", index: idx })?;
            let val = e
                .stack
                .pop_value(global.ty().val_type)
                .ok_or(CodeError::StackUnderflow)?;
            global.store(val);
            Ok(())
        }
    }
}
