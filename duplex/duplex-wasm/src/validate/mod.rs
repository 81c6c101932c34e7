//! Module validator.
//!
//! Module-level checks cover index spaces, limits, segments, exports and the
//! start function. Function bodies and constant expressions are typed by
//! running the shared instruction handlers in validation mode, which also
//! produces the side tables execution relies on.

mod context;
mod tables;

pub use context::{ControlFrame, FrameOp, StackShape, ValidationContext};
pub use tables::{JumpSlot, JumpTable, TypeAnnotations};

use std::borrow::Cow;
use std::collections::HashSet;
use std::iter;

use tracing::{debug, instrument};

use crate::binary::Cursor;
use crate::error::{CodeError, ValidationError};
use crate::model::{
    cells_of, DataMode, ElemMode, ExportDesc, Expr, FuncIdx, FuncType, ImportDesc, IndexSpaces,
    Limits, Module, TypeIdx, ValType,
};
use crate::runtime::memory::MAX_PAGES;
use crate::vm::instructions::dispatch;
use crate::vm::mode::Cx;
use crate::vm::stack::{Cell, NULL_REF};

type VResult<T> = Result<T, ValidationError>;

/// Upper bound on declared locals in one function, parameters excluded.
pub const MAX_LOCALS: u64 = 50_000;

/// Everything execution needs to know about one validated function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncInfo {
    pub type_idx: TypeIdx,
    /// Parameters followed by declared locals.
    pub locals: Vec<ValType>,
    /// Cell offset of each local inside a frame's locals.
    pub local_offsets: Vec<usize>,
    pub param_cells: usize,
    /// Initial cells of the declared (non-parameter) locals.
    pub local_init: Vec<Cell>,
    pub result_cells: usize,
    pub annotations: TypeAnnotations,
    pub jumps: JumpTable,
}

/// A module that passed validation, with its per-function side tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedModule {
    module: Module,
    spaces: IndexSpaces,
    funcs: Vec<FuncInfo>,
    declared: HashSet<FuncIdx>,
}

impl ValidatedModule {
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn spaces(&self) -> &IndexSpaces {
        &self.spaces
    }

    /// Side tables of defined function `def_index`.
    pub fn func(&self, def_index: usize) -> Option<&FuncInfo> {
        self.funcs.get(def_index)
    }

    /// Body bytes of defined function `def_index`.
    pub fn code(&self, def_index: usize) -> Option<&[u8]> {
        self.module.codes.get(def_index).map(|c| c.body.as_slice())
    }

    /// Functions `ref.func` may name inside code.
    pub fn declared_funcs(&self) -> &HashSet<FuncIdx> {
        &self.declared
    }
}

/// Dispatch instructions until the outermost frame closes.
/// Failures carry the offset and name of the offending instruction.
fn run(v: &mut ValidationContext<'_>, code: &[u8]) -> Result<(), (usize, &'static str, CodeError)> {
    let mut cur = Cursor::new(code);
    while !v.frames.is_empty() {
        let offset = cur.offset();
        if cur.is_eof() {
            return Err((offset, "end", CodeError::UnexpectedEnd));
        }
        v.record_shape(offset);
        dispatch(&mut Cx::Validate(&mut *v), &mut cur).map_err(|(name, err)| (offset, name, err))?;
    }
    Ok(())
}

/// Type a constant expression producing `ty`. `ref.func` targets it names are
/// added to `declared`.
fn check_const_expr(
    module: &Module,
    spaces: &IndexSpaces,
    declared: &mut HashSet<FuncIdx>,
    expr: &Expr,
    ty: ValType,
    global_limit: u32,
    context: &'static str,
) -> VResult<()> {
    let mut v = ValidationContext::new(module, spaces, Cow::Owned(std::mem::take(declared)));
    v.const_expr = true;
    v.global_limit = global_limit;
    v.push_ctrlframe(FrameOp::Invoke, 0, Vec::new(), vec![ty], None);
    let outcome = run(&mut v, &expr.body);
    *declared = v.declared.into_owned();
    outcome.map_err(|(_, _, reason)| ValidationError::ConstExpr { context, reason })
}

fn check_limits(limits: &Limits, bound: u32, what: &'static str) -> VResult<()> {
    if limits.min > bound || limits.max.is_some_and(|max| max > bound) {
        return Err(ValidationError::Module(what));
    }
    if limits.max.is_some_and(|max| max < limits.min) {
        return Err(ValidationError::Module("limits maximum below minimum"));
    }
    Ok(())
}

fn check_func_type(ty: &FuncType) -> VResult<()> {
    if ty.params.iter().chain(&ty.results).all(|t| t.is_concrete()) {
        Ok(())
    } else {
        Err(ValidationError::Module("function type uses a non-value type"))
    }
}

fn type_index(module: &Module, idx: TypeIdx) -> VResult<()> {
    if (idx as usize) < module.types.len() {
        Ok(())
    } else {
        Err(ValidationError::IndexOutOfRange { space: "type", index: idx })
    }
}

fn in_range(len: usize, idx: u32, space: &'static str) -> VResult<()> {
    if (idx as usize) < len {
        Ok(())
    } else {
        Err(ValidationError::IndexOutOfRange { space, index: idx })
    }
}

/// Validate a whole module, consuming it.
#[instrument(skip_all, fields(types = module.types.len(), funcs = module.codes.len()))]
pub fn validate_module(module: Module) -> VResult<ValidatedModule> {
    /* Types and function declarations */
    for ty in &module.types {
        check_func_type(ty)?;
    }
    for imp in &module.imports {
        match &imp.desc {
            ImportDesc::Func(idx) => type_index(&module, *idx)?,
            ImportDesc::Table(tt) => check_limits(&tt.limits, u32::MAX, "table limits")?,
            ImportDesc::Memory(mt) => check_limits(&mt.limits, MAX_PAGES, "memory size must be at most 65536 pages")?,
            ImportDesc::Global(gt) if !gt.val_type.is_concrete() => {
                return Err(ValidationError::Module("global of a non-value type"))
            }
            ImportDesc::Global(_) => {}
        }
    }
    for &idx in &module.func_type_indices {
        type_index(&module, idx)?;
    }
    if module.func_type_indices.len() != module.codes.len() {
        return Err(ValidationError::Module("function and code counts differ"));
    }

    let spaces = IndexSpaces::new(&module);

    /* Tables and memories */
    for tt in &module.tables {
        check_limits(&tt.limits, u32::MAX, "table limits")?;
    }
    if spaces.memories.len() > 1 {
        return Err(ValidationError::Module("multiple memories"));
    }
    for mt in &module.memories {
        check_limits(&mt.limits, MAX_PAGES, "memory size must be at most 65536 pages")?;
    }

    /* Globals: each initializer may read the globals before it */
    let mut declared = HashSet::new();
    let imported_globals = spaces.globals.len() - module.globals.len();
    for (i, g) in module.globals.iter().enumerate() {
        if !g.ty.val_type.is_concrete() {
            return Err(ValidationError::Module("global of a non-value type"));
        }
        let limit = (imported_globals + i) as u32;
        check_const_expr(&module, &spaces, &mut declared, &g.init, g.ty.val_type, limit, "global initializer")?;
    }
    let all_globals = spaces.globals.len() as u32;

    /* Element segments */
    for seg in &module.elements {
        for expr in &seg.init {
            check_const_expr(&module, &spaces, &mut declared, expr, seg.ty.into(), all_globals, "element")?;
        }
        if let ElemMode::Active { table, offset } = &seg.mode {
            in_range(spaces.tables.len(), *table, "table")?;
            if spaces.tables[*table as usize].elem != seg.ty {
                return Err(ValidationError::Module("element segment type does not match its table"));
            }
            check_const_expr(&module, &spaces, &mut declared, offset, ValType::I32, all_globals, "element offset")?;
        }
    }

    /* Data segments */
    if module.data_count.is_some_and(|n| n as usize != module.data.len()) {
        return Err(ValidationError::Module("data count does not match data segments"));
    }
    for seg in &module.data {
        if let DataMode::Active { memory, offset } = &seg.mode {
            in_range(spaces.memories.len(), *memory, "memory")?;
            check_const_expr(&module, &spaces, &mut declared, offset, ValType::I32, all_globals, "data offset")?;
        }
    }

    /* Exports */
    let mut names = HashSet::new();
    for ex in &module.exports {
        if !names.insert(ex.name.as_str()) {
            return Err(ValidationError::Module("duplicate export name"));
        }
        match ex.desc {
            ExportDesc::Func(f) => {
                in_range(spaces.funcs.len(), f, "function")?;
                declared.insert(f);
            }
            ExportDesc::Table(t) => in_range(spaces.tables.len(), t, "table")?,
            ExportDesc::Memory(m) => in_range(spaces.memories.len(), m, "memory")?,
            ExportDesc::Global(g) => in_range(spaces.globals.len(), g, "global")?,
        }
    }

    /* Start function */
    if let Some(start) = module.start {
        let ty = spaces
            .func_type(&module, start)
            .ok_or(ValidationError::IndexOutOfRange { space: "function", index: start })?;
        if !ty.params.is_empty() || !ty.results.is_empty() {
            return Err(ValidationError::Module("start function must have type [] -> []"));
        }
    }

    /* Code bodies */
    let funcs = (0..module.codes.len())
        .map(|def| check_function(&module, &spaces, &declared, def, false).map(|(info, _)| info))
        .collect::<VResult<Vec<_>>>()?;

    debug!(funcs = funcs.len(), declared = declared.len(), "module validated");
    Ok(ValidatedModule { module, spaces, funcs, declared })
}

/// Re-run validation of defined function `def_index`, returning its side tables.
#[instrument(skip(vm))]
pub fn validate_function(vm: &ValidatedModule, def_index: usize) -> VResult<FuncInfo> {
    check_function(&vm.module, &vm.spaces, &vm.declared, def_index, false).map(|(info, _)| info)
}

/// Operand types at every reachable instruction boundary of defined function
/// `def_index`, in code order.
pub fn stack_shapes(vm: &ValidatedModule, def_index: usize) -> VResult<Vec<StackShape>> {
    check_function(&vm.module, &vm.spaces, &vm.declared, def_index, true)
        .map(|(_, shapes)| shapes.unwrap_or_default())
}

fn check_function(
    module: &Module,
    spaces: &IndexSpaces,
    declared: &HashSet<FuncIdx>,
    def_index: usize,
    record_shapes: bool,
) -> VResult<(FuncInfo, Option<Vec<StackShape>>)> {
    let func = module.imported_funcs() + def_index as u32;
    let code = module
        .codes
        .get(def_index)
        .ok_or(ValidationError::IndexOutOfRange { space: "function", index: func })?;
    let type_idx = *module
        .func_type_indices
        .get(def_index)
        .ok_or(ValidationError::IndexOutOfRange { space: "function", index: func })?;
    let ty = spaces
        .func_type(module, func)
        .ok_or(ValidationError::IndexOutOfRange { space: "type", index: type_idx })?;

    let mut locals = ty.params.clone();
    let mut declared_locals = 0u64;
    let mut local_init = Vec::new();
    for decl in &code.locals {
        declared_locals += u64::from(decl.count);
        if declared_locals > MAX_LOCALS {
            return Err(ValidationError::Module("too many locals"));
        }
        if !decl.val_type.is_concrete() {
            return Err(ValidationError::Module("local of a non-value type"));
        }
        locals.extend(iter::repeat(decl.val_type).take(decl.count as usize));
        let init: Cell = if decl.val_type.is_ref() { NULL_REF } else { 0 };
        local_init.extend(iter::repeat(init).take(decl.count as usize * decl.val_type.cells()));
    }
    let local_offsets = locals
        .iter()
        .scan(0, |off, t| {
            let at = *off;
            *off += t.cells();
            Some(at)
        })
        .collect();

    let mut v = ValidationContext::new(module, spaces, Cow::Borrowed(declared));
    v.locals = locals;
    if record_shapes {
        v.shapes = Some(Vec::new());
    }
    v.push_ctrlframe(FrameOp::Invoke, 0, Vec::new(), ty.results.clone(), None);
    run(&mut v, &code.body).map_err(|(offset, opcode, reason)| {
        debug!(func, offset, opcode, %reason, "function rejected");
        ValidationError::Code { func, offset, opcode, reason }
    })?;

    let info = FuncInfo {
        type_idx,
        locals: v.locals,
        local_offsets,
        param_cells: cells_of(&ty.params),
        local_init,
        result_cells: cells_of(&ty.results),
        annotations: v.annotations,
        jumps: v.jumps,
    };
    Ok((info, v.shapes))
}
