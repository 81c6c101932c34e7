//! In-memory module description consumed by the validator and instances:
//! module structure, constant expressions, function bodies, segments, index spaces.

use super::types::{
    BlockType, DataIdx, Export, FuncIdx, FuncType, GlobalType, Import, ImportDesc, MemIdx,
    MemoryType, RefType, TableIdx, TableType, TypeIdx, ValType,
};

/// Local declarations inside a function body (count repetitions of a valtype).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalDecl {
    pub count: u32,
    pub val_type: ValType,
}

/// Constant expression bytes, terminated by `end`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expr {
    pub body: Vec<u8>,
}

impl Expr {
    pub fn new(body: &[u8]) -> Self {
        Self { body: body.to_vec() }
    }
}

/// Code body for a defined function: locals and raw instruction bytes (terminated by `end`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeBody {
    pub locals: Vec<LocalDecl>,
    pub body: Vec<u8>,
}

/// Global with type and initializer expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElemMode {
    Passive,
    Active { table: TableIdx, offset: Expr },
    /// Only declares the functions it names as referenceable.
    Declarative,
}

/// Element segment: reference-typed initializer expressions plus placement mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    pub ty: RefType,
    pub mode: ElemMode,
    pub init: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataMode {
    Passive,
    Active { memory: MemIdx, offset: Expr },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub mode: DataMode,
    pub init: Vec<u8>,
}

/// Module description (pre-validation, pre-instantiation).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type indices for each defined (non-imported) function, in module order.
    pub func_type_indices: Vec<TypeIdx>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,

    pub exports: Vec<Export>,
    pub start: Option<FuncIdx>,

    pub elements: Vec<ElementSegment>,
    /// Present when the module carries a data count section.
    pub data_count: Option<u32>,
    /// Code bodies for defined functions (length must equal func_type_indices.len()).
    pub codes: Vec<CodeBody>,
    pub data: Vec<DataSegment>,
}

impl Module {
    /// Number of imported functions; defined function `i` has index `imported_funcs() + i`.
    pub fn imported_funcs(&self) -> u32 {
        self.imports
            .iter()
            .filter(|imp| matches!(imp.desc, ImportDesc::Func(_)))
            .count() as u32
    }

    /// Parameter and result types of a block signature.
    pub fn block_signature(&self, bt: BlockType) -> Option<FuncType> {
        match bt {
            BlockType::Empty => Some(FuncType::default()),
            BlockType::Value(t) => Some(FuncType::new(&[], &[t])),
            BlockType::Func(idx) => self.types.get(idx as usize).cloned(),
        }
    }

    /// Parameter and result widths of a block signature, in stack cells.
    pub fn block_cells(&self, bt: BlockType) -> Option<(usize, usize)> {
        match bt {
            BlockType::Empty => Some((0, 0)),
            BlockType::Value(t) => Some((0, t.cells())),
            BlockType::Func(idx) => {
                let ft = self.types.get(idx as usize)?;
                Some((cells_of(&ft.params), cells_of(&ft.results)))
            }
        }
    }

    /// Whether a data segment index is in range for `memory.init` / `data.drop`.
    pub fn has_data(&self, idx: DataIdx) -> bool {
        (idx as usize) < self.data.len()
    }
}

/// Total stack cells occupied by a sequence of values of the given types.
pub fn cells_of(types: &[ValType]) -> usize {
    types.iter().map(|t| t.cells()).sum()
}

/// Import-then-definition index spaces of a module.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexSpaces {
    /// Type index of every function.
    pub funcs: Vec<TypeIdx>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<GlobalType>,
}

impl IndexSpaces {
    pub fn new(m: &Module) -> Self {
        let mut spaces = IndexSpaces::default();
        for imp in &m.imports {
            match imp.desc {
                ImportDesc::Func(ti) => spaces.funcs.push(ti),
                ImportDesc::Table(tt) => spaces.tables.push(tt),
                ImportDesc::Memory(mt) => spaces.memories.push(mt),
                ImportDesc::Global(gt) => spaces.globals.push(gt),
            }
        }
        spaces.funcs.extend_from_slice(&m.func_type_indices);
        spaces.tables.extend_from_slice(&m.tables);
        spaces.memories.extend_from_slice(&m.memories);
        spaces.globals.extend(m.globals.iter().map(|g| g.ty));
        spaces
    }

    /// Declared type of a function, resolved through the module's type section.
    pub fn func_type<'m>(&self, m: &'m Module, idx: FuncIdx) -> Option<&'m FuncType> {
        let ti = *self.funcs.get(idx as usize)?;
        m.types.get(ti as usize)
    }
}
