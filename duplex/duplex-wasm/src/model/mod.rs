//! Public model surface.

pub mod module;
pub mod types;

pub use module::{
    cells_of, CodeBody, DataMode, DataSegment, ElemMode, ElementSegment, Expr, Global,
    IndexSpaces, LocalDecl, Module,
};
pub use types::{
    BlockType, DataIdx, ElemIdx, Export, ExportDesc, FuncAddr, FuncIdx, FuncType, GlobalIdx,
    GlobalType, Import, ImportDesc, Limits, LocalIdx, MemIdx, MemoryType, RefType, TableIdx,
    TableType, TypeIdx, ValType, Value, RESERVED_REF,
};
