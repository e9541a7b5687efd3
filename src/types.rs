/// Language-level type descriptors and the type database.
///
/// Every checked buffer carries a `TypeInfo` naming what the allocation
/// holds. Builtin ids are fixed; struct types are registered at runtime by
/// the instrumentation layer with their full member layout. The database
/// answers the name/size/layout queries the buffer builder issues.
use std::collections::HashMap;

use thiserror::Error;

pub type TypeId = i32;

/// Sentinel id carried by null buffers and by unmapped datatype handles.
pub const INVALID_TYPE_ID: TypeId = -1;

/// First id available to registered struct types; everything below is
/// reserved for builtins.
pub const FIRST_STRUCT_ID: TypeId = 256;

// ---------------------------------------------------------------------------
// Builtin table
// ---------------------------------------------------------------------------

pub mod builtin {
    use super::TypeId;

    pub const INT8: TypeId = 0;
    pub const INT16: TypeId = 1;
    pub const INT32: TypeId = 2;
    pub const INT64: TypeId = 3;
    pub const HALF: TypeId = 4;
    pub const FLOAT: TypeId = 5;
    pub const DOUBLE: TypeId = 6;
    pub const FLOAT128: TypeId = 7;
    pub const X86_FP80: TypeId = 8;
    pub const PPC_FP128: TypeId = 9;
    pub const BYTE: TypeId = 10;
    pub const UNKNOWN: TypeId = 11;

    pub const COUNT: usize = 12;

    pub(super) const NAMES: [&str; COUNT] = [
        "int8",
        "int16",
        "int32",
        "int64",
        "half",
        "float",
        "double",
        "float128",
        "x86_float80",
        "ppc_float128",
        "byte",
        "unknown",
    ];

    pub(super) const SIZES: [usize; COUNT] = [1, 2, 4, 8, 2, 4, 8, 16, 16, 16, 1, 0];

    pub fn is_builtin(id: TypeId) -> bool {
        (0..COUNT as TypeId).contains(&id)
    }
}

/// A resolved language-level type: id, display name, byte size (extent for
/// struct types).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: String,
    pub size: usize,
}

impl TypeInfo {
    pub fn invalid() -> Self {
        TypeInfo {
            id: INVALID_TYPE_ID,
            name: String::new(),
            size: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Struct layouts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructMember {
    /// Byte offset within the parent struct.
    pub offset: isize,
    /// Element count (array members have count > 1).
    pub count: usize,
    pub type_id: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub id: TypeId,
    pub name: String,
    /// Total byte extent, including padding.
    pub extent: usize,
    pub members: Vec<StructMember>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeDbError {
    #[error("type id {0} is reserved for builtin types")]
    ReservedId(TypeId),
    #[error("type id {0} is already registered to struct \"{1}\"")]
    DuplicateId(TypeId, String),
}

// ---------------------------------------------------------------------------
// TypeDb
// ---------------------------------------------------------------------------

/// Builtin table plus registered struct layouts.
///
/// Registration happens before checking starts; reads are lock-free
/// afterwards (the tracker wraps the database for concurrent use).
#[derive(Debug, Default)]
pub struct TypeDb {
    structs: HashMap<TypeId, StructLayout>,
}

impl TypeDb {
    pub fn new() -> Self {
        TypeDb::default()
    }

    pub fn register_struct(&mut self, layout: StructLayout) -> Result<(), TypeDbError> {
        if builtin::is_builtin(layout.id) || layout.id < FIRST_STRUCT_ID {
            return Err(TypeDbError::ReservedId(layout.id));
        }
        if let Some(existing) = self.structs.get(&layout.id) {
            return Err(TypeDbError::DuplicateId(layout.id, existing.name.clone()));
        }
        self.structs.insert(layout.id, layout);
        Ok(())
    }

    pub fn is_valid(&self, id: TypeId) -> bool {
        builtin::is_builtin(id) || self.structs.contains_key(&id)
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        self.structs.contains_key(&id)
    }

    pub fn struct_layout(&self, id: TypeId) -> Option<&StructLayout> {
        self.structs.get(&id)
    }

    /// Display name for any id; unregistered ids read as "unknown".
    pub fn type_name(&self, id: TypeId) -> String {
        if builtin::is_builtin(id) {
            return builtin::NAMES[id as usize].to_string();
        }
        match self.structs.get(&id) {
            Some(layout) => layout.name.clone(),
            None => builtin::NAMES[builtin::UNKNOWN as usize].to_string(),
        }
    }

    /// Byte size for builtins, extent for structs, 0 otherwise.
    pub fn type_size(&self, id: TypeId) -> usize {
        if builtin::is_builtin(id) {
            return builtin::SIZES[id as usize];
        }
        self.structs.get(&id).map_or(0, |layout| layout.extent)
    }
}
