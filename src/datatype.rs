/// MPI datatype descriptors and their builder.
///
/// The messaging library hands the shims an opaque datatype handle. The
/// builder decodes it through the `MpiIntrospect` trait (envelope, contents
/// and name queries mirror the library's own decoding interface) into an
/// owned combinator tree the engine can traverse without further library
/// calls. Leaves are named datatypes carrying the language-level type id
/// from the fixed predefined table.
use crate::error::CreateError;
use crate::types::{self, TypeId};

/// Opaque handle to a messaging-library datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatatypeHandle(pub i32);

// ---------------------------------------------------------------------------
// Predefined datatypes
// ---------------------------------------------------------------------------

/// Handles of the predefined (named) datatypes.
pub mod predefined {
    use super::DatatypeHandle;

    pub const BYTE: DatatypeHandle = DatatypeHandle(1);
    pub const CHAR: DatatypeHandle = DatatypeHandle(2);
    pub const SIGNED_CHAR: DatatypeHandle = DatatypeHandle(3);
    pub const UNSIGNED_CHAR: DatatypeHandle = DatatypeHandle(4);
    pub const SHORT: DatatypeHandle = DatatypeHandle(5);
    pub const UNSIGNED_SHORT: DatatypeHandle = DatatypeHandle(6);
    pub const INT: DatatypeHandle = DatatypeHandle(7);
    pub const UNSIGNED: DatatypeHandle = DatatypeHandle(8);
    pub const LONG: DatatypeHandle = DatatypeHandle(9);
    pub const UNSIGNED_LONG: DatatypeHandle = DatatypeHandle(10);
    pub const LONG_LONG: DatatypeHandle = DatatypeHandle(11);
    pub const UNSIGNED_LONG_LONG: DatatypeHandle = DatatypeHandle(12);
    pub const FLOAT: DatatypeHandle = DatatypeHandle(13);
    pub const DOUBLE: DatatypeHandle = DatatypeHandle(14);
    pub const LONG_DOUBLE: DatatypeHandle = DatatypeHandle(15);
    pub const INT8_T: DatatypeHandle = DatatypeHandle(16);
    pub const INT16_T: DatatypeHandle = DatatypeHandle(17);
    pub const INT32_T: DatatypeHandle = DatatypeHandle(18);
    pub const INT64_T: DatatypeHandle = DatatypeHandle(19);
    pub const UINT8_T: DatatypeHandle = DatatypeHandle(20);
    pub const UINT16_T: DatatypeHandle = DatatypeHandle(21);
    pub const UINT32_T: DatatypeHandle = DatatypeHandle(22);
    pub const UINT64_T: DatatypeHandle = DatatypeHandle(23);
}

/// Language-level type id equivalent to a predefined datatype handle.
///
/// Unmapped handles (composite types and anything not in the table) yield
/// the invalid sentinel; a named check against such a handle reports a
/// builtin mismatch. Width assumptions are LP64 with an x86-style
/// `long double` mapped to the 128-bit float id so the ppc equivalence in
/// the engine covers both layouts.
pub fn type_id_for(handle: DatatypeHandle) -> TypeId {
    use crate::types::builtin;
    use predefined::*;

    match handle {
        BYTE => builtin::BYTE,
        CHAR | SIGNED_CHAR | UNSIGNED_CHAR | INT8_T | UINT8_T => builtin::INT8,
        SHORT | UNSIGNED_SHORT | INT16_T | UINT16_T => builtin::INT16,
        INT | UNSIGNED | INT32_T | UINT32_T => builtin::INT32,
        LONG | UNSIGNED_LONG | LONG_LONG | UNSIGNED_LONG_LONG | INT64_T | UINT64_T => {
            builtin::INT64
        }
        FLOAT => builtin::FLOAT,
        DOUBLE => builtin::DOUBLE,
        LONG_DOUBLE => builtin::FLOAT128,
        _ => types::INVALID_TYPE_ID,
    }
}

// ---------------------------------------------------------------------------
// Combiners
// ---------------------------------------------------------------------------

/// Raw combiner identifiers as reported by the envelope query.
pub mod combiner {
    pub const NAMED: i32 = 1;
    pub const DUP: i32 = 2;
    pub const CONTIGUOUS: i32 = 3;
    pub const VECTOR: i32 = 4;
    pub const HVECTOR: i32 = 5;
    pub const INDEXED: i32 = 6;
    pub const HINDEXED: i32 = 7;
    pub const INDEXED_BLOCK: i32 = 8;
    pub const HINDEXED_BLOCK: i32 = 9;
    pub const STRUCT: i32 = 10;
    pub const SUBARRAY: i32 = 11;
    pub const DARRAY: i32 = 12;
    pub const RESIZED: i32 = 13;
    pub const F90_REAL: i32 = 14;
    pub const F90_COMPLEX: i32 = 15;
    pub const F90_INTEGER: i32 = 16;

    pub fn name_for(id: i32) -> &'static str {
        match id {
            NAMED => "MPI_COMBINER_NAMED",
            DUP => "MPI_COMBINER_DUP",
            CONTIGUOUS => "MPI_COMBINER_CONTIGUOUS",
            VECTOR => "MPI_COMBINER_VECTOR",
            HVECTOR => "MPI_COMBINER_HVECTOR",
            INDEXED => "MPI_COMBINER_INDEXED",
            HINDEXED => "MPI_COMBINER_HINDEXED",
            INDEXED_BLOCK => "MPI_COMBINER_INDEXED_BLOCK",
            HINDEXED_BLOCK => "MPI_COMBINER_HINDEXED_BLOCK",
            STRUCT => "MPI_COMBINER_STRUCT",
            SUBARRAY => "MPI_COMBINER_SUBARRAY",
            DARRAY => "MPI_COMBINER_DARRAY",
            RESIZED => "MPI_COMBINER_RESIZED",
            F90_REAL => "MPI_COMBINER_F90_REAL",
            F90_COMPLEX => "MPI_COMBINER_F90_COMPLEX",
            F90_INTEGER => "MPI_COMBINER_F90_INTEGER",
            _ => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinerKind {
    Named,
    Dup,
    Contiguous,
    Vector,
    IndexedBlock,
    Struct,
    Subarray,
    /// Recognized-but-unsupported or foreign combiner; carries the raw id
    /// for the diagnostic.
    Other(i32),
}

impl CombinerKind {
    fn from_raw(raw: i32) -> CombinerKind {
        match raw {
            combiner::NAMED => CombinerKind::Named,
            combiner::DUP => CombinerKind::Dup,
            combiner::CONTIGUOUS => CombinerKind::Contiguous,
            combiner::VECTOR => CombinerKind::Vector,
            combiner::INDEXED_BLOCK => CombinerKind::IndexedBlock,
            combiner::STRUCT => CombinerKind::Struct,
            combiner::SUBARRAY => CombinerKind::Subarray,
            other => CombinerKind::Other(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CombinerKind::Named => combiner::name_for(combiner::NAMED),
            CombinerKind::Dup => combiner::name_for(combiner::DUP),
            CombinerKind::Contiguous => combiner::name_for(combiner::CONTIGUOUS),
            CombinerKind::Vector => combiner::name_for(combiner::VECTOR),
            CombinerKind::IndexedBlock => combiner::name_for(combiner::INDEXED_BLOCK),
            CombinerKind::Struct => combiner::name_for(combiner::STRUCT),
            CombinerKind::Subarray => combiner::name_for(combiner::SUBARRAY),
            CombinerKind::Other(raw) => combiner::name_for(*raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combiner {
    pub kind: CombinerKind,
    pub integer_args: Vec<i32>,
    pub address_args: Vec<isize>,
    pub type_args: Vec<MpiType>,
}

impl Combiner {
    fn named() -> Self {
        Combiner {
            kind: CombinerKind::Named,
            integer_args: Vec::new(),
            address_args: Vec::new(),
            type_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpiType {
    pub handle: DatatypeHandle,
    /// Mapped language-level id; the invalid sentinel for composites.
    pub type_id: TypeId,
    pub name: String,
    pub combiner: Combiner,
}

// ---------------------------------------------------------------------------
// Introspection interface
// ---------------------------------------------------------------------------

/// Failure of a single introspection call; carries the name of the failing
/// library function for the diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpiFailure {
    pub function: String,
    pub message: String,
}

impl From<MpiFailure> for CreateError {
    fn from(failure: MpiFailure) -> CreateError {
        CreateError::Mpi {
            function: failure.function,
            message: failure.message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeEnvelope {
    pub combiner: i32,
    pub num_integers: usize,
    pub num_addresses: usize,
    pub num_datatypes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeContents {
    pub integers: Vec<i32>,
    pub addresses: Vec<isize>,
    pub datatypes: Vec<DatatypeHandle>,
}

/// What the datatype builder and the shims require from the messaging
/// library.
pub trait MpiIntrospect: Send + Sync {
    fn type_envelope(&self, ty: DatatypeHandle) -> Result<TypeEnvelope, MpiFailure>;
    fn type_contents(&self, ty: DatatypeHandle) -> Result<TypeContents, MpiFailure>;
    fn type_name(&self, ty: DatatypeHandle) -> Result<String, MpiFailure>;
    /// Rank of the calling process, used only as a diagnostic label.
    fn rank(&self) -> i32;
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

impl MpiType {
    /// Decode `handle` into an owned combinator tree.
    ///
    /// Unrecognized combiners build successfully (the engine reports them
    /// as unsupported); malformed argument shapes do not.
    pub fn from_handle(
        mpi: &dyn MpiIntrospect,
        handle: DatatypeHandle,
    ) -> Result<MpiType, CreateError> {
        let envelope = mpi.type_envelope(handle)?;
        let name = mpi.type_name(handle)?;
        let kind = CombinerKind::from_raw(envelope.combiner);

        if kind == CombinerKind::Named {
            return Ok(MpiType {
                handle,
                type_id: type_id_for(handle),
                name,
                combiner: Combiner::named(),
            });
        }

        let contents = mpi.type_contents(handle)?;
        let mut type_args = Vec::with_capacity(contents.datatypes.len());
        for child in &contents.datatypes {
            type_args.push(MpiType::from_handle(mpi, *child)?);
        }
        let combiner = Combiner {
            kind,
            integer_args: contents.integers,
            address_args: contents.addresses,
            type_args,
        };
        validate_arg_shape(&combiner)?;

        Ok(MpiType {
            handle,
            type_id: types::INVALID_TYPE_ID,
            name,
            combiner,
        })
    }
}

/// Enforce the per-combiner argument shapes the engine indexes into.
fn validate_arg_shape(combiner: &Combiner) -> Result<(), CreateError> {
    let ints = combiner.integer_args.len();
    let addrs = combiner.address_args.len();
    let tys = combiner.type_args.len();

    let ok = match combiner.kind {
        CombinerKind::Named => ints == 0 && addrs == 0 && tys == 0,
        CombinerKind::Dup => ints == 0 && addrs == 0 && tys == 1,
        CombinerKind::Contiguous => ints == 1 && addrs == 0 && tys == 1,
        CombinerKind::Vector => ints == 3 && addrs == 0 && tys == 1,
        CombinerKind::IndexedBlock => {
            // [count, blocklength, disp_1 .. disp_count]
            ints >= 2
                && combiner.integer_args[0] >= 0
                && ints == 2 + combiner.integer_args[0] as usize
                && addrs == 0
                && tys == 1
        }
        CombinerKind::Struct => {
            // [count, blocklen_1 .. blocklen_count] / [disp_1 .. disp_count]
            ints >= 1
                && combiner.integer_args[0] >= 0
                && ints == 1 + combiner.integer_args[0] as usize
                && addrs == combiner.integer_args[0] as usize
                && tys == combiner.integer_args[0] as usize
        }
        CombinerKind::Subarray => {
            // [ndims, sizes, subsizes, starts, order]
            ints >= 2
                && combiner.integer_args[0] >= 0
                && ints == 2 + 3 * combiner.integer_args[0] as usize
                && addrs == 0
                && tys == 1
        }
        // Shapes of foreign combiners are not interpreted.
        CombinerKind::Other(_) => true,
    };

    if ok {
        Ok(())
    } else {
        Err(CreateError::InvalidArgument(format!(
            "malformed argument shape for combiner {}",
            combiner.kind.name()
        )))
    }
}
