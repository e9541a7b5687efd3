/// Diagnostic taxonomies for the checker.
///
/// Two disjoint families: `CreateError` when a call record cannot be
/// constructed (a builder or collaborator query failed), and
/// `TypeCheckError` when the check itself completed with a mismatch.
/// Builders produce only the former, the engine only the latter; neither is
/// ever fatal to the host program.
use thiserror::Error;

// ---------------------------------------------------------------------------
// CreateError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CreateError {
    /// A messaging-library introspection call failed.
    #[error("{function} failed: {message}")]
    Mpi { function: String, message: String },
    /// The allocation registry reported a failure status for the pointer.
    #[error("internal runtime error ({0})")]
    Registry(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    SourceLocation(String),
}

// ---------------------------------------------------------------------------
// TypeCheckError
// ---------------------------------------------------------------------------

/// Structured result of a failed check.
///
/// Struct checks accumulate per-member findings instead of short-circuiting,
/// so the recursive variants (`StructContentsMismatch`, `MemberTypeMismatch`)
/// own their children. `member` indices are 1-based in diagnostics.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeCheckError {
    #[error("count is zero or negative")]
    NullCount,
    #[error("buffer is NULL")]
    NullBuffer,
    #[error("the MPI type combiner {combiner_name} is currently not supported")]
    UnsupportedCombiner { combiner_name: String },
    #[error("buffer too small ({actual} elements, {required} required)")]
    InsufficientBufferSize { actual: usize, required: usize },
    #[error("expected a type matching MPI type \"{mpi_type_name}\", but found type \"{buffer_type_name}\"")]
    BuiltinTypeMismatch {
        buffer_type_name: String,
        mpi_type_name: String,
    },
    #[error("{0}")]
    UnsupportedCombinerArgs(String),
    #[error("expected a struct type, but found type \"{buffer_type_name}\"")]
    BufferNotOfStructType { buffer_type_name: String },
    #[error("expected {mpi_count} members, but the type \"{buffer_type_name}\" has {buffer_count} members")]
    MemberCountMismatch {
        buffer_type_name: String,
        buffer_count: usize,
        mpi_count: usize,
    },
    #[error("the struct contents do not match the MPI type")]
    StructContentsMismatch { errors: Vec<TypeCheckError> },
    #[error("expected a byte offset of {mpi_offset} for member {member}, but the type \"{type_name}\" has an offset of {struct_offset}")]
    MemberOffsetMismatch {
        type_name: String,
        member: usize,
        struct_offset: isize,
        mpi_offset: isize,
    },
    #[error("the type check for member {member} failed")]
    MemberTypeMismatch {
        member: usize,
        error: Box<TypeCheckError>,
    },
    #[error("expected element count of {required} for member {member}, but the type \"{type_name}\" has a count of {available}")]
    MemberElementCountMismatch {
        type_name: String,
        member: usize,
        required: usize,
        available: usize,
    },
}
