/// Per-call context.
///
/// A `Call` binds everything one check needs: a fresh trace id, the caller's
/// rank and resolved source location, the direction, and the two descriptor
/// trees. Construction is the only fallible phase; a constructed call checks
/// without further collaborator queries.
use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer::Buffer;
use crate::datatype::{DatatypeHandle, MpiIntrospect, MpiType};
use crate::error::CreateError;
use crate::registry::AllocationQuery;

// ---------------------------------------------------------------------------
// Source locations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// Maps a return address to the source location of the intercepted call.
pub trait LocationResolver: Send + Sync {
    fn resolve(&self, addr: usize) -> Option<SourceLocation>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub addr: usize,
    pub location: SourceLocation,
}

impl Caller {
    pub fn resolve(resolver: &dyn LocationResolver, addr: usize) -> Result<Caller, CreateError> {
        let location = resolver.resolve(addr).ok_or_else(|| {
            CreateError::SourceLocation(format!(
                "couldn't acquire source location for address {:#x}",
                addr
            ))
        })?;
        Ok(Caller { addr, location })
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// The external interfaces call construction draws on.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub allocations: &'a dyn AllocationQuery,
    pub mpi: &'a dyn MpiIntrospect,
    pub locations: &'a dyn LocationResolver,
}

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

static NEXT_TRACE_ID: AtomicU64 = AtomicU64::new(0);

/// Test hook: rewind the process-global trace-id counter.
pub fn reset_trace_ids() {
    NEXT_TRACE_ID.store(0, Ordering::SeqCst);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub trace_id: u64,
    pub rank: i32,
    pub caller: Caller,
    pub function_name: String,
    pub is_send: bool,
    pub buffer: Buffer,
    pub count: i32,
    pub mpi_type: MpiType,
}

impl Call {
    /// Bind one intercepted call. The trace id is taken before any builder
    /// runs, so failed constructions consume ids too.
    pub fn create(
        collab: Collaborators<'_>,
        function_name: &str,
        called_from: usize,
        buffer_ptr: usize,
        is_send: bool,
        count: i32,
        datatype: DatatypeHandle,
    ) -> Result<Call, CreateError> {
        let trace_id = NEXT_TRACE_ID.fetch_add(1, Ordering::Relaxed);
        let rank = collab.mpi.rank();
        let caller = Caller::resolve(collab.locations, called_from)?;
        let buffer = Buffer::from_ptr(collab.allocations, buffer_ptr)?;
        let mpi_type = MpiType::from_handle(collab.mpi, datatype)?;
        Ok(Call {
            trace_id,
            rank,
            caller,
            function_name: function_name.to_string(),
            is_send,
            buffer,
            count,
            mpi_type,
        })
    }
}
