/// Allocation registry interface and a reference in-memory tracker.
///
/// The checker asks one question of its host runtime: "what lives at this
/// address?". The `AllocationQuery` trait captures that contract together
/// with the type-id resolution queries the buffer builder needs. Production
/// deployments implement it over the instrumentation runtime's tables; the
/// `AllocationTracker` here backs the test suites and standalone use.
use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::types::{StructLayout, TypeDb, TypeId};

// ---------------------------------------------------------------------------
// Query interface
// ---------------------------------------------------------------------------

/// Failure status of a pointer lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStatus {
    UnknownAddress,
    BadAlignment,
}

impl LookupStatus {
    pub fn message(self) -> &'static str {
        match self {
            LookupStatus::UnknownAddress => "the address is not registered",
            LookupStatus::BadAlignment => "the address does not point to an element boundary",
        }
    }
}

/// Classification of a type id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Builtin,
    Struct(StructLayout),
    /// Well-formed id with no registration behind it.
    Unknown,
}

/// What the buffer builder requires from the host runtime.
pub trait AllocationQuery: Send + Sync {
    /// Element type and count registered for the region containing `ptr`.
    fn lookup(&self, ptr: usize) -> Result<(TypeId, usize), LookupStatus>;
    fn resolve(&self, type_id: TypeId) -> Resolved;
    fn type_name(&self, type_id: TypeId) -> String;
    fn type_size(&self, type_id: TypeId) -> usize;
}

// ---------------------------------------------------------------------------
// In-memory tracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct TrackedRegion {
    type_id: TypeId,
    count: usize,
}

/// Address-ordered allocation map over a `TypeDb`.
///
/// `lookup` accepts interior pointers as long as they land on an element
/// boundary of the tracked region; the returned count is the number of
/// elements remaining from that boundary to the end of the region.
#[derive(Debug, Default)]
pub struct AllocationTracker {
    types: TypeDb,
    regions: RwLock<BTreeMap<usize, TrackedRegion>>,
}

impl AllocationTracker {
    pub fn new(types: TypeDb) -> Self {
        AllocationTracker {
            types,
            regions: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn types(&self) -> &TypeDb {
        &self.types
    }

    /// Record an allocation of `count` elements of `type_id` at `ptr`.
    pub fn track(&self, ptr: usize, type_id: TypeId, count: usize) {
        self.regions
            .write()
            .insert(ptr, TrackedRegion { type_id, count });
    }

    pub fn untrack(&self, ptr: usize) {
        self.regions.write().remove(&ptr);
    }
}

impl AllocationQuery for AllocationTracker {
    fn lookup(&self, ptr: usize) -> Result<(TypeId, usize), LookupStatus> {
        let regions = self.regions.read();
        let (base, region) = regions
            .range(..=ptr)
            .next_back()
            .ok_or(LookupStatus::UnknownAddress)?;
        let elem_size = self.types.type_size(region.type_id);
        if elem_size == 0 {
            return Err(LookupStatus::UnknownAddress);
        }
        let extent = region.count * elem_size;
        let offset = ptr - base;
        if offset >= extent {
            return Err(LookupStatus::UnknownAddress);
        }
        if offset % elem_size != 0 {
            return Err(LookupStatus::BadAlignment);
        }
        Ok((region.type_id, region.count - offset / elem_size))
    }

    fn resolve(&self, type_id: TypeId) -> Resolved {
        if let Some(layout) = self.types.struct_layout(type_id) {
            return Resolved::Struct(layout.clone());
        }
        if self.types.is_valid(type_id) {
            return Resolved::Builtin;
        }
        Resolved::Unknown
    }

    fn type_name(&self, type_id: TypeId) -> String {
        self.types.type_name(type_id)
    }

    fn type_size(&self, type_id: TypeId) -> usize {
        self.types.type_size(type_id)
    }
}
