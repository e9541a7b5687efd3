/// Spec tests for call-context construction: collaborator wiring, the
/// creation-error taxonomy, and trace-id uniqueness under concurrency.
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;

use mpisentry::call::{Call, Collaborators, LocationResolver, SourceLocation};
use mpisentry::datatype::{
    combiner, predefined, DatatypeHandle, MpiFailure, MpiIntrospect, TypeContents, TypeEnvelope,
};
use mpisentry::error::CreateError;
use mpisentry::registry::AllocationTracker;
use mpisentry::types::{builtin, TypeDb};

// ---------------------------------------------------------------------------
// Collaborator doubles
// ---------------------------------------------------------------------------

struct NamedOnlyMpi {
    names: HashMap<i32, &'static str>,
    rank: i32,
}

impl NamedOnlyMpi {
    fn new(rank: i32) -> Self {
        let mut names = HashMap::new();
        names.insert(predefined::DOUBLE.0, "MPI_DOUBLE");
        names.insert(predefined::INT.0, "MPI_INT");
        NamedOnlyMpi { names, rank }
    }

    fn known(&self, ty: DatatypeHandle, function: &str) -> Result<(), MpiFailure> {
        if self.names.contains_key(&ty.0) {
            Ok(())
        } else {
            Err(MpiFailure {
                function: function.to_string(),
                message: "Invalid datatype, error stack unavailable".to_string(),
            })
        }
    }
}

impl MpiIntrospect for NamedOnlyMpi {
    fn type_envelope(&self, ty: DatatypeHandle) -> Result<TypeEnvelope, MpiFailure> {
        self.known(ty, "MPI_Type_get_envelope")?;
        Ok(TypeEnvelope {
            combiner: combiner::NAMED,
            num_integers: 0,
            num_addresses: 0,
            num_datatypes: 0,
        })
    }

    fn type_contents(&self, ty: DatatypeHandle) -> Result<TypeContents, MpiFailure> {
        self.known(ty, "MPI_Type_get_contents")?;
        Ok(TypeContents {
            integers: vec![],
            addresses: vec![],
            datatypes: vec![],
        })
    }

    fn type_name(&self, ty: DatatypeHandle) -> Result<String, MpiFailure> {
        self.known(ty, "MPI_Type_get_name")?;
        Ok(self.names[&ty.0].to_string())
    }

    fn rank(&self) -> i32 {
        self.rank
    }
}

struct FixedLocations;

impl LocationResolver for FixedLocations {
    fn resolve(&self, addr: usize) -> Option<SourceLocation> {
        Some(SourceLocation {
            function: "run_test".to_string(),
            file: "sendrecv.c".to_string(),
            line: 42 + addr as u32 % 7,
        })
    }
}

struct NoLocations;

impl LocationResolver for NoLocations {
    fn resolve(&self, _addr: usize) -> Option<SourceLocation> {
        None
    }
}

fn tracker_with_doubles() -> AllocationTracker {
    let tracker = AllocationTracker::new(TypeDb::new());
    tracker.track(0x1000, builtin::DOUBLE, 16);
    tracker
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn create_binds_the_full_call_record() {
    let tracker = tracker_with_doubles();
    let mpi = NamedOnlyMpi::new(3);
    let locations = FixedLocations;
    let collab = Collaborators {
        allocations: &tracker,
        mpi: &mpi,
        locations: &locations,
    };

    let call = Call::create(collab, "MPI_Send", 0x4007, 0x1000, true, 16, predefined::DOUBLE)
        .expect("create failed");
    assert_eq!(call.rank, 3);
    assert_eq!(call.function_name, "MPI_Send");
    assert!(call.is_send);
    assert_eq!(call.count, 16);
    assert_eq!(call.caller.addr, 0x4007);
    assert_eq!(call.caller.location.function, "run_test");
    assert_eq!(call.buffer.type_info.name, "double");
    assert_eq!(call.mpi_type.name, "MPI_DOUBLE");
}

#[test]
fn unresolvable_callers_are_a_source_location_error() {
    let tracker = tracker_with_doubles();
    let mpi = NamedOnlyMpi::new(0);
    let locations = NoLocations;
    let collab = Collaborators {
        allocations: &tracker,
        mpi: &mpi,
        locations: &locations,
    };

    assert_eq!(
        Call::create(collab, "MPI_Send", 0x4007, 0x1000, true, 16, predefined::DOUBLE),
        Err(CreateError::SourceLocation(
            "couldn't acquire source location for address 0x4007".to_string()
        ))
    );
}

#[test]
fn untracked_buffers_are_a_registry_error() {
    let tracker = AllocationTracker::new(TypeDb::new());
    let mpi = NamedOnlyMpi::new(0);
    let locations = FixedLocations;
    let collab = Collaborators {
        allocations: &tracker,
        mpi: &mpi,
        locations: &locations,
    };

    assert!(matches!(
        Call::create(collab, "MPI_Send", 0x4007, 0x1000, true, 16, predefined::DOUBLE),
        Err(CreateError::Registry(_))
    ));
}

#[test]
fn unknown_datatype_handles_are_an_mpi_error() {
    let tracker = tracker_with_doubles();
    let mpi = NamedOnlyMpi::new(0);
    let locations = FixedLocations;
    let collab = Collaborators {
        allocations: &tracker,
        mpi: &mpi,
        locations: &locations,
    };

    assert!(matches!(
        Call::create(collab, "MPI_Send", 0x4007, 0x1000, true, 16, DatatypeHandle(9999)),
        Err(CreateError::Mpi { .. })
    ));
}

#[test]
fn null_buffers_construct_without_registry_queries() {
    let tracker = AllocationTracker::new(TypeDb::new());
    let mpi = NamedOnlyMpi::new(0);
    let locations = FixedLocations;
    let collab = Collaborators {
        allocations: &tracker,
        mpi: &mpi,
        locations: &locations,
    };

    let call = Call::create(collab, "MPI_Recv", 0x4007, 0, false, 16, predefined::DOUBLE)
        .expect("create failed");
    assert_eq!(call.buffer.ptr, 0);
    assert_eq!(call.buffer.count, 0);
}

// ---------------------------------------------------------------------------
// Trace ids
// ---------------------------------------------------------------------------

#[test]
fn concurrent_creations_get_distinct_trace_ids() {
    let tracker = tracker_with_doubles();
    let mpi = NamedOnlyMpi::new(0);
    let locations = FixedLocations;
    let seen = Mutex::new(HashSet::new());

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let collab = Collaborators {
                    allocations: &tracker,
                    mpi: &mpi,
                    locations: &locations,
                };
                for _ in 0..32 {
                    let call = Call::create(
                        collab,
                        "MPI_Send",
                        0x4007,
                        0x1000,
                        true,
                        16,
                        predefined::DOUBLE,
                    )
                    .expect("create failed");
                    assert!(
                        seen.lock().unwrap().insert(call.trace_id),
                        "trace id {} issued twice",
                        call.trace_id
                    );
                }
            });
        }
    });

    assert_eq!(seen.lock().unwrap().len(), 8 * 32);
}

#[test]
fn trace_ids_increase_monotonically_within_a_thread() {
    let tracker = tracker_with_doubles();
    let mpi = NamedOnlyMpi::new(0);
    let locations = FixedLocations;
    let collab = Collaborators {
        allocations: &tracker,
        mpi: &mpi,
        locations: &locations,
    };

    let first = Call::create(collab, "MPI_Send", 0x4007, 0x1000, true, 16, predefined::DOUBLE)
        .unwrap()
        .trace_id;
    let second = Call::create(collab, "MPI_Send", 0x4007, 0x1000, true, 16, predefined::DOUBLE)
        .unwrap()
        .trace_id;
    assert!(second > first);
}
