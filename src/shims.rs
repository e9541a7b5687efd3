/// Interception surface.
///
/// The thin wrappers around the messaging library call into this module.
/// An `Interceptor` owns its collaborators and the process-wide counters;
/// `install` publishes one instance behind a `OnceCell` so the wrappers can
/// reach it through the free functions without threading state. All counter
/// blocks expose snapshot and reset hooks for tests.
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;

use crate::call::{Call, Collaborators, LocationResolver};
use crate::datatype::{DatatypeHandle, MpiIntrospect};
use crate::engine;
use crate::error::TypeCheckError;
use crate::logger::StderrLogger;
use crate::registry::AllocationQuery;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CallCounter {
    send: AtomicU64,
    recv: AtomicU64,
    send_recv: AtomicU64,
    unsupported: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub send: u64,
    pub recv: u64,
    pub send_recv: u64,
    pub unsupported: u64,
}

impl CallCounter {
    pub fn snapshot(&self) -> CallCounts {
        CallCounts {
            send: self.send.load(Ordering::Relaxed),
            recv: self.recv.load(Ordering::Relaxed),
            send_recv: self.send_recv.load(Ordering::Relaxed),
            unsupported: self.unsupported.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.send.store(0, Ordering::Relaxed);
        self.recv.store(0, Ordering::Relaxed);
        self.send_recv.store(0, Ordering::Relaxed);
        self.unsupported.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
pub struct MpiCounter {
    error: AtomicU64,
    null_buf: AtomicU64,
    null_count: AtomicU64,
    type_error: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpiCounts {
    pub error: u64,
    pub null_buf: u64,
    pub null_count: u64,
    pub type_error: u64,
}

impl MpiCounter {
    pub fn snapshot(&self) -> MpiCounts {
        MpiCounts {
            error: self.error.load(Ordering::Relaxed),
            null_buf: self.null_buf.load(Ordering::Relaxed),
            null_count: self.null_count.load(Ordering::Relaxed),
            type_error: self.type_error.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.error.store(0, Ordering::Relaxed);
        self.null_buf.store(0, Ordering::Relaxed);
        self.null_count.store(0, Ordering::Relaxed);
        self.type_error.store(0, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Interceptor
// ---------------------------------------------------------------------------

pub struct Interceptor {
    allocations: Box<dyn AllocationQuery>,
    mpi: Box<dyn MpiIntrospect>,
    locations: Box<dyn LocationResolver>,
    logger: StderrLogger,
    calls: CallCounter,
    findings: MpiCounter,
}

impl Interceptor {
    pub fn new(
        allocations: Box<dyn AllocationQuery>,
        mpi: Box<dyn MpiIntrospect>,
        locations: Box<dyn LocationResolver>,
    ) -> Self {
        Interceptor {
            allocations,
            mpi,
            locations,
            logger: StderrLogger,
            calls: CallCounter::default(),
            findings: MpiCounter::default(),
        }
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            allocations: self.allocations.as_ref(),
            mpi: self.mpi.as_ref(),
            locations: self.locations.as_ref(),
        }
    }

    pub fn check_send(
        &self,
        function_name: &str,
        called_from: usize,
        buffer: usize,
        count: i32,
        datatype: DatatypeHandle,
    ) {
        self.calls.send.fetch_add(1, Ordering::Relaxed);
        self.run_check(function_name, called_from, buffer, true, count, datatype);
    }

    pub fn check_recv(
        &self,
        function_name: &str,
        called_from: usize,
        buffer: usize,
        count: i32,
        datatype: DatatypeHandle,
    ) {
        self.calls.recv.fetch_add(1, Ordering::Relaxed);
        self.run_check(function_name, called_from, buffer, false, count, datatype);
    }

    /// Send-check then recv-check; the two verdicts are independent.
    #[allow(clippy::too_many_arguments)]
    pub fn check_send_and_recv(
        &self,
        function_name: &str,
        called_from: usize,
        send_buffer: usize,
        send_count: i32,
        send_type: DatatypeHandle,
        recv_buffer: usize,
        recv_count: i32,
        recv_type: DatatypeHandle,
    ) {
        self.calls.send_recv.fetch_add(1, Ordering::Relaxed);
        self.check_send(function_name, called_from, send_buffer, send_count, send_type);
        self.check_recv(function_name, called_from, recv_buffer, recv_count, recv_type);
    }

    /// Entry points without a check only count how often they were hit.
    pub fn unsupported(&self, _function_name: &str, _called_from: usize) {
        self.calls.unsupported.fetch_add(1, Ordering::Relaxed);
    }

    /// Final two-line summary, emitted at teardown of the messaging layer.
    pub fn exit(&self) {
        eprint!("{}", self.format_summary());
    }

    pub fn format_summary(&self) -> String {
        let rank = self.mpi.rank();
        let calls = self.calls.snapshot();
        let findings = self.findings.snapshot();
        format!(
            "R[{rank}][Info] CCounter {{ Send: {} Recv: {} Send_Recv: {} Unsupported: {} MAX RSS[KBytes]: {} }}\n\
             R[{rank}][Info] MCounter {{ Error: {} Null_Buf: {} Null_Count: {} Type_Error: {} }}\n",
            calls.send,
            calls.recv,
            calls.send_recv,
            calls.unsupported,
            max_rss_kbytes(),
            findings.error,
            findings.null_buf,
            findings.null_count,
            findings.type_error,
            rank = rank,
        )
    }

    pub fn call_counts(&self) -> CallCounts {
        self.calls.snapshot()
    }

    pub fn finding_counts(&self) -> MpiCounts {
        self.findings.snapshot()
    }

    pub fn reset_counters(&self) {
        self.calls.reset();
        self.findings.reset();
    }

    fn run_check(
        &self,
        function_name: &str,
        called_from: usize,
        buffer: usize,
        is_send: bool,
        count: i32,
        datatype: DatatypeHandle,
    ) {
        let call = match Call::create(
            self.collaborators(),
            function_name,
            called_from,
            buffer,
            is_send,
            count,
            datatype,
        ) {
            Ok(call) => call,
            Err(error) => {
                self.findings.error.fetch_add(1, Ordering::Relaxed);
                self.logger
                    .log_create_error(self.mpi.rank(), function_name, called_from, &error);
                return;
            }
        };
        let result = engine::check(&call);
        self.logger.log_header(&call);
        if let Err(error) = result {
            match error {
                TypeCheckError::NullCount => {
                    self.findings.null_count.fetch_add(1, Ordering::Relaxed)
                }
                TypeCheckError::NullBuffer => {
                    self.findings.null_buf.fetch_add(1, Ordering::Relaxed)
                }
                _ => self.findings.type_error.fetch_add(1, Ordering::Relaxed),
            };
            self.logger.log_check_error(&call, &error);
        }
    }
}

/// Peak resident set size in kilobytes; 0 when the platform does not expose
/// it.
fn max_rss_kbytes() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status
                .lines()
                .find(|line| line.starts_with("VmHWM:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|value| value.parse().ok())
        })
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Process-global instance
// ---------------------------------------------------------------------------

static INSTALLED: OnceCell<Interceptor> = OnceCell::new();

/// Publish the interceptor the free-function shims route through. Fails if
/// one is already installed.
pub fn install(interceptor: Interceptor) -> Result<(), Interceptor> {
    INSTALLED.set(interceptor)
}

pub fn installed() -> Option<&'static Interceptor> {
    INSTALLED.get()
}

pub fn check_send(
    function_name: &str,
    called_from: usize,
    buffer: usize,
    count: i32,
    datatype: DatatypeHandle,
) {
    if let Some(interceptor) = installed() {
        interceptor.check_send(function_name, called_from, buffer, count, datatype);
    }
}

pub fn check_recv(
    function_name: &str,
    called_from: usize,
    buffer: usize,
    count: i32,
    datatype: DatatypeHandle,
) {
    if let Some(interceptor) = installed() {
        interceptor.check_recv(function_name, called_from, buffer, count, datatype);
    }
}

#[allow(clippy::too_many_arguments)]
pub fn check_send_and_recv(
    function_name: &str,
    called_from: usize,
    send_buffer: usize,
    send_count: i32,
    send_type: DatatypeHandle,
    recv_buffer: usize,
    recv_count: i32,
    recv_type: DatatypeHandle,
) {
    if let Some(interceptor) = installed() {
        interceptor.check_send_and_recv(
            function_name,
            called_from,
            send_buffer,
            send_count,
            send_type,
            recv_buffer,
            recv_count,
            recv_type,
        );
    }
}

pub fn unsupported(function_name: &str, called_from: usize) {
    if let Some(interceptor) = installed() {
        interceptor.unsupported(function_name, called_from);
    }
}

pub fn exit() {
    if let Some(interceptor) = installed() {
        interceptor.exit();
    }
}
