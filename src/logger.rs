/// Stderr diagnostics in the fixed line formats.
///
/// Every record is rendered into one string and written with a single call,
/// so records from concurrent checks never interleave mid-line. The
/// formatting functions are public so tests can assert on exact output
/// without capturing stderr.
use std::fmt::Write as _;

use crate::call::Call;
use crate::error::{CreateError, TypeCheckError};

/// Two info lines announcing a completed check: what was checked, and from
/// where it was called.
pub fn format_header(call: &Call) -> String {
    let direction = if call.is_send { "send" } else { "recv" };
    format!(
        "R[{rank}][Info]ID[{id}] {function}: checked {direction}-buffer {ptr:#x} of type \"{buffer_type}\" against MPI type \"{mpi_type}\"\n\
         R[{rank}][Info]ID[{id}] \tin {caller}[{addr:#x}] at {file}:{line}\n",
        rank = call.rank,
        id = call.trace_id,
        function = call.function_name,
        direction = direction,
        ptr = call.buffer.ptr,
        buffer_type = call.buffer.type_info.name,
        mpi_type = call.mpi_type.name,
        caller = call.caller.location.function,
        addr = call.caller.addr,
        file = call.caller.location.file,
        line = call.caller.location.line,
    )
}

/// Error lines for a failed check; empty for `NullCount`, one line per
/// nested finding for struct mismatches.
pub fn format_check_error(call: &Call, error: &TypeCheckError) -> String {
    let mut out = String::new();
    append_check_error(&mut out, call, error);
    out
}

fn append_check_error(out: &mut String, call: &Call, error: &TypeCheckError) {
    match error {
        // Counted, never logged.
        TypeCheckError::NullCount => {}
        TypeCheckError::NullBuffer => {
            error_line(out, call, &format!("buffer {:#x} is NULL", call.buffer.ptr));
        }
        TypeCheckError::StructContentsMismatch { errors } => {
            for nested in errors {
                append_check_error(out, call, nested);
            }
        }
        TypeCheckError::MemberTypeMismatch { error: nested, .. } => {
            append_check_error(out, call, nested);
            error_line(out, call, &error.to_string());
        }
        other => error_line(out, call, &other.to_string()),
    }
}

fn error_line(out: &mut String, call: &Call, message: &str) {
    let _ = writeln!(
        out,
        "R[{}][Error]ID[{}] {}",
        call.rank, call.trace_id, message
    );
}

/// Single error line for a call that could not be constructed.
pub fn format_create_error(
    rank: i32,
    function_name: &str,
    called_from: usize,
    error: &CreateError,
) -> String {
    format!(
        "R[{}][Error] internal error while typechecking a call to {} from {:#x}: {}\n",
        rank, function_name, called_from, error
    )
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct StderrLogger;

impl StderrLogger {
    pub fn log_header(&self, call: &Call) {
        eprint!("{}", format_header(call));
    }

    pub fn log_check_error(&self, call: &Call, error: &TypeCheckError) {
        let record = format_check_error(call, error);
        if !record.is_empty() {
            eprint!("{}", record);
        }
    }

    pub fn log_create_error(
        &self,
        rank: i32,
        function_name: &str,
        called_from: usize,
        error: &CreateError,
    ) {
        eprint!(
            "{}",
            format_create_error(rank, function_name, called_from, error)
        );
    }
}
