/// The type-check engine.
///
/// Two mutually recursive routines walk the datatype tree and the buffer
/// tree in parallel. `check_type` establishes that the trees are shape- and
/// type-compatible and yields a pair of multipliers; `check_type_and_count`
/// turns the multipliers into the final size comparison and applies the
/// first-member retry. The engine keeps no state between calls.
///
/// Multiplier semantics: `type_mult` is the number of buffer-typed elements
/// required to represent one element of the MPI type; `buffer_mult` is the
/// number of MPI-typed elements represented by one buffer element. The
/// latter is 1 everywhere except for the byte-typed datatype, where one
/// buffer element of type T accounts for `size_of(T)` bytes.
use crate::buffer::Buffer;
use crate::call::Call;
use crate::datatype::{CombinerKind, MpiType};
use crate::error::TypeCheckError;
use crate::types::builtin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Multipliers {
    pub type_mult: usize,
    pub buffer_mult: usize,
}

impl Multipliers {
    const IDENTITY: Multipliers = Multipliers {
        type_mult: 1,
        buffer_mult: 1,
    };

    /// Scale `type_mult` by an address span computed in i64; negative spans
    /// (degenerate combiner arguments) clamp to zero.
    fn spanned(self, span: i64) -> Multipliers {
        Multipliers {
            type_mult: self.type_mult.saturating_mul(span.max(0) as usize),
            buffer_mult: self.buffer_mult,
        }
    }
}

// ---------------------------------------------------------------------------
// Call-level entry
// ---------------------------------------------------------------------------

pub fn check(call: &Call) -> Result<(), TypeCheckError> {
    if call.count <= 0 {
        return Err(TypeCheckError::NullCount);
    }
    if call.buffer.ptr == 0 {
        return Err(TypeCheckError::NullBuffer);
    }
    check_type_and_count(&call.buffer, &call.mpi_type, call.count as usize)
}

/// Check type compatibility, then that the buffer holds enough elements for
/// `element_count` elements of the MPI type.
///
/// On a type mismatch, a struct buffer whose first member sits at offset 0
/// is re-checked against that member: passing `&s.first_field` through an
/// `&s` handle is legitimate and must type-check against the field type.
/// The re-entry recurses through consecutive zero-offset first members.
pub fn check_type_and_count(
    buffer: &Buffer,
    mpi_type: &MpiType,
    element_count: usize,
) -> Result<(), TypeCheckError> {
    match check_type(buffer, mpi_type) {
        Ok(multipliers) => {
            let required = element_count as u64 * multipliers.type_mult as u64;
            let available = buffer.count as u64 * multipliers.buffer_mult as u64;
            if required > available {
                return Err(TypeCheckError::InsufficientBufferSize {
                    actual: available as usize,
                    required: required as usize,
                });
            }
            Ok(())
        }
        Err(error) => {
            if let Some(first) = buffer.members.as_ref().and_then(|m| m.first()) {
                if first.offset == 0 {
                    return check_type_and_count(first, mpi_type, element_count);
                }
            }
            Err(error)
        }
    }
}

// ---------------------------------------------------------------------------
// Combiner dispatch
// ---------------------------------------------------------------------------

pub fn check_type(buffer: &Buffer, mpi_type: &MpiType) -> Result<Multipliers, TypeCheckError> {
    match mpi_type.combiner.kind {
        CombinerKind::Named => check_named(buffer, mpi_type),
        // A duplicate is an exact copy of its single type argument.
        CombinerKind::Dup => check_type(buffer, &mpi_type.combiner.type_args[0]),
        CombinerKind::Contiguous => check_contiguous(buffer, mpi_type),
        CombinerKind::Vector => check_vector(buffer, mpi_type),
        CombinerKind::IndexedBlock => check_indexed_block(buffer, mpi_type),
        CombinerKind::Struct => check_struct(buffer, mpi_type),
        CombinerKind::Subarray => check_subarray(buffer, mpi_type),
        CombinerKind::Other(_) => Err(TypeCheckError::UnsupportedCombiner {
            combiner_name: mpi_type.combiner.kind.name().to_string(),
        }),
    }
}

fn check_named(buffer: &Buffer, mpi_type: &MpiType) -> Result<Multipliers, TypeCheckError> {
    // The byte datatype matches any buffer type; one buffer element then
    // stands for size_of(buffer type) byte elements.
    if mpi_type.type_id == builtin::BYTE {
        return Ok(Multipliers {
            type_mult: 1,
            buffer_mult: buffer.type_info.size,
        });
    }
    let fp128_equivalent = (buffer.type_info.id == builtin::PPC_FP128
        && mpi_type.type_id == builtin::FLOAT128)
        || (buffer.type_info.id == builtin::FLOAT128 && mpi_type.type_id == builtin::PPC_FP128);
    if buffer.type_info.id != mpi_type.type_id && !fp128_equivalent {
        return Err(TypeCheckError::BuiltinTypeMismatch {
            buffer_type_name: buffer.type_info.name.clone(),
            mpi_type_name: mpi_type.name.clone(),
        });
    }
    Ok(Multipliers::IDENTITY)
}

fn check_contiguous(buffer: &Buffer, mpi_type: &MpiType) -> Result<Multipliers, TypeCheckError> {
    // One contiguous element is `count` consecutive elements of the old
    // type.
    let count = mpi_type.combiner.integer_args[0] as i64;
    let multipliers = check_type(buffer, &mpi_type.combiner.type_args[0])?;
    Ok(multipliers.spanned(count))
}

fn check_vector(buffer: &Buffer, mpi_type: &MpiType) -> Result<Multipliers, TypeCheckError> {
    let count = mpi_type.combiner.integer_args[0] as i64;
    let blocklength = mpi_type.combiner.integer_args[1] as i64;
    let stride = mpi_type.combiner.integer_args[2] as i64;
    if stride < 0 {
        return Err(TypeCheckError::UnsupportedCombinerArgs(
            "negative strides for MPI_Type_vector are currently not supported".to_string(),
        ));
    }
    // `count` blocks of `blocklength` old-type elements, block starts
    // `stride` elements apart: the last addressable element sits at
    // (count - 1) * stride + blocklength.
    let multipliers = check_type(buffer, &mpi_type.combiner.type_args[0])?;
    Ok(multipliers.spanned((count - 1) * stride + blocklength))
}

fn check_indexed_block(buffer: &Buffer, mpi_type: &MpiType) -> Result<Multipliers, TypeCheckError> {
    let blocklength = mpi_type.combiner.integer_args[1] as i64;
    let displacements = &mpi_type.combiner.integer_args[2..];
    if displacements.iter().any(|&d| d < 0) {
        return Err(TypeCheckError::UnsupportedCombinerArgs(
            "negative displacements for MPI_Type_create_indexed_block are currently not supported"
                .to_string(),
        ));
    }
    let max_displacement = displacements.iter().copied().max().unwrap_or(0) as i64;
    let multipliers = check_type(buffer, &mpi_type.combiner.type_args[0])?;
    Ok(multipliers.spanned(max_displacement + blocklength))
}

fn check_struct(buffer: &Buffer, mpi_type: &MpiType) -> Result<Multipliers, TypeCheckError> {
    let count = mpi_type.combiner.integer_args[0] as usize;
    let blocklengths = &mpi_type.combiner.integer_args[1..];
    let displacements = &mpi_type.combiner.address_args;

    let members = match buffer.members.as_ref() {
        Some(members) => members,
        None => {
            return Err(TypeCheckError::BufferNotOfStructType {
                buffer_type_name: buffer.type_info.name.clone(),
            })
        }
    };
    if members.len() != count {
        return Err(TypeCheckError::MemberCountMismatch {
            buffer_type_name: buffer.type_info.name.clone(),
            buffer_count: members.len(),
            mpi_count: count,
        });
    }

    // Collect every finding instead of stopping at the first: offsets over
    // all members first, then one type-or-count finding per member.
    let mut errors = Vec::new();
    for (i, member) in members.iter().enumerate() {
        if member.offset != displacements[i] {
            errors.push(TypeCheckError::MemberOffsetMismatch {
                type_name: buffer.type_info.name.clone(),
                member: i + 1,
                struct_offset: member.offset,
                mpi_offset: displacements[i],
            });
        }
    }
    for (i, member) in members.iter().enumerate() {
        match check_type(member, &mpi_type.combiner.type_args[i]) {
            Err(error) => {
                errors.push(TypeCheckError::MemberTypeMismatch {
                    member: i + 1,
                    error: Box::new(error),
                });
            }
            Ok(multipliers) => {
                let required = blocklengths[i].max(0) as u64 * multipliers.type_mult as u64;
                let available = member.count as u64 * multipliers.buffer_mult as u64;
                if required != available {
                    errors.push(TypeCheckError::MemberElementCountMismatch {
                        type_name: buffer.type_info.name.clone(),
                        member: i + 1,
                        required: required as usize,
                        available: available as usize,
                    });
                }
            }
        }
    }

    if !errors.is_empty() {
        return Err(TypeCheckError::StructContentsMismatch { errors });
    }
    Ok(Multipliers::IDENTITY)
}

fn check_subarray(buffer: &Buffer, mpi_type: &MpiType) -> Result<Multipliers, TypeCheckError> {
    // The subarray names a slice of a larger dense array; the buffer must
    // hold the larger array, i.e. the product of the full sizes.
    let ndims = mpi_type.combiner.integer_args[0] as usize;
    let sizes = &mpi_type.combiner.integer_args[1..1 + ndims];
    let multipliers = check_type(buffer, &mpi_type.combiner.type_args[0])?;
    let total = sizes
        .iter()
        .fold(1i64, |acc, &size| acc.saturating_mul(size.max(0) as i64));
    Ok(multipliers.spanned(total))
}
