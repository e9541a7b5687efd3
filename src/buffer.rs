/// Buffer descriptor builder.
///
/// A `Buffer` is the language-level view of one memory region: its address,
/// how many elements it holds, what type those elements have, and — for
/// struct types — the recursive layout of the members. The tree is built
/// fresh at every call entry from the allocation registry and dropped when
/// the check finishes.
use crate::error::CreateError;
use crate::registry::{AllocationQuery, Resolved};
use crate::types::{TypeId, TypeInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    /// Byte offset within the parent struct; 0 at the root.
    pub offset: isize,
    /// Raw address; 0 encodes a null buffer.
    pub ptr: usize,
    /// Element count of this node's type.
    pub count: usize,
    pub type_info: TypeInfo,
    /// Present iff the type is a registered struct.
    pub members: Option<Vec<Buffer>>,
}

impl Buffer {
    /// Sentinel for a null user pointer. The engine short-circuits on it.
    pub fn null() -> Self {
        Buffer {
            offset: 0,
            ptr: 0,
            count: 0,
            type_info: TypeInfo::invalid(),
            members: None,
        }
    }

    /// Root form used at call entry: ask the registry what lives at `ptr`.
    pub fn from_ptr(registry: &dyn AllocationQuery, ptr: usize) -> Result<Buffer, CreateError> {
        if ptr == 0 {
            return Ok(Buffer::null());
        }
        let (type_id, count) = registry
            .lookup(ptr)
            .map_err(|status| CreateError::Registry(status.message().to_string()))?;
        Buffer::from_parts(registry, 0, ptr, count, type_id)
    }

    /// Describe `count` elements of `type_id` at `ptr`, recursing into
    /// struct members. `offset` is the byte offset within the parent.
    pub fn from_parts(
        registry: &dyn AllocationQuery,
        offset: isize,
        ptr: usize,
        count: usize,
        type_id: TypeId,
    ) -> Result<Buffer, CreateError> {
        if ptr == 0 {
            return Ok(Buffer::null());
        }
        let type_info = TypeInfo {
            id: type_id,
            name: registry.type_name(type_id),
            size: registry.type_size(type_id),
        };
        match registry.resolve(type_id) {
            Resolved::Unknown => Err(CreateError::InvalidArgument(format!(
                "buffer description received an invalid type id {}",
                type_id
            ))),
            Resolved::Builtin => Ok(Buffer {
                offset,
                ptr,
                count,
                type_info,
                members: None,
            }),
            Resolved::Struct(layout) => {
                let mut members = Vec::with_capacity(layout.members.len());
                for member in &layout.members {
                    let member_ptr = (ptr as isize + member.offset) as usize;
                    members.push(Buffer::from_parts(
                        registry,
                        member.offset,
                        member_ptr,
                        member.count,
                        member.type_id,
                    )?);
                }
                Ok(Buffer {
                    offset,
                    ptr,
                    count,
                    type_info,
                    members: Some(members),
                })
            }
        }
    }

    pub fn has_struct_type(&self) -> bool {
        self.members.is_some()
    }
}
