//! Indirect draw arguments.
//!
//! The one bit-exact wire format in the crate: five little-endian `u32`
//! laid out exactly as the native indexed-indirect draw record
//! (`DrawIndexedIndirect` in wgpu/Vulkan/D3D12).

use bytemuck::{Pod, Zeroable};

/// Arguments consumed by `draw_indexed_indirect`.
///
/// Only `instance_count` changes after construction; the three location
/// fields are always zero for skinned batches.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectArgs {
    /// Indices per instance (submesh 0's index count).
    pub index_count_per_instance: u32,
    /// Number of instances to draw.
    pub instance_count: u32,
    /// First index in the index buffer.
    pub start_index_location: u32,
    /// Value added to each index. Stored unsigned; always zero here.
    pub base_vertex_location: u32,
    /// First instance ID.
    pub start_instance_location: u32,
}

impl IndirectArgs {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// [`SIZE`](Self::SIZE) as a GPU buffer stride.
    pub const STRIDE: u32 = 20;

    /// Number of `u32` fields.
    pub const FIELD_COUNT: usize = 5;

    /// Arguments for a mesh with `index_count` indices and no instances yet.
    #[must_use]
    pub const fn for_mesh(index_count: u32) -> Self {
        Self {
            index_count_per_instance: index_count,
            instance_count: 0,
            start_index_location: 0,
            base_vertex_location: 0,
            start_instance_location: 0,
        }
    }

    /// Returns the record as bytes for GPU upload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Returns the fields in wire order.
    #[must_use]
    pub const fn to_array(self) -> [u32; Self::FIELD_COUNT] {
        [
            self.index_count_per_instance,
            self.instance_count,
            self.start_index_location,
            self.base_vertex_location,
            self.start_instance_location,
        ]
    }

    /// Reads a record back from bytes. `None` if `bytes` is too short.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..Self::SIZE)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }
}
