//! Graphics backend abstraction.
//!
//! A batch never holds raw GPU objects. It holds [`Handle`]s and asks the
//! backend to act on them, so that every engine-owned object can be
//! checked for liveness before use.
//!
//! ## Implementations
//!
//! - [`RecordingBackend`]: headless, keeps buffer bytes and an ordered
//!   command log in memory
//! - [`WgpuBackend`]: real GPU through wgpu
//!
//! [`Handle`]: crate::handle::Handle

mod recording;
mod wgpu_backend;

pub use recording::{Command, RecordingBackend};
pub use wgpu_backend::{GpuMesh, MaterialTemplate, PreparedDraw, Submesh, WgpuBackend};

use horde_core::Aabb;

use crate::error::{RenderError, RenderResult};
use crate::handle::{BufferHandle, MaterialHandle, MeshHandle, TextureHandle};

/// Resource kind a material slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Read-only structured buffer with a fixed element stride.
    StructuredBuffer {
        /// Bytes per element the shader expects.
        stride: u32,
    },
    /// Sampled texture.
    Texture,
}

/// A named bind point declared by a material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSlot {
    /// Name used by `set_material_*`.
    pub name: String,
    /// Binding index in bind group 0.
    pub binding: u32,
    /// Accepted resource.
    pub kind: SlotKind,
}

impl TemplateSlot {
    /// Declares a structured-buffer slot.
    #[must_use]
    pub fn structured(name: &str, binding: u32, stride: u32) -> Self {
        Self {
            name: name.to_owned(),
            binding,
            kind: SlotKind::StructuredBuffer { stride },
        }
    }

    /// Declares a texture slot.
    #[must_use]
    pub fn texture(name: &str, binding: u32) -> Self {
        Self {
            name: name.to_owned(),
            binding,
            kind: SlotKind::Texture,
        }
    }
}

/// Finds `name` among `slots` and checks it accepts a buffer of `stride`.
pub(crate) fn check_buffer_slot(slots: &[TemplateSlot], name: &str, stride: u32) -> RenderResult<()> {
    let slot = find_slot(slots, name)?;
    match slot.kind {
        SlotKind::StructuredBuffer { stride: expected } if expected == stride => Ok(()),
        SlotKind::StructuredBuffer { stride: expected } => Err(RenderError::StrideMismatch {
            name: name.to_owned(),
            expected,
            actual: stride,
        }),
        SlotKind::Texture => Err(RenderError::BindingKindMismatch(name.to_owned())),
    }
}

/// Finds `name` among `slots` and checks it accepts a texture.
pub(crate) fn check_texture_slot(slots: &[TemplateSlot], name: &str) -> RenderResult<()> {
    match find_slot(slots, name)?.kind {
        SlotKind::Texture => Ok(()),
        SlotKind::StructuredBuffer { .. } => Err(RenderError::BindingKindMismatch(name.to_owned())),
    }
}

fn find_slot<'a>(slots: &'a [TemplateSlot], name: &str) -> RenderResult<&'a TemplateSlot> {
    slots
        .iter()
        .find(|slot| slot.name == name)
        .ok_or_else(|| RenderError::UnknownBinding(name.to_owned()))
}

/// What a buffer is used for. Decides the GPU usage flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Source of indirect draw arguments.
    IndirectArgs,
    /// Shader-readable array of fixed-stride records.
    Structured,
}

/// Buffer creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Debug label.
    pub label: String,
    /// Usage.
    pub kind: BufferKind,
    /// Number of elements.
    pub count: u32,
    /// Bytes per element.
    pub stride: u32,
}

impl BufferDesc {
    /// Total size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.count as u64 * self.stride as u64
    }
}

/// Shadow casting mode of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowCasting {
    /// Not rendered into shadow maps.
    #[default]
    Off,
    /// Rendered into shadow maps.
    On,
}

/// One indirect draw submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndirectDraw {
    /// Mesh to draw.
    pub mesh: MeshHandle,
    /// Submesh of `mesh`.
    pub submesh: u32,
    /// Material with all bindings in place.
    pub material: MaterialHandle,
    /// Buffer holding an `IndirectArgs` record.
    pub args: BufferHandle,
    /// Byte offset of the record in `args`.
    pub args_offset: u64,
    /// Bound used by host-side culling.
    pub bounds: Aabb,
    /// Shadow casting mode.
    pub shadow_casting: ShadowCasting,
    /// Whether the draw samples shadow maps.
    pub receive_shadows: bool,
}

/// Operations a batch needs from the graphics layer.
///
/// All methods take `&self`: one backend is shared by every batch on the
/// graphics thread, so implementations use interior mutability.
/// Commands are executed (or enqueued) in call order.
pub trait GraphicsBackend {
    /// Allocates a buffer of `desc.count * desc.stride` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Device`](crate::RenderError::Device) if the
    /// device refuses the allocation.
    fn create_buffer(&self, desc: &BufferDesc) -> RenderResult<BufferHandle>;

    /// Writes `data` at byte `offset`. Fire-and-forget from the caller's view.
    ///
    /// # Errors
    ///
    /// Fails if the buffer was released or the write overruns it.
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()>;

    /// Releases a buffer. Returns false if it was already released.
    fn release_buffer(&self, buffer: BufferHandle) -> bool;

    /// Returns true if the buffer is live.
    fn is_buffer_live(&self, buffer: BufferHandle) -> bool;

    /// Index count of one submesh.
    ///
    /// # Errors
    ///
    /// Fails if the mesh was released or has no such submesh.
    fn mesh_index_count(&self, mesh: MeshHandle, submesh: u32) -> RenderResult<u32>;

    /// Returns true if the mesh is live.
    fn is_mesh_live(&self, mesh: MeshHandle) -> bool;

    /// Returns true if the texture is live.
    fn is_texture_live(&self, texture: TextureHandle) -> bool;

    /// Creates a private copy of a material so per-batch bindings do not
    /// leak onto the shared asset.
    ///
    /// # Errors
    ///
    /// Fails if the template was released.
    fn clone_material(&self, template: MaterialHandle, label: &str) -> RenderResult<MaterialHandle>;

    /// Binds a structured buffer to a named slot.
    ///
    /// # Errors
    ///
    /// Fails on an unknown slot, a stride mismatch, or a released handle.
    fn set_material_buffer(
        &self,
        material: MaterialHandle,
        name: &str,
        buffer: BufferHandle,
    ) -> RenderResult<()>;

    /// Binds a texture to a named slot.
    ///
    /// # Errors
    ///
    /// Fails on an unknown slot or a released handle.
    fn set_material_texture(
        &self,
        material: MaterialHandle,
        name: &str,
        texture: TextureHandle,
    ) -> RenderResult<()>;

    /// Returns true if the material is live.
    fn is_material_live(&self, material: MaterialHandle) -> bool;

    /// Destroys a material. Returns false if it was already destroyed.
    fn destroy_material(&self, material: MaterialHandle) -> bool;

    /// Submits one indirect draw.
    ///
    /// # Errors
    ///
    /// Fails if any referenced handle was released.
    fn draw_mesh_instanced_indirect(&self, draw: &IndirectDraw) -> RenderResult<()>;
}
