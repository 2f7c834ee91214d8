//! WGPU backend.
//!
//! Buffers are real `wgpu::Buffer`s written through `Queue::write_buffer`.
//! A material template is a render pipeline plus the layout of bind
//! group 0 and the names of its slots; a material instance records which
//! buffers and textures fill those slots and builds its bind group lazily.
//!
//! Draw submissions cannot be recorded directly: a `wgpu::RenderPass`
//! belongs to the host's frame. Submitted draws are resolved into
//! [`PreparedDraw`]s, which the host drains with
//! [`WgpuBackend::take_prepared_draws`] and records into its pass:
//!
//! ```rust,ignore
//! let draws = backend.take_prepared_draws();
//! let mut pass = encoder.begin_render_pass(&desc);
//! for draw in &draws {
//!     draw.record(&mut pass);
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use horde_core::Aabb;
use parking_lot::Mutex;

use super::{
    check_buffer_slot, check_texture_slot, BufferDesc, BufferKind, GraphicsBackend, IndirectDraw,
    ShadowCasting, SlotKind, TemplateSlot,
};
use crate::error::{RenderError, RenderResult, ResourceKind};
use crate::handle::{
    BufferHandle, BufferTag, MaterialHandle, MaterialTag, MeshHandle, MeshTag, ResourceSlots,
    TextureHandle, TextureTag,
};
use crate::indirect::IndirectArgs;

/// Index range of one submesh inside a [`GpuMesh`]'s index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submesh {
    /// First index.
    pub first_index: u32,
    /// Number of indices.
    pub index_count: u32,
}

/// Mesh uploaded by the asset pipeline.
#[derive(Debug)]
pub struct GpuMesh {
    /// Vertex data bound at slot 0.
    pub vertex_buffer: wgpu::Buffer,
    /// Index data.
    pub index_buffer: wgpu::Buffer,
    /// Index element type.
    pub index_format: wgpu::IndexFormat,
    /// Submesh ranges. Skinned batches draw submesh 0, which starts at index 0.
    pub submeshes: Vec<Submesh>,
}

/// Shared material asset.
#[derive(Debug)]
pub struct MaterialTemplate {
    /// Debug label.
    pub label: String,
    /// Pipeline the shader was compiled into.
    pub pipeline: wgpu::RenderPipeline,
    /// Layout of bind group 0.
    pub bind_group_layout: wgpu::BindGroupLayout,
    /// Named slots of bind group 0.
    pub slots: Vec<TemplateSlot>,
}

/// A draw resolved against live GPU objects, ready to record.
#[derive(Debug)]
pub struct PreparedDraw {
    pipeline_source: Arc<MaterialTemplate>,
    bind_group: Arc<wgpu::BindGroup>,
    mesh: Arc<GpuMesh>,
    args: Arc<wgpu::Buffer>,
    args_offset: u64,
    bounds: Aabb,
    shadow_casting: ShadowCasting,
    receive_shadows: bool,
}

impl PreparedDraw {
    /// Records the indirect draw into `pass`.
    pub fn record<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        pass.set_pipeline(&self.pipeline_source.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, self.mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(self.mesh.index_buffer.slice(..), self.mesh.index_format);
        pass.draw_indexed_indirect(&self.args, self.args_offset);
    }

    /// Bound for host-side culling.
    #[must_use]
    pub const fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Returns true if the draw belongs in shadow passes.
    #[must_use]
    pub fn casts_shadows(&self) -> bool {
        self.shadow_casting == ShadowCasting::On
    }

    /// Returns true if the draw samples shadow maps.
    #[must_use]
    pub const fn receives_shadows(&self) -> bool {
        self.receive_shadows
    }
}

struct GpuBuffer {
    buffer: Arc<wgpu::Buffer>,
    desc: BufferDesc,
}

struct GpuMaterial {
    template: Arc<MaterialTemplate>,
    label: String,
    buffers: HashMap<String, BufferHandle>,
    textures: HashMap<String, TextureHandle>,
    /// Dropped whenever a binding changes.
    bind_group: Option<Arc<wgpu::BindGroup>>,
}

#[derive(Default)]
struct State {
    buffers: ResourceSlots<BufferTag, GpuBuffer>,
    meshes: ResourceSlots<MeshTag, Arc<GpuMesh>>,
    textures: ResourceSlots<TextureTag, Arc<wgpu::TextureView>>,
    materials: ResourceSlots<MaterialTag, GpuMaterial>,
    prepared: Vec<PreparedDraw>,
}

/// [`GraphicsBackend`] on top of a wgpu device and queue.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    state: Mutex<State>,
}

/// Usage flags for a buffer kind.
#[must_use]
pub(crate) fn buffer_usages(kind: BufferKind) -> wgpu::BufferUsages {
    match kind {
        BufferKind::IndirectArgs => wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
        BufferKind::Structured => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    }
}

/// Checks the alignment rules of `Queue::write_buffer`.
pub(crate) fn check_write_alignment(offset: u64, len: u64) -> RenderResult<()> {
    if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || len % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(RenderError::Device(format!(
            "unaligned write: offset {offset}, len {len} (alignment {})",
            wgpu::COPY_BUFFER_ALIGNMENT
        )));
    }
    Ok(())
}

impl WgpuBackend {
    /// Creates a backend on an existing device.
    #[must_use]
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            state: Mutex::new(State::default()),
        }
    }

    /// The device buffers are created on.
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    // === Engine side ===

    /// Takes ownership of an uploaded mesh.
    pub fn insert_mesh(&self, mesh: GpuMesh) -> MeshHandle {
        self.state.lock().meshes.insert(Arc::new(mesh))
    }

    /// Drops a mesh. In-flight prepared draws keep their own reference.
    pub fn remove_mesh(&self, mesh: MeshHandle) -> bool {
        self.state.lock().meshes.remove(mesh).is_some()
    }

    /// Takes ownership of a texture view.
    pub fn insert_texture(&self, view: wgpu::TextureView) -> TextureHandle {
        self.state.lock().textures.insert(Arc::new(view))
    }

    /// Drops a texture view.
    pub fn remove_texture(&self, texture: TextureHandle) -> bool {
        self.state.lock().textures.remove(texture).is_some()
    }

    /// Registers a shared material asset.
    pub fn insert_material_template(&self, template: MaterialTemplate) -> MaterialHandle {
        let label = template.label.clone();
        self.state.lock().materials.insert(GpuMaterial {
            template: Arc::new(template),
            label,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            bind_group: None,
        })
    }

    /// Drains the draws submitted since the last call.
    #[must_use]
    pub fn take_prepared_draws(&self) -> Vec<PreparedDraw> {
        std::mem::take(&mut self.state.lock().prepared)
    }

    #[cfg(test)]
    fn buffer_arc(&self, buffer: BufferHandle) -> Option<Arc<wgpu::Buffer>> {
        self.state.lock().buffers.get(buffer).map(|b| Arc::clone(&b.buffer))
    }

    fn build_bind_group(
        &self,
        state: &State,
        material: &GpuMaterial,
    ) -> RenderResult<wgpu::BindGroup> {
        enum Bound {
            Buffer(Arc<wgpu::Buffer>),
            Texture(Arc<wgpu::TextureView>),
        }

        let template = &material.template;
        let mut bound = Vec::with_capacity(template.slots.len());
        for slot in &template.slots {
            let resource = match slot.kind {
                SlotKind::StructuredBuffer { .. } => {
                    let handle = material
                        .buffers
                        .get(&slot.name)
                        .ok_or_else(|| RenderError::UnboundSlot(slot.name.clone()))?;
                    let buffer = state
                        .buffers
                        .get(*handle)
                        .ok_or(RenderError::ResourceTornDown(ResourceKind::Buffer))?;
                    Bound::Buffer(Arc::clone(&buffer.buffer))
                }
                SlotKind::Texture => {
                    let handle = material
                        .textures
                        .get(&slot.name)
                        .ok_or_else(|| RenderError::UnboundSlot(slot.name.clone()))?;
                    let view = state
                        .textures
                        .get(*handle)
                        .ok_or(RenderError::ResourceTornDown(ResourceKind::Texture))?;
                    Bound::Texture(Arc::clone(view))
                }
            };
            bound.push((slot.binding, resource));
        }

        let entries: Vec<wgpu::BindGroupEntry<'_>> = bound
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    Bound::Buffer(buffer) => buffer.as_entire_binding(),
                    Bound::Texture(view) => wgpu::BindingResource::TextureView(view.as_ref()),
                },
            })
            .collect();

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(material.label.as_str()),
            layout: &template.bind_group_layout,
            entries: &entries,
        }))
    }
}

impl GraphicsBackend for WgpuBackend {
    fn create_buffer(&self, desc: &BufferDesc) -> RenderResult<BufferHandle> {
        let size = desc.size();
        if size == 0 {
            return Err(RenderError::Device(format!("buffer `{}` has zero size", desc.label)));
        }
        let limits = self.device.limits();
        if size > limits.max_buffer_size {
            return Err(RenderError::Device(format!(
                "buffer `{}` of {size} bytes exceeds device limit",
                desc.label
            )));
        }
        if desc.kind == BufferKind::Structured && size > u64::from(limits.max_storage_buffer_binding_size) {
            return Err(RenderError::Device(format!(
                "buffer `{}` of {size} bytes exceeds the storage binding limit",
                desc.label
            )));
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label.as_str()),
            size,
            usage: buffer_usages(desc.kind),
            mapped_at_creation: false,
        });

        Ok(self.state.lock().buffers.insert(GpuBuffer {
            buffer: Arc::new(buffer),
            desc: desc.clone(),
        }))
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        let state = self.state.lock();
        let target = state
            .buffers
            .get(buffer)
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Buffer))?;

        let len = data.len() as u64;
        let size = target.desc.size();
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(RenderError::WriteOutOfBounds { offset, len, size });
        }
        check_write_alignment(offset, len)?;

        self.queue.write_buffer(&target.buffer, offset, data);
        Ok(())
    }

    /// Drops the slot's reference only. Prepared draws and cached bind
    /// groups keep the buffer alive until the host has recorded them;
    /// wgpu frees it with the last reference.
    fn release_buffer(&self, buffer: BufferHandle) -> bool {
        self.state.lock().buffers.remove(buffer).is_some()
    }

    fn is_buffer_live(&self, buffer: BufferHandle) -> bool {
        self.state.lock().buffers.contains(buffer)
    }

    fn mesh_index_count(&self, mesh: MeshHandle, submesh: u32) -> RenderResult<u32> {
        let state = self.state.lock();
        let mesh = state
            .meshes
            .get(mesh)
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Mesh))?;

        mesh.submeshes
            .get(submesh as usize)
            .map(|s| s.index_count)
            .ok_or(RenderError::InvalidSubmesh {
                submesh,
                count: u32::try_from(mesh.submeshes.len()).unwrap_or(u32::MAX),
            })
    }

    fn is_mesh_live(&self, mesh: MeshHandle) -> bool {
        self.state.lock().meshes.contains(mesh)
    }

    fn is_texture_live(&self, texture: TextureHandle) -> bool {
        self.state.lock().textures.contains(texture)
    }

    fn clone_material(&self, template: MaterialHandle, label: &str) -> RenderResult<MaterialHandle> {
        let mut state = self.state.lock();
        let source = state
            .materials
            .get(template)
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Material))?;

        let copy = GpuMaterial {
            template: Arc::clone(&source.template),
            label: label.to_owned(),
            buffers: source.buffers.clone(),
            textures: source.textures.clone(),
            bind_group: None,
        };
        Ok(state.materials.insert(copy))
    }

    fn set_material_buffer(
        &self,
        material: MaterialHandle,
        name: &str,
        buffer: BufferHandle,
    ) -> RenderResult<()> {
        let mut state = self.state.lock();
        let stride = state
            .buffers
            .get(buffer)
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Buffer))?
            .desc
            .stride;
        let target = state
            .materials
            .get_mut(material)
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Material))?;

        check_buffer_slot(&target.template.slots, name, stride)?;
        target.buffers.insert(name.to_owned(), buffer);
        target.bind_group = None;
        Ok(())
    }

    fn set_material_texture(
        &self,
        material: MaterialHandle,
        name: &str,
        texture: TextureHandle,
    ) -> RenderResult<()> {
        let mut state = self.state.lock();
        if !state.textures.contains(texture) {
            return Err(RenderError::ResourceTornDown(ResourceKind::Texture));
        }
        let target = state
            .materials
            .get_mut(material)
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Material))?;

        check_texture_slot(&target.template.slots, name)?;
        target.textures.insert(name.to_owned(), texture);
        target.bind_group = None;
        Ok(())
    }

    fn is_material_live(&self, material: MaterialHandle) -> bool {
        self.state.lock().materials.contains(material)
    }

    fn destroy_material(&self, material: MaterialHandle) -> bool {
        self.state.lock().materials.remove(material).is_some()
    }

    fn draw_mesh_instanced_indirect(&self, draw: &IndirectDraw) -> RenderResult<()> {
        let mut state = self.state.lock();

        let mesh = Arc::clone(
            state
                .meshes
                .get(draw.mesh)
                .ok_or(RenderError::ResourceTornDown(ResourceKind::Mesh))?,
        );
        if draw.submesh as usize >= mesh.submeshes.len() {
            return Err(RenderError::InvalidSubmesh {
                submesh: draw.submesh,
                count: u32::try_from(mesh.submeshes.len()).unwrap_or(u32::MAX),
            });
        }

        let args = state
            .buffers
            .get(draw.args)
            .ok_or(RenderError::ResourceTornDown(ResourceKind::ArgsBuffer))?;
        if draw.args_offset.saturating_add(IndirectArgs::SIZE as u64) > args.desc.size() {
            return Err(RenderError::WriteOutOfBounds {
                offset: draw.args_offset,
                len: IndirectArgs::SIZE as u64,
                size: args.desc.size(),
            });
        }
        let args = Arc::clone(&args.buffer);

        let material = state
            .materials
            .get(draw.material)
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Material))?;
        let (template, bind_group) = match &material.bind_group {
            Some(cached) => (Arc::clone(&material.template), Arc::clone(cached)),
            None => {
                let built = Arc::new(self.build_bind_group(&state, material)?);
                (Arc::clone(&material.template), built)
            }
        };

        if let Some(material) = state.materials.get_mut(draw.material) {
            material.bind_group = Some(Arc::clone(&bind_group));
        }

        state.prepared.push(PreparedDraw {
            pipeline_source: template,
            bind_group,
            mesh,
            args,
            args_offset: draw.args_offset,
            bounds: draw.bounds,
            shadow_casting: draw.shadow_casting,
            receive_shadows: draw.receive_shadows,
        });
        Ok(())
    }
}
