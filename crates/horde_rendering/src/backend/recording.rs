//! Headless backend.
//!
//! Keeps buffer contents in host memory and logs every command in
//! submission order. Engine-side helpers register meshes, textures and
//! material templates, and can destroy them at any time to reproduce
//! teardown races.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{
    check_buffer_slot, check_texture_slot, BufferDesc, GraphicsBackend, IndirectDraw,
    TemplateSlot,
};
use crate::error::{RenderError, RenderResult, ResourceKind};
use crate::handle::{
    BufferHandle, BufferTag, MaterialHandle, MaterialTag, MeshHandle, MeshTag, ResourceSlots,
    TextureHandle, TextureTag,
};
use crate::indirect::IndirectArgs;

/// One entry of the command log.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A buffer was allocated.
    CreateBuffer {
        /// New buffer.
        buffer: BufferHandle,
        /// Its parameters.
        desc: BufferDesc,
    },
    /// Bytes were written into a buffer.
    WriteBuffer {
        /// Target buffer.
        buffer: BufferHandle,
        /// Byte offset.
        offset: u64,
        /// Byte count.
        len: u64,
    },
    /// A buffer was released.
    ReleaseBuffer(BufferHandle),
    /// A material was cloned from a template.
    CloneMaterial {
        /// Source.
        template: MaterialHandle,
        /// New material.
        material: MaterialHandle,
    },
    /// A buffer was bound on a material.
    SetBuffer {
        /// Material.
        material: MaterialHandle,
        /// Slot name.
        name: String,
        /// Bound buffer.
        buffer: BufferHandle,
    },
    /// A texture was bound on a material.
    SetTexture {
        /// Material.
        material: MaterialHandle,
        /// Slot name.
        name: String,
        /// Bound texture.
        texture: TextureHandle,
    },
    /// A material was destroyed.
    DestroyMaterial(MaterialHandle),
    /// An indirect draw was submitted.
    Draw(IndirectDraw),
}

struct RecordedBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

struct RecordedMesh {
    submesh_index_counts: Vec<u32>,
}

#[derive(Clone)]
struct RecordedMaterial {
    label: String,
    slots: Vec<TemplateSlot>,
    buffers: HashMap<String, BufferHandle>,
    textures: HashMap<String, TextureHandle>,
}

#[derive(Default)]
struct State {
    buffers: ResourceSlots<BufferTag, RecordedBuffer>,
    meshes: ResourceSlots<MeshTag, RecordedMesh>,
    textures: ResourceSlots<TextureTag, String>,
    materials: ResourceSlots<MaterialTag, RecordedMaterial>,
    commands: Vec<Command>,
}

/// In-memory [`GraphicsBackend`].
#[derive(Default)]
pub struct RecordingBackend {
    state: Mutex<State>,
}

impl RecordingBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // === Engine side ===

    /// Registers a mesh with the given per-submesh index counts.
    pub fn register_mesh(&self, submesh_index_counts: &[u32]) -> MeshHandle {
        self.state.lock().meshes.insert(RecordedMesh {
            submesh_index_counts: submesh_index_counts.to_vec(),
        })
    }

    /// Destroys a mesh. Returns false if it was already gone.
    pub fn destroy_mesh(&self, mesh: MeshHandle) -> bool {
        self.state.lock().meshes.remove(mesh).is_some()
    }

    /// Registers a texture.
    pub fn register_texture(&self, label: &str) -> TextureHandle {
        self.state.lock().textures.insert(label.to_owned())
    }

    /// Destroys a texture. Returns false if it was already gone.
    pub fn destroy_texture(&self, texture: TextureHandle) -> bool {
        self.state.lock().textures.remove(texture).is_some()
    }

    /// Registers a material template declaring `slots`.
    pub fn register_material(&self, label: &str, slots: Vec<TemplateSlot>) -> MaterialHandle {
        self.state.lock().materials.insert(RecordedMaterial {
            label: label.to_owned(),
            slots,
            buffers: HashMap::new(),
            textures: HashMap::new(),
        })
    }

    // === Inspection ===

    /// Full contents of a live buffer.
    #[must_use]
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(buffer).map(|b| b.data.clone())
    }

    /// Creation parameters of a live buffer.
    #[must_use]
    pub fn buffer_desc(&self, buffer: BufferHandle) -> Option<BufferDesc> {
        self.state.lock().buffers.get(buffer).map(|b| b.desc.clone())
    }

    /// Decodes the first `IndirectArgs` record of a live buffer.
    #[must_use]
    pub fn read_args(&self, buffer: BufferHandle) -> Option<IndirectArgs> {
        let state = self.state.lock();
        IndirectArgs::from_bytes(&state.buffers.get(buffer)?.data)
    }

    /// Buffer bound to `name` on a live material.
    #[must_use]
    pub fn material_buffer(&self, material: MaterialHandle, name: &str) -> Option<BufferHandle> {
        self.state.lock().materials.get(material)?.buffers.get(name).copied()
    }

    /// Texture bound to `name` on a live material.
    #[must_use]
    pub fn material_texture(&self, material: MaterialHandle, name: &str) -> Option<TextureHandle> {
        self.state.lock().materials.get(material)?.textures.get(name).copied()
    }

    /// Debug label of a live material.
    #[must_use]
    pub fn material_label(&self, material: MaterialHandle) -> Option<String> {
        self.state.lock().materials.get(material).map(|m| m.label.clone())
    }

    /// Snapshot of the command log.
    #[must_use]
    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().commands.clone()
    }

    /// Submitted draws, oldest first.
    #[must_use]
    pub fn draws(&self) -> Vec<IndirectDraw> {
        self.state
            .lock()
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::Draw(draw) => Some(*draw),
                _ => None,
            })
            .collect()
    }

    /// Empties the command log. Resources are untouched.
    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Number of live buffers.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Number of live materials, templates included.
    #[must_use]
    pub fn live_materials(&self) -> usize {
        self.state.lock().materials.len()
    }
}

impl GraphicsBackend for RecordingBackend {
    fn create_buffer(&self, desc: &BufferDesc) -> RenderResult<BufferHandle> {
        let size = usize::try_from(desc.size())
            .map_err(|_| RenderError::Device(format!("buffer `{}` too large", desc.label)))?;

        let mut state = self.state.lock();
        let buffer = state.buffers.insert(RecordedBuffer {
            desc: desc.clone(),
            data: vec![0; size],
        });
        state.commands.push(Command::CreateBuffer {
            buffer,
            desc: desc.clone(),
        });
        Ok(buffer)
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        let mut state = self.state.lock();
        let target = state
            .buffers
            .get_mut(buffer)
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Buffer))?;

        let len = data.len() as u64;
        let size = target.data.len() as u64;
        let end = offset.checked_add(len).filter(|end| *end <= size);
        let Some(end) = end else {
            return Err(RenderError::WriteOutOfBounds { offset, len, size });
        };

        // Both bounds are <= size, which came from a usize.
        target.data[offset as usize..end as usize].copy_from_slice(data);
        state.commands.push(Command::WriteBuffer { buffer, offset, len });
        Ok(())
    }

    fn release_buffer(&self, buffer: BufferHandle) -> bool {
        let mut state = self.state.lock();
        let released = state.buffers.remove(buffer).is_some();
        if released {
            state.commands.push(Command::ReleaseBuffer(buffer));
        }
        released
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

        mesh.submesh_index_counts
            .get(submesh as usize)
            .copied()
            .ok_or(RenderError::InvalidSubmesh {
                submesh,
                count: u32::try_from(mesh.submesh_index_counts.len()).unwrap_or(u32::MAX),
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
        let mut copy = state
            .materials
            .get(template)
            .cloned()
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Material))?;
        copy.label = label.to_owned();

        let material = state.materials.insert(copy);
        state.commands.push(Command::CloneMaterial { template, material });
        Ok(material)
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

        check_buffer_slot(&target.slots, name, stride)?;
        target.buffers.insert(name.to_owned(), buffer);
        state.commands.push(Command::SetBuffer {
            material,
            name: name.to_owned(),
            buffer,
        });
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

        check_texture_slot(&target.slots, name)?;
        target.textures.insert(name.to_owned(), texture);
        state.commands.push(Command::SetTexture {
            material,
            name: name.to_owned(),
            texture,
        });
        Ok(())
    }

    fn is_material_live(&self, material: MaterialHandle) -> bool {
        self.state.lock().materials.contains(material)
    }

    fn destroy_material(&self, material: MaterialHandle) -> bool {
        let mut state = self.state.lock();
        let destroyed = state.materials.remove(material).is_some();
        if destroyed {
            state.commands.push(Command::DestroyMaterial(material));
        }
        destroyed
    }

    fn draw_mesh_instanced_indirect(&self, draw: &IndirectDraw) -> RenderResult<()> {
        let mut state = self.state.lock();

        let mesh = state
            .meshes
            .get(draw.mesh)
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Mesh))?;
        let submeshes = mesh.submesh_index_counts.len();
        if draw.submesh as usize >= submeshes {
            return Err(RenderError::InvalidSubmesh {
                submesh: draw.submesh,
                count: u32::try_from(submeshes).unwrap_or(u32::MAX),
            });
        }
        if !state.materials.contains(draw.material) {
            return Err(RenderError::ResourceTornDown(ResourceKind::Material));
        }

        let args = state
            .buffers
            .get(draw.args)
            .ok_or(RenderError::ResourceTornDown(ResourceKind::ArgsBuffer))?;
        let size = args.data.len() as u64;
        if draw.args_offset.saturating_add(IndirectArgs::SIZE as u64) > size {
            return Err(RenderError::WriteOutOfBounds {
                offset: draw.args_offset,
                len: IndirectArgs::SIZE as u64,
                size,
            });
        }

        state.commands.push(Command::Draw(*draw));
        Ok(())
    }
}
