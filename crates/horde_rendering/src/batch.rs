//! Indirect skinned-instance batch.
//!
//! ## Frame protocol
//!
//! ```text
//! producer                      batch.draw()
//! ────────                      ────────────
//! clear()                       1. resources live?        ── no ─► Skipped(TornDown)
//! append(transform, sample)*    2. n = len()              ── 0 ──► Skipped(Empty)
//!                               3. upload [0, n) of both sequences
//!                               4. args.instance_count = n, upload args
//!                               5. one indirect draw of submesh 0
//! ```
//!
//! Steps 3-5 are issued in order on the backend's single command stream,
//! so the draw always reads this frame's data. Nothing is reallocated after
//! construction: stale data past `n` is never read because the draw is
//! limited to `n` instances.

use std::sync::Arc;

use horde_core::{AnimationSample, InstanceStore, InstanceTransform};

use crate::backend::{
    BufferDesc, BufferKind, GraphicsBackend, IndirectDraw, ShadowCasting, TemplateSlot,
};
use crate::config::BatchConfig;
use crate::error::{RenderError, RenderResult, ResourceKind};
use crate::handle::{BufferHandle, MaterialHandle, MeshHandle, TextureHandle};
use crate::indirect::IndirectArgs;

/// Material slot receiving the object-to-world buffer.
pub const TRANSFORM_BUFFER_SLOT: &str = "objectToWorldBuffer";
/// Material slot receiving the animation coordinate buffer.
pub const COORDINATE_BUFFER_SLOT: &str = "textureCoordinatesBuffer";
/// Material slots receiving the three animation textures.
pub const ANIMATION_TEXTURE_SLOTS: [&str; 3] =
    ["_AnimationTexture0", "_AnimationTexture1", "_AnimationTexture2"];
/// The only submesh a batch draws.
pub const DRAW_SUBMESH: u32 = 0;

/// Slot layout a skinning material must declare.
///
/// Bindings: 0 transforms, 1 coordinates, 2-4 animation textures.
#[must_use]
pub fn skinning_material_slots() -> Vec<TemplateSlot> {
    let mut slots = vec![
        TemplateSlot::structured(TRANSFORM_BUFFER_SLOT, 0, InstanceTransform::STRIDE),
        TemplateSlot::structured(COORDINATE_BUFFER_SLOT, 1, AnimationSample::STRIDE),
    ];
    for (binding, name) in (2..).zip(ANIMATION_TEXTURE_SLOTS) {
        slots.push(TemplateSlot::texture(name, binding));
    }
    slots
}

/// The three baked animation textures. Owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationTextureSet {
    /// Textures in slot order.
    pub textures: [TextureHandle; 3],
}

impl AnimationTextureSet {
    /// Creates a set from the three textures.
    #[must_use]
    pub const fn new(
        animation0: TextureHandle,
        animation1: TextureHandle,
        animation2: TextureHandle,
    ) -> Self {
        Self {
            textures: [animation0, animation1, animation2],
        }
    }
}

/// Why a draw did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The batch was disposed.
    Disposed,
    /// No instances were staged.
    Empty,
    /// A resource the draw depends on was released.
    TornDown(ResourceKind),
}

/// Result of one [`IndirectSkinningBatch::draw`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Data uploaded and one indirect draw submitted.
    Drawn {
        /// Instance count written to the args buffer.
        instances: u32,
    },
    /// Nothing was uploaded or submitted.
    Skipped(SkipReason),
}

impl DrawOutcome {
    /// Returns true if a draw was submitted.
    #[must_use]
    pub const fn is_drawn(&self) -> bool {
        matches!(self, Self::Drawn { .. })
    }
}

/// Counters kept across frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    /// Draws submitted.
    pub draws_submitted: u64,
    /// Draws skipped for any reason.
    pub draws_skipped: u64,
    /// Instance count of the last submitted draw.
    pub last_instance_count: u32,
    /// Bytes uploaded by the last submitted draw, args included.
    pub last_upload_bytes: u64,
}

/// GPU objects owned by a live batch.
#[derive(Debug, Clone, Copy)]
struct GpuResources {
    args: BufferHandle,
    transforms: BufferHandle,
    coordinates: BufferHandle,
    material: MaterialHandle,
}

/// Releases everything allocated so far unless construction completes.
struct PendingResources<'a, B: GraphicsBackend + ?Sized> {
    backend: &'a B,
    buffers: Vec<BufferHandle>,
    material: Option<MaterialHandle>,
}

impl<'a, B: GraphicsBackend + ?Sized> PendingResources<'a, B> {
    fn new(backend: &'a B) -> Self {
        Self {
            backend,
            buffers: Vec::with_capacity(3),
            material: None,
        }
    }

    fn buffer(&mut self, desc: &BufferDesc) -> RenderResult<BufferHandle> {
        let buffer = self.backend.create_buffer(desc)?;
        self.buffers.push(buffer);
        Ok(buffer)
    }

    fn commit(mut self) {
        self.buffers.clear();
        self.material = None;
    }
}

impl<B: GraphicsBackend + ?Sized> Drop for PendingResources<'_, B> {
    fn drop(&mut self) {
        if let Some(material) = self.material.take() {
            self.backend.destroy_material(material);
        }
        for buffer in self.buffers.drain(..) {
            self.backend.release_buffer(buffer);
        }
    }
}

/// Many instances of one skinned mesh, drawn with one indirect call.
///
/// Owns three GPU buffers, a private material clone and the host-side
/// [`InstanceStore`]. The mesh and the animation textures are borrowed
/// engine handles and may disappear at any time; [`draw`](Self::draw)
/// checks them every frame.
///
/// Dropping the batch disposes it.
pub struct IndirectSkinningBatch<B: GraphicsBackend + ?Sized> {
    backend: Arc<B>,
    mesh: MeshHandle,
    textures: AnimationTextureSet,
    config: BatchConfig,
    /// Host copy of the args record; only `instance_count` changes.
    args: IndirectArgs,
    /// `None` once disposed.
    resources: Option<GpuResources>,
    /// `None` once disposed.
    store: Option<InstanceStore>,
    stats: DrawStats,
}

impl<B: GraphicsBackend + ?Sized> IndirectSkinningBatch<B> {
    /// Allocates the batch's GPU resources and binds them on a private
    /// clone of `template`.
    ///
    /// The args buffer is written immediately with `instance_count = 0`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the mesh or template is gone,
    /// the mesh has no submesh 0, the device refuses a buffer, or the
    /// material does not declare the skinning slots. Anything allocated
    /// before the failure is released.
    pub fn new(
        backend: Arc<B>,
        template: MaterialHandle,
        mesh: MeshHandle,
        textures: AnimationTextureSet,
        config: BatchConfig,
    ) -> RenderResult<Self> {
        config.validate()?;
        let capacity = u32::try_from(config.capacity)
            .map_err(|_| RenderError::InvalidConfig("capacity exceeds u32".into()))?;

        let index_count = backend.mesh_index_count(mesh, DRAW_SUBMESH)?;
        let args = IndirectArgs::for_mesh(index_count);

        let (resources, store) = {
            let backend = &*backend;
            let mut pending = PendingResources::new(backend);

            let material = backend.clone_material(template, &format!("{}.material", config.label))?;
            pending.material = Some(material);

            let args_buffer = pending.buffer(&BufferDesc {
                label: format!("{}.args", config.label),
                kind: BufferKind::IndirectArgs,
                count: 1,
                stride: IndirectArgs::STRIDE,
            })?;
            backend.write_buffer(args_buffer, 0, args.as_bytes())?;

            let transforms = pending.buffer(&BufferDesc {
                label: format!("{}.object_to_world", config.label),
                kind: BufferKind::Structured,
                count: capacity,
                stride: InstanceTransform::STRIDE,
            })?;
            let coordinates = pending.buffer(&BufferDesc {
                label: format!("{}.texture_coordinates", config.label),
                kind: BufferKind::Structured,
                count: capacity,
                stride: AnimationSample::STRIDE,
            })?;

            backend.set_material_buffer(material, TRANSFORM_BUFFER_SLOT, transforms)?;
            backend.set_material_buffer(material, COORDINATE_BUFFER_SLOT, coordinates)?;
            for (name, texture) in ANIMATION_TEXTURE_SLOTS.iter().zip(textures.textures) {
                backend.set_material_texture(material, name, texture)?;
            }

            // Host mirror last, once the device has accepted the capacity.
            let store = InstanceStore::with_capacity(config.capacity)?;

            pending.commit();
            let resources = GpuResources {
                args: args_buffer,
                transforms,
                coordinates,
                material,
            };
            (resources, store)
        };

        tracing::debug!(
            "Created skinning batch `{}`: capacity {}, {} indices per instance",
            config.label,
            capacity,
            index_count
        );

        Ok(Self {
            backend,
            mesh,
            textures,
            config,
            args,
            resources: Some(resources),
            store: Some(store),
            stats: DrawStats::default(),
        })
    }

    // === Producer side ===

    /// The staged instances. `None` once disposed.
    #[must_use]
    pub fn instances(&self) -> Option<&InstanceStore> {
        self.store.as_ref()
    }

    /// Write access for the producer. `None` once disposed.
    pub fn instances_mut(&mut self) -> Option<&mut InstanceStore> {
        self.store.as_mut()
    }

    /// Stages one instance for the next draw.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Store`] with `CapacityExceeded` when full, or
    /// [`RenderError::ResourceTornDown`] if the batch was disposed.
    pub fn append(&mut self, transform: InstanceTransform, sample: AnimationSample) -> RenderResult<()> {
        let store = self
            .store
            .as_mut()
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Material))?;
        store.append(transform, sample).map_err(|e| {
            tracing::warn!("Skinning batch `{}` rejected instance: {}", self.config.label, e);
            RenderError::from(e)
        })
    }

    /// Drops all staged instances. Capacity is kept.
    pub fn clear(&mut self) {
        if let Some(store) = self.store.as_mut() {
            store.clear();
        }
    }

    /// Number of instances the next draw will submit.
    #[must_use]
    pub fn unit_to_draw_count(&self) -> usize {
        self.store.as_ref().map_or(0, InstanceStore::len)
    }

    // === Render side ===

    /// Uploads the staged instances and submits one indirect draw.
    ///
    /// Skips without touching GPU state when the batch is disposed, a
    /// resource was released, or nothing is staged. A resource that
    /// disappears mid-upload is also reported as a skip.
    ///
    /// # Errors
    ///
    /// Only backend failures unrelated to teardown are returned.
    pub fn draw(&mut self) -> RenderResult<DrawOutcome> {
        let Some(resources) = self.resources else {
            return Ok(self.skip(SkipReason::Disposed));
        };

        if let Some(kind) = self.find_torn_down(&resources) {
            tracing::warn!(
                "Skinning batch `{}` skipped draw: {} released",
                self.config.label,
                kind
            );
            return Ok(self.skip(SkipReason::TornDown(kind)));
        }

        if self.unit_to_draw_count() == 0 {
            return Ok(self.skip(SkipReason::Empty));
        }

        match self.submit(&resources) {
            Ok((instances, bytes)) => {
                self.stats.draws_submitted += 1;
                self.stats.last_instance_count = instances;
                self.stats.last_upload_bytes = bytes;
                tracing::trace!(
                    "Skinning batch `{}` drew {} instances ({} bytes)",
                    self.config.label,
                    instances,
                    bytes
                );
                Ok(DrawOutcome::Drawn { instances })
            }
            Err(e) => match e.torn_down() {
                Some(kind) => {
                    tracing::warn!(
                        "Skinning batch `{}` lost {} during draw",
                        self.config.label,
                        kind
                    );
                    Ok(self.skip(SkipReason::TornDown(kind)))
                }
                None => Err(e),
            },
        }
    }

    /// Steps 3-5 of the draw protocol. Returns (instances, bytes uploaded).
    fn submit(&mut self, resources: &GpuResources) -> RenderResult<(u32, u64)> {
        let backend = &*self.backend;
        let store = self
            .store
            .as_ref()
            .ok_or(RenderError::ResourceTornDown(ResourceKind::Material))?;
        let instances = u32::try_from(store.len())
            .map_err(|_| RenderError::InvalidConfig("instance count exceeds u32".into()))?;

        let transform_bytes = store.transform_bytes();
        let sample_bytes = store.sample_bytes();
        {
            let modify = tracing::trace_span!("modify_buffers");
            let _modify = modify.enter();
            {
                let upload = tracing::trace_span!("upload_instances");
                let _upload = upload.enter();
                backend
                    .write_buffer(resources.transforms, 0, transform_bytes)
                    .map_err(in_role(ResourceKind::TransformBuffer))?;
                backend
                    .write_buffer(resources.coordinates, 0, sample_bytes)
                    .map_err(in_role(ResourceKind::CoordinateBuffer))?;
            }

            let mut args = self.args;
            args.instance_count = instances;
            backend
                .write_buffer(resources.args, 0, args.as_bytes())
                .map_err(in_role(ResourceKind::ArgsBuffer))?;
            self.args = args;
        }

        backend.draw_mesh_instanced_indirect(&IndirectDraw {
            mesh: self.mesh,
            submesh: DRAW_SUBMESH,
            material: resources.material,
            args: resources.args,
            args_offset: 0,
            bounds: self.config.bounds.resolve(store.transforms()),
            shadow_casting: if self.config.cast_shadows {
                ShadowCasting::On
            } else {
                ShadowCasting::Off
            },
            receive_shadows: self.config.receive_shadows,
        })?;

        let bytes = (transform_bytes.len() + sample_bytes.len() + IndirectArgs::SIZE) as u64;
        Ok((instances, bytes))
    }

    fn find_torn_down(&self, resources: &GpuResources) -> Option<ResourceKind> {
        let backend = &*self.backend;
        if !backend.is_buffer_live(resources.args) {
            return Some(ResourceKind::ArgsBuffer);
        }
        if !backend.is_buffer_live(resources.transforms) {
            return Some(ResourceKind::TransformBuffer);
        }
        if !backend.is_buffer_live(resources.coordinates) {
            return Some(ResourceKind::CoordinateBuffer);
        }
        if !backend.is_mesh_live(self.mesh) {
            return Some(ResourceKind::Mesh);
        }
        if !backend.is_material_live(resources.material) {
            return Some(ResourceKind::Material);
        }
        if !self.textures.textures.iter().all(|t| backend.is_texture_live(*t)) {
            return Some(ResourceKind::Texture);
        }
        None
    }

    fn skip(&mut self, reason: SkipReason) -> DrawOutcome {
        self.stats.draws_skipped += 1;
        DrawOutcome::Skipped(reason)
    }

    // === Teardown ===

    /// Releases the material clone, the three buffers and the host store.
    ///
    /// Returns true on the call that released them; later calls are no-ops
    /// returning false. Resources already released elsewhere are skipped.
    pub fn dispose(&mut self) -> bool {
        let Some(resources) = self.resources.take() else {
            tracing::debug!("Skinning batch `{}` already disposed", self.config.label);
            return false;
        };

        let backend = &*self.backend;
        backend.destroy_material(resources.material);
        for buffer in [resources.args, resources.transforms, resources.coordinates] {
            backend.release_buffer(buffer);
        }
        self.store = None;

        tracing::debug!("Disposed skinning batch `{}`", self.config.label);
        true
    }

    /// Returns true once [`dispose`](Self::dispose) has run.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.resources.is_none()
    }

    // === Accessors ===

    /// Host copy of the args record as last uploaded.
    #[must_use]
    pub const fn args(&self) -> IndirectArgs {
        self.args
    }

    /// Counters kept across frames.
    #[must_use]
    pub const fn stats(&self) -> DrawStats {
        self.stats
    }

    /// Settings the batch was built with.
    #[must_use]
    pub const fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// The drawn mesh.
    #[must_use]
    pub const fn mesh(&self) -> MeshHandle {
        self.mesh
    }

    /// The bound animation textures.
    #[must_use]
    pub const fn textures(&self) -> AnimationTextureSet {
        self.textures
    }

    /// The private material clone. `None` once disposed.
    #[must_use]
    pub fn material(&self) -> Option<MaterialHandle> {
        self.resources.map(|r| r.material)
    }

    /// The indirect args buffer. `None` once disposed.
    #[must_use]
    pub fn args_buffer(&self) -> Option<BufferHandle> {
        self.resources.map(|r| r.args)
    }

    /// The object-to-world buffer. `None` once disposed.
    #[must_use]
    pub fn transform_buffer(&self) -> Option<BufferHandle> {
        self.resources.map(|r| r.transforms)
    }

    /// The animation coordinate buffer. `None` once disposed.
    #[must_use]
    pub fn coordinate_buffer(&self) -> Option<BufferHandle> {
        self.resources.map(|r| r.coordinates)
    }
}

impl<B: GraphicsBackend + ?Sized> Drop for IndirectSkinningBatch<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Attributes a generic buffer teardown to the buffer being written.
fn in_role(kind: ResourceKind) -> impl Fn(RenderError) -> RenderError {
    move |e| match e {
        RenderError::ResourceTornDown(ResourceKind::Buffer) => RenderError::ResourceTornDown(kind),
        other => other,
    }
}
