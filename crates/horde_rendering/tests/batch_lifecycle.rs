//! Integration tests for the batch frame protocol and teardown races.
//!
//! Everything runs against the headless backend, which keeps buffer bytes
//! and the command log in memory.

use std::sync::Arc;

use horde_core::{AnimationSample, BoundsMode, InstanceTransform, StoreError};
use horde_rendering::{
    skinning_material_slots, AnimationTextureSet, BatchConfig, BufferDesc, BufferHandle, Command,
    DrawOutcome, GraphicsBackend, IndirectDraw, IndirectSkinningBatch, MaterialHandle, MeshHandle,
    RecordingBackend, RenderError, RenderResult, ResourceKind, SkipReason, TextureHandle,
};
use parking_lot::Mutex;

const INDEX_COUNT: u32 = 4_212;

struct Scene {
    backend: Arc<RecordingBackend>,
    template: MaterialHandle,
    mesh: MeshHandle,
    textures: AnimationTextureSet,
}

impl Scene {
    fn new() -> Self {
        let backend = Arc::new(RecordingBackend::new());
        let template = backend.register_material("crowd_skinning", skinning_material_slots());
        let mesh = backend.register_mesh(&[INDEX_COUNT, 96]);
        let textures = AnimationTextureSet::new(
            backend.register_texture("walk"),
            backend.register_texture("run"),
            backend.register_texture("idle"),
        );
        Self {
            backend,
            template,
            mesh,
            textures,
        }
    }

    fn batch(&self, config: BatchConfig) -> IndirectSkinningBatch<RecordingBackend> {
        IndirectSkinningBatch::new(
            Arc::clone(&self.backend),
            self.template,
            self.mesh,
            self.textures,
            config,
        )
        .unwrap()
    }
}

fn unit(i: u8) -> (InstanceTransform, AnimationSample) {
    let f = f32::from(i);
    (
        InstanceTransform::from_translation(f, 0.0, -f),
        AnimationSample::new(f * 0.1, 0.5, 1.0),
    )
}

fn stage(batch: &mut IndirectSkinningBatch<RecordingBackend>, count: u8) {
    for i in 0..count {
        let (t, s) = unit(i);
        batch.append(t, s).unwrap();
    }
}

#[test]
fn test_three_of_four_drawn() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(4));
    stage(&mut batch, 3);
    scene.backend.clear_commands();

    assert_eq!(batch.draw().unwrap(), DrawOutcome::Drawn { instances: 3 });

    let args = scene.backend.read_args(batch.args_buffer().unwrap()).unwrap();
    assert_eq!(args.to_array(), [INDEX_COUNT, 3, 0, 0, 0]);

    let store = batch.instances().unwrap();
    let transforms = scene.backend.buffer_contents(batch.transform_buffer().unwrap()).unwrap();
    assert_eq!(transforms.len(), 4 * 64);
    assert_eq!(&transforms[..3 * 64], store.transform_bytes());

    let coords = scene.backend.buffer_contents(batch.coordinate_buffer().unwrap()).unwrap();
    assert_eq!(coords.len(), 4 * 12);
    assert_eq!(&coords[..3 * 12], store.sample_bytes());

    assert_eq!(scene.backend.draws().len(), 1);
}

#[test]
fn test_draw_before_any_append_is_empty() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(4));
    scene.backend.clear_commands();

    assert_eq!(batch.draw().unwrap(), DrawOutcome::Skipped(SkipReason::Empty));
    assert!(scene.backend.commands().is_empty());

    let args = scene.backend.read_args(batch.args_buffer().unwrap()).unwrap();
    assert_eq!(args.instance_count, 0);
}

#[test]
fn test_fifth_append_rejected() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(4));
    stage(&mut batch, 4);

    let (t, s) = unit(4);
    assert_eq!(
        batch.append(t, s),
        Err(RenderError::Store(StoreError::CapacityExceeded { capacity: 4 }))
    );
    assert_eq!(batch.unit_to_draw_count(), 4);
    assert_eq!(batch.draw().unwrap(), DrawOutcome::Drawn { instances: 4 });
}

#[test]
fn test_frame_refill_overwrites_prefix() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(4));

    stage(&mut batch, 4);
    batch.draw().unwrap();

    batch.clear();
    let (t, s) = unit(9);
    batch.append(t, s).unwrap();
    assert_eq!(batch.draw().unwrap(), DrawOutcome::Drawn { instances: 1 });

    let args = scene.backend.read_args(batch.args_buffer().unwrap()).unwrap();
    assert_eq!(args.instance_count, 1);

    let transforms = scene.backend.buffer_contents(batch.transform_buffer().unwrap()).unwrap();
    assert_eq!(&transforms[..64], batch.instances().unwrap().transform_bytes());
}

#[test]
fn test_producer_batch_append_through_store() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(4));

    let (transforms, samples): (Vec<_>, Vec<_>) = (0..6).map(unit).unzip();
    let added = batch
        .instances_mut()
        .unwrap()
        .append_batch(&transforms, &samples)
        .unwrap();

    assert_eq!(added, 4);
    assert_eq!(batch.draw().unwrap(), DrawOutcome::Drawn { instances: 4 });
}

#[test]
fn test_uploads_precede_draw() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(8));
    stage(&mut batch, 2);
    scene.backend.clear_commands();

    batch.draw().unwrap();

    let order: Vec<_> = scene
        .backend
        .commands()
        .into_iter()
        .map(|cmd| match cmd {
            Command::WriteBuffer { buffer, .. } if Some(buffer) == batch.transform_buffer() => "transforms",
            Command::WriteBuffer { buffer, .. } if Some(buffer) == batch.coordinate_buffer() => "coordinates",
            Command::WriteBuffer { buffer, .. } if Some(buffer) == batch.args_buffer() => "args",
            Command::Draw(_) => "draw",
            _ => "other",
        })
        .collect();
    assert_eq!(order, ["transforms", "coordinates", "args", "draw"]);
}

#[test]
fn test_mesh_destroyed_skips_draw() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(4));
    stage(&mut batch, 2);
    scene.backend.destroy_mesh(scene.mesh);
    scene.backend.clear_commands();

    assert_eq!(
        batch.draw().unwrap(),
        DrawOutcome::Skipped(SkipReason::TornDown(ResourceKind::Mesh))
    );
    assert!(scene.backend.commands().is_empty());
}

#[test]
fn test_material_destroyed_skips_draw() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(4));
    stage(&mut batch, 2);
    scene.backend.destroy_material(batch.material().unwrap());
    scene.backend.clear_commands();

    assert_eq!(
        batch.draw().unwrap(),
        DrawOutcome::Skipped(SkipReason::TornDown(ResourceKind::Material))
    );
    assert!(scene.backend.draws().is_empty());
}

#[test]
fn test_buffer_released_skips_draw() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(4));
    stage(&mut batch, 2);

    scene.backend.release_buffer(batch.coordinate_buffer().unwrap());
    assert_eq!(
        batch.draw().unwrap(),
        DrawOutcome::Skipped(SkipReason::TornDown(ResourceKind::CoordinateBuffer))
    );

    scene.backend.release_buffer(batch.args_buffer().unwrap());
    assert_eq!(
        batch.draw().unwrap(),
        DrawOutcome::Skipped(SkipReason::TornDown(ResourceKind::ArgsBuffer))
    );
    assert!(scene.backend.draws().is_empty());
}

#[test]
fn test_texture_destroyed_skips_draw() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(4));
    stage(&mut batch, 1);
    scene.backend.destroy_texture(scene.textures.textures[1]);

    assert_eq!(
        batch.draw().unwrap(),
        DrawOutcome::Skipped(SkipReason::TornDown(ResourceKind::Texture))
    );
}

#[test]
fn test_dispose_twice() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(4));
    stage(&mut batch, 2);

    assert!(batch.dispose());
    assert!(!batch.dispose());
    assert!(batch.is_disposed());
    assert!(batch.instances().is_none());
    assert_eq!(batch.unit_to_draw_count(), 0);

    // Only the template is left.
    assert_eq!(scene.backend.live_buffers(), 0);
    assert_eq!(scene.backend.live_materials(), 1);

    assert_eq!(batch.draw().unwrap(), DrawOutcome::Skipped(SkipReason::Disposed));
    assert!(batch.append(unit(0).0, unit(0).1).is_err());
}

#[test]
fn test_dispose_after_engine_teardown() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig::with_capacity(4));

    scene.backend.destroy_mesh(scene.mesh);
    scene.backend.destroy_material(batch.material().unwrap());
    scene.backend.release_buffer(batch.args_buffer().unwrap());

    assert!(batch.dispose());
    assert_eq!(scene.backend.live_buffers(), 0);
}

#[test]
fn test_bounds_follow_instances() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig {
        bounds: BoundsMode::FromInstances { padding: 1.0 },
        ..BatchConfig::with_capacity(8)
    });
    stage(&mut batch, 3);
    batch.draw().unwrap();

    let bounds = scene.backend.draws()[0].bounds;
    assert_eq!(bounds.min, [-1.0, -1.0, -3.0]);
    assert_eq!(bounds.max, [3.0, 1.0, 1.0]);
}

#[test]
fn test_shadow_settings_reach_draw() {
    let scene = Scene::new();
    let mut batch = scene.batch(BatchConfig {
        cast_shadows: true,
        receive_shadows: false,
        ..BatchConfig::with_capacity(2)
    });
    stage(&mut batch, 1);
    batch.draw().unwrap();

    let draw = scene.backend.draws()[0];
    assert_eq!(draw.shadow_casting, horde_rendering::ShadowCasting::On);
    assert!(!draw.receive_shadows);
}

#[test]
fn test_batches_share_one_template() {
    let scene = Scene::new();
    let mut a = scene.batch(BatchConfig::with_capacity(2));
    let mut b = scene.batch(BatchConfig::with_capacity(2));
    stage(&mut a, 1);
    stage(&mut b, 2);

    assert_eq!(a.draw().unwrap(), DrawOutcome::Drawn { instances: 1 });
    assert_eq!(b.draw().unwrap(), DrawOutcome::Drawn { instances: 2 });
    assert_ne!(a.material(), b.material());

    drop(a);
    assert!(scene.backend.is_material_live(b.material().unwrap()));
    assert_eq!(b.draw().unwrap(), DrawOutcome::Drawn { instances: 2 });
}

#[test]
fn test_config_file_drives_batch() {
    let path = std::env::temp_dir().join(format!(
        "horde_batch_config_{}.toml",
        std::process::id()
    ));
    std::fs::write(&path, "capacity = 3\nlabel = \"squad\"\n").unwrap();
    let config = BatchConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let scene = Scene::new();
    let mut batch = scene.batch(config);
    stage(&mut batch, 3);
    assert!(batch.append(unit(3).0, unit(3).1).is_err());

    let material = batch.material().unwrap();
    assert_eq!(scene.backend.material_label(material).as_deref(), Some("squad.material"));
    let desc = scene.backend.buffer_desc(batch.transform_buffer().unwrap()).unwrap();
    assert_eq!(desc.label, "squad.object_to_world");
    assert_eq!(desc.count, 3);
}

/// Releases one buffer from inside the next write, after the batch's
/// liveness check has already passed.
#[derive(Default)]
struct ReleaseOnWrite {
    inner: RecordingBackend,
    victim: Mutex<Option<BufferHandle>>,
}

impl GraphicsBackend for ReleaseOnWrite {
    fn create_buffer(&self, desc: &BufferDesc) -> RenderResult<BufferHandle> {
        self.inner.create_buffer(desc)
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        if let Some(victim) = self.victim.lock().take() {
            self.inner.release_buffer(victim);
        }
        self.inner.write_buffer(buffer, offset, data)
    }

    fn release_buffer(&self, buffer: BufferHandle) -> bool {
        self.inner.release_buffer(buffer)
    }

    fn is_buffer_live(&self, buffer: BufferHandle) -> bool {
        self.inner.is_buffer_live(buffer)
    }

    fn mesh_index_count(&self, mesh: MeshHandle, submesh: u32) -> RenderResult<u32> {
        self.inner.mesh_index_count(mesh, submesh)
    }

    fn is_mesh_live(&self, mesh: MeshHandle) -> bool {
        self.inner.is_mesh_live(mesh)
    }

    fn is_texture_live(&self, texture: TextureHandle) -> bool {
        self.inner.is_texture_live(texture)
    }

    fn clone_material(&self, template: MaterialHandle, label: &str) -> RenderResult<MaterialHandle> {
        self.inner.clone_material(template, label)
    }

    fn set_material_buffer(
        &self,
        material: MaterialHandle,
        name: &str,
        buffer: BufferHandle,
    ) -> RenderResult<()> {
        self.inner.set_material_buffer(material, name, buffer)
    }

    fn set_material_texture(
        &self,
        material: MaterialHandle,
        name: &str,
        texture: TextureHandle,
    ) -> RenderResult<()> {
        self.inner.set_material_texture(material, name, texture)
    }

    fn is_material_live(&self, material: MaterialHandle) -> bool {
        self.inner.is_material_live(material)
    }

    fn destroy_material(&self, material: MaterialHandle) -> bool {
        self.inner.destroy_material(material)
    }

    fn draw_mesh_instanced_indirect(&self, draw: &IndirectDraw) -> RenderResult<()> {
        self.inner.draw_mesh_instanced_indirect(draw)
    }
}

fn racing_batch(backend: &Arc<ReleaseOnWrite>) -> IndirectSkinningBatch<ReleaseOnWrite> {
    let template = backend
        .inner
        .register_material("crowd_skinning", skinning_material_slots());
    let mesh = backend.inner.register_mesh(&[INDEX_COUNT]);
    let textures = AnimationTextureSet::new(
        backend.inner.register_texture("walk"),
        backend.inner.register_texture("run"),
        backend.inner.register_texture("idle"),
    );
    let mut batch = IndirectSkinningBatch::new(
        Arc::clone(backend),
        template,
        mesh,
        textures,
        BatchConfig::with_capacity(4),
    )
    .unwrap();
    let (t, s) = unit(0);
    batch.append(t, s).unwrap();
    batch
}

#[test]
fn test_coordinate_buffer_lost_mid_upload_skips_draw() {
    let backend = Arc::new(ReleaseOnWrite::default());
    let mut batch = racing_batch(&backend);
    *backend.victim.lock() = batch.coordinate_buffer();

    assert_eq!(
        batch.draw().unwrap(),
        DrawOutcome::Skipped(SkipReason::TornDown(ResourceKind::CoordinateBuffer))
    );
    assert!(backend.inner.draws().is_empty());
    assert_eq!(batch.stats().draws_skipped, 1);
    assert_eq!(batch.stats().draws_submitted, 0);
}

#[test]
fn test_args_buffer_lost_mid_upload_keeps_host_args() {
    let backend = Arc::new(ReleaseOnWrite::default());
    let mut batch = racing_batch(&backend);
    *backend.victim.lock() = batch.args_buffer();

    assert_eq!(
        batch.draw().unwrap(),
        DrawOutcome::Skipped(SkipReason::TornDown(ResourceKind::ArgsBuffer))
    );
    assert!(backend.inner.draws().is_empty());
    // The patched count never reached the GPU.
    assert_eq!(batch.args().instance_count, 0);
}
