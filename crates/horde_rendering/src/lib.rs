//! # HORDE Rendering
//!
//! Draws thousands of GPU-skinned instances of one mesh with a single
//! indirect call per frame.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐  append()   ┌───────────────────────┐
//! │ Animation      │ ──────────► │ IndirectSkinningBatch │
//! │ system         │             │   InstanceStore       │
//! └────────────────┘             └──────────┬────────────┘
//!                                           │ draw()
//!                                           ▼
//!                      ┌─────────────────────────────────────┐
//!                      │ GraphicsBackend                      │
//!                      │  write transforms ─► write samples   │
//!                      │  ─► patch args ─► indirect draw      │
//!                      └─────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use horde_core::{AnimationSample, InstanceTransform};
//! use horde_rendering::{
//!     skinning_material_slots, AnimationTextureSet, BatchConfig, DrawOutcome,
//!     IndirectSkinningBatch, RecordingBackend,
//! };
//!
//! let backend = Arc::new(RecordingBackend::new());
//! let template = backend.register_material("skinning", skinning_material_slots());
//! let mesh = backend.register_mesh(&[36]);
//! let textures = AnimationTextureSet::new(
//!     backend.register_texture("anim0"),
//!     backend.register_texture("anim1"),
//!     backend.register_texture("anim2"),
//! );
//!
//! let mut batch = IndirectSkinningBatch::new(
//!     Arc::clone(&backend),
//!     template,
//!     mesh,
//!     textures,
//!     BatchConfig::with_capacity(1024),
//! )?;
//!
//! batch.append(InstanceTransform::from_translation(1.0, 0.0, 2.0), AnimationSample::new(0.5, 0.0, 1.0))?;
//! assert_eq!(batch.draw()?, DrawOutcome::Drawn { instances: 1 });
//! # Ok::<(), horde_rendering::RenderError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod handle;
pub mod indirect;

pub use backend::{
    BufferDesc, BufferKind, Command, GpuMesh, GraphicsBackend, IndirectDraw, MaterialTemplate,
    PreparedDraw, RecordingBackend, ShadowCasting, SlotKind, Submesh, TemplateSlot, WgpuBackend,
};
pub use batch::{
    skinning_material_slots, AnimationTextureSet, DrawOutcome, DrawStats, IndirectSkinningBatch,
    SkipReason, ANIMATION_TEXTURE_SLOTS, COORDINATE_BUFFER_SLOT, DRAW_SUBMESH,
    TRANSFORM_BUFFER_SLOT,
};
pub use config::{BatchConfig, MAX_CAPACITY, MAX_STORAGE_BINDING_BYTES};
pub use error::{RenderError, RenderResult, ResourceKind};
pub use handle::{BufferHandle, Handle, MaterialHandle, MeshHandle, TextureHandle};
pub use indirect::IndirectArgs;
