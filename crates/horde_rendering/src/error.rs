//! # Rendering Error Types

use std::fmt;

use horde_core::StoreError;
use thiserror::Error;

/// Kind of GPU-side object a batch depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A buffer whose role the backend does not know.
    Buffer,
    /// The indirect arguments buffer.
    ArgsBuffer,
    /// The object-to-world structured buffer.
    TransformBuffer,
    /// The animation coordinate structured buffer.
    CoordinateBuffer,
    /// The borrowed mesh.
    Mesh,
    /// The private material instance (or its template).
    Material,
    /// One of the borrowed animation textures.
    Texture,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Buffer => "buffer",
            Self::ArgsBuffer => "args buffer",
            Self::TransformBuffer => "transform buffer",
            Self::CoordinateBuffer => "coordinate buffer",
            Self::Mesh => "mesh",
            Self::Material => "material",
            Self::Texture => "texture",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while building or driving a batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Instance staging failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A handle no longer resolves.
    #[error("{0} has been released")]
    ResourceTornDown(ResourceKind),

    /// The mesh has no such submesh.
    #[error("submesh {submesh} out of range (mesh has {count})")]
    InvalidSubmesh {
        /// Requested submesh.
        submesh: u32,
        /// Submeshes available.
        count: u32,
    },

    /// The material does not declare the named slot.
    #[error("material has no binding named `{0}`")]
    UnknownBinding(String),

    /// The material declares the slot with a different kind or stride.
    #[error("binding `{name}` expects stride {expected}, got {actual}")]
    StrideMismatch {
        /// Slot name.
        name: String,
        /// Stride declared by the material.
        expected: u32,
        /// Stride of the buffer being bound.
        actual: u32,
    },

    /// A buffer was bound to a texture slot or the other way round.
    #[error("binding `{0}` has a different resource kind")]
    BindingKindMismatch(String),

    /// A declared slot has nothing bound at draw time.
    #[error("binding `{0}` is not bound")]
    UnboundSlot(String),

    /// A write would run past the end of a buffer.
    #[error("write of {len} bytes at offset {offset} overflows buffer of {size} bytes")]
    WriteOutOfBounds {
        /// Byte offset of the write.
        offset: u64,
        /// Length of the write.
        len: u64,
        /// Buffer size.
        size: u64,
    },

    /// Batch configuration rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The graphics device reported a failure.
    #[error("device error: {0}")]
    Device(String),
}

impl RenderError {
    /// Returns the torn-down resource if this error is a teardown race.
    #[must_use]
    pub const fn torn_down(&self) -> Option<ResourceKind> {
        match self {
            Self::ResourceTornDown(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;
