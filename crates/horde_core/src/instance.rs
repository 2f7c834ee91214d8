//! Per-instance data structures for GPU upload.

use bytemuck::{Pod, Zeroable};

/// Object-to-world matrix of one instance.
///
/// Column-major, matching WGSL `mat4x4<f32>`: `cols[3]` holds the
/// translation. Uploaded verbatim into the `objectToWorldBuffer` slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceTransform {
    /// The four matrix columns.
    pub cols: [[f32; 4]; 4],
}

impl InstanceTransform {
    /// Size in bytes (stride of the transform buffer).
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// [`SIZE`](Self::SIZE) as a GPU buffer stride.
    pub const STRIDE: u32 = 64;

    /// Identity transform.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Creates a transform from raw columns.
    #[must_use]
    pub const fn from_cols(cols: [[f32; 4]; 4]) -> Self {
        Self { cols }
    }

    /// Creates a pure translation.
    #[must_use]
    pub const fn from_translation(x: f32, y: f32, z: f32) -> Self {
        let mut t = Self::IDENTITY;
        t.cols[3] = [x, y, z, 1.0];
        t
    }

    /// Creates a uniform scale followed by a translation.
    #[must_use]
    pub const fn from_scale_translation(scale: f32, x: f32, y: f32, z: f32) -> Self {
        Self {
            cols: [
                [scale, 0.0, 0.0, 0.0],
                [0.0, scale, 0.0, 0.0],
                [0.0, 0.0, scale, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    /// World-space position of the instance origin.
    #[inline]
    #[must_use]
    pub const fn translation(&self) -> [f32; 3] {
        [self.cols[3][0], self.cols[3][1], self.cols[3][2]]
    }
}

impl Default for InstanceTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Where in the animation texture atlas this instance's pose lives.
///
/// The shader treats the three components as an opaque coordinate
/// (typically UV plus frame/blend). Uploaded tightly packed, 12 bytes each.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct AnimationSample {
    /// Packed coordinate.
    pub coord: [f32; 3],
}

impl AnimationSample {
    /// Size in bytes (stride of the coordinate buffer).
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// [`SIZE`](Self::SIZE) as a GPU buffer stride.
    pub const STRIDE: u32 = 12;

    /// Creates a sample coordinate.
    #[must_use]
    pub const fn new(u: f32, v: f32, w: f32) -> Self {
        Self { coord: [u, v, w] }
    }
}
