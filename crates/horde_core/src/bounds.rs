//! Draw bounds for a whole batch.
//!
//! Indirect draws are culled by the host as one unit, so the batch needs a
//! single bounding volume. Per-instance bounds are not tracked.

use serde::{Deserialize, Serialize};

use crate::instance::InstanceTransform;

/// Half-extent of the default conservative bound (a 1,000,000 unit cube).
pub const CONSERVATIVE_HALF_EXTENT: f32 = 500_000.0;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: [f32; 3],
    /// Maximum corner.
    pub max: [f32; 3],
}

impl Aabb {
    /// Creates a new AABB.
    #[must_use]
    pub const fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    /// Creates an AABB from its center and half-extents.
    #[must_use]
    pub fn from_center_half_extents(center: [f32; 3], half: [f32; 3]) -> Self {
        Self {
            min: [center[0] - half[0], center[1] - half[1], center[2] - half[2]],
            max: [center[0] + half[0], center[1] + half[1], center[2] + half[2]],
        }
    }

    /// Returns the center of the AABB.
    #[must_use]
    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    /// Returns the half-extents of the AABB.
    #[must_use]
    pub fn half_extents(&self) -> [f32; 3] {
        [
            (self.max[0] - self.min[0]) * 0.5,
            (self.max[1] - self.min[1]) * 0.5,
            (self.max[2] - self.min[2]) * 0.5,
        ]
    }

    /// Returns true if the point lies inside or on the box.
    #[must_use]
    pub fn contains(&self, p: [f32; 3]) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Tight box around instance origins, grown by `padding` on every side.
    ///
    /// Returns `None` for an empty slice.
    #[must_use]
    pub fn enclosing_translations(transforms: &[InstanceTransform], padding: f32) -> Option<Self> {
        let (first, rest) = transforms.split_first()?;
        let origin = first.translation();
        let mut min = origin;
        let mut max = origin;

        for t in rest {
            let p = t.translation();
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }

        for i in 0..3 {
            min[i] -= padding;
            max[i] += padding;
        }
        Some(Self { min, max })
    }
}

/// How a batch computes the bound handed to the draw call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BoundsMode {
    /// Same box every frame. Cheap, effectively disables host culling when large.
    Fixed {
        /// Box center.
        center: [f32; 3],
        /// Box half-extents.
        half_extents: [f32; 3],
    },
    /// Recomputed each draw from the staged transforms' translations.
    ///
    /// `padding` must cover the mesh's extent around each instance origin.
    FromInstances {
        /// Distance added on every side.
        padding: f32,
    },
}

impl BoundsMode {
    /// The conservative default: origin-centered, 1,000,000 units wide.
    pub const CONSERVATIVE: Self = Self::Fixed {
        center: [0.0; 3],
        half_extents: [CONSERVATIVE_HALF_EXTENT; 3],
    };

    /// Resolves the bound for the given staged transforms.
    ///
    /// `FromInstances` with no transforms degrades to the conservative box.
    #[must_use]
    pub fn resolve(&self, transforms: &[InstanceTransform]) -> Aabb {
        match *self {
            Self::Fixed { center, half_extents } => {
                Aabb::from_center_half_extents(center, half_extents)
            }
            Self::FromInstances { padding } => Aabb::enclosing_translations(transforms, padding)
                .unwrap_or_else(|| Self::CONSERVATIVE.resolve(&[])),
        }
    }

    /// Returns true if every parameter is finite and non-negative where required.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match *self {
            Self::Fixed { center, half_extents } => {
                center.iter().all(|c| c.is_finite())
                    && half_extents.iter().all(|h| h.is_finite() && *h >= 0.0)
            }
            Self::FromInstances { padding } => padding.is_finite() && padding >= 0.0,
        }
    }
}

impl Default for BoundsMode {
    fn default() -> Self {
        Self::CONSERVATIVE
    }
}
