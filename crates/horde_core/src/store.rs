//! Host-side instance staging.
//!
//! Pre-allocates both per-instance sequences once so that refilling the
//! store every frame never touches the allocator.
//!
//! ## Frame protocol
//!
//! ```text
//! producer: clear() → append()* ──┐
//!                                 ▼
//! consumer:                  read prefix [0, len) → upload → draw
//! ```
//!
//! Writer and reader phases never overlap: the producer needs `&mut`
//! access, the consumer only `&`.

use crate::error::{StoreError, StoreResult};
use crate::instance::{AnimationSample, InstanceTransform};

/// Default number of instances a store can hold.
pub const DEFAULT_CAPACITY: usize = 32 * 1024;

/// Two index-aligned sequences of per-instance data with fixed capacity.
///
/// Entry `i` of [`transforms`](Self::transforms) and entry `i` of
/// [`samples`](Self::samples) always describe the same instance: the only
/// mutators append or clear both sequences together.
#[derive(Debug, Clone)]
pub struct InstanceStore {
    /// Object-to-world matrices.
    transforms: Vec<InstanceTransform>,
    /// Animation atlas coordinates.
    samples: Vec<AnimationSample>,
    /// Hard limit. Never grows.
    capacity: usize,
}

impl InstanceStore {
    /// Creates a store with [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::allocate(DEFAULT_CAPACITY)
    }

    /// Creates a store holding at most `capacity` instances.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ZeroCapacity`] if `capacity` is zero and
    /// [`StoreError::AllocationFailed`] if the memory cannot be reserved.
    pub fn with_capacity(capacity: usize) -> StoreResult<Self> {
        if capacity == 0 {
            return Err(StoreError::ZeroCapacity);
        }

        let mut transforms: Vec<InstanceTransform> = Vec::new();
        let mut samples: Vec<AnimationSample> = Vec::new();
        transforms
            .try_reserve_exact(capacity)
            .and_then(|()| samples.try_reserve_exact(capacity))
            .map_err(|_| StoreError::AllocationFailed { capacity })?;

        Ok(Self {
            transforms,
            samples,
            capacity,
        })
    }

    fn allocate(capacity: usize) -> Self {
        Self {
            transforms: Vec::with_capacity(capacity),
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends one aligned (transform, sample) pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CapacityExceeded`] when the store is full.
    /// The store is left unchanged.
    #[inline]
    pub fn append(
        &mut self,
        transform: InstanceTransform,
        sample: AnimationSample,
    ) -> StoreResult<()> {
        if self.transforms.len() >= self.capacity {
            return Err(StoreError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        self.transforms.push(transform);
        self.samples.push(sample);
        Ok(())
    }

    /// Appends as many aligned pairs as fit.
    ///
    /// Returns the number of pairs actually added, which is less than the
    /// input length when the store fills up.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MisalignedBatch`] if the slices differ in length.
    pub fn append_batch(
        &mut self,
        transforms: &[InstanceTransform],
        samples: &[AnimationSample],
    ) -> StoreResult<usize> {
        if transforms.len() != samples.len() {
            return Err(StoreError::MisalignedBatch {
                transforms: transforms.len(),
                samples: samples.len(),
            });
        }

        let to_add = transforms.len().min(self.remaining());
        if to_add < transforms.len() {
            tracing::warn!(
                "Instance store full: dropped {} of {} instances (capacity {})",
                transforms.len() - to_add,
                transforms.len(),
                self.capacity
            );
        }

        self.transforms.extend_from_slice(&transforms[..to_add]);
        self.samples.extend_from_slice(&samples[..to_add]);
        Ok(to_add)
    }

    /// Resets the length to zero. Capacity is kept.
    #[inline]
    pub fn clear(&mut self) {
        self.transforms.clear();
        self.samples.clear();
    }

    /// Current instance count.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Returns true if no instances are staged.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Maximum instance count.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of appends that can still succeed this frame.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.transforms.len()
    }

    /// Staged transforms, `len()` entries.
    #[must_use]
    pub fn transforms(&self) -> &[InstanceTransform] {
        &self.transforms
    }

    /// Staged samples, `len()` entries.
    #[must_use]
    pub fn samples(&self) -> &[AnimationSample] {
        &self.samples
    }

    /// Staged transforms as bytes for GPU upload.
    #[must_use]
    pub fn transform_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.transforms)
    }

    /// Staged samples as bytes for GPU upload.
    #[must_use]
    pub fn sample_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Iterates over aligned pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&InstanceTransform, &AnimationSample)> {
        self.transforms.iter().zip(self.samples.iter())
    }
}

impl Default for InstanceStore {
    fn default() -> Self {
        Self::new()
    }
}
