//! # Store Error Types
//!
//! All errors that can occur while staging instance data.

use thiserror::Error;

/// Errors that can occur in the instance store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store is full; the append was rejected and the store is unchanged.
    #[error("instance store full: capacity {capacity}")]
    CapacityExceeded {
        /// Preallocated capacity of the store.
        capacity: usize,
    },

    /// The host could not reserve memory for the requested capacity.
    #[error("cannot allocate instance store of capacity {capacity}")]
    AllocationFailed {
        /// Requested capacity.
        capacity: usize,
    },

    /// A store must hold at least one instance.
    #[error("instance store capacity must be greater than zero")]
    ZeroCapacity,

    /// Bulk append was given transform and sample slices of different lengths.
    #[error("misaligned batch: {transforms} transforms, {samples} samples")]
    MisalignedBatch {
        /// Number of transforms supplied.
        transforms: usize,
        /// Number of samples supplied.
        samples: usize,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
