//! # HORDE Core
//!
//! Host-side staging for indirect skinned-instance batches:
//! - Per-instance data types with a fixed GPU layout
//! - A fixed-capacity store refilled by the producer every frame
//! - The bounding-volume policy handed to the draw call
//!
//! ## Rules
//!
//! 1. **No GPU types here** - rendering lives in `horde_rendering`
//! 2. **No allocation after construction** - the store never grows
//! 3. **Overflow is never silent** - `append` rejects with
//!    `CapacityExceeded`, `append_batch` returns how many pairs fit
//!
//! ## Example
//!
//! ```rust
//! use horde_core::{AnimationSample, InstanceStore, InstanceTransform};
//!
//! let mut store = InstanceStore::with_capacity(4)?;
//! store.append(InstanceTransform::IDENTITY, AnimationSample::new(0.0, 0.25, 1.0))?;
//! assert_eq!(store.len(), 1);
//! # Ok::<(), horde_core::StoreError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bounds;
pub mod error;
pub mod instance;
pub mod store;

pub use bounds::{Aabb, BoundsMode, CONSERVATIVE_HALF_EXTENT};
pub use error::{StoreError, StoreResult};
pub use instance::{AnimationSample, InstanceTransform};
pub use store::{InstanceStore, DEFAULT_CAPACITY};
