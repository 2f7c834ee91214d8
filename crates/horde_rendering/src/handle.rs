//! # Resource Handles
//!
//! Engine-owned GPU objects are referred to by generational handles:
//! - Lower 32 bits: slot index in the owning backend
//! - Upper 32 bits: generation counter for detecting stale references
//!
//! A handle whose resource was released never resolves again, even after
//! its slot is reused. This is what lets a batch ask "is this still live?"
//! before every draw instead of assuming engine objects outlive it.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker for buffer handles.
#[derive(Debug)]
pub enum BufferTag {}
/// Marker for mesh handles.
#[derive(Debug)]
pub enum MeshTag {}
/// Marker for material handles.
#[derive(Debug)]
pub enum MaterialTag {}
/// Marker for texture handles.
#[derive(Debug)]
pub enum TextureTag {}

/// Handle to a GPU buffer.
pub type BufferHandle = Handle<BufferTag>;
/// Handle to a mesh.
pub type MeshHandle = Handle<MeshTag>;
/// Handle to a material (template or instance).
pub type MaterialHandle = Handle<MaterialTag>;
/// Handle to a texture.
pub type TextureHandle = Handle<TextureTag>;

/// Typed generational handle.
#[repr(transparent)]
pub struct Handle<T> {
    raw: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Creates a handle from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            raw: ((generation as u64) << 32) | (index as u64),
            _marker: PhantomData,
        }
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.raw as u32
    }

    /// Returns the generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.raw >> 32) as u32
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index(), self.generation())
    }
}

struct Slot<V> {
    generation: u32,
    value: Option<V>,
}

/// Generational slot storage used by backends to resolve handles.
///
/// Not thread-safe; backends wrap it in a mutex.
pub struct ResourceSlots<T, V> {
    slots: Vec<Slot<V>>,
    free_list: Vec<u32>,
    live: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T, V> ResourceSlots<T, V> {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
            _marker: PhantomData,
        }
    }

    /// Stores a value and returns its handle.
    pub fn insert(&mut self, value: V) -> Handle<T> {
        self.live += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::new(index, 0)
    }

    /// Removes and returns the value. `None` if the handle is stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<V> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }

        let value = slot.value.take()?;
        // Invalidate outstanding copies of this handle.
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index());
        self.live -= 1;
        Some(value)
    }

    /// Resolves a handle.
    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> Option<&V> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Resolves a handle mutably.
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut V> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Returns true if the handle resolves.
    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live values.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl<T, V> Default for ResourceSlots<T, V> {
    fn default() -> Self {
        Self::new()
    }
}
