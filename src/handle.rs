// src/handle.rs
//! Typed backend handles.
//!
//! The backend hands out `u32` ids and uses `0xFFFF_FFFF` for "nothing". Each
//! resource kind gets its own handle type so a shader id can never be passed
//! where an instance id is expected, and emptiness is checked explicitly.

use std::fmt;
use std::marker::PhantomData;

/// Raw id value the backend uses for "no resource".
pub const NULL_RAW: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderTag {}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetTag {}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceTag {}

/// A backend id that is either bound to a live resource or empty.
pub struct Handle<K> {
    raw: u32,
    _kind: PhantomData<K>,
}

pub type ShaderHandle = Handle<ShaderTag>;
pub type AssetHandle = Handle<AssetTag>;
pub type InstanceHandle = Handle<InstanceTag>;

impl<K> Handle<K> {
    pub const EMPTY: Self = Self {
        raw: NULL_RAW,
        _kind: PhantomData,
    };

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.raw
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.raw != NULL_RAW
    }

    /// `Some(self)` when bound.
    #[inline]
    pub fn get(self) -> Option<Self> {
        self.is_valid().then_some(self)
    }

    /// Returns the current value and leaves the handle empty.
    #[inline]
    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Self::EMPTY)
    }
}

// Manual impls: the derives would put bounds on `K`.
impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K> Eq for Handle<K> {}

impl<K> std::hash::Hash for Handle<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K> Default for Handle<K> {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl<K> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Handle({})", self.raw)
        } else {
            f.write_str("Handle(empty)")
        }
    }
}
