//! # Component-Type Bit Mask
//!
//! A fixed 64-bit set indexed by [`ComponentTypeId`]. Used both as the
//! per-entity "which components are attached" mask and as the sync filter.
//!
//! The width is one word because the entity index stores a mask per slot
//! and copies that column in full on every sync: at 100k slots each extra
//! word is another 800 KB per sync. Registration rejects ids that do not
//! fit; the set operations ignore them.

use bytemuck::{Pod, Zeroable};

use super::component::{Component, ComponentTypeId, SharedComponent};

const WORDS: usize = 1;

/// Fixed-capacity set of component type ids.
///
/// `Copy` and `Pod`, so index arrays of masks sync with a single bulk copy.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct BitMask([u64; WORDS]);

impl BitMask {
    /// Number of distinct ids a mask can hold.
    pub const CAPACITY: usize = WORDS * 64;

    /// The empty mask.
    pub const EMPTY: Self = Self([0; WORDS]);

    /// Creates an empty mask.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Creates a mask with every id set.
    #[inline]
    #[must_use]
    pub const fn all() -> Self {
        Self([u64::MAX; WORDS])
    }

    /// Builder form of [`set`](Self::set).
    #[inline]
    #[must_use]
    pub const fn with(mut self, id: ComponentTypeId) -> Self {
        let word = (id / 64) as usize;
        if word < WORDS {
            self.0[word] |= 1 << (id % 64);
        }
        self
    }

    /// Builder form of [`set`](Self::set) for a value component.
    #[inline]
    #[must_use]
    pub const fn with_component<C: Component>(self) -> Self {
        self.with(C::ID)
    }

    /// Builder form of [`set`](Self::set) for a shared component.
    #[inline]
    #[must_use]
    pub const fn with_shared<S: SharedComponent>(self) -> Self {
        self.with(S::ID)
    }

    /// Adds an id to the set. Ids at or past [`CAPACITY`](Self::CAPACITY)
    /// are ignored.
    #[inline]
    pub fn set(&mut self, id: ComponentTypeId) {
        if let Some(word) = self.0.get_mut(usize::from(id / 64)) {
            *word |= 1 << (id % 64);
        }
    }

    /// Removes an id from the set.
    #[inline]
    pub fn unset(&mut self, id: ComponentTypeId) {
        if let Some(word) = self.0.get_mut(usize::from(id / 64)) {
            *word &= !(1 << (id % 64));
        }
    }

    /// Checks whether an id is in the set. Always `false` past
    /// [`CAPACITY`](Self::CAPACITY).
    #[inline]
    #[must_use]
    pub const fn is_set(&self, id: ComponentTypeId) -> bool {
        let word = (id / 64) as usize;
        word < WORDS && (self.0[word] >> (id % 64)) & 1 == 1
    }

    /// Number of ids in the set.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Checks if no id is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// Set union.
    #[inline]
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for (word, other) in out.0.iter_mut().zip(other.0) {
            *word |= other;
        }
        out
    }

    /// Iterates over the set ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.0.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                // word_idx < WORDS and bit < 64, so this fits in a u8
                #[allow(clippy::cast_possible_truncation)]
                let id = (word_idx * 64 + bit) as ComponentTypeId;
                Some(id)
            })
        })
    }
}

impl FromIterator<ComponentTypeId> for BitMask {
    fn from_iter<I: IntoIterator<Item = ComponentTypeId>>(iter: I) -> Self {
        let mut mask = Self::new();
        for id in iter {
            mask.set(id);
        }
        mask
    }
}

impl std::fmt::Debug for BitMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
