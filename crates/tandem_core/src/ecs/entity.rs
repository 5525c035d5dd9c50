//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - A slot index into the entity index and component chunks
//! - A generation counter for safe reuse
//!
//! The [`EntityIndex`] is the sparse per-slot metadata: alive flag,
//! generation and component mask, stored as parallel arrays. Slots are
//! never compacted, so handles stay valid across unrelated insertions.

use super::component::ComponentTypeId;
use super::mask::BitMask;
use crate::error::{StoreError, StoreResult};

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Slot index
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity ID from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the slot index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    /// Returns the packed 64-bit representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

/// Generation at which a slot is retired instead of reused.
///
/// Wrapping back to 0 would revive handles from the slot's first life.
const RETIRED_GENERATION: u32 = u32::MAX;

/// Per-slot entity metadata, stored as parallel arrays.
///
/// A slot is reused only after its generation has been bumped by
/// [`destroy`](Self::destroy), so a handle from before the destroy is
/// rejected everywhere. A slot whose generation is exhausted is never
/// reused.
///
/// Alive flags are packed 64 to a word; with the one-word component masks
/// a full index sync moves 12 bytes and a bit per slot.
#[derive(Clone, Debug)]
pub struct EntityIndex {
    /// Bit `s % 64` of word `s / 64` is set while slot `s` is alive.
    alive: Vec<u64>,
    generations: Vec<u32>,
    masks: Vec<BitMask>,
    /// Free slots, popped from the back.
    free_slots: Vec<u32>,
    alive_count: usize,
    max_entities: u32,
}

impl EntityIndex {
    /// Creates an empty index without reserving any slots.
    #[must_use]
    pub const fn new(max_entities: u32) -> Self {
        Self {
            alive: Vec::new(),
            generations: Vec::new(),
            masks: Vec::new(),
            free_slots: Vec::new(),
            alive_count: 0,
            max_entities,
        }
    }

    /// Creates an index with room for `initial_slots` before growing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AllocationFailure`] if the reservation fails.
    pub fn with_capacity(initial_slots: usize, max_entities: u32) -> StoreResult<Self> {
        let mut index = Self::new(max_entities);
        index.reserve_slots(initial_slots)?;
        Ok(index)
    }

    /// Number of slots ever created (alive, free or retired).
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.generations.len()
    }

    /// Number of currently alive entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Allocates a slot for a new entity.
    ///
    /// Reuses a freed slot when one is available, otherwise appends.
    ///
    /// # Errors
    ///
    /// [`StoreError::CapacityExceeded`] when `max_entities` slots exist and none
    /// are free; [`StoreError::AllocationFailure`] if growth fails.
    pub fn create(&mut self) -> StoreResult<EntityId> {
        let slot = if let Some(slot) = self.free_slots.pop() {
            slot
        } else {
            let next = self.generations.len();
            if next >= self.max_entities as usize {
                return Err(StoreError::CapacityExceeded {
                    max: self.max_entities,
                });
            }
            // next < max_entities <= u32::MAX - 1
            #[allow(clippy::cast_possible_truncation)]
            let slot = next as u32;
            self.reserve_slots(1)?;
            if next % 64 == 0 {
                self.alive.push(0);
            }
            self.generations.push(0);
            self.masks.push(BitMask::EMPTY);
            slot
        };

        let idx = slot as usize;
        self.alive[idx / 64] |= 1 << (idx % 64);
        self.masks[idx] = BitMask::EMPTY;
        self.alive_count += 1;

        Ok(EntityId::new(slot, self.generations[idx]))
    }

    /// Releases an entity's slot.
    ///
    /// Bumps the slot generation and returns the component mask the entity
    /// had, so the caller can clear those components. The caller must do so
    /// before anything reads the slot again. A slot whose generation reaches
    /// the last value is retired: it stays dead and is never handed out again.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`] for null, out-of-range or stale handles.
    pub fn destroy(&mut self, id: EntityId) -> StoreResult<BitMask> {
        let idx = self.validate(id)?;

        self.alive[idx / 64] &= !(1 << (idx % 64));
        let generation = self.generations[idx].saturating_add(1);
        self.generations[idx] = generation;
        let mask = std::mem::take(&mut self.masks[idx]);
        self.alive_count -= 1;

        if generation < RETIRED_GENERATION {
            self.free_slots.push(id.index());
        }

        Ok(mask)
    }

    /// Checks if a handle refers to a live entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.validate(id).is_ok()
    }

    /// Returns the slot index of a live handle.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`] for null, out-of-range or stale handles.
    #[inline]
    pub fn validate(&self, id: EntityId) -> StoreResult<usize> {
        if id.is_null() {
            return Err(StoreError::InvalidHandle(id));
        }
        let idx = id.index() as usize;
        match self.generations.get(idx) {
            Some(&generation) if generation == id.generation() && self.alive_bit(idx) => Ok(idx),
            _ => Err(StoreError::InvalidHandle(id)),
        }
    }

    /// Returns the component mask of a live entity.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`] for null, out-of-range or stale handles.
    #[inline]
    pub fn component_mask(&self, id: EntityId) -> StoreResult<BitMask> {
        let idx = self.validate(id)?;
        Ok(self.masks[idx])
    }

    /// Marks a component as attached to a live entity. Returns the previous bit.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`] for null, out-of-range or stale handles.
    pub fn set_component_bit(&mut self, id: EntityId, component: ComponentTypeId) -> StoreResult<bool> {
        let idx = self.validate(id)?;
        let was_set = self.masks[idx].is_set(component);
        self.masks[idx].set(component);
        Ok(was_set)
    }

    /// Marks a component as detached from a live entity. Returns the previous bit.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`] for null, out-of-range or stale handles.
    pub fn clear_component_bit(&mut self, id: EntityId, component: ComponentTypeId) -> StoreResult<bool> {
        let idx = self.validate(id)?;
        let was_set = self.masks[idx].is_set(component);
        self.masks[idx].unset(component);
        Ok(was_set)
    }

    /// Iterates over handles of all alive entities, in slot order.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.generations
            .iter()
            .enumerate()
            .filter(|&(idx, _)| self.alive_bit(idx))
            .map(|(idx, &generation)| {
                // slot count never exceeds max_entities, a u32
                #[allow(clippy::cast_possible_truncation)]
                let slot = idx as u32;
                EntityId::new(slot, generation)
            })
    }

    /// Overwrites this index with the full contents of `source`.
    ///
    /// Always full, whatever component filter the caller applies to tables:
    /// entity existence and identity must agree in every replica. Bulk slice
    /// copies only, linear in slot count.
    ///
    /// # Errors
    ///
    /// [`StoreError::AllocationFailure`] if this index cannot grow to the
    /// source's slot count.
    pub fn sync_from(&mut self, source: &Self) -> StoreResult<()> {
        copy_column(&mut self.alive, &source.alive, "entity alive flags")?;
        copy_column(&mut self.generations, &source.generations, "entity generations")?;
        copy_column(&mut self.masks, &source.masks, "entity component masks")?;
        copy_column(&mut self.free_slots, &source.free_slots, "entity free list")?;
        self.alive_count = source.alive_count;
        self.max_entities = source.max_entities;
        Ok(())
    }

    #[inline]
    fn alive_bit(&self, idx: usize) -> bool {
        self.alive
            .get(idx / 64)
            .is_some_and(|word| (word >> (idx % 64)) & 1 == 1)
    }

    /// Reserves room for `additional` more slots in every column.
    ///
    /// The free list is reserved too, so `destroy` never allocates.
    fn reserve_slots(&mut self, additional: usize) -> StoreResult<()> {
        let total = self.generations.len() + additional;
        let words = total.div_ceil(64).saturating_sub(self.alive.len());
        self.alive
            .try_reserve(words)
            .map_err(|_| StoreError::allocation("entity alive flags", total))?;
        self.generations
            .try_reserve(additional)
            .map_err(|_| StoreError::allocation("entity generations", total))?;
        self.masks
            .try_reserve(additional)
            .map_err(|_| StoreError::allocation("entity component masks", total))?;
        let free_needed = total.saturating_sub(self.free_slots.len());
        self.free_slots
            .try_reserve(free_needed)
            .map_err(|_| StoreError::allocation("entity free list", total))?;
        Ok(())
    }
}

/// Makes `dst` an exact copy of `src`, growing with a fallible reservation.
fn copy_column<T: Copy>(dst: &mut Vec<T>, src: &[T], what: &'static str) -> StoreResult<()> {
    if src.len() > dst.capacity() {
        dst.try_reserve_exact(src.len() - dst.len())
            .map_err(|_| StoreError::allocation(what, src.len()))?;
    }
    dst.clear();
    dst.extend_from_slice(src);
    Ok(())
}
