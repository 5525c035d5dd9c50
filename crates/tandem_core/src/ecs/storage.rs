//! # Value Component Storage (Tier 1)
//!
//! Chunked, contiguous storage for POD components.
//!
//! Each chunk is one flat byte block of `chunk_capacity * size_of::<C>()`
//! bytes. The table itself is type-erased (it only knows the element size
//! and the `TypeId` it was registered with), so the repository can keep
//! every value table in one map and sync them with a plain byte copy.
//!
//! - Access is O(1) via entity slot
//! - Sync copies whole chunks, never partial rows
//! - Chunks are allocated on first write and released when emptied
//! - Each slot is either present or absent; absent slots read as `None`

use std::any::{type_name, TypeId};

use super::chunk::{ChunkLayout, ChunkList, ChunkPayload, ChunkVersion};
use super::component::{Component, ComponentTypeId};
use crate::error::{StoreError, StoreResult};
use crate::sync::TableSyncStats;

/// One allocated value chunk: raw component bytes.
pub(crate) struct ByteChunk(Box<[u8]>);

impl ChunkPayload for ByteChunk {
    const WHAT: &'static str = "value chunk";

    fn allocate(layout: ChunkLayout) -> StoreResult<Self> {
        let len = layout.slots_per_chunk * layout.element_size;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| StoreError::allocation(Self::WHAT, len))?;
        bytes.resize(len, 0);
        Ok(Self(bytes.into_boxed_slice()))
    }

    fn duplicate(source: &Self) -> StoreResult<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(source.0.len())
            .map_err(|_| StoreError::allocation(Self::WHAT, source.0.len()))?;
        bytes.extend_from_slice(&source.0);
        Ok(Self(bytes.into_boxed_slice()))
    }

    #[inline]
    fn copy_from(&mut self, source: &Self) {
        self.0.copy_from_slice(&source.0);
    }

    #[inline]
    fn copy_len(&self) -> usize {
        self.0.len()
    }
}

/// Chunked storage for a single value component type.
///
/// # Example
///
/// ```rust,ignore
/// let mut table = ValueTable::new::<Position>(256)?;
/// table.insert(0, &Position::new(1.0, 2.0, 3.0))?;
/// assert_eq!(table.get::<Position>(0)?, Some(Position::new(1.0, 2.0, 3.0)));
/// ```
pub struct ValueTable {
    type_id: TypeId,
    type_name: &'static str,
    chunks: ChunkList<ByteChunk>,
}

impl ValueTable {
    /// Creates an empty table for `C` with `chunk_capacity` slots per chunk.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidConfig`] unless `chunk_capacity` is a non-zero
    /// power of two.
    pub fn new<C: Component>(chunk_capacity: usize) -> StoreResult<Self> {
        let layout = ChunkLayout::new(C::ID, chunk_capacity, std::mem::size_of::<C>())?;
        Ok(Self {
            type_id: TypeId::of::<C>(),
            type_name: type_name::<C>(),
            chunks: ChunkList::new(layout),
        })
    }

    /// Empty table registered for the same type, with the same layout.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self {
            type_id: self.type_id,
            type_name: self.type_name,
            chunks: ChunkList::new(self.chunks.layout()),
        }
    }

    /// Component type id of this table.
    #[inline]
    #[must_use]
    pub fn component(&self) -> ComponentTypeId {
        self.chunks.layout().component
    }

    /// Rust type name the table was registered with.
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Bytes per component.
    #[inline]
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.chunks.layout().element_size
    }

    /// Slots per chunk.
    #[inline]
    #[must_use]
    pub fn chunk_capacity(&self) -> usize {
        self.chunks.layout().slots_per_chunk
    }

    /// Number of chunk entries (allocated or not).
    #[inline]
    #[must_use]
    pub fn total_chunks(&self) -> usize {
        self.chunks.total_chunks()
    }

    /// Version of chunk `i` (0 past the end).
    #[inline]
    #[must_use]
    pub fn chunk_version(&self, i: usize) -> ChunkVersion {
        self.chunks.chunk_version(i)
    }

    /// Whether chunk `i` has backing storage.
    #[inline]
    #[must_use]
    pub fn is_chunk_allocated(&self, i: usize) -> bool {
        self.chunks.is_chunk_allocated(i)
    }

    /// Number of components present in chunk `i`.
    #[inline]
    #[must_use]
    pub fn chunk_occupancy(&self, i: usize) -> u32 {
        self.chunks.occupied(i)
    }

    /// Whether a component is present at `slot`.
    #[inline]
    #[must_use]
    pub fn contains(&self, slot: usize) -> bool {
        self.chunks.is_present(slot)
    }

    /// Creates backing storage for chunk `i` if it has none.
    ///
    /// # Errors
    ///
    /// [`StoreError::AllocationFailure`] if the chunk cannot be allocated.
    pub fn ensure_chunk_allocated(&mut self, i: usize) -> StoreResult<()> {
        self.chunks.ensure_chunk_allocated(i)
    }

    /// Releases chunk `i` and bumps its version.
    ///
    /// Callers are responsible for detaching the component from the
    /// entities of that chunk.
    pub fn clear_chunk(&mut self, i: usize) {
        self.chunks.clear_chunk(i);
    }

    /// Stores the component at `slot`, replacing any present one.
    ///
    /// Returns `true` if the slot was empty before.
    ///
    /// # Errors
    ///
    /// [`StoreError::ComponentTypeMismatch`] if `C` is not this table's type,
    /// [`StoreError::AllocationFailure`] if the chunk cannot be allocated.
    pub fn insert<C: Component>(&mut self, slot: usize, value: &C) -> StoreResult<bool> {
        self.check_type::<C>()?;
        let size = self.element_size();
        self.chunks.put_with(slot, |chunk, offset| {
            chunk.0[offset * size..(offset + 1) * size].copy_from_slice(bytemuck::bytes_of(value));
            Ok(())
        })
    }

    /// Zeroes and detaches the component at `slot`.
    ///
    /// Returns `false` if nothing was present there.
    ///
    /// # Errors
    ///
    /// Never fails for value tables; the `Result` matches the shared tier.
    pub fn remove(&mut self, slot: usize) -> StoreResult<bool> {
        let size = self.element_size();
        self.chunks.remove_with(slot, |chunk, offset| {
            chunk.0[offset * size..(offset + 1) * size].fill(0);
            Ok(())
        })
    }

    /// Reads the component at `slot`, or `None` if nothing is present.
    ///
    /// # Errors
    ///
    /// [`StoreError::ComponentTypeMismatch`] if `C` is not this table's type.
    pub fn get<C: Component>(&self, slot: usize) -> StoreResult<Option<C>> {
        self.check_type::<C>()?;
        let size = self.element_size();
        Ok(self.chunks.read(slot).map(|(chunk, offset)| {
            bytemuck::pod_read_unaligned(&chunk.0[offset * size..(offset + 1) * size])
        }))
    }

    /// Copies every chunk whose version differs from `source`, byte for byte.
    ///
    /// # Errors
    ///
    /// [`StoreError::ComponentTypeMismatch`] if the tables hold different
    /// types, [`StoreError::ChunkLayoutMismatch`] if chunk capacities differ,
    /// [`StoreError::AllocationFailure`] if a chunk cannot be allocated.
    pub fn sync_dirty_chunks(&mut self, source: &Self) -> StoreResult<TableSyncStats> {
        if self.type_id != source.type_id {
            return Err(StoreError::ComponentTypeMismatch {
                component: self.component(),
                expected: self.type_name,
                found: source.type_name,
            });
        }
        self.chunks.sync_dirty_from(&source.chunks)
    }

    /// Checks that `C` is the type this table was registered with.
    ///
    /// # Errors
    ///
    /// [`StoreError::ComponentTypeMismatch`] otherwise.
    #[inline]
    pub fn check_type<C: Component>(&self) -> StoreResult<()> {
        if self.type_id == TypeId::of::<C>() {
            Ok(())
        } else {
            Err(StoreError::ComponentTypeMismatch {
                component: self.component(),
                expected: self.type_name,
                found: type_name::<C>(),
            })
        }
    }
}
