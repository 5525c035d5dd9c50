//! # Shared Component Storage (Tier 2)
//!
//! Chunked array-of-references storage for immutable component objects.
//!
//! Same chunk scan as the value tables, but a chunk's block of reference
//! slots is itself behind an `Arc`. Syncing a dirty chunk clones that one
//! `Arc`, so the replica shares the source's block and every object in it
//! without touching a single per-object reference count.
//!
//! Writes are copy-on-write. The first write to a block that a replica
//! still shares clones it; the block it replaces is kept on the writer's
//! side until the next such clone, so the replica dropping its handle on
//! the next sync is one count decrement rather than a per-slot teardown.
//!
//! Sharing is only sound because nothing here hands out `&mut`: values go
//! in as `Arc<S>` and come out as `Arc<S>`.

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use super::chunk::{ChunkLayout, ChunkList, ChunkPayload, ChunkVersion};
use super::component::{ComponentTypeId, SharedComponent};
use crate::error::{StoreError, StoreResult};
use crate::sync::TableSyncStats;

/// Type-erased shared value.
type SharedRef = Arc<dyn Any + Send + Sync>;

/// Reference slots of one chunk.
type RefBlock = Vec<Option<SharedRef>>;

/// One allocated shared chunk.
pub(crate) struct RefChunk {
    refs: Arc<RefBlock>,
    /// Block displaced by the last copy-on-write, kept until the next one.
    retired: Option<Arc<RefBlock>>,
}

impl RefChunk {
    /// Mutable view of the slots, cloning the block first if it is shared.
    fn slots_mut(&mut self) -> StoreResult<&mut RefBlock> {
        if Arc::get_mut(&mut self.refs).is_none() {
            let mut fresh = Vec::new();
            fresh
                .try_reserve_exact(self.refs.len())
                .map_err(|_| StoreError::allocation(Self::WHAT, self.refs.len()))?;
            fresh.extend_from_slice(&self.refs);
            self.retired = Some(std::mem::replace(&mut self.refs, Arc::new(fresh)));
        }
        // Unique at this point, so make_mut never clones
        Ok(Arc::make_mut(&mut self.refs))
    }
}

impl ChunkPayload for RefChunk {
    const WHAT: &'static str = "shared chunk";

    fn allocate(layout: ChunkLayout) -> StoreResult<Self> {
        let len = layout.slots_per_chunk;
        let mut refs = Vec::new();
        refs.try_reserve_exact(len)
            .map_err(|_| StoreError::allocation(Self::WHAT, len))?;
        refs.resize_with(len, || None);
        Ok(Self {
            refs: Arc::new(refs),
            retired: None,
        })
    }

    fn duplicate(source: &Self) -> StoreResult<Self> {
        Ok(Self {
            refs: Arc::clone(&source.refs),
            retired: None,
        })
    }

    #[inline]
    fn copy_from(&mut self, source: &Self) {
        self.refs = Arc::clone(&source.refs);
    }

    #[inline]
    fn copy_len(&self) -> usize {
        0
    }
}

/// Chunked storage for a single shared component type.
///
/// # Example
///
/// ```rust,ignore
/// let mut table = SharedTable::new::<Label>(256)?;
/// table.insert(0, Arc::new(Label("scout".into())))?;
/// let label: Arc<Label> = table.get::<Label>(0)?.unwrap();
/// ```
pub struct SharedTable {
    type_id: TypeId,
    type_name: &'static str,
    chunks: ChunkList<RefChunk>,
}

impl SharedTable {
    /// Creates an empty table for `S` with `chunk_capacity` slots per chunk.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidConfig`] unless `chunk_capacity` is a non-zero
    /// power of two.
    pub fn new<S: SharedComponent>(chunk_capacity: usize) -> StoreResult<Self> {
        Ok(Self {
            type_id: TypeId::of::<S>(),
            type_name: type_name::<S>(),
            chunks: ChunkList::new(ChunkLayout::new(S::ID, chunk_capacity, 0)?),
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

    /// Number of references present in chunk `i`.
    #[inline]
    #[must_use]
    pub fn chunk_occupancy(&self, i: usize) -> u32 {
        self.chunks.occupied(i)
    }

    /// Whether a reference is present at `slot`.
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

    /// Releases chunk `i` (dropping its references) and bumps its version.
    pub fn clear_chunk(&mut self, i: usize) {
        self.chunks.clear_chunk(i);
    }

    /// Stores a reference at `slot`, replacing any present one.
    ///
    /// A replaced object is not touched; holders of it keep seeing it
    /// unchanged. Returns `true` if the slot was empty before.
    ///
    /// # Errors
    ///
    /// [`StoreError::ComponentTypeMismatch`] if `S` is not this table's type,
    /// [`StoreError::AllocationFailure`] if the chunk cannot be allocated or
    /// its shared block cannot be cloned.
    pub fn insert<S: SharedComponent>(&mut self, slot: usize, value: Arc<S>) -> StoreResult<bool> {
        self.check_type::<S>()?;
        let erased: SharedRef = value;
        self.chunks.put_with(slot, move |chunk, offset| {
            chunk.slots_mut()?[offset] = Some(erased);
            Ok(())
        })
    }

    /// Drops this table's reference at `slot`.
    ///
    /// Returns `false` if nothing was present there.
    ///
    /// # Errors
    ///
    /// [`StoreError::AllocationFailure`] if the chunk's shared block cannot
    /// be cloned.
    pub fn remove(&mut self, slot: usize) -> StoreResult<bool> {
        self.chunks.remove_with(slot, |chunk, offset| {
            chunk.slots_mut()?[offset] = None;
            Ok(())
        })
    }

    /// Returns the shared object at `slot`, if any.
    ///
    /// # Errors
    ///
    /// [`StoreError::ComponentTypeMismatch`] if `S` is not this table's type.
    pub fn get<S: SharedComponent>(&self, slot: usize) -> StoreResult<Option<Arc<S>>> {
        self.check_type::<S>()?;
        Ok(self
            .chunks
            .read(slot)
            .and_then(|(chunk, offset)| chunk.refs[offset].clone())
            .and_then(|erased| erased.downcast::<S>().ok()))
    }

    /// Shares every chunk whose version differs from `source`.
    ///
    /// One `Arc` clone per dirty chunk; `bytes_copied` stays zero.
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

    /// Checks that `S` is the type this table was registered with.
    ///
    /// # Errors
    ///
    /// [`StoreError::ComponentTypeMismatch`] otherwise.
    #[inline]
    pub fn check_type<S: SharedComponent>(&self) -> StoreResult<()> {
        if self.type_id == TypeId::of::<S>() {
            Ok(())
        } else {
            Err(StoreError::ComponentTypeMismatch {
                component: self.component(),
                expected: self.type_name,
                found: type_name::<S>(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Label(String);

    impl SharedComponent for Label {
        const ID: ComponentTypeId = 10;
    }

    #[derive(Debug)]
    struct Mesh;

    impl SharedComponent for Mesh {
        const ID: ComponentTypeId = 11;
    }

    fn table(capacity: usize) -> SharedTable {
        SharedTable::new::<Label>(capacity).unwrap()
    }

    fn label(text: &str) -> Arc<Label> {
        Arc::new(Label(text.into()))
    }

    #[test]
    fn test_insert_get_keeps_identity() {
        let mut table = table(16);
        let label = label("scout");
        assert!(table.insert(3, Arc::clone(&label)).unwrap());

        let got = table.get::<Label>(3).unwrap().unwrap();
        assert!(Arc::ptr_eq(&got, &label));
        assert!(table.get::<Label>(4).unwrap().is_none());
        assert!(table.get::<Label>(100).unwrap().is_none());
    }

    #[test]
    fn test_unusable_capacity_rejected() {
        assert!(matches!(
            SharedTable::new::<Label>(0),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut table = table(16);
        assert!(matches!(
            table.insert(0, Arc::new(Mesh)),
            Err(StoreError::ComponentTypeMismatch { component: 10, .. })
        ));
    }

    #[test]
    fn test_sync_shares_chunk_blocks() {
        let mut source = table(4);
        let labels: Vec<_> = (0..10).map(|i| label(&format!("unit-{i}"))).collect();
        for (slot, label) in labels.iter().enumerate() {
            source.insert(slot, Arc::clone(label)).unwrap();
        }

        let mut replica = table(4);
        let stats = replica.sync_dirty_chunks(&source).unwrap();
        assert_eq!(stats.chunks_copied, 3);
        assert_eq!(stats.bytes_copied, 0);

        for (slot, label) in labels.iter().enumerate() {
            let got = replica.get::<Label>(slot).unwrap().unwrap();
            assert!(Arc::ptr_eq(&got, label));
        }
        // The block is shared, not the objects: source block plus the local vec
        assert_eq!(Arc::strong_count(&labels[0]), 2);
    }

    #[test]
    fn test_write_after_sync_copies_on_write() {
        let mut source = table(4);
        let old = label("old");
        source.insert(0, Arc::clone(&old)).unwrap();
        source.insert(1, label("other")).unwrap();

        let mut replica = table(4);
        replica.sync_dirty_chunks(&source).unwrap();

        source.insert(0, label("new")).unwrap();
        assert_eq!(replica.get::<Label>(0).unwrap().unwrap().0, "old");
        assert_eq!(old.0, "old");

        replica.sync_dirty_chunks(&source).unwrap();
        assert_eq!(replica.get::<Label>(0).unwrap().unwrap().0, "new");
        assert_eq!(replica.get::<Label>(1).unwrap().unwrap().0, "other");

        // Displaced block still holds `old` until the next copy-on-write
        assert_eq!(Arc::strong_count(&old), 2);
        source.insert(1, label("again")).unwrap();
        assert_eq!(Arc::strong_count(&old), 1);
    }

    #[test]
    fn test_unshared_writes_stay_in_place() {
        let mut table = table(4);
        let first = label("a");
        table.insert(0, Arc::clone(&first)).unwrap();
        table.insert(0, label("b")).unwrap();
        assert_eq!(Arc::strong_count(&first), 1);
        assert_eq!(table.chunk_occupancy(0), 1);
    }

    #[test]
    fn test_remove_drops_reference() {
        let mut table = table(4);
        let label = label("x");
        table.insert(1, Arc::clone(&label)).unwrap();
        assert_eq!(Arc::strong_count(&label), 2);

        assert!(table.remove(1).unwrap());
        assert_eq!(Arc::strong_count(&label), 1);
        assert!(!table.is_chunk_allocated(0));
        assert!(!table.remove(1).unwrap());
    }
}
