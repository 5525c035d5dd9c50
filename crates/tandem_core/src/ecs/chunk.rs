//! # Chunk Ledger
//!
//! A table is an ordered list of fixed-capacity chunks. Each chunk covers
//! the slot range `[i * capacity, (i + 1) * capacity)` and carries:
//!
//! ```text
//! ┌──────────┬──────────┬──────────────┬──────────────────────────────┐
//! │ version  │ occupied │ present bits │ payload (None = unallocated) │
//! └──────────┴──────────┴──────────────┴──────────────────────────────┘
//! ```
//!
//! `version` is bumped by every insert, overwrite, removal or clear that
//! touches the chunk. Equal versions at the same index on two tables mean
//! equal content, which is the whole basis of dirty-chunk sync: a chunk
//! whose version matches is never looked at.
//!
//! `present` has one bit per slot and `occupied` is its population count.
//! Writing a present slot replaces it, removing an absent one is a no-op,
//! so the count cannot drift whatever order callers use. When the last
//! present slot goes the payload is released, so a chunk whose entities
//! are all gone reads as unallocated and a sync releases the replica's
//! copy too.
//!
//! The payload type is the copy strategy: raw bytes for value tables,
//! a shared block of `Arc` slots for shared tables. Both go through the
//! one scan in [`ChunkList::sync_dirty_from`].

use super::component::ComponentTypeId;
use crate::error::{StoreError, StoreResult};
use crate::sync::TableSyncStats;

/// Monotonic per-chunk change counter.
pub type ChunkVersion = u64;

/// Shape of every chunk in a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChunkLayout {
    /// Component type stored in the table.
    pub component: ComponentTypeId,
    /// Slots per chunk.
    pub slots_per_chunk: usize,
    /// Bytes per slot, for value tables. Zero for shared tables.
    pub element_size: usize,
}

impl ChunkLayout {
    /// Builds a layout, rejecting capacities that cannot address a slot.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidConfig`] unless `slots_per_chunk` is a non-zero
    /// power of two.
    pub fn new(
        component: ComponentTypeId,
        slots_per_chunk: usize,
        element_size: usize,
    ) -> StoreResult<Self> {
        if !slots_per_chunk.is_power_of_two() {
            return Err(StoreError::InvalidConfig(format!(
                "chunk capacity must be a non-zero power of two, got {slots_per_chunk}"
            )));
        }
        Ok(Self {
            component,
            slots_per_chunk,
            element_size,
        })
    }

    #[inline]
    fn presence_words(self) -> usize {
        self.slots_per_chunk.div_ceil(64)
    }
}

/// Backing storage of one allocated chunk.
pub(crate) trait ChunkPayload: Sized {
    /// Label used in allocation errors.
    const WHAT: &'static str;

    /// Allocates an empty payload for one chunk.
    fn allocate(layout: ChunkLayout) -> StoreResult<Self>;

    /// Allocates a payload holding a copy of `source`.
    fn duplicate(source: &Self) -> StoreResult<Self>;

    /// Overwrites this payload with `source`. Both have the same layout.
    fn copy_from(&mut self, source: &Self);

    /// Bytes moved by one `copy_from`. Zero when the copy shares storage.
    fn copy_len(&self) -> usize;
}

struct Chunk<P> {
    version: ChunkVersion,
    occupied: u32,
    /// One bit per slot. Empty while unallocated.
    present: Vec<u64>,
    payload: Option<P>,
}

impl<P> Chunk<P> {
    const fn empty() -> Self {
        Self {
            version: 0,
            occupied: 0,
            present: Vec::new(),
            payload: None,
        }
    }

    #[inline]
    fn bump(&mut self) {
        self.version += 1;
    }

    #[inline]
    fn is_present(&self, offset: usize) -> bool {
        self.present
            .get(offset / 64)
            .is_some_and(|word| (word >> (offset % 64)) & 1 == 1)
    }

    #[inline]
    fn mark(&mut self, offset: usize, present: bool) {
        if let Some(word) = self.present.get_mut(offset / 64) {
            if present {
                *word |= 1 << (offset % 64);
            } else {
                *word &= !(1 << (offset % 64));
            }
        }
    }

    fn release(&mut self) -> bool {
        self.occupied = 0;
        self.present = Vec::new();
        self.payload.take().is_some()
    }
}

/// Ordered chunk sequence of one table.
pub(crate) struct ChunkList<P> {
    layout: ChunkLayout,
    chunks: Vec<Chunk<P>>,
}

impl<P: ChunkPayload> ChunkList<P> {
    /// Creates an empty list. No chunk is allocated until first write.
    pub fn new(layout: ChunkLayout) -> Self {
        Self {
            layout,
            chunks: Vec::new(),
        }
    }

    #[inline]
    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    /// Number of chunk entries (allocated or not).
    #[inline]
    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Version of chunk `i`. Chunks past the end read as version 0.
    #[inline]
    pub fn chunk_version(&self, i: usize) -> ChunkVersion {
        self.chunks.get(i).map_or(0, |c| c.version)
    }

    #[inline]
    pub fn is_chunk_allocated(&self, i: usize) -> bool {
        self.chunks.get(i).is_some_and(|c| c.payload.is_some())
    }

    /// Number of present components in chunk `i`.
    #[inline]
    pub fn occupied(&self, i: usize) -> u32 {
        self.chunks.get(i).map_or(0, |c| c.occupied)
    }

    /// Whether `slot` currently holds a component.
    #[inline]
    pub fn is_present(&self, slot: usize) -> bool {
        let (i, offset) = self.locate(slot);
        self.chunks.get(i).is_some_and(|c| c.is_present(offset))
    }

    /// Chunk index and offset within the chunk of an entity slot.
    #[inline]
    pub fn locate(&self, slot: usize) -> (usize, usize) {
        (
            slot / self.layout.slots_per_chunk,
            slot % self.layout.slots_per_chunk,
        )
    }

    /// Makes sure chunk `i` exists and has a payload.
    ///
    /// Does not bump the version: a fresh payload is empty, so the chunk
    /// content is unchanged until something is written into it.
    pub fn ensure_chunk_allocated(&mut self, i: usize) -> StoreResult<()> {
        self.grow_to(i + 1)?;
        let layout = self.layout;
        let chunk = &mut self.chunks[i];
        if chunk.payload.is_none() {
            let words = layout.presence_words();
            let mut present = Vec::new();
            present
                .try_reserve_exact(words)
                .map_err(|_| StoreError::allocation("chunk presence bits", words))?;
            present.resize(words, 0);
            chunk.payload = Some(P::allocate(layout)?);
            chunk.present = present;
        }
        Ok(())
    }

    /// Releases chunk `i` and everything in it. No-op if unallocated.
    pub fn clear_chunk(&mut self, i: usize) {
        if let Some(chunk) = self.chunks.get_mut(i) {
            if chunk.release() {
                chunk.bump();
            }
        }
    }

    /// Read access to the payload holding `slot`, with the offset inside it.
    ///
    /// `None` unless a component is present at `slot`.
    #[inline]
    pub fn read(&self, slot: usize) -> Option<(&P, usize)> {
        let (i, offset) = self.locate(slot);
        let chunk = self.chunks.get(i)?;
        if !chunk.is_present(offset) {
            return None;
        }
        Some((chunk.payload.as_ref()?, offset))
    }

    /// Writes a component into `slot`, replacing any present one.
    ///
    /// Returns `true` if the slot was empty before.
    pub fn put_with(
        &mut self,
        slot: usize,
        write: impl FnOnce(&mut P, usize) -> StoreResult<()>,
    ) -> StoreResult<bool> {
        let (i, offset) = self.locate(slot);
        self.ensure_chunk_allocated(i)?;
        let chunk = &mut self.chunks[i];
        if let Some(payload) = chunk.payload.as_mut() {
            write(payload, offset)?;
        }
        let added = !chunk.is_present(offset);
        if added {
            chunk.mark(offset, true);
            chunk.occupied += 1;
        }
        chunk.bump();
        Ok(added)
    }

    /// Detaches the component in `slot`, releasing the chunk once empty.
    ///
    /// Returns `false`, without touching the version, if nothing is present
    /// at `slot`.
    pub fn remove_with(
        &mut self,
        slot: usize,
        clear: impl FnOnce(&mut P, usize) -> StoreResult<()>,
    ) -> StoreResult<bool> {
        let (i, offset) = self.locate(slot);
        let Some(chunk) = self.chunks.get_mut(i) else {
            return Ok(false);
        };
        if !chunk.is_present(offset) {
            return Ok(false);
        }

        if chunk.occupied <= 1 {
            chunk.release();
        } else {
            if let Some(payload) = chunk.payload.as_mut() {
                clear(payload, offset)?;
            }
            chunk.mark(offset, false);
            chunk.occupied -= 1;
        }
        chunk.bump();
        Ok(true)
    }

    /// Brings every chunk whose version differs from `source` up to date.
    ///
    /// For each chunk index of `source`:
    /// 1. equal versions: skip, whatever the content
    /// 2. source unallocated: release ours if allocated
    /// 3. otherwise: allocate if needed, copy the whole chunk
    ///
    /// Cases 2 and 3 adopt the source version, presence bits and occupancy.
    /// Our list grows to the source's length but never shrinks.
    ///
    /// # Errors
    ///
    /// [`StoreError::ChunkLayoutMismatch`] if chunk capacities differ,
    /// [`StoreError::AllocationFailure`] if a chunk cannot be allocated. On
    /// allocation failure chunks before the failing one are already synced.
    pub fn sync_dirty_from(&mut self, source: &Self) -> StoreResult<TableSyncStats> {
        if self.layout != source.layout {
            return Err(StoreError::ChunkLayoutMismatch {
                component: self.layout.component,
                expected: self.layout.slots_per_chunk,
                found: source.layout.slots_per_chunk,
            });
        }

        let total = source.chunks.len();
        let mut stats = TableSyncStats::new(self.layout.component, total);
        if total > self.chunks.len() {
            stats.chunks_grown = total - self.chunks.len();
            self.grow_to(total)?;
        }

        for (dst, src) in self.chunks.iter_mut().zip(&source.chunks) {
            if dst.version == src.version {
                stats.chunks_skipped += 1;
                continue;
            }

            match &src.payload {
                None => {
                    if dst.release() {
                        stats.chunks_released += 1;
                    }
                }
                Some(src_payload) => {
                    copy_bits(&mut dst.present, &src.present)?;
                    match dst.payload {
                        Some(ref mut dst_payload) => dst_payload.copy_from(src_payload),
                        None => dst.payload = Some(P::duplicate(src_payload)?),
                    }
                    stats.chunks_copied += 1;
                    stats.bytes_copied += src_payload.copy_len();
                }
            }

            dst.version = src.version;
            dst.occupied = src.occupied;
        }

        Ok(stats)
    }

    /// Appends unallocated chunks until there are at least `count`.
    fn grow_to(&mut self, count: usize) -> StoreResult<()> {
        if count <= self.chunks.len() {
            return Ok(());
        }
        self.chunks
            .try_reserve(count - self.chunks.len())
            .map_err(|_| StoreError::allocation("chunk list", count))?;
        self.chunks.resize_with(count, Chunk::empty);
        Ok(())
    }
}

/// Makes `dst` equal to `src`, reusing its buffer when the sizes match.
#[inline]
fn copy_bits(dst: &mut Vec<u64>, src: &[u64]) -> StoreResult<()> {
    if dst.len() == src.len() {
        dst.copy_from_slice(src);
        return Ok(());
    }
    dst.clear();
    dst.try_reserve_exact(src.len())
        .map_err(|_| StoreError::allocation("chunk presence bits", src.len()))?;
    dst.extend_from_slice(src);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal payload: one u32 per slot.
    #[derive(Debug, PartialEq)]
    struct Words(Vec<u32>);

    impl ChunkPayload for Words {
        const WHAT: &'static str = "test words";

        fn allocate(layout: ChunkLayout) -> StoreResult<Self> {
            Ok(Self(vec![0; layout.slots_per_chunk]))
        }

        fn duplicate(source: &Self) -> StoreResult<Self> {
            Ok(Self(source.0.clone()))
        }

        fn copy_from(&mut self, source: &Self) {
            self.0.copy_from_slice(&source.0);
        }

        fn copy_len(&self) -> usize {
            self.0.len() * 4
        }
    }

    fn list() -> ChunkList<Words> {
        ChunkList::new(ChunkLayout::new(3, 4, 4).unwrap())
    }

    fn put(list: &mut ChunkList<Words>, slot: usize, value: u32) -> bool {
        list.put_with(slot, |p, off| {
            p.0[off] = value;
            Ok(())
        })
        .unwrap()
    }

    fn take(list: &mut ChunkList<Words>, slot: usize) -> bool {
        list.remove_with(slot, |p, off| {
            p.0[off] = 0;
            Ok(())
        })
        .unwrap()
    }

    fn value(list: &ChunkList<Words>, slot: usize) -> Option<u32> {
        list.read(slot).map(|(p, off)| p.0[off])
    }

    #[test]
    fn test_layout_rejects_unusable_capacity() {
        for capacity in [0, 3, 100] {
            assert!(matches!(
                ChunkLayout::new(3, capacity, 4),
                Err(StoreError::InvalidConfig(_))
            ));
        }
        assert!(ChunkLayout::new(3, 1, 4).is_ok());
    }

    #[test]
    fn test_insert_bumps_version_and_allocates() {
        let mut list = list();
        assert_eq!(list.total_chunks(), 0);

        assert!(put(&mut list, 9, 7));
        assert_eq!(list.total_chunks(), 3);
        assert!(list.is_chunk_allocated(2));
        assert!(!list.is_chunk_allocated(0));
        assert_eq!(list.chunk_version(2), 1);
        assert_eq!(list.occupied(2), 1);
        assert_eq!(value(&list, 9), Some(7));

        assert!(!put(&mut list, 9, 8));
        assert_eq!(list.chunk_version(2), 2);
        assert_eq!(list.occupied(2), 1);
        assert_eq!(value(&list, 9), Some(8));
    }

    #[test]
    fn test_absent_slots_read_as_none() {
        let mut list = list();
        put(&mut list, 1, 5);
        assert!(list.is_present(1));
        assert!(!list.is_present(2));
        assert_eq!(value(&list, 2), None);
        assert_eq!(value(&list, 400), None);
    }

    #[test]
    fn test_repeated_insert_then_remove_releases_chunk() {
        let mut list = list();
        put(&mut list, 0, 1);
        put(&mut list, 0, 2);
        assert_eq!(list.occupied(0), 1);

        assert!(take(&mut list, 0));
        assert!(!list.is_chunk_allocated(0));
        assert_eq!(list.occupied(0), 0);

        // Removing what is not there leaves the version alone
        let version = list.chunk_version(0);
        assert!(!take(&mut list, 0));
        assert!(!take(&mut list, 100));
        assert_eq!(list.chunk_version(0), version);
    }

    #[test]
    fn test_last_removal_releases_chunk() {
        let mut list = list();
        put(&mut list, 0, 1);
        put(&mut list, 1, 2);

        assert!(take(&mut list, 0));
        assert!(list.is_chunk_allocated(0));
        assert_eq!(value(&list, 0), None);
        assert_eq!(value(&list, 1), Some(2));
        assert!(take(&mut list, 1));
        assert!(!list.is_chunk_allocated(0));
        assert_eq!(list.chunk_version(0), 4);
    }

    #[test]
    fn test_clear_chunk() {
        let mut list = list();
        put(&mut list, 5, 1);
        list.clear_chunk(1);
        assert!(!list.is_chunk_allocated(1));
        assert!(!list.is_present(5));
        assert_eq!(list.chunk_version(1), 2);
        assert_eq!(list.occupied(1), 0);

        // Clearing an unallocated chunk changes nothing
        list.clear_chunk(1);
        list.clear_chunk(50);
        assert_eq!(list.chunk_version(1), 2);
    }

    #[test]
    fn test_sync_copies_only_dirty_chunks() {
        let mut source = list();
        for slot in 0..12 {
            put(&mut source, slot, slot as u32);
        }

        let mut replica = list();
        let stats = replica.sync_dirty_from(&source).unwrap();
        assert_eq!(stats.chunks_copied, 3);
        assert_eq!(stats.chunks_grown, 3);
        assert_eq!(stats.bytes_copied, 3 * 16);
        assert_eq!(value(&replica, 11), Some(11));
        assert_eq!(replica.occupied(2), 4);

        put(&mut source, 5, 50);
        let stats = replica.sync_dirty_from(&source).unwrap();
        assert_eq!(stats.chunks_copied, 1);
        assert_eq!(stats.chunks_skipped, 2);
        assert_eq!(value(&replica, 5), Some(50));

        let stats = replica.sync_dirty_from(&source).unwrap();
        assert_eq!(stats.chunks_copied, 0);
        assert_eq!(stats.chunks_skipped, 3);
    }

    #[test]
    fn test_sync_carries_presence() {
        let mut source = list();
        put(&mut source, 0, 1);
        put(&mut source, 1, 2);
        let mut replica = list();
        replica.sync_dirty_from(&source).unwrap();

        take(&mut source, 0);
        replica.sync_dirty_from(&source).unwrap();
        assert!(!replica.is_present(0));
        assert_eq!(value(&replica, 0), None);
        assert_eq!(value(&replica, 1), Some(2));
        assert_eq!(replica.occupied(0), 1);
    }

    #[test]
    fn test_sync_releases_emptied_chunks() {
        let mut source = list();
        put(&mut source, 2, 1);
        let mut replica = list();
        replica.sync_dirty_from(&source).unwrap();
        assert!(replica.is_chunk_allocated(0));

        take(&mut source, 2);
        let stats = replica.sync_dirty_from(&source).unwrap();
        assert_eq!(stats.chunks_released, 1);
        assert!(!replica.is_chunk_allocated(0));
        assert!(!replica.is_present(2));
        assert_eq!(replica.chunk_version(0), source.chunk_version(0));
    }

    #[test]
    fn test_sync_never_shrinks() {
        let mut replica = list();
        put(&mut replica, 20, 1);

        let source = list();
        let stats = replica.sync_dirty_from(&source).unwrap();
        assert_eq!(stats.chunks_scanned, 0);
        assert_eq!(replica.total_chunks(), 6);
        assert_eq!(value(&replica, 20), Some(1));
    }

    #[test]
    fn test_layout_mismatch() {
        let mut replica = list();
        let source: ChunkList<Words> = ChunkList::new(ChunkLayout::new(3, 8, 4).unwrap());
        assert_eq!(
            replica.sync_dirty_from(&source).unwrap_err(),
            StoreError::ChunkLayoutMismatch {
                component: 3,
                expected: 4,
                found: 8
            }
        );
    }
}
