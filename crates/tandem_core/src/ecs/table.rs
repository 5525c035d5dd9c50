//! # Component Tables
//!
//! A closed set of storage tiers. The repository keeps one
//! [`ComponentTable`] per registered type and switches on the tier once
//! per sync; both arms run the same chunk scan with a different copy step.

use super::chunk::ChunkVersion;
use super::component::ComponentTypeId;
use super::shared::SharedTable;
use super::storage::ValueTable;
use crate::error::{StoreError, StoreResult};
use crate::sync::TableSyncStats;

/// How a table's chunks are copied during sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageTier {
    /// POD data, copied byte for byte.
    Value,
    /// Immutable objects, copied by reference.
    Shared,
}

/// Storage for one component type, tagged by tier.
pub enum ComponentTable {
    /// Tier 1.
    Value(ValueTable),
    /// Tier 2.
    Shared(SharedTable),
}

impl ComponentTable {
    /// Storage tier of this table.
    #[inline]
    #[must_use]
    pub const fn tier(&self) -> StorageTier {
        match self {
            Self::Value(_) => StorageTier::Value,
            Self::Shared(_) => StorageTier::Shared,
        }
    }

    /// Component type id of this table.
    #[inline]
    #[must_use]
    pub fn component(&self) -> ComponentTypeId {
        match self {
            Self::Value(t) => t.component(),
            Self::Shared(t) => t.component(),
        }
    }

    /// Rust type name the table was registered with.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Value(t) => t.type_name(),
            Self::Shared(t) => t.type_name(),
        }
    }

    /// Number of chunk entries (allocated or not).
    #[must_use]
    pub fn total_chunks(&self) -> usize {
        match self {
            Self::Value(t) => t.total_chunks(),
            Self::Shared(t) => t.total_chunks(),
        }
    }

    /// Version of chunk `i` (0 past the end).
    #[must_use]
    pub fn chunk_version(&self, i: usize) -> ChunkVersion {
        match self {
            Self::Value(t) => t.chunk_version(i),
            Self::Shared(t) => t.chunk_version(i),
        }
    }

    /// Whether chunk `i` has backing storage.
    #[must_use]
    pub fn is_chunk_allocated(&self, i: usize) -> bool {
        match self {
            Self::Value(t) => t.is_chunk_allocated(i),
            Self::Shared(t) => t.is_chunk_allocated(i),
        }
    }

    /// Number of components present in chunk `i`.
    #[must_use]
    pub fn chunk_occupancy(&self, i: usize) -> u32 {
        match self {
            Self::Value(t) => t.chunk_occupancy(i),
            Self::Shared(t) => t.chunk_occupancy(i),
        }
    }

    /// Detaches the component at `slot`, whatever its tier.
    ///
    /// # Errors
    ///
    /// [`StoreError::AllocationFailure`] if a shared block cannot be cloned.
    pub fn remove(&mut self, slot: usize) -> StoreResult<bool> {
        match self {
            Self::Value(t) => t.remove(slot),
            Self::Shared(t) => t.remove(slot),
        }
    }

    /// Empty table of the same type, tier and layout.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        match self {
            Self::Value(t) => Self::Value(t.empty_like()),
            Self::Shared(t) => Self::Shared(t.empty_like()),
        }
    }

    /// Value table view, if this is one.
    #[must_use]
    pub fn as_value(&self) -> Option<&ValueTable> {
        match self {
            Self::Value(t) => Some(t),
            Self::Shared(_) => None,
        }
    }

    /// Shared table view, if this is one.
    #[must_use]
    pub fn as_shared(&self) -> Option<&SharedTable> {
        match self {
            Self::Shared(t) => Some(t),
            Self::Value(_) => None,
        }
    }

    /// Syncs dirty chunks from `source`, dispatching on the tier.
    ///
    /// # Errors
    ///
    /// [`StoreError::ComponentKindMismatch`] if the tiers differ; otherwise
    /// whatever the tier's `sync_dirty_chunks` returns.
    pub fn sync_dirty_chunks(&mut self, source: &Self) -> StoreResult<TableSyncStats> {
        match (self, source) {
            (Self::Value(dst), Self::Value(src)) => dst.sync_dirty_chunks(src),
            (Self::Shared(dst), Self::Shared(src)) => dst.sync_dirty_chunks(src),
            (dst, _) => Err(StoreError::ComponentKindMismatch {
                component: dst.component(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ecs::component::{Position, SharedComponent};

    struct Sprite;

    impl SharedComponent for Sprite {
        const ID: ComponentTypeId = 0;
    }

    #[test]
    fn test_dispatch_by_tier() {
        let mut table = ValueTable::new::<Position>(8).unwrap();
        table.insert(0, &Position::new(3.0, 4.0, 0.0)).unwrap();
        let source = ComponentTable::Value(table);
        let mut replica = source.empty_like();

        let stats = replica.sync_dirty_chunks(&source).unwrap();
        assert_eq!(stats.chunks_copied, 1);
        assert_eq!(replica.tier(), StorageTier::Value);
        assert_eq!(
            replica.as_value().unwrap().get::<Position>(0).unwrap(),
            Some(Position::new(3.0, 4.0, 0.0))
        );
        assert!(replica.as_shared().is_none());
    }

    #[test]
    fn test_tier_mismatch() {
        let mut table = SharedTable::new::<Sprite>(8).unwrap();
        table.insert(0, Arc::new(Sprite)).unwrap();
        let source = ComponentTable::Shared(table);
        let mut replica = ComponentTable::Value(ValueTable::new::<Position>(8).unwrap());
        assert_eq!(
            replica.sync_dirty_chunks(&source).unwrap_err(),
            StoreError::ComponentKindMismatch { component: 0 }
        );
        assert_eq!(replica.total_chunks(), 0);
    }

    #[test]
    fn test_remove_dispatches() {
        let mut table = ValueTable::new::<Position>(8).unwrap();
        table.insert(3, &Position::default()).unwrap();
        let mut table = ComponentTable::Value(table);
        assert!(table.remove(3).unwrap());
        assert!(!table.remove(3).unwrap());
        assert!(!table.is_chunk_allocated(0));
    }
}
