//! # Sync Statistics
//!
//! Counters returned by every sync, for profiling and for verifying that
//! the dirty-chunk skip is doing its job.

use crate::ecs::{ComponentTypeId, StorageTier};

/// Statistics from syncing one component table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSyncStats {
    /// Component type of the table.
    pub component: ComponentTypeId,
    /// Chunks compared (the source's chunk count).
    pub chunks_scanned: usize,
    /// Chunks skipped because versions matched.
    pub chunks_skipped: usize,
    /// Chunks copied from the source.
    pub chunks_copied: usize,
    /// Chunks released because the source chunk is unallocated.
    pub chunks_released: usize,
    /// Chunk entries appended to match a longer source.
    pub chunks_grown: usize,
    /// Bytes moved by value-chunk copies. Shared chunks are handed over as
    /// one reference each and add nothing here.
    pub bytes_copied: usize,
}

impl TableSyncStats {
    /// Empty stats for a table about to scan `chunks_scanned` chunks.
    #[must_use]
    pub const fn new(component: ComponentTypeId, chunks_scanned: usize) -> Self {
        Self {
            component,
            chunks_scanned,
            chunks_skipped: 0,
            chunks_copied: 0,
            chunks_released: 0,
            chunks_grown: 0,
            bytes_copied: 0,
        }
    }

    /// Fraction of scanned chunks that needed work (0.0 to 1.0).
    #[must_use]
    pub fn dirty_ratio(&self) -> f32 {
        if self.chunks_scanned == 0 {
            0.0
        } else {
            (self.chunks_copied + self.chunks_released) as f32 / self.chunks_scanned as f32
        }
    }
}

/// Outcome of one table during a repository sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSync {
    /// The table was scanned.
    Synced {
        /// Storage tier of the table.
        tier: StorageTier,
        /// Chunk counters.
        stats: TableSyncStats,
    },
    /// The mask excluded this type; the table was left untouched.
    Filtered(ComponentTypeId),
}

/// Combined statistics for a whole repository sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entity slots copied by the index sync.
    pub index_slots: usize,
    /// Per-table outcome, in ascending component id order.
    pub tables: Vec<TableSync>,
    /// Global version adopted from the source.
    pub global_version: u64,
}

impl SyncReport {
    /// Stats of every table that was actually scanned.
    pub fn synced(&self) -> impl Iterator<Item = &TableSyncStats> {
        self.tables.iter().filter_map(|t| match t {
            TableSync::Synced { stats, .. } => Some(stats),
            TableSync::Filtered(_) => None,
        })
    }

    /// Stats for one component type, if its table was scanned.
    #[must_use]
    pub fn table(&self, component: ComponentTypeId) -> Option<&TableSyncStats> {
        self.synced().find(|s| s.component == component)
    }

    /// Number of tables the mask left untouched.
    #[must_use]
    pub fn filtered_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t, TableSync::Filtered(_)))
            .count()
    }

    /// Total chunks copied across all tables.
    #[must_use]
    pub fn chunks_copied(&self) -> usize {
        self.synced().map(|s| s.chunks_copied).sum()
    }

    /// Total chunks released across all tables.
    #[must_use]
    pub fn chunks_released(&self) -> usize {
        self.synced().map(|s| s.chunks_released).sum()
    }

    /// Total bytes moved by value-chunk copies.
    #[must_use]
    pub fn bytes_copied(&self) -> usize {
        self.synced().map(|s| s.bytes_copied).sum()
    }

    /// True if no table needed any chunk work.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.chunks_copied() == 0 && self.chunks_released() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_totals() {
        let mut a = TableSyncStats::new(0, 10);
        a.chunks_copied = 3;
        a.bytes_copied = 300;
        let mut b = TableSyncStats::new(2, 4);
        b.chunks_released = 1;

        let report = SyncReport {
            index_slots: 5,
            tables: vec![
                TableSync::Synced { tier: StorageTier::Value, stats: a },
                TableSync::Filtered(1),
                TableSync::Synced { tier: StorageTier::Shared, stats: b },
            ],
            global_version: 9,
        };

        assert_eq!(report.chunks_copied(), 3);
        assert_eq!(report.chunks_released(), 1);
        assert_eq!(report.bytes_copied(), 300);
        assert_eq!(report.filtered_count(), 1);
        assert!(report.table(1).is_none());
        assert!((report.table(0).unwrap().dirty_ratio() - 0.3).abs() < f32::EPSILON);
        assert!(!report.is_noop());
    }
}
