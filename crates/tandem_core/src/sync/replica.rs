//! # Replica
//!
//! A read-mostly copy of a live repository, refreshed by dirty-chunk sync.
//!
//! ## Architecture
//!
//! ```text
//!   simulation thread                    reader threads
//!   ┌──────────────────┐                 ┌──────────────┐
//!   │ EntityRepository │   refresh()     │   Replica    │  read()
//!   │      (live)      │ ──────────────▶ │ RwLock<repo> │ ───────▶ many
//!   └──────────────────┘  dirty chunks   └──────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! - `refresh`: takes the write lock for the duration of one sync
//! - `read`: shared guard, many at once, blocks `refresh` while held
//! - The live repository is only borrowed shared, so several replicas may
//!   refresh from it concurrently

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard};

use crate::ecs::{BitMask, EntityRepository};
use crate::error::StoreResult;

use super::SyncReport;

/// A synced copy of a live repository, optionally restricted to a subset
/// of component types.
///
/// ## Usage
///
/// ```rust,ignore
/// let render_view = Replica::with_mask(
///     EntityRepository::replica_of(&live),
///     BitMask::new().with_component::<Position>(),
/// );
///
/// loop {
///     simulate(&mut live);
///     render_view.refresh(&live)?;
///
///     let view = render_view.read();
///     for e in view.iter_alive() {
///         draw(view.get_component::<Position>(e)?);
///     }
/// }
/// ```
pub struct Replica {
    repository: RwLock<EntityRepository>,
    /// Types to sync; `None` syncs everything.
    mask: Option<BitMask>,
    /// Global version adopted by the last successful refresh.
    version: AtomicU64,
    /// Successful refreshes so far.
    sync_count: AtomicU64,
}

impl Replica {
    /// Wraps a repository as an unfiltered replica.
    #[must_use]
    pub fn new(repository: EntityRepository) -> Self {
        Self::from_parts(repository, None)
    }

    /// Wraps a repository as a replica that only syncs the types in `mask`.
    #[must_use]
    pub fn with_mask(repository: EntityRepository, mask: BitMask) -> Self {
        Self::from_parts(repository, Some(mask))
    }

    fn from_parts(repository: EntityRepository, mask: Option<BitMask>) -> Self {
        let version = repository.global_version();
        Self {
            repository: RwLock::new(repository),
            mask,
            version: AtomicU64::new(version),
            sync_count: AtomicU64::new(0),
        }
    }

    /// Component filter applied on every refresh.
    #[inline]
    #[must_use]
    pub fn mask(&self) -> Option<&BitMask> {
        self.mask.as_ref()
    }

    /// Global version of the last successful refresh.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of successful refreshes.
    #[inline]
    #[must_use]
    pub fn sync_count(&self) -> u64 {
        self.sync_count.load(Ordering::Relaxed)
    }

    /// Whether `live` has been mutated since the last refresh.
    #[must_use]
    pub fn is_stale(&self, live: &EntityRepository) -> bool {
        self.version() != live.global_version()
    }

    /// Syncs dirty chunks from `live` under the write lock.
    ///
    /// # Errors
    ///
    /// Whatever [`EntityRepository::sync_from`] returns. The replica is then
    /// partially synced and its version is not advanced.
    pub fn refresh(&self, live: &EntityRepository) -> StoreResult<SyncReport> {
        let mut repository = self.repository.write();
        match repository.sync_from(live, self.mask.as_ref()) {
            Ok(report) => {
                self.version.store(report.global_version, Ordering::Release);
                self.sync_count.fetch_add(1, Ordering::Relaxed);
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(error = %err, "replica refresh failed");
                Err(err)
            }
        }
    }

    /// Shared read access to the replica's repository.
    #[must_use]
    pub fn read(&self) -> RwLockReadGuard<'_, EntityRepository> {
        self.repository.read()
    }

    /// Unwraps the replica, returning its repository.
    #[must_use]
    pub fn into_inner(self) -> EntityRepository {
        self.repository.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Component, ComponentTypeId, Position, SharedComponent, Velocity};
    use crate::error::StoreError;

    fn live() -> EntityRepository {
        let mut repo = EntityRepository::new();
        repo.register::<Position>().unwrap();
        repo.register::<Velocity>().unwrap();
        repo
    }

    #[test]
    fn test_refresh_tracks_version() {
        let mut live = live();
        let replica = Replica::new(EntityRepository::replica_of(&live));
        assert_eq!(replica.version(), 0);
        assert!(replica.mask().is_none());

        let e = live.create_entity().unwrap();
        live.set_component(e, Position::new(1.0, 2.0, 3.0)).unwrap();
        assert!(replica.is_stale(&live));

        let report = replica.refresh(&live).unwrap();
        assert_eq!(report.chunks_copied(), 1);
        assert_eq!(replica.version(), live.global_version());
        assert_eq!(replica.sync_count(), 1);
        assert!(!replica.is_stale(&live));

        let view = replica.read();
        assert_eq!(view.get_component::<Position>(e).unwrap(), Position::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_masked_replica() {
        let mut live = live();
        let e = live.create_entity().unwrap();
        live.set_component(e, Position::new(1.0, 0.0, 0.0)).unwrap();
        live.set_component(e, Velocity::new(0.0, 1.0, 0.0)).unwrap();

        let replica = Replica::with_mask(
            EntityRepository::replica_of(&live),
            BitMask::new().with_component::<Velocity>(),
        );
        let report = replica.refresh(&live).unwrap();
        assert_eq!(report.filtered_count(), 1);

        let repo = replica.into_inner();
        assert!(repo.get_component::<Velocity>(e).is_ok());
        assert!(!repo.is_chunk_allocated(Position::ID, 0).unwrap());
    }

    #[test]
    fn test_failed_refresh_keeps_version() {
        let mut live = live();
        live.create_entity().unwrap();

        // Registers a type the live repository lacks
        let mut stale = EntityRepository::replica_of(&live);
        stale.register_shared::<Marker>().unwrap();
        let replica = Replica::new(stale);

        assert_eq!(
            replica.refresh(&live).unwrap_err(),
            StoreError::UnknownComponentType(Marker::ID)
        );
        assert_eq!(replica.version(), 0);
        assert_eq!(replica.sync_count(), 0);
    }

    #[allow(dead_code)]
    struct Marker;

    impl SharedComponent for Marker {
        const ID: ComponentTypeId = 60;
    }
}
