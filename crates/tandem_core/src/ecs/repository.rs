//! # Entity Repository
//!
//! The central container: one [`EntityIndex`], one table per registered
//! component type, and a global version bumped by every mutation.
//!
//! A repository is either *live* (mutated by the simulation) or a *replica*
//! (written only through [`EntityRepository::sync_from`]). Nothing enforces
//! the distinction; mutating a replica breaks the version proxy and the
//! next sync may skip chunks it should have copied.
//!
//! ## Sync order
//!
//! ```text
//! 1. entity index      always, never filtered
//! 2. component tables  ascending id, skipped if the mask excludes them
//! 3. global version    last, so it only changes once everything else is valid
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use super::chunk::ChunkVersion;
use super::component::{Component, ComponentTypeId, SharedComponent};
use super::entity::{EntityId, EntityIndex};
use super::mask::BitMask;
use super::shared::SharedTable;
use super::storage::ValueTable;
use super::table::ComponentTable;
use crate::config::RepositoryConfig;
use crate::error::{StoreError, StoreResult};
use crate::sync::{SyncReport, TableSync};

/// ECS world with chunked, versioned component tables.
///
/// # Example
///
/// ```rust,ignore
/// let mut live = EntityRepository::new();
/// live.register::<Position>()?;
/// let e = live.create_entity()?;
/// live.set_component(e, Position::new(3.0, 4.0, 0.0))?;
///
/// let mut replica = EntityRepository::new();
/// replica.register::<Position>()?;
/// replica.sync_from(&live, None)?;
/// assert_eq!(replica.get_component::<Position>(e)?, Position::new(3.0, 4.0, 0.0));
/// ```
pub struct EntityRepository {
    config: RepositoryConfig,
    index: EntityIndex,
    /// Sorted by id, so syncs always visit tables in the same order.
    tables: BTreeMap<ComponentTypeId, ComponentTable>,
    global_version: u64,
}

impl Default for EntityRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRepository {
    /// Creates an empty repository with the default configuration.
    ///
    /// No entity slots are reserved up front.
    #[must_use]
    pub fn new() -> Self {
        let config = RepositoryConfig::default();
        Self {
            index: EntityIndex::new(config.max_entities),
            config,
            tables: BTreeMap::new(),
            global_version: 0,
        }
    }

    /// Creates an empty repository, reserving `config.initial_slots`.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidConfig`] if the config fails validation,
    /// [`StoreError::AllocationFailure`] if the reservation fails.
    pub fn with_config(config: RepositoryConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            index: EntityIndex::with_capacity(config.initial_slots, config.max_entities)?,
            config,
            tables: BTreeMap::new(),
            global_version: 0,
        })
    }

    /// Creates an empty repository with the same configuration and
    /// registered types as `source`, ready to be synced from it.
    #[must_use]
    pub fn replica_of(source: &Self) -> Self {
        Self {
            config: source.config.clone(),
            index: EntityIndex::new(source.config.max_entities),
            tables: source
                .tables
                .iter()
                .map(|(&id, table)| (id, table.empty_like()))
                .collect(),
            global_version: 0,
        }
    }

    /// The configuration this repository was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a value component type. Idempotent for the same type.
    ///
    /// # Errors
    ///
    /// [`StoreError::ComponentIdOutOfRange`] if `C::ID` does not fit a
    /// [`BitMask`], [`StoreError::ComponentKindMismatch`] or
    /// [`StoreError::ComponentTypeMismatch`] if `C::ID` is already taken by
    /// another type.
    pub fn register<C: Component>(&mut self) -> StoreResult<()> {
        check_id(C::ID)?;
        match self.tables.get(&C::ID) {
            Some(ComponentTable::Value(table)) => table.check_type::<C>(),
            Some(ComponentTable::Shared(_)) => {
                Err(StoreError::ComponentKindMismatch { component: C::ID })
            }
            None => {
                let table = ValueTable::new::<C>(self.config.chunk_capacity)?;
                self.tables.insert(C::ID, ComponentTable::Value(table));
                Ok(())
            }
        }
    }

    /// Registers a shared component type. Idempotent for the same type.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_shared<S: SharedComponent>(&mut self) -> StoreResult<()> {
        check_id(S::ID)?;
        match self.tables.get(&S::ID) {
            Some(ComponentTable::Shared(table)) => table.check_type::<S>(),
            Some(ComponentTable::Value(_)) => {
                Err(StoreError::ComponentKindMismatch { component: S::ID })
            }
            None => {
                let table = SharedTable::new::<S>(self.config.chunk_capacity)?;
                self.tables.insert(S::ID, ComponentTable::Shared(table));
                Ok(())
            }
        }
    }

    /// Ids of every registered component type.
    #[must_use]
    pub fn registered_types(&self) -> BitMask {
        self.tables.keys().copied().collect()
    }

    /// Table for a component type, if registered.
    #[must_use]
    pub fn table(&self, component: ComponentTypeId) -> Option<&ComponentTable> {
        self.tables.get(&component)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Creates an entity with no components.
    ///
    /// # Errors
    ///
    /// [`StoreError::CapacityExceeded`] or [`StoreError::AllocationFailure`].
    pub fn create_entity(&mut self) -> StoreResult<EntityId> {
        let id = self.index.create()?;
        self.bump();
        Ok(id)
    }

    /// Destroys an entity and detaches all its components.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`] for null, out-of-range or stale handles,
    /// [`StoreError::AllocationFailure`] if a shared block cannot be cloned.
    pub fn destroy_entity(&mut self, id: EntityId) -> StoreResult<()> {
        let slot = self.index.validate(id)?;
        for component in self.index.component_mask(id)?.iter() {
            if let Some(table) = self.tables.get_mut(&component) {
                table.remove(slot)?;
            }
        }
        self.index.destroy(id)?;
        self.bump();
        Ok(())
    }

    /// Attaches or replaces a value component.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`], [`StoreError::UnknownComponentType`],
    /// a kind/type mismatch, or [`StoreError::AllocationFailure`].
    pub fn set_component<C: Component>(&mut self, id: EntityId, value: C) -> StoreResult<()> {
        let slot = self.index.validate(id)?;
        let table = value_table_mut::<C>(&mut self.tables)?;
        table.insert(slot, &value)?;
        self.index.set_component_bit(id, C::ID)?;
        self.bump();
        Ok(())
    }

    /// Detaches a value component. Returns `false` if it was not attached.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`], [`StoreError::UnknownComponentType`] or
    /// a kind/type mismatch.
    pub fn remove_component<C: Component>(&mut self, id: EntityId) -> StoreResult<bool> {
        let slot = self.index.validate(id)?;
        let table = value_table_mut::<C>(&mut self.tables)?;
        if !table.remove(slot)? {
            return Ok(false);
        }
        self.index.clear_component_bit(id, C::ID)?;
        self.bump();
        Ok(true)
    }

    /// Attaches or replaces a shared component.
    ///
    /// Accepts either a value or an existing `Arc`; several entities may
    /// share one object.
    ///
    /// # Errors
    ///
    /// Same as [`set_component`](Self::set_component).
    pub fn set_shared<S: SharedComponent>(
        &mut self,
        id: EntityId,
        value: impl Into<Arc<S>>,
    ) -> StoreResult<()> {
        let slot = self.index.validate(id)?;
        let table = shared_table_mut::<S>(&mut self.tables)?;
        table.insert(slot, value.into())?;
        self.index.set_component_bit(id, S::ID)?;
        self.bump();
        Ok(())
    }

    /// Detaches a shared component. Returns `false` if it was not attached.
    ///
    /// # Errors
    ///
    /// Same as [`remove_component`](Self::remove_component), plus
    /// [`StoreError::AllocationFailure`] if the shared block cannot be cloned.
    pub fn remove_shared<S: SharedComponent>(&mut self, id: EntityId) -> StoreResult<bool> {
        let slot = self.index.validate(id)?;
        let table = shared_table_mut::<S>(&mut self.tables)?;
        if !table.remove(slot)? {
            return Ok(false);
        }
        self.index.clear_component_bit(id, S::ID)?;
        self.bump();
        Ok(true)
    }

    #[inline]
    fn bump(&mut self) {
        self.global_version += 1;
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Checks if a handle refers to a live entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.index.is_alive(id)
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.index.alive_count()
    }

    /// Handles of every live entity, in slot order.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.index.iter_alive()
    }

    /// The entity index.
    #[inline]
    #[must_use]
    pub fn index(&self) -> &EntityIndex {
        &self.index
    }

    /// Version bumped by every mutation and adopted by every sync.
    #[inline]
    #[must_use]
    pub fn global_version(&self) -> u64 {
        self.global_version
    }

    /// Component mask of a live entity.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`] for null, out-of-range or stale handles.
    pub fn component_mask(&self, id: EntityId) -> StoreResult<BitMask> {
        self.index.component_mask(id)
    }

    /// Whether a live entity carries a component type.
    #[must_use]
    pub fn has_component(&self, id: EntityId, component: ComponentTypeId) -> bool {
        self.index
            .component_mask(id)
            .is_ok_and(|mask| mask.is_set(component))
    }

    /// Reads a value component.
    ///
    /// On a filtered replica, a type the mask excluded may report
    /// [`StoreError::MissingComponent`] or a value from an earlier sync.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidHandle`], [`StoreError::UnknownComponentType`],
    /// a kind/type mismatch, or [`StoreError::MissingComponent`].
    pub fn get_component<C: Component>(&self, id: EntityId) -> StoreResult<C> {
        let slot = self.index.validate(id)?;
        let table = match self.tables.get(&C::ID) {
            Some(ComponentTable::Value(table)) => table,
            Some(ComponentTable::Shared(_)) => {
                return Err(StoreError::ComponentKindMismatch { component: C::ID })
            }
            None => return Err(StoreError::UnknownComponentType(C::ID)),
        };
        let missing = StoreError::MissingComponent {
            entity: id,
            component: C::ID,
        };
        if !self.index.component_mask(id)?.is_set(C::ID) {
            return Err(missing);
        }
        table.get::<C>(slot)?.ok_or(missing)
    }

    /// Reads a shared component, returning the stored `Arc` itself.
    ///
    /// # Errors
    ///
    /// Same as [`get_component`](Self::get_component).
    pub fn get_shared<S: SharedComponent>(&self, id: EntityId) -> StoreResult<Arc<S>> {
        let slot = self.index.validate(id)?;
        let table = match self.tables.get(&S::ID) {
            Some(ComponentTable::Shared(table)) => table,
            Some(ComponentTable::Value(_)) => {
                return Err(StoreError::ComponentKindMismatch { component: S::ID })
            }
            None => return Err(StoreError::UnknownComponentType(S::ID)),
        };
        let missing = StoreError::MissingComponent {
            entity: id,
            component: S::ID,
        };
        if !self.index.component_mask(id)?.is_set(S::ID) {
            return Err(missing);
        }
        table.get::<S>(slot)?.ok_or(missing)
    }

    /// Version of chunk `i` of a component table.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownComponentType`] if the type is not registered.
    pub fn chunk_version(&self, component: ComponentTypeId, i: usize) -> StoreResult<ChunkVersion> {
        self.tables
            .get(&component)
            .map(|t| t.chunk_version(i))
            .ok_or(StoreError::UnknownComponentType(component))
    }

    /// Whether chunk `i` of a component table has backing storage.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownComponentType`] if the type is not registered.
    pub fn is_chunk_allocated(&self, component: ComponentTypeId, i: usize) -> StoreResult<bool> {
        self.tables
            .get(&component)
            .map(|t| t.is_chunk_allocated(i))
            .ok_or(StoreError::UnknownComponentType(component))
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Brings this repository up to date with `source`.
    ///
    /// With `mask = None` every registered table is synced; otherwise only
    /// the types set in the mask. Tables the mask excludes are left exactly
    /// as they were. The entity index is always synced in full, and the
    /// global version is adopted last.
    ///
    /// Types registered only on `source` are ignored. Types registered only
    /// here fail with [`StoreError::UnknownComponentType`] unless masked out.
    ///
    /// `source` must not be mutated during the call. Several replicas may
    /// sync from the same source concurrently.
    ///
    /// # Errors
    ///
    /// [`StoreError::AllocationFailure`], [`StoreError::UnknownComponentType`],
    /// or a kind/type/layout mismatch. There is no rollback: after an error
    /// the index and some tables are already synced and the global version
    /// is unchanged. Recover with a fresh unfiltered sync.
    pub fn sync_from(&mut self, source: &Self, mask: Option<&BitMask>) -> StoreResult<SyncReport> {
        self.index.sync_from(&source.index)?;

        let mut tables = Vec::with_capacity(self.tables.len());
        for (&component, table) in &mut self.tables {
            if mask.is_some_and(|m| !m.is_set(component)) {
                tracing::trace!(component, "sync: table filtered out");
                tables.push(TableSync::Filtered(component));
                continue;
            }

            let source_table = source
                .tables
                .get(&component)
                .ok_or(StoreError::UnknownComponentType(component))?;
            let stats = table.sync_dirty_chunks(source_table)?;
            tracing::trace!(
                component,
                scanned = stats.chunks_scanned,
                copied = stats.chunks_copied,
                released = stats.chunks_released,
                "sync: table synced"
            );
            tables.push(TableSync::Synced {
                tier: table.tier(),
                stats,
            });
        }

        self.global_version = source.global_version;

        let report = SyncReport {
            index_slots: source.index.slot_count(),
            tables,
            global_version: self.global_version,
        };
        tracing::debug!(
            global_version = report.global_version,
            slots = report.index_slots,
            chunks_copied = report.chunks_copied(),
            chunks_released = report.chunks_released(),
            bytes_copied = report.bytes_copied(),
            filtered = report.filtered_count(),
            "sync complete"
        );
        Ok(report)
    }
}

fn check_id(component: ComponentTypeId) -> StoreResult<()> {
    if usize::from(component) < BitMask::CAPACITY {
        Ok(())
    } else {
        Err(StoreError::ComponentIdOutOfRange {
            component,
            max: BitMask::CAPACITY,
        })
    }
}

fn value_table_mut<C: Component>(
    tables: &mut BTreeMap<ComponentTypeId, ComponentTable>,
) -> StoreResult<&mut ValueTable> {
    match tables.get_mut(&C::ID) {
        Some(ComponentTable::Value(table)) => {
            table.check_type::<C>()?;
            Ok(table)
        }
        Some(ComponentTable::Shared(_)) => Err(StoreError::ComponentKindMismatch { component: C::ID }),
        None => Err(StoreError::UnknownComponentType(C::ID)),
    }
}

fn shared_table_mut<S: SharedComponent>(
    tables: &mut BTreeMap<ComponentTypeId, ComponentTable>,
) -> StoreResult<&mut SharedTable> {
    match tables.get_mut(&S::ID) {
        Some(ComponentTable::Shared(table)) => {
            table.check_type::<S>()?;
            Ok(table)
        }
        Some(ComponentTable::Value(_)) => Err(StoreError::ComponentKindMismatch { component: S::ID }),
        None => Err(StoreError::UnknownComponentType(S::ID)),
    }
}
