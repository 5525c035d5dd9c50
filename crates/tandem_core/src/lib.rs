//! # Tandem Core
//!
//! In-memory entity store with replicas kept current by dirty-chunk sync.
//!
//! - Value components (plain data) are synced with a byte copy per chunk
//! - Shared components (immutable objects) are synced by copying references
//! - Unchanged chunks are skipped by comparing versions
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_core::{BitMask, EntityRepository, Position};
//!
//! let mut live = EntityRepository::new();
//! live.register::<Position>()?;
//! let e = live.create_entity()?;
//! live.set_component(e, Position::new(1.0, 2.0, 3.0))?;
//!
//! let mut replica = EntityRepository::replica_of(&live);
//! replica.sync_from(&live, Some(&BitMask::new().with_component::<Position>()))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod sync;

pub use config::RepositoryConfig;
pub use ecs::{
    BitMask, ChunkVersion, Component, ComponentTable, ComponentTypeId, EntityId, EntityIndex,
    EntityRepository, Position, SharedComponent, SharedTable, StorageTier, Velocity, ValueTable,
};
pub use error::{StoreError, StoreResult};
pub use sync::{Replica, SyncReport, TableSync, TableSyncStats};
