//! # Entity Component System
//!
//! Chunked component storage with per-chunk versions.
//!
//! ## Design
//!
//! - Entity handles carry a generation; stale handles are rejected
//! - Component presence lives in one [`BitMask`] per entity slot
//! - Each component type gets one table, split into fixed-size chunks
//! - Every chunk write bumps the chunk's version, which is what sync compares

mod chunk;
mod component;
mod entity;
mod mask;
mod repository;
mod shared;
mod storage;
mod table;

pub use chunk::ChunkVersion;
pub use component::{Component, ComponentTypeId, Position, SharedComponent, Velocity};
pub use entity::{EntityId, EntityIndex};
pub use mask::BitMask;
pub use repository::EntityRepository;
pub use shared::SharedTable;
pub use storage::ValueTable;
pub use table::{ComponentTable, StorageTier};
