//! # Replica Synchronization
//!
//! Keeping read-side copies of a live repository current.
//!
//! ## The Problem
//!
//! ```text
//! Simulation:  mutates the live repository every tick
//! Readers:     want a consistent view without blocking the simulation
//!
//! Full copy every tick:   bandwidth scales with world size
//! Shared lock on live:    readers stall the simulation
//! ```
//!
//! ## The Solution: Dirty-Chunk Sync
//!
//! ```text
//! Every table chunk carries a version, bumped on each write.
//! A replica compares versions chunk by chunk and copies only those that differ:
//!   Tier 1 (values):  memcpy of the chunk's bytes
//!   Tier 2 (shared):  Arc clone per slot, never the objects themselves
//! ```
//!
//! Cost scales with what changed, not with how much exists.

mod replica;
mod stats;

pub use replica::Replica;
pub use stats::{SyncReport, TableSync, TableSyncStats};
