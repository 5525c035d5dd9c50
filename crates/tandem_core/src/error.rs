//! # Store Error Types
//!
//! All errors that can occur in the entity store and its sync protocol.

use thiserror::Error;

use crate::ecs::{ComponentTypeId, EntityId};

/// Errors that can occur in the entity store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backing storage for the index or a chunk could not be grown.
    ///
    /// Fatal to the call that hit it. During a sync the destination is left
    /// partially updated.
    #[error("allocation failure: could not reserve {requested} elements for {what}")]
    AllocationFailure {
        /// The structure that tried to grow.
        what: &'static str,
        /// Number of elements requested.
        requested: usize,
    },

    /// Component type id has no table on this repository (or on the sync source).
    #[error("unknown component type: {0}")]
    UnknownComponentType(ComponentTypeId),

    /// Null, out-of-range or stale entity handle.
    #[error("invalid entity handle: {0:?}")]
    InvalidHandle(EntityId),

    /// The entity is alive but does not carry the component.
    #[error("entity {entity:?} has no component {component}")]
    MissingComponent {
        /// The entity that was queried.
        entity: EntityId,
        /// The component type that was missing.
        component: ComponentTypeId,
    },

    /// Component type id too large for a [`BitMask`](crate::BitMask).
    #[error("component id {component} out of range: masks hold ids below {max}")]
    ComponentIdOutOfRange {
        /// The rejected component type id.
        component: ComponentTypeId,
        /// Number of ids a mask can hold.
        max: usize,
    },

    /// The same id is a value table on one side and a shared table on the other.
    #[error("component {component} is registered with a different storage tier")]
    ComponentKindMismatch {
        /// The conflicting component type id.
        component: ComponentTypeId,
    },

    /// The same id is bound to two different Rust types.
    #[error("component {component} is registered as {expected}, not {found}")]
    ComponentTypeMismatch {
        /// The conflicting component type id.
        component: ComponentTypeId,
        /// Type the table was registered with.
        expected: &'static str,
        /// Type the caller used.
        found: &'static str,
    },

    /// Source and destination tables use different chunk capacities.
    #[error("chunk layout mismatch for component {component}: {expected} slots vs {found}")]
    ChunkLayoutMismatch {
        /// The component type id of the mismatched tables.
        component: ComponentTypeId,
        /// Chunk capacity of the destination.
        expected: usize,
        /// Chunk capacity of the source.
        found: usize,
    },

    /// No more entity slots can be created.
    #[error("entity capacity exceeded: max {max}")]
    CapacityExceeded {
        /// Configured maximum entity count.
        max: u32,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Wraps a failed fallible reservation.
    pub(crate) fn allocation(what: &'static str, requested: usize) -> Self {
        Self::AllocationFailure { what, requested }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StoreError::UnknownComponentType(7);
        assert_eq!(err.to_string(), "unknown component type: 7");

        let err = StoreError::allocation("chunk table", 64);
        assert!(err.to_string().contains("64 elements for chunk table"));
    }
}
