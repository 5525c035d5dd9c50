//! # Repository Configuration
//!
//! Loaded once at startup, either from defaults or from a TOML document:
//!
//! ```toml
//! chunk_capacity = 256
//! initial_slots = 100000
//! max_entities = 1000000
//! ```

use serde::Deserialize;

use crate::error::{StoreError, StoreResult};

/// Default number of slots per chunk.
pub const DEFAULT_CHUNK_CAPACITY: usize = 256;

/// Default number of entity slots reserved up front.
pub const DEFAULT_INITIAL_SLOTS: usize = 1024;

/// Repository configuration.
///
/// Repositories that sync with each other must agree on `chunk_capacity`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Slots per chunk. Must be a non-zero power of two.
    pub chunk_capacity: usize,
    /// Entity slots reserved at creation (grows on demand).
    pub initial_slots: usize,
    /// Hard cap on live + free entity slots.
    pub max_entities: u32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            initial_slots: DEFAULT_INITIAL_SLOTS,
            // u32::MAX is reserved for the null handle's index
            max_entities: u32::MAX - 1,
        }
    }
}

impl RepositoryConfig {
    /// Parses and validates a TOML configuration. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> StoreResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the storage layer relies on.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> StoreResult<()> {
        if !self.chunk_capacity.is_power_of_two() {
            return Err(StoreError::InvalidConfig(format!(
                "chunk_capacity must be a non-zero power of two, got {}",
                self.chunk_capacity
            )));
        }
        if self.max_entities == 0 || self.max_entities == u32::MAX {
            return Err(StoreError::InvalidConfig(format!(
                "max_entities must be in 1..{}, got {}",
                u32::MAX,
                self.max_entities
            )));
        }
        if self.initial_slots > self.max_entities as usize {
            return Err(StoreError::InvalidConfig(format!(
                "initial_slots ({}) exceeds max_entities ({})",
                self.initial_slots, self.max_entities
            )));
        }
        Ok(())
    }
}
