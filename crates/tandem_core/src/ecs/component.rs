//! # Component Types
//!
//! Two storage tiers, each with its own marker trait:
//!
//! - [`Component`]: plain-old-data, stored as raw bytes and synced by byte copy.
//! - [`SharedComponent`]: immutable objects behind `Arc`, synced by reference copy.
//!
//! Both carry a stable `ID` that doubles as the [`BitMask`](super::BitMask)
//! bit position and the repository's table key.

use std::any::Any;

use bytemuck::{Pod, Zeroable};

/// Stable small-integer id of a component type (0-63, see [`BitMask::CAPACITY`](super::BitMask::CAPACITY)).
pub type ComponentTypeId = u8;

/// Marker trait for value (Tier-1) components.
///
/// Components must be:
/// - `Pod`: plain old data, any bit pattern of the right size is valid
/// - `Send + Sync`: repositories are read from several threads during sync
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Pod, Zeroable)]
/// #[repr(C)]
/// struct Team {
///     id: u32,
/// }
///
/// impl Component for Team {
///     const ID: ComponentTypeId = 4;
/// }
/// ```
pub trait Component: Pod + Send + Sync + 'static {
    /// Unique identifier for this component type.
    const ID: ComponentTypeId;
}

/// Marker trait for shared (Tier-2) components.
///
/// Values are stored as `Arc<Self>` and the store only ever hands out
/// `Arc<Self>`, so there is no way to mutate a published value through it.
/// Sync copies the `Arc`, never the value: source and every replica end up
/// pointing at the same object. Types with interior mutability break that
/// contract and must not implement this trait.
pub trait SharedComponent: Any + Send + Sync {
    /// Unique identifier for this component type.
    const ID: ComponentTypeId;
}

/// Position component for entities.
///
/// Represents a 3D position in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    /// X coordinate in world space.
    pub x: f32,
    /// Y coordinate in world space.
    pub y: f32,
    /// Z coordinate in world space.
    pub z: f32,
    /// Padding for 16-byte rows.
    pub _padding: f32,
}

impl Component for Position {
    const ID: ComponentTypeId = 0;
}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            _padding: 0.0,
        }
    }
}

/// Velocity component for entities, in world units per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Velocity {
    /// X velocity component.
    pub x: f32,
    /// Y velocity component.
    pub y: f32,
    /// Z velocity component.
    pub z: f32,
    /// Padding for alignment.
    pub _padding: f32,
}

impl Component for Velocity {
    const ID: ComponentTypeId = 1;
}

impl Velocity {
    /// Creates a new velocity.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            _padding: 0.0,
        }
    }
}
