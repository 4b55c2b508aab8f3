//! Messages the engine itself sends
//!
//! Lifecycle messages go out globally. Spatial and collision messages are
//! addressed to the entity they concern, so components can subscribe with
//! their own entity as target.

use std::any::TypeId;

use crate::ecs::component::{ComponentHandle, ComponentKey, SystemId};
use crate::ecs::components::{SpatialComponent, TransformFlags};
use crate::ecs::entity::EntityId;
use crate::events::Message;
use crate::foundation::math::Vec3;
use crate::physics::collision::BounderHandle;

/// A component was registered during the init phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentAdded {
    /// Owner
    pub entity: EntityId,
    /// The new component
    pub component: ComponentKey,
    /// Its concrete type
    pub type_id: TypeId,
    /// Subsystem it was registered with
    pub system: SystemId,
}

impl Message for ComponentAdded {}

/// A live component was removed during the kill phase.
///
/// The key no longer resolves when this is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentRemoved {
    /// Former owner
    pub entity: EntityId,
    /// The removed component
    pub component: ComponentKey,
    /// Its concrete type
    pub type_id: TypeId,
    /// Subsystem it was registered with
    pub system: SystemId,
}

impl Message for ComponentRemoved {}

/// A spatial component was changed loudly during the last frame step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialTransformed {
    /// Owner
    pub entity: EntityId,
    /// The changed component
    pub spatial: ComponentHandle<SpatialComponent>,
    /// What changed
    pub changes: TransformFlags,
}

impl Message for SpatialTransformed {}

/// Two bounders overlapped, or one swept through the other.
///
/// Sent once to each side, with `bounder` always belonging to `entity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collision {
    /// Receiving entity
    pub entity: EntityId,
    /// Receiving entity's bounder
    pub bounder: BounderHandle,
    /// Entity on the other side
    pub other_entity: EntityId,
    /// Bounder on the other side
    pub other: BounderHandle,
}

impl Message for Collision {}

/// Unit direction a heavier (or equal) bounder pushed `bounder` in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionNorm {
    /// Receiving entity
    pub entity: EntityId,
    /// The pushed bounder
    pub bounder: BounderHandle,
    /// Push direction
    pub norm: Vec3,
}

impl Message for CollisionNorm {}

/// The collision system moved an entity this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionAdjusted {
    /// Moved entity
    pub entity: EntityId,
    /// Net correction applied to its spatial component
    pub delta: Vec3,
}

impl Message for CollisionAdjusted {}
