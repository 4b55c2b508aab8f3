//! Component trait, system routing and the context handed to components

use std::any::Any;

use slotmap::new_key_type;

use crate::ecs::components::SpatialComponent;
use crate::ecs::entity::EntityId;
use crate::ecs::registry::{Registry, RegistryError};
use crate::ecs::world::World;
use crate::events::{Mailbox, Message, MessageBus, SubscriptionId};
use crate::foundation::collections::TypedHandle;

new_key_type! {
    /// Generational key of a component in the registry arena
    pub struct ComponentKey;
}

/// Handle to a component whose concrete type is known
pub type ComponentHandle<T> = TypedHandle<ComponentKey, T>;

/// The subsystem that owns and updates a component.
///
/// Variants are listed in frame order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemId {
    /// Controllers and gameplay logic
    GameLogic,
    /// Path planning
    Pathfinding,
    /// Transforms and motion integration
    Spatial,
    /// Bounding volumes
    Collision,
    /// Reactions to collision results (ground detection and the like)
    PostCollision,
    /// Rendering collaborators
    Render,
    /// Audio collaborators
    Sound,
}

impl SystemId {
    /// Number of systems
    pub const COUNT: usize = 7;

    /// Every system in the order the scene updates them
    pub const ALL: [Self; Self::COUNT] = [
        Self::GameLogic,
        Self::Pathfinding,
        Self::Spatial,
        Self::Collision,
        Self::PostCollision,
        Self::Render,
        Self::Sound,
    ];

    /// Dense index, usable for per-system tables
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Upcast helper so boxed components can be downcast to their concrete type
pub trait AsAny: Any {
    /// Borrow as `Any`
    fn as_any(&self) -> &dyn Any;
    /// Mutably borrow as `Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A unit of entity behavior or data owned by one subsystem.
///
/// `system_id` must return the same value for every instance of a type; the
/// registry reads it once when the component is added.
pub trait Component: AsAny {
    /// Subsystem that stores and updates this component
    fn system_id(&self) -> SystemId;

    /// Called once during the init phase, after every component queued in the
    /// same batch has been linked to its entity and before the first update
    fn init(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// Called once per frame by the owning subsystem
    fn update(&mut self, _ctx: &mut ComponentContext<'_>, _dt: f32) {}

    /// Called once by the kill phase after the component has left the
    /// registry. Only components that were initialized get this call.
    fn kill(&mut self, _ctx: &mut ComponentContext<'_>) {}
}

/// Everything a component may touch while it runs.
///
/// The component itself is checked out of the registry for the duration of
/// the call, so looking up its own handle through `world` yields `None`.
pub struct ComponentContext<'a> {
    entity: EntityId,
    key: ComponentKey,
    /// Registry and system state
    pub world: &'a mut World,
    /// Message bus of the scene
    pub bus: &'a mut MessageBus<World>,
}

impl<'a> ComponentContext<'a> {
    /// Build a context for the component `key` owned by `entity`
    pub fn new(entity: EntityId, key: ComponentKey, world: &'a mut World, bus: &'a mut MessageBus<World>) -> Self {
        Self { entity, key, world, bus }
    }

    /// The entity owning the running component
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Key of the running component
    pub const fn key(&self) -> ComponentKey {
        self.key
    }

    /// Shared registry access
    pub fn registry(&self) -> &Registry {
        &self.world.registry
    }

    /// Mutable registry access
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.world.registry
    }

    /// The owning entity's spatial component
    pub fn spatial(&self) -> Option<&SpatialComponent> {
        self.world.registry.spatial(self.entity)
    }

    /// The owning entity's spatial component, mutably
    pub fn spatial_mut(&mut self) -> Option<&mut SpatialComponent> {
        self.world.registry.spatial_mut(self.entity)
    }

    /// Queue a message for the next relay
    pub fn send<M: Message>(&mut self, target: Option<EntityId>, message: M) {
        self.bus.send(target, message);
    }

    /// Pending queue of the bus
    pub fn mailbox(&mut self) -> &mut Mailbox {
        self.bus.mailbox_mut()
    }

    /// Register a handler; it sees messages queued from now on
    pub fn subscribe<M, F>(&mut self, target: Option<EntityId>, handler: F) -> SubscriptionId
    where
        M: Message,
        F: FnMut(&M, &mut World, &mut Mailbox) + 'static,
    {
        self.bus.subscribe(target, handler)
    }

    /// Remove a handler
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Queue a new entity
    pub fn create_entity(&mut self) -> EntityId {
        self.world.registry.create_entity()
    }

    /// Queue a component on any entity
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<ComponentHandle<T>, RegistryError> {
        self.world.registry.add_component(entity, component)
    }

    /// Queue an entity for destruction at the end of the frame
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        self.world.registry.destroy_entity(entity)
    }
}
