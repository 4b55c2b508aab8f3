//! # Scene Manager
//!
//! Frame orchestration. One call to [`Scene::update`] runs:
//!
//! 1. the init phase: queued entities become live, queued components are
//!    linked, initialized and registered (repeated until nothing new was
//!    queued by an `init`)
//! 2. a relay
//! 3. every subsystem in [`SystemId`] order, each followed by a relay
//! 4. the kill phase: queued destructions are applied and every removed
//!    component gets its `kill` call
//!
//! Messages sent during a step are delivered at the relay right after it.

use std::any::TypeId;
use std::time::Instant;

use crate::core::config::{OctreeConfig, SceneConfig};
use crate::core::ConfigError;
use crate::ecs::component::{Component, ComponentContext, ComponentHandle, ComponentKey, SystemId};
use crate::ecs::entity::EntityId;
use crate::ecs::registry::{KillReport, Registry, RegistryError};
use crate::ecs::world::World;
use crate::events::messages::{ComponentAdded, ComponentRemoved, SpatialTransformed};
use crate::events::{Mailbox, Message, MessageBus, SubscriptionId};
use crate::foundation::geometry::{Intersection, Ray};
use crate::foundation::math::Vec3;
use crate::physics::collision::{Bounder, BounderHandle, ShapeKinds, Weight};
use crate::physics::{CollisionError, CollisionSystem};

use super::stats::FrameStats;

/// Scene errors
#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    /// Entity or component lookup failed
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The configuration was rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The collision system refused the request
    #[error("Collision error: {0}")]
    Collision(#[from] CollisionError),
}

/// Entities, components, systems and their message bus, stepped per frame
pub struct Scene {
    world: World,
    bus: MessageBus<World>,
    config: SceneConfig,
    stats: FrameStats,
    frame: u64,
}

impl Scene {
    /// Create an empty scene after validating `config`
    pub fn new(config: SceneConfig) -> Result<Self, SceneError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SceneConfig) -> Self {
        let mut bus = MessageBus::new();
        // loud transforms make the entity's bounders worth re-testing
        bus.subscribe::<SpatialTransformed, _>(None, |msg, world: &mut World, _| {
            let World { registry, collision, .. } = world;
            collision.mark_entity(registry, msg.entity);
        });

        log::info!(
            "Scene created ({})",
            if config.collision.octree.is_some() { "octree index" } else { "linear index" }
        );
        Self {
            world: World::new(&config),
            bus,
            config,
            stats: FrameStats::default(),
            frame: 0,
        }
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// Configuration the scene was built with
    pub const fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Number of completed updates
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Statistics of the last update
    pub const fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Registry and system state
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Registry and system state, mutably
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Entities and components
    pub const fn registry(&self) -> &Registry {
        &self.world.registry
    }

    /// Entities and components, mutably
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.world.registry
    }

    /// Collision state and queries
    pub const fn collision(&self) -> &CollisionSystem {
        &self.world.collision
    }

    /// Number of registered message handlers
    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    /// Messages waiting for the next relay
    pub fn pending_messages(&self) -> usize {
        self.bus.pending()
    }

    // ---------------------------------------------------------------------
    // Lifecycle requests
    // ---------------------------------------------------------------------

    /// Queue a new entity; it becomes live at the next init phase
    pub fn create_entity(&mut self) -> EntityId {
        self.world.registry.create_entity()
    }

    /// Queue a component on `entity`
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<ComponentHandle<T>, SceneError> {
        Ok(self.world.registry.add_component(entity, component)?)
    }

    /// Queue an entity for destruction at the end of the next update
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        self.world.registry.destroy_entity(entity)
    }

    /// Queue a single component for destruction at the end of the next update
    pub fn remove_component(&mut self, key: ComponentKey) -> bool {
        self.world.registry.remove_component(key)
    }

    /// Queue a bounder fitted to `points` on `entity`
    pub fn add_bounder_from_points(
        &mut self,
        entity: EntityId,
        weight: impl Into<Weight>,
        points: &[Vec3],
        kinds: ShapeKinds,
    ) -> Result<BounderHandle, SceneError> {
        Ok(CollisionSystem::add_bounder_from_points(
            &mut self.world.registry,
            entity,
            weight,
            points,
            kinds,
        )?)
    }

    // ---------------------------------------------------------------------
    // Messaging
    // ---------------------------------------------------------------------

    /// Queue a message for the next relay
    pub fn send<M: Message>(&mut self, target: Option<EntityId>, message: M) {
        self.bus.send(target, message);
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

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Closest bounder hit by `ray` among those accepted by `filter`
    pub fn pick<F>(&self, ray: &Ray, filter: F) -> Option<(BounderHandle, Intersection)>
    where
        F: FnMut(BounderHandle, &Bounder) -> bool,
    {
        self.world.collision.pick(&self.world.registry, ray, filter)
    }

    /// Index bounders with an octree over `octree`'s bounds
    pub fn set_octree(&mut self, octree: OctreeConfig) -> Result<(), SceneError> {
        let World { registry, collision, .. } = &mut self.world;
        collision.set_octree(registry, octree)?;
        Ok(())
    }

    /// Rebuild the collision index with its current settings
    pub fn remake_octree(&mut self) {
        let World { registry, collision, .. } = &mut self.world;
        collision.remake_octree(registry);
    }

    /// Fall back to brute-force collision queries
    pub fn clear_octree(&mut self) {
        let World { registry, collision, .. } = &mut self.world;
        collision.clear_octree(registry);
    }

    // ---------------------------------------------------------------------
    // Frame
    // ---------------------------------------------------------------------

    /// Advance by the configured fixed timestep
    pub fn step(&mut self) {
        self.update(self.config.engine.fixed_timestep);
    }

    /// Advance the scene by `dt` seconds
    pub fn update(&mut self, dt: f32) {
        let started = Instant::now();
        let mut stats = FrameStats {
            frame: self.frame,
            ..FrameStats::default()
        };

        self.world.spatial.begin_frame(&mut self.world.registry);
        stats.initialized = self.init_phase();
        stats.deliveries += self.relay();

        for system in SystemId::ALL {
            self.update_system(system, dt);
            stats.deliveries += self.relay();
        }
        stats.collided = self.world.collision.collided().len();
        stats.adjusted = self.world.collision.adjusted().len();
        stats.picks = self.world.collision.pick_count();

        let kills = self.kill_phase();
        stats.removed = kills.components.len();

        stats.entity_count = self.world.registry.entity_count();
        stats.component_count = self.world.registry.component_count();
        stats.update_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        log::trace!("Frame {} done: {:?}", self.frame, stats);

        self.stats = stats;
        self.frame += 1;
    }

    fn relay(&mut self) -> usize {
        self.bus.relay(&mut self.world)
    }

    /// Commit everything queued, including what `init` calls queue
    fn init_phase(&mut self) -> usize {
        let mut initialized = 0;
        loop {
            let promoted = self.world.registry.promote_pending_entities();
            let batch = self.world.registry.take_init_batch();
            if batch.is_empty() {
                if promoted > 0 {
                    log::debug!("Promoted {} entities without components", promoted);
                }
                break;
            }

            for &key in &batch {
                self.world.registry.link(key);
            }
            for &key in &batch {
                let Some(entity) = self.world.registry.owner(key) else { continue };
                if let Some(mut component) = self.world.registry.take_component(key) {
                    let mut ctx = ComponentContext::new(entity, key, &mut self.world, &mut self.bus);
                    component.init(&mut ctx);
                    self.world.registry.restore_component(key, component);
                }

                let Some((entity, system, type_id)) = self.world.registry.register(key) else { continue };
                if let Some(handle) = self.world.registry.typed::<Bounder>(key) {
                    let World { registry, collision, .. } = &mut self.world;
                    collision.add(registry, handle);
                }
                self.bus.send(
                    None,
                    ComponentAdded {
                        entity,
                        component: key,
                        type_id,
                        system,
                    },
                );
                initialized += 1;
            }
            log::debug!("Initialized {} components on {} new entities", batch.len(), promoted);
        }
        initialized
    }

    fn update_system(&mut self, system: SystemId, dt: f32) {
        self.update_components(system, dt);
        match system {
            SystemId::Spatial => {
                let World { registry, spatial, .. } = &mut self.world;
                spatial.announce_changes(registry, self.bus.mailbox_mut());
            }
            SystemId::Collision => {
                let World { registry, collision, .. } = &mut self.world;
                collision.update(registry, self.bus.mailbox_mut(), dt);
            }
            _ => {}
        }
    }

    /// Run `update` on every live component of `system`, in registration order
    fn update_components(&mut self, system: SystemId, dt: f32) {
        let keys = self.world.registry.components_by_system(system).to_vec();
        for key in keys {
            let Some(entity) = self.world.registry.owner(key) else { continue };
            let Some(mut component) = self.world.registry.take_component(key) else { continue };
            let mut ctx = ComponentContext::new(entity, key, &mut self.world, &mut self.bus);
            component.update(&mut ctx, dt);
            self.world.registry.restore_component(key, component);
        }
    }

    /// Apply queued destructions and tell everyone what went away
    fn kill_phase(&mut self) -> KillReport {
        if !self.world.registry.has_pending_kill() {
            return KillReport::default();
        }
        let mut report = self.world.registry.apply_kills();

        for (removed, mut component) in std::mem::take(&mut report.retired) {
            let mut ctx = ComponentContext::new(removed.owner, removed.key, &mut self.world, &mut self.bus);
            component.kill(&mut ctx);
        }
        for removed in &report.components {
            if removed.type_id == TypeId::of::<Bounder>() {
                self.world.collision.remove(ComponentHandle::new(removed.key));
            }
            self.bus.send(
                None,
                ComponentRemoved {
                    entity: removed.owner,
                    component: removed.key,
                    type_id: removed.type_id,
                    system: removed.system,
                },
            );
        }
        for &entity in &report.entities {
            self.bus.forget_entity(entity);
        }

        log::debug!(
            "Killed {} entities and {} components ({} discarded before init)",
            report.entities.len(),
            report.components.len(),
            report.discarded
        );
        report
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::build(SceneConfig::default())
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("frame", &self.frame)
            .field("world", &self.world)
            .field("pending_messages", &self.bus.pending())
            .finish_non_exhaustive()
    }
}
