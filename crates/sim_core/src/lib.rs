//! # Sim Core
//!
//! Headless simulation core of a game engine: an entity/component registry
//! with two-phase lifecycle, a deferred typed message bus, an octree spatial
//! index and weighted collision resolution, stepped frame by frame by a
//! [`Scene`](scene::Scene).
//!
//! ## Features
//!
//! - **Deferred lifecycle**: entities and components created or destroyed
//!   during a frame are committed at fixed points, never mid-iteration
//! - **Message bus**: typed messages, global or entity-scoped, delivered only
//!   at explicit relay points
//! - **Octree**: lazily fragmenting spatial index with region, element and
//!   ray queries
//! - **Weighted collisions**: boxes, spheres and capsules pushed apart by
//!   weight, with swept tests against tunneling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sim_core::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut scene = Scene::new(SceneConfig::default())?;
//!
//!     let floor = scene.create_entity();
//!     scene.add_component(floor, SpatialComponent::at(Vec3::zeros()))?;
//!     scene.add_component(
//!         floor,
//!         Bounder::aabb(Weight::INFINITE, Aabb::from_center_extents(Vec3::zeros(), Vec3::new(10.0, 0.5, 10.0))),
//!     )?;
//!
//!     let ball = scene.create_entity();
//!     scene.add_component(ball, SpatialComponent::at(Vec3::new(0.0, 3.0, 0.0)))?;
//!     scene.add_component(ball, NewtonianComponent::new())?;
//!     scene.add_component(ball, Bounder::sphere(Weight(1), Sphere::new(Vec3::zeros(), 0.5)))?;
//!
//!     for _ in 0..120 {
//!         scene.step();
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod core;
pub mod ecs;
pub mod events;
pub mod foundation;
pub mod physics;
pub mod scene;
pub mod spatial;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{CollisionConfig, Config, ConfigError, EngineConfig, OctreeConfig, SceneConfig, SpatialConfig},
        ecs::{
            components::{AcceleratorComponent, GroundComponent, NewtonianComponent, SpatialComponent, TransformFlags},
            Component, ComponentContext, ComponentHandle, ComponentKey, EntityId, Registry, RegistryError, SystemId, World,
        },
        events::{
            Collision, CollisionAdjusted, CollisionNorm, ComponentAdded, ComponentRemoved, Mailbox, Message, MessageBus,
            SpatialTransformed, SubscriptionId,
        },
        foundation::{
            geometry::{Aabb, Capsule, Intersection, Ray, Sphere},
            math::{Quat, Transform, Vec3},
        },
        physics::{Bounder, BounderHandle, BounderShape, CollisionError, CollisionSystem, ShapeKinds, Weight},
        scene::{FrameStats, Scene, SceneError},
        spatial::{LinearIndex, Octree, SpatialIndex},
    };
}
