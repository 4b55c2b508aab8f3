//! The mutable simulation state every system and message handler works on

use crate::core::config::SceneConfig;
use crate::ecs::registry::Registry;
use crate::ecs::systems::SpatialSystem;
use crate::physics::CollisionSystem;

/// Registry plus per-system state of one scene.
///
/// The message bus sits next to it in the scene rather than inside, so bus
/// handlers can receive `&mut World` while the bus itself is being relayed.
#[derive(Debug)]
pub struct World {
    /// Entities and components
    pub registry: Registry,
    /// Spatial step state
    pub spatial: SpatialSystem,
    /// Collision step state and spatial index
    pub collision: CollisionSystem,
}

impl World {
    /// Create an empty world
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            registry: Registry::new(),
            spatial: SpatialSystem::new(&config.spatial),
            collision: CollisionSystem::new(config.collision.clone()),
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(&SceneConfig::default())
    }
}
