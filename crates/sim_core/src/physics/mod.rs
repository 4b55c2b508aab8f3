//! Physics module for collision detection and response
//!
//! Bounders are indexed in a [`crate::spatial::SpatialIndex`] and resolved
//! once per frame by the [`CollisionSystem`]: fast movers are swept first,
//! then every pair of overlapping volumes is pushed apart according to
//! weight.

pub mod collision;
pub mod collision_system;
pub mod resolution;

pub use collision::{Bounder, BounderHandle, BounderShape, ShapeKinds, Weight};
pub use collision_system::CollisionSystem;
pub use resolution::{composite_deltas, net_delta};

use crate::core::config::ConfigError;
use crate::ecs::registry::RegistryError;

/// Collision system errors
#[derive(thiserror::Error, Debug)]
pub enum CollisionError {
    /// A bounder cannot be fitted to zero points
    #[error("Cannot fit a bounder to an empty point set")]
    EmptyPointSet,

    /// The registry refused the operation
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Octree parameters failed validation
    #[error("Invalid octree: {0}")]
    InvalidOctree(#[from] ConfigError),
}
