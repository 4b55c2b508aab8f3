//! # Scene Configuration
//!
//! Every tunable of the simulation core in one serializable tree. A
//! [`SceneConfig`] can be built in code with the `with_*` builders or loaded
//! from a `.toml`/`.ron` file through the [`Config`] trait.
//!
//! ```toml
//! [engine]
//! log_level = "debug"
//! fixed_timestep = 0.016666668
//!
//! [spatial]
//! gravity = [0.0, -9.8, 0.0]
//!
//! [collision]
//! critical_travel_ratio = 1.0
//! ray_offset = 0.001
//!
//! [collision.octree]
//! min = [-100.0, -100.0, -100.0]
//! max = [100.0, 100.0, 100.0]
//! min_cell_size = 1.0
//! ```

use serde::{Deserialize, Serialize};

use crate::foundation::geometry::Aabb;
use crate::foundation::math::Vec3;

pub use crate::config::{Config, ConfigError};

/// Driver-level settings: logging and the timestep the host should use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level for the engine (`error`..`trace`)
    pub log_level: String,
    /// Seconds per frame for hosts that step at a fixed rate
    pub fixed_timestep: f32,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            fixed_timestep: 1.0 / 60.0,
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the fixed timestep in seconds
    pub fn with_fixed_timestep(mut self, dt: f32) -> Self {
        self.fixed_timestep = dt;
        self
    }

    /// Parsed log level, falling back to `Info` for unknown names
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for the spatial (transform/integration) step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Gravitational acceleration applied to gravity-affected bodies
    pub gravity: Vec3,
}

impl SpatialConfig {
    /// Create the default spatial configuration (earth-like gravity along -y)
    pub fn new() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.8, 0.0),
        }
    }

    /// Set gravity
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds and granularity of the collision octree.
///
/// The octree root is the cube over the largest extent of `min..max`.
/// Bounders are despawned once they leave that cube, so for non-cubic bounds
/// the kept region is larger than the configured box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OctreeConfig {
    /// Minimum corner of the indexed world region
    pub min: Vec3,
    /// Maximum corner of the indexed world region
    pub max: Vec3,
    /// Nodes smaller than this never fragment further
    pub min_cell_size: f32,
}

impl OctreeConfig {
    /// Create an octree configuration
    pub const fn new(min: Vec3, max: Vec3, min_cell_size: f32) -> Self {
        Self { min, max, min_cell_size }
    }

    /// Symmetric bounds around the origin
    pub fn cube(half_size: f32, min_cell_size: f32) -> Self {
        Self::new(Vec3::repeat(-half_size), Vec3::repeat(half_size), min_cell_size)
    }

    /// The configured region as a box
    pub const fn bounds(&self) -> Aabb {
        Aabb::new(self.min, self.max)
    }

    /// Reject inverted bounds and non-positive cell sizes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min.x < self.max.x && self.min.y < self.max.y && self.min.z < self.max.z) {
            return Err(ConfigError::Invalid(format!(
                "octree bounds are inverted or empty: min {:?}, max {:?}",
                self.min, self.max
            )));
        }
        if self.min_cell_size.is_nan() || self.min_cell_size <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "octree min_cell_size must be positive, got {}",
                self.min_cell_size
            )));
        }
        Ok(())
    }
}

/// Settings for the collision step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Octree to accelerate queries; `None` falls back to brute force
    pub octree: Option<OctreeConfig>,
    /// A bounder whose travel this frame exceeds this multiple of its
    /// smallest half-extent is swept instead of tested only at rest
    pub critical_travel_ratio: f32,
    /// Distance a see-through ray is pushed past each surface it passes
    pub ray_offset: f32,
}

impl CollisionConfig {
    /// Create the default collision configuration (brute force, no octree)
    pub const fn new() -> Self {
        Self {
            octree: None,
            critical_travel_ratio: 1.0,
            ray_offset: 0.001,
        }
    }

    /// Use an octree over the given region
    pub fn with_octree(mut self, octree: OctreeConfig) -> Self {
        self.octree = Some(octree);
        self
    }

    /// Set the critical travel ratio
    pub fn with_critical_travel_ratio(mut self, ratio: f32) -> Self {
        self.critical_travel_ratio = ratio;
        self
    }
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Scene Configuration
///
/// Top-level configuration handed to `Scene::new`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Driver settings
    pub engine: EngineConfig,
    /// Spatial step settings
    pub spatial: SpatialConfig,
    /// Collision step settings
    pub collision: CollisionConfig,
}

impl SceneConfig {
    /// Create a configuration with every default
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the engine section
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Replace the spatial section
    pub fn with_spatial(mut self, spatial: SpatialConfig) -> Self {
        self.spatial = spatial;
        self
    }

    /// Replace the collision section
    pub fn with_collision(mut self, collision: CollisionConfig) -> Self {
        self.collision = collision;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(octree) = &self.collision.octree {
            octree.validate()?;
        }
        if self.collision.critical_travel_ratio.is_nan() || self.collision.critical_travel_ratio < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "critical_travel_ratio must be non-negative, got {}",
                self.collision.critical_travel_ratio
            )));
        }
        Ok(())
    }
}

impl Config for SceneConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    #[test]
    fn toml_sections_fill_in_defaults() {
        let text = r#"
            [collision]
            critical_travel_ratio = 2.0

            [collision.octree]
            min = [-10.0, -10.0, -10.0]
            max = [10.0, 10.0, 10.0]
            min_cell_size = 0.5
        "#;
        let config = SceneConfig::from_str_as(text, ConfigFormat::Toml).unwrap();
        assert_eq!(config.collision.critical_travel_ratio, 2.0);
        assert_eq!(config.collision.ray_offset, 0.001);
        assert_eq!(config.collision.octree, Some(OctreeConfig::cube(10.0, 0.5)));
        assert_eq!(config.spatial, SpatialConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn ron_round_trip_keeps_values() {
        let config = SceneConfig::new()
            .with_engine(EngineConfig::new().with_log_level("debug"))
            .with_collision(CollisionConfig::new().with_octree(OctreeConfig::cube(50.0, 1.0)));
        let text = config.to_string_as(ConfigFormat::Ron).unwrap();
        let back = SceneConfig::from_str_as(&text, ConfigFormat::Ron).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.engine.level_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn inverted_octree_bounds_are_rejected() {
        let config = SceneConfig::new().with_collision(
            CollisionConfig::new().with_octree(OctreeConfig::new(Vec3::repeat(1.0), Vec3::repeat(-1.0), 1.0)),
        );
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = SceneConfig::load_from_file("scene.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }
}
