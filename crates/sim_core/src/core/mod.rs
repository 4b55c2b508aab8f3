//! # Core Module
//!
//! Shared configuration for every subsystem of the simulation core.

pub mod config;

pub use config::{
    CollisionConfig,
    Config,
    ConfigError,
    EngineConfig,
    OctreeConfig,
    SceneConfig,
    SpatialConfig,
};
