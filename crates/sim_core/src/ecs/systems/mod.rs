//! Systems that live inside the ECS layer

pub mod spatial_system;

pub use spatial_system::SpatialSystem;
