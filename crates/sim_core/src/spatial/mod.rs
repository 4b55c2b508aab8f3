//! Spatial partitioning for broad-phase queries

pub mod octree;
pub mod spatial_query;

pub use octree::Octree;
pub use spatial_query::{LinearIndex, SpatialIndex};
