//! # Scene
//!
//! A [`Scene`] owns a [`World`](crate::ecs::World) and the message bus that
//! connects its components, and steps both one frame at a time.

pub mod scene_manager;
pub mod stats;

#[cfg(test)]
mod tests;

pub use scene_manager::{Scene, SceneError};
pub use stats::FrameStats;
