//! Bounder shapes, the bounder component and shape fitting
//!
//! # Module Organization
//!
//! - [`shape`] - the closed set of bounder shapes and their pairwise tests
//! - [`bounder`] - the weighted collision volume component
//! - [`fitting`] - picking the tightest shape for a point cloud

pub mod bounder;
pub mod fitting;
pub mod shape;

pub use bounder::{Bounder, BounderHandle, Weight};
pub use fitting::{fit_bounder, ShapeKinds};
pub use shape::{enclosing_aabb, enclosing_sphere, intersect_ray, overlap, transformed, BounderShape};
