//! Built-in components

pub mod ground;
pub mod movement;
pub mod spatial;

pub use ground::GroundComponent;
pub use movement::{AcceleratorComponent, NewtonianComponent};
pub use spatial::{SpatialComponent, TransformFlags};
