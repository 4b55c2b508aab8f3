//! Foundation utilities: math, geometry, handles and logging

pub mod collections;
pub mod geometry;
pub mod logging;
pub mod math;
