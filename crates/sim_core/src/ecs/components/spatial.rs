//! Spatial component: where an entity is, how big, and which way it faces
//!
//! Every mutator has a silent twin. Loud changes are recorded as
//! [`TransformFlags`] and announced once per frame by the spatial system as a
//! `SpatialTransformed` message, which is what marks bounders for collision
//! re-testing. Collision corrections use the silent variants.

use bitflags::bitflags;

use crate::ecs::component::{Component, SystemId};
use crate::foundation::math::{Mat3, Mat4, Quat, Transform, Vec3};

bitflags! {
    /// Kinds of transform change made since the last announcement
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransformFlags: u8 {
        /// Position replaced
        const POSITION_SET = 1 << 0;
        /// Position offset
        const MOVED = 1 << 1;
        /// Scale replaced
        const SCALE_SET = 1 << 2;
        /// Scale multiplied
        const SCALED = 1 << 3;
        /// Orientation replaced
        const ORIENTATION_SET = 1 << 4;
        /// Orientation composed with a rotation
        const ROTATED = 1 << 5;
    }
}

/// Position, scale and orientation of an entity
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialComponent {
    transform: Transform,
    prev: Transform,
    changes: TransformFlags,
}

impl SpatialComponent {
    /// Create from a full transform
    pub const fn new(transform: Transform) -> Self {
        Self {
            transform,
            prev: transform,
            changes: TransformFlags::empty(),
        }
    }

    /// Unit scale, no rotation, at `position`
    pub fn at(position: Vec3) -> Self {
        Self::new(Transform::from_position(position))
    }

    /// Builder: set the initial scale
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.transform.scale = scale;
        self.prev.scale = scale;
        self
    }

    /// Builder: set the initial orientation
    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.transform.rotation = orientation;
        self.prev.rotation = orientation;
        self
    }

    /// Current position
    pub const fn position(&self) -> Vec3 {
        self.transform.position
    }

    /// Current scale
    pub const fn scale(&self) -> Vec3 {
        self.transform.scale
    }

    /// Current orientation
    pub const fn orientation(&self) -> Quat {
        self.transform.rotation
    }

    /// Current transform
    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Transform at the start of the current frame
    pub const fn previous(&self) -> &Transform {
        &self.prev
    }

    /// Blend of the previous and current transform, `t` in `[0, 1]`
    pub fn interpolated(&self, t: f32) -> Transform {
        self.prev.lerp(&self.transform, t)
    }

    /// Model matrix
    pub fn model_matrix(&self) -> Mat4 {
        self.transform.to_matrix()
    }

    /// Normal matrix
    pub fn normal_matrix(&self) -> Mat3 {
        self.transform.normal_matrix()
    }

    /// Changes not yet announced
    pub const fn pending_changes(&self) -> TransformFlags {
        self.changes
    }

    /// Replace the position
    pub fn set_position(&mut self, position: Vec3) {
        self.set_position_silently(position);
        self.changes |= TransformFlags::POSITION_SET;
    }

    /// Replace the position without an announcement
    pub fn set_position_silently(&mut self, position: Vec3) {
        self.transform.position = position;
    }

    /// Offset the position
    pub fn translate(&mut self, delta: Vec3) {
        self.translate_silently(delta);
        self.changes |= TransformFlags::MOVED;
    }

    /// Offset the position without an announcement
    pub fn translate_silently(&mut self, delta: Vec3) {
        self.transform.position += delta;
    }

    /// Replace the scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
        self.changes |= TransformFlags::SCALE_SET;
    }

    /// Multiply the scale component-wise
    pub fn scale_by(&mut self, factor: Vec3) {
        self.transform.scale.component_mul_assign(&factor);
        self.changes |= TransformFlags::SCALED;
    }

    /// Replace the orientation
    pub fn set_orientation(&mut self, orientation: Quat) {
        self.transform.rotation = orientation;
        self.changes |= TransformFlags::ORIENTATION_SET;
    }

    /// Apply `rotation` after the current orientation
    pub fn rotate(&mut self, rotation: Quat) {
        self.transform.rotation = rotation * self.transform.rotation;
        self.changes |= TransformFlags::ROTATED;
    }

    /// Remember the current transform as the frame's starting point
    pub(crate) fn begin_frame(&mut self) {
        self.prev = self.transform;
    }

    /// Clear and return the pending changes
    pub(crate) fn take_changes(&mut self) -> TransformFlags {
        std::mem::take(&mut self.changes)
    }
}

impl Default for SpatialComponent {
    fn default() -> Self {
        Self::new(Transform::identity())
    }
}

impl Component for SpatialComponent {
    fn system_id(&self) -> SystemId {
        SystemId::Spatial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn loud_and_silent_mutators() {
        let mut spatial = SpatialComponent::at(Vec3::zeros());
        spatial.translate_silently(Vec3::new(1.0, 0.0, 0.0));
        assert!(spatial.pending_changes().is_empty());

        spatial.translate(Vec3::new(0.0, 1.0, 0.0));
        spatial.scale_by(Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(spatial.pending_changes(), TransformFlags::MOVED | TransformFlags::SCALED);
        assert_relative_eq!(spatial.position(), Vec3::new(1.0, 1.0, 0.0));

        assert_eq!(spatial.take_changes(), TransformFlags::MOVED | TransformFlags::SCALED);
        assert!(spatial.pending_changes().is_empty());
    }

    #[test]
    fn interpolation_runs_from_frame_start() {
        let mut spatial = SpatialComponent::at(Vec3::zeros());
        spatial.begin_frame();
        spatial.set_position(Vec3::new(4.0, 0.0, 0.0));
        assert_relative_eq!(spatial.interpolated(0.25).position, Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(spatial.previous().position, Vec3::zeros());
    }
}
