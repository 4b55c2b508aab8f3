//! Bounder component: a weighted collision volume attached to an entity

use serde::{Deserialize, Serialize};

use crate::ecs::component::{Component, ComponentContext, ComponentHandle, SystemId};
use crate::ecs::components::SpatialComponent;
use crate::ecs::registry::Registry;
use crate::foundation::geometry::{Aabb, Capsule, Intersection, Ray, Sphere};
use crate::foundation::math::{Transform, Vec3};

use super::shape::{self, BounderShape};

/// Handle to a bounder component
pub type BounderHandle = ComponentHandle<Bounder>;

/// Collision precedence.
///
/// When two bounders overlap the lighter one is pushed out of the heavier
/// one; equal weights split the correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Weight(pub u32);

impl Weight {
    /// Detects overlaps but never pushes or gets pushed
    pub const DETECT_ONLY: Self = Self(0);
    /// Never moves
    pub const INFINITE: Self = Self(u32::MAX);

    /// Weight zero
    pub const fn is_detect_only(self) -> bool {
        self.0 == 0
    }

    /// Immovable
    pub const fn is_infinite(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for Weight {
    fn default() -> Self {
        Self(1)
    }
}

impl From<u32> for Weight {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Collision volume of an entity, positioned by its spatial component
#[derive(Debug, Clone, PartialEq)]
pub struct Bounder {
    weight: Weight,
    local: BounderShape,
    world: BounderShape,
    spatial: Option<ComponentHandle<SpatialComponent>>,
    prev_center: Option<Vec3>,
}

impl Bounder {
    /// Create a bounder from a shape given in the entity's local space
    pub fn new(weight: impl Into<Weight>, shape: BounderShape) -> Self {
        Self {
            weight: weight.into(),
            local: shape,
            world: shape,
            spatial: None,
            prev_center: None,
        }
    }

    /// Box bounder
    pub fn aabb(weight: impl Into<Weight>, aabb: Aabb) -> Self {
        Self::new(weight, BounderShape::Box(aabb))
    }

    /// Sphere bounder
    pub fn sphere(weight: impl Into<Weight>, sphere: Sphere) -> Self {
        Self::new(weight, BounderShape::Sphere(sphere))
    }

    /// Capsule bounder
    pub fn capsule(weight: impl Into<Weight>, capsule: Capsule) -> Self {
        Self::new(weight, BounderShape::Capsule(capsule))
    }

    /// Collision precedence
    pub const fn weight(&self) -> Weight {
        self.weight
    }

    /// Shape in local space
    pub const fn local_shape(&self) -> &BounderShape {
        &self.local
    }

    /// Shape in world space as of the last refresh
    pub const fn shape(&self) -> &BounderShape {
        &self.world
    }

    /// The spatial component positioning this bounder
    pub const fn spatial(&self) -> Option<ComponentHandle<SpatialComponent>> {
        self.spatial
    }

    /// World-space center
    pub fn center(&self) -> Vec3 {
        self.world.center()
    }

    /// Center before the last advance (the current center if never advanced)
    pub fn prev_center(&self) -> Vec3 {
        self.prev_center.unwrap_or_else(|| self.center())
    }

    /// Movement over the last advance
    pub fn travel(&self) -> Vec3 {
        self.center() - self.prev_center()
    }

    /// Moved farther than `ratio` times its thinnest half-extent, so a
    /// test at rest could miss what it passed through
    pub fn is_critical(&self, ratio: f32) -> bool {
        let reach = ratio * self.world.min_half_extent();
        self.travel().norm_squared() > reach * reach
    }

    /// Box around the world shape, used as the index region
    pub fn enclosing_aabb(&self) -> Aabb {
        shape::enclosing_aabb(&self.world)
    }

    /// Sphere around the world shape
    pub fn enclosing_sphere(&self) -> Sphere {
        shape::enclosing_sphere(&self.world)
    }

    /// Ray test against the world shape
    pub fn intersect_ray(&self, ray: &Ray) -> Option<Intersection> {
        shape::intersect_ray(&self.world, ray)
    }

    /// Translation moving this bounder out of `other`, if they overlap
    pub fn overlap(&self, other: &Self) -> Option<Vec3> {
        shape::overlap(&self.world, &other.world)
    }

    /// Transform of the linked spatial component, identity without one
    pub fn world_transform(&self, registry: &Registry) -> Transform {
        self.spatial
            .and_then(|handle| registry.get(handle))
            .map_or_else(Transform::identity, |spatial| *spatial.transform())
    }

    /// Start a new frame of travel and recompute the world shape
    pub(crate) fn advance(&mut self, transform: &Transform) {
        self.prev_center = Some(self.center());
        self.refresh(transform);
    }

    /// Recompute the world shape without touching the travel start
    pub(crate) fn refresh(&mut self, transform: &Transform) {
        self.world = shape::transformed(&self.local, transform);
    }
}

impl Component for Bounder {
    fn system_id(&self) -> SystemId {
        SystemId::Collision
    }

    fn init(&mut self, ctx: &mut ComponentContext<'_>) {
        self.spatial = ctx.registry().spatial_of(ctx.entity());
        let transform = self.world_transform(ctx.registry());
        self.refresh(&transform);
        self.prev_center = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn weight_ordering_and_extremes() {
        assert!(Weight::DETECT_ONLY < Weight(1));
        assert!(Weight(10) < Weight::INFINITE);
        assert!(Weight::INFINITE.is_infinite());
        assert!(Weight(0).is_detect_only());
        assert_eq!(Weight::default(), Weight(1));
    }

    #[test]
    fn critical_compares_travel_to_thinnest_extent() {
        let mut bounder = Bounder::aabb(Weight(1), Aabb::from_center_extents(Vec3::zeros(), Vec3::new(2.0, 0.25, 2.0)));
        bounder.advance(&Transform::from_position(Vec3::new(0.0, 0.0, 0.2)));
        assert_relative_eq!(bounder.travel(), Vec3::new(0.0, 0.0, 0.2));
        assert!(!bounder.is_critical(1.0));

        bounder.advance(&Transform::from_position(Vec3::new(0.0, 0.0, 0.6)));
        assert!(bounder.is_critical(1.0));
        assert!(!bounder.is_critical(2.0));
    }

    #[test]
    fn refresh_keeps_travel_start() {
        let mut bounder = Bounder::sphere(Weight(1), Sphere::new(Vec3::zeros(), 0.5));
        bounder.advance(&Transform::from_position(Vec3::new(4.0, 0.0, 0.0)));
        bounder.refresh(&Transform::from_position(Vec3::new(3.0, 0.0, 0.0)));
        assert_relative_eq!(bounder.prev_center(), Vec3::zeros());
        assert_relative_eq!(bounder.center(), Vec3::new(3.0, 0.0, 0.0));
    }
}
