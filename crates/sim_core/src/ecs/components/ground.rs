//! Ground detection from collision normals

use crate::ecs::component::{Component, ComponentContext, ComponentHandle, SystemId};
use crate::events::messages::CollisionNorm;
use crate::events::SubscriptionId;
use crate::foundation::math::{safe_norm, Vec3};

/// Tracks whether the entity rests on walkable ground.
///
/// Collision normals within `critical_angle` of straight up (against gravity)
/// count as ground. The verdict is refreshed once per frame in the
/// post-collision step, from the normals relayed after the collision step.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundComponent {
    cos_critical_angle: f32,
    potential_ground_norm: Vec3,
    ground_norm: Vec3,
    subscription: Option<SubscriptionId>,
}

impl GroundComponent {
    /// Create with the steepest walkable slope, in radians
    pub fn new(critical_angle: f32) -> Self {
        Self {
            cos_critical_angle: critical_angle.cos(),
            potential_ground_norm: Vec3::zeros(),
            ground_norm: Vec3::zeros(),
            subscription: None,
        }
    }

    /// Change the steepest walkable slope
    pub fn set_critical_angle(&mut self, critical_angle: f32) {
        self.cos_critical_angle = critical_angle.cos();
    }

    /// Whether a walkable surface was touched last frame
    pub fn on_ground(&self) -> bool {
        self.ground_norm != Vec3::zeros()
    }

    /// Averaged walkable normal from last frame (zero when airborne)
    pub const fn ground_norm(&self) -> Vec3 {
        self.ground_norm
    }

    /// Accumulate a collision normal if it is walkable given `up`
    pub fn consider(&mut self, norm: &Vec3, up: &Vec3) {
        if norm.dot(up) >= self.cos_critical_angle {
            self.potential_ground_norm += norm;
        }
    }
}

impl Component for GroundComponent {
    fn system_id(&self) -> SystemId {
        SystemId::PostCollision
    }

    fn init(&mut self, ctx: &mut ComponentContext<'_>) {
        let me: ComponentHandle<Self> = ComponentHandle::new(ctx.key());
        let entity = ctx.entity();
        let id = ctx.subscribe::<CollisionNorm, _>(Some(entity), move |msg, world, _| {
            let up = -world.spatial.gravity_dir();
            if let Some(ground) = world.registry.get_mut(me) {
                ground.consider(&msg.norm, &up);
            }
        });
        self.subscription = Some(id);
    }

    fn update(&mut self, _ctx: &mut ComponentContext<'_>, _dt: f32) {
        self.ground_norm = safe_norm(&self.potential_ground_norm);
        self.potential_ground_norm = Vec3::zeros();
    }

    fn kill(&mut self, ctx: &mut ComponentContext<'_>) {
        if let Some(id) = self.subscription.take() {
            ctx.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steep_normals_are_not_ground() {
        let up = Vec3::new(0.0, 1.0, 0.0);
        let mut ground = GroundComponent::new(std::f32::consts::FRAC_PI_4);
        ground.consider(&Vec3::new(1.0, 0.0, 0.0), &up);
        assert_eq!(ground.potential_ground_norm, Vec3::zeros());

        ground.consider(&Vec3::new(0.0, 1.0, 0.0), &up);
        assert_eq!(ground.potential_ground_norm, up);
    }
}
