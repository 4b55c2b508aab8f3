//! Motion integration components for the spatial step
//!
//! A [`NewtonianComponent`] integrates velocity into its entity's spatial
//! component every frame. Constant pushes (thrusters, wind) are separate
//! [`AcceleratorComponent`]s on the same entity, summed by the integrator so
//! their registration order does not matter.

use crate::ecs::component::{Component, ComponentContext, ComponentHandle, SystemId};
use crate::events::messages::CollisionNorm;
use crate::events::SubscriptionId;
use crate::foundation::math::{remove_all_against, Quat, Vec3};

/// Velocity-driven motion with optional gravity
#[derive(Debug, Clone, PartialEq)]
pub struct NewtonianComponent {
    /// Linear velocity in units per second
    pub velocity: Vec3,

    /// Angular velocity in radians per second (axis * rate)
    pub angular_velocity: Vec3,

    /// Multiplier on scene gravity (0 = unaffected)
    pub gravity_scale: f32,

    /// Maximum speed limit (0 = no limit)
    pub max_speed: f32,

    /// Damping factor for velocity (0 = no damping, 1 = instant stop)
    pub linear_damping: f32,

    /// Drop velocity pointing into surfaces reported by collision normals
    pub stop_on_contact: bool,

    subscription: Option<SubscriptionId>,
}

impl NewtonianComponent {
    /// Create a resting body affected by gravity
    pub fn new() -> Self {
        Self {
            velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            gravity_scale: 1.0,
            max_speed: 0.0,
            linear_damping: 0.0,
            stop_on_contact: true,
            subscription: None,
        }
    }

    /// Create a body with initial velocity
    pub fn with_velocity(velocity: Vec3) -> Self {
        Self {
            velocity,
            ..Self::new()
        }
    }

    /// Builder: gravity multiplier
    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    /// Builder: spin
    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    /// Set maximum speed
    pub fn set_max_speed(&mut self, max_speed: f32) {
        self.max_speed = max_speed.max(0.0);
    }

    /// Set linear damping
    pub fn set_linear_damping(&mut self, damping: f32) {
        self.linear_damping = damping.clamp(0.0, 1.0);
    }

    /// Advance velocity by `acceleration` over `dt`, applying limits
    pub fn integrate(&mut self, acceleration: Vec3, dt: f32) {
        self.velocity += acceleration * dt;

        if self.max_speed > 0.0 {
            let speed = self.velocity.magnitude();
            if speed > self.max_speed {
                self.velocity *= self.max_speed / speed;
            }
        }

        if self.linear_damping > 0.0 {
            self.velocity *= (1.0 - self.linear_damping * dt).max(0.0);
        }
    }

    /// Stop all movement
    pub fn stop(&mut self) {
        self.velocity = Vec3::zeros();
        self.angular_velocity = Vec3::zeros();
    }
}

impl Default for NewtonianComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for NewtonianComponent {
    fn system_id(&self) -> SystemId {
        SystemId::Spatial
    }

    fn init(&mut self, ctx: &mut ComponentContext<'_>) {
        if !self.stop_on_contact {
            return;
        }
        let me: ComponentHandle<Self> = ComponentHandle::new(ctx.key());
        let entity = ctx.entity();
        let id = ctx.subscribe::<CollisionNorm, _>(Some(entity), move |msg, world, _| {
            if let Some(body) = world.registry.get_mut(me) {
                body.velocity = remove_all_against(&body.velocity, &msg.norm);
            }
        });
        self.subscription = Some(id);
    }

    fn kill(&mut self, ctx: &mut ComponentContext<'_>) {
        if let Some(id) = self.subscription.take() {
            ctx.unsubscribe(id);
        }
    }

    fn update(&mut self, ctx: &mut ComponentContext<'_>, dt: f32) {
        let entity = ctx.entity();
        let mut acceleration = ctx.world.spatial.gravity() * self.gravity_scale;
        for handle in ctx.registry().entity_components_of_type::<AcceleratorComponent>(entity) {
            if let Some(accelerator) = ctx.registry().get(handle) {
                acceleration += accelerator.acceleration;
            }
        }
        self.integrate(acceleration, dt);

        let delta = self.velocity * dt;
        let spin = self.angular_velocity * dt;
        let Some(spatial) = ctx.spatial_mut() else { return };
        if delta != Vec3::zeros() {
            spatial.translate(delta);
        }
        if spin != Vec3::zeros() {
            spatial.rotate(Quat::from_scaled_axis(spin));
        }
    }
}

/// Constant acceleration fed into the entity's [`NewtonianComponent`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceleratorComponent {
    /// Acceleration in units per second squared
    pub acceleration: Vec3,
}

impl AcceleratorComponent {
    /// Create an accelerator
    pub const fn new(acceleration: Vec3) -> Self {
        Self { acceleration }
    }
}

impl Component for AcceleratorComponent {
    fn system_id(&self) -> SystemId {
        SystemId::Spatial
    }
}
