//! Headless sandbox
//!
//! Builds a floor, a few falling bodies, a fast projectile aimed at a wall and
//! a trigger volume, then steps the scene and logs collisions and frame stats.
//!
//! ```text
//! sandbox [config.toml|config.ron] [frames]
//! ```

use std::cell::RefCell;
use std::f32::consts::FRAC_PI_4;
use std::rc::Rc;

use sim_core::prelude::*;

const DEFAULT_FRAMES: u64 = 180;

struct Bodies {
    falling: Vec<(EntityId, ComponentHandle<GroundComponent>)>,
    projectile: EntityId,
    trigger: EntityId,
}

fn load_config(path: Option<&str>) -> Result<SceneConfig, ConfigError> {
    match path {
        Some(path) => SceneConfig::load_from_file(path),
        None => Ok(SceneConfig::new().with_collision(CollisionConfig::new().with_octree(OctreeConfig::cube(64.0, 1.0)))),
    }
}

fn populate(scene: &mut Scene) -> Result<Bodies, SceneError> {
    let floor = scene.create_entity();
    scene.add_component(floor, SpatialComponent::at(Vec3::zeros()))?;
    scene.add_component(
        floor,
        Bounder::aabb(Weight::INFINITE, Aabb::from_center_extents(Vec3::zeros(), Vec3::new(20.0, 0.5, 20.0))),
    )?;

    let wall = scene.create_entity();
    scene.add_component(wall, SpatialComponent::at(Vec3::new(0.0, 3.0, 10.0)))?;
    scene.add_component(
        wall,
        Bounder::aabb(Weight(50), Aabb::from_center_extents(Vec3::zeros(), Vec3::new(4.0, 2.5, 0.25))),
    )?;

    let shapes = [
        BounderShape::Sphere(Sphere::new(Vec3::zeros(), 0.5)),
        BounderShape::Box(Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(0.5))),
        BounderShape::Capsule(Capsule::new(Vec3::zeros(), 0.4, 1.0)),
    ];
    let mut falling = Vec::new();
    for (i, shape) in shapes.into_iter().enumerate() {
        let body = scene.create_entity();
        let x = i as f32 * 2.0 - 2.0;
        scene.add_component(body, SpatialComponent::at(Vec3::new(x, 4.0 + i as f32, 0.0)))?;
        scene.add_component(body, NewtonianComponent::new())?;
        scene.add_component(body, Bounder::new(Weight(1 + u32::try_from(i).unwrap_or(0)), shape))?;
        let ground = scene.add_component(body, GroundComponent::new(FRAC_PI_4))?;
        falling.push((body, ground));
    }

    let projectile = scene.create_entity();
    scene.add_component(projectile, SpatialComponent::at(Vec3::new(0.0, 3.0, -10.0)))?;
    scene.add_component(
        projectile,
        NewtonianComponent::with_velocity(Vec3::new(0.0, 0.0, 240.0)).with_gravity_scale(0.0),
    )?;
    scene.add_component(projectile, Bounder::sphere(Weight(1), Sphere::new(Vec3::zeros(), 0.1)))?;

    let trigger = scene.create_entity();
    scene.add_component(trigger, SpatialComponent::at(Vec3::new(0.0, 3.0, 0.0)))?;
    scene.add_component(trigger, Bounder::sphere(Weight::DETECT_ONLY, Sphere::new(Vec3::zeros(), 1.0)))?;

    Ok(Bodies {
        falling,
        projectile,
        trigger,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let config = load_config(args.next().as_deref())?;
    let frames = args.next().and_then(|n| n.parse().ok()).unwrap_or(DEFAULT_FRAMES);

    env_logger::Builder::new()
        .filter_level(config.engine.level_filter())
        .parse_default_env()
        .init();
    log::info!("Sandbox starting: {} frames at {:.4}s", frames, config.engine.fixed_timestep);

    let mut scene = Scene::new(config)?;
    let bodies = populate(&mut scene)?;

    let trigger = bodies.trigger;
    scene.subscribe::<Collision, _>(Some(trigger), |msg, _, _| {
        log::info!("Trigger entered by {:?}", msg.other_entity);
    });
    let adjustments = Rc::new(RefCell::new(0_usize));
    let counter = Rc::clone(&adjustments);
    scene.subscribe::<CollisionAdjusted, _>(None, move |_, _, _| *counter.borrow_mut() += 1);

    for _ in 0..frames {
        scene.step();
        let stats = scene.stats();
        if stats.frame % 60 == 0 {
            log::info!(
                "Frame {}: {} entities, {} collided, {} adjusted, {} picks, {}us",
                stats.frame,
                stats.entity_count,
                stats.collided,
                stats.adjusted,
                stats.picks,
                stats.update_time_us
            );
        }
    }

    for (body, ground) in &bodies.falling {
        let position = scene.registry().spatial(*body).map(SpatialComponent::position);
        let grounded = scene.registry().get(*ground).is_some_and(GroundComponent::on_ground);
        log::info!("Body {:?} at {:?}, on ground: {}", body, position, grounded);
    }
    let projectile = scene.registry().spatial(bodies.projectile).map(SpatialComponent::position);
    log::info!("Projectile stopped at {:?}", projectile);
    log::info!("{} collision adjustments over {} frames", adjustments.borrow(), scene.frame());

    Ok(())
}
