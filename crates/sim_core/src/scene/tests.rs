//! Whole-frame scenarios: lifecycle, relay order and collision resolution

use std::any::TypeId;
use std::cell::RefCell;
use std::f32::consts::FRAC_PI_4;
use std::rc::Rc;

use approx::assert_relative_eq;

use super::{Scene, SceneError};
use crate::core::config::{CollisionConfig, OctreeConfig, SceneConfig, SpatialConfig};
use crate::ecs::components::{GroundComponent, NewtonianComponent, SpatialComponent};
use crate::ecs::{Component, ComponentContext, EntityId, SystemId};
use crate::events::{Collision, CollisionAdjusted, ComponentAdded, ComponentRemoved, Message, SpatialTransformed};
use crate::foundation::geometry::{Aabb, Ray, Sphere};
use crate::foundation::logging;
use crate::foundation::math::Vec3;
use crate::physics::collision::{Bounder, BounderHandle, ShapeKinds, Weight};

const DT: f32 = 1.0 / 60.0;

fn weightless() -> SceneConfig {
    SceneConfig::new().with_spatial(SpatialConfig::new().with_gravity(Vec3::zeros()))
}

fn with_octree(config: SceneConfig) -> SceneConfig {
    config.with_collision(CollisionConfig::new().with_octree(OctreeConfig::cube(32.0, 0.5)))
}

fn spawn(scene: &mut Scene, position: Vec3, bounder: Bounder) -> (EntityId, BounderHandle) {
    let entity = scene.create_entity();
    scene.add_component(entity, SpatialComponent::at(position)).unwrap();
    let bounder = scene.add_component(entity, bounder).unwrap();
    (entity, bounder)
}

fn spawn_box(scene: &mut Scene, position: Vec3, half: Vec3, weight: Weight) -> (EntityId, BounderHandle) {
    spawn(scene, position, Bounder::aabb(weight, Aabb::from_center_extents(Vec3::zeros(), half)))
}

fn position(scene: &Scene, entity: EntityId) -> Vec3 {
    scene.registry().spatial(entity).map(SpatialComponent::position).unwrap()
}

/// Collect every message of type `M` seen by a global handler
fn record<M: Message + Clone>(scene: &mut Scene) -> Rc<RefCell<Vec<M>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    scene.subscribe::<M, _>(None, move |msg, _, _| sink.borrow_mut().push(msg.clone()));
    seen
}

fn fast_projectile_stops_at_wall(config: SceneConfig) {
    let mut scene = Scene::new(config).unwrap();
    spawn_box(&mut scene, Vec3::zeros(), Vec3::new(5.0, 5.0, 0.5), Weight(10));
    let (bullet, _) = spawn_box(&mut scene, Vec3::new(0.0, 0.0, -3.0), Vec3::repeat(0.1), Weight(1));
    scene
        .add_component(bullet, NewtonianComponent::with_velocity(Vec3::new(0.0, 0.0, 6.0)))
        .unwrap();

    // one frame covers six units, far more than the wall is thick
    scene.update(1.0);
    assert_relative_eq!(position(&scene, bullet).z, -0.6, epsilon = 1e-4);

    for _ in 0..3 {
        scene.update(1.0);
    }
    assert_relative_eq!(position(&scene, bullet).z, -0.6, epsilon = 1e-4);
}

#[test]
fn swept_projectile_does_not_tunnel() {
    logging::init_with_level(logging::LevelFilter::Trace);
    fast_projectile_stops_at_wall(weightless());
}

#[test]
fn swept_projectile_does_not_tunnel_with_octree() {
    fast_projectile_stops_at_wall(with_octree(weightless()));
}

#[test]
fn equal_weights_split_the_correction() {
    let mut scene = Scene::new(weightless()).unwrap();
    let adjusted = record::<CollisionAdjusted>(&mut scene);
    let (a, _) = spawn(&mut scene, Vec3::zeros(), Bounder::sphere(Weight(1), Sphere::new(Vec3::zeros(), 1.0)));
    let (b, _) = spawn(
        &mut scene,
        Vec3::new(1.5, 0.0, 0.0),
        Bounder::sphere(Weight(1), Sphere::new(Vec3::zeros(), 1.0)),
    );

    scene.update(DT);
    assert_relative_eq!(position(&scene, a), Vec3::new(-0.25, 0.0, 0.0), epsilon = 1e-5);
    assert_relative_eq!(position(&scene, b), Vec3::new(1.75, 0.0, 0.0), epsilon = 1e-5);
    assert_eq!(adjusted.borrow().len(), 2);
}

#[test]
fn infinite_weight_never_moves() {
    let mut scene = Scene::new(weightless()).unwrap();
    let (floor, floor_bounder) = spawn_box(&mut scene, Vec3::zeros(), Vec3::new(5.0, 0.5, 5.0), Weight::INFINITE);
    let (pillar, _) = spawn_box(&mut scene, Vec3::new(0.5, 0.0, 0.0), Vec3::repeat(0.5), Weight::INFINITE);
    let (crate_, crate_bounder) = spawn_box(&mut scene, Vec3::new(3.0, 0.8, 0.0), Vec3::repeat(0.5), Weight(1));

    scene.update(DT);
    assert_relative_eq!(position(&scene, floor), Vec3::zeros());
    assert_relative_eq!(position(&scene, pillar), Vec3::new(0.5, 0.0, 0.0));
    assert_relative_eq!(position(&scene, crate_), Vec3::new(3.0, 1.0, 0.0), epsilon = 1e-5);

    let collided = scene.collision().collided();
    assert!(collided.contains(&crate_bounder));
    assert!(!collided.contains(&floor_bounder));
}

#[test]
fn weighted_push_is_idempotent() {
    let mut scene = Scene::new(weightless()).unwrap();
    let (light, _) = spawn_box(&mut scene, Vec3::zeros(), Vec3::repeat(0.5), Weight(1));
    let (heavy, _) = spawn_box(&mut scene, Vec3::new(0.8, 0.0, 0.0), Vec3::repeat(0.5), Weight(5));

    scene.update(DT);
    let settled = (position(&scene, light), position(&scene, heavy));
    assert_relative_eq!(settled.0, Vec3::new(-0.2, 0.0, 0.0), epsilon = 1e-5);
    assert_relative_eq!(settled.1, Vec3::new(0.8, 0.0, 0.0));

    for _ in 0..3 {
        scene.update(DT);
    }
    assert_relative_eq!(position(&scene, light), settled.0, epsilon = 1e-5);
    assert_relative_eq!(position(&scene, heavy), settled.1);
}

#[test]
fn heavier_classes_compose_per_axis() {
    let mut scene = Scene::new(weightless()).unwrap();
    spawn_box(&mut scene, Vec3::new(0.0, -0.9, 0.0), Vec3::new(5.0, 0.5, 5.0), Weight::INFINITE);
    let (body, _) = spawn_box(&mut scene, Vec3::zeros(), Vec3::repeat(0.5), Weight(1));
    let (heavy, _) = spawn_box(&mut scene, Vec3::new(0.8, 0.0, 0.0), Vec3::repeat(0.5), Weight(5));

    scene.update(DT);
    // sideways from the weight-5 box, upward from the floor
    assert_relative_eq!(position(&scene, body), Vec3::new(-0.2, 0.1, 0.0), epsilon = 1e-5);
    assert_relative_eq!(position(&scene, heavy), Vec3::new(0.8, 0.1, 0.0), epsilon = 1e-5);
}

#[test]
fn three_weight_classes_push_one_body() {
    for config in [weightless(), with_octree(weightless())] {
        let mut scene = Scene::new(config).unwrap();
        let (body, _) = spawn_box(&mut scene, Vec3::zeros(), Vec3::repeat(0.5), Weight(1));
        let (light, _) = spawn_box(&mut scene, Vec3::new(0.2, 0.0, -0.8), Vec3::repeat(0.5), Weight(2));
        let (floor, _) = spawn_box(&mut scene, Vec3::new(-0.125, -0.9, 0.0), Vec3::new(0.375, 0.5, 0.2), Weight(5));
        let (wall, _) = spawn_box(&mut scene, Vec3::new(-0.3, 0.0, 0.8), Vec3::repeat(0.5), Weight(10));

        scene.update(DT);
        // the weight-2 push toward the weight-10 wall is dropped
        assert_relative_eq!(position(&scene, body), Vec3::new(0.0, 0.1, -0.2), epsilon = 1e-5);
        assert_relative_eq!(position(&scene, light), Vec3::new(0.2, 0.0, -0.8));
        assert_relative_eq!(position(&scene, floor), Vec3::new(-0.125, -0.9, 0.0));
        assert_relative_eq!(position(&scene, wall), Vec3::new(-0.3, 0.0, 0.8));
    }
}

#[test]
fn linear_and_octree_resolve_identically() {
    let mut outcomes = Vec::new();
    for round in 0..8 {
        let config = if round % 2 == 0 { weightless() } else { with_octree(weightless()) };
        let mut scene = Scene::new(config).unwrap();
        let (body, _) = spawn_box(&mut scene, Vec3::zeros(), Vec3::repeat(0.5), Weight(1));
        for center in [Vec3::new(0.8, 0.6, 0.0), Vec3::new(-0.7, 0.0, 0.6), Vec3::new(0.9, -0.6, 0.0)] {
            spawn_box(&mut scene, center, Vec3::repeat(0.5), Weight(5));
        }
        scene.update(DT);
        outcomes.push(position(&scene, body));
    }
    for outcome in outcomes {
        assert_relative_eq!(outcome, Vec3::new(0.1, 0.0, 0.0), epsilon = 1e-5);
    }
}

#[test]
fn ray_pick_hits_box_top() {
    for config in [weightless(), with_octree(weightless())] {
        let mut scene = Scene::new(config).unwrap();
        let (_, bounder) = spawn_box(&mut scene, Vec3::zeros(), Vec3::repeat(1.0), Weight(1));
        scene.update(DT);

        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, -1.0, 0.0));
        let (handle, hit) = scene.pick(&ray, |_, _| true).unwrap();
        assert_eq!(handle, bounder);
        assert_relative_eq!(hit.dist, 4.0);
        assert_relative_eq!(hit.norm, Vec3::new(0.0, 1.0, 0.0));
    }
}

#[test]
fn detect_only_volumes_report_without_pushing() {
    let mut scene = Scene::new(weightless()).unwrap();
    let collisions = record::<Collision>(&mut scene);
    let (_, trigger) = spawn(
        &mut scene,
        Vec3::zeros(),
        Bounder::sphere(Weight::DETECT_ONLY, Sphere::new(Vec3::zeros(), 1.0)),
    );
    let (visitor, _) = spawn_box(&mut scene, Vec3::new(1.2, 0.0, 0.0), Vec3::repeat(0.5), Weight(1));

    scene.update(DT);
    assert_relative_eq!(position(&scene, visitor), Vec3::new(1.2, 0.0, 0.0));
    assert_eq!(collisions.borrow().len(), 2);
    assert!(collisions.borrow().iter().any(|c| c.bounder == trigger && c.other_entity == visitor));
    assert!(scene.collision().adjusted().is_empty());
}

#[test]
fn fast_mover_reports_triggers_it_passed() {
    let mut scene = Scene::new(weightless()).unwrap();
    let collisions = record::<Collision>(&mut scene);
    let (_, trigger) = spawn(
        &mut scene,
        Vec3::zeros(),
        Bounder::sphere(Weight::DETECT_ONLY, Sphere::new(Vec3::zeros(), 0.5)),
    );
    let (bullet, _) = spawn_box(&mut scene, Vec3::new(0.0, 0.0, -3.0), Vec3::repeat(0.1), Weight(1));
    scene
        .add_component(bullet, NewtonianComponent::with_velocity(Vec3::new(0.0, 0.0, 6.0)))
        .unwrap();

    scene.update(1.0);
    assert_relative_eq!(position(&scene, bullet).z, 3.0, epsilon = 1e-5);
    assert_eq!(collisions.borrow().len(), 2);
    assert!(scene.collision().collided().contains(&trigger));
}

#[test]
fn created_and_destroyed_in_one_frame_never_lives() {
    let mut scene = Scene::new(weightless()).unwrap();
    let added = record::<ComponentAdded>(&mut scene);
    let removed = record::<ComponentRemoved>(&mut scene);

    let ghost = scene.create_entity();
    scene.add_component(ghost, SpatialComponent::default()).unwrap();
    assert!(scene.destroy_entity(ghost));

    scene.update(DT);
    scene.update(DT);
    assert!(!scene.registry().exists(ghost));
    assert!(added.borrow().is_empty());
    assert!(removed.borrow().is_empty());
    assert_eq!(scene.stats().entity_count, 0);
    assert_eq!(scene.stats().component_count, 0);
}

#[test]
fn leaving_the_octree_despawns_the_entity() {
    let config = weightless().with_collision(CollisionConfig::new().with_octree(OctreeConfig::cube(10.0, 1.0)));
    let mut scene = Scene::new(config).unwrap();
    let removed = record::<ComponentRemoved>(&mut scene);
    let (runaway, bounder) = spawn_box(&mut scene, Vec3::zeros(), Vec3::repeat(0.5), Weight(1));
    scene
        .add_component(runaway, NewtonianComponent::with_velocity(Vec3::new(0.0, 0.0, 100.0)))
        .unwrap();

    scene.update(1.0);
    assert!(!scene.registry().exists(runaway));
    assert_eq!(scene.collision().indexed(), 0);
    assert_eq!(scene.stats().removed, 3);

    // removal notices go out at the next relay
    scene.update(1.0);
    let removed = removed.borrow();
    assert_eq!(removed.len(), 3);
    assert!(removed
        .iter()
        .any(|r| r.component == bounder.key() && r.type_id == TypeId::of::<Bounder>()));
}

#[derive(Debug, Clone)]
struct Ping;

impl Message for Ping {}

#[derive(Debug, Clone)]
struct Pong;

impl Message for Pong {}

#[derive(Debug)]
struct Pinger;

impl Component for Pinger {
    fn system_id(&self) -> SystemId {
        SystemId::GameLogic
    }

    fn update(&mut self, ctx: &mut ComponentContext<'_>, _dt: f32) {
        let entity = ctx.entity();
        ctx.send(Some(entity), Ping);
    }
}

#[test]
fn messages_are_relayed_between_steps() {
    let mut scene = Scene::new(weightless()).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&log);
    scene.subscribe::<Ping, _>(None, move |_, _, mailbox| {
        sink.borrow_mut().push("ping");
        mailbox.send(None, Pong);
    });
    let sink = Rc::clone(&log);
    scene.subscribe::<Pong, _>(None, move |_, _, _| sink.borrow_mut().push("pong"));
    let sink = Rc::clone(&log);
    scene.subscribe::<SpatialTransformed, _>(None, move |_, _, _| sink.borrow_mut().push("spatial"));

    let pinger = scene.create_entity();
    scene.add_component(pinger, Pinger).unwrap();
    let mover = scene.create_entity();
    scene.add_component(mover, SpatialComponent::default()).unwrap();
    scene
        .add_component(mover, NewtonianComponent::with_velocity(Vec3::new(1.0, 0.0, 0.0)))
        .unwrap();

    scene.update(DT);
    assert_eq!(*log.borrow(), vec!["ping", "pong", "spatial"]);
    assert_eq!(scene.pending_messages(), 0);
}

#[test]
fn ground_handlers_leave_with_their_component() {
    let mut scene = Scene::new(SceneConfig::new()).unwrap();
    spawn_box(&mut scene, Vec3::zeros(), Vec3::new(5.0, 0.5, 5.0), Weight::INFINITE);
    let (body, _) = spawn_box(&mut scene, Vec3::new(0.0, 1.0, 0.0), Vec3::repeat(0.5), Weight(1));
    scene.add_component(body, NewtonianComponent::new()).unwrap();
    let ground = scene.add_component(body, GroundComponent::new(FRAC_PI_4)).unwrap();

    for _ in 0..5 {
        scene.update(DT);
        assert!(scene.registry().get(ground).is_some_and(GroundComponent::on_ground));
    }
    assert_relative_eq!(position(&scene, body).y, 1.0, epsilon = 1e-3);
    assert_eq!(scene.subscriber_count(), 3);

    scene.remove_component(ground.key());
    for _ in 0..3 {
        scene.update(DT);
    }
    assert!(scene.registry().get(ground).is_none());
    assert_relative_eq!(position(&scene, body).y, 1.0, epsilon = 1e-3);
    assert_eq!(scene.subscriber_count(), 2);

    for _ in 0..4 {
        let again = scene.add_component(body, GroundComponent::new(FRAC_PI_4)).unwrap();
        scene.update(DT);
        assert_eq!(scene.subscriber_count(), 3);
        scene.remove_component(again.key());
        scene.update(DT);
        assert_eq!(scene.subscriber_count(), 2);
    }

    // entity-scoped handlers die with their entity
    scene.destroy_entity(body);
    scene.update(DT);
    assert_eq!(scene.subscriber_count(), 1);
}

#[test]
fn fitted_bounders_are_indexed_after_init() {
    let mut scene = Scene::new(weightless()).unwrap();
    let entity = scene.create_entity();
    scene.add_component(entity, SpatialComponent::at(Vec3::new(0.0, 0.0, 2.0))).unwrap();
    let points = [Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0)];
    let bounder = scene
        .add_bounder_from_points(entity, Weight(2), &points, ShapeKinds::BOX)
        .unwrap();
    assert!(matches!(
        scene.add_bounder_from_points(entity, Weight(2), &[], ShapeKinds::all()),
        Err(SceneError::Collision(_))
    ));

    scene.update(DT);
    assert_eq!(scene.collision().indexed(), 1);
    let center = scene.registry().get(bounder).map(Bounder::center).unwrap();
    assert_relative_eq!(center, Vec3::new(0.0, 0.0, 2.0));
}

#[test]
fn invalid_config_is_rejected() {
    let config = weightless().with_collision(
        CollisionConfig::new().with_octree(OctreeConfig::new(Vec3::repeat(1.0), Vec3::repeat(-1.0), 1.0)),
    );
    assert!(matches!(Scene::new(config), Err(SceneError::Config(_))));
}

#[test]
fn octree_can_be_swapped_mid_simulation() {
    let mut scene = Scene::new(weightless()).unwrap();
    let (light, _) = spawn_box(&mut scene, Vec3::zeros(), Vec3::repeat(0.5), Weight(1));
    spawn_box(&mut scene, Vec3::new(0.8, 0.0, 0.0), Vec3::repeat(0.5), Weight(5));
    scene.update(DT);

    scene.set_octree(OctreeConfig::cube(16.0, 0.5)).unwrap();
    assert!(scene.collision().octree().is_some());
    scene.update(DT);
    assert_relative_eq!(position(&scene, light), Vec3::new(-0.2, 0.0, 0.0), epsilon = 1e-5);

    scene.clear_octree();
    assert!(scene.collision().octree().is_none());
    assert_eq!(scene.collision().indexed(), 2);
    assert_eq!(scene.frame(), 2);
}
