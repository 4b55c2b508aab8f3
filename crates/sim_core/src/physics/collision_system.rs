//! Core collision resolution system
//!
//! Once per frame the system:
//!
//! 1. advances every *potential* bounder (one whose entity moved loudly) and
//!    re-indexes it, destroying entities that left the indexed region
//! 2. sweeps *critical* bounders (moved farther than their own thickness)
//!    along their travel so they stop at the first heavy surface instead of
//!    tunneling through it
//! 3. tests every potential bounder against its index neighbours
//! 4. splits each overlap's correction by weight, composes one net
//!    correction per entity and applies it silently
//!
//! Weight 0 volumes only detect. Infinite weights never move.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::config::{CollisionConfig, OctreeConfig};
use crate::ecs::entity::EntityId;
use crate::ecs::registry::Registry;
use crate::events::messages::{Collision, CollisionAdjusted, CollisionNorm};
use crate::events::Mailbox;
use crate::foundation::geometry::{Intersection, Ray};
use crate::foundation::math::{safe_norm, Vec3};
use crate::spatial::{LinearIndex, Octree, SpatialIndex};

use super::collision::{fit_bounder, Bounder, BounderHandle, ShapeKinds, Weight};
use super::resolution::{assign, composite_deltas, net_delta, Share};
use super::CollisionError;

/// Bounder pair with the smaller handle first
type Pair = (BounderHandle, BounderHandle);

fn pair(a: BounderHandle, b: BounderHandle) -> Pair {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn make_index(config: &CollisionConfig) -> Box<dyn SpatialIndex<BounderHandle>> {
    match &config.octree {
        Some(octree) => Box::new(Octree::new(octree.bounds(), octree.min_cell_size)),
        None => Box::new(LinearIndex::new()),
    }
}

/// Weighted collision detection and resolution over every live bounder
#[derive(Debug)]
pub struct CollisionSystem {
    config: CollisionConfig,
    index: Box<dyn SpatialIndex<BounderHandle>>,
    potentials: BTreeSet<BounderHandle>,
    collided: BTreeSet<BounderHandle>,
    adjusted: BTreeSet<BounderHandle>,
    picks: Cell<usize>,
}

impl CollisionSystem {
    /// Create from configuration. With an octree configured the index is an
    /// octree over its bounds, otherwise every query is brute force.
    pub fn new(config: CollisionConfig) -> Self {
        Self {
            index: make_index(&config),
            config,
            potentials: BTreeSet::new(),
            collided: BTreeSet::new(),
            adjusted: BTreeSet::new(),
            picks: Cell::new(0),
        }
    }

    /// Current settings
    pub const fn config(&self) -> &CollisionConfig {
        &self.config
    }

    /// Octree behind the index, if one is configured
    pub fn octree(&self) -> Option<&Octree<BounderHandle>> {
        self.index.as_octree()
    }

    /// Number of indexed bounders
    pub fn indexed(&self) -> usize {
        self.index.len()
    }

    /// Bounders that collided with anything during the last update
    pub const fn collided(&self) -> &BTreeSet<BounderHandle> {
        &self.collided
    }

    /// Bounders whose entity was moved by the last update
    pub const fn adjusted(&self) -> &BTreeSet<BounderHandle> {
        &self.adjusted
    }

    /// Bounders waiting to be tested by the next update
    pub const fn potentials(&self) -> &BTreeSet<BounderHandle> {
        &self.potentials
    }

    /// Ray picks made since the last update started
    pub fn pick_count(&self) -> usize {
        self.picks.get()
    }

    // ---------------------------------------------------------------------
    // Membership
    // ---------------------------------------------------------------------

    /// Start tracking a freshly registered bounder
    pub fn add(&mut self, registry: &Registry, handle: BounderHandle) {
        let Some(bounder) = registry.get(handle) else { return };
        // out-of-bounds bounders are despawned by the next update
        self.index.set(handle, bounder.enclosing_aabb());
        self.potentials.insert(handle);
    }

    /// Stop tracking a bounder
    pub fn remove(&mut self, handle: BounderHandle) {
        self.index.remove(handle);
        self.potentials.remove(&handle);
        self.collided.remove(&handle);
        self.adjusted.remove(&handle);
    }

    /// Flag every live bounder of `entity` for testing by the next update
    pub fn mark_entity(&mut self, registry: &Registry, entity: EntityId) {
        for handle in registry.entity_components_of_type::<Bounder>(entity) {
            if registry.is_live_component(handle.key()) {
                self.potentials.insert(handle);
            }
        }
    }

    /// Queue a bounder fitted to `points` (in the entity's local space) on
    /// `entity`. It is tracked once the scene's next init phase registers it.
    pub fn add_bounder_from_points(
        registry: &mut Registry,
        entity: EntityId,
        weight: impl Into<Weight>,
        points: &[Vec3],
        kinds: ShapeKinds,
    ) -> Result<BounderHandle, CollisionError> {
        let shape = fit_bounder(points, kinds).ok_or(CollisionError::EmptyPointSet)?;
        Ok(registry.add_component(entity, Bounder::new(weight, shape))?)
    }

    // ---------------------------------------------------------------------
    // Index configuration
    // ---------------------------------------------------------------------

    /// Switch to an octree over `octree`'s bounds and re-index every bounder
    pub fn set_octree(&mut self, registry: &Registry, octree: OctreeConfig) -> Result<(), CollisionError> {
        octree.validate()?;
        self.config.octree = Some(octree);
        self.rebuild(registry);
        Ok(())
    }

    /// Rebuild the index from scratch with the current settings
    pub fn remake_octree(&mut self, registry: &Registry) {
        self.rebuild(registry);
    }

    /// Drop the octree and fall back to brute-force queries
    pub fn clear_octree(&mut self, registry: &Registry) {
        self.config.octree = None;
        self.rebuild(registry);
    }

    fn rebuild(&mut self, registry: &Registry) {
        self.index = make_index(&self.config);
        for (handle, bounder) in registry.iter::<Bounder>() {
            if !self.index.set(handle, bounder.enclosing_aabb()) {
                log::debug!("Bounder {:?} lies outside the rebuilt index", handle);
            }
            self.potentials.insert(handle);
        }
        log::debug!("Collision index rebuilt with {} bounders", self.index.len());
    }

    // ---------------------------------------------------------------------
    // Ray picking
    // ---------------------------------------------------------------------

    /// Closest bounder hit by `ray` among those accepted by `filter`
    pub fn pick<F>(&self, registry: &Registry, ray: &Ray, mut filter: F) -> Option<(BounderHandle, Intersection)>
    where
        F: FnMut(BounderHandle, &Bounder) -> bool,
    {
        self.picks.set(self.picks.get() + 1);
        self.index.cast_ray(ray, &mut |ray, handle| {
            let bounder = registry.get(handle)?;
            if !filter(handle, bounder) {
                return None;
            }
            bounder.intersect_ray(ray)
        })
    }

    /// Closest bounder of at least `min_weight` within `max_dist` of the ray
    /// origin.
    ///
    /// With `passed`, lighter bounders in the way are collected there instead
    /// of being skipped silently; the ray is restarted just past each one.
    /// The reported distance is always measured from `ray.origin`.
    pub fn pick_heavy<F>(
        &self,
        registry: &Registry,
        ray: &Ray,
        min_weight: Weight,
        mut filter: F,
        passed: Option<&mut Vec<BounderHandle>>,
        max_dist: f32,
    ) -> Option<(BounderHandle, Intersection)>
    where
        F: FnMut(BounderHandle, &Bounder) -> bool,
    {
        let Some(passed) = passed else {
            return self
                .pick(registry, ray, |handle, bounder| bounder.weight() >= min_weight && filter(handle, bounder))
                .filter(|(_, hit)| hit.dist <= max_dist);
        };

        let mut travelled = 0.0;
        let mut current = *ray;
        while travelled < max_dist {
            let (handle, mut hit) =
                self.pick(registry, &current, |handle, bounder| !passed.contains(&handle) && filter(handle, bounder))?;
            let dist = travelled + hit.dist;
            if dist > max_dist {
                return None;
            }
            if registry.get(handle)?.weight() >= min_weight {
                hit.dist = dist;
                return Some((handle, hit));
            }
            passed.push(handle);
            travelled = dist + self.config.ray_offset;
            current = ray.advanced(travelled);
        }
        None
    }

    // ---------------------------------------------------------------------
    // Frame update
    // ---------------------------------------------------------------------

    /// Resolve every collision of the frame. Messages go to `mailbox`;
    /// out-of-bounds entities are queued for destruction in `registry`.
    pub fn update(&mut self, registry: &mut Registry, mailbox: &mut Mailbox, _dt: f32) {
        self.picks.set(0);
        self.collided.clear();
        self.adjusted.clear();

        self.advance_potentials(registry);
        let mut checked = BTreeSet::new();
        self.sweep_criticals(registry, mailbox, &mut checked);
        let contributions = self.detect_overlaps(registry, mailbox, &mut checked);
        self.potentials.clear();
        self.apply_contributions(registry, mailbox, contributions);

        log::trace!(
            "Collision update: {} collided, {} adjusted, {} picks",
            self.collided.len(),
            self.adjusted.len(),
            self.picks.get()
        );
    }

    /// Recompute world shapes of potential bounders and re-index them
    fn advance_potentials(&mut self, registry: &mut Registry) {
        let mut escaped = BTreeSet::new();
        for handle in self.potentials.clone() {
            let Some(transform) = registry.get(handle).map(|bounder| bounder.world_transform(registry)) else {
                self.remove(handle);
                continue;
            };
            let Some(bounder) = registry.get_mut(handle) else { continue };
            bounder.advance(&transform);
            let region = bounder.enclosing_aabb();
            if !self.index.set(handle, region) {
                if let Some(entity) = registry.owner(handle.key()) {
                    escaped.insert(entity);
                }
            }
        }

        for entity in escaped {
            log::debug!("Entity {:?} left the collision bounds and is destroyed", entity);
            registry.destroy_entity(entity);
            for handle in registry.entity_components_of_type::<Bounder>(entity) {
                self.index.remove(handle);
                self.potentials.remove(&handle);
            }
        }
    }

    /// Stop fast movers at the first heavy surface along their travel, then
    /// report every detect-only volume they passed through
    fn sweep_criticals(&mut self, registry: &mut Registry, mailbox: &mut Mailbox, checked: &mut BTreeSet<Pair>) {
        let ratio = self.config.critical_travel_ratio;
        let criticals: BTreeSet<BounderHandle> = self
            .potentials
            .iter()
            .copied()
            .filter(|&handle| registry.get(handle).is_some_and(|bounder| bounder.is_critical(ratio)))
            .collect();
        if criticals.is_empty() {
            return;
        }

        let mut corrections: BTreeMap<EntityId, Vec3> = BTreeMap::new();
        for &handle in &criticals {
            let Some(bounder) = registry.get(handle) else { continue };
            if bounder.weight().is_detect_only() {
                continue;
            }
            let Some((ray, travel)) = travel_ray(bounder) else { continue };
            let Some(entity) = registry.owner(handle.key()) else { continue };
            let center = bounder.center();

            let hit = self.pick_heavy(
                registry,
                &ray,
                Weight(1),
                |other, _| {
                    if criticals.contains(&other) {
                        log::trace!("Sweep of {:?} ignores critical {:?}", handle, other);
                        return false;
                    }
                    registry.owner(other.key()) != Some(entity)
                },
                None,
                travel,
            );
            if let Some((_, hit)) = hit {
                let correction = corrections.entry(entity).or_insert_with(Vec3::zeros);
                *correction = composite_deltas(correction, &(hit.pos - center));
            }
        }

        for (entity, delta) in corrections {
            if self.shift_entity(registry, entity, &delta).is_none() {
                log::warn!("Entity {:?} swept into a surface but has no spatial component to correct", entity);
            }
        }

        for &handle in &criticals {
            let Some(bounder) = registry.get(handle) else { continue };
            let Some((ray, travel)) = travel_ray(bounder) else { continue };
            let Some(entity) = registry.owner(handle.key()) else { continue };

            let mut passed = Vec::new();
            self.pick_heavy(
                registry,
                &ray,
                Weight(1),
                |other, _| registry.owner(other.key()) != Some(entity),
                Some(&mut passed),
                travel,
            );
            for other in passed {
                if !checked.insert(pair(handle, other)) {
                    continue;
                }
                let other_weight = registry.get(other).map_or(Weight::INFINITE, Bounder::weight);
                self.touch(handle, bounder.weight());
                self.touch(other, other_weight);
                announce_contact(registry, mailbox, handle, other);
            }
        }
    }

    /// Test every potential bounder against its index neighbours and gather
    /// the weighted corrections
    fn detect_overlaps(
        &mut self,
        registry: &Registry,
        mailbox: &mut Mailbox,
        checked: &mut BTreeSet<Pair>,
    ) -> BTreeMap<BounderHandle, Vec<(Weight, Vec3)>> {
        let mut contributions: BTreeMap<BounderHandle, Vec<(Weight, Vec3)>> = BTreeMap::new();
        let mut candidates = Vec::new();

        for a in self.potentials.clone() {
            let Some(bounder_a) = registry.get(a) else { continue };
            let owner_a = registry.owner(a.key());
            candidates.clear();
            self.index.filter_element(a, &mut candidates);
            // index traversal order differs between index kinds
            candidates.sort_unstable();
            candidates.dedup();

            for &b in &candidates {
                if b == a || registry.owner(b.key()) == owner_a || !checked.insert(pair(a, b)) {
                    continue;
                }
                let Some(bounder_b) = registry.get(b) else { continue };
                let (wa, wb) = (bounder_a.weight(), bounder_b.weight());
                if wa.is_infinite() && wb.is_infinite() {
                    continue;
                }

                if wa.is_detect_only() || wb.is_detect_only() {
                    if bounder_a.overlap(bounder_b).is_none() {
                        continue;
                    }
                    self.touch(a, wa);
                    self.touch(b, wb);
                } else {
                    let Some(delta) = bounder_a.overlap(bounder_b) else { continue };
                    let (share_a, share_b) = assign(wa, wb, delta);
                    for (handle, share) in [(a, share_a), (b, share_b)] {
                        match share {
                            Share::Nothing => {}
                            Share::Touched => {
                                self.collided.insert(handle);
                            }
                            Share::Pushed { by, delta } => {
                                self.collided.insert(handle);
                                contributions.entry(handle).or_default().push((by, delta));
                            }
                        }
                    }
                }
                announce_contact(registry, mailbox, a, b);
            }
        }
        contributions
    }

    /// Compose one correction per entity and move it
    fn apply_contributions(
        &mut self,
        registry: &mut Registry,
        mailbox: &mut Mailbox,
        contributions: BTreeMap<BounderHandle, Vec<(Weight, Vec3)>>,
    ) {
        let mut per_entity: BTreeMap<EntityId, Vec3> = BTreeMap::new();
        for (handle, mut deltas) in contributions {
            let Some(entity) = registry.owner(handle.key()) else { continue };
            for &(_, delta) in &deltas {
                mailbox.send(
                    Some(entity),
                    CollisionNorm {
                        entity,
                        bounder: handle,
                        norm: safe_norm(&delta),
                    },
                );
            }
            let net = net_delta(&mut deltas);
            let total = per_entity.entry(entity).or_insert_with(Vec3::zeros);
            *total = composite_deltas(total, &net);
        }

        for (entity, delta) in per_entity {
            if delta == Vec3::zeros() {
                continue;
            }
            let Some(bounders) = self.shift_entity(registry, entity, &delta) else {
                log::warn!("Entity {:?} collided but has no spatial component to correct", entity);
                continue;
            };
            for handle in bounders {
                self.potentials.insert(handle);
                self.adjusted.insert(handle);
            }
            mailbox.send(Some(entity), CollisionAdjusted { entity, delta });
        }
    }

    /// Move an entity silently and bring its bounders along.
    /// Returns the moved bounders, or `None` without a spatial component.
    fn shift_entity(&mut self, registry: &mut Registry, entity: EntityId, delta: &Vec3) -> Option<Vec<BounderHandle>> {
        registry.spatial_mut(entity)?.translate_silently(*delta);
        let mut bounders = registry.entity_components_of_type::<Bounder>(entity);
        bounders.retain(|handle| registry.is_live_component(handle.key()));
        for &handle in &bounders {
            let Some(transform) = registry.get(handle).map(|bounder| bounder.world_transform(registry)) else { continue };
            let Some(bounder) = registry.get_mut(handle) else { continue };
            bounder.refresh(&transform);
            let region = bounder.enclosing_aabb();
            self.index.set(handle, region);
        }
        Some(bounders)
    }

    fn touch(&mut self, handle: BounderHandle, weight: Weight) {
        if !weight.is_infinite() {
            self.collided.insert(handle);
        }
    }
}

impl Default for CollisionSystem {
    fn default() -> Self {
        Self::new(CollisionConfig::default())
    }
}

/// Ray from the previous center along this frame's travel, and the travel
/// length. `None` for zero travel.
fn travel_ray(bounder: &Bounder) -> Option<(Ray, f32)> {
    let travel = bounder.travel();
    let length = travel.norm();
    (length > 0.0).then(|| (Ray::new(bounder.prev_center(), travel), length))
}

/// Send `Collision` to both sides of a pair
fn announce_contact(registry: &Registry, mailbox: &mut Mailbox, a: BounderHandle, b: BounderHandle) {
    let (Some(entity_a), Some(entity_b)) = (registry.owner(a.key()), registry.owner(b.key())) else { return };
    mailbox.send(
        Some(entity_a),
        Collision {
            entity: entity_a,
            bounder: a,
            other_entity: entity_b,
            other: b,
        },
    );
    mailbox.send(
        Some(entity_b),
        Collision {
            entity: entity_b,
            bounder: b,
            other_entity: entity_a,
            other: a,
        },
    );
}
