//! Abstract spatial index used by the collision broad phase
//!
//! The collision system only talks to [`SpatialIndex`], so the octree can be
//! swapped for the brute-force [`LinearIndex`] (or back) at runtime without
//! changing results, only cost.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use crate::foundation::geometry::{Aabb, Intersection, Ray};
use crate::spatial::Octree;

/// Element lookup by region and by ray
pub trait SpatialIndex<T: Copy + Eq + Hash>: fmt::Debug {
    /// Insert or move an element. Returns false when the index cannot hold
    /// `region`; the element is then no longer stored.
    fn set(&mut self, element: T, region: Aabb) -> bool;

    /// Remove an element, returning whether it was stored
    fn remove(&mut self, element: T) -> bool;

    /// Whether an element is stored
    fn contains(&self, element: T) -> bool;

    /// Number of stored elements
    fn len(&self) -> usize;

    /// Whether nothing is stored
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove everything
    fn clear(&mut self);

    /// Candidates whose region may intersect `region`
    fn filter_region(&self, region: &Aabb, out: &mut Vec<T>);

    /// Candidates that may overlap a stored element, the element included
    fn filter_element(&self, element: T, out: &mut Vec<T>);

    /// Nearest element hit by `ray`, as decided by `intersect`
    fn cast_ray(
        &self,
        ray: &Ray,
        intersect: &mut dyn FnMut(&Ray, T) -> Option<Intersection>,
    ) -> Option<(T, Intersection)>;

    /// Octree backing this index, if any
    fn as_octree(&self) -> Option<&Octree<T>> {
        None
    }
}

impl<T: Copy + Eq + Hash + fmt::Debug> SpatialIndex<T> for Octree<T> {
    fn set(&mut self, element: T, region: Aabb) -> bool {
        Octree::set(self, element, region)
    }

    fn remove(&mut self, element: T) -> bool {
        Octree::remove(self, element)
    }

    fn contains(&self, element: T) -> bool {
        Octree::contains(self, element)
    }

    fn len(&self) -> usize {
        Octree::len(self)
    }

    fn clear(&mut self) {
        Octree::clear(self);
    }

    fn filter_region(&self, region: &Aabb, out: &mut Vec<T>) {
        Octree::filter_region(self, region, out);
    }

    fn filter_element(&self, element: T, out: &mut Vec<T>) {
        Octree::filter_element(self, element, out);
    }

    fn cast_ray(
        &self,
        ray: &Ray,
        intersect: &mut dyn FnMut(&Ray, T) -> Option<Intersection>,
    ) -> Option<(T, Intersection)> {
        Octree::cast_ray(self, ray, |ray, element| intersect(ray, element))
    }

    fn as_octree(&self) -> Option<&Octree<T>> {
        Some(self)
    }
}

/// Brute-force index: every query scans every element, in ascending element
/// order
#[derive(Debug, Clone)]
pub struct LinearIndex<T> {
    regions: BTreeMap<T, Aabb>,
}

impl<T: Copy + Ord> LinearIndex<T> {
    /// Create an empty index
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
        }
    }
}

impl<T: Copy + Ord> Default for LinearIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Eq + Hash + Ord + fmt::Debug> SpatialIndex<T> for LinearIndex<T> {
    fn set(&mut self, element: T, region: Aabb) -> bool {
        self.regions.insert(element, region);
        true
    }

    fn remove(&mut self, element: T) -> bool {
        self.regions.remove(&element).is_some()
    }

    fn contains(&self, element: T) -> bool {
        self.regions.contains_key(&element)
    }

    fn len(&self) -> usize {
        self.regions.len()
    }

    fn clear(&mut self) {
        self.regions.clear();
    }

    fn filter_region(&self, region: &Aabb, out: &mut Vec<T>) {
        out.extend(
            self.regions
                .iter()
                .filter(|(_, r)| r.intersects(region))
                .map(|(&element, _)| element),
        );
    }

    fn filter_element(&self, element: T, out: &mut Vec<T>) {
        if let Some(region) = self.regions.get(&element) {
            self.filter_region(region, out);
        }
    }

    fn cast_ray(
        &self,
        ray: &Ray,
        intersect: &mut dyn FnMut(&Ray, T) -> Option<Intersection>,
    ) -> Option<(T, Intersection)> {
        let mut best: Option<(T, Intersection)> = None;
        for &element in self.regions.keys() {
            let Some(hit) = intersect(ray, element) else { continue };
            if hit.dist >= 0.0 && best.as_ref().map_or(true, |(_, b)| hit.dist < b.dist) {
                best = Some((element, hit));
            }
        }
        best
    }
}
