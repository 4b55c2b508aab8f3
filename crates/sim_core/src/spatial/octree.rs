//! Octree over axis-aligned regions
//!
//! Each element is stored at the deepest node whose cube fully contains its
//! region; an element that straddles a node's center plane stays at that
//! node. Nodes live in a slotmap arena and every node keeps an 8-bit mask of
//! which children have anything below them, so queries skip empty octants
//! without touching them.
//!
//! Nodes split lazily: a leaf only fragments once it already holds something
//! and at least one of its elements would move down. Empty subtrees are
//! trimmed as soon as their last element leaves.

use std::collections::HashMap;
use std::hash::Hash;

use slotmap::{new_key_type, SlotMap};

use crate::foundation::geometry::{Aabb, Intersection, Ray};
use crate::foundation::math::Vec3;

new_key_type! {
    struct NodeKey;
}

// Octant index is (z << 2) | (y << 1) | x, bit set = high side of the center.
const X_HIGH: u8 = 0b1010_1010;
const X_LOW: u8 = 0b0101_0101;
const Y_HIGH: u8 = 0b1100_1100;
const Y_LOW: u8 = 0b0011_0011;
const Z_HIGH: u8 = 0b1111_0000;
const Z_LOW: u8 = 0b0000_1111;

const HIGH_MASKS: [u8; 3] = [X_HIGH, Y_HIGH, Z_HIGH];
const LOW_MASKS: [u8; 3] = [X_LOW, Y_LOW, Z_LOW];

#[derive(Debug)]
struct Node<T> {
    cube: Aabb,
    parent: Option<NodeKey>,
    /// Index of this node in its parent's children
    octant: u8,
    children: Option<[NodeKey; 8]>,
    /// Bit i set when child i's subtree holds at least one element
    active: u8,
    elements: Vec<T>,
}

impl<T> Node<T> {
    fn new(cube: Aabb, parent: Option<NodeKey>, octant: u8) -> Self {
        Self {
            cube,
            parent,
            octant,
            children: None,
            active: 0,
            elements: Vec::new(),
        }
    }
}

/// Octree keyed by element
#[derive(Debug)]
pub struct Octree<T: Copy + Eq + Hash> {
    nodes: SlotMap<NodeKey, Node<T>>,
    root: NodeKey,
    bounds: Aabb,
    min_cell_size: f32,
    placements: HashMap<T, (NodeKey, Aabb)>,
}

impl<T: Copy + Eq + Hash> Octree<T> {
    /// Create an empty tree covering `bounds`.
    ///
    /// The root is the cube centered on `bounds` with half-size equal to its
    /// largest half-extent. Nodes never split below `min_cell_size`.
    pub fn new(bounds: Aabb, min_cell_size: f32) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(root_cube(&bounds), None, 0));
        Self {
            nodes,
            root,
            bounds,
            min_cell_size,
            placements: HashMap::new(),
        }
    }

    /// Region the tree was created with
    pub const fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// The root cube
    pub fn root_cube(&self) -> Aabb {
        self.nodes[self.root].cube
    }

    /// Smallest cell edge a split may produce
    pub const fn min_cell_size(&self) -> f32 {
        self.min_cell_size
    }

    /// Number of stored elements
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether `element` is stored
    pub fn contains(&self, element: T) -> bool {
        self.placements.contains_key(&element)
    }

    /// Region `element` was last set with
    pub fn region_of(&self, element: T) -> Option<Aabb> {
        self.placements.get(&element).map(|&(_, region)| region)
    }

    /// Depth of the node holding `element` (root = 0)
    pub fn depth_of(&self, element: T) -> Option<usize> {
        let &(mut node, _) = self.placements.get(&element)?;
        let mut depth = 0;
        while let Some(parent) = self.nodes[node].parent {
            node = parent;
            depth += 1;
        }
        Some(depth)
    }

    /// Stored elements with their regions, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (T, &Aabb)> + '_ {
        self.placements.iter().map(|(&element, (_, region))| (element, region))
    }

    /// Remove every element and node below the root
    pub fn clear(&mut self) {
        let cube = self.root_cube();
        self.nodes.clear();
        self.root = self.nodes.insert(Node::new(cube, None, 0));
        self.placements.clear();
    }

    /// Insert or move `element`.
    ///
    /// Returns false, leaving the element out of the tree, when `region` does
    /// not touch the root cube. With non-cubic `bounds` the root cube reaches
    /// past them along the shorter axes, and regions there are still accepted.
    pub fn set(&mut self, element: T, region: Aabb) -> bool {
        let old = self.placements.remove(&element).map(|(node, _)| node);
        if let Some(node) = old {
            self.nodes[node].elements.retain(|&e| e != element);
        }

        if !self.root_cube().intersects(&region) {
            if let Some(node) = old {
                self.trim(node);
            }
            return false;
        }

        let mut start = old.unwrap_or(self.root);
        while !self.nodes[start].cube.contains(&region) {
            match self.nodes[start].parent {
                Some(parent) => start = parent,
                None => break,
            }
        }
        self.add_down(start, element, region);

        if let Some(node) = old {
            self.trim(node);
        }
        true
    }

    /// Take `element` out of the tree
    pub fn remove(&mut self, element: T) -> bool {
        let Some((node, _)) = self.placements.remove(&element) else { return false };
        self.nodes[node].elements.retain(|&e| e != element);
        self.trim(node);
        true
    }

    /// Elements stored at every node the query region reaches.
    ///
    /// This is a broad phase: the result is a superset of the elements whose
    /// regions actually intersect `region`.
    pub fn filter_region(&self, region: &Aabb, out: &mut Vec<T>) {
        self.filter_region_from(self.root, region, out);
    }

    /// Elements stored at every node whose cube passes `pred`. Children are
    /// only visited below nodes that pass.
    pub fn filter_nodes<F>(&self, mut pred: F, out: &mut Vec<T>)
    where
        F: FnMut(&Aabb) -> bool,
    {
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            if !pred(&node.cube) {
                continue;
            }
            out.extend_from_slice(&node.elements);
            if let Some(children) = node.children {
                stack.extend(active_children(&children, node.active));
            }
        }
    }

    /// Candidates that may overlap `element`: everything stored at its node's
    /// ancestors plus a region query from its own node down. The element
    /// itself is included.
    pub fn filter_element(&self, element: T, out: &mut Vec<T>) {
        let Some(&(node, region)) = self.placements.get(&element) else { return };
        let mut ancestor = self.nodes[node].parent;
        while let Some(key) = ancestor {
            out.extend_from_slice(&self.nodes[key].elements);
            ancestor = self.nodes[key].parent;
        }
        self.filter_region_from(node, &region, out);
    }

    /// Nearest element hit by `ray`, visiting octants front to back.
    ///
    /// `intersect` tests one element; hits with negative distance are ignored.
    pub fn cast_ray<F>(&self, ray: &Ray, mut intersect: F) -> Option<(T, Intersection)>
    where
        F: FnMut(&Ray, T) -> Option<Intersection>,
    {
        let (t0, t1) = self.root_cube().ray_slab(ray)?;
        let mut best = None;
        self.cast_ray_node(self.root, ray, t0.max(0.0), t1, &mut intersect, &mut best);
        best
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn can_split(&self, key: NodeKey) -> bool {
        let cube = &self.nodes[key].cube;
        (cube.max.x - cube.min.x) * 0.5 >= self.min_cell_size
    }

    /// Child index `region` fits in below `key`, if it fits in one at all
    fn fitting_octant(&self, key: NodeKey, region: &Aabb) -> Option<usize> {
        let cube = &self.nodes[key].cube;
        if !cube.contains(region) {
            return None;
        }
        octant_of(&cube.center(), region)
    }

    fn add_down(&mut self, start: NodeKey, element: T, region: Aabb) {
        let mut key = start;
        loop {
            if self.nodes[key].children.is_none() && self.should_split(key, &region) {
                self.split(key);
            }

            let node = &self.nodes[key];
            let next = node
                .children
                .and_then(|children| self.fitting_octant(key, &region).map(|i| (i, children[i])));
            match next {
                Some((octant, child)) => {
                    self.nodes[key].active |= 1u8 << octant;
                    key = child;
                }
                None => {
                    self.nodes[key].elements.push(element);
                    self.placements.insert(element, (key, region));
                    return;
                }
            }
        }
    }

    fn should_split(&self, key: NodeKey, region: &Aabb) -> bool {
        let node = &self.nodes[key];
        if node.elements.is_empty() || !self.can_split(key) {
            return false;
        }
        self.fitting_octant(key, region).is_some()
            || node.elements.iter().any(|element| {
                self.placements
                    .get(element)
                    .is_some_and(|(_, r)| self.fitting_octant(key, r).is_some())
            })
    }

    /// Create the eight children of a leaf and move down whatever fits
    fn split(&mut self, key: NodeKey) {
        let cube = self.nodes[key].cube;
        let center = cube.center();
        let quarter = cube.extents() * 0.5;

        let mut children = [NodeKey::default(); 8];
        for (octant, slot) in children.iter_mut().enumerate() {
            let sign = |bit: usize| if octant & bit != 0 { 1.0 } else { -1.0 };
            let child_center = center + Vec3::new(quarter.x * sign(1), quarter.y * sign(2), quarter.z * sign(4));
            let child_cube = Aabb::from_center_extents(child_center, quarter);
            *slot = self.nodes.insert(Node::new(child_cube, Some(key), octant as u8));
        }
        self.nodes[key].children = Some(children);

        let elements = std::mem::take(&mut self.nodes[key].elements);
        for element in elements {
            let region = match self.placements.get(&element) {
                Some(&(_, region)) => region,
                None => continue,
            };
            let target = match octant_of(&center, &region) {
                Some(octant) if cube.contains(&region) => {
                    self.nodes[key].active |= 1u8 << octant;
                    children[octant]
                }
                _ => key,
            };
            self.nodes[target].elements.push(element);
            self.placements.insert(element, (target, region));
        }
    }

    /// Walk up from `key`, pruning subtrees left without elements
    fn trim(&mut self, key: NodeKey) {
        let mut current = key;
        loop {
            let node = &mut self.nodes[current];
            if !node.elements.is_empty() || node.active != 0 {
                return;
            }
            if let Some(children) = node.children.take() {
                for child in children {
                    self.remove_subtree(child);
                }
            }
            let node = &self.nodes[current];
            let Some(parent) = node.parent else { return };
            let bit = 1u8 << node.octant;
            self.nodes[parent].active &= !bit;
            current = parent;
        }
    }

    fn remove_subtree(&mut self, key: NodeKey) {
        let mut stack = vec![key];
        while let Some(key) = stack.pop() {
            if let Some(node) = self.nodes.remove(key) {
                if let Some(children) = node.children {
                    stack.extend(children);
                }
            }
        }
    }

    fn filter_region_from(&self, start: NodeKey, region: &Aabb, out: &mut Vec<T>) {
        let mut stack = vec![start];
        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            out.extend_from_slice(&node.elements);
            let Some(children) = node.children else { continue };

            let center = node.cube.center();
            let mut mask = node.active;
            for axis in 0..3 {
                if region.min[axis] > center[axis] {
                    mask &= HIGH_MASKS[axis];
                } else if region.max[axis] < center[axis] {
                    mask &= LOW_MASKS[axis];
                }
            }
            stack.extend(
                active_children(&children, mask).filter(|&child| self.nodes[child].cube.intersects(region)),
            );
        }
    }

    fn cast_ray_node<F>(
        &self,
        key: NodeKey,
        ray: &Ray,
        t_enter: f32,
        t_exit: f32,
        intersect: &mut F,
        best: &mut Option<(T, Intersection)>,
    ) where
        F: FnMut(&Ray, T) -> Option<Intersection>,
    {
        let node = &self.nodes[key];
        for &element in &node.elements {
            let Some(hit) = intersect(ray, element) else { continue };
            if hit.dist >= 0.0 && best.as_ref().map_or(true, |(_, b)| hit.dist < b.dist) {
                *best = Some((element, hit));
            }
        }

        let Some(children) = node.children else { return };
        if node.active == 0 {
            return;
        }

        let center = node.cube.center();
        let mut octant = 0usize;
        let mut crossings: Vec<(f32, usize)> = Vec::with_capacity(3);
        for axis in 0..3 {
            let d = ray.direction[axis];
            let o = ray.origin[axis];
            let tc = if d == 0.0 { f32::INFINITY } else { (center[axis] - o) / d };
            let high = if d == 0.0 {
                o >= center[axis]
            } else if tc > t_enter {
                d < 0.0
            } else {
                d > 0.0
            };
            if high {
                octant |= 1 << axis;
            }
            if tc > t_enter && tc < t_exit {
                crossings.push((tc, axis));
            }
        }
        crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut segment_start = t_enter;
        let mut segments = Vec::with_capacity(4);
        for &(tc, axis) in &crossings {
            segments.push((octant, segment_start, tc));
            octant ^= 1 << axis;
            segment_start = tc;
        }
        segments.push((octant, segment_start, t_exit));

        for (octant, start, end) in segments {
            if best.as_ref().is_some_and(|(_, b)| b.dist < start) {
                return;
            }
            if node.active & (1u8 << octant) != 0 {
                self.cast_ray_node(children[octant], ray, start, end, intersect, best);
            }
        }
    }
}

/// Cube centered on `bounds` with half-size equal to its largest half-extent
fn root_cube(bounds: &Aabb) -> Aabb {
    let extents = bounds.extents();
    let half = extents.x.max(extents.y).max(extents.z);
    Aabb::from_center_extents(bounds.center(), Vec3::new(half, half, half))
}

/// Octant of `region` relative to `center`, or `None` when it straddles a
/// center plane
fn octant_of(center: &Vec3, region: &Aabb) -> Option<usize> {
    let mut octant = 0;
    for axis in 0..3 {
        if region.max[axis] <= center[axis] {
            continue;
        }
        if region.min[axis] >= center[axis] {
            octant |= 1 << axis;
        } else {
            return None;
        }
    }
    Some(octant)
}

fn active_children(children: &[NodeKey; 8], mask: u8) -> impl Iterator<Item = NodeKey> + '_ {
    (0..8usize).filter(move |&i| mask & (1u8 << i) != 0).map(move |i| children[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube(center: Vec3, half: f32) -> Aabb {
        Aabb::from_center_extents(center, Vec3::new(half, half, half))
    }

    fn world() -> Octree<u32> {
        Octree::new(cube(Vec3::zeros(), 64.0), 1.0)
    }

    #[test]
    fn root_is_a_cube_over_the_largest_extent() {
        let tree: Octree<u32> = Octree::new(Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 2.0, 4.0)), 1.0);
        let root = tree.root_cube();
        assert_relative_eq!(root.center(), Vec3::new(5.0, 1.0, 2.0));
        assert_relative_eq!(root.extents(), Vec3::new(5.0, 5.0, 5.0));
    }

    #[test]
    fn elements_sit_in_a_containing_cube() {
        let mut tree = world();
        let regions = [
            cube(Vec3::new(10.0, 10.0, 10.0), 0.5),
            cube(Vec3::new(-20.0, 5.0, 30.0), 0.5),
            cube(Vec3::new(0.0, 0.0, 0.0), 2.0),
            cube(Vec3::new(40.0, -40.0, 40.0), 3.0),
        ];
        for (i, region) in regions.iter().enumerate() {
            assert!(tree.set(i as u32, *region));
        }
        for (i, region) in regions.iter().enumerate() {
            let (node, _) = tree.placements[&(i as u32)];
            assert!(tree.nodes[node].cube.contains(region), "element {i} escaped its node");
        }
        // the straddler stays at the root
        assert_eq!(tree.depth_of(2), Some(0));
        assert!(tree.depth_of(0).unwrap() > 0);
    }

    #[test]
    fn set_outside_root_is_rejected() {
        let mut tree = world();
        assert!(tree.set(1, cube(Vec3::new(10.0, 0.0, 0.0), 1.0)));
        assert!(!tree.set(1, cube(Vec3::new(500.0, 0.0, 0.0), 1.0)));
        assert!(!tree.contains(1));
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn acceptance_follows_the_root_cube_not_the_bounds() {
        let mut tree: Octree<u32> = Octree::new(Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 2.0, 4.0)), 1.0);
        // above the configured box but inside the cube
        assert!(tree.set(1, cube(Vec3::new(5.0, 5.0, 2.0), 0.5)));
        assert!(!tree.set(2, cube(Vec3::new(5.0, 7.0, 2.0), 0.5)));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn set_then_remove_restores_placements() {
        let mut tree = world();
        tree.set(1, cube(Vec3::new(10.0, 10.0, 10.0), 0.5));
        tree.set(2, cube(Vec3::new(-10.0, -10.0, -10.0), 0.5));
        let nodes = tree.node_count();
        let depths = (tree.depth_of(1), tree.depth_of(2));

        // straddles the root center, so it cannot cause a split
        tree.set(3, cube(Vec3::zeros(), 1.0));
        assert_eq!(tree.depth_of(3), Some(0));
        assert!(tree.remove(3));

        assert_eq!(tree.node_count(), nodes);
        assert_eq!((tree.depth_of(1), tree.depth_of(2)), depths);
        assert!(!tree.remove(3));
    }

    #[test]
    fn removing_everything_trims_to_the_root() {
        let mut tree = world();
        for i in 0..20u32 {
            let f = i as f32;
            tree.set(i, cube(Vec3::new(f * 3.0 - 30.0, f - 10.0, 20.0 - f * 2.0), 0.25));
        }
        assert!(tree.node_count() > 1);
        for i in 0..20u32 {
            assert!(tree.remove(i));
        }
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.nodes[tree.root].active, 0);
    }

    #[test]
    fn moving_an_element_follows_it() {
        let mut tree = world();
        tree.set(1, cube(Vec3::new(30.0, 30.0, 30.0), 0.5));
        tree.set(2, cube(Vec3::new(31.0, 31.0, 31.0), 0.5));
        assert!(tree.set(1, cube(Vec3::new(-30.0, -30.0, -30.0), 0.5)));

        let mut found = Vec::new();
        tree.filter_region(&cube(Vec3::new(-30.0, -30.0, -30.0), 1.0), &mut found);
        assert!(found.contains(&1));
        assert!(!found.contains(&2));
        assert_relative_eq!(tree.region_of(1).unwrap().center(), Vec3::new(-30.0, -30.0, -30.0));
    }

    #[test]
    fn region_query_prunes_far_octants() {
        let mut tree = world();
        tree.set(1, cube(Vec3::new(20.0, 20.0, 20.0), 0.5));
        tree.set(2, cube(Vec3::new(-20.0, -20.0, -20.0), 0.5));
        tree.set(3, cube(Vec3::new(20.0, -20.0, 20.0), 0.5));

        let mut found = Vec::new();
        tree.filter_region(&cube(Vec3::new(20.0, 20.0, 20.0), 2.0), &mut found);
        assert!(found.contains(&1));
        assert!(!found.contains(&2));
        assert!(!found.contains(&3));
    }

    #[test]
    fn filter_nodes_respects_predicate() {
        let mut tree = world();
        tree.set(1, cube(Vec3::new(20.0, 20.0, 20.0), 0.5));
        tree.set(2, cube(Vec3::new(-20.0, -20.0, -20.0), 0.5));

        let mut found = Vec::new();
        tree.filter_nodes(|cube| cube.max.x > 0.0, &mut found);
        assert!(found.contains(&1));
        assert!(!found.contains(&2));
    }

    #[test]
    fn filter_element_sees_ancestors_and_neighbours() {
        let mut tree = world();
        tree.set(1, cube(Vec3::new(20.0, 20.0, 20.0), 0.5));
        tree.set(2, cube(Vec3::new(20.5, 20.0, 20.0), 0.5));
        tree.set(3, cube(Vec3::zeros(), 5.0));
        tree.set(4, cube(Vec3::new(-20.0, -20.0, -20.0), 0.5));

        let mut found = Vec::new();
        tree.filter_element(1, &mut found);
        assert!(found.contains(&1));
        assert!(found.contains(&2));
        assert!(found.contains(&3));
        assert!(!found.contains(&4));
    }

    #[test]
    fn ray_returns_nearest_hit() {
        let mut tree = world();
        let boxes = [
            (1, cube(Vec3::new(0.0, 0.0, 10.0), 1.0)),
            (2, cube(Vec3::new(0.0, 0.0, 30.0), 1.0)),
            (3, cube(Vec3::new(0.0, 0.0, -30.0), 1.0)),
            (4, cube(Vec3::new(30.0, 30.0, 30.0), 1.0)),
        ];
        for (id, region) in boxes {
            tree.set(id, region);
        }
        let lookup: HashMap<u32, Aabb> = boxes.into_iter().collect();

        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 1.0));
        let (id, hit) = tree.cast_ray(&ray, |ray, id| lookup[&id].intersect_ray(ray)).unwrap();
        assert_eq!(id, 1);
        assert_relative_eq!(hit.dist, 14.0);

        let back = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, -1.0));
        let (id, hit) = tree.cast_ray(&back, |ray, id| lookup[&id].intersect_ray(ray)).unwrap();
        assert_eq!(id, 3);
        assert_relative_eq!(hit.dist, 24.0);

        let miss = Ray::new(Vec3::new(0.0, 100.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        assert!(tree.cast_ray(&miss, |ray, id| lookup[&id].intersect_ray(ray)).is_none());
    }

    #[test]
    fn clear_keeps_the_root() {
        let mut tree = world();
        tree.set(1, cube(Vec3::new(5.0, 5.0, 5.0), 0.5));
        tree.set(2, cube(Vec3::new(-5.0, 5.0, 5.0), 0.5));
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1);
        assert!(tree.set(1, cube(Vec3::new(5.0, 5.0, 5.0), 0.5)));
    }
}
