//! Bounder shapes and their pairwise tests
//!
//! Shapes are a closed set, so every test is a `match` over the pair instead
//! of a virtual call. Boxes stay axis-aligned and capsules stay upright in
//! world space; rotating a bounder re-fits its box and leaves capsules
//! vertical.

use crate::foundation::geometry::{Aabb, Capsule, Intersection, Ray, Sphere};
use crate::foundation::math::{Transform, Vec3};

/// Volume a bounder occupies
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BounderShape {
    /// Axis-aligned box
    Box(Aabb),
    /// Sphere
    Sphere(Sphere),
    /// Upright capsule
    Capsule(Capsule),
}

impl BounderShape {
    /// Center of the shape
    pub fn center(&self) -> Vec3 {
        match self {
            Self::Box(b) => b.center(),
            Self::Sphere(s) => s.center,
            Self::Capsule(c) => c.center,
        }
    }

    /// Enclosed volume
    pub fn volume(&self) -> f32 {
        match self {
            Self::Box(b) => b.volume(),
            Self::Sphere(s) => s.volume(),
            Self::Capsule(c) => c.volume(),
        }
    }

    /// Smallest distance from the center to the surface along an axis
    pub fn min_half_extent(&self) -> f32 {
        match self {
            Self::Box(b) => b.extents().min(),
            Self::Sphere(s) => s.radius,
            Self::Capsule(c) => c.radius,
        }
    }
}

/// `shape` placed in the world by `transform`.
///
/// * box: the box around the eight transformed corners
/// * sphere: radius times the largest absolute scale
/// * capsule: stays upright; radius scales with the larger horizontal scale
///   and height with the vertical one
pub fn transformed(shape: &BounderShape, transform: &Transform) -> BounderShape {
    let scale = transform.scale.abs();
    match shape {
        BounderShape::Box(b) => {
            let corners: Vec<Vec3> = (0..8)
                .map(|i| {
                    let corner = Vec3::new(
                        if i & 1 != 0 { b.max.x } else { b.min.x },
                        if i & 2 != 0 { b.max.y } else { b.min.y },
                        if i & 4 != 0 { b.max.z } else { b.min.z },
                    );
                    transform.transform_point(&corner)
                })
                .collect();
            BounderShape::Box(Aabb::from_points(&corners).unwrap_or(*b))
        }
        BounderShape::Sphere(s) => BounderShape::Sphere(Sphere::new(
            transform.transform_point(&s.center),
            s.radius * scale.max(),
        )),
        BounderShape::Capsule(c) => BounderShape::Capsule(Capsule::new(
            transform.transform_point(&c.center),
            c.radius * scale.x.max(scale.z),
            c.height * scale.y,
        )),
    }
}

/// Tight axis-aligned box around the shape
pub fn enclosing_aabb(shape: &BounderShape) -> Aabb {
    match shape {
        BounderShape::Box(b) => *b,
        BounderShape::Sphere(s) => s.aabb(),
        BounderShape::Capsule(c) => c.aabb(),
    }
}

/// Sphere around the shape, centered on it
pub fn enclosing_sphere(shape: &BounderShape) -> Sphere {
    match shape {
        BounderShape::Box(b) => Sphere::new(b.center(), b.extents().norm()),
        BounderShape::Sphere(s) => *s,
        BounderShape::Capsule(c) => Sphere::new(c.center, c.height * 0.5 + c.radius),
    }
}

/// Nearest hit of `ray` on the shape; distance 0 when the ray starts inside
pub fn intersect_ray(shape: &BounderShape, ray: &Ray) -> Option<Intersection> {
    match shape {
        BounderShape::Box(b) => b.intersect_ray(ray),
        BounderShape::Sphere(s) => s.intersect_ray(ray),
        BounderShape::Capsule(c) => c.intersect_ray(ray),
    }
}

/// Penetration test. On overlap returns the smallest translation that moves
/// `a` out of `b`; touching surfaces do not count.
pub fn overlap(a: &BounderShape, b: &BounderShape) -> Option<Vec3> {
    use BounderShape::{Box as B, Capsule as C, Sphere as S};
    match (a, b) {
        (B(a), B(b)) => box_box(a, b),
        (S(a), S(b)) => sphere_sphere(a, b),
        (S(a), B(b)) => sphere_box(a, b),
        (B(a), S(b)) => sphere_box(b, a).map(|d| -d),
        (C(a), S(b)) => sphere_sphere(&core_sphere(a, b.center.y), b),
        (S(a), C(b)) => sphere_sphere(a, &core_sphere(b, a.center.y)),
        (C(a), B(b)) => sphere_box(&capsule_sphere_toward(a, b.min.y, b.max.y), b),
        (B(a), C(b)) => sphere_box(&capsule_sphere_toward(b, a.min.y, a.max.y), a).map(|d| -d),
        (C(a), C(b)) => {
            let (ya, yb) = facing_heights(a, b);
            sphere_sphere(&core_sphere(a, ya), &core_sphere(b, yb))
        }
    }
}

fn box_box(a: &Aabb, b: &Aabb) -> Option<Vec3> {
    let mut best: Option<(usize, f32)> = None;
    for axis in 0..3 {
        let depth = a.max[axis].min(b.max[axis]) - a.min[axis].max(b.min[axis]);
        if depth <= 0.0 {
            return None;
        }
        if best.map_or(true, |(_, d)| depth < d) {
            best = Some((axis, depth));
        }
    }
    let (axis, depth) = best?;
    let mut delta = Vec3::zeros();
    delta[axis] = if a.center()[axis] < b.center()[axis] { -depth } else { depth };
    Some(delta)
}

fn sphere_sphere(a: &Sphere, b: &Sphere) -> Option<Vec3> {
    let offset = a.center - b.center;
    let dist = offset.norm();
    let depth = a.radius + b.radius - dist;
    if depth <= 0.0 {
        return None;
    }
    let dir = if dist > 0.0 { offset / dist } else { Vec3::y() };
    Some(dir * depth)
}

/// Delta moving the sphere out of the box
fn sphere_box(s: &Sphere, b: &Aabb) -> Option<Vec3> {
    let closest = b.closest_point(&s.center);
    let offset = s.center - closest;
    let dist_sq = offset.norm_squared();

    if dist_sq == 0.0 {
        // center inside: leave through the nearest face
        let mut best = (f32::INFINITY, Vec3::zeros());
        for axis in 0..3 {
            let to_min = s.center[axis] - b.min[axis];
            let to_max = b.max[axis] - s.center[axis];
            if to_min < best.0 {
                let mut n = Vec3::zeros();
                n[axis] = -1.0;
                best = (to_min, n);
            }
            if to_max < best.0 {
                let mut n = Vec3::zeros();
                n[axis] = 1.0;
                best = (to_max, n);
            }
        }
        let (dist, norm) = best;
        return Some(norm * (dist + s.radius));
    }

    if dist_sq >= s.radius * s.radius {
        return None;
    }
    let dist = dist_sq.sqrt();
    Some(offset / dist * (s.radius - dist))
}

/// Capsule cross-section sphere at height `y`, clamped to the core
fn core_sphere(c: &Capsule, y: f32) -> Sphere {
    let core = c.closest_core_point(&Vec3::new(c.center.x, y, c.center.z));
    Sphere::new(core, c.radius)
}

/// Sphere on the capsule core nearest the vertical range `[lo, hi]`: the
/// middle of the shared range when the ranges overlap, else the facing end
fn capsule_sphere_toward(c: &Capsule, lo: f32, hi: f32) -> Sphere {
    let (bottom, top) = (c.bottom().y, c.top().y);
    let shared_lo = bottom.max(lo);
    let shared_hi = top.min(hi);
    let y = if shared_lo <= shared_hi {
        (shared_lo + shared_hi) * 0.5
    } else if top < lo {
        top
    } else {
        bottom
    };
    core_sphere(c, y)
}

/// Heights on each capsule core where the two are closest vertically
fn facing_heights(a: &Capsule, b: &Capsule) -> (f32, f32) {
    let (a_lo, a_hi) = (a.bottom().y, a.top().y);
    let (b_lo, b_hi) = (b.bottom().y, b.top().y);
    let lo = a_lo.max(b_lo);
    let hi = a_hi.min(b_hi);
    if lo <= hi {
        let mid = (lo + hi) * 0.5;
        (mid, mid)
    } else if a_hi < b_lo {
        (a_hi, b_lo)
    } else {
        (a_lo, b_hi)
    }
}
