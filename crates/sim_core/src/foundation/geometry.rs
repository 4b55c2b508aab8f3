//! Geometric primitives shared by the spatial index and the collision shapes
//!
//! Everything here is plain data with closed-form tests. Rays are expected to
//! carry a unit direction; `Ray::new` normalizes for you.

use crate::foundation::math::{solve_quadratic, Vec3};

/// A ray for ray casting and picking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// The origin point of the ray in world space
    pub origin: Vec3,
    /// The direction of the ray (unit length)
    pub direction: Vec3,
}

impl Ray {
    /// Creates a new ray, normalizing the direction.
    ///
    /// A zero direction yields NaN components; callers special-case
    /// zero-length travel before building a ray.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get a point along the ray at distance t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Same direction, origin moved `t` along the ray
    pub fn advanced(&self, t: f32) -> Self {
        Self {
            origin: self.point_at(t),
            direction: self.direction,
        }
    }
}

/// Where and how a ray met a shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Distance from the ray origin, never negative
    pub dist: f32,
    /// Hit point in world space
    pub pos: Vec3,
    /// Outward surface normal at the hit point
    pub norm: Vec3,
}

impl Intersection {
    /// Hit reported when the ray starts inside a shape
    fn at_origin(ray: &Ray) -> Self {
        Self {
            dist: 0.0,
            pos: ray.origin,
            norm: -ray.direction,
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box holding every point; `None` for an empty slice
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut min = *first;
        let mut max = *first;
        for p in rest {
            min = min.inf(p);
            max = max.sup(p);
        }
        Some(Self { min, max })
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Product of the side lengths
    pub fn volume(&self) -> f32 {
        let size = self.max - self.min;
        size.x * size.y * size.z
    }

    /// Box covering both inputs
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Same box shifted by `delta`
    pub fn translated(&self, delta: &Vec3) -> Self {
        Self {
            min: self.min + delta,
            max: self.max + delta,
        }
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: &Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// All six faces of `other` lie within this box
    pub fn contains(&self, other: &Self) -> bool {
        other.min.x >= self.min.x && other.max.x <= self.max.x &&
        other.min.y >= self.min.y && other.max.y <= self.max.y &&
        other.min.z >= self.min.z && other.max.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Point of the box nearest to `p` (p itself when inside)
    pub fn closest_point(&self, p: &Vec3) -> Vec3 {
        p.sup(&self.min).inf(&self.max)
    }

    /// Slab test, returning the parametric entry and exit distances.
    ///
    /// A zero direction component turns into an infinite slab on that axis.
    /// Misses, boxes behind the origin, and NaN produced by degenerate rays
    /// are all rejected by the `t_max > t_min` check.
    pub fn ray_slab(&self, ray: &Ray) -> Option<(f32, f32)> {
        let inv_dir = Vec3::new(
            if ray.direction.x != 0.0 { 1.0 / ray.direction.x } else { f32::INFINITY },
            if ray.direction.y != 0.0 { 1.0 / ray.direction.y } else { f32::INFINITY },
            if ray.direction.z != 0.0 { 1.0 / ray.direction.z } else { f32::INFINITY },
        );

        let t1 = (self.min.x - ray.origin.x) * inv_dir.x;
        let t2 = (self.max.x - ray.origin.x) * inv_dir.x;
        let t3 = (self.min.y - ray.origin.y) * inv_dir.y;
        let t4 = (self.max.y - ray.origin.y) * inv_dir.y;
        let t5 = (self.min.z - ray.origin.z) * inv_dir.z;
        let t6 = (self.max.z - ray.origin.z) * inv_dir.z;

        let tmin = t1.min(t2).max(t3.min(t4)).max(t5.min(t6));
        let tmax = t1.max(t2).min(t3.max(t4)).min(t5.max(t6));

        if tmax > tmin && tmax >= 0.0 {
            Some((tmin, tmax))
        } else {
            None
        }
    }

    /// Nearest hit on the box surface, or distance 0 when starting inside
    pub fn intersect_ray(&self, ray: &Ray) -> Option<Intersection> {
        if self.contains_point(&ray.origin) {
            return Some(Intersection::at_origin(ray));
        }
        let (tmin, _) = self.ray_slab(ray)?;
        if tmin < 0.0 {
            return None;
        }
        let pos = ray.point_at(tmin);
        Some(Intersection {
            dist: tmin,
            pos,
            norm: self.face_normal(&pos),
        })
    }

    /// Outward normal of the face nearest to `p`
    fn face_normal(&self, p: &Vec3) -> Vec3 {
        let mut best = (f32::INFINITY, Vec3::zeros());
        for axis in 0..3 {
            let to_min = (p[axis] - self.min[axis]).abs();
            let to_max = (self.max[axis] - p[axis]).abs();
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
        best.1
    }
}

/// A sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// The center position of the sphere
    pub center: Vec3,
    /// The radius of the sphere
    pub radius: f32,
}

impl Sphere {
    /// Creates a new sphere with the given center and radius
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Tight bounding box
    pub fn aabb(&self) -> Aabb {
        Aabb::from_center_extents(self.center, Vec3::repeat(self.radius))
    }

    /// Volume of the ball
    pub fn volume(&self) -> f32 {
        4.0 / 3.0 * std::f32::consts::PI * self.radius.powi(3)
    }

    /// Test ray intersection with this sphere
    pub fn intersect_ray(&self, ray: &Ray) -> Option<Intersection> {
        let oc = ray.origin - self.center;
        if oc.norm_squared() <= self.radius * self.radius {
            return Some(Intersection::at_origin(ray));
        }

        // |origin + t*direction - center|^2 = radius^2
        let a = ray.direction.dot(&ray.direction);
        let b = 2.0 * oc.dot(&ray.direction);
        let c = oc.dot(&oc) - self.radius * self.radius;
        let (t, _) = solve_quadratic(a, b, c)?;
        if t < 0.0 {
            return None;
        }

        let pos = ray.point_at(t);
        Some(Intersection {
            dist: t,
            pos,
            norm: (pos - self.center) / self.radius,
        })
    }
}

/// Upright (y-aligned) capsule: a vertical segment swept by a radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    /// Midpoint of the core segment
    pub center: Vec3,
    /// Radius around the core segment
    pub radius: f32,
    /// Length of the core segment (distance between the cap centers)
    pub height: f32,
}

impl Capsule {
    /// Creates a new capsule
    pub const fn new(center: Vec3, radius: f32, height: f32) -> Self {
        Self { center, radius, height }
    }

    /// Center of the lower cap
    pub fn bottom(&self) -> Vec3 {
        self.center - Vec3::new(0.0, self.height * 0.5, 0.0)
    }

    /// Center of the upper cap
    pub fn top(&self) -> Vec3 {
        self.center + Vec3::new(0.0, self.height * 0.5, 0.0)
    }

    /// Point on the core segment closest to `p`
    pub fn closest_core_point(&self, p: &Vec3) -> Vec3 {
        let half = self.height * 0.5;
        let y = p.y.clamp(self.center.y - half, self.center.y + half);
        Vec3::new(self.center.x, y, self.center.z)
    }

    /// Tight bounding box
    pub fn aabb(&self) -> Aabb {
        Aabb::from_center_extents(
            self.center,
            Vec3::new(self.radius, self.height * 0.5 + self.radius, self.radius),
        )
    }

    /// Cylinder plus the two half-ball caps
    pub fn volume(&self) -> f32 {
        let r2 = self.radius * self.radius;
        std::f32::consts::PI * r2 * self.height + 4.0 / 3.0 * std::f32::consts::PI * r2 * self.radius
    }

    /// Nearest entry into the union of the side cylinder and the two caps
    pub fn intersect_ray(&self, ray: &Ray) -> Option<Intersection> {
        let core = self.closest_core_point(&ray.origin);
        if (ray.origin - core).norm_squared() <= self.radius * self.radius {
            return Some(Intersection::at_origin(ray));
        }

        let mut best: Option<Intersection> = None;
        let mut keep = |hit: Intersection| {
            if best.map_or(true, |b| hit.dist < b.dist) {
                best = Some(hit);
            }
        };

        // Side wall, only valid between the caps
        let ox = ray.origin.x - self.center.x;
        let oz = ray.origin.z - self.center.z;
        let (dx, dz) = (ray.direction.x, ray.direction.z);
        let a = dx * dx + dz * dz;
        if a > 0.0 {
            let b = 2.0 * (ox * dx + oz * dz);
            let c = ox * ox + oz * oz - self.radius * self.radius;
            if let Some((t, _)) = solve_quadratic(a, b, c) {
                let pos = ray.point_at(t);
                let half = self.height * 0.5;
                if t >= 0.0 && (pos.y - self.center.y).abs() <= half {
                    let axis = Vec3::new(self.center.x, pos.y, self.center.z);
                    keep(Intersection {
                        dist: t,
                        pos,
                        norm: (pos - axis) / self.radius,
                    });
                }
            }
        }

        for cap in [self.bottom(), self.top()] {
            if let Some(hit) = Sphere::new(cap, self.radius).intersect_ray(ray) {
                keep(hit);
            }
        }
        best
    }
}
