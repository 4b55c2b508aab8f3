//! Choosing a bounder shape for a point cloud

use bitflags::bitflags;

use crate::foundation::geometry::{Aabb, Capsule, Sphere};
use crate::foundation::math::Vec3;

use super::shape::BounderShape;

bitflags! {
    /// Shape kinds a fit may produce
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShapeKinds: u8 {
        /// Axis-aligned box
        const BOX = 1 << 0;
        /// Sphere
        const SPHERE = 1 << 1;
        /// Upright capsule
        const CAPSULE = 1 << 2;
    }
}

impl Default for ShapeKinds {
    fn default() -> Self {
        Self::all()
    }
}

/// Smallest-volume shape among `kinds` enclosing every point.
///
/// All three candidates share the center of the points' bounding box. An
/// empty `kinds` allows every kind. Returns `None` for an empty point set.
/// Ties prefer sphere, then box, then capsule.
pub fn fit_bounder(points: &[Vec3], kinds: ShapeKinds) -> Option<BounderShape> {
    let span = Aabb::from_points(points)?;
    let kinds = if kinds.is_empty() { ShapeKinds::all() } else { kinds };
    let center = span.center();

    let boxed = kinds.contains(ShapeKinds::BOX).then_some(BounderShape::Box(span));
    let sphere = kinds
        .contains(ShapeKinds::SPHERE)
        .then(|| BounderShape::Sphere(Sphere::new(center, max_radius(points, &center))));
    let capsule = kinds
        .contains(ShapeKinds::CAPSULE)
        .then(|| BounderShape::Capsule(fit_capsule(points, &center)));

    let volume = |shape: &Option<BounderShape>| shape.as_ref().map_or(f32::INFINITY, BounderShape::volume);
    let (box_v, sphere_v, capsule_v) = (volume(&boxed), volume(&sphere), volume(&capsule));

    if sphere.is_some() && sphere_v <= box_v && sphere_v <= capsule_v {
        sphere
    } else if boxed.is_some() && box_v <= sphere_v && box_v <= capsule_v {
        boxed
    } else {
        capsule
    }
}

fn max_radius(points: &[Vec3], center: &Vec3) -> f32 {
    points
        .iter()
        .map(|p| (p - center).norm_squared())
        .fold(0.0, f32::max)
        .sqrt()
}

/// Upright capsule through `center`: the radius covers every point
/// horizontally, and each cap center is pushed as far toward the middle as
/// the points above (or below) the center allow
fn fit_capsule(points: &[Vec3], center: &Vec3) -> Capsule {
    let horizontal_sq = |p: &Vec3| {
        let (dx, dz) = (p.x - center.x, p.z - center.z);
        dx * dx + dz * dz
    };
    let r_sq = points.iter().map(horizontal_sq).fold(0.0, f32::max);

    let mut upper = f32::NEG_INFINITY;
    let mut lower = f32::INFINITY;
    for p in points {
        let reach = (r_sq - horizontal_sq(p)).max(0.0).sqrt();
        if p.y >= center.y {
            upper = upper.max(p.y - reach);
        }
        if p.y <= center.y {
            lower = lower.min(p.y + reach);
        }
    }
    if upper < lower {
        let mid = (upper + lower) * 0.5;
        upper = mid;
        lower = mid;
    }

    let height = upper - lower;
    Capsule::new(Vec3::new(center.x, lower + height * 0.5, center.z), r_sq.sqrt(), height)
}
