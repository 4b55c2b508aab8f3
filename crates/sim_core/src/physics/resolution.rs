//! Turning pairwise penetration deltas into one correction per bounder
//!
//! Heavier contacts take precedence: the correction gathered from lighter
//! contacts is first stripped of anything pointing back into a heavier
//! contact, and only then combined with the heavier correction.

use std::cmp::Ordering;

use crate::foundation::math::{remove_all_against, safe_norm, Vec3};
use crate::physics::collision::Weight;

/// What one side of an overlapping pair records
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Share {
    /// Nothing recorded (the side is immovable)
    Nothing,
    /// Collided, but not pushed
    Touched,
    /// Pushed by `delta`, by something of weight `by`
    Pushed {
        /// Weight of the other side
        by: Weight,
        /// Translation for this side
        delta: Vec3,
    },
}

/// Split the correction of an overlapping pair of movable-weight bounders.
///
/// `delta` moves `a` out of `b`. The lighter side takes the whole delta, equal
/// weights take half each, and the heavier side is only marked as touched.
/// Detect-only weights never reach this point.
pub fn assign(a: Weight, b: Weight, delta: Vec3) -> (Share, Share) {
    let touched = |w: Weight| if w.is_infinite() { Share::Nothing } else { Share::Touched };
    if a < b {
        (Share::Pushed { by: b, delta }, touched(b))
    } else if b < a {
        (touched(a), Share::Pushed { by: a, delta: -delta })
    } else {
        let half = delta * 0.5;
        (Share::Pushed { by: b, delta: half }, Share::Pushed { by: a, delta: -half })
    }
}

/// Combine two corrections, per axis: the larger of two same-signed
/// components wins, otherwise they add up
pub fn composite_deltas(a: &Vec3, b: &Vec3) -> Vec3 {
    Vec3::from_fn(|axis, _| {
        let (x, y) = (a[axis], b[axis]);
        if x > 0.0 && y > 0.0 {
            x.max(y)
        } else if x < 0.0 && y < 0.0 {
            x.min(y)
        } else {
            x + y
        }
    })
}

/// Net correction of one bounder from every `(weight, delta)` pushed onto it.
///
/// Contributions are grouped by weight in ascending order. The lightest group
/// is composited into the net; every heavier group then clamps the net
/// against each of its deltas and against its combined direction before its
/// combined delta is composited in.
///
/// Compositing is not associative, so deltas inside a group are taken in
/// ascending per-axis order. The result does not depend on the order
/// contributions were gathered in.
pub fn net_delta(contributions: &mut [(Weight, Vec3)]) -> Vec3 {
    contributions.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| cmp_delta(&a.1, &b.1)));

    let mut net = Vec3::zeros();
    let mut first = true;
    for group in contributions.chunk_by(|a, b| a.0 == b.0) {
        let mut combined = Vec3::zeros();
        for (_, delta) in group {
            combined = composite_deltas(&combined, delta);
            if !first {
                net = remove_all_against(&net, &safe_norm(delta));
            }
        }
        if !first {
            net = remove_all_against(&net, &safe_norm(&combined));
        }
        net = composite_deltas(&net, &combined);
        first = false;
    }
    net
}

fn cmp_delta(a: &Vec3, b: &Vec3) -> Ordering {
    (0..3)
        .map(|axis| a[axis].total_cmp(&b[axis]))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}
