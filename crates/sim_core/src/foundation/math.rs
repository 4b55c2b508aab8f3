//! Math utilities and types
//!
//! Thin aliases over nalgebra plus the handful of vector helpers the
//! collision pipeline leans on.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Position, rotation and scale of an object in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform from all three parts
    pub const fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { position, rotation, scale }
    }

    /// Convert to a transformation matrix (scale, then rotate, then translate)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Matrix for transforming normals: rotation times inverse scale
    pub fn normal_matrix(&self) -> Mat3 {
        let inv_scale = Vec3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);
        self.rotation.to_rotation_matrix().into_inner() * Mat3::from_diagonal(&inv_scale)
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: &Vec3) -> Vec3 {
        self.position + self.rotation * self.scale.component_mul(point)
    }

    /// Apply rotation and scale (no translation) to a vector
    pub fn transform_vector(&self, vector: &Vec3) -> Vec3 {
        self.rotation * self.scale.component_mul(vector)
    }

    /// Blend between two transforms, `t` in `[0, 1]`
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            position: self.position.lerp(&other.position, t),
            rotation: self.rotation.slerp(&other.rotation, t),
            scale: self.scale.lerp(&other.scale, t),
        }
    }
}

/// Normalize `v`, returning zero for the zero vector instead of NaN
pub fn safe_norm(v: &Vec3) -> Vec3 {
    let len_sq = v.norm_squared();
    if len_sq == 0.0 {
        Vec3::zeros()
    } else {
        v / len_sq.sqrt()
    }
}

/// Strip the part of `v` that points against the unit direction `n`.
///
/// Vectors already on the positive side of `n` come back unchanged.
pub fn remove_all_against(v: &Vec3, n: &Vec3) -> Vec3 {
    let d = v.dot(n);
    if d >= 0.0 {
        *v
    } else {
        v - n * d
    }
}

/// Real roots of `a x^2 + b x + c = 0`, smaller root first
pub fn solve_quadratic(a: f32, b: f32, c: f32) -> Option<(f32, f32)> {
    if a == 0.0 {
        if b == 0.0 {
            return None;
        }
        let x = -c / b;
        return Some((x, x));
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let x0 = (-b - sqrt_disc) / (2.0 * a);
    let x1 = (-b + sqrt_disc) / (2.0 * a);
    Some((x0.min(x1), x0.max(x1)))
}
