//! Uniform value model.
//!
//! [`UniformValue`] is the unit the uniform upload layer diffs and forwards to
//! the device. Equality is component-wise for vectors, matrices and flattened
//! arrays, so two values built independently compare equal when their
//! contents match.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use smallvec::SmallVec;

/// A single uniform value.
///
/// Arrays of structs (per-light data, clipping planes) are uploaded as a
/// flattened `f32` buffer with one device call per array.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    /// Texture unit index bound to a sampler uniform.
    Sampler(u32),
    /// Flattened array of floats (vec3/vec4/struct arrays).
    FloatArray(SmallVec<[f32; 16]>),
}

impl UniformValue {
    /// Builds a flattened array from any float slice.
    #[must_use]
    pub fn float_array(values: &[f32]) -> Self {
        UniformValue::FloatArray(SmallVec::from_slice(values))
    }

    /// Number of `f32` components the value occupies.
    #[must_use]
    pub fn component_count(&self) -> usize {
        match self {
            UniformValue::Float(_)
            | UniformValue::Int(_)
            | UniformValue::Bool(_)
            | UniformValue::Sampler(_) => 1,
            UniformValue::Vec2(_) => 2,
            UniformValue::Vec3(_) => 3,
            UniformValue::Vec4(_) => 4,
            UniformValue::Mat3(_) => 9,
            UniformValue::Mat4(_) => 16,
            UniformValue::FloatArray(values) => values.len(),
        }
    }

    /// Overwrites `self` with `other`, reusing the array allocation when
    /// both are flattened arrays.
    pub fn assign(&mut self, other: &UniformValue) {
        match (self, other) {
            (UniformValue::FloatArray(dst), UniformValue::FloatArray(src)) => {
                dst.clear();
                dst.extend_from_slice(src);
            }
            (dst, src) => *dst = src.clone(),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat3> for UniformValue {
    fn from(v: Mat3) -> Self {
        UniformValue::Mat3(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrices_compare_by_value() {
        let a = UniformValue::Mat4(Mat4::from_translation(Vec3::X));
        let b = UniformValue::Mat4(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(a, b);
    }

    #[test]
    fn assign_reuses_array() {
        let mut dst = UniformValue::float_array(&[1.0, 2.0, 3.0]);
        dst.assign(&UniformValue::float_array(&[4.0, 5.0]));
        assert_eq!(dst, UniformValue::float_array(&[4.0, 5.0]));
        assert_eq!(dst.component_count(), 2);
    }
}
