use glam::{Affine3A, Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::scene::node::Layers;

/// Clip-space depth range the projection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepthOrigin {
    /// `[0, 1]`, as in Vulkan, Metal, D3D and wgpu.
    #[default]
    ZeroToOne,
    /// `[-1, 1]`, as in OpenGL.
    NegOneToOne,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians.
        fov: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    },
}

impl Projection {
    #[must_use]
    pub fn near_far(&self) -> (f32, f32) {
        match *self {
            Projection::Perspective { near, far, .. } | Projection::Orthographic { near, far, .. } => {
                (near, far)
            }
        }
    }
}

/// Camera component; its world transform comes from the owning node.
#[derive(Debug, Clone)]
pub struct Camera {
    pub projection: Projection,
    /// Layers this camera renders.
    pub layers: Layers,
    pub depth_origin: DepthOrigin,

    pub(crate) world_matrix: Affine3A,
    pub(crate) view_matrix: Mat4,
    pub(crate) projection_matrix: Mat4,
    pub(crate) view_projection_matrix: Mat4,
    pub(crate) frustum: Frustum,
}

impl Camera {
    /// `fov` is in degrees.
    #[must_use]
    pub fn new_perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::with_projection(Projection::Perspective {
            fov: fov.to_radians(),
            aspect,
            near,
            far,
        })
    }

    #[must_use]
    pub fn new_orthographic(half_height: f32, aspect: f32, near: f32, far: f32) -> Self {
        let half_width = half_height * aspect;
        Self::with_projection(Projection::Orthographic {
            left: -half_width,
            right: half_width,
            top: half_height,
            bottom: -half_height,
            near,
            far,
        })
    }

    #[must_use]
    pub fn with_projection(projection: Projection) -> Self {
        let mut cam = Self {
            projection,
            layers: Layers::default(),
            depth_origin: DepthOrigin::default(),
            world_matrix: Affine3A::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            view_projection_matrix: Mat4::IDENTITY,
            frustum: Frustum::default(),
        };
        cam.update_projection_matrix();
        cam
    }

    /// A zero or non-finite near/far range, or a non-positive perspective near.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        let (near, far) = self.projection.near_far();
        if !near.is_finite() || !far.is_finite() || (far - near).abs() <= f32::EPSILON {
            return true;
        }
        match self.projection {
            Projection::Perspective { fov, aspect, .. } => {
                near <= 0.0 || fov <= 0.0 || aspect <= 0.0 || !aspect.is_finite()
            }
            Projection::Orthographic {
                left,
                right,
                top,
                bottom,
                ..
            } => (right - left).abs() <= f32::EPSILON || (top - bottom).abs() <= f32::EPSILON,
        }
    }

    /// Rebuilds projection, view-projection and frustum. Degenerate
    /// projections are left untouched.
    pub fn update_projection_matrix(&mut self) {
        if self.is_degenerate() {
            return;
        }
        self.projection_matrix = match (self.projection, self.depth_origin) {
            (
                Projection::Perspective {
                    fov,
                    aspect,
                    near,
                    far,
                },
                DepthOrigin::ZeroToOne,
            ) => Mat4::perspective_rh(fov, aspect, near, far),
            (
                Projection::Perspective {
                    fov,
                    aspect,
                    near,
                    far,
                },
                DepthOrigin::NegOneToOne,
            ) => Mat4::perspective_rh_gl(fov, aspect, near, far),
            (
                Projection::Orthographic {
                    left,
                    right,
                    top,
                    bottom,
                    near,
                    far,
                },
                DepthOrigin::ZeroToOne,
            ) => Mat4::orthographic_rh(left, right, bottom, top, near, far),
            (
                Projection::Orthographic {
                    left,
                    right,
                    top,
                    bottom,
                    near,
                    far,
                },
                DepthOrigin::NegOneToOne,
            ) => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        };
        self.refresh_derived();
    }

    /// Called by the transform system whenever the owning node's world
    /// matrix is rewritten.
    pub fn update_view_projection(&mut self, world_transform: &Affine3A) {
        self.world_matrix = *world_transform;
        self.view_matrix = Mat4::from(world_transform.inverse());
        self.refresh_derived();
    }

    fn refresh_derived(&mut self) {
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
        self.frustum = Frustum::from_matrix(self.view_projection_matrix, self.depth_origin);
    }

    #[inline]
    #[must_use]
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    #[inline]
    #[must_use]
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    #[inline]
    #[must_use]
    pub fn view_projection_matrix(&self) -> &Mat4 {
        &self.view_projection_matrix
    }

    #[inline]
    #[must_use]
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    #[inline]
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.translation.into()
    }

    #[must_use]
    pub fn is_orthographic(&self) -> bool {
        matches!(self.projection, Projection::Orthographic { .. })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Frustum {
    planes: [Vec4; 6], // Left, Right, Bottom, Top, Near, Far
}

impl Frustum {
    /// Gribb-Hartmann plane extraction from a view-projection matrix.
    #[must_use]
    pub fn from_matrix(m: Mat4, depth_origin: DepthOrigin) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let near = match depth_origin {
            DepthOrigin::ZeroToOne => rows[2],
            DepthOrigin::NegOneToOne => rows[3] + rows[2],
        };
        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            near,
            rows[3] - rows[2],
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > 0.0 {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(center) + plane.w >= -radius)
    }

    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.intersects_sphere(point, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frustum_culls_behind_camera() {
        let mut cam = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
        cam.update_view_projection(&Affine3A::IDENTITY);
        assert!(cam.frustum().intersects_sphere(Vec3::new(0.0, 0.0, -5.0), 0.5));
        assert!(!cam.frustum().intersects_sphere(Vec3::new(0.0, 0.0, 5.0), 0.5));
        assert!(!cam.frustum().intersects_sphere(Vec3::new(0.0, 0.0, -200.0), 1.0));
    }

    #[test]
    fn gl_depth_range_frustum() {
        let mut cam = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
        cam.depth_origin = DepthOrigin::NegOneToOne;
        cam.update_projection_matrix();
        cam.update_view_projection(&Affine3A::IDENTITY);
        assert!(cam.frustum().contains_point(Vec3::new(0.0, 0.0, -0.5)));
        assert!(!cam.frustum().contains_point(Vec3::new(0.0, 0.0, -0.05)));
    }

    #[test]
    fn degenerate_range_detected() {
        let cam = Camera::new_perspective(60.0, 1.0, 1.0, 1.0);
        assert!(cam.is_degenerate());
        assert!(!Camera::new_orthographic(5.0, 1.0, 0.0, 10.0).is_degenerate());
    }
}
