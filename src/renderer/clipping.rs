//! Clipping planes.
//!
//! Planes are `Vec4(normal, constant)` with `dot(normal, p) + constant = 0`;
//! fragments on the negative side are discarded. Global planes come from
//! [`RendererSettings::clipping_planes`]; material planes are added when
//! local clipping is enabled. Both are transformed into view space once per
//! frame (global) or per draw (local) and uploaded as one flat array.
//!
//! [`RendererSettings::clipping_planes`]: crate::renderer::settings::RendererSettings::clipping_planes

use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::resources::material::MaterialSettings;
use crate::resources::uniforms::UniformValue;

/// Plane counts baked into a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ClippingCounts {
    /// Total planes uploaded.
    pub planes: u32,
    /// Trailing planes combined by intersection instead of union.
    pub intersection: u32,
}

/// Transforms a plane by a rigid/affine view matrix.
#[must_use]
pub fn transform_plane(plane: Vec4, matrix: &Mat4) -> Vec4 {
    let normal = plane.truncate();
    let normal_matrix = Mat3::from_mat4(*matrix).inverse().transpose();
    let coplanar = matrix.transform_point3(normal * -plane.w);
    let n = (normal_matrix * normal).normalize_or_zero();
    n.extend(-n.dot(coplanar))
}

/// Uniform vectors per plane in the `float[]` plane array.
pub const PLANE_VECTORS: u32 = 4;

#[derive(Debug)]
pub struct ClippingState {
    global: Vec<Vec4>,
    scratch: Vec<f32>,
    version: u64,
    max_planes: u32,
}

impl Default for ClippingState {
    fn default() -> Self {
        Self {
            global: Vec::new(),
            scratch: Vec::new(),
            version: 0,
            max_planes: u32::MAX,
        }
    }
}

impl ClippingState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped when the number of global planes changes.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn global_count(&self) -> u32 {
        self.global.len() as u32
    }

    /// Planes a single draw may upload this frame.
    #[must_use]
    pub fn max_planes(&self) -> u32 {
        self.max_planes
    }

    /// Transforms the global planes into view space for this frame.
    ///
    /// At most `max_planes` are kept; returns the requested count when some
    /// were dropped.
    pub fn begin_frame(&mut self, planes: &[Vec4], view: &Mat4, max_planes: u32) -> Option<u32> {
        self.max_planes = max_planes;
        let kept = planes.len().min(max_planes as usize);
        let previous = self.global.len();
        self.global.clear();
        self.global
            .extend(planes[..kept].iter().map(|p| transform_plane(*p, view)));
        if previous != self.global.len() {
            self.version = self.version.wrapping_add(1);
        }
        (kept < planes.len()).then_some(planes.len() as u32)
    }

    /// Local planes requested by a material and how many of them fit.
    fn local_planes(&self, settings: &MaterialSettings, local_enabled: bool) -> (u32, u32) {
        if !local_enabled {
            return (0, 0);
        }
        let requested = settings.clipping_planes.len() as u32;
        let room = self.max_planes.saturating_sub(self.global_count());
        (requested, requested.min(room))
    }

    /// Local planes requested by a material and the room left for them,
    /// when more were requested than fit.
    #[must_use]
    pub fn overflow(&self, settings: &MaterialSettings, local_enabled: bool) -> Option<(u32, u32)> {
        let (requested, kept) = self.local_planes(settings, local_enabled);
        (kept < requested).then_some((requested, kept))
    }

    /// Plane counts for a material.
    #[must_use]
    pub fn counts(&self, settings: &MaterialSettings, local_enabled: bool) -> ClippingCounts {
        let (_, local) = self.local_planes(settings, local_enabled);
        ClippingCounts {
            planes: self.global_count() + local,
            intersection: if settings.clip_intersection { local } else { 0 },
        }
    }

    /// Appends the `clippingPlanes` uniform for one draw, if any planes apply.
    pub fn collect_uniforms(
        &mut self,
        settings: &MaterialSettings,
        local_enabled: bool,
        view: &Mat4,
        out: &mut Vec<(&'static str, UniformValue)>,
    ) {
        self.scratch.clear();
        for plane in &self.global {
            self.scratch.extend_from_slice(&plane.to_array());
        }
        let (_, local) = self.local_planes(settings, local_enabled);
        if local > 0 {
            for plane in settings.clipping_planes.iter().take(local as usize) {
                self.scratch
                    .extend_from_slice(&transform_plane(*plane, view).to_array());
            }
        }
        if !self.scratch.is_empty() {
            out.push(("clippingPlanes", UniformValue::float_array(&self.scratch)));
        }
    }
}

/// Whether `point` survives a set of world-space planes.
#[must_use]
pub fn point_visible(planes: &[Vec4], point: Vec3) -> bool {
    planes.iter().all(|p| p.truncate().dot(point) + p.w >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_follows_translation() {
        // y >= 0, camera moved up by 2: plane becomes y_view >= -2
        let plane = Vec4::new(0.0, 1.0, 0.0, 0.0);
        let view = Mat4::from_translation(Vec3::new(0.0, -2.0, 0.0));
        let t = transform_plane(plane, &view);
        assert!((t - Vec4::new(0.0, 1.0, 0.0, 2.0)).length() < 1e-5);
        assert!(point_visible(&[t], Vec3::new(0.0, -1.0, 0.0)));
    }

    #[test]
    fn counts_include_local_only_when_enabled() {
        let mut state = ClippingState::new();
        state.begin_frame(&[Vec4::Y], &Mat4::IDENTITY, u32::MAX);
        let mut settings = MaterialSettings::default();
        settings.clipping_planes = vec![Vec4::X, Vec4::Z];
        settings.clip_intersection = true;

        assert_eq!(state.counts(&settings, false).planes, 1);
        let counts = state.counts(&settings, true);
        assert_eq!(counts.planes, 3);
        assert_eq!(counts.intersection, 2);

        let v = state.version();
        state.begin_frame(&[Vec4::X], &Mat4::IDENTITY, u32::MAX);
        assert_eq!(state.version(), v);
        state.begin_frame(&[], &Mat4::IDENTITY, u32::MAX);
        assert_ne!(state.version(), v);
    }

    #[test]
    fn planes_past_the_limit_are_dropped() {
        let mut state = ClippingState::new();
        assert_eq!(state.begin_frame(&[Vec4::X, Vec4::Y, Vec4::Z], &Mat4::IDENTITY, 2), Some(3));
        assert_eq!(state.global_count(), 2);
        assert_eq!(state.max_planes(), 2);

        let mut settings = MaterialSettings::default();
        settings.clipping_planes = vec![Vec4::W];
        assert_eq!(state.counts(&settings, true).planes, 2);
        assert_eq!(state.overflow(&settings, true), Some((1, 0)));
        assert_eq!(state.overflow(&settings, false), None);

        let mut out = Vec::new();
        state.collect_uniforms(&settings, true, &Mat4::IDENTITY, &mut out);
        assert_eq!(out[0].1.component_count(), 8);

        assert_eq!(state.begin_frame(&[Vec4::X], &Mat4::IDENTITY, 2), None);
        assert_eq!(state.counts(&settings, true).planes, 2);
        assert_eq!(state.overflow(&settings, true), None);
    }
}
