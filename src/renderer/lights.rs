//! Per-frame light state.
//!
//! Light *counts* change generated code and are part of the program key;
//! light *values* are uniforms. [`LightState::setup`] flattens the visible
//! lights into per-kind `f32` arrays in view space and bumps
//! [`LightState::version`] only when the counts change, so the program
//! cache's fast key survives moving lights around.

use glam::{Mat4, Vec3};

use crate::resources::uniforms::UniformValue;
use crate::scene::NodeHandle;
use crate::scene::Scene;
use crate::scene::light::LightKind;

/// Light-type and shadow counts baked into a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct LightCounts {
    pub directional: u32,
    pub point: u32,
    pub spot: u32,
    pub hemisphere: u32,
    pub directional_shadow: u32,
    pub point_shadow: u32,
    pub spot_shadow: u32,
}

impl LightCounts {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.directional + self.point + self.spot + self.hemisphere
    }
}

/// Floats per array element, matching the struct layouts in the templates.
///
/// The arrays are `float[]`, so each float occupies one uniform vector.
pub const DIRECTIONAL_STRIDE: usize = 6;
pub const POINT_STRIDE: usize = 8;
pub const SPOT_STRIDE: usize = 13;
pub const HEMISPHERE_STRIDE: usize = 9;

/// A light kind that exceeded the per-kind limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightOverflow {
    pub kind: &'static str,
    pub requested: u32,
    pub supported: u32,
}

#[derive(Debug, Default)]
pub struct LightState {
    counts: LightCounts,
    ambient: Vec3,
    directional: Vec<f32>,
    point: Vec<f32>,
    spot: Vec<f32>,
    hemisphere: Vec<f32>,
    version: u64,
    scratch: Vec<NodeHandle>,
}

impl LightState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn counts(&self) -> LightCounts {
        self.counts
    }

    /// Bumped whenever [`counts`](Self::counts) change.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    /// Uniform vectors taken by the light arrays.
    #[must_use]
    pub fn uniform_vectors(&self) -> u32 {
        (self.directional.len() + self.point.len() + self.spot.len() + self.hemisphere.len()) as u32
    }

    /// Rebuilds the state from the lights collected this frame.
    ///
    /// Shadow casters are ordered first so their indices line up with the
    /// shadow arrays. Lights past `max_per_kind`, or whose array element no
    /// longer fits in `vector_budget`, are dropped and reported.
    pub fn setup(
        &mut self,
        scene: &Scene,
        lights: &[NodeHandle],
        view: &Mat4,
        max_per_kind: u32,
        vector_budget: u32,
        shadows_enabled: bool,
    ) -> Vec<LightOverflow> {
        self.ambient = Vec3::ZERO;
        self.directional.clear();
        self.point.clear();
        self.spot.clear();
        self.hemisphere.clear();

        self.scratch.clear();
        self.scratch.extend_from_slice(lights);
        self.scratch.sort_by_key(|&h| {
            let casts = scene.light(h).is_some_and(|l| shadows_enabled && l.casts_shadow());
            !casts
        });

        let mut counts = LightCounts::default();
        let mut requested = LightCounts::default();
        let mut used = 0usize;
        let budget = vector_budget as usize;

        for &handle in &self.scratch {
            let (Some(light), Some(node)) = (scene.light(handle), scene.get_node(handle)) else {
                continue;
            };
            let world = node.world_matrix();
            let color = light.color * light.intensity;
            let shadow = shadows_enabled && light.casts_shadow();

            let view_position = view.transform_point3(world.translation.into());
            let view_direction = view
                .transform_vector3(world.transform_vector3(Vec3::NEG_Z))
                .normalize_or_zero();

            match &light.kind {
                LightKind::Ambient => self.ambient += color,
                LightKind::Hemisphere { ground_color } => {
                    requested.hemisphere += 1;
                    if counts.hemisphere >= max_per_kind || used + HEMISPHERE_STRIDE > budget {
                        continue;
                    }
                    used += HEMISPHERE_STRIDE;
                    counts.hemisphere += 1;
                    let up = view
                        .transform_vector3(world.transform_vector3(Vec3::Y))
                        .normalize_or_zero();
                    self.hemisphere.extend_from_slice(&up.to_array());
                    self.hemisphere.extend_from_slice(&color.to_array());
                    self.hemisphere
                        .extend_from_slice(&(*ground_color * light.intensity).to_array());
                }
                LightKind::Directional => {
                    requested.directional += 1;
                    if counts.directional >= max_per_kind || used + DIRECTIONAL_STRIDE > budget {
                        continue;
                    }
                    used += DIRECTIONAL_STRIDE;
                    counts.directional += 1;
                    if shadow {
                        counts.directional_shadow += 1;
                    }
                    // Direction towards the light.
                    self.directional.extend_from_slice(&(-view_direction).to_array());
                    self.directional.extend_from_slice(&color.to_array());
                }
                LightKind::Point { distance, decay } => {
                    requested.point += 1;
                    if counts.point >= max_per_kind || used + POINT_STRIDE > budget {
                        continue;
                    }
                    used += POINT_STRIDE;
                    counts.point += 1;
                    if shadow {
                        counts.point_shadow += 1;
                    }
                    self.point.extend_from_slice(&view_position.to_array());
                    self.point.extend_from_slice(&color.to_array());
                    self.point.extend_from_slice(&[*distance, *decay]);
                }
                LightKind::Spot {
                    distance,
                    angle,
                    penumbra,
                    decay,
                } => {
                    requested.spot += 1;
                    if counts.spot >= max_per_kind || used + SPOT_STRIDE > budget {
                        continue;
                    }
                    used += SPOT_STRIDE;
                    counts.spot += 1;
                    if shadow {
                        counts.spot_shadow += 1;
                    }
                    self.spot.extend_from_slice(&view_position.to_array());
                    self.spot.extend_from_slice(&(-view_direction).to_array());
                    self.spot.extend_from_slice(&color.to_array());
                    self.spot.extend_from_slice(&[
                        *distance,
                        *decay,
                        angle.cos(),
                        (angle * (1.0 - penumbra)).cos(),
                    ]);
                }
            }
        }

        if counts != self.counts {
            self.counts = counts;
            self.version = self.version.wrapping_add(1);
        }

        [
            ("directional lights", requested.directional, counts.directional),
            ("point lights", requested.point, counts.point),
            ("spot lights", requested.spot, counts.spot),
            ("hemisphere lights", requested.hemisphere, counts.hemisphere),
        ]
        .into_iter()
        .filter(|&(_, requested, kept)| requested > kept)
        .map(|(kind, requested, supported)| LightOverflow {
            kind,
            requested,
            supported,
        })
        .collect()
    }

    /// Light uniforms for lit programs.
    pub fn collect_uniforms(&self, out: &mut Vec<(&'static str, UniformValue)>) {
        out.push(("ambientLightColor", self.ambient.into()));
        if !self.directional.is_empty() {
            out.push(("directionalLights", UniformValue::float_array(&self.directional)));
        }
        if !self.point.is_empty() {
            out.push(("pointLights", UniformValue::float_array(&self.point)));
        }
        if !self.spot.is_empty() {
            out.push(("spotLights", UniformValue::float_array(&self.spot)));
        }
        if !self.hemisphere.is_empty() {
            out.push(("hemisphereLights", UniformValue::float_array(&self.hemisphere)));
        }
    }
}
