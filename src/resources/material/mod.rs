//! Materials.
//!
//! A [`Material`] is one of a closed set of [`ShadingModel`]s plus settings,
//! texture slots and numeric uniforms. The renderer reads three things from
//! it: the transparency class, the fixed-function settings, and the
//! [`MaterialFeatures`] fingerprint. The fingerprint is derived from the
//! current state, so a value-only edit (a new color) leaves it unchanged and
//! the program cache keeps its binding, while adding a texture flips a flag
//! and forces a fresh key.

mod settings;

pub use settings::{
    Blending, CustomBlend, MaterialSettings, MaterialUniforms, PolygonOffset, Side,
    StencilSettings,
};

use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use glam::{Vec2, Vec3};
use rustc_hash::FxHasher;

use crate::assets::TextureHandle;
use crate::resources::uniforms::UniformValue;
use crate::resources::version_tracker::{ChangeTracker, MutGuard};

// ============================================================================
// Shading models
// ============================================================================

/// Closed set of shading models, each backed by one template pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShadingModel {
    /// Unlit
    Basic,
    Lambert,
    Phong,
    /// Metallic-roughness PBR
    Standard,
    /// Standard plus transmission, clearcoat and ior.
    Physical,
    Toon,
    Matcap,
    /// Only receives shadows, draws black with shadow alpha.
    Shadow,
    Depth,
    Distance,
}

impl ShadingModel {
    pub const ALL: [ShadingModel; 10] = [
        ShadingModel::Basic,
        ShadingModel::Lambert,
        ShadingModel::Phong,
        ShadingModel::Standard,
        ShadingModel::Physical,
        ShadingModel::Toon,
        ShadingModel::Matcap,
        ShadingModel::Shadow,
        ShadingModel::Depth,
        ShadingModel::Distance,
    ];

    /// Template name under `shaders/`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ShadingModel::Basic => "basic",
            ShadingModel::Lambert => "lambert",
            ShadingModel::Phong => "phong",
            ShadingModel::Standard => "standard",
            ShadingModel::Physical => "physical",
            ShadingModel::Toon => "toon",
            ShadingModel::Matcap => "matcap",
            ShadingModel::Shadow => "shadow",
            ShadingModel::Depth => "depth",
            ShadingModel::Distance => "distance",
        }
    }

    /// Whether generated code depends on scene light counts.
    #[must_use]
    pub const fn is_lit(self) -> bool {
        matches!(
            self,
            ShadingModel::Lambert
                | ShadingModel::Phong
                | ShadingModel::Standard
                | ShadingModel::Physical
                | ShadingModel::Toon
                | ShadingModel::Shadow
        )
    }

    /// Whether the model is physically based (uses the standard BRDF chunk).
    #[must_use]
    pub const fn is_physical(self) -> bool {
        matches!(self, ShadingModel::Standard | ShadingModel::Physical)
    }
}

// ============================================================================
// Feature fingerprint
// ============================================================================

bitflags! {
    /// Structural feature flags; every flag changes generated code.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFeatures: u32 {
        const USE_MAP              = 1 << 0;
        const USE_ALPHA_MAP        = 1 << 1;
        const USE_NORMAL_MAP       = 1 << 2;
        const USE_BUMP_MAP         = 1 << 3;
        const USE_EMISSIVE_MAP     = 1 << 4;
        const USE_ROUGHNESS_MAP    = 1 << 5;
        const USE_METALNESS_MAP    = 1 << 6;
        const USE_AO_MAP           = 1 << 7;
        const USE_LIGHT_MAP        = 1 << 8;
        const USE_SPECULAR_MAP     = 1 << 9;
        const USE_GRADIENT_MAP     = 1 << 10;
        const USE_MATCAP           = 1 << 11;
        const USE_TRANSMISSION     = 1 << 12;
        const USE_TRANSMISSION_MAP = 1 << 13;
        const USE_THICKNESS_MAP    = 1 << 14;
        const USE_CLEARCOAT        = 1 << 15;
        const ALPHA_TEST           = 1 << 16;
        const ALPHA_TO_COVERAGE    = 1 << 17;
        const VERTEX_COLORS        = 1 << 18;
        const FLAT_SHADING         = 1 << 19;
        const DOUBLE_SIDED         = 1 << 20;
        const FLIP_SIDED           = 1 << 21;
        const PREMULTIPLIED_ALPHA  = 1 << 22;
        const DITHERING            = 1 << 23;
        const TONE_MAPPED          = 1 << 24;
        const FOG                  = 1 << 25;
        const USE_UV               = 1 << 26;
    }
}

/// Which bucket a drawable using this material lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransparencyClass {
    Opaque,
    Transmissive,
    Transparent,
}

// ============================================================================
// Texture slots
// ============================================================================

/// Optional texture slots. Presence, not identity, affects the fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialMaps {
    pub map: Option<TextureHandle>,
    pub alpha_map: Option<TextureHandle>,
    pub normal_map: Option<TextureHandle>,
    pub bump_map: Option<TextureHandle>,
    pub emissive_map: Option<TextureHandle>,
    pub roughness_map: Option<TextureHandle>,
    pub metalness_map: Option<TextureHandle>,
    pub ao_map: Option<TextureHandle>,
    pub light_map: Option<TextureHandle>,
    pub specular_map: Option<TextureHandle>,
    pub gradient_map: Option<TextureHandle>,
    pub matcap: Option<TextureHandle>,
    pub transmission_map: Option<TextureHandle>,
    pub thickness_map: Option<TextureHandle>,
}

impl MaterialMaps {
    /// Bound slots as `(sampler uniform name, texture)` pairs, in a fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, TextureHandle)> + '_ {
        [
            ("map", self.map),
            ("alphaMap", self.alpha_map),
            ("normalMap", self.normal_map),
            ("bumpMap", self.bump_map),
            ("emissiveMap", self.emissive_map),
            ("roughnessMap", self.roughness_map),
            ("metalnessMap", self.metalness_map),
            ("aoMap", self.ao_map),
            ("lightMap", self.light_map),
            ("specularMap", self.specular_map),
            ("gradientMap", self.gradient_map),
            ("matcap", self.matcap),
            ("transmissionMap", self.transmission_map),
            ("thicknessMap", self.thickness_map),
        ]
        .into_iter()
        .filter_map(|(name, slot)| slot.map(|h| (name, h)))
    }

    fn features(&self) -> MaterialFeatures {
        let mut f = MaterialFeatures::empty();
        f.set(MaterialFeatures::USE_MAP, self.map.is_some());
        f.set(MaterialFeatures::USE_ALPHA_MAP, self.alpha_map.is_some());
        f.set(MaterialFeatures::USE_NORMAL_MAP, self.normal_map.is_some());
        f.set(MaterialFeatures::USE_BUMP_MAP, self.bump_map.is_some());
        f.set(MaterialFeatures::USE_EMISSIVE_MAP, self.emissive_map.is_some());
        f.set(MaterialFeatures::USE_ROUGHNESS_MAP, self.roughness_map.is_some());
        f.set(MaterialFeatures::USE_METALNESS_MAP, self.metalness_map.is_some());
        f.set(MaterialFeatures::USE_AO_MAP, self.ao_map.is_some());
        f.set(MaterialFeatures::USE_LIGHT_MAP, self.light_map.is_some());
        f.set(MaterialFeatures::USE_SPECULAR_MAP, self.specular_map.is_some());
        f.set(MaterialFeatures::USE_GRADIENT_MAP, self.gradient_map.is_some());
        f.set(MaterialFeatures::USE_MATCAP, self.matcap.is_some());
        f.set(
            MaterialFeatures::USE_TRANSMISSION_MAP,
            self.transmission_map.is_some(),
        );
        f.set(MaterialFeatures::USE_THICKNESS_MAP, self.thickness_map.is_some());
        if !f.is_empty() {
            f |= MaterialFeatures::USE_UV;
        }
        f
    }
}

// ============================================================================
// Material
// ============================================================================

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    model: ShadingModel,
    settings: MaterialSettings,
    maps: MaterialMaps,
    uniforms: MaterialUniforms,
    /// Extra `#define`s appended to the generated source.
    defines: Vec<(String, String)>,
    tracker: ChangeTracker,
    last_program_error: Option<String>,
}

impl Material {
    #[must_use]
    pub fn new(model: ShadingModel) -> Self {
        Self {
            name: String::new(),
            model,
            settings: MaterialSettings::default(),
            maps: MaterialMaps::default(),
            uniforms: MaterialUniforms::default(),
            defines: Vec::new(),
            tracker: ChangeTracker::new(),
            last_program_error: None,
        }
    }

    #[must_use]
    pub fn basic(color: Vec3) -> Self {
        Self::new(ShadingModel::Basic).with_color(color)
    }

    #[must_use]
    pub fn lambert(color: Vec3) -> Self {
        Self::new(ShadingModel::Lambert).with_color(color)
    }

    #[must_use]
    pub fn phong(color: Vec3) -> Self {
        Self::new(ShadingModel::Phong).with_color(color)
    }

    #[must_use]
    pub fn standard(color: Vec3) -> Self {
        Self::new(ShadingModel::Standard).with_color(color)
    }

    #[must_use]
    pub fn physical(color: Vec3) -> Self {
        Self::new(ShadingModel::Physical).with_color(color)
    }

    #[must_use]
    pub fn toon(color: Vec3) -> Self {
        Self::new(ShadingModel::Toon).with_color(color)
    }

    #[must_use]
    pub fn matcap(color: Vec3) -> Self {
        Self::new(ShadingModel::Matcap).with_color(color)
    }

    /// Shadow-catcher: black, transparent, opacity scales the shadow.
    #[must_use]
    pub fn shadow(opacity: f32) -> Self {
        let mut m = Self::new(ShadingModel::Shadow)
            .with_color(Vec3::ZERO)
            .with_transparent(true);
        m.uniforms.opacity = opacity;
        m
    }

    #[must_use]
    pub fn depth() -> Self {
        let mut m = Self::new(ShadingModel::Depth);
        m.settings.fog = false;
        m.settings.tone_mapped = false;
        m
    }

    #[must_use]
    pub fn distance(near: f32, far: f32) -> Self {
        let mut m = Self::new(ShadingModel::Distance);
        m.settings.fog = false;
        m.settings.tone_mapped = false;
        m.uniforms.near_distance = near;
        m.uniforms.far_distance = far;
        m
    }

    // --- Builder helpers ---

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: Vec3) -> Self {
        self.uniforms.color = color;
        self
    }

    #[must_use]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.uniforms.opacity = opacity;
        self
    }

    #[must_use]
    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.settings.transparent = transparent;
        self
    }

    #[must_use]
    pub fn with_side(mut self, side: Side) -> Self {
        self.settings.side = side;
        self
    }

    #[must_use]
    pub fn with_blending(mut self, blending: Blending) -> Self {
        self.settings.blending = blending;
        self
    }

    #[must_use]
    pub fn with_map(mut self, texture: TextureHandle) -> Self {
        self.maps.map = Some(texture);
        self
    }

    #[must_use]
    pub fn with_transmission(mut self, transmission: f32) -> Self {
        self.uniforms.transmission = transmission;
        self
    }

    #[must_use]
    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.push((name.into(), value.into()));
        self
    }

    // --- Accessors ---

    #[inline]
    #[must_use]
    pub fn model(&self) -> ShadingModel {
        self.model
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &MaterialSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn maps(&self) -> &MaterialMaps {
        &self.maps
    }

    #[inline]
    #[must_use]
    pub fn uniforms(&self) -> &MaterialUniforms {
        &self.uniforms
    }

    #[must_use]
    pub fn defines(&self) -> &[(String, String)] {
        &self.defines
    }

    pub fn settings_mut(&mut self) -> MutGuard<'_, MaterialSettings> {
        MutGuard::new(&mut self.settings, &mut self.tracker)
    }

    pub fn maps_mut(&mut self) -> MutGuard<'_, MaterialMaps> {
        MutGuard::new(&mut self.maps, &mut self.tracker)
    }

    pub fn uniforms_mut(&mut self) -> MutGuard<'_, MaterialUniforms> {
        MutGuard::new(&mut self.uniforms, &mut self.tracker)
    }

    pub fn defines_mut(&mut self) -> MutGuard<'_, Vec<(String, String)>> {
        MutGuard::new(&mut self.defines, &mut self.tracker)
    }

    /// Forces the renderer to re-resolve this material's program binding.
    pub fn mark_needs_update(&mut self) {
        self.tracker.changed();
    }

    /// Monotonic version, bumped by every mutation guard.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }

    /// Last program compile error, if the current key failed to build.
    #[must_use]
    pub fn last_program_error(&self) -> Option<&str> {
        self.last_program_error.as_deref()
    }

    /// Records the compile outcome without bumping the version.
    pub(crate) fn set_program_error(&mut self, error: Option<String>) {
        self.last_program_error = error;
    }

    /// Structural fingerprint of this material.
    #[must_use]
    pub fn features(&self) -> MaterialFeatures {
        let s = &self.settings;
        let mut f = self.maps.features();

        f.set(MaterialFeatures::USE_TRANSMISSION, self.uniforms.transmission > 0.0);
        f.set(
            MaterialFeatures::USE_CLEARCOAT,
            self.model == ShadingModel::Physical && self.uniforms.clearcoat > 0.0,
        );
        f.set(MaterialFeatures::ALPHA_TEST, s.alpha_test > 0.0);
        f.set(MaterialFeatures::ALPHA_TO_COVERAGE, s.alpha_to_coverage);
        f.set(MaterialFeatures::VERTEX_COLORS, s.vertex_colors);
        f.set(MaterialFeatures::FLAT_SHADING, s.flat_shading);
        f.set(MaterialFeatures::DOUBLE_SIDED, s.side == Side::Double);
        f.set(MaterialFeatures::FLIP_SIDED, s.side == Side::Back);
        f.set(MaterialFeatures::PREMULTIPLIED_ALPHA, s.premultiplied_alpha);
        f.set(MaterialFeatures::DITHERING, s.dithering);
        f.set(MaterialFeatures::TONE_MAPPED, s.tone_mapped);
        f.set(MaterialFeatures::FOG, s.fog);
        f
    }

    /// Hash of the custom defines, 0 when there are none.
    #[must_use]
    pub fn defines_hash(&self) -> u64 {
        if self.defines.is_empty() {
            return 0;
        }
        let mut hasher = FxHasher::default();
        self.defines.hash(&mut hasher);
        hasher.finish()
    }

    #[must_use]
    pub fn transparency_class(&self) -> TransparencyClass {
        if self.uniforms.transmission > 0.0 {
            TransparencyClass::Transmissive
        } else if self.settings.transparent {
            TransparencyClass::Transparent
        } else {
            TransparencyClass::Opaque
        }
    }

    /// Appends this material's value uniforms to `out`.
    ///
    /// Samplers are not included; the renderer assigns texture units itself.
    pub fn collect_uniforms(&self, out: &mut Vec<(&'static str, UniformValue)>) {
        let u = &self.uniforms;
        out.push(("diffuse", u.color.into()));
        out.push(("opacity", u.opacity.into()));
        if self.settings.alpha_test > 0.0 {
            out.push(("alphaTest", self.settings.alpha_test.into()));
        }

        match self.model {
            ShadingModel::Basic | ShadingModel::Matcap | ShadingModel::Shadow => {}
            ShadingModel::Lambert | ShadingModel::Toon => {
                out.push(("emissive", (u.emissive * u.emissive_intensity).into()));
            }
            ShadingModel::Phong => {
                out.push(("emissive", (u.emissive * u.emissive_intensity).into()));
                out.push(("specular", u.specular.into()));
                out.push(("shininess", u.shininess.max(1e-4).into()));
            }
            ShadingModel::Standard | ShadingModel::Physical => {
                out.push(("emissive", (u.emissive * u.emissive_intensity).into()));
                out.push(("roughness", u.roughness.into()));
                out.push(("metalness", u.metalness.into()));
                if self.model == ShadingModel::Physical {
                    out.push(("ior", u.ior.into()));
                    out.push(("reflectivity", u.reflectivity.into()));
                    out.push(("clearcoat", u.clearcoat.into()));
                    out.push(("clearcoatRoughness", u.clearcoat_roughness.into()));
                }
            }
            ShadingModel::Depth => {}
            ShadingModel::Distance => {
                out.push(("nearDistance", u.near_distance.into()));
                out.push(("farDistance", u.far_distance.into()));
            }
        }

        if u.transmission > 0.0 {
            out.push(("transmission", u.transmission.into()));
            out.push(("thickness", u.thickness.into()));
            out.push(("attenuationColor", u.attenuation_color.into()));
            out.push(("attenuationDistance", u.attenuation_distance.into()));
        }
        if self.maps.ao_map.is_some() {
            out.push(("aoMapIntensity", u.ao_map_intensity.into()));
        }
        if self.maps.light_map.is_some() {
            out.push(("lightMapIntensity", u.light_map_intensity.into()));
        }
        if self.maps.normal_map.is_some() {
            let mut scale: Vec2 = u.normal_scale;
            if self.settings.side == Side::Back {
                scale = -scale;
            }
            out.push(("normalScale", scale.into()));
        }
        if self.maps.bump_map.is_some() {
            out.push(("bumpScale", u.bump_scale.into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn tex() -> TextureHandle {
        TextureHandle::from(KeyData::from_ffi(1))
    }

    #[test]
    fn value_change_keeps_fingerprint() {
        let mut m = Material::standard(Vec3::ONE);
        let before = m.features();
        let v = m.version();
        m.uniforms_mut().color = Vec3::X;
        assert!(m.version() > v);
        assert_eq!(m.features(), before);
    }

    #[test]
    fn adding_map_changes_fingerprint() {
        let mut m = Material::standard(Vec3::ONE);
        let before = m.features();
        m.maps_mut().map = Some(tex());
        let after = m.features();
        assert_ne!(before, after);
        assert!(after.contains(MaterialFeatures::USE_MAP | MaterialFeatures::USE_UV));
    }

    #[test]
    fn transparency_class_prefers_transmission() {
        let m = Material::physical(Vec3::ONE)
            .with_transparent(true)
            .with_transmission(0.5);
        assert_eq!(m.transparency_class(), TransparencyClass::Transmissive);
        assert_eq!(
            Material::basic(Vec3::ONE).with_transparent(true).transparency_class(),
            TransparencyClass::Transparent
        );
        assert_eq!(
            Material::basic(Vec3::ONE).transparency_class(),
            TransparencyClass::Opaque
        );
    }

    #[test]
    fn collect_uniforms_per_model() {
        let mut out = Vec::new();
        Material::phong(Vec3::ONE).collect_uniforms(&mut out);
        let names: Vec<_> = out.iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"shininess"));
        assert!(!names.contains(&"roughness"));
    }

    #[test]
    fn program_error_does_not_bump_version() {
        let mut m = Material::basic(Vec3::ONE);
        let v = m.version();
        m.set_program_error(Some("boom".into()));
        assert_eq!(m.version(), v);
        assert_eq!(m.last_program_error(), Some("boom"));
    }
}
