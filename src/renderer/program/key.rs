//! Program cache keys.
//!
//! [`ProgramKey`] is the structured identity of a program: every field
//! changes the generated source. It is built only on an L1 miss.
//! [`FastProgramKey`] is a cheap `Copy` struct of handles and version
//! counters checked first on every draw.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::assets::{GeometryHandle, MaterialHandle};
use crate::renderer::clipping::ClippingCounts;
use crate::renderer::lights::LightCounts;
use crate::renderer::settings::{ShadowMapType, ToneMapping};
use crate::resources::geometry::GeometryFeatures;
use crate::resources::material::{MaterialFeatures, ShadingModel, Side};
use crate::resources::texture::ColorSpace;
use crate::scene::light::Fog;

/// Fog variant baked into a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FogKind {
    #[default]
    None,
    Linear,
    Exp2,
}

impl FogKind {
    #[must_use]
    pub fn of(fog: Option<&Fog>) -> Self {
        match fog {
            None => FogKind::None,
            Some(Fog::Linear { .. }) => FogKind::Linear,
            Some(Fog::Exp2 { .. }) => FogKind::Exp2,
        }
    }
}

/// Where the program's output goes; decides color space and tone mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputTarget {
    pub color_space: ColorSpace,
    pub tone_mapping: ToneMapping,
}

impl OutputTarget {
    /// Offscreen targets (transmission, render-to-texture) stay linear.
    pub const LINEAR: OutputTarget = OutputTarget {
        color_space: ColorSpace::Linear,
        tone_mapping: ToneMapping::None,
    };
}

/// Structured, hashable program identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub model: ShadingModel,
    pub features: MaterialFeatures,
    pub geometry: GeometryFeatures,
    pub lights: LightCounts,
    pub shadow_map: Option<ShadowMapType>,
    pub clipping: ClippingCounts,
    pub color_space: ColorSpace,
    pub tone_mapping: ToneMapping,
    pub fog: FogKind,
    pub instanced: bool,
    pub defines_hash: u64,
}

/// Scene-side inputs to a [`ProgramKey`].
#[derive(Debug, Clone, Copy)]
pub struct SceneInputs {
    pub lights: LightCounts,
    pub shadow_map: Option<ShadowMapType>,
    pub fog: FogKind,
    pub output: OutputTarget,
}

impl ProgramKey {
    /// Derives the key for one draw.
    ///
    /// `side` is the side actually rendered, which differs from the
    /// material's own for the back-face pass of double-sided transparency.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        model: ShadingModel,
        material_features: MaterialFeatures,
        side: Side,
        geometry: GeometryFeatures,
        clipping: ClippingCounts,
        scene: &SceneInputs,
        instanced: bool,
        defines_hash: u64,
    ) -> Self {
        let mut features = material_features;
        features.set(MaterialFeatures::DOUBLE_SIDED, side == Side::Double);
        features.set(MaterialFeatures::FLIP_SIDED, side == Side::Back);
        if !geometry.contains(GeometryFeatures::HAS_UV) {
            features.remove(MaterialFeatures::USE_UV);
        }
        if !geometry.contains(GeometryFeatures::HAS_VERTEX_COLOR) {
            features.remove(MaterialFeatures::VERTEX_COLORS);
        }

        let lit = model.is_lit();
        let tone_mapping = if features.contains(MaterialFeatures::TONE_MAPPED) {
            scene.output.tone_mapping
        } else {
            ToneMapping::None
        };
        let fog = if features.contains(MaterialFeatures::FOG) {
            scene.fog
        } else {
            FogKind::None
        };

        let lights = if lit { scene.lights } else { LightCounts::default() };
        let any_shadow =
            lights.directional_shadow + lights.point_shadow + lights.spot_shadow > 0;

        Self {
            model,
            features,
            geometry,
            lights,
            shadow_map: if any_shadow { scene.shadow_map } else { None },
            clipping,
            color_space: scene.output.color_space,
            tone_mapping,
            fog,
            instanced,
            defines_hash,
        }
    }

    #[must_use]
    pub fn hash_u64(&self) -> u64 {
        fx_hash_key(self)
    }

    /// Flattens the key into template defines.
    ///
    /// Boolean flags become `"1"`; counts become decimal strings.
    #[must_use]
    pub fn template_defines(&self) -> BTreeMap<String, String> {
        let mut defines = BTreeMap::new();
        let mut flag = |name: &str| {
            defines.insert(name.to_string(), "1".to_string());
        };

        for (name, _) in self.features.iter_names() {
            flag(name);
        }
        for (name, _) in self.geometry.iter_names() {
            flag(name);
        }
        if self.instanced {
            flag("USE_INSTANCING");
        }
        if self.model.is_physical() {
            flag("PHYSICAL");
        }
        if self.color_space == ColorSpace::Srgb {
            flag("SRGB_OUTPUT");
        }
        match self.fog {
            FogKind::None => {}
            FogKind::Linear => flag("USE_FOG"),
            FogKind::Exp2 => {
                flag("USE_FOG");
                flag("FOG_EXP2");
            }
        }
        if let Some(kind) = self.shadow_map {
            flag("USE_SHADOWMAP");
            flag(match kind {
                ShadowMapType::Basic => "SHADOWMAP_TYPE_BASIC",
                ShadowMapType::Pcf => "SHADOWMAP_TYPE_PCF",
                ShadowMapType::PcfSoft => "SHADOWMAP_TYPE_PCF_SOFT",
                ShadowMapType::Vsm => "SHADOWMAP_TYPE_VSM",
            });
        }

        let l = &self.lights;
        for (name, count) in [
            ("NUM_DIR_LIGHTS", l.directional),
            ("NUM_POINT_LIGHTS", l.point),
            ("NUM_SPOT_LIGHTS", l.spot),
            ("NUM_HEMI_LIGHTS", l.hemisphere),
            ("NUM_DIR_LIGHT_SHADOWS", l.directional_shadow),
            ("NUM_POINT_LIGHT_SHADOWS", l.point_shadow),
            ("NUM_SPOT_LIGHT_SHADOWS", l.spot_shadow),
            ("NUM_CLIPPING_PLANES", self.clipping.planes),
            ("UNION_CLIPPING_PLANES", self.clipping.planes - self.clipping.intersection),
        ] {
            defines.insert(name.to_string(), count.to_string());
        }
        defines.insert(
            "TONE_MAPPING".to_string(),
            self.tone_mapping.name().to_string(),
        );
        defines
    }
}

/// L1 key: handles and version counters only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FastProgramKey {
    pub material: MaterialHandle,
    pub material_version: u64,
    pub geometry: GeometryHandle,
    pub geometry_layout_version: u64,
    pub side: Side,
    pub instanced: bool,
    pub light_version: u64,
    pub clipping_version: u64,
    pub fog: FogKind,
    pub output: OutputTarget,
    pub settings_version: u64,
}

/// Computes a `u64` hash of any `Hash`-able value using `FxHasher`.
#[inline]
pub fn fx_hash_key<K: Hash>(key: &K) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> SceneInputs {
        SceneInputs {
            lights: LightCounts {
                directional: 1,
                ..LightCounts::default()
            },
            shadow_map: Some(ShadowMapType::Pcf),
            fog: FogKind::None,
            output: OutputTarget {
                color_space: ColorSpace::Srgb,
                tone_mapping: ToneMapping::AcesFilmic,
            },
        }
    }

    #[test]
    fn unlit_models_ignore_lights() {
        let a = ProgramKey::new(
            ShadingModel::Basic,
            MaterialFeatures::TONE_MAPPED,
            Side::Front,
            GeometryFeatures::empty(),
            ClippingCounts::default(),
            &inputs(),
            false,
            0,
        );
        let mut more_lights = inputs();
        more_lights.lights.point = 3;
        let b = ProgramKey::new(
            ShadingModel::Basic,
            MaterialFeatures::TONE_MAPPED,
            Side::Front,
            GeometryFeatures::empty(),
            ClippingCounts::default(),
            &more_lights,
            false,
            0,
        );
        assert_eq!(a, b);
        assert_eq!(a.tone_mapping, ToneMapping::AcesFilmic);
        assert_eq!(a.shadow_map, None);
    }

    #[test]
    fn side_override_changes_key() {
        let key = |side| {
            ProgramKey::new(
                ShadingModel::Standard,
                MaterialFeatures::DOUBLE_SIDED,
                side,
                GeometryFeatures::HAS_NORMAL,
                ClippingCounts::default(),
                &inputs(),
                false,
                0,
            )
        };
        let back = key(Side::Back);
        assert!(back.features.contains(MaterialFeatures::FLIP_SIDED));
        assert!(!back.features.contains(MaterialFeatures::DOUBLE_SIDED));
        assert_ne!(back, key(Side::Front));
    }

    #[test]
    fn defines_carry_counts_and_flags() {
        let key = ProgramKey::new(
            ShadingModel::Standard,
            MaterialFeatures::USE_MAP | MaterialFeatures::USE_UV,
            Side::Front,
            GeometryFeatures::HAS_NORMAL | GeometryFeatures::HAS_UV,
            ClippingCounts {
                planes: 2,
                intersection: 0,
            },
            &inputs(),
            false,
            0,
        );
        let defines = key.template_defines();
        assert_eq!(defines.get("NUM_DIR_LIGHTS").map(String::as_str), Some("1"));
        assert_eq!(defines.get("NUM_CLIPPING_PLANES").map(String::as_str), Some("2"));
        assert!(defines.contains_key("USE_MAP"));
        assert!(defines.contains_key("USE_UV"));
        assert!(defines.contains_key("PHYSICAL"));
        assert!(!defines.contains_key("TONE_MAPPED"));
    }
}
