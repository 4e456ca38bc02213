//! Renderer Settings & Device Capabilities
//!
//! [`RendererSettings`] carries every policy knob of the frame driver. It is
//! plain serde data so hosts can load it from their own config files.
//! Changing it through [`Renderer::settings_mut`] bumps a settings version
//! that invalidates the program cache's fast lookup keys.
//!
//! [`Capabilities`] are hard limits reported by the device; they are not
//! configurable.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use prism::renderer::settings::{RendererSettings, ToneMapping};
//!
//! let settings = RendererSettings {
//!     tone_mapping: ToneMapping::AcesFilmic,
//!     max_lights: 8,
//!     ..Default::default()
//! };
//! ```
//!
//! [`Renderer::settings_mut`]: crate::renderer::Renderer::settings_mut

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::resources::texture::ColorSpace;
use crate::scene::camera::DepthOrigin;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Tone-mapping operator applied in the fragment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ToneMapping {
    #[default]
    None,
    Linear,
    Reinhard,
    Cineon,
    AcesFilmic,
    AgX,
    Neutral,
}

impl ToneMapping {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ToneMapping::None => "none",
            ToneMapping::Linear => "linear",
            ToneMapping::Reinhard => "reinhard",
            ToneMapping::Cineon => "cineon",
            ToneMapping::AcesFilmic => "aces_filmic",
            ToneMapping::AgX => "agx",
            ToneMapping::Neutral => "neutral",
        }
    }
}

/// Shadow filtering; only affects generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShadowMapType {
    Basic,
    #[default]
    Pcf,
    PcfSoft,
    Vsm,
}

// ---------------------------------------------------------------------------
// Program eviction
// ---------------------------------------------------------------------------

/// What happens to a program whose reference count drops to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Destroy at once.
    Immediate,
    /// Keep for reuse; destroy after `idle_frames` frames unused.
    KeepWarm { idle_frames: u64 },
}

impl EvictionPolicy {
    /// Frames an unused resource survives before it is destroyed.
    #[must_use]
    pub fn idle_frames(self) -> u64 {
        match self {
            EvictionPolicy::Immediate => 0,
            EvictionPolicy::KeepWarm { idle_frames } => idle_frames,
        }
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::KeepWarm { idle_frames: 120 }
    }
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Color space of the default framebuffer.
    pub output_color_space: ColorSpace,
    pub tone_mapping: ToneMapping,
    pub tone_mapping_exposure: f32,

    /// Sort render-list buckets. When off, draw order is traversal order.
    pub sort_objects: bool,
    pub depth_origin: DepthOrigin,

    pub eviction: EvictionPolicy,
    /// Lights past this count (per kind) are dropped with a diagnostic.
    pub max_lights: u32,

    /// World-space clipping planes applied to every material.
    pub clipping_planes: Vec<Vec4>,
    /// Honor per-material clipping planes.
    pub local_clipping: bool,

    pub transmission: bool,
    /// Transmission target size relative to the drawing buffer.
    pub transmission_resolution_scale: f32,

    pub auto_clear: bool,
    pub auto_clear_color: bool,
    pub auto_clear_depth: bool,
    pub auto_clear_stencil: bool,
    pub clear_color: Vec3,
    pub clear_alpha: f32,

    /// Draw transparent double-sided materials back faces first.
    pub two_pass_double_sided: bool,

    pub shadow_map_enabled: bool,
    pub shadow_map_type: ShadowMapType,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            output_color_space: ColorSpace::Srgb,
            tone_mapping: ToneMapping::None,
            tone_mapping_exposure: 1.0,
            sort_objects: true,
            depth_origin: DepthOrigin::ZeroToOne,
            eviction: EvictionPolicy::default(),
            max_lights: 16,
            clipping_planes: Vec::new(),
            local_clipping: false,
            transmission: true,
            transmission_resolution_scale: 1.0,
            auto_clear: true,
            auto_clear_color: true,
            auto_clear_depth: true,
            auto_clear_stencil: true,
            clear_color: Vec3::ZERO,
            clear_alpha: 1.0,
            two_pass_double_sided: true,
            shadow_map_enabled: false,
            shadow_map_type: ShadowMapType::Pcf,
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Hard device limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub max_texture_units: u32,
    /// Shared by the light arrays and clipping planes after a fixed reserve.
    pub max_fragment_uniform_vectors: u32,
    pub max_samples: u32,
    /// Lights per kind the generated programs accept.
    pub max_lights: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_texture_units: 16,
            max_fragment_uniform_vectors: 1024,
            max_samples: 4,
            max_lights: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_deserialize_with_defaults() {
        let s: RendererSettings =
            serde_json::from_str(r#"{ "tone_mapping": "AcesFilmic", "max_lights": 4 }"#)
                .expect("valid settings");
        assert_eq!(s.tone_mapping, ToneMapping::AcesFilmic);
        assert_eq!(s.max_lights, 4);
        assert!(s.sort_objects);
        assert_eq!(s.eviction, EvictionPolicy::KeepWarm { idle_frames: 120 });
    }
}
