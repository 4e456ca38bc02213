//! Fixed-function material settings.
//!
//! These are the fields the GPU state tracker applies per draw. Most of them
//! only affect device state; the few that change generated code (alpha test,
//! vertex colors, flat shading, side, premultiplied alpha, tone mapping, fog)
//! are folded into [`MaterialFeatures`](super::MaterialFeatures).

use glam::{Vec3, Vec4};

/// Which faces are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

/// Explicit per-equation blend parameters.
///
/// Alpha parameters default to the color ones when `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomBlend {
    pub equation: wgpu::BlendOperation,
    pub src: wgpu::BlendFactor,
    pub dst: wgpu::BlendFactor,
    pub equation_alpha: Option<wgpu::BlendOperation>,
    pub src_alpha: Option<wgpu::BlendFactor>,
    pub dst_alpha: Option<wgpu::BlendFactor>,
}

impl Default for CustomBlend {
    fn default() -> Self {
        Self {
            equation: wgpu::BlendOperation::Add,
            src: wgpu::BlendFactor::SrcAlpha,
            dst: wgpu::BlendFactor::OneMinusSrcAlpha,
            equation_alpha: None,
            src_alpha: None,
            dst_alpha: None,
        }
    }
}

/// Blend mode of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Blending {
    /// Blending disabled.
    None,
    #[default]
    Normal,
    Additive,
    Subtractive,
    Multiply,
    Custom(CustomBlend),
}

/// Stencil configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilSettings {
    pub enabled: bool,
    pub func: wgpu::CompareFunction,
    pub reference: u32,
    pub func_mask: u32,
    pub write_mask: u32,
    pub fail: wgpu::StencilOperation,
    pub depth_fail: wgpu::StencilOperation,
    pub pass: wgpu::StencilOperation,
}

impl Default for StencilSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            func: wgpu::CompareFunction::Always,
            reference: 0,
            func_mask: 0xFF,
            write_mask: 0xFF,
            fail: wgpu::StencilOperation::Keep,
            depth_fail: wgpu::StencilOperation::Keep,
            pass: wgpu::StencilOperation::Keep,
        }
    }
}

/// Depth-bias configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolygonOffset {
    pub enabled: bool,
    pub factor: f32,
    pub units: f32,
}

/// Material settings - fixed-function state plus code-affecting switches.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSettings {
    pub visible: bool,
    pub transparent: bool,
    pub blending: Blending,
    /// Constant color used by custom blend factors.
    pub blend_color: Vec4,
    pub premultiplied_alpha: bool,

    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: wgpu::CompareFunction,
    pub stencil: StencilSettings,

    pub side: Side,
    /// Transparent double-sided materials are drawn back-then-front unless set.
    pub force_single_pass: bool,
    pub polygon_offset: PolygonOffset,
    pub color_write: bool,

    /// Fragments with alpha below this are discarded; 0 disables the test.
    pub alpha_test: f32,
    pub alpha_to_coverage: bool,

    pub vertex_colors: bool,
    pub flat_shading: bool,
    pub tone_mapped: bool,
    pub fog: bool,
    pub dithering: bool,

    /// Object-local clipping planes in world space (`xyz` normal, `w` constant).
    pub clipping_planes: Vec<Vec4>,
    pub clip_intersection: bool,
    pub clip_shadows: bool,
}

impl Default for MaterialSettings {
    fn default() -> Self {
        Self {
            visible: true,
            transparent: false,
            blending: Blending::Normal,
            blend_color: Vec4::ZERO,
            premultiplied_alpha: false,
            depth_test: true,
            depth_write: true,
            depth_func: wgpu::CompareFunction::LessEqual,
            stencil: StencilSettings::default(),
            side: Side::Front,
            force_single_pass: false,
            polygon_offset: PolygonOffset::default(),
            color_write: true,
            alpha_test: 0.0,
            alpha_to_coverage: false,
            vertex_colors: false,
            flat_shading: false,
            tone_mapped: true,
            fog: true,
            dithering: false,
            clipping_planes: Vec::new(),
            clip_intersection: false,
            clip_shadows: false,
        }
    }
}

/// Numeric shading parameters. Changing them never changes generated code.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialUniforms {
    pub color: Vec3,
    pub opacity: f32,
    pub emissive: Vec3,
    pub emissive_intensity: f32,
    /// Phong specular color
    pub specular: Vec3,
    pub shininess: f32,
    pub roughness: f32,
    pub metalness: f32,
    pub ior: f32,
    /// Transmission factor; crossing zero switches the transparency class.
    pub transmission: f32,
    pub thickness: f32,
    pub attenuation_color: Vec3,
    pub attenuation_distance: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub reflectivity: f32,
    pub ao_map_intensity: f32,
    pub light_map_intensity: f32,
    pub normal_scale: glam::Vec2,
    pub bump_scale: f32,
    /// Distance material range
    pub near_distance: f32,
    pub far_distance: f32,
}

impl Default for MaterialUniforms {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            opacity: 1.0,
            emissive: Vec3::ZERO,
            emissive_intensity: 1.0,
            specular: Vec3::splat(0.066_666_67),
            shininess: 30.0,
            roughness: 1.0,
            metalness: 0.0,
            ior: 1.5,
            transmission: 0.0,
            thickness: 0.0,
            attenuation_color: Vec3::ONE,
            attenuation_distance: f32::INFINITY,
            clearcoat: 0.0,
            clearcoat_roughness: 0.0,
            reflectivity: 1.0,
            ao_map_intensity: 1.0,
            light_map_intensity: 1.0,
            normal_scale: glam::Vec2::ONE,
            bump_scale: 1.0,
            near_distance: 1.0,
            far_distance: 1000.0,
        }
    }
}
