//! Texture provider.
//!
//! Decoding and color conversion happen outside the core; a [`Texture`] is
//! already-decoded pixel data plus the sampling parameters the texture
//! manager forwards to the device. Uploads are keyed on [`Texture::version`].

use glam::{Mat3, Vec2};
use serde::{Deserialize, Serialize};

use crate::resources::version_tracker::{ChangeTracker, MutGuard};

/// Color space of texel data or of the final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    /// Linear-light values, no transfer function.
    Linear,
    /// sRGB transfer function.
    #[default]
    Srgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSampler {
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmaps: bool,
    /// Anisotropic filtering level (1 = off)
    pub anisotropy_clamp: u16,
}

impl Default for TextureSampler {
    fn default() -> Self {
        Self {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmaps: true,
            anisotropy_clamp: 1,
        }
    }
}

/// UV transform applied in the vertex stage (`mapTransform` uniform).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureTransform {
    pub offset: Vec2,
    pub repeat: Vec2,
    pub rotation: f32,
    pub center: Vec2,
}

impl Default for TextureTransform {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            repeat: Vec2::ONE,
            rotation: 0.0,
            center: Vec2::new(0.5, 0.5),
        }
    }
}

impl TextureTransform {
    /// Column-major 3x3 UV matrix: translate(offset) * rotate-about-center * scale(repeat).
    #[must_use]
    pub fn matrix(&self) -> Mat3 {
        let (s, c) = self.rotation.sin_cos();
        let (sx, sy) = (self.repeat.x, self.repeat.y);
        let (cx, cy) = (self.center.x, self.center.y);
        Mat3::from_cols_array(&[
            sx * c,
            -sy * s,
            0.0,
            sx * s,
            sy * c,
            0.0,
            -sx * (c * cx + s * cy) + cx + self.offset.x,
            -sy * (-s * cx + c * cy) + cy + self.offset.y,
            1.0,
        ])
    }
}

/// Already-decoded 2D texture data.
#[derive(Debug, Clone)]
pub struct Texture {
    pub name: String,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    pub color_space: ColorSpace,
    data: Option<Vec<u8>>,
    pub sampler: TextureSampler,
    pub transform: TextureTransform,
    tracker: ChangeTracker,
}

impl Texture {
    #[must_use]
    pub fn new(width: u32, height: u32, format: wgpu::TextureFormat, data: Option<Vec<u8>>) -> Self {
        Self {
            name: String::new(),
            width,
            height,
            format,
            color_space: ColorSpace::Srgb,
            data,
            sampler: TextureSampler::default(),
            transform: TextureTransform::default(),
            tracker: ChangeTracker::new(),
        }
    }

    /// A 1x1 RGBA8 texture, mainly useful for tests and placeholders.
    #[must_use]
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new(1, 1, wgpu::TextureFormat::Rgba8UnormSrgb, Some(rgba.to_vec()))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Replaces the texel data; the next frame re-uploads it.
    pub fn set_data(&mut self, width: u32, height: u32, data: Vec<u8>) {
        self.width = width;
        self.height = height;
        self.data = Some(data);
        self.tracker.changed();
    }

    /// Mutable access to the sampler; marks the texture for re-upload.
    pub fn sampler_mut(&mut self) -> MutGuard<'_, TextureSampler> {
        MutGuard::new(&mut self.sampler, &mut self.tracker)
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_matrix() {
        let m = TextureTransform::default().matrix();
        assert!(m.abs_diff_eq(Mat3::IDENTITY, 1e-6));
    }

    #[test]
    fn offset_and_repeat() {
        let t = TextureTransform {
            offset: Vec2::new(0.25, 0.5),
            repeat: Vec2::new(2.0, 2.0),
            rotation: 0.0,
            center: Vec2::ZERO,
        };
        let uv = t.matrix() * glam::Vec3::new(1.0, 1.0, 1.0);
        assert!((uv.x - 2.25).abs() < 1e-6);
        assert!((uv.y - 2.5).abs() < 1e-6);
    }
}
