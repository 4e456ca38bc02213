//! Texture uploads and unit allocation.
//!
//! Device textures are created lazily the first time a material samples a
//! [`Texture`] and re-uploaded whenever its version moves. Texture units are
//! handed out per draw in slot order; a draw that needs more units than the
//! device has gets the first `max_texture_units` and the rest are reported.

use slotmap::SparseSecondaryMap;

use crate::assets::TextureHandle;
use crate::renderer::device::{GpuDevice, TextureId, TextureUpload};
use crate::renderer::state::StateTracker;
use crate::resources::texture::Texture;

#[derive(Debug, Clone, Copy)]
struct GpuTexture {
    id: TextureId,
    version: u64,
    last_used_frame: u64,
}

#[derive(Debug)]
pub struct TextureManager {
    textures: SparseSecondaryMap<TextureHandle, GpuTexture>,
    max_units: u32,
    next_unit: u32,
    requested_units: u32,
    frame: u64,
    uploads: u64,
}

impl TextureManager {
    #[must_use]
    pub fn new(max_units: u32) -> Self {
        Self {
            textures: SparseSecondaryMap::new(),
            max_units,
            next_unit: 0,
            requested_units: 0,
            frame: 0,
            uploads: 0,
        }
    }

    pub fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    /// Starts unit allocation for a new draw.
    pub fn reset_units(&mut self) {
        self.next_unit = 0;
        self.requested_units = 0;
    }

    /// Next free unit, or `None` once the device limit is reached.
    pub fn allocate_unit(&mut self) -> Option<u32> {
        self.requested_units += 1;
        if self.next_unit >= self.max_units {
            return None;
        }
        let unit = self.next_unit;
        self.next_unit += 1;
        Some(unit)
    }

    /// Units the current draw asked for, including refused ones.
    #[must_use]
    pub fn requested_units(&self) -> u32 {
        self.requested_units
    }

    #[must_use]
    pub fn max_units(&self) -> u32 {
        self.max_units
    }

    /// Binds an asset texture on a fresh unit, uploading it first if stale.
    pub fn bind<D: GpuDevice>(
        &mut self,
        tracker: &mut StateTracker<D>,
        handle: TextureHandle,
        texture: &Texture,
    ) -> Option<u32> {
        let unit = self.allocate_unit()?;
        let frame = self.frame;

        if !self.textures.contains_key(handle) {
            let id = tracker.device_mut().create_texture();
            self.textures.insert(handle, GpuTexture {
                id,
                version: u64::MAX,
                last_used_frame: frame,
            });
        }
        let gpu = self.textures.get_mut(handle)?;
        gpu.last_used_frame = frame;
        let id = gpu.id;
        let stale = gpu.version != texture.version();
        gpu.version = texture.version();

        tracker.bind_texture(unit, Some(id));
        if stale {
            tracker.set_active_texture(unit);
            tracker.device_mut().upload_texture(&TextureUpload {
                width: texture.width(),
                height: texture.height(),
                format: texture.format(),
                data: texture.data(),
                sampler: texture.sampler,
            });
            self.uploads += 1;
            log::trace!("uploaded texture '{}' ({}x{})", texture.name, texture.width(), texture.height());
        }
        Some(unit)
    }

    /// Binds a device texture the renderer owns (render-target color) on a
    /// fresh unit.
    pub fn bind_raw<D: GpuDevice>(
        &mut self,
        tracker: &mut StateTracker<D>,
        texture: TextureId,
    ) -> Option<u32> {
        let unit = self.allocate_unit()?;
        tracker.bind_texture(unit, Some(texture));
        Some(unit)
    }

    /// Deletes the device copy of `handle`.
    pub fn dispose<D: GpuDevice>(&mut self, tracker: &mut StateTracker<D>, handle: TextureHandle) {
        if let Some(gpu) = self.textures.remove(handle) {
            tracker.forget_texture(gpu.id);
            tracker.device_mut().delete_texture(gpu.id);
        }
    }

    /// Deletes device textures unused for more than `idle_frames`.
    pub fn collect_garbage<D: GpuDevice>(&mut self, tracker: &mut StateTracker<D>, idle_frames: u64) {
        let frame = self.frame;
        let stale: Vec<TextureHandle> = self
            .textures
            .iter()
            .filter(|(_, t)| frame.saturating_sub(t.last_used_frame) > idle_frames)
            .map(|(h, _)| h)
            .collect();
        for handle in stale {
            self.dispose(tracker, handle);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    #[must_use]
    pub fn uploads(&self) -> u64 {
        self.uploads
    }
}
