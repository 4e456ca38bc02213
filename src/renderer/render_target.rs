//! Offscreen render targets.
//!
//! A [`RenderTarget`] is a plain description; the renderer allocates the
//! device framebuffer on first use and re-allocates it when the description
//! changes. Output into any offscreen target is linear and not tone mapped.

use crate::renderer::device::{FramebufferDesc, FramebufferId, GpuDevice, Rect, TextureId};
use crate::renderer::state::StateTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub depth: bool,
    pub stencil: bool,
    pub samples: u32,
}

impl RenderTarget {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            format: wgpu::TextureFormat::Rgba8Unorm,
            depth: true,
            stencil: false,
            samples: 1,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(1);
        self
    }

    #[must_use]
    pub fn viewport(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub(crate) fn desc(&self, max_samples: u32) -> FramebufferDesc {
        FramebufferDesc {
            width: self.width,
            height: self.height,
            color_format: self.format,
            depth: self.depth,
            stencil: self.stencil,
            samples: self.samples.clamp(1, max_samples.max(1)),
        }
    }
}

/// Device objects behind a target.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TargetSlot {
    desc: FramebufferDesc,
    pub(crate) framebuffer: FramebufferId,
    pub(crate) texture: TextureId,
}

impl TargetSlot {
    /// Returns the slot for `desc`, re-creating it when the description moved.
    pub(crate) fn ensure<D: GpuDevice>(
        slot: &mut Option<TargetSlot>,
        tracker: &mut StateTracker<D>,
        desc: FramebufferDesc,
    ) -> TargetSlot {
        if let Some(current) = *slot
            && current.desc == desc
        {
            return current;
        }
        Self::release(slot, tracker);
        let (framebuffer, texture) = tracker.device_mut().create_framebuffer(&desc);
        log::debug!(
            "allocated {}x{} {:?} render target ({} samples)",
            desc.width,
            desc.height,
            desc.color_format,
            desc.samples
        );
        let created = TargetSlot {
            desc,
            framebuffer,
            texture,
        };
        *slot = Some(created);
        created
    }

    pub(crate) fn release<D: GpuDevice>(slot: &mut Option<TargetSlot>, tracker: &mut StateTracker<D>) {
        if let Some(old) = slot.take() {
            tracker.forget_framebuffer(old.framebuffer);
            tracker.forget_texture(old.texture);
            let device = tracker.device_mut();
            device.delete_framebuffer(old.framebuffer);
            device.delete_texture(old.texture);
        }
    }
}
