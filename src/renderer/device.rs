//! GPU Device Abstraction
//!
//! [`GpuDevice`] is the only boundary allowed to issue real graphics-API
//! calls. It is deliberately close to a single-context immediate-mode API:
//! programs, textures, buffers, vertex arrays and framebuffers are created
//! and referenced by small integer ids, and fixed-function state is set one
//! orthogonal piece at a time.
//!
//! State-changing calls are only issued through
//! [`StateTracker`](super::state::StateTracker), which suppresses redundant
//! ones. Resource creation and uploads go through the managers owned by the
//! renderer.

use std::fmt;

use bitflags::bitflags;
use glam::Vec4;

use crate::renderer::settings::Capabilities;
use crate::resources::texture::TextureSampler;
use crate::resources::uniforms::UniformValue;

// ─── Ids ─────────────────────────────────────────────────────────────────────

macro_rules! device_id {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);

            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                }
            }
        )*
    };
}

device_id! {
    /// Linked vertex + fragment program.
    ProgramId;
    TextureId;
    BufferId;
    VertexArrayId;
    FramebufferId;
    /// Uniform location inside one program.
    UniformLocation;
}

// ─── State vocabulary ────────────────────────────────────────────────────────

/// Toggleable device capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend,
    DepthTest,
    StencilTest,
    CullFace,
    PolygonOffsetFill,
    SampleAlphaToCoverage,
    ScissorTest,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::Blend,
        Capability::DepthTest,
        Capability::StencilTest,
        Capability::CullFace,
        Capability::PolygonOffsetFill,
        Capability::SampleAlphaToCoverage,
        Capability::ScissorTest,
    ];

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// Integer rectangle in framebuffer pixels, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn scaled(self, factor: f32) -> Self {
        Self {
            x: (self.x as f32 * factor) as i32,
            y: (self.y as f32 * factor) as i32,
            width: ((self.width as f32 * factor) as u32).max(1),
            height: ((self.height as f32 * factor) as u32).max(1),
        }
    }
}

bitflags! {
    /// Buffers cleared by [`GpuDevice::clear`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    Triangles,
    Lines,
    Points,
}

/// One draw command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawCall {
    pub mode: PrimitiveMode,
    /// Draw from the bound index buffer instead of raw vertices.
    pub indexed: bool,
    pub start: u32,
    pub count: u32,
    pub instance_count: u32,
}

/// Data for one buffer upload.
#[derive(Debug, Clone, Copy)]
pub enum BufferData<'a> {
    Vertex(&'a [f32]),
    Index(&'a [u32]),
}

impl BufferData<'_> {
    /// Raw bytes as handed to the driver.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match *self {
            BufferData::Vertex(v) => bytemuck::cast_slice(v),
            BufferData::Index(i) => bytemuck::cast_slice(i),
        }
    }
}

/// Full texture (re-)upload.
#[derive(Debug, Clone, Copy)]
pub struct TextureUpload<'a> {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub data: Option<&'a [u8]>,
    pub sampler: TextureSampler,
}

/// Offscreen framebuffer with one color texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub width: u32,
    pub height: u32,
    pub color_format: wgpu::TextureFormat,
    pub depth: bool,
    pub stencil: bool,
    pub samples: u32,
}

// ─── The device trait ────────────────────────────────────────────────────────

/// A single-context GPU device.
///
/// All methods are synchronous. Program creation may compile asynchronously
/// inside the driver; [`program_ready`](Self::program_ready) polls that.
pub trait GpuDevice {
    fn capabilities(&self) -> Capabilities;

    // --- Programs ---

    /// Compiles and links a program. The error is the driver's info log.
    fn create_program(&mut self, vertex: &str, fragment: &str) -> Result<ProgramId, String>;
    fn delete_program(&mut self, program: ProgramId);
    fn program_ready(&self, program: ProgramId) -> bool;
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    fn use_program(&mut self, program: Option<ProgramId>);
    /// Uploads to the currently bound program.
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);

    // --- Buffers & vertex arrays ---

    fn create_buffer(&mut self) -> BufferId;
    fn upload_buffer(&mut self, buffer: BufferId, data: BufferData<'_>);
    fn delete_buffer(&mut self, buffer: BufferId);
    fn create_vertex_array(&mut self) -> VertexArrayId;
    fn delete_vertex_array(&mut self, vao: VertexArrayId);
    fn bind_vertex_array(&mut self, vao: Option<VertexArrayId>);
    /// Binds `buffer` to attribute `location` of the bound vertex array.
    fn vertex_attrib(&mut self, location: u32, buffer: BufferId, item_size: u32, normalized: bool);
    /// Binds the element buffer of the bound vertex array.
    fn bind_index_buffer(&mut self, buffer: Option<BufferId>);

    // --- Textures ---

    fn create_texture(&mut self) -> TextureId;
    /// Uploads to the texture bound on the active unit.
    fn upload_texture(&mut self, upload: &TextureUpload<'_>);
    fn delete_texture(&mut self, texture: TextureId);
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, texture: Option<TextureId>);

    // --- Framebuffers ---

    /// Returns the framebuffer and its color texture.
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> (FramebufferId, TextureId);
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    /// Resolves multisampling and regenerates mipmaps of the color texture.
    fn resolve_framebuffer(&mut self, framebuffer: FramebufferId);

    // --- Fixed-function state ---

    fn enable(&mut self, cap: Capability);
    fn disable(&mut self, cap: Capability);
    fn blend_equation(&mut self, color: wgpu::BlendOperation, alpha: wgpu::BlendOperation);
    fn blend_func(
        &mut self,
        src: wgpu::BlendFactor,
        dst: wgpu::BlendFactor,
        src_alpha: wgpu::BlendFactor,
        dst_alpha: wgpu::BlendFactor,
    );
    fn blend_color(&mut self, color: Vec4);
    fn depth_func(&mut self, func: wgpu::CompareFunction);
    fn depth_mask(&mut self, write: bool);
    fn stencil_func(&mut self, func: wgpu::CompareFunction, reference: u32, mask: u32);
    fn stencil_op(
        &mut self,
        fail: wgpu::StencilOperation,
        depth_fail: wgpu::StencilOperation,
        pass: wgpu::StencilOperation,
    );
    fn stencil_mask(&mut self, mask: u32);
    fn color_mask(&mut self, write: bool);
    fn cull_face(&mut self, face: wgpu::Face);
    fn front_face(&mut self, face: wgpu::FrontFace);
    fn polygon_offset(&mut self, factor: f32, units: f32);
    fn viewport(&mut self, rect: Rect);
    fn scissor(&mut self, rect: Rect);

    // --- Clear & draw ---

    fn clear_color(&mut self, color: Vec4);
    fn clear_depth(&mut self, depth: f32);
    fn clear_stencil(&mut self, stencil: u32);
    fn clear(&mut self, flags: ClearFlags);
    fn draw(&mut self, call: &DrawCall);
}
