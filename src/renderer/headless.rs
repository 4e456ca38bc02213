//! Headless recording device.
//!
//! [`HeadlessDevice`] implements [`GpuDevice`] without a GPU: every call is
//! appended to a [`DeviceCall`] log so tests can assert on the exact sequence
//! of state changes and draws instead of on pixels.
//!
//! Uniform and attribute locations are simulated by scanning program source
//! for `uniform` and vertex-stage `in` declarations, so an uniform the
//! generated code never declares has no location, exactly like a real driver
//! that optimized it out.

use glam::Vec4;
use rustc_hash::FxHashMap;

use crate::renderer::device::{
    BufferData, BufferId, Capability, ClearFlags, DrawCall, FramebufferDesc, FramebufferId,
    GpuDevice, ProgramId, Rect, TextureId, TextureUpload, UniformLocation, VertexArrayId,
};
use crate::renderer::settings::Capabilities;
use crate::resources::uniforms::UniformValue;

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateProgram(ProgramId),
    DeleteProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    SetUniform {
        location: UniformLocation,
        value: UniformValue,
    },

    CreateBuffer(BufferId),
    UploadBuffer { buffer: BufferId, bytes: usize },
    DeleteBuffer(BufferId),
    CreateVertexArray(VertexArrayId),
    DeleteVertexArray(VertexArrayId),
    BindVertexArray(Option<VertexArrayId>),
    VertexAttrib {
        location: u32,
        buffer: BufferId,
        item_size: u32,
    },
    BindIndexBuffer(Option<BufferId>),

    CreateTexture(TextureId),
    UploadTexture { width: u32, height: u32 },
    DeleteTexture(TextureId),
    ActiveTexture(u32),
    BindTexture(Option<TextureId>),

    CreateFramebuffer(FramebufferId),
    DeleteFramebuffer(FramebufferId),
    BindFramebuffer(Option<FramebufferId>),
    ResolveFramebuffer(FramebufferId),

    Enable(Capability),
    Disable(Capability),
    BlendEquation(wgpu::BlendOperation, wgpu::BlendOperation),
    BlendFunc(
        wgpu::BlendFactor,
        wgpu::BlendFactor,
        wgpu::BlendFactor,
        wgpu::BlendFactor,
    ),
    BlendColor(Vec4),
    DepthFunc(wgpu::CompareFunction),
    DepthMask(bool),
    StencilFunc(wgpu::CompareFunction, u32, u32),
    StencilOp(
        wgpu::StencilOperation,
        wgpu::StencilOperation,
        wgpu::StencilOperation,
    ),
    StencilMask(u32),
    ColorMask(bool),
    CullFace(wgpu::Face),
    FrontFace(wgpu::FrontFace),
    PolygonOffset(f32, f32),
    Viewport(Rect),
    Scissor(Rect),

    ClearColor(Vec4),
    ClearDepth(f32),
    ClearStencil(u32),
    Clear(ClearFlags),
    Draw(DrawCall),
}

impl DeviceCall {
    /// Fixed-function state calls, the ones the state tracker gates.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            DeviceCall::Enable(_)
                | DeviceCall::Disable(_)
                | DeviceCall::BlendEquation(..)
                | DeviceCall::BlendFunc(..)
                | DeviceCall::BlendColor(_)
                | DeviceCall::DepthFunc(_)
                | DeviceCall::DepthMask(_)
                | DeviceCall::StencilFunc(..)
                | DeviceCall::StencilOp(..)
                | DeviceCall::StencilMask(_)
                | DeviceCall::ColorMask(_)
                | DeviceCall::CullFace(_)
                | DeviceCall::FrontFace(_)
                | DeviceCall::PolygonOffset(..)
                | DeviceCall::Viewport(_)
                | DeviceCall::Scissor(_)
                | DeviceCall::ActiveTexture(_)
                | DeviceCall::BindTexture(_)
                | DeviceCall::BindFramebuffer(_)
                | DeviceCall::UseProgram(_)
                | DeviceCall::BindVertexArray(_)
                | DeviceCall::ClearColor(_)
                | DeviceCall::ClearDepth(_)
                | DeviceCall::ClearStencil(_)
        )
    }
}

#[derive(Debug, Clone)]
struct ProgramRecord {
    vertex: String,
    fragment: String,
    uniforms: Vec<String>,
    attributes: Vec<String>,
    ready: bool,
}

/// Recording device used by tests and benches.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    calls: Vec<DeviceCall>,
    capabilities: Capabilities,
    next_id: u32,
    programs: FxHashMap<ProgramId, ProgramRecord>,
    fail_marker: Option<String>,
    deferred_compiles: bool,
    current_program: Option<ProgramId>,
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    /// Programs whose source contains `marker` fail to compile.
    pub fn fail_compiles_containing(&mut self, marker: impl Into<String>) {
        self.fail_marker = Some(marker.into());
    }

    pub fn clear_fail_marker(&mut self) {
        self.fail_marker = None;
    }

    /// New programs report not-ready until [`finish_compiles`](Self::finish_compiles).
    pub fn defer_compiles(&mut self, deferred: bool) {
        self.deferred_compiles = deferred;
    }

    pub fn finish_compiles(&mut self) {
        for record in self.programs.values_mut() {
            record.ready = true;
        }
    }

    #[must_use]
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    #[must_use]
    pub fn compile_count(&self) -> usize {
        self.count(|c| matches!(c, DeviceCall::CreateProgram(_)))
    }

    #[must_use]
    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Draw(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Sources of a live program.
    #[must_use]
    pub fn program_source(&self, program: ProgramId) -> Option<(&str, &str)> {
        self.programs
            .get(&program)
            .map(|p| (p.vertex.as_str(), p.fragment.as_str()))
    }

    /// Name of the uniform behind `location`.
    #[must_use]
    pub fn uniform_name(&self, location: UniformLocation) -> Option<&str> {
        let program = ProgramId(location.0 >> 16);
        let index = (location.0 & 0xFFFF) as usize;
        self.programs
            .get(&program)
            .and_then(|p| p.uniforms.get(index))
            .map(String::as_str)
    }

    /// Uploads recorded for the uniform called `name`, in order.
    #[must_use]
    pub fn uniform_uploads(&self, name: &str) -> Vec<UniformValue> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::SetUniform { location, value }
                    if self.uniform_name(*location) == Some(name) =>
                {
                    Some(value.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn alloc(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Declared names from `uniform` lines, or from `in` lines of a vertex stage.
fn scan_declarations(source: &str, keyword: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix(keyword) else {
            continue;
        };
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let decl = rest.trim_end().trim_end_matches(';');
        let decl = decl.split('[').next().unwrap_or(decl);
        if let Some(name) = decl.split_whitespace().last()
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    names
}

impl GpuDevice for HeadlessDevice {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_program(&mut self, vertex: &str, fragment: &str) -> Result<ProgramId, String> {
        if let Some(marker) = &self.fail_marker
            && (vertex.contains(marker.as_str()) || fragment.contains(marker.as_str()))
        {
            return Err(format!("ERROR: 0:1: '{marker}' : syntax error"));
        }

        let id = ProgramId(self.alloc());
        let mut uniforms = scan_declarations(vertex, "uniform");
        for name in scan_declarations(fragment, "uniform") {
            if !uniforms.contains(&name) {
                uniforms.push(name);
            }
        }
        let attributes = scan_declarations(vertex, "in");

        self.programs.insert(
            id,
            ProgramRecord {
                vertex: vertex.to_string(),
                fragment: fragment.to_string(),
                uniforms,
                attributes,
                ready: !self.deferred_compiles,
            },
        );
        self.calls.push(DeviceCall::CreateProgram(id));
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.calls.push(DeviceCall::DeleteProgram(program));
    }

    fn program_ready(&self, program: ProgramId) -> bool {
        self.programs.get(&program).is_some_and(|p| p.ready)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let record = self.programs.get(&program)?;
        let index = record.uniforms.iter().position(|n| n == name)?;
        Some(UniformLocation((program.0 << 16) | index as u32))
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        let record = self.programs.get(&program)?;
        record
            .attributes
            .iter()
            .position(|n| n == name)
            .map(|i| i as u32)
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current_program = program;
        self.calls.push(DeviceCall::UseProgram(program));
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        debug_assert_eq!(
            self.current_program.map(|p| p.0),
            Some(location.0 >> 16),
            "uniform uploaded to a program that is not bound"
        );
        self.calls.push(DeviceCall::SetUniform {
            location,
            value: value.clone(),
        });
    }

    fn create_buffer(&mut self) -> BufferId {
        let id = BufferId(self.alloc());
        self.calls.push(DeviceCall::CreateBuffer(id));
        id
    }

    fn upload_buffer(&mut self, buffer: BufferId, data: BufferData<'_>) {
        self.calls.push(DeviceCall::UploadBuffer {
            buffer,
            bytes: data.as_bytes().len(),
        });
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.calls.push(DeviceCall::DeleteBuffer(buffer));
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = VertexArrayId(self.alloc());
        self.calls.push(DeviceCall::CreateVertexArray(id));
        id
    }

    fn delete_vertex_array(&mut self, vao: VertexArrayId) {
        self.calls.push(DeviceCall::DeleteVertexArray(vao));
    }

    fn bind_vertex_array(&mut self, vao: Option<VertexArrayId>) {
        self.calls.push(DeviceCall::BindVertexArray(vao));
    }

    fn vertex_attrib(&mut self, location: u32, buffer: BufferId, item_size: u32, _normalized: bool) {
        self.calls.push(DeviceCall::VertexAttrib {
            location,
            buffer,
            item_size,
        });
    }

    fn bind_index_buffer(&mut self, buffer: Option<BufferId>) {
        self.calls.push(DeviceCall::BindIndexBuffer(buffer));
    }

    fn create_texture(&mut self) -> TextureId {
        let id = TextureId(self.alloc());
        self.calls.push(DeviceCall::CreateTexture(id));
        id
    }

    fn upload_texture(&mut self, upload: &TextureUpload<'_>) {
        self.calls.push(DeviceCall::UploadTexture {
            width: upload.width,
            height: upload.height,
        });
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.calls.push(DeviceCall::DeleteTexture(texture));
    }

    fn active_texture(&mut self, unit: u32) {
        self.calls.push(DeviceCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.calls.push(DeviceCall::BindTexture(texture));
    }

    fn create_framebuffer(&mut self, _desc: &FramebufferDesc) -> (FramebufferId, TextureId) {
        let fb = FramebufferId(self.alloc());
        let color = TextureId(self.alloc());
        self.calls.push(DeviceCall::CreateFramebuffer(fb));
        (fb, color)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.calls.push(DeviceCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.calls.push(DeviceCall::BindFramebuffer(framebuffer));
    }

    fn resolve_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.calls.push(DeviceCall::ResolveFramebuffer(framebuffer));
    }

    fn enable(&mut self, cap: Capability) {
        self.calls.push(DeviceCall::Enable(cap));
    }

    fn disable(&mut self, cap: Capability) {
        self.calls.push(DeviceCall::Disable(cap));
    }

    fn blend_equation(&mut self, color: wgpu::BlendOperation, alpha: wgpu::BlendOperation) {
        self.calls.push(DeviceCall::BlendEquation(color, alpha));
    }

    fn blend_func(
        &mut self,
        src: wgpu::BlendFactor,
        dst: wgpu::BlendFactor,
        src_alpha: wgpu::BlendFactor,
        dst_alpha: wgpu::BlendFactor,
    ) {
        self.calls
            .push(DeviceCall::BlendFunc(src, dst, src_alpha, dst_alpha));
    }

    fn blend_color(&mut self, color: Vec4) {
        self.calls.push(DeviceCall::BlendColor(color));
    }

    fn depth_func(&mut self, func: wgpu::CompareFunction) {
        self.calls.push(DeviceCall::DepthFunc(func));
    }

    fn depth_mask(&mut self, write: bool) {
        self.calls.push(DeviceCall::DepthMask(write));
    }

    fn stencil_func(&mut self, func: wgpu::CompareFunction, reference: u32, mask: u32) {
        self.calls
            .push(DeviceCall::StencilFunc(func, reference, mask));
    }

    fn stencil_op(
        &mut self,
        fail: wgpu::StencilOperation,
        depth_fail: wgpu::StencilOperation,
        pass: wgpu::StencilOperation,
    ) {
        self.calls
            .push(DeviceCall::StencilOp(fail, depth_fail, pass));
    }

    fn stencil_mask(&mut self, mask: u32) {
        self.calls.push(DeviceCall::StencilMask(mask));
    }

    fn color_mask(&mut self, write: bool) {
        self.calls.push(DeviceCall::ColorMask(write));
    }

    fn cull_face(&mut self, face: wgpu::Face) {
        self.calls.push(DeviceCall::CullFace(face));
    }

    fn front_face(&mut self, face: wgpu::FrontFace) {
        self.calls.push(DeviceCall::FrontFace(face));
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.calls.push(DeviceCall::PolygonOffset(factor, units));
    }

    fn viewport(&mut self, rect: Rect) {
        self.calls.push(DeviceCall::Viewport(rect));
    }

    fn scissor(&mut self, rect: Rect) {
        self.calls.push(DeviceCall::Scissor(rect));
    }

    fn clear_color(&mut self, color: Vec4) {
        self.calls.push(DeviceCall::ClearColor(color));
    }

    fn clear_depth(&mut self, depth: f32) {
        self.calls.push(DeviceCall::ClearDepth(depth));
    }

    fn clear_stencil(&mut self, stencil: u32) {
        self.calls.push(DeviceCall::ClearStencil(stencil));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.calls.push(DeviceCall::Clear(flags));
    }

    fn draw(&mut self, call: &DrawCall) {
        self.calls.push(DeviceCall::Draw(*call));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "in vec3 position;\nin vec2 uv;\nuniform mat4 modelViewMatrix;\nuniform highp vec3 lights[ 4 ];\n";
    const FS: &str = "uniform vec3 diffuse;\nuniform mat4 modelViewMatrix;\n";

    #[test]
    fn scans_uniforms_and_attributes() {
        let mut dev = HeadlessDevice::new();
        let p = dev.create_program(VS, FS).expect("compiles");
        assert!(dev.uniform_location(p, "diffuse").is_some());
        assert!(dev.uniform_location(p, "lights").is_some());
        assert!(dev.uniform_location(p, "opacity").is_none());
        assert_eq!(dev.attribute_location(p, "uv"), Some(1));

        let loc = dev.uniform_location(p, "modelViewMatrix").expect("declared");
        assert_eq!(dev.uniform_name(loc), Some("modelViewMatrix"));
    }

    #[test]
    fn fail_marker_rejects_compile() {
        let mut dev = HeadlessDevice::new();
        dev.fail_compiles_containing("diffuse");
        assert!(dev.create_program(VS, FS).is_err());
        assert_eq!(dev.compile_count(), 0);
    }

    #[test]
    fn deferred_compiles_poll() {
        let mut dev = HeadlessDevice::new();
        dev.defer_compiles(true);
        let p = dev.create_program(VS, FS).expect("compiles");
        assert!(!dev.program_ready(p));
        dev.finish_compiles();
        assert!(dev.program_ready(p));
    }
}
