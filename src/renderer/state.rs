//! GPU State Tracker
//!
//! [`StateTracker`] owns the device and mirrors its fixed-function state.
//! Each setter compares the request with the snapshot and only reaches the
//! device on change. Snapshot slots are `Option`s: `None` means unknown, so
//! the next setter always issues its call. [`StateTracker::reset`] returns
//! every slot to unknown, for use after something outside the tracker
//! touched the device (context loss, host rendering in between frames).
//!
//! Blending is a small state machine over [`Blending`]: preset modes diff
//! their equation and factors individually, while entering
//! [`Blending::Custom`] always re-issues the whole equation/factor/color
//! group because a custom mode aliases every blend parameter at once.

use glam::Vec4;

use crate::renderer::device::{
    Capability, ClearFlags, DrawCall, FramebufferId, GpuDevice, ProgramId, Rect, TextureId,
    UniformLocation, VertexArrayId,
};
use crate::resources::material::{Blending, CustomBlend, MaterialSettings, Side};
use crate::resources::uniforms::UniformValue;

type BlendFuncs = (
    wgpu::BlendFactor,
    wgpu::BlendFactor,
    wgpu::BlendFactor,
    wgpu::BlendFactor,
);

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlendState {
    Disabled,
    Preset { mode: Blending, premultiplied: bool },
    Custom { blend: CustomBlend, color: Vec4 },
}

/// Equation and factors of a preset blend mode.
fn preset_blend(mode: Blending, premultiplied: bool) -> (wgpu::BlendOperation, BlendFuncs) {
    use wgpu::BlendFactor as F;
    let add = wgpu::BlendOperation::Add;
    match (mode, premultiplied) {
        (Blending::Additive, false) => (add, (F::SrcAlpha, F::One, F::SrcAlpha, F::One)),
        (Blending::Additive, true) => (add, (F::One, F::One, F::One, F::One)),
        (Blending::Subtractive, false) => (add, (F::Zero, F::OneMinusSrc, F::Zero, F::One)),
        (Blending::Subtractive, true) => {
            (add, (F::Zero, F::OneMinusSrc, F::Zero, F::OneMinusSrcAlpha))
        }
        (Blending::Multiply, _) => (add, (F::Zero, F::Src, F::Zero, F::SrcAlpha)),
        (_, true) => (add, (F::One, F::OneMinusSrcAlpha, F::One, F::OneMinusSrcAlpha)),
        (_, false) => (
            add,
            (F::SrcAlpha, F::OneMinusSrcAlpha, F::One, F::OneMinusSrcAlpha),
        ),
    }
}

#[inline]
fn changed<T: PartialEq + Copy>(slot: &mut Option<T>, value: T) -> bool {
    if *slot == Some(value) {
        return false;
    }
    *slot = Some(value);
    true
}

/// Diffing front-end of a [`GpuDevice`].
pub struct StateTracker<D: GpuDevice> {
    device: D,

    capabilities: [Option<bool>; Capability::ALL.len()],

    blend: Option<BlendState>,
    blend_equation: Option<(wgpu::BlendOperation, wgpu::BlendOperation)>,
    blend_func: Option<BlendFuncs>,
    blend_color: Option<Vec4>,

    depth_func: Option<wgpu::CompareFunction>,
    depth_mask: Option<bool>,
    stencil_func: Option<(wgpu::CompareFunction, u32, u32)>,
    stencil_op: Option<(
        wgpu::StencilOperation,
        wgpu::StencilOperation,
        wgpu::StencilOperation,
    )>,
    stencil_mask: Option<u32>,
    color_mask: Option<bool>,

    cull_face: Option<wgpu::Face>,
    front_face: Option<wgpu::FrontFace>,
    polygon_offset: Option<(f32, f32)>,

    program: Option<Option<ProgramId>>,
    vertex_array: Option<Option<VertexArrayId>>,
    framebuffer: Option<Option<FramebufferId>>,
    viewport: Option<Rect>,
    scissor: Option<Rect>,

    active_unit: Option<u32>,
    unit_bindings: Vec<Option<Option<TextureId>>>,

    clear_color: Option<Vec4>,
    clear_depth: Option<f32>,
    clear_stencil: Option<u32>,
}

impl<D: GpuDevice> StateTracker<D> {
    pub fn new(device: D) -> Self {
        let units = device.capabilities().max_texture_units as usize;
        Self {
            device,
            capabilities: [None; Capability::ALL.len()],
            blend: None,
            blend_equation: None,
            blend_func: None,
            blend_color: None,
            depth_func: None,
            depth_mask: None,
            stencil_func: None,
            stencil_op: None,
            stencil_mask: None,
            color_mask: None,
            cull_face: None,
            front_face: None,
            polygon_offset: None,
            program: None,
            vertex_array: None,
            framebuffer: None,
            viewport: None,
            scissor: None,
            active_unit: None,
            unit_bindings: vec![None; units],
            clear_color: None,
            clear_depth: None,
            clear_stencil: None,
        }
    }

    /// Forgets the whole snapshot; every following setter reaches the device.
    pub fn reset(&mut self) {
        let units = self.device.capabilities().max_texture_units as usize;
        self.capabilities = [None; Capability::ALL.len()];
        self.blend = None;
        self.blend_equation = None;
        self.blend_func = None;
        self.blend_color = None;
        self.depth_func = None;
        self.depth_mask = None;
        self.stencil_func = None;
        self.stencil_op = None;
        self.stencil_mask = None;
        self.color_mask = None;
        self.cull_face = None;
        self.front_face = None;
        self.polygon_offset = None;
        self.program = None;
        self.vertex_array = None;
        self.framebuffer = None;
        self.viewport = None;
        self.scissor = None;
        self.active_unit = None;
        self.unit_bindings.clear();
        self.unit_bindings.resize(units, None);
        self.clear_color = None;
        self.clear_depth = None;
        self.clear_stencil = None;
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Direct device access for resource creation and uploads.
    ///
    /// Changing fixed-function state through this reference desyncs the
    /// snapshot until [`reset`](Self::reset) is called.
    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    // ─── Capabilities ────────────────────────────────────────────────────────

    pub fn enable(&mut self, cap: Capability) {
        if changed(&mut self.capabilities[cap.index()], true) {
            self.device.enable(cap);
        }
    }

    pub fn disable(&mut self, cap: Capability) {
        if changed(&mut self.capabilities[cap.index()], false) {
            self.device.disable(cap);
        }
    }

    pub fn set_capability(&mut self, cap: Capability, on: bool) {
        if on {
            self.enable(cap);
        } else {
            self.disable(cap);
        }
    }

    #[must_use]
    pub fn is_enabled(&self, cap: Capability) -> Option<bool> {
        self.capabilities[cap.index()]
    }

    // ─── Blending ────────────────────────────────────────────────────────────

    pub fn set_blending(&mut self, blending: Blending, premultiplied: bool, blend_color: Vec4) {
        match blending {
            Blending::None => {
                self.disable(Capability::Blend);
                self.blend = Some(BlendState::Disabled);
            }
            Blending::Custom(blend) => {
                self.enable(Capability::Blend);
                let want = BlendState::Custom {
                    blend,
                    color: blend_color,
                };
                if self.blend == Some(want) {
                    return;
                }
                let equations = (blend.equation, blend.equation_alpha.unwrap_or(blend.equation));
                let funcs = (
                    blend.src,
                    blend.dst,
                    blend.src_alpha.unwrap_or(blend.src),
                    blend.dst_alpha.unwrap_or(blend.dst),
                );
                self.device.blend_equation(equations.0, equations.1);
                self.device.blend_func(funcs.0, funcs.1, funcs.2, funcs.3);
                self.device.blend_color(blend_color);
                self.blend_equation = Some(equations);
                self.blend_func = Some(funcs);
                self.blend_color = Some(blend_color);
                self.blend = Some(want);
            }
            mode => {
                self.enable(Capability::Blend);
                let want = BlendState::Preset {
                    mode,
                    premultiplied,
                };
                if self.blend == Some(want) {
                    return;
                }
                let (equation, funcs) = preset_blend(mode, premultiplied);
                if changed(&mut self.blend_equation, (equation, equation)) {
                    self.device.blend_equation(equation, equation);
                }
                if changed(&mut self.blend_func, funcs) {
                    self.device.blend_func(funcs.0, funcs.1, funcs.2, funcs.3);
                }
                self.blend = Some(want);
            }
        }
    }

    // ─── Depth / stencil / color ─────────────────────────────────────────────

    pub fn set_depth_test(&mut self, on: bool) {
        self.set_capability(Capability::DepthTest, on);
    }

    pub fn set_depth_func(&mut self, func: wgpu::CompareFunction) {
        if changed(&mut self.depth_func, func) {
            self.device.depth_func(func);
        }
    }

    pub fn set_depth_mask(&mut self, write: bool) {
        if changed(&mut self.depth_mask, write) {
            self.device.depth_mask(write);
        }
    }

    pub fn set_stencil_test(&mut self, on: bool) {
        self.set_capability(Capability::StencilTest, on);
    }

    pub fn set_stencil_func(&mut self, func: wgpu::CompareFunction, reference: u32, mask: u32) {
        if changed(&mut self.stencil_func, (func, reference, mask)) {
            self.device.stencil_func(func, reference, mask);
        }
    }

    pub fn set_stencil_op(
        &mut self,
        fail: wgpu::StencilOperation,
        depth_fail: wgpu::StencilOperation,
        pass: wgpu::StencilOperation,
    ) {
        if changed(&mut self.stencil_op, (fail, depth_fail, pass)) {
            self.device.stencil_op(fail, depth_fail, pass);
        }
    }

    pub fn set_stencil_mask(&mut self, mask: u32) {
        if changed(&mut self.stencil_mask, mask) {
            self.device.stencil_mask(mask);
        }
    }

    pub fn set_color_mask(&mut self, write: bool) {
        if changed(&mut self.color_mask, write) {
            self.device.color_mask(write);
        }
    }

    // ─── Rasterizer ──────────────────────────────────────────────────────────

    /// `None` disables culling.
    pub fn set_cull_face(&mut self, face: Option<wgpu::Face>) {
        match face {
            Some(face) => {
                self.enable(Capability::CullFace);
                if changed(&mut self.cull_face, face) {
                    self.device.cull_face(face);
                }
            }
            None => self.disable(Capability::CullFace),
        }
    }

    pub fn set_front_face(&mut self, face: wgpu::FrontFace) {
        if changed(&mut self.front_face, face) {
            self.device.front_face(face);
        }
    }

    /// `None` disables the offset.
    pub fn set_polygon_offset(&mut self, offset: Option<(f32, f32)>) {
        match offset {
            Some((factor, units)) => {
                self.enable(Capability::PolygonOffsetFill);
                if changed(&mut self.polygon_offset, (factor, units)) {
                    self.device.polygon_offset(factor, units);
                }
            }
            None => self.disable(Capability::PolygonOffsetFill),
        }
    }

    // ─── Bindings ────────────────────────────────────────────────────────────

    pub fn use_program(&mut self, program: Option<ProgramId>) -> bool {
        if changed(&mut self.program, program) {
            self.device.use_program(program);
            return true;
        }
        false
    }

    #[must_use]
    pub fn bound_program(&self) -> Option<ProgramId> {
        self.program.flatten()
    }

    pub fn bind_vertex_array(&mut self, vao: Option<VertexArrayId>) {
        if changed(&mut self.vertex_array, vao) {
            self.device.bind_vertex_array(vao);
        }
    }

    pub fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        if changed(&mut self.framebuffer, framebuffer) {
            self.device.bind_framebuffer(framebuffer);
        }
    }

    #[must_use]
    pub fn bound_framebuffer(&self) -> Option<Option<FramebufferId>> {
        self.framebuffer
    }

    pub fn set_viewport(&mut self, rect: Rect) {
        if changed(&mut self.viewport, rect) {
            self.device.viewport(rect);
        }
    }

    /// `None` disables the scissor test.
    pub fn set_scissor(&mut self, rect: Option<Rect>) {
        match rect {
            Some(rect) => {
                self.enable(Capability::ScissorTest);
                if changed(&mut self.scissor, rect) {
                    self.device.scissor(rect);
                }
            }
            None => self.disable(Capability::ScissorTest),
        }
    }

    pub fn set_active_texture(&mut self, unit: u32) {
        if changed(&mut self.active_unit, unit) {
            self.device.active_texture(unit);
        }
    }

    /// Binds `texture` on `unit`, activating the unit only when needed.
    pub fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        let slot = unit as usize;
        if slot >= self.unit_bindings.len() {
            self.unit_bindings.resize(slot + 1, None);
        }
        if self.unit_bindings[slot] == Some(texture) {
            return;
        }
        self.set_active_texture(unit);
        self.device.bind_texture(texture);
        self.unit_bindings[slot] = Some(texture);
    }

    #[must_use]
    pub fn bound_texture(&self, unit: u32) -> Option<Option<TextureId>> {
        self.unit_bindings.get(unit as usize).copied().flatten()
    }

    /// Drops snapshot entries referring to a deleted texture.
    pub fn forget_texture(&mut self, texture: TextureId) {
        for slot in &mut self.unit_bindings {
            if *slot == Some(Some(texture)) {
                *slot = None;
            }
        }
    }

    pub fn forget_program(&mut self, program: ProgramId) {
        if self.program == Some(Some(program)) {
            self.program = None;
        }
    }

    pub fn forget_vertex_array(&mut self, vao: VertexArrayId) {
        if self.vertex_array == Some(Some(vao)) {
            self.vertex_array = None;
        }
    }

    pub fn forget_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffer == Some(Some(framebuffer)) {
            self.framebuffer = None;
        }
    }

    // ─── Clear & draw ────────────────────────────────────────────────────────

    pub fn set_clear_color(&mut self, color: Vec4) {
        if changed(&mut self.clear_color, color) {
            self.device.clear_color(color);
        }
    }

    pub fn set_clear_depth(&mut self, depth: f32) {
        if changed(&mut self.clear_depth, depth) {
            self.device.clear_depth(depth);
        }
    }

    pub fn set_clear_stencil(&mut self, stencil: u32) {
        if changed(&mut self.clear_stencil, stencil) {
            self.device.clear_stencil(stencil);
        }
    }

    /// Clears the bound framebuffer. Write masks are opened first so the
    /// clear is not silently masked by the last material.
    pub fn clear(&mut self, flags: ClearFlags) {
        if flags.is_empty() {
            return;
        }
        if flags.contains(ClearFlags::COLOR) {
            self.set_color_mask(true);
        }
        if flags.contains(ClearFlags::DEPTH) {
            self.set_depth_mask(true);
        }
        if flags.contains(ClearFlags::STENCIL) {
            self.set_stencil_mask(0xFF);
        }
        self.device.clear(flags);
    }

    /// Uploads to the bound program. Diffing is done by the uniform cache.
    pub fn upload_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        self.device.set_uniform(location, value);
    }

    pub fn draw(&mut self, call: &DrawCall) {
        self.device.draw(call);
    }

    // ─── Material bundle ─────────────────────────────────────────────────────

    /// Applies the fixed-function state of one material.
    ///
    /// `side` overrides the material's own side (two-pass double-sided
    /// transparency); `front_face_cw` is set for negatively scaled objects.
    pub fn set_material(&mut self, settings: &MaterialSettings, side: Side, front_face_cw: bool) {
        if side == Side::Double {
            self.set_cull_face(None);
        } else {
            self.set_cull_face(Some(wgpu::Face::Back));
        }

        let mut flip_sided = side == Side::Back;
        if front_face_cw {
            flip_sided = !flip_sided;
        }
        self.set_front_face(if flip_sided {
            wgpu::FrontFace::Cw
        } else {
            wgpu::FrontFace::Ccw
        });

        if settings.blending == Blending::Normal && !settings.transparent {
            self.set_blending(Blending::None, false, Vec4::ZERO);
        } else {
            self.set_blending(
                settings.blending,
                settings.premultiplied_alpha,
                settings.blend_color,
            );
        }

        self.set_depth_test(settings.depth_test);
        self.set_depth_func(settings.depth_func);
        self.set_depth_mask(settings.depth_write);
        self.set_color_mask(settings.color_write);

        let stencil = &settings.stencil;
        self.set_stencil_test(stencil.enabled);
        if stencil.enabled {
            self.set_stencil_mask(stencil.write_mask);
            self.set_stencil_func(stencil.func, stencil.reference, stencil.func_mask);
            self.set_stencil_op(stencil.fail, stencil.depth_fail, stencil.pass);
        }

        let offset = &settings.polygon_offset;
        self.set_polygon_offset(offset.enabled.then_some((offset.factor, offset.units)));

        self.set_capability(Capability::SampleAlphaToCoverage, settings.alpha_to_coverage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::{DeviceCall, HeadlessDevice};

    fn tracker() -> StateTracker<HeadlessDevice> {
        StateTracker::new(HeadlessDevice::new())
    }

    #[test]
    fn repeated_depth_func_issues_once() {
        let mut t = tracker();
        t.set_depth_func(wgpu::CompareFunction::Less);
        t.set_depth_func(wgpu::CompareFunction::Less);
        assert_eq!(t.device().calls().len(), 1);
        t.set_depth_func(wgpu::CompareFunction::Greater);
        assert_eq!(t.device().calls().len(), 2);
    }

    #[test]
    fn reset_forces_reissue() {
        let mut t = tracker();
        t.set_color_mask(false);
        t.reset();
        t.set_color_mask(false);
        assert_eq!(
            t.device().count(|c| matches!(c, DeviceCall::ColorMask(false))),
            2
        );
    }

    #[test]
    fn preset_switch_only_changes_funcs() {
        let mut t = tracker();
        t.set_blending(Blending::Normal, false, Vec4::ZERO);
        t.device_mut().clear_calls();
        t.set_blending(Blending::Additive, false, Vec4::ZERO);
        let calls = t.device().calls();
        assert!(!calls.iter().any(|c| matches!(c, DeviceCall::BlendEquation(..))));
        assert_eq!(
            t.device().count(|c| matches!(c, DeviceCall::BlendFunc(..))),
            1
        );
    }

    #[test]
    fn entering_custom_reissues_group() {
        let mut t = tracker();
        let custom = Blending::Custom(CustomBlend::default());
        t.set_blending(custom, false, Vec4::ZERO);
        t.set_blending(custom, false, Vec4::ZERO);
        assert_eq!(t.device().count(|c| matches!(c, DeviceCall::BlendFunc(..))), 1);

        t.set_blending(Blending::Normal, false, Vec4::ZERO);
        t.device_mut().clear_calls();
        t.set_blending(custom, false, Vec4::ZERO);
        assert_eq!(t.device().count(|c| matches!(c, DeviceCall::BlendEquation(..))), 1);
        assert_eq!(t.device().count(|c| matches!(c, DeviceCall::BlendFunc(..))), 1);
        assert_eq!(t.device().count(|c| matches!(c, DeviceCall::BlendColor(_))), 1);
    }

    #[test]
    fn texture_binding_activates_unit_once() {
        let mut t = tracker();
        t.bind_texture(2, Some(TextureId(7)));
        t.bind_texture(2, Some(TextureId(7)));
        assert_eq!(
            t.device().calls(),
            &[
                DeviceCall::ActiveTexture(2),
                DeviceCall::BindTexture(Some(TextureId(7)))
            ]
        );
        t.forget_texture(TextureId(7));
        t.bind_texture(2, Some(TextureId(7)));
        assert_eq!(t.device().calls().len(), 3);
    }
}
