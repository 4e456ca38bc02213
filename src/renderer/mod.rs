//! Frame Driver
//!
//! [`Renderer`] turns a [`Scene`] plus a camera node into draw calls on a
//! [`GpuDevice`]. One call to [`Renderer::render_frame`] runs these steps:
//!
//! 1. Camera matrices and the scene transform tree are brought up to date.
//! 2. Drawables are gathered into opaque, transmissive and transparent
//!    buckets, then sorted.
//! 3. Light and clipping state is rebuilt from the scene.
//! 4. Opaque objects are drawn into an offscreen transmission target when
//!    transmissive objects are present.
//! 5. The three buckets are drawn in order: opaque, transmissive, transparent.
//!
//! Every draw resolves its program through the [`ProgramCache`]; all GPU state
//! goes through the [`StateTracker`], so redundant calls never reach the
//! device. Failures of a single drawable (a program that does not compile, a
//! missing asset) skip that drawable and are reported on the
//! [`diagnostics`](Renderer::diagnostics) channel; only a missing or
//! degenerate camera fails the whole frame.

pub mod clipping;
pub mod device;
pub mod diagnostics;
pub mod geometries;
pub mod headless;
pub mod info;
pub mod lights;
pub mod program;
pub mod render_list;
pub mod render_target;
pub mod settings;
pub mod state;
pub mod textures;
pub mod uniforms;

pub use device::{ClearFlags, DrawCall, GpuDevice, PrimitiveMode, ProgramId, Rect, TextureId};
pub use diagnostics::Diagnostic;
pub use headless::{DeviceCall, HeadlessDevice};
pub use info::{FrameInfo, MemoryInfo};
pub use program::{ProgramCache, ProgramCacheStats, ProgramHandle, ProgramKey};
pub use render_list::{Drawable, DrawableComparator, RenderList};
pub use render_target::RenderTarget;
pub use settings::{Capabilities, EvictionPolicy, RendererSettings, ShadowMapType, ToneMapping};
pub use state::StateTracker;

use glam::{Mat3, Mat4, Vec2, Vec3};
use smallvec::{SmallVec, smallvec};

use crate::assets::{Assets, GeometryHandle, MaterialHandle, TextureHandle};
use crate::errors::{PrismError, Result};
use crate::renderer::clipping::{ClippingState, PLANE_VECTORS};
use crate::renderer::diagnostics::DiagnosticSink;
use crate::renderer::geometries::GeometryManager;
use crate::renderer::lights::LightState;
use crate::renderer::program::{
    FastProgramKey, FogKind, MaterialFingerprint, OutputTarget, ProgramRequest, SceneInputs,
};
use crate::renderer::render_list::MissingAsset;
use crate::renderer::render_target::TargetSlot;
use crate::renderer::textures::TextureManager;
use crate::resources::geometry::{Geometry, GeometryGroup};
use crate::resources::material::{Material, MaterialFeatures, ShadingModel, Side};
use crate::resources::uniforms::UniformValue;
use crate::scene::light::Fog;
use crate::scene::{NodeHandle, Scene};

/// Drawing-buffer size until [`Renderer::set_size`] is called.
pub const DEFAULT_SIZE: (u32, u32) = (300, 150);

const TEXTURE_UNITS: &str = "texture units";
const CLIPPING_PLANES: &str = "clipping planes";
const LOCAL_CLIPPING_PLANES: &str = "local clipping planes";

/// Fragment uniform vectors kept for material, camera, fog and output
/// uniforms; lights and clipping planes share the rest.
const RESERVED_FRAGMENT_VECTORS: u32 = 32;

// ─── Per-frame context ──────────────────────────────────────────────────────

/// Camera and scene values shared by every draw of a frame.
#[derive(Debug, Clone, Copy)]
struct FrameContext {
    view: Mat4,
    projection: Mat4,
    camera_position: Vec3,
    fog: Option<Fog>,
    fog_kind: FogKind,
    shadow_map: Option<ShadowMapType>,
}

/// How one bucket is drawn.
#[derive(Debug, Clone, Copy)]
struct Pass {
    output: OutputTarget,
    /// Resolved transmission color and its size in pixels.
    transmission: Option<(TextureId, Vec2)>,
    /// Overrides the material side (back-face passes).
    side: Option<Side>,
}

// ─── Renderer ───────────────────────────────────────────────────────────────

pub struct Renderer<D: GpuDevice> {
    settings: RendererSettings,
    settings_version: u64,
    capabilities: Capabilities,
    tracker: StateTracker<D>,

    programs: ProgramCache,
    render_list: RenderList,
    lights: LightState,
    clipping: ClippingState,
    textures: TextureManager,
    geometries: GeometryManager,
    diagnostics: DiagnosticSink,

    render_target: Option<RenderTarget>,
    target_slot: Option<TargetSlot>,
    transmission_slot: Option<TargetSlot>,
    size: (u32, u32),
    viewport: Option<Rect>,

    opaque_sort: Option<DrawableComparator>,
    transparent_sort: Option<DrawableComparator>,

    frame: u64,
    info: FrameInfo,
    uniform_scratch: Vec<(&'static str, UniformValue)>,
    reported_missing: Vec<MissingAsset>,
    active_limits: Vec<&'static str>,
}

impl<D: GpuDevice> Renderer<D> {
    pub fn new(device: D, settings: RendererSettings) -> Self {
        let capabilities = device.capabilities();
        log::info!(
            "renderer created: {} texture units, {} samples, {} lights per kind",
            capabilities.max_texture_units,
            capabilities.max_samples,
            capabilities.max_lights
        );
        Self {
            programs: ProgramCache::new(settings.eviction),
            textures: TextureManager::new(capabilities.max_texture_units),
            settings,
            settings_version: 0,
            capabilities,
            tracker: StateTracker::new(device),
            render_list: RenderList::new(),
            lights: LightState::new(),
            clipping: ClippingState::new(),
            geometries: GeometryManager::new(),
            diagnostics: DiagnosticSink::new(),
            render_target: None,
            target_slot: None,
            transmission_slot: None,
            size: DEFAULT_SIZE,
            viewport: None,
            opaque_sort: None,
            transparent_sort: None,
            frame: 0,
            info: FrameInfo::default(),
            uniform_scratch: Vec::with_capacity(64),
            reported_missing: Vec::new(),
            active_limits: Vec::new(),
        }
    }

    // ─── Configuration ──────────────────────────────────────────────────────

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Mutable settings. Every call invalidates the fast program lookup.
    pub fn settings_mut(&mut self) -> &mut RendererSettings {
        self.settings_version += 1;
        &mut self.settings
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Receiving end of the diagnostics channel. Every clone sees the same
    /// queue.
    #[must_use]
    pub fn diagnostics(&self) -> flume::Receiver<Diagnostic> {
        self.diagnostics.receiver()
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
    }

    /// Restricts drawing to `rect` of the default framebuffer. `None` uses the
    /// full size.
    pub fn set_viewport(&mut self, rect: Option<Rect>) {
        self.viewport = rect;
    }

    /// Redirects output into an offscreen target. Offscreen output is always
    /// linear and never tone mapped.
    pub fn set_render_target(&mut self, target: Option<RenderTarget>) {
        if target.is_none() {
            TargetSlot::release(&mut self.target_slot, &mut self.tracker);
        }
        self.render_target = target;
    }

    /// Color texture of the current render target, once it has been drawn.
    #[must_use]
    pub fn render_target_texture(&self) -> Option<TextureId> {
        self.render_target.and(self.target_slot.map(|slot| slot.texture))
    }

    pub fn set_opaque_sort(&mut self, compare: Option<DrawableComparator>) {
        self.opaque_sort = compare;
    }

    pub fn set_transparent_sort(&mut self, compare: Option<DrawableComparator>) {
        self.transparent_sort = compare;
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    /// Statistics of the last frame.
    #[must_use]
    pub fn info(&self) -> FrameInfo {
        self.info
    }

    #[must_use]
    pub fn memory(&self) -> MemoryInfo {
        MemoryInfo {
            geometries: self.geometries.len(),
            textures: self.textures.len(),
            programs: self.programs.len(),
        }
    }

    #[must_use]
    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    #[must_use]
    pub fn render_list(&self) -> &RenderList {
        &self.render_list
    }

    #[must_use]
    pub fn tracker(&self) -> &StateTracker<D> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut StateTracker<D> {
        &mut self.tracker
    }

    #[must_use]
    pub fn device(&self) -> &D {
        self.tracker.device()
    }

    pub fn device_mut(&mut self) -> &mut D {
        self.tracker.device_mut()
    }

    /// Forgets every cached GPU state value and uploaded uniform, for hosts
    /// that touched the device behind the renderer's back.
    pub fn reset_state(&mut self) {
        self.tracker.reset();
        self.programs.invalidate_uniforms();
    }

    // ─── Disposal ───────────────────────────────────────────────────────────

    /// Releases every program the material holds.
    pub fn dispose_material(&mut self, material: MaterialHandle) {
        self.programs.release_material(&mut self.tracker, material);
        self.forget_destroyed_programs();
    }

    pub fn dispose_geometry(&mut self, geometry: GeometryHandle) {
        self.geometries.dispose(&mut self.tracker, geometry);
        self.programs.forget_geometry(geometry);
    }

    pub fn dispose_texture(&mut self, texture: TextureHandle) {
        self.textures.dispose(&mut self.tracker, texture);
    }

    /// Deletes every device object the renderer created.
    pub fn dispose(&mut self) {
        self.programs.clear(&mut self.tracker);
        self.forget_destroyed_programs();
        TargetSlot::release(&mut self.target_slot, &mut self.tracker);
        TargetSlot::release(&mut self.transmission_slot, &mut self.tracker);
        log::debug!("renderer disposed");
    }

    // ─── Frame ──────────────────────────────────────────────────────────────

    /// Resolves the programs of every visible drawable without drawing.
    ///
    /// Returns how many drawables have a usable program. With a device that
    /// compiles in the background, a later frame finds them ready.
    pub fn compile(&mut self, scene: &mut Scene, camera: NodeHandle, assets: &mut Assets) -> Result<usize> {
        let ctx = self.prepare_frame(scene, camera, assets)?;
        let output = self.output_target();
        let list = std::mem::take(&mut self.render_list);

        let mut resolved = 0;
        for drawable in list.iter() {
            let sides = self.sides_for(assets, drawable.material);
            let mut ok = true;
            for side in sides {
                let pass = Pass {
                    output,
                    transmission: None,
                    side,
                };
                ok &= self.resolve_program(assets, drawable, &ctx, pass).is_some();
            }
            if ok {
                resolved += 1;
            }
        }

        self.render_list = list;
        log::debug!("precompiled {resolved} drawables, {} programs live", self.programs.len());
        Ok(resolved)
    }

    /// Renders one frame of `scene` as seen from `camera`.
    pub fn render_frame(
        &mut self,
        scene: &mut Scene,
        camera: NodeHandle,
        assets: &mut Assets,
    ) -> Result<FrameInfo> {
        let ctx = self.prepare_frame(scene, camera, assets)?;

        self.frame += 1;
        self.info = FrameInfo {
            frame: self.frame,
            skipped: self.render_list.missing().len() as u32,
            ..FrameInfo::default()
        };
        self.programs.begin_frame(self.frame);
        self.textures.begin_frame(self.frame);
        let compiles_before = self.programs.stats().compiles;

        let (viewport, output) = self.bind_output_target();
        if self.settings.auto_clear {
            self.clear_target();
        }

        let list = std::mem::take(&mut self.render_list);

        let mut transmission = None;
        if self.settings.transmission && !list.transmissive().is_empty() {
            transmission = Some(self.transmission_pass(&list, assets, &ctx, viewport));
            self.bind_output_target();
        }

        let main = Pass {
            output,
            transmission: None,
            side: None,
        };
        for drawable in list.opaque() {
            self.render_drawable(assets, drawable, &ctx, main);
        }
        let blended = Pass { transmission, ..main };
        self.render_blended(list.transmissive(), assets, &ctx, blended);
        self.render_blended(list.transparent(), assets, &ctx, blended);

        self.render_list = list;

        self.programs.trim(&mut self.tracker);
        self.forget_destroyed_programs();
        self.textures
            .collect_garbage(&mut self.tracker, self.settings.eviction.idle_frames());
        self.diagnostics.retain_limits(&self.active_limits);

        self.info.programs = self.programs.len();
        self.info.compiles = (self.programs.stats().compiles - compiles_before) as u32;
        log::trace!(
            "frame {}: {} draws, {} triangles, {} skipped",
            self.info.frame,
            self.info.draw_calls,
            self.info.triangles,
            self.info.skipped
        );
        Ok(self.info)
    }

    /// Steps shared by [`render_frame`](Self::render_frame) and
    /// [`compile`](Self::compile): camera, transforms, render list, lights,
    /// clipping.
    fn prepare_frame(&mut self, scene: &mut Scene, camera: NodeHandle, assets: &Assets) -> Result<FrameContext> {
        let depth_origin = self.settings.depth_origin;
        let Some(cam) = scene.camera_mut(camera) else {
            return Err(PrismError::CameraNotFound(camera));
        };
        if cam.is_degenerate() {
            let (near, far) = cam.projection.near_far();
            self.diagnostics
                .frame_skipped(camera, format!("degenerate projection: near = {near}, far = {far}"));
            return Err(PrismError::DegenerateCamera { near, far });
        }
        self.diagnostics.frame_rendered(camera);
        cam.depth_origin = depth_origin;
        cam.update_projection_matrix();

        scene.update_matrix_world();

        let world = *scene
            .get_node(camera)
            .ok_or(PrismError::NodeNotFound(camera))?
            .world_matrix();
        let cam = scene
            .camera_mut(camera)
            .ok_or(PrismError::CameraNotFound(camera))?;
        cam.update_view_projection(&world);
        let cam = cam.clone();

        self.programs.set_policy(self.settings.eviction);
        self.render_list.build(scene, &cam, assets);
        self.report_missing();
        if self.settings.sort_objects {
            self.render_list.sort(self.opaque_sort, self.transparent_sort);
        }

        let max_lights = self.settings.max_lights.min(self.capabilities.max_lights);
        let vector_budget = self
            .capabilities
            .max_fragment_uniform_vectors
            .saturating_sub(RESERVED_FRAGMENT_VECTORS);
        let overflow = self.lights.setup(
            scene,
            self.render_list.lights(),
            cam.view_matrix(),
            max_lights,
            vector_budget,
            self.settings.shadow_map_enabled,
        );
        self.active_limits.clear();
        for o in overflow {
            self.report_limit(o.kind, o.requested, o.supported);
        }

        let max_planes = vector_budget.saturating_sub(self.lights.uniform_vectors()) / PLANE_VECTORS;
        if let Some(requested) =
            self.clipping
                .begin_frame(&self.settings.clipping_planes, cam.view_matrix(), max_planes)
        {
            self.report_limit(CLIPPING_PLANES, requested, max_planes);
        }

        Ok(FrameContext {
            view: *cam.view_matrix(),
            projection: *cam.projection_matrix(),
            camera_position: cam.world_position(),
            fog: scene.fog,
            fog_kind: FogKind::of(scene.fog.as_ref()),
            shadow_map: self
                .settings
                .shadow_map_enabled
                .then_some(self.settings.shadow_map_type),
        })
    }

    /// Reports drawables whose assets are gone, once per occurrence.
    fn report_missing(&mut self) {
        for missing in self.render_list.missing() {
            if !self.reported_missing.contains(missing) {
                log::warn!("{:?} references a missing {}", missing.node, missing.what);
                self.diagnostics.emit(Diagnostic::MissingAsset {
                    node: missing.node,
                    what: missing.what,
                });
            }
        }
        self.reported_missing.clear();
        self.reported_missing.extend_from_slice(self.render_list.missing());
    }

    fn output_target(&self) -> OutputTarget {
        if self.render_target.is_some() {
            OutputTarget::LINEAR
        } else {
            OutputTarget {
                color_space: self.settings.output_color_space,
                tone_mapping: self.settings.tone_mapping,
            }
        }
    }

    /// Binds the render target (or the default framebuffer) and its viewport.
    fn bind_output_target(&mut self) -> (Rect, OutputTarget) {
        let output = self.output_target();
        let viewport = match self.render_target {
            Some(target) => {
                let desc = target.desc(self.capabilities.max_samples);
                let slot = TargetSlot::ensure(&mut self.target_slot, &mut self.tracker, desc);
                self.tracker.bind_framebuffer(Some(slot.framebuffer));
                target.viewport()
            }
            None => {
                self.tracker.bind_framebuffer(None);
                self.viewport
                    .unwrap_or(Rect::new(0, 0, self.size.0, self.size.1))
            }
        };
        self.tracker.set_viewport(viewport);
        (viewport, output)
    }

    fn clear_target(&mut self) {
        let s = &self.settings;
        let mut flags = ClearFlags::empty();
        flags.set(ClearFlags::COLOR, s.auto_clear_color);
        flags.set(ClearFlags::DEPTH, s.auto_clear_depth);
        flags.set(ClearFlags::STENCIL, s.auto_clear_stencil);
        if flags.is_empty() {
            return;
        }
        self.tracker.set_clear_color(s.clear_color.extend(s.clear_alpha));
        self.tracker.set_clear_depth(1.0);
        self.tracker.set_clear_stencil(0);
        self.tracker.clear(flags);
    }

    /// Draws the opaque bucket, plus back faces of double-sided transmissive
    /// objects, into the transmission target and resolves it.
    fn transmission_pass(
        &mut self,
        list: &RenderList,
        assets: &mut Assets,
        ctx: &FrameContext,
        viewport: Rect,
    ) -> (TextureId, Vec2) {
        let scaled = viewport.scaled(self.settings.transmission_resolution_scale.max(0.01));
        let target = RenderTarget::new(scaled.width, scaled.height)
            .with_format(wgpu::TextureFormat::Rgba16Float)
            .with_samples(4);
        let desc = target.desc(self.capabilities.max_samples);
        let slot = TargetSlot::ensure(&mut self.transmission_slot, &mut self.tracker, desc);

        self.tracker.bind_framebuffer(Some(slot.framebuffer));
        self.tracker.set_viewport(target.viewport());
        self.tracker
            .set_clear_color(self.settings.clear_color.extend(self.settings.clear_alpha));
        self.tracker.set_clear_depth(1.0);
        self.tracker.clear(ClearFlags::COLOR | ClearFlags::DEPTH);

        let pass = Pass {
            output: OutputTarget::LINEAR,
            transmission: None,
            side: None,
        };
        for drawable in list.opaque() {
            self.render_drawable(assets, drawable, ctx, pass);
        }
        for drawable in list.transmissive() {
            let double_sided = assets.material(drawable.material).is_some_and(|m| {
                m.settings().side == Side::Double && !m.settings().force_single_pass
            });
            if double_sided {
                let back = Pass {
                    side: Some(Side::Back),
                    ..pass
                };
                self.render_drawable(assets, drawable, ctx, back);
            }
        }

        self.tracker.device_mut().resolve_framebuffer(slot.framebuffer);
        self.info.transmission_pass = true;
        (
            slot.texture,
            Vec2::new(target.width as f32, target.height as f32),
        )
    }

    /// Draws a blended bucket.
    fn render_blended(&mut self, drawables: &[Drawable], assets: &mut Assets, ctx: &FrameContext, pass: Pass) {
        for drawable in drawables {
            for side in self.sides_for(assets, drawable.material) {
                self.render_drawable(assets, drawable, ctx, Pass { side, ..pass });
            }
        }
    }

    /// Side overrides one drawable is rendered with. Transparent
    /// double-sided materials draw back faces first, then front faces.
    fn sides_for(&self, assets: &Assets, material: MaterialHandle) -> SmallVec<[Option<Side>; 2]> {
        let two_pass = self.settings.two_pass_double_sided
            && assets.material(material).is_some_and(|m| {
                let s = m.settings();
                s.transparent && s.side == Side::Double && !s.force_single_pass
            });
        if two_pass {
            smallvec![Some(Side::Back), Some(Side::Front)]
        } else {
            smallvec![None]
        }
    }

    // ─── Draw ───────────────────────────────────────────────────────────────

    fn render_drawable(&mut self, assets: &mut Assets, drawable: &Drawable, ctx: &FrameContext, pass: Pass) {
        let Some(program) = self.resolve_program(assets, drawable, ctx, pass) else {
            self.info.skipped += 1;
            return;
        };
        if !self.programs.is_ready(self.tracker.device(), program) {
            self.info.skipped += 1;
            return;
        }

        let assets = &*assets;
        let (Some(material), Some(geometry)) = (
            assets.material(drawable.material),
            assets.geometry(drawable.geometry),
        ) else {
            self.info.skipped += 1;
            return;
        };
        let Some((start, count)) = draw_range(geometry, drawable.group) else {
            self.info.skipped += 1;
            return;
        };
        let (Some(program_id), Some(key)) =
            (self.programs.program_id(program), self.programs.key(program).copied())
        else {
            self.info.skipped += 1;
            return;
        };
        let side = pass.side.unwrap_or(material.settings().side);

        self.geometries.prepare(&mut self.tracker, drawable.geometry, geometry);
        self.tracker.use_program(Some(program_id));
        self.tracker
            .set_material(material.settings(), side, drawable.is_mirrored());

        self.collect_uniforms(assets, material, drawable, ctx, pass, &key);
        if let Some(cache) = self.programs.uniforms_mut(program) {
            cache.set_all(&mut self.tracker, &self.uniform_scratch);
        }

        let indexed = self.geometries.bind(&mut self.tracker, drawable.geometry, program_id);
        let instances = drawable.instance_count.max(1);
        self.tracker.draw(&DrawCall {
            mode: PrimitiveMode::Triangles,
            indexed,
            start,
            count,
            instance_count: instances,
        });
        self.info.record_draw(count, instances);
    }

    /// Finds or builds the program for one draw. `None` means the draw is
    /// skipped: assets are missing or the program failed.
    fn resolve_program(
        &mut self,
        assets: &mut Assets,
        drawable: &Drawable,
        ctx: &FrameContext,
        pass: Pass,
    ) -> Option<ProgramHandle> {
        let outcome = {
            let material = assets.material(drawable.material)?;
            let geometry = assets.geometry(drawable.geometry)?;
            let side = pass.side.unwrap_or(material.settings().side);
            let instanced = drawable.instance_count > 1;

            let fast = FastProgramKey {
                material: drawable.material,
                material_version: material.version(),
                geometry: drawable.geometry,
                geometry_layout_version: geometry.layout_version(),
                side,
                instanced,
                light_version: self.lights.version(),
                clipping_version: self.clipping.version(),
                fog: ctx.fog_kind,
                output: pass.output,
                settings_version: self.settings_version,
            };
            if let Some(handle) = self.programs.get_fast(&fast) {
                return Some(handle);
            }

            let features = material.features();
            let key = ProgramKey::new(
                material.model(),
                features,
                side,
                geometry.features(),
                self.clipping
                    .counts(material.settings(), self.settings.local_clipping),
                &SceneInputs {
                    lights: self.lights.counts(),
                    shadow_map: ctx.shadow_map,
                    fog: ctx.fog_kind,
                    output: pass.output,
                },
                instanced,
                material.defines_hash(),
            );
            if self.programs.has_failed(drawable.material, &key) {
                return None;
            }

            let request = ProgramRequest {
                material: drawable.material,
                fingerprint: MaterialFingerprint {
                    model: material.model(),
                    features,
                    defines_hash: material.defines_hash(),
                },
                key: &key,
                custom_defines: material.defines(),
            };
            match self.programs.acquire(&mut self.tracker, &request) {
                Ok(handle) => {
                    self.programs.insert_fast(fast, handle);
                    Ok((handle, material.last_program_error().is_some()))
                }
                Err(err) => Err((err, key.hash_u64(), material.model().name())),
            }
        };
        self.forget_destroyed_programs();

        match outcome {
            Ok((handle, stale_error)) => {
                if stale_error && let Some(material) = assets.material_mut(drawable.material) {
                    material.set_program_error(None);
                }
                Some(handle)
            }
            Err((err, key_hash, model)) => {
                let log = match err {
                    PrismError::ProgramCompile { log, .. } => log,
                    other => other.to_string(),
                };
                if let Some(material) = assets.material_mut(drawable.material) {
                    material.set_program_error(Some(log.clone()));
                }
                self.diagnostics.emit(Diagnostic::ProgramCompile {
                    material: drawable.material,
                    model,
                    key_hash,
                    log,
                });
                None
            }
        }
    }

    /// Fills the uniform scratch list for one draw.
    fn collect_uniforms(
        &mut self,
        assets: &Assets,
        material: &Material,
        drawable: &Drawable,
        ctx: &FrameContext,
        pass: Pass,
        key: &ProgramKey,
    ) {
        let out = &mut self.uniform_scratch;
        out.clear();

        let model = Mat4::from(drawable.world_matrix);
        let model_view = ctx.view * model;
        let normal = Mat3::from_mat4(model_view).inverse().transpose();
        out.push(("modelMatrix", model.into()));
        out.push(("modelViewMatrix", model_view.into()));
        out.push(("normalMatrix", normal.into()));
        out.push(("projectionMatrix", ctx.projection.into()));
        out.push(("viewMatrix", ctx.view.into()));
        out.push(("cameraPosition", ctx.camera_position.into()));
        if key.model == ShadingModel::Distance {
            out.push(("referencePosition", ctx.camera_position.into()));
        }

        if key.tone_mapping != ToneMapping::None {
            out.push(("toneMappingExposure", self.settings.tone_mapping_exposure.into()));
        }
        if key.fog != FogKind::None
            && let Some(fog) = ctx.fog
        {
            out.push(("fogColor", fog.color().into()));
            match fog {
                Fog::Linear { near, far, .. } => {
                    out.push(("fogNear", near.into()));
                    out.push(("fogFar", far.into()));
                }
                Fog::Exp2 { density, .. } => out.push(("fogDensity", density.into())),
            }
        }

        if key.model.is_lit() {
            self.lights.collect_uniforms(out);
        }
        if key.clipping.planes > 0 {
            self.clipping.collect_uniforms(
                material.settings(),
                self.settings.local_clipping,
                &ctx.view,
                out,
            );
        }
        material.collect_uniforms(out);

        self.textures.reset_units();
        for (name, handle) in material.maps().iter() {
            let Some(texture) = assets.texture(handle) else {
                continue;
            };
            if let Some(unit) = self.textures.bind(&mut self.tracker, handle, texture) {
                out.push((name, UniformValue::Sampler(unit)));
            }
        }
        if key.features.contains(MaterialFeatures::USE_TRANSMISSION)
            && let Some((texture, size)) = pass.transmission
            && let Some(unit) = self.textures.bind_raw(&mut self.tracker, texture)
        {
            out.push(("transmissionSamplerMap", UniformValue::Sampler(unit)));
            out.push(("transmissionSamplerSize", size.into()));
        }

        let requested = self.textures.requested_units();
        let supported = self.textures.max_units();
        if requested > supported {
            self.report_limit(TEXTURE_UNITS, requested, supported);
        }
        if let Some((requested, supported)) = self
            .clipping
            .overflow(material.settings(), self.settings.local_clipping)
        {
            self.report_limit(LOCAL_CLIPPING_PLANES, requested, supported);
        }
    }

    /// Reports a capability limit and keeps its report alive for this frame.
    fn report_limit(&mut self, resource: &'static str, requested: u32, supported: u32) {
        self.diagnostics.limit(resource, requested, supported);
        if !self.active_limits.contains(&resource) {
            self.active_limits.push(resource);
        }
    }

    fn forget_destroyed_programs(&mut self) {
        for program in self.programs.drain_destroyed() {
            self.geometries.forget_program(&mut self.tracker, program);
        }
    }
}

/// Intersects the geometry draw range with the group range. `None` when the
/// result is empty.
fn draw_range(geometry: &Geometry, group: Option<GeometryGroup>) -> Option<(u32, u32)> {
    let total = geometry.element_count();
    let range = geometry.draw_range();
    let mut start = range.start;
    let mut end = range
        .count
        .map_or(total, |count| start.saturating_add(count))
        .min(total);
    if let Some(group) = group {
        start = start.max(group.start);
        end = end.min(group.start.saturating_add(group.count));
    }
    (end > start).then_some((start, end - start))
}
