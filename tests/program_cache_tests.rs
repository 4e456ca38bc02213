//! Program cache tests (through the renderer)
//!
//! Tests for:
//! - One compile per distinct program, none on later frames
//! - Value-only material edits reuse the program
//! - Structural edits and light-count changes recompile
//! - Compile failures stay isolated to their material and are memoized
//! - Eviction policies and material disposal
//! - Pre-compilation and deferred (background) compiles

use glam::Vec3;
use prism::assets::{Assets, MaterialHandle};
use prism::renderer::{
    DeviceCall, Diagnostic, EvictionPolicy, HeadlessDevice, Renderer, RendererSettings,
};
use prism::resources::{Geometry, Material, Mesh, Texture};
use prism::scene::{Camera, Light, NodeHandle, Scene};

// ============================================================================
// Helper
// ============================================================================

struct Fixture {
    scene: Scene,
    assets: Assets,
    camera: NodeHandle,
    renderer: Renderer<HeadlessDevice>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_settings(RendererSettings::default())
    }

    fn with_settings(settings: RendererSettings) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut scene = Scene::new();
        let camera = scene
            .build_node("camera")
            .with_camera(Camera::new_perspective(60.0, 1.0, 0.1, 100.0))
            .build()
            .unwrap();
        Self {
            scene,
            assets: Assets::new(),
            camera,
            renderer: Renderer::new(HeadlessDevice::new(), settings),
        }
    }

    fn material(&mut self, material: Material) -> MaterialHandle {
        self.assets.add_material(material)
    }

    fn mesh(&mut self, x: f32, material: MaterialHandle) -> NodeHandle {
        let geometry = self.assets.add_geometry(Geometry::with_positions(vec![
            -0.5, -0.5, 0.0, 0.5, -0.5, 0.0, 0.0, 0.5, 0.0,
        ]));
        self.scene
            .build_node("mesh")
            .with_position(x, 0.0, -5.0)
            .with_mesh(Mesh::new(geometry, material))
            .build()
            .unwrap()
    }

    fn light(&mut self) -> NodeHandle {
        self.scene
            .build_node("sun")
            .with_light(Light::new_directional(Vec3::ONE, 1.0))
            .build()
            .unwrap()
    }

    fn render(&mut self) -> prism::FrameInfo {
        self.renderer
            .render_frame(&mut self.scene, self.camera, &mut self.assets)
            .unwrap()
    }

    fn device(&self) -> &HeadlessDevice {
        self.renderer.device()
    }

    fn compile_errors(&self) -> Vec<Diagnostic> {
        self.renderer
            .diagnostics()
            .try_iter()
            .filter(|d| matches!(d, Diagnostic::ProgramCompile { .. }))
            .collect()
    }
}

// ============================================================================
// Reuse
// ============================================================================

#[test]
fn shared_material_compiles_once() {
    let mut f = Fixture::new();
    let red = f.material(Material::basic(Vec3::X));
    f.mesh(-1.0, red);
    f.mesh(1.0, red);

    let first = f.render();
    assert_eq!(first.draw_calls, 2);
    assert_eq!(first.compiles, 1);

    for _ in 0..3 {
        assert_eq!(f.render().compiles, 0);
    }
    assert_eq!(f.device().compile_count(), 1);
    assert_eq!(f.renderer.programs().len(), 1);
}

#[test]
fn identical_materials_share_one_program() {
    let mut f = Fixture::new();
    let a = f.material(Material::basic(Vec3::X));
    let b = f.material(Material::basic(Vec3::Z));
    f.mesh(-1.0, a);
    f.mesh(1.0, b);

    f.render();
    assert_eq!(f.device().compile_count(), 1);
}

#[test]
fn value_edit_uploads_without_recompiling() {
    let mut f = Fixture::new();
    let m = f.material(Material::basic(Vec3::X));
    f.mesh(0.0, m);
    f.render();
    f.render();
    assert_eq!(f.device().uniform_uploads("diffuse").len(), 1);

    f.assets.material_mut(m).unwrap().uniforms_mut().color = Vec3::Y;
    let info = f.render();

    assert_eq!(info.compiles, 0);
    assert_eq!(f.device().compile_count(), 1);
    assert_eq!(f.device().uniform_uploads("diffuse").len(), 2);
}

#[test]
fn structural_edit_recompiles() {
    let mut f = Fixture::with_settings(RendererSettings {
        eviction: EvictionPolicy::Immediate,
        ..RendererSettings::default()
    });
    let m = f.material(Material::basic(Vec3::X));
    f.mesh(0.0, m);
    f.render();

    let texture = f.assets.add_texture(Texture::solid([255, 0, 0, 255]));
    f.assets.material_mut(m).unwrap().maps_mut().map = Some(texture);
    let info = f.render();

    assert_eq!(info.compiles, 1);
    assert_eq!(info.draw_calls, 1);
    assert_eq!(f.device().compile_count(), 2);
    assert_eq!(f.device().live_programs(), 1);
}

#[test]
fn light_count_change_recompiles_only_lit_materials() {
    let mut f = Fixture::new();
    let lit = f.material(Material::lambert(Vec3::ONE));
    let unlit = f.material(Material::basic(Vec3::ONE));
    f.mesh(-1.0, lit);
    f.mesh(1.0, unlit);
    f.light();
    assert_eq!(f.render().compiles, 2);

    f.light();
    assert_eq!(f.render().compiles, 1);
    assert_eq!(f.render().compiles, 0);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn compile_failure_is_isolated_and_reported() {
    let mut f = Fixture::new();
    f.renderer.device_mut().fail_compiles_containing("#define BROKEN");
    let broken = f.material(Material::basic(Vec3::X).with_define("BROKEN", "1"));
    let good = f.material(Material::basic(Vec3::Y));
    f.mesh(-1.0, broken);
    f.mesh(1.0, good);

    let info = f.render();
    assert_eq!(info.draw_calls, 1);
    assert_eq!(info.skipped, 1);

    let errors = f.compile_errors();
    assert_eq!(errors.len(), 1);
    let Diagnostic::ProgramCompile { material, log, .. } = &errors[0] else {
        unreachable!()
    };
    assert_eq!(*material, broken);
    assert!(log.contains("BROKEN"));
    assert!(f.assets.material(broken).unwrap().last_program_error().is_some());
    assert!(f.assets.material(good).unwrap().last_program_error().is_none());
}

#[test]
fn failures_are_not_retried_every_frame() {
    let mut f = Fixture::new();
    f.renderer.device_mut().fail_compiles_containing("#define BROKEN");
    let broken = f.material(Material::basic(Vec3::X).with_define("BROKEN", "1"));
    f.mesh(0.0, broken);

    f.render();
    f.render();
    f.render();

    assert_eq!(f.renderer.programs().stats().failures, 1);
    assert_eq!(f.compile_errors().len(), 1);
}

#[test]
fn fixing_the_material_clears_the_error() {
    let mut f = Fixture::new();
    f.renderer.device_mut().fail_compiles_containing("#define BROKEN");
    let m = f.material(Material::basic(Vec3::X).with_define("BROKEN", "1"));
    f.mesh(0.0, m);
    assert_eq!(f.render().draw_calls, 0);

    f.assets.material_mut(m).unwrap().defines_mut().clear();
    let info = f.render();

    assert_eq!(info.draw_calls, 1);
    assert!(f.assets.material(m).unwrap().last_program_error().is_none());
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn immediate_eviction_deletes_on_dispose() {
    let mut f = Fixture::with_settings(RendererSettings {
        eviction: EvictionPolicy::Immediate,
        ..RendererSettings::default()
    });
    let m = f.material(Material::basic(Vec3::X));
    f.mesh(0.0, m);
    f.render();
    assert_eq!(f.device().live_programs(), 1);

    f.renderer.dispose_material(m);

    assert_eq!(f.device().live_programs(), 0);
    assert_eq!(
        f.device().count(|c| matches!(c, DeviceCall::DeleteProgram(_))),
        1
    );
    assert!(f.renderer.programs().is_empty());
}

#[test]
fn keep_warm_eviction_waits_for_idle_frames() {
    let mut f = Fixture::with_settings(RendererSettings {
        eviction: EvictionPolicy::KeepWarm { idle_frames: 2 },
        ..RendererSettings::default()
    });
    let m = f.material(Material::basic(Vec3::X));
    f.mesh(0.0, m);
    f.render();

    f.renderer.dispose_material(m);
    f.assets.materials.remove(m);
    assert_eq!(f.device().live_programs(), 1);

    f.render();
    f.render();
    assert_eq!(f.device().live_programs(), 1);
    f.render();
    assert_eq!(f.device().live_programs(), 0);
}

#[test]
fn kept_warm_program_is_reused() {
    let mut f = Fixture::new();
    let m = f.material(Material::basic(Vec3::X));
    f.mesh(0.0, m);
    f.render();

    f.renderer.dispose_material(m);
    f.render();

    assert_eq!(f.device().compile_count(), 1);
    assert_eq!(f.render().draw_calls, 1);
}

// ============================================================================
// Pre-compilation
// ============================================================================

#[test]
fn compile_prewarms_programs() {
    let mut f = Fixture::new();
    let a = f.material(Material::basic(Vec3::X));
    let b = f.material(Material::lambert(Vec3::X));
    f.mesh(-1.0, a);
    f.mesh(1.0, b);

    let resolved = f
        .renderer
        .compile(&mut f.scene, f.camera, &mut f.assets)
        .unwrap();
    assert_eq!(resolved, 2);
    assert_eq!(f.device().compile_count(), 2);
    assert!(f.device().draw_calls().is_empty());

    let info = f.render();
    assert_eq!(info.compiles, 0);
    assert_eq!(info.draw_calls, 2);
}

#[test]
fn pending_programs_are_skipped_until_ready() {
    let mut f = Fixture::new();
    f.renderer.device_mut().defer_compiles(true);
    let m = f.material(Material::basic(Vec3::X));
    f.mesh(0.0, m);

    let info = f.render();
    assert_eq!(info.draw_calls, 0);
    assert_eq!(info.skipped, 1);

    f.renderer.device_mut().finish_compiles();
    let info = f.render();
    assert_eq!(info.draw_calls, 1);
    assert_eq!(f.device().compile_count(), 1);
}
