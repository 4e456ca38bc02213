use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use glam::Vec3;

use prism::assets::Assets;
use prism::renderer::render_list::RenderList;
use prism::renderer::{HeadlessDevice, Renderer, RendererSettings};
use prism::resources::{Geometry, Material, Mesh};
use prism::scene::{Camera, NodeHandle, Scene};

// ---------------------------------------------------------------------------
// Scene setup
// ---------------------------------------------------------------------------

/// A grid of `n` triangles in front of the camera, every fourth one
/// transparent, sharing eight materials.
fn grid_scene(n: usize) -> (Scene, Assets, NodeHandle) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut scene = Scene::new();
    let mut assets = Assets::new();
    let camera = scene
        .build_node("camera")
        .with_position(0.0, 0.0, 20.0)
        .with_camera(Camera::new_perspective(60.0, 1.0, 0.1, 500.0))
        .build()
        .expect("camera node");

    let geometry = assets.add_geometry(Geometry::with_positions(vec![
        -0.5, -0.5, 0.0, 0.5, -0.5, 0.0, 0.0, 0.5, 0.0,
    ]));
    let materials: Vec<_> = (0..8)
        .map(|i| {
            let material = Material::lambert(Vec3::splat(i as f32 / 8.0));
            let material = if i % 4 == 0 {
                material.with_transparent(true).with_opacity(0.5)
            } else {
                material
            };
            assets.add_material(material)
        })
        .collect();

    let side = (n as f32).sqrt().ceil() as usize;
    for i in 0..n {
        let (x, y) = ((i % side) as f32, (i / side) as f32);
        scene
            .build_node("mesh")
            .with_position(x - side as f32 / 2.0, y - side as f32 / 2.0, -(i % 7) as f32)
            .with_mesh(Mesh::new(geometry, materials[i % materials.len()]))
            .build()
            .expect("mesh node");
    }
    scene.update_matrix_world();
    (scene, assets, camera)
}

// ---------------------------------------------------------------------------
// Render list
// ---------------------------------------------------------------------------

fn bench_build_and_sort(c: &mut Criterion) {
    let (scene, assets, camera) = grid_scene(2_000);
    let camera = scene.camera(camera).expect("camera").clone();
    let mut list = RenderList::new();

    c.bench_function("render_list_build_sort_2000", |b| {
        b.iter(|| {
            list.build(black_box(&scene), &camera, &assets);
            list.sort(None, None);
            black_box(list.len())
        });
    });
}

// ---------------------------------------------------------------------------
// Full frame (headless device)
// ---------------------------------------------------------------------------

fn bench_steady_frame(c: &mut Criterion) {
    let (mut scene, mut assets, camera) = grid_scene(2_000);
    let mut renderer = Renderer::new(HeadlessDevice::new(), RendererSettings::default());
    renderer
        .render_frame(&mut scene, camera, &mut assets)
        .expect("warm-up frame");

    c.bench_function("steady_frame_2000", |b| {
        b.iter(|| {
            renderer.device_mut().clear_calls();
            let info = renderer
                .render_frame(&mut scene, camera, &mut assets)
                .expect("frame");
            black_box(info.draw_calls)
        });
    });
}

criterion_group!(benches, bench_build_and_sort, bench_steady_frame);
criterion_main!(benches);
