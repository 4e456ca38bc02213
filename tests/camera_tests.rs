//! Camera and Frustum Tests
//!
//! Tests for:
//! - Perspective/Orthographic projection in both clip depth ranges
//! - View matrix as the inverse of the camera node's world transform
//! - Frustum plane extraction and sphere tests
//! - Camera following its node through the scene graph

use glam::{Affine3A, Mat4, Vec3, Vec4};

use prism::scene::camera::{Camera, DepthOrigin, Frustum};
use prism::scene::Scene;

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn ndc_z(projection: &Mat4, view_z: f32) -> f32 {
    let clip = *projection * Vec4::new(0.0, 0.0, view_z, 1.0);
    clip.z / clip.w
}

// ============================================================================
// Projection
// ============================================================================

#[test]
fn perspective_depth_range_zero_to_one() {
    let cam = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    assert!(approx(ndc_z(cam.projection_matrix(), -0.1), 0.0));
    assert!(approx(ndc_z(cam.projection_matrix(), -100.0), 1.0));
}

#[test]
fn perspective_depth_range_neg_one_to_one() {
    let mut cam = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    cam.depth_origin = DepthOrigin::NegOneToOne;
    cam.update_projection_matrix();
    assert!(approx(ndc_z(cam.projection_matrix(), -0.1), -1.0));
    assert!(approx(ndc_z(cam.projection_matrix(), -100.0), 1.0));
}

#[test]
fn aspect_ratio_scales_x_only() {
    let wide = Camera::new_perspective(60.0, 2.0, 0.1, 100.0);
    let square = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    let (w, s) = (wide.projection_matrix(), square.projection_matrix());
    assert!(approx(w.x_axis.x * 2.0, s.x_axis.x));
    assert!(approx(w.y_axis.y, s.y_axis.y));
}

#[test]
fn orthographic_keeps_scale_with_depth() {
    let cam = Camera::new_orthographic(5.0, 1.0, 0.0, 10.0);
    let vp = *cam.projection_matrix();
    let near = vp * Vec4::new(5.0, 0.0, -1.0, 1.0);
    let far = vp * Vec4::new(5.0, 0.0, -9.0, 1.0);
    assert!(approx(near.x / near.w, 1.0));
    assert!(approx(far.x / far.w, 1.0));
    assert!(cam.is_orthographic());
}

#[test]
fn degenerate_projection_keeps_last_matrix() {
    let mut cam = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    let before = *cam.projection_matrix();
    cam.projection = Camera::new_perspective(60.0, 1.0, 5.0, 5.0).projection;
    cam.update_projection_matrix();
    assert!(cam.is_degenerate());
    assert_eq!(*cam.projection_matrix(), before);
}

// ============================================================================
// View
// ============================================================================

#[test]
fn view_matrix_is_inverse_of_world() {
    let mut cam = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    let world = Affine3A::from_translation(Vec3::new(1.0, 2.0, 3.0));
    cam.update_view_projection(&world);

    let product = Mat4::from(world) * *cam.view_matrix();
    assert!(product.abs_diff_eq(Mat4::IDENTITY, EPSILON));
    assert!(approx(cam.world_position().y, 2.0));
}

#[test]
fn camera_follows_its_node() {
    let mut scene = Scene::new();
    let rig = scene.build_node("rig").with_position(0.0, 5.0, 0.0).build().unwrap();
    let camera = scene
        .build_node("camera")
        .with_position(0.0, 0.0, 10.0)
        .with_parent(rig)
        .with_camera(Camera::new_perspective(60.0, 1.0, 0.1, 100.0))
        .build()
        .unwrap();

    scene.update_matrix_world();
    let world = *scene.get_node(camera).unwrap().world_matrix();
    let cam = scene.camera_mut(camera).unwrap();
    cam.update_view_projection(&world);

    let position = cam.world_position();
    assert!(approx(position.y, 5.0));
    assert!(approx(position.z, 10.0));
    // The rig origin is 10 units straight ahead.
    assert!(cam.frustum().contains_point(Vec3::new(0.0, 5.0, 0.0)));
}

// ============================================================================
// Frustum
// ============================================================================

fn test_frustum() -> Frustum {
    let cam = Camera::new_perspective(90.0, 1.0, 0.1, 100.0);
    Frustum::from_matrix(*cam.projection_matrix(), DepthOrigin::ZeroToOne)
}

#[test]
fn sphere_inside() {
    assert!(test_frustum().intersects_sphere(Vec3::new(0.0, 0.0, -10.0), 1.0));
}

#[test]
fn sphere_outside_left() {
    assert!(!test_frustum().intersects_sphere(Vec3::new(-30.0, 0.0, -10.0), 1.0));
}

#[test]
fn sphere_behind_camera() {
    assert!(!test_frustum().intersects_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0));
}

#[test]
fn sphere_beyond_far_plane() {
    assert!(!test_frustum().intersects_sphere(Vec3::new(0.0, 0.0, -150.0), 1.0));
}

#[test]
fn sphere_straddling_boundary() {
    // Center just outside the left plane (x = z at 90 degrees), radius reaches in.
    assert!(test_frustum().intersects_sphere(Vec3::new(-10.5, 0.0, -10.0), 1.0));
}
