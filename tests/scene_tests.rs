//! Scene graph tests
//!
//! Tests for:
//! - Hierarchy attach / detach / remove and the tree invariants
//! - Attach and detach notifications
//! - World matrix invariant after arbitrary mutation sequences
//! - Dirty propagation touching only the changed subtree
//! - Per-node opt-out of automatic world updates

use glam::{Affine3A, Quat, Vec3};
use prism::errors::PrismError;
use prism::scene::{Node, NodeHandle, Scene, SceneEvent, Transform};

// ============================================================================
// Helper
// ============================================================================

const EPSILON: f32 = 1e-4;

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    (a - b).abs().max_element() < EPSILON
}

fn affine_approx(a: &Affine3A, b: &Affine3A) -> bool {
    a.to_cols_array()
        .iter()
        .zip(b.to_cols_array().iter())
        .all(|(x, y)| (x - y).abs() < EPSILON)
}

fn world_version(scene: &Scene, handle: NodeHandle) -> u64 {
    scene.get_node(handle).unwrap().transform.world_version()
}

/// Asserts `world == parent.world * local` for every node.
fn assert_world_invariant(scene: &Scene) {
    let mut all = Vec::new();
    for &root in scene.root_nodes() {
        scene.traverse(root, |h, _| all.push(h));
    }
    for handle in all {
        let node = scene.get_node(handle).unwrap();
        let parent_world = node
            .parent()
            .map_or(Affine3A::IDENTITY, |p| *scene.get_node(p).unwrap().world_matrix());
        let expected = parent_world * *node.transform.local_matrix();
        assert!(
            affine_approx(node.world_matrix(), &expected),
            "world matrix of {:?} is stale",
            node.name
        );
    }
}

/// root -> a -> b, root -> c
fn small_tree(scene: &mut Scene) -> (NodeHandle, NodeHandle, NodeHandle, NodeHandle) {
    let root = scene.build_node("root").with_position(0.0, 1.0, 0.0).build().unwrap();
    let a = scene
        .build_node("a")
        .with_position(1.0, 0.0, 0.0)
        .with_parent(root)
        .build()
        .unwrap();
    let b = scene
        .build_node("b")
        .with_position(0.0, 0.0, 2.0)
        .with_parent(a)
        .build()
        .unwrap();
    let c = scene
        .build_node("c")
        .with_position(-1.0, 0.0, 0.0)
        .with_parent(root)
        .build()
        .unwrap();
    (root, a, b, c)
}

// ============================================================================
// Hierarchy
// ============================================================================

#[test]
fn self_parenting_is_rejected() {
    let mut scene = Scene::new();
    let a = scene.add_node(Node::new());
    assert_eq!(scene.attach(a, a), Err(PrismError::SelfParenting(a)));
    assert_eq!(scene.root_nodes(), &[a]);
}

#[test]
fn cycles_are_rejected_and_tree_is_unchanged() {
    let mut scene = Scene::new();
    let (root, a, b, _) = small_tree(&mut scene);

    let err = scene.attach(root, b).unwrap_err();
    assert_eq!(err, PrismError::HierarchyCycle { child: root, parent: b });

    assert_eq!(scene.get_node(root).unwrap().parent(), None);
    assert_eq!(scene.get_node(b).unwrap().parent(), Some(a));
    assert_eq!(scene.root_nodes(), &[root]);
}

#[test]
fn reattaching_moves_the_subtree() {
    let mut scene = Scene::new();
    let (root, a, b, c) = small_tree(&mut scene);
    scene.set_event_recording(true);

    scene.attach(a, c).unwrap();

    assert_eq!(scene.get_node(root).unwrap().children(), &[c]);
    assert_eq!(scene.get_node(c).unwrap().children(), &[a]);
    assert_eq!(scene.get_node(b).unwrap().parent(), Some(a));

    let events: Vec<SceneEvent> = scene.drain_events().collect();
    assert_eq!(
        events,
        vec![
            SceneEvent::Removed {
                child: a,
                parent: Some(root)
            },
            SceneEvent::Added {
                child: a,
                parent: Some(c)
            },
        ]
    );
}

#[test]
fn events_are_not_buffered_unless_recording() {
    let mut scene = Scene::new();
    for _ in 0..1_000 {
        let node = scene.add_node(Node::new());
        scene.remove_node(node).unwrap();
    }
    assert!(!scene.is_recording_events());
    assert_eq!(scene.drain_events().count(), 0);

    scene.set_event_recording(true);
    let node = scene.add_node(Node::new());
    scene.set_event_recording(false);
    scene.remove_node(node).unwrap();
    assert_eq!(scene.drain_events().count(), 0);
}

#[test]
fn detach_makes_a_root() {
    let mut scene = Scene::new();
    let (root, a, _, _) = small_tree(&mut scene);
    scene.detach(a).unwrap();
    assert_eq!(scene.get_node(a).unwrap().parent(), None);
    assert_eq!(scene.root_nodes(), &[root, a]);
    assert!(!scene.is_ancestor(root, a));
}

#[test]
fn remove_node_drops_whole_subtree() {
    let mut scene = Scene::new();
    let (root, a, b, c) = small_tree(&mut scene);
    scene.remove_node(a).unwrap();

    assert!(scene.get_node(a).is_none());
    assert!(scene.get_node(b).is_none());
    assert_eq!(scene.get_node(root).unwrap().children(), &[c]);
    assert_eq!(scene.node_count(), 2);
    assert_eq!(scene.remove_node(a), Err(PrismError::NodeNotFound(a)));
}

// ============================================================================
// World matrices
// ============================================================================

#[test]
fn child_world_position_follows_parent() {
    let mut scene = Scene::new();
    let a = scene.build_node("A").with_position(0.0, 0.0, -5.0).build().unwrap();
    let b = scene
        .build_node("B")
        .with_position(1.0, 0.0, 0.0)
        .with_parent(a)
        .build()
        .unwrap();

    scene.update_matrix_world();

    assert!(vec3_approx(scene.world_position(b).unwrap(), Vec3::new(1.0, 0.0, -5.0)));
}

#[test]
fn world_invariant_holds_after_mutations_and_reparenting() {
    let mut scene = Scene::new();
    let (root, a, b, c) = small_tree(&mut scene);
    scene.update_matrix_world();
    assert_world_invariant(&scene);

    let steps: [(NodeHandle, Vec3, f32, f32); 4] = [
        (a, Vec3::new(0.5, 2.0, -1.0), 0.7, 1.0),
        (root, Vec3::new(-3.0, 0.0, 4.0), -1.2, 2.0),
        (b, Vec3::new(0.0, -1.0, 0.0), 2.5, 0.5),
        (c, Vec3::new(1.0, 1.0, 1.0), 0.1, 3.0),
    ];
    for (i, (handle, position, angle, scale)) in steps.into_iter().enumerate() {
        let node = scene.get_node_mut(handle).unwrap();
        node.transform.set_local(
            position,
            Quat::from_rotation_y(angle),
            Vec3::splat(scale),
        );
        if i == 2 {
            scene.attach(b, c).unwrap();
        }
        scene.update_matrix_world();
        assert_world_invariant(&scene);
    }
}

#[test]
fn update_touches_only_dirty_subtree() {
    let mut scene = Scene::new();
    let (root, a, b, c) = small_tree(&mut scene);
    scene.update_matrix_world();

    let before: Vec<u64> = [root, a, b, c].iter().map(|&h| world_version(&scene, h)).collect();

    scene.get_node_mut(a).unwrap().transform.position.x = 9.0;
    let rewritten = scene.update_matrix_world();

    assert_eq!(rewritten, 2);
    assert_eq!(world_version(&scene, root), before[0]);
    assert!(world_version(&scene, a) > before[1]);
    assert!(world_version(&scene, b) > before[2]);
    assert_eq!(world_version(&scene, c), before[3]);
}

#[test]
fn clean_tree_rewrites_nothing() {
    let mut scene = Scene::new();
    small_tree(&mut scene);
    scene.update_matrix_world();
    assert_eq!(scene.update_matrix_world(), 0);
}

#[test]
fn world_auto_update_opt_out_keeps_matrix() {
    let mut scene = Scene::new();
    let (_, a, b, _) = small_tree(&mut scene);
    scene.update_matrix_world();
    let frozen = *scene.get_node(b).unwrap().world_matrix();

    scene.get_node_mut(b).unwrap().transform.matrix_world_auto_update = false;
    scene.get_node_mut(a).unwrap().transform.position.y = 4.0;
    scene.update_matrix_world();

    assert!(affine_approx(scene.get_node(b).unwrap().world_matrix(), &frozen));
}

#[test]
fn update_subtree_uses_parent_cached_world() {
    let mut scene = Scene::new();
    let (_, a, b, _) = small_tree(&mut scene);
    scene.update_matrix_world();

    scene.get_node_mut(b).unwrap().transform.position = Vec3::new(0.0, 0.0, 7.0);
    scene.update_subtree(b).unwrap();

    let expected = scene.get_node(a).unwrap().world_matrix().transform_point3(Vec3::new(0.0, 0.0, 7.0));
    assert!(vec3_approx(scene.world_position(b).unwrap(), expected));
}

#[test]
fn apply_local_matrix_decomposes() {
    let mut t = Transform::new();
    let m = Affine3A::from_scale_rotation_translation(
        Vec3::new(2.0, 2.0, 2.0),
        Quat::from_rotation_z(0.5),
        Vec3::new(1.0, 2.0, 3.0),
    );
    t.apply_local_matrix(m);
    assert!(vec3_approx(t.position, Vec3::new(1.0, 2.0, 3.0)));
    assert!(vec3_approx(t.scale, Vec3::splat(2.0)));
    assert!(t.rotation.abs_diff_eq(Quat::from_rotation_z(0.5), EPSILON));
}
