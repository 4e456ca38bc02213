//! Transform system.
//!
//! Updates world matrices down the hierarchy. Decoupled from [`Scene`] so it
//! only borrows the node map, the camera components and the root list.
//!
//! Propagation rules:
//! - a node whose local matrix was recomposed, or that was explicitly marked,
//!   rewrites its world matrix and forces the update onto its whole subtree;
//! - without a forced update, only children with `matrix_world_auto_update`
//!   are visited, so clean subtrees cost one check per node;
//! - a node with `matrix_world_auto_update` off never has its world matrix
//!   rewritten here, but a forced update still passes through it.
//!
//! [`Scene`]: crate::scene::Scene

use glam::Affine3A;
use slotmap::{SlotMap, SparseSecondaryMap};

use crate::scene::NodeHandle;
use crate::scene::camera::Camera;
use crate::scene::node::Node;

/// One pending entry of the traversal stack.
#[derive(Debug, Clone, Copy)]
pub struct PendingUpdate {
    handle: NodeHandle,
    /// `None` for roots: world equals local.
    parent_world: Option<Affine3A>,
    force: bool,
}

/// Updates every tree under `roots`. Returns how many world matrices were
/// rewritten.
///
/// `stack` is scratch space reused across frames.
pub fn update_hierarchy(
    nodes: &mut SlotMap<NodeHandle, Node>,
    cameras: &mut SparseSecondaryMap<NodeHandle, Camera>,
    roots: &[NodeHandle],
    force: bool,
    stack: &mut Vec<PendingUpdate>,
) -> usize {
    stack.clear();
    for &root in roots.iter().rev() {
        stack.push(PendingUpdate {
            handle: root,
            parent_world: None,
            force,
        });
    }
    run(nodes, cameras, stack)
}

/// Updates the subtree rooted at `root`, starting from its parent's cached
/// world matrix. The root's world matrix is always rewritten.
pub fn update_subtree(
    nodes: &mut SlotMap<NodeHandle, Node>,
    cameras: &mut SparseSecondaryMap<NodeHandle, Camera>,
    root: NodeHandle,
    stack: &mut Vec<PendingUpdate>,
) -> usize {
    let Some(node) = nodes.get(root) else {
        return 0;
    };
    let parent_world = node
        .parent
        .and_then(|p| nodes.get(p))
        .map(|p| p.transform.world_matrix);

    stack.clear();
    stack.push(PendingUpdate {
        handle: root,
        parent_world,
        force: true,
    });
    run(nodes, cameras, stack)
}

fn run(
    nodes: &mut SlotMap<NodeHandle, Node>,
    cameras: &mut SparseSecondaryMap<NodeHandle, Camera>,
    stack: &mut Vec<PendingUpdate>,
) -> usize {
    let mut rewritten = 0;

    while let Some(PendingUpdate {
        handle,
        parent_world,
        mut force,
    }) = stack.pop()
    {
        let Some(node) = nodes.get_mut(handle) else {
            continue;
        };
        let t = &mut node.transform;

        if !force && !t.matrix_world_auto_update {
            continue;
        }

        if t.matrix_auto_update {
            t.update_local_matrix();
        }

        if t.world_needs_update() || force {
            if t.matrix_world_auto_update {
                let world = match parent_world {
                    Some(parent) => parent * t.local_matrix,
                    None => t.local_matrix,
                };
                t.set_world_matrix(world);
                rewritten += 1;

                if let Some(camera) = cameras.get_mut(handle) {
                    camera.update_view_projection(&world);
                }
            } else {
                t.clear_world_dirty();
            }
            force = true;
        }

        let current_world = t.world_matrix;
        for &child in node.children.iter().rev() {
            stack.push(PendingUpdate {
                handle: child,
                parent_world: Some(current_world),
                force,
            });
        }
    }

    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn chain() -> (SlotMap<NodeHandle, Node>, NodeHandle, NodeHandle) {
        let mut nodes: SlotMap<NodeHandle, Node> = SlotMap::with_key();

        let mut parent = Node::new();
        parent.transform.position = Vec3::new(1.0, 0.0, 0.0);
        let parent_handle = nodes.insert(parent);

        let mut child = Node::new();
        child.transform.position = Vec3::new(0.0, 1.0, 0.0);
        child.parent = Some(parent_handle);
        let child_handle = nodes.insert(child);

        nodes[parent_handle].children.push(child_handle);
        (nodes, parent_handle, child_handle)
    }

    #[test]
    fn test_hierarchy_update() {
        let (mut nodes, parent, child) = chain();
        let mut cameras = SparseSecondaryMap::new();
        let mut stack = Vec::new();

        let n = update_hierarchy(&mut nodes, &mut cameras, &[parent], false, &mut stack);
        assert_eq!(n, 2);

        let child_world_pos = nodes[child].transform.world_matrix.translation;
        assert!((child_world_pos.x - 1.0).abs() < 1e-5);
        assert!((child_world_pos.y - 1.0).abs() < 1e-5);

        // Clean tree: nothing rewritten.
        let n = update_hierarchy(&mut nodes, &mut cameras, &[parent], false, &mut stack);
        assert_eq!(n, 0);
    }

    #[test]
    fn opted_out_child_keeps_world() {
        let (mut nodes, parent, child) = chain();
        let mut cameras = SparseSecondaryMap::new();
        let mut stack = Vec::new();
        update_hierarchy(&mut nodes, &mut cameras, &[parent], false, &mut stack);

        nodes[child].transform.matrix_world_auto_update = false;
        nodes[parent].transform.position = Vec3::new(5.0, 0.0, 0.0);
        let before = nodes[child].transform.world_version();
        update_hierarchy(&mut nodes, &mut cameras, &[parent], false, &mut stack);
        assert_eq!(nodes[child].transform.world_version(), before);
    }

    #[test]
    fn camera_follows_node() {
        let (mut nodes, parent, _) = chain();
        let mut cameras = SparseSecondaryMap::new();
        cameras.insert(parent, Camera::new_perspective(60.0, 1.0, 0.1, 10.0));
        let mut stack = Vec::new();
        update_hierarchy(&mut nodes, &mut cameras, &[parent], false, &mut stack);
        assert!(cameras[parent].world_position().abs_diff_eq(Vec3::X, 1e-6));
    }
}
