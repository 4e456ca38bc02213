use glam::Vec3;
use slotmap::{SlotMap, SparseSecondaryMap};

use crate::errors::{PrismError, Result};
use crate::resources::mesh::Mesh;
use crate::scene::NodeHandle;
use crate::scene::camera::Camera;
use crate::scene::light::{Fog, Light};
use crate::scene::node::Node;
use crate::scene::transform_system::{self, PendingUpdate};

/// Hierarchy notification, drained with [`Scene::drain_events`].
///
/// Only recorded after [`Scene::set_event_recording`] turns it on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEvent {
    /// `child` was placed under `parent` (`None` for the root list).
    Added {
        child: NodeHandle,
        parent: Option<NodeHandle>,
    },
    /// `child` left `parent` (`None` for the root list).
    Removed {
        child: NodeHandle,
        parent: Option<NodeHandle>,
    },
}

/// Scene graph.
///
/// Nodes live in a slotmap; components are keyed by the owning node's handle.
/// The tree invariants (one parent per node, no cycles) are enforced at
/// [`attach`](Self::attach).
pub struct Scene {
    pub(crate) nodes: SlotMap<NodeHandle, Node>,
    pub(crate) root_nodes: Vec<NodeHandle>,

    // === Components ===
    pub(crate) meshes: SparseSecondaryMap<NodeHandle, Mesh>,
    pub(crate) cameras: SparseSecondaryMap<NodeHandle, Camera>,
    pub(crate) lights: SparseSecondaryMap<NodeHandle, Light>,

    pub fog: Option<Fog>,
    pub active_camera: Option<NodeHandle>,

    events: Vec<SceneEvent>,
    record_events: bool,
    update_stack: Vec<PendingUpdate>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root_nodes: Vec::new(),
            meshes: SparseSecondaryMap::new(),
            cameras: SparseSecondaryMap::new(),
            lights: SparseSecondaryMap::new(),
            fog: None,
            active_camera: None,
            events: Vec::new(),
            record_events: false,
            update_stack: Vec::with_capacity(64),
        }
    }

    pub fn build_node(&mut self, name: &str) -> NodeBuilder<'_> {
        NodeBuilder::new(self, name)
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Adds a node at the root level.
    pub fn add_node(&mut self, node: Node) -> NodeHandle {
        let handle = self.nodes.insert(node);
        self.root_nodes.push(handle);
        self.record(SceneEvent::Added {
            child: handle,
            parent: None,
        });
        handle
    }

    /// Adds a node directly under `parent`.
    pub fn add_to_parent(&mut self, node: Node, parent: NodeHandle) -> Result<NodeHandle> {
        if !self.nodes.contains_key(parent) {
            return Err(PrismError::NodeNotFound(parent));
        }
        let handle = self.nodes.insert(node);
        self.link(handle, parent);
        Ok(handle)
    }

    /// Places `child` under `parent`, detaching it from its current parent
    /// first.
    ///
    /// Rejects self-parenting and attachments that would make `child` its
    /// own ancestor; the tree is unchanged on error.
    pub fn attach(&mut self, child: NodeHandle, parent: NodeHandle) -> Result<()> {
        if child == parent {
            log::warn!("Cannot attach node {child:?} to itself");
            return Err(PrismError::SelfParenting(child));
        }
        if !self.nodes.contains_key(child) {
            return Err(PrismError::NodeNotFound(child));
        }
        if !self.nodes.contains_key(parent) {
            return Err(PrismError::NodeNotFound(parent));
        }
        if self.is_ancestor(child, parent) {
            log::warn!("Attaching {child:?} under {parent:?} would create a cycle");
            return Err(PrismError::HierarchyCycle { child, parent });
        }

        if self.nodes[child].parent == Some(parent) {
            return Ok(());
        }

        self.unlink(child);
        self.link(child, parent);
        Ok(())
    }

    /// Moves `child` to the root level.
    pub fn detach(&mut self, child: NodeHandle) -> Result<()> {
        let Some(node) = self.nodes.get(child) else {
            return Err(PrismError::NodeNotFound(child));
        };
        if node.parent.is_none() {
            return Ok(());
        }
        self.unlink(child);
        self.root_nodes.push(child);
        self.events.push(SceneEvent::Added {
            child,
            parent: None,
        });
        if let Some(n) = self.nodes.get_mut(child) {
            n.transform.mark_world_dirty();
        }
        Ok(())
    }

    /// Removes the node, its whole subtree and their components.
    pub fn remove_node(&mut self, handle: NodeHandle) -> Result<()> {
        if !self.nodes.contains_key(handle) {
            return Err(PrismError::NodeNotFound(handle));
        }
        self.unlink(handle);

        let mut pending = vec![handle];
        while let Some(h) = pending.pop() {
            let Some(node) = self.nodes.remove(h) else {
                continue;
            };
            pending.extend_from_slice(&node.children);
            self.meshes.remove(h);
            self.cameras.remove(h);
            self.lights.remove(h);
            if self.active_camera == Some(h) {
                self.active_camera = None;
            }
        }
        Ok(())
    }

    /// Whether `ancestor` lies on the parent chain of `node` (or is `node`).
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut current = Some(node);
        while let Some(h) = current {
            if h == ancestor {
                return true;
            }
            current = self.nodes.get(h).and_then(|n| n.parent);
        }
        false
    }

    fn link(&mut self, child: NodeHandle, parent: NodeHandle) {
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
            c.transform.mark_world_dirty();
        }
        self.record(SceneEvent::Added {
            child,
            parent: Some(parent),
        });
    }

    /// Removes `child` from its parent's list or the root list.
    fn unlink(&mut self, child: NodeHandle) {
        let old_parent = self.nodes.get(child).and_then(|n| n.parent);
        match old_parent {
            Some(p) => {
                if let Some(n) = self.nodes.get_mut(p)
                    && let Some(i) = n.children.iter().position(|&x| x == child)
                {
                    n.children.remove(i);
                }
                if let Some(c) = self.nodes.get_mut(child) {
                    c.parent = None;
                }
            }
            None => {
                if let Some(i) = self.root_nodes.iter().position(|&x| x == child) {
                    self.root_nodes.remove(i);
                }
            }
        }
        self.record(SceneEvent::Removed {
            child,
            parent: old_parent,
        });
    }

    fn record(&mut self, event: SceneEvent) {
        if self.record_events {
            self.events.push(event);
        }
    }

    /// Starts or stops recording hierarchy notifications. Stopping drops
    /// anything not yet drained.
    pub fn set_event_recording(&mut self, enabled: bool) {
        self.record_events = enabled;
        if !enabled {
            self.events = Vec::new();
        }
    }

    #[must_use]
    pub fn is_recording_events(&self) -> bool {
        self.record_events
    }

    /// Takes the hierarchy notifications recorded since the last call.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, SceneEvent> {
        self.events.drain(..)
    }

    // ========================================================================
    // Access
    // ========================================================================

    #[must_use]
    pub fn get_node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    pub fn get_node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    #[must_use]
    pub fn root_nodes(&self) -> &[NodeHandle] {
        &self.root_nodes
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn set_mesh(&mut self, handle: NodeHandle, mesh: Mesh) -> Result<()> {
        self.require(handle)?;
        self.meshes.insert(handle, mesh);
        Ok(())
    }

    pub fn set_camera(&mut self, handle: NodeHandle, mut camera: Camera) -> Result<()> {
        let node = self.nodes.get(handle).ok_or(PrismError::NodeNotFound(handle))?;
        camera.update_view_projection(&node.transform.world_matrix);
        self.cameras.insert(handle, camera);
        if self.active_camera.is_none() {
            self.active_camera = Some(handle);
        }
        Ok(())
    }

    pub fn set_light(&mut self, handle: NodeHandle, light: Light) -> Result<()> {
        self.require(handle)?;
        self.lights.insert(handle, light);
        Ok(())
    }

    fn require(&self, handle: NodeHandle) -> Result<()> {
        if self.nodes.contains_key(handle) {
            Ok(())
        } else {
            Err(PrismError::NodeNotFound(handle))
        }
    }

    #[must_use]
    pub fn mesh(&self, handle: NodeHandle) -> Option<&Mesh> {
        self.meshes.get(handle)
    }

    pub fn mesh_mut(&mut self, handle: NodeHandle) -> Option<&mut Mesh> {
        self.meshes.get_mut(handle)
    }

    #[must_use]
    pub fn camera(&self, handle: NodeHandle) -> Option<&Camera> {
        self.cameras.get(handle)
    }

    pub fn camera_mut(&mut self, handle: NodeHandle) -> Option<&mut Camera> {
        self.cameras.get_mut(handle)
    }

    #[must_use]
    pub fn light(&self, handle: NodeHandle) -> Option<&Light> {
        self.lights.get(handle)
    }

    pub fn light_mut(&mut self, handle: NodeHandle) -> Option<&mut Light> {
        self.lights.get_mut(handle)
    }

    pub fn lights(&self) -> impl Iterator<Item = (NodeHandle, &Light)> {
        self.lights.iter()
    }

    /// World-space position of a node as of the last update.
    #[must_use]
    pub fn world_position(&self, handle: NodeHandle) -> Option<Vec3> {
        self.nodes.get(handle).map(|n| n.transform.world_position())
    }

    /// Depth-first pre-order walk over the subtree rooted at `root`.
    pub fn traverse(&self, root: NodeHandle, mut visit: impl FnMut(NodeHandle, &Node)) {
        let mut stack = vec![root];
        while let Some(h) = stack.pop() {
            let Some(node) = self.nodes.get(h) else {
                continue;
            };
            visit(h, node);
            stack.extend(node.children.iter().rev().copied());
        }
    }

    // ========================================================================
    // Matrix update pipeline
    // ========================================================================

    /// Brings every world matrix up to date. Returns how many were rewritten.
    pub fn update_matrix_world(&mut self) -> usize {
        transform_system::update_hierarchy(
            &mut self.nodes,
            &mut self.cameras,
            &self.root_nodes,
            false,
            &mut self.update_stack,
        )
    }

    /// Rewrites every world matrix regardless of dirty state.
    pub fn force_update_matrix_world(&mut self) -> usize {
        transform_system::update_hierarchy(
            &mut self.nodes,
            &mut self.cameras,
            &self.root_nodes,
            true,
            &mut self.update_stack,
        )
    }

    /// Refreshes one subtree from its parent's cached world matrix.
    pub fn update_subtree(&mut self, root: NodeHandle) -> Result<usize> {
        self.require(root)?;
        Ok(transform_system::update_subtree(
            &mut self.nodes,
            &mut self.cameras,
            root,
            &mut self.update_stack,
        ))
    }
}

/// Fluent node construction.
pub struct NodeBuilder<'a> {
    scene: &'a mut Scene,
    node: Node,
    parent: Option<NodeHandle>,
    mesh: Option<Mesh>,
    light: Option<Light>,
    camera: Option<Camera>,
}

impl<'a> NodeBuilder<'a> {
    pub fn new(scene: &'a mut Scene, name: &str) -> Self {
        Self {
            scene,
            node: Node::new().with_name(name),
            parent: None,
            mesh: None,
            light: None,
            camera: None,
        }
    }

    #[must_use]
    pub fn with_position(mut self, x: f32, y: f32, z: f32) -> Self {
        self.node.transform.position = Vec3::new(x, y, z);
        self
    }

    #[must_use]
    pub fn with_scale(mut self, s: f32) -> Self {
        self.node.transform.scale = Vec3::splat(s);
        self
    }

    #[must_use]
    pub fn with_render_order(mut self, order: i32) -> Self {
        self.node.render_order = order;
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: NodeHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    #[must_use]
    pub fn with_light(mut self, light: Light) -> Self {
        self.light = Some(light);
        self
    }

    #[must_use]
    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn build(self) -> Result<NodeHandle> {
        let handle = match self.parent {
            Some(parent) => self.scene.add_to_parent(self.node, parent)?,
            None => self.scene.add_node(self.node),
        };
        if let Some(mesh) = self.mesh {
            self.scene.set_mesh(handle, mesh)?;
        }
        if let Some(light) = self.light {
            self.scene.set_light(handle, light)?;
        }
        if let Some(camera) = self.camera {
            self.scene.set_camera(handle, camera)?;
        }
        Ok(handle)
    }
}
