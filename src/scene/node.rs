use glam::Affine3A;

use crate::scene::NodeHandle;
use crate::scene::transform::Transform;

/// 32-bit layer membership mask.
///
/// A node is rendered by a camera when their masks share at least one bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layers(pub u32);

impl Layers {
    pub const ALL: Layers = Layers(u32::MAX);
    pub const NONE: Layers = Layers(0);

    /// Membership of layer 0 only.
    #[must_use]
    pub const fn default_layer() -> Self {
        Layers(1)
    }

    /// Membership of exactly one layer (`0..32`).
    #[must_use]
    pub const fn only(layer: u32) -> Self {
        Layers(1 << (layer & 31))
    }

    pub fn enable(&mut self, layer: u32) {
        self.0 |= 1 << (layer & 31);
    }

    pub fn disable(&mut self, layer: u32) {
        self.0 &= !(1 << (layer & 31));
    }

    #[inline]
    #[must_use]
    pub fn test(self, other: Layers) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for Layers {
    fn default() -> Self {
        Self::default_layer()
    }
}

/// A scene node holding only the data traversed every frame.
///
/// Meshes, cameras and lights live in the scene's component maps keyed by
/// the node's handle. The parent handle is a non-owning back-reference; the
/// ordered `children` list is the owning side of the tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub transform: Transform,

    /// Invisible nodes and their subtrees are skipped by the render list.
    pub visible: bool,
    pub layers: Layers,
    /// Cull against the camera frustum using the geometry's bounding sphere.
    pub frustum_culled: bool,
    /// Primary sort key, ascending, in every bucket.
    pub render_order: i32,
    /// When set, applied as the group order of every drawable in the subtree.
    pub group_order: Option<i32>,
}

impl Node {
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: String::new(),
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            visible: true,
            layers: Layers::default(),
            frustum_culled: true,
            render_order: 0,
            group_order: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    /// World matrix as of the last hierarchy update.
    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.transform.world_matrix
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_intersection() {
        let mut a = Layers::default();
        let b = Layers::only(3);
        assert!(!a.test(b));
        a.enable(3);
        assert!(a.test(b));
        a.disable(3);
        a.disable(0);
        assert!(!a.test(Layers::ALL));
    }
}
