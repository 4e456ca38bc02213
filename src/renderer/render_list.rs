//! Render List
//!
//! Built once per frame by walking the scene graph depth-first. Every visible
//! mesh whose layers intersect the camera's and whose bounding sphere touches
//! the frustum emits one [`Drawable`] per material (one per geometry group
//! for multi-material meshes). Drawables are bucketed by the material's
//! [`TransparencyClass`].
//!
//! The three vectors are cleared, not dropped, between frames, so after the
//! first few frames building a list does not allocate.
//!
//! # Ordering
//!
//! | bucket                      | key (ascending)                                         |
//! |-----------------------------|---------------------------------------------------------|
//! | opaque                      | render order, group order, material id, depth, id       |
//! | transmissive / transparent  | render order, group order, depth (descending), id       |
//!
//! All sorts are stable and end on the insertion id, so an unchanged scene
//! always produces the same order.

use std::cmp::Ordering;

use glam::{Affine3A, Vec3};
use slotmap::Key;

use crate::assets::{Assets, GeometryHandle, MaterialHandle};
use crate::resources::geometry::GeometryGroup;
use crate::resources::material::TransparencyClass;
use crate::scene::camera::Camera;
use crate::scene::{NodeHandle, Scene};

/// One draw item for one frame.
#[derive(Debug, Clone, Copy)]
pub struct Drawable {
    /// Insertion order within the frame, shared across buckets.
    pub id: u32,
    pub node: NodeHandle,
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    /// Small per-material integer used for batching locality.
    pub material_id: u32,
    /// Sub-range for multi-material meshes.
    pub group: Option<GeometryGroup>,
    pub world_matrix: Affine3A,
    /// View-space distance along the camera's forward axis; larger is farther.
    pub z: f32,
    pub render_order: i32,
    pub group_order: i32,
    pub instance_count: u32,
}

impl Drawable {
    /// Negative determinant: the winding order flips.
    #[inline]
    #[must_use]
    pub fn is_mirrored(&self) -> bool {
        self.world_matrix.matrix3.determinant() < 0.0
    }
}

/// Replacement ordering for a bucket.
pub type DrawableComparator = fn(&Drawable, &Drawable) -> Ordering;

/// Default opaque ordering: state locality first, then front to back.
#[must_use]
pub fn painter_sort_stable(a: &Drawable, b: &Drawable) -> Ordering {
    a.render_order
        .cmp(&b.render_order)
        .then(a.group_order.cmp(&b.group_order))
        .then(a.material_id.cmp(&b.material_id))
        .then(a.z.total_cmp(&b.z))
        .then(a.id.cmp(&b.id))
}

/// Default transparent ordering: back to front.
#[must_use]
pub fn reverse_painter_sort_stable(a: &Drawable, b: &Drawable) -> Ordering {
    a.render_order
        .cmp(&b.render_order)
        .then(a.group_order.cmp(&b.group_order))
        .then(b.z.total_cmp(&a.z))
        .then(a.id.cmp(&b.id))
}

/// An asset a mesh referenced that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingAsset {
    pub node: NodeHandle,
    pub what: &'static str,
}

/// Pooled per-frame render list.
#[derive(Debug, Default)]
pub struct RenderList {
    opaque: Vec<Drawable>,
    transmissive: Vec<Drawable>,
    transparent: Vec<Drawable>,
    lights: Vec<NodeHandle>,
    missing: Vec<MissingAsset>,
    next_id: u32,
    stack: Vec<(NodeHandle, i32)>,
}

impl RenderList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties every bucket, keeping allocations.
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transmissive.clear();
        self.transparent.clear();
        self.lights.clear();
        self.missing.clear();
        self.next_id = 0;
    }

    #[must_use]
    pub fn opaque(&self) -> &[Drawable] {
        &self.opaque
    }

    #[must_use]
    pub fn transmissive(&self) -> &[Drawable] {
        &self.transmissive
    }

    #[must_use]
    pub fn transparent(&self) -> &[Drawable] {
        &self.transparent
    }

    /// Lights visible to the camera, in traversal order.
    #[must_use]
    pub fn lights(&self) -> &[NodeHandle] {
        &self.lights
    }

    /// Assets referenced by meshes but missing from [`Assets`].
    #[must_use]
    pub fn missing(&self) -> &[MissingAsset] {
        &self.missing
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transmissive.len() + self.transparent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opaque, then transmissive, then transparent.
    pub fn iter(&self) -> impl Iterator<Item = &Drawable> {
        self.opaque
            .iter()
            .chain(&self.transmissive)
            .chain(&self.transparent)
    }

    /// Appends a drawable to the bucket of `class`, assigning its id.
    pub fn push(&mut self, class: TransparencyClass, mut drawable: Drawable) {
        drawable.id = self.next_id;
        self.next_id += 1;
        match class {
            TransparencyClass::Opaque => self.opaque.push(drawable),
            TransparencyClass::Transmissive => self.transmissive.push(drawable),
            TransparencyClass::Transparent => self.transparent.push(drawable),
        }
    }

    /// Sorts the buckets. `None` selects the default ordering.
    pub fn sort(
        &mut self,
        opaque: Option<DrawableComparator>,
        transparent: Option<DrawableComparator>,
    ) {
        let opaque = opaque.unwrap_or(painter_sort_stable);
        let transparent = transparent.unwrap_or(reverse_painter_sort_stable);

        if self.opaque.len() > 1 {
            self.opaque.sort_by(opaque);
        }
        if self.transmissive.len() > 1 {
            self.transmissive.sort_by(transparent);
        }
        if self.transparent.len() > 1 {
            self.transparent.sort_by(transparent);
        }
    }

    /// Rebuilds the list for `camera`.
    ///
    /// World matrices must already be up to date; nothing in the scene is
    /// modified.
    pub fn build(&mut self, scene: &Scene, camera: &Camera, assets: &Assets) {
        self.clear();

        let mut stack = std::mem::take(&mut self.stack);
        stack.clear();
        stack.extend(scene.root_nodes().iter().rev().map(|&h| (h, 0)));

        while let Some((handle, inherited_group_order)) = stack.pop() {
            let Some(node) = scene.get_node(handle) else {
                continue;
            };
            if !node.visible {
                continue;
            }

            let group_order = node.group_order.unwrap_or(inherited_group_order);

            if node.layers.test(camera.layers) {
                if scene.light(handle).is_some() {
                    self.lights.push(handle);
                }
                if scene.mesh(handle).is_some() {
                    self.project_mesh(scene, handle, camera, assets, group_order);
                }
            }

            stack.extend(node.children.iter().rev().map(|&c| (c, group_order)));
        }

        self.stack = stack;
    }

    fn project_mesh(
        &mut self,
        scene: &Scene,
        handle: NodeHandle,
        camera: &Camera,
        assets: &Assets,
        group_order: i32,
    ) {
        let (Some(node), Some(mesh)) = (scene.get_node(handle), scene.mesh(handle)) else {
            return;
        };
        let Some(geometry) = assets.geometry(mesh.geometry) else {
            self.missing.push(MissingAsset {
                node: handle,
                what: "geometry",
            });
            return;
        };

        let world = *node.world_matrix();
        let sphere = geometry.bounding_sphere();

        if node.frustum_culled
            && let Some(bs) = sphere
        {
            let world_sphere = bs.transform(&world);
            if !camera
                .frustum()
                .intersects_sphere(world_sphere.center, world_sphere.radius)
            {
                return;
            }
        }

        let anchor = sphere.map_or(Vec3::from(world.translation), |bs| {
            world.transform_point3(bs.center)
        });
        let z = -camera.view_matrix().transform_point3(anchor).z;

        let base = Drawable {
            id: 0,
            node: handle,
            geometry: mesh.geometry,
            material: mesh.material(),
            material_id: 0,
            group: None,
            world_matrix: world,
            z,
            render_order: node.render_order,
            group_order,
            instance_count: mesh.instance_count,
        };

        if mesh.is_multi_material() {
            for group in geometry.groups() {
                let Some(&material) = mesh.materials.get(group.material_index) else {
                    continue;
                };
                self.push_material(assets, material, Drawable {
                    group: Some(*group),
                    ..base
                });
            }
        } else {
            self.push_material(assets, base.material, base);
        }
    }

    fn push_material(&mut self, assets: &Assets, material: MaterialHandle, drawable: Drawable) {
        let Some(mat) = assets.material(material) else {
            self.missing.push(MissingAsset {
                node: drawable.node,
                what: "material",
            });
            return;
        };
        if !mat.settings().visible {
            return;
        }
        self.push(mat.transparency_class(), Drawable {
            material,
            material_id: material_id(material),
            ..drawable
        });
    }
}

/// Slot index of a material handle; stable for the material's lifetime.
#[inline]
#[must_use]
pub fn material_id(handle: MaterialHandle) -> u32 {
    (handle.data().as_ffi() & 0xFFFF_FFFF) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn drawable(id: u32, material_id: u32, z: f32) -> Drawable {
        Drawable {
            id,
            node: NodeHandle::default(),
            geometry: GeometryHandle::default(),
            material: MaterialHandle::from(KeyData::from_ffi(u64::from(material_id))),
            material_id,
            group: None,
            world_matrix: Affine3A::IDENTITY,
            z,
            render_order: 0,
            group_order: 0,
            instance_count: 1,
        }
    }

    #[test]
    fn opaque_groups_by_material_before_depth() {
        let mut list = vec![drawable(0, 2, 1.0), drawable(1, 1, 9.0), drawable(2, 1, 3.0)];
        list.sort_by(painter_sort_stable);
        let ids: Vec<u32> = list.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 1, 0]);
    }

    #[test]
    fn transparent_is_back_to_front_with_id_ties() {
        let mut list = vec![drawable(0, 1, 2.0), drawable(1, 1, 5.0), drawable(2, 1, 2.0)];
        list.sort_by(reverse_painter_sort_stable);
        let ids: Vec<u32> = list.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 0, 2]);
    }

    #[test]
    fn render_order_dominates() {
        let mut near = drawable(0, 1, 1.0);
        near.render_order = -1;
        let far = drawable(1, 1, 10.0);
        let mut list = vec![far, near];
        list.sort_by(reverse_painter_sort_stable);
        assert_eq!(list[0].id, 0);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut list = RenderList::new();
        for i in 0..32 {
            list.push(TransparencyClass::Opaque, drawable(0, i, 0.0));
        }
        let cap = list.opaque.capacity();
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.opaque.capacity(), cap);
        list.push(TransparencyClass::Transparent, drawable(0, 0, 0.0));
        assert_eq!(list.transparent()[0].id, 0);
    }
}
