//! Geometry provider.
//!
//! The renderer treats a [`Geometry`] as vertex data with identity and a
//! version. It reads the attribute set (to derive program features), the
//! groups and draw range (to emit drawables), and the bounding volumes (to cull
//! and depth-sort). Bounding volumes are computed lazily and dropped on every
//! mutation.

use std::cell::OnceCell;

use bitflags::bitflags;
use glam::{Affine3A, Vec3};
use rustc_hash::FxHashMap;

use crate::resources::version_tracker::ChangeTracker;

/// Well-known attribute channel names.
pub mod attribute_names {
    pub const POSITION: &str = "position";
    pub const NORMAL: &str = "normal";
    pub const UV: &str = "uv";
    pub const UV1: &str = "uv1";
    pub const COLOR: &str = "color";
    pub const TANGENT: &str = "tangent";
}

bitflags! {
    /// Attribute channels present on a geometry that change generated code.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct GeometryFeatures: u32 {
        const HAS_NORMAL        = 1 << 0;
        const HAS_UV            = 1 << 1;
        const HAS_UV1           = 1 << 2;
        const HAS_VERTEX_COLOR  = 1 << 3;
        const HAS_VERTEX_ALPHA  = 1 << 4;
        const HAS_TANGENT       = 1 << 5;
    }
}

// ============================================================================
// Bounding volumes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[must_use]
    pub fn transform(&self, matrix: &Affine3A) -> Self {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];

        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for point in corners {
            let p = matrix.transform_point3(point);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    /// Transforms the sphere into the space of `matrix`.
    ///
    /// The radius is scaled by the largest axis scale, so the result always
    /// encloses the transformed geometry.
    #[must_use]
    pub fn transform(&self, matrix: &Affine3A) -> Self {
        let center = matrix.transform_point3(self.center);
        let max_scale = matrix
            .matrix3
            .x_axis
            .length_squared()
            .max(matrix.matrix3.y_axis.length_squared())
            .max(matrix.matrix3.z_axis.length_squared())
            .sqrt();
        Self {
            center,
            radius: self.radius * max_scale,
        }
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// A single vertex attribute channel stored as flat `f32` components.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub data: Vec<f32>,
    /// Components per vertex (1..=4)
    pub item_size: u32,
    pub normalized: bool,
}

impl Attribute {
    #[must_use]
    pub fn new(data: Vec<f32>, item_size: u32) -> Self {
        Self {
            data,
            item_size: item_size.max(1),
            normalized: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn count(&self) -> u32 {
        (self.data.len() / self.item_size as usize) as u32
    }
}

/// A contiguous index (or vertex) range rendered with one material of the
/// owning mesh's material array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryGroup {
    pub start: u32,
    pub count: u32,
    pub material_index: usize,
}

/// Sub-range of the geometry to draw. `count == None` draws to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawRange {
    pub start: u32,
    pub count: Option<u32>,
}

// ============================================================================
// Geometry
// ============================================================================

/// An attribute plus the data version it was last written at.
#[derive(Debug)]
struct Channel {
    attribute: Attribute,
    version: u64,
}

#[derive(Debug, Default)]
pub struct Geometry {
    pub name: String,

    attributes: FxHashMap<String, Channel>,
    index: Option<Vec<u32>>,
    index_version: u64,
    groups: Vec<GeometryGroup>,
    draw_range: DrawRange,

    /// Bumped on any vertex or index data change
    tracker: ChangeTracker,
    /// Bumped when the attribute set changes (program features)
    layout_tracker: ChangeTracker,
    /// Bumped when groups or the draw range change
    range_tracker: ChangeTracker,

    bounding_box: OnceCell<Option<BoundingBox>>,
    bounding_sphere: OnceCell<Option<BoundingSphere>>,
}

impl Geometry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor from a flat `xyz` position array.
    #[must_use]
    pub fn with_positions(positions: Vec<f32>) -> Self {
        let mut geometry = Self::new();
        geometry.set_attribute(attribute_names::POSITION, Attribute::new(positions, 3));
        geometry
    }

    // ---- Attributes --------------------------------------------------------

    pub fn set_attribute(&mut self, name: &str, attribute: Attribute) {
        let version = self.mark_changed();
        let channel = Channel { attribute, version };
        if self.attributes.insert(name.to_string(), channel).is_none() {
            self.layout_tracker.changed();
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        let removed = self.attributes.remove(name)?;
        self.layout_tracker.changed();
        self.mark_changed();
        Some(removed.attribute)
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name).map(|c| &c.attribute)
    }

    /// Data version at which the channel was last written.
    #[must_use]
    pub fn attribute_version(&self, name: &str) -> Option<u64> {
        self.attributes.get(name).map(|c| c.version)
    }

    /// Mutates an attribute in place; bumps the version and drops cached
    /// bounds.
    pub fn update_attribute(&mut self, name: &str, update: impl FnOnce(&mut Attribute)) -> bool {
        if !self.attributes.contains_key(name) {
            return false;
        }
        let version = self.mark_changed();
        if let Some(channel) = self.attributes.get_mut(name) {
            update(&mut channel.attribute);
            channel.version = version;
        }
        true
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(k, c)| (k.as_str(), &c.attribute))
    }

    // ---- Index / groups / range -------------------------------------------

    pub fn set_index(&mut self, indices: Vec<u32>) {
        if self.index.is_none() {
            self.layout_tracker.changed();
        }
        self.index = Some(indices);
        self.index_version = self.mark_changed();
    }

    #[must_use]
    pub fn index(&self) -> Option<&[u32]> {
        self.index.as_deref()
    }

    /// Data version at which the index was last written.
    #[must_use]
    pub fn index_version(&self) -> u64 {
        self.index_version
    }

    pub fn add_group(&mut self, start: u32, count: u32, material_index: usize) {
        self.groups.push(GeometryGroup {
            start,
            count,
            material_index,
        });
        self.range_tracker.changed();
    }

    pub fn clear_groups(&mut self) {
        self.groups.clear();
        self.range_tracker.changed();
    }

    #[must_use]
    pub fn groups(&self) -> &[GeometryGroup] {
        &self.groups
    }

    pub fn set_draw_range(&mut self, start: u32, count: Option<u32>) {
        self.draw_range = DrawRange { start, count };
        self.range_tracker.changed();
    }

    #[must_use]
    pub fn draw_range(&self) -> DrawRange {
        self.draw_range
    }

    /// Number of vertices in the position channel.
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.attribute(attribute_names::POSITION)
            .map_or(0, Attribute::count)
    }

    /// Number of elements a full draw consumes (indices when indexed).
    #[must_use]
    pub fn element_count(&self) -> u32 {
        self.index
            .as_ref()
            .map_or_else(|| self.vertex_count(), |i| i.len() as u32)
    }

    // ---- Versions ----------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }

    #[inline]
    #[must_use]
    pub fn layout_version(&self) -> u64 {
        self.layout_tracker.version()
    }

    /// Version of the groups and draw range. Never moves [`version`](Self::version).
    #[inline]
    #[must_use]
    pub fn range_version(&self) -> u64 {
        self.range_tracker.version()
    }

    #[must_use]
    pub fn features(&self) -> GeometryFeatures {
        let mut features = GeometryFeatures::empty();
        if self.attributes.contains_key(attribute_names::NORMAL) {
            features |= GeometryFeatures::HAS_NORMAL;
        }
        if self.attributes.contains_key(attribute_names::UV) {
            features |= GeometryFeatures::HAS_UV;
        }
        if self.attributes.contains_key(attribute_names::UV1) {
            features |= GeometryFeatures::HAS_UV1;
        }
        if let Some(color) = self.attribute(attribute_names::COLOR) {
            features |= GeometryFeatures::HAS_VERTEX_COLOR;
            if color.item_size == 4 {
                features |= GeometryFeatures::HAS_VERTEX_ALPHA;
            }
        }
        if self.attributes.contains_key(attribute_names::TANGENT) {
            features |= GeometryFeatures::HAS_TANGENT;
        }
        features
    }

    // ---- Bounds ------------------------------------------------------------

    /// Axis-aligned bounds of the position channel, computed on first use.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        *self.bounding_box.get_or_init(|| {
            let position = self.attribute(attribute_names::POSITION)?;
            if position.item_size < 3 || position.count() == 0 {
                return None;
            }
            let mut min = Vec3::splat(f32::INFINITY);
            let mut max = Vec3::splat(f32::NEG_INFINITY);
            for v in position.data.chunks_exact(position.item_size as usize) {
                let p = Vec3::new(v[0], v[1], v[2]);
                min = min.min(p);
                max = max.max(p);
            }
            Some(BoundingBox { min, max })
        })
    }

    /// Bounding sphere centered on the box center, computed on first use.
    pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
        *self.bounding_sphere.get_or_init(|| {
            let bbox = self.bounding_box()?;
            let position = self.attribute(attribute_names::POSITION)?;
            let center = bbox.center();
            let max_dist_sq = position
                .data
                .chunks_exact(position.item_size as usize)
                .map(|v| Vec3::new(v[0], v[1], v[2]).distance_squared(center))
                .fold(0.0_f32, f32::max);
            Some(BoundingSphere {
                center,
                radius: max_dist_sq.sqrt(),
            })
        })
    }

    /// Bumps the data version, drops cached bounds and returns the new version.
    fn mark_changed(&mut self) -> u64 {
        self.tracker.changed();
        self.bounding_box.take();
        self.bounding_sphere.take();
        self.tracker.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_invalidated_by_mutation() {
        let mut geometry = Geometry::with_positions(vec![-1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let sphere = geometry.bounding_sphere().unwrap();
        assert!((sphere.radius - 1.0).abs() < 1e-6);

        geometry.update_attribute(attribute_names::POSITION, |attr| {
            attr.data = vec![-2.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        });
        let sphere = geometry.bounding_sphere().unwrap();
        assert!((sphere.radius - 2.0).abs() < 1e-6);
    }

    #[test]
    fn layout_version_tracks_attribute_set_only() {
        let mut geometry = Geometry::with_positions(vec![0.0; 9]);
        let layout = geometry.layout_version();
        let version = geometry.version();

        geometry.update_attribute(attribute_names::POSITION, |attr| attr.data[0] = 1.0);
        assert_eq!(geometry.layout_version(), layout);
        assert!(geometry.version() > version);

        geometry.set_attribute(attribute_names::UV, Attribute::new(vec![0.0; 6], 2));
        assert!(geometry.layout_version() > layout);
        assert!(geometry.features().contains(GeometryFeatures::HAS_UV));
    }

    #[test]
    fn channels_carry_their_own_versions() {
        let mut geometry = Geometry::with_positions(vec![0.0; 9]);
        geometry.set_attribute(attribute_names::NORMAL, Attribute::new(vec![0.0; 9], 3));
        let position = geometry.attribute_version(attribute_names::POSITION);
        let normal = geometry.attribute_version(attribute_names::NORMAL);

        geometry.update_attribute(attribute_names::NORMAL, |attr| attr.data[0] = 1.0);
        assert_eq!(geometry.attribute_version(attribute_names::POSITION), position);
        assert!(geometry.attribute_version(attribute_names::NORMAL) > normal);
        assert_eq!(geometry.attribute_version(attribute_names::UV), None);
    }

    #[test]
    fn draw_range_and_groups_are_not_data_changes() {
        let mut geometry = Geometry::with_positions(vec![0.0; 18]);
        let (version, range) = (geometry.version(), geometry.range_version());

        geometry.set_draw_range(0, Some(3));
        geometry.add_group(0, 3, 0);
        geometry.clear_groups();

        assert_eq!(geometry.version(), version);
        assert_eq!(geometry.range_version(), range + 3);
    }

    #[test]
    fn sphere_transform_scales_radius() {
        let sphere = BoundingSphere {
            center: Vec3::ZERO,
            radius: 1.0,
        };
        let m = Affine3A::from_scale_rotation_translation(
            Vec3::new(1.0, 3.0, 2.0),
            glam::Quat::IDENTITY,
            Vec3::new(0.0, 0.0, -5.0),
        );
        let world = sphere.transform(&m);
        assert_eq!(world.center, Vec3::new(0.0, 0.0, -5.0));
        assert!((world.radius - 3.0).abs() < 1e-6);
    }
}
