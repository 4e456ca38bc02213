use smallvec::{SmallVec, smallvec};

use crate::assets::{GeometryHandle, MaterialHandle};

/// Mesh component: one geometry drawn with one or more materials.
///
/// With several materials, each geometry group selects its material by
/// `material_index`; groups pointing past the end are skipped.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: GeometryHandle,
    pub materials: SmallVec<[MaterialHandle; 1]>,
    /// Instanced draw count; 1 draws a single instance.
    pub instance_count: u32,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl Mesh {
    #[must_use]
    pub fn new(geometry: GeometryHandle, material: MaterialHandle) -> Self {
        Self {
            geometry,
            materials: smallvec![material],
            instance_count: 1,
            cast_shadow: false,
            receive_shadow: false,
        }
    }

    /// A mesh whose geometry groups index into `materials`.
    #[must_use]
    pub fn with_materials(geometry: GeometryHandle, materials: &[MaterialHandle]) -> Self {
        Self {
            materials: SmallVec::from_slice(materials),
            ..Self::new(geometry, materials.first().copied().unwrap_or_default())
        }
    }

    #[must_use]
    pub fn with_instances(mut self, count: u32) -> Self {
        self.instance_count = count;
        self
    }

    #[inline]
    #[must_use]
    pub fn material(&self) -> MaterialHandle {
        self.materials.first().copied().unwrap_or_default()
    }

    #[inline]
    #[must_use]
    pub fn is_multi_material(&self) -> bool {
        self.materials.len() > 1
    }
}
