//! Asset storage.
//!
//! Geometries, materials and textures are owned here and referenced from
//! scene components by typed slotmap handles. The render core only ever
//! reads them during a frame, apart from recording program errors on
//! materials.

pub mod storage;

use slotmap::new_key_type;

use crate::resources::geometry::Geometry;
use crate::resources::material::Material;
use crate::resources::texture::Texture;

pub use storage::AssetStorage;

// Strongly-typed handles
new_key_type! {
    pub struct GeometryHandle;
    pub struct MaterialHandle;
    pub struct TextureHandle;
}

#[derive(Default)]
pub struct Assets {
    pub geometries: AssetStorage<GeometryHandle, Geometry>,
    pub materials: AssetStorage<MaterialHandle, Material>,
    pub textures: AssetStorage<TextureHandle, Texture>,
}

impl Assets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryHandle {
        self.geometries.add(geometry)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialHandle {
        self.materials.add(material)
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureHandle {
        self.textures.add(texture)
    }

    #[inline]
    #[must_use]
    pub fn geometry(&self, handle: GeometryHandle) -> Option<&Geometry> {
        self.geometries.get(handle)
    }

    #[inline]
    #[must_use]
    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle)
    }

    #[inline]
    #[must_use]
    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle)
    }

    pub fn material_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.materials.get_mut(handle)
    }

    pub fn geometry_mut(&mut self, handle: GeometryHandle) -> Option<&mut Geometry> {
        self.geometries.get_mut(handle)
    }

    pub fn texture_mut(&mut self, handle: TextureHandle) -> Option<&mut Texture> {
        self.textures.get_mut(handle)
    }
}
