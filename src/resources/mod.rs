//! Core resource definitions, independent of any GPU implementation:
//! - Mesh: scene component binding geometry to materials
//! - Material: shading model, settings and uniforms
//! - Texture: decoded texel data and sampling
//! - Geometry: vertex attributes, index, groups and bounds
//! - Uniforms: uniform values uploaded per draw

pub mod geometry;
pub mod material;
pub mod mesh;
pub mod texture;
pub mod uniforms;
pub mod version_tracker;

pub use geometry::{
    Attribute, BoundingBox, BoundingSphere, DrawRange, Geometry, GeometryFeatures, GeometryGroup,
};
pub use material::{
    Blending, CustomBlend, Material, MaterialFeatures, MaterialMaps, MaterialSettings,
    MaterialUniforms, PolygonOffset, ShadingModel, Side, StencilSettings, TransparencyClass,
};
pub use mesh::Mesh;
pub use texture::{ColorSpace, Texture, TextureSampler, TextureTransform};
pub use uniforms::UniformValue;
pub use version_tracker::{ChangeTracker, MutGuard};
