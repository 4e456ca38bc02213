#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! A retained-mode 3D scene renderer.
//!
//! Build a [`Scene`] of [`Node`]s, register geometries, materials and
//! textures in [`Assets`], and hand both to a [`Renderer`] every frame. The
//! renderer talks to the GPU through the [`GpuDevice`] trait; the bundled
//! [`HeadlessDevice`] records calls instead of drawing and is what the tests
//! run against.
//!
//! ```rust,ignore
//! use prism::{Assets, Camera, Geometry, HeadlessDevice, Material, Mesh, Renderer, Scene};
//!
//! let mut scene = Scene::new();
//! let mut assets = Assets::new();
//! let geometry = assets.add_geometry(Geometry::with_positions(vec![0.0; 9]));
//! let material = assets.add_material(Material::basic(glam::Vec3::X));
//! scene
//!     .build_node("mesh")
//!     .with_position(0.0, 0.0, -5.0)
//!     .with_mesh(Mesh::new(geometry, material))
//!     .build()?;
//! let camera = scene
//!     .build_node("camera")
//!     .with_camera(Camera::new_perspective(60.0, 1.0, 0.1, 100.0))
//!     .build()?;
//!
//! let mut renderer = Renderer::new(HeadlessDevice::new(), Default::default());
//! let info = renderer.render_frame(&mut scene, camera, &mut assets)?;
//! assert_eq!(info.draw_calls, 1);
//! ```

pub mod assets;
pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;

pub use assets::{Assets, GeometryHandle, MaterialHandle, TextureHandle};
pub use errors::{PrismError, Result};
pub use renderer::{
    Diagnostic, FrameInfo, GpuDevice, HeadlessDevice, RenderTarget, Renderer, RendererSettings,
};
pub use resources::{ColorSpace, Geometry, Material, Mesh, Side, Texture};
pub use scene::{Camera, Fog, Light, Node, NodeHandle, Scene};
