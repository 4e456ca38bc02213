//! Scene graph.
//!
//! - Node: hierarchy entry with a transform and per-node render flags
//! - Transform: TRS, cached matrices and dirty state
//! - Scene: node storage, components and hierarchy operations
//! - Camera, Light, Fog: components attached to nodes
//! - transform_system: the world matrix update, decoupled from `Scene`

pub mod camera;
pub mod light;
pub mod node;
pub mod scene;
pub mod transform;
pub mod transform_system;

pub use camera::{Camera, DepthOrigin, Frustum, Projection};
pub use light::{Fog, Light, LightKind, ShadowConfig};
pub use node::{Layers, Node};
pub use scene::{NodeBuilder, Scene, SceneEvent};
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeHandle;
}
