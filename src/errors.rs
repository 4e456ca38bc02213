//! Error Types
//!
//! This module defines the error types used throughout the engine core.
//!
//! # Overview
//!
//! The main error type [`PrismError`] covers the failure modes of the core:
//! - Structural errors in the scene graph (self-parenting, cycles)
//! - Frame-level misconfiguration (degenerate camera, missing camera)
//! - Program generation and compilation failures
//! - Capability limits reported by the device
//!
//! Structural errors are returned synchronously by the call that would have
//! introduced them and leave the tree unchanged. Per-material failures are
//! isolated: they are returned from the program cache, recorded on the
//! material and forwarded to the renderer's diagnostic channel, while the rest
//! of the frame keeps rendering.
//!
//! # Usage
//!
//! ```rust,ignore
//! use prism::errors::{PrismError, Result};
//!
//! fn build() -> Result<()> {
//!     scene.attach(child, parent)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::assets::{GeometryHandle, MaterialHandle};
use crate::scene::NodeHandle;

/// The main error type for the Prism renderer core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrismError {
    // ========================================================================
    // Scene Graph Errors
    // ========================================================================
    /// A node was attached to itself.
    #[error("Cannot attach node {0:?} to itself")]
    SelfParenting(NodeHandle),

    /// The attachment would make a node one of its own ancestors.
    #[error("Attaching {child:?} under {parent:?} would create a cycle")]
    HierarchyCycle {
        /// Node being attached
        child: NodeHandle,
        /// Requested parent, which is a descendant of `child`
        parent: NodeHandle,
    },

    /// The node handle does not refer to a live node.
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeHandle),

    // ========================================================================
    // Frame Errors
    // ========================================================================
    /// The camera has a zero (or inverted) near/far range.
    #[error("Degenerate camera: near = {near}, far = {far}")]
    DegenerateCamera {
        /// Near clipping distance
        near: f32,
        /// Far clipping distance
        far: f32,
    },

    /// The node passed as camera carries no camera component.
    #[error("Node {0:?} has no camera component")]
    CameraNotFound(NodeHandle),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// The material handle does not refer to a live material.
    #[error("Material not found: {0:?}")]
    MaterialNotFound(MaterialHandle),

    /// The geometry handle does not refer to a live geometry.
    #[error("Geometry not found: {0:?}")]
    GeometryNotFound(GeometryHandle),

    // ========================================================================
    // Program Errors
    // ========================================================================
    /// Program source failed to compile or link on the device.
    #[error("Program compile failed for {model} (key {key_hash:#018x}): {log}")]
    ProgramCompile {
        /// Shading model name of the failing program
        model: &'static str,
        /// Hash of the structured program key
        key_hash: u64,
        /// Driver info log
        log: String,
    },

    /// Program source could not be generated from the templates.
    #[error("Shader template error: {0}")]
    ShaderTemplate(String),

    // ========================================================================
    // Capability Errors
    // ========================================================================
    /// A device limit was exceeded.
    #[error("Capability limit exceeded: {resource} (requested {requested}, supported {supported})")]
    CapabilityLimit {
        /// The limited resource
        resource: &'static str,
        /// Requested amount
        requested: u32,
        /// Amount the device supports
        supported: u32,
    },
}

impl From<minijinja::Error> for PrismError {
    fn from(err: minijinja::Error) -> Self {
        PrismError::ShaderTemplate(err.to_string())
    }
}

/// Alias for `Result<T, PrismError>`.
pub type Result<T> = std::result::Result<T, PrismError>;
