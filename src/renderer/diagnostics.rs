//! Non-fatal renderer diagnostics.
//!
//! Per-item failures (a material that does not compile, a light or texture
//! past the device limits) never abort a frame. They are sent down an
//! unbounded `flume` channel; hosts drain [`Renderer::diagnostics`] whenever
//! they like. Nothing is sent for a condition that has not changed since the
//! previous report, so the channel does not fill up while a broken material
//! stays on screen or a camera stays degenerate.
//!
//! [`Renderer::diagnostics`]: crate::renderer::Renderer::diagnostics

use std::fmt;

use crate::assets::MaterialHandle;
use crate::scene::NodeHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A program failed on the device; the material is skipped until its
    /// fingerprint changes.
    ProgramCompile {
        material: MaterialHandle,
        model: &'static str,
        key_hash: u64,
        log: String,
    },
    /// A device limit was exceeded and a feature was dropped.
    CapabilityLimit {
        resource: &'static str,
        requested: u32,
        supported: u32,
    },
    /// The whole frame was skipped.
    FrameSkipped { camera: NodeHandle, reason: String },
    /// A drawable referenced an asset that no longer exists.
    MissingAsset { node: NodeHandle, what: &'static str },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramCompile {
                material,
                model,
                key_hash,
                log,
            } => write!(
                f,
                "program '{model}' ({key_hash:016x}) failed for {material:?}: {log}"
            ),
            Self::CapabilityLimit {
                resource,
                requested,
                supported,
            } => write!(f, "{resource}: {requested} requested, {supported} supported"),
            Self::FrameSkipped { camera, reason } => {
                write!(f, "frame skipped for camera {camera:?}: {reason}")
            }
            Self::MissingAsset { node, what } => write!(f, "{node:?} references a missing {what}"),
        }
    }
}

/// Sending half plus the conditions already reported.
#[derive(Debug)]
pub(crate) struct DiagnosticSink {
    sender: flume::Sender<Diagnostic>,
    receiver: flume::Receiver<Diagnostic>,
    reported_limits: Vec<(&'static str, u32)>,
    skipping_cameras: Vec<NodeHandle>,
}

impl DiagnosticSink {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver,
            reported_limits: Vec::new(),
            skipping_cameras: Vec::new(),
        }
    }

    pub(crate) fn receiver(&self) -> flume::Receiver<Diagnostic> {
        self.receiver.clone()
    }

    pub(crate) fn emit(&self, diagnostic: Diagnostic) {
        // The sink holds a receiver itself, so sending cannot fail.
        let _ = self.sender.send(diagnostic);
    }

    /// Reports a capability limit once per distinct `(resource, requested)`.
    pub(crate) fn limit(&mut self, resource: &'static str, requested: u32, supported: u32) {
        let entry = (resource, requested);
        if self.reported_limits.contains(&entry) {
            return;
        }
        self.reported_limits.retain(|(r, _)| *r != resource);
        self.reported_limits.push(entry);
        log::warn!("{resource}: {requested} requested, only {supported} supported; extra dropped");
        self.emit(Diagnostic::CapabilityLimit {
            resource,
            requested,
            supported,
        });
    }

    /// Reports a skipped frame once until `camera` renders again.
    pub(crate) fn frame_skipped(&mut self, camera: NodeHandle, reason: String) {
        if self.skipping_cameras.contains(&camera) {
            return;
        }
        self.skipping_cameras.push(camera);
        log::warn!("skipping frames for camera {camera:?}: {reason}");
        self.emit(Diagnostic::FrameSkipped { camera, reason });
    }

    /// Re-arms the skipped-frame report for `camera`.
    pub(crate) fn frame_rendered(&mut self, camera: NodeHandle) {
        self.skipping_cameras.retain(|c| *c != camera);
    }

    /// Forgets limits that were not exceeded this frame.
    pub(crate) fn retain_limits(&mut self, active: &[&'static str]) {
        self.reported_limits.retain(|(r, _)| active.contains(r));
    }
}
