//! Uniform Upload Layer
//!
//! One [`UniformCache`] per program. Each slot remembers the resolved
//! location (or that the program has none) and the last uploaded value; an
//! upload that matches the cached value component-wise is skipped. A uniform
//! the program does not declare is a silent no-op.

use rustc_hash::FxHashMap;

use crate::renderer::device::{GpuDevice, ProgramId, UniformLocation};
use crate::renderer::state::StateTracker;
use crate::resources::uniforms::UniformValue;

#[derive(Debug)]
struct UniformSlot {
    location: Option<UniformLocation>,
    value: Option<UniformValue>,
}

/// Per-program uniform value cache.
#[derive(Debug)]
pub struct UniformCache {
    program: ProgramId,
    slots: FxHashMap<&'static str, UniformSlot>,
    uploads: u64,
    skipped: u64,
}

impl UniformCache {
    #[must_use]
    pub fn new(program: ProgramId) -> Self {
        Self {
            program,
            slots: FxHashMap::default(),
            uploads: 0,
            skipped: 0,
        }
    }

    #[must_use]
    pub fn program(&self) -> ProgramId {
        self.program
    }

    /// Uploads `value` unless it equals the cached one. The program must be
    /// bound. Returns whether a device call was issued.
    pub fn set<D: GpuDevice>(
        &mut self,
        tracker: &mut StateTracker<D>,
        name: &'static str,
        value: &UniformValue,
    ) -> bool {
        debug_assert_eq!(tracker.bound_program(), Some(self.program));

        let program = self.program;
        let slot = self.slots.entry(name).or_insert_with(|| UniformSlot {
            location: tracker.device().uniform_location(program, name),
            value: None,
        });

        let Some(location) = slot.location else {
            return false;
        };

        if slot.value.as_ref() == Some(value) {
            self.skipped += 1;
            return false;
        }

        tracker.upload_uniform(location, value);
        match &mut slot.value {
            Some(cached) => cached.assign(value),
            None => slot.value = Some(value.clone()),
        }
        self.uploads += 1;
        true
    }

    /// Uploads every pair in order.
    pub fn set_all<D: GpuDevice>(
        &mut self,
        tracker: &mut StateTracker<D>,
        values: &[(&'static str, UniformValue)],
    ) {
        for (name, value) in values {
            self.set(tracker, name, value);
        }
    }

    /// Whether the program declares `name`; resolves and caches the location.
    pub fn has<D: GpuDevice>(&mut self, tracker: &StateTracker<D>, name: &'static str) -> bool {
        let program = self.program;
        self.slots
            .entry(name)
            .or_insert_with(|| UniformSlot {
                location: tracker.device().uniform_location(program, name),
                value: None,
            })
            .location
            .is_some()
    }

    /// Forgets cached values (locations are kept).
    pub fn invalidate_values(&mut self) {
        for slot in self.slots.values_mut() {
            slot.value = None;
        }
    }

    /// `(uploads, skipped)` since creation.
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (self.uploads, self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::{DeviceCall, HeadlessDevice};
    use glam::{Mat4, Vec3};

    fn setup() -> (StateTracker<HeadlessDevice>, UniformCache) {
        let mut tracker = StateTracker::new(HeadlessDevice::new());
        let program = tracker
            .device_mut()
            .create_program("uniform mat4 modelMatrix;", "uniform vec3 diffuse;")
            .expect("compiles");
        tracker.use_program(Some(program));
        tracker.device_mut().clear_calls();
        (tracker, UniformCache::new(program))
    }

    #[test]
    fn skips_identical_values() {
        let (mut tracker, mut cache) = setup();
        let m = UniformValue::Mat4(Mat4::from_translation(Vec3::X));
        assert!(cache.set(&mut tracker, "modelMatrix", &m));
        assert!(!cache.set(
            &mut tracker,
            "modelMatrix",
            &UniformValue::Mat4(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)))
        ));
        assert_eq!(tracker.device().calls().len(), 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn missing_uniform_is_silent() {
        let (mut tracker, mut cache) = setup();
        assert!(!cache.set(&mut tracker, "opacity", &UniformValue::Float(0.5)));
        assert!(tracker.device().calls().is_empty());
        assert!(!cache.has(&tracker, "opacity"));
        assert!(cache.has(&tracker, "diffuse"));
    }

    #[test]
    fn changed_value_uploads_again() {
        let (mut tracker, mut cache) = setup();
        cache.set(&mut tracker, "diffuse", &Vec3::ONE.into());
        cache.set(&mut tracker, "diffuse", &Vec3::X.into());
        assert_eq!(
            tracker
                .device()
                .count(|c| matches!(c, DeviceCall::SetUniform { .. })),
            2
        );
    }
}
