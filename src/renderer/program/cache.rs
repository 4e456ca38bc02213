//! Program Cache
//!
//! Owns every compiled program. Lookups run in three tiers:
//!
//! 1. **L1** [`FastProgramKey`] → handle: handles and versions only, checked
//!    every draw. Nothing is derived on a hit. One slot per
//!    `(material, geometry, side, instancing, output)`; a version bump
//!    overwrites the slot instead of adding an entry.
//! 2. **L2** [`ProgramKey`] → handle: the structured key, built on an L1 miss.
//! 3. **Source** xxh3-128 of the generated source → handle: distinct keys that
//!    render identical source share one device program.
//!
//! # Reference counting
//!
//! A program's reference count is the number of `(material, key)` bindings
//! that resolved to it. A material's bindings are released together when its
//! structural fingerprint changes or when it is disposed. A program whose
//! count drops to zero is destroyed immediately under
//! [`EvictionPolicy::Immediate`], or after `idle_frames` unused frames under
//! [`EvictionPolicy::KeepWarm`] (see [`ProgramCache::trim`]). Destroying a
//! program also purges every L1/L2 entry pointing at it, so a disposed
//! material can never resolve to a destroyed program.
//!
//! # Failures
//!
//! A failed compile is memoized per `(material, key)`; the same pair is not
//! compiled again until the material's fingerprint changes.

use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_128;

use crate::assets::{GeometryHandle, MaterialHandle};
use crate::errors::{PrismError, Result};
use crate::renderer::device::{GpuDevice, ProgramId};
use crate::renderer::program::key::{FastProgramKey, OutputTarget, ProgramKey};
use crate::renderer::program::shader_gen::{ProgramSource, ShaderGenerator};
use crate::renderer::settings::EvictionPolicy;
use crate::renderer::state::StateTracker;
use crate::renderer::uniforms::UniformCache;
use crate::resources::material::{MaterialFeatures, ShadingModel, Side};

new_key_type! {
    /// Handle of a cached program.
    pub struct ProgramHandle;
}

/// Structural identity of a material, independent of scene state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialFingerprint {
    pub model: ShadingModel,
    pub features: MaterialFeatures,
    pub defines_hash: u64,
}

/// One acquire call.
#[derive(Debug, Clone, Copy)]
pub struct ProgramRequest<'a> {
    pub material: MaterialHandle,
    pub fingerprint: MaterialFingerprint,
    pub key: &'a ProgramKey,
    pub custom_defines: &'a [(String, String)],
}

#[derive(Debug)]
struct ProgramEntry {
    key: ProgramKey,
    source_hash: u128,
    program: ProgramId,
    ref_count: u32,
    last_used: u64,
    uniforms: UniformCache,
}

#[derive(Debug)]
struct MaterialBinding {
    fingerprint: MaterialFingerprint,
    programs: SmallVec<[(ProgramKey, ProgramHandle); 2]>,
    failed: SmallVec<[ProgramKey; 1]>,
}

type FastSlot = (MaterialHandle, GeometryHandle, Side, bool, OutputTarget);

#[inline]
fn fast_slot(key: &FastProgramKey) -> FastSlot {
    (key.material, key.geometry, key.side, key.instanced, key.output)
}

/// Counters for [`ProgramCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramCacheStats {
    pub programs: usize,
    pub compiles: u64,
    pub failures: u64,
    pub source_dedupes: u64,
    pub destroyed: u64,
}

#[derive(Debug)]
pub struct ProgramCache {
    entries: SlotMap<ProgramHandle, ProgramEntry>,
    by_key: FxHashMap<ProgramKey, ProgramHandle>,
    by_source: FxHashMap<u128, ProgramHandle>,
    fast: FxHashMap<FastSlot, (FastProgramKey, ProgramHandle)>,
    bindings: FxHashMap<MaterialHandle, MaterialBinding>,
    policy: EvictionPolicy,
    frame: u64,
    destroyed: Vec<ProgramId>,
    stats: ProgramCacheStats,
}

impl ProgramCache {
    #[must_use]
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            entries: SlotMap::with_key(),
            by_key: FxHashMap::default(),
            by_source: FxHashMap::default(),
            fast: FxHashMap::default(),
            bindings: FxHashMap::default(),
            policy,
            frame: 0,
            destroyed: Vec::new(),
            stats: ProgramCacheStats::default(),
        }
    }

    pub fn set_policy(&mut self, policy: EvictionPolicy) {
        self.policy = policy;
    }

    /// Advances the frame stamp used for idle tracking.
    pub fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    // ── L1 ───────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn get_fast(&self, key: &FastProgramKey) -> Option<ProgramHandle> {
        match self.fast.get(&fast_slot(key)) {
            Some((stored, handle)) if stored == key => Some(*handle),
            _ => None,
        }
    }

    pub fn insert_fast(&mut self, key: FastProgramKey, handle: ProgramHandle) {
        self.fast.insert(fast_slot(&key), (key, handle));
    }

    /// Drops L1 slots of a disposed geometry.
    pub fn forget_geometry(&mut self, geometry: GeometryHandle) {
        self.fast.retain(|slot, _| slot.1 != geometry);
    }

    // ── Acquire / release ────────────────────────────────────────────────────

    /// Whether this `(material, key)` pair already failed to compile.
    #[must_use]
    pub fn has_failed(&self, material: MaterialHandle, key: &ProgramKey) -> bool {
        self.bindings
            .get(&material)
            .is_some_and(|b| b.failed.contains(key))
    }

    /// Resolves the program for one material and key, compiling on a miss.
    ///
    /// The reference count grows once per new `(material, key)` binding.
    /// A compile error is returned once and memoized; see
    /// [`has_failed`](Self::has_failed).
    pub fn acquire<D: GpuDevice>(
        &mut self,
        tracker: &mut StateTracker<D>,
        request: &ProgramRequest<'_>,
    ) -> Result<ProgramHandle> {
        self.sync_fingerprint(tracker, request.material, request.fingerprint);

        let binding = self
            .bindings
            .entry(request.material)
            .or_insert_with(|| MaterialBinding {
                fingerprint: request.fingerprint,
                programs: SmallVec::new(),
                failed: SmallVec::new(),
            });

        if let Some(&(_, handle)) = binding.programs.iter().find(|(k, _)| k == request.key) {
            if let Some(entry) = self.entries.get_mut(handle) {
                entry.last_used = self.frame;
            }
            return Ok(handle);
        }

        let handle = match self.by_key.get(request.key) {
            Some(&handle) => handle,
            None => self.compile(tracker, request)?,
        };

        if let Some(entry) = self.entries.get_mut(handle) {
            entry.ref_count += 1;
            entry.last_used = self.frame;
        }
        if let Some(binding) = self.bindings.get_mut(&request.material) {
            binding.programs.push((*request.key, handle));
        }
        Ok(handle)
    }

    fn compile<D: GpuDevice>(
        &mut self,
        tracker: &mut StateTracker<D>,
        request: &ProgramRequest<'_>,
    ) -> Result<ProgramHandle> {
        let key = request.key;
        let key_hash = key.hash_u64();
        let ProgramSource { vertex, fragment } =
            match ShaderGenerator::generate(key, request.custom_defines) {
                Ok(source) => source,
                Err(err) => {
                    self.record_failure(request.material, key);
                    log::error!("program '{}' ({key_hash:016x}): {err}", key.model.name());
                    return Err(err);
                }
            };

        let source_hash = {
            let mut bytes = Vec::with_capacity(vertex.len() + fragment.len() + 1);
            bytes.extend_from_slice(vertex.as_bytes());
            bytes.push(0);
            bytes.extend_from_slice(fragment.as_bytes());
            xxh3_128(&bytes)
        };

        if let Some(&handle) = self.by_source.get(&source_hash)
            && self.entries.contains_key(handle)
        {
            log::debug!(
                "program '{}' ({key_hash:016x}) shares source with an existing program",
                key.model.name()
            );
            self.by_key.insert(*key, handle);
            self.stats.source_dedupes += 1;
            return Ok(handle);
        }

        log::debug!("compiling program '{}' ({key_hash:016x})", key.model.name());
        self.stats.compiles += 1;

        let program = match tracker.device_mut().create_program(&vertex, &fragment) {
            Ok(program) => program,
            Err(log) => {
                log::error!(
                    "program '{}' ({key_hash:016x}) failed to compile: {log}",
                    key.model.name()
                );
                self.record_failure(request.material, key);
                return Err(PrismError::ProgramCompile {
                    model: key.model.name(),
                    key_hash,
                    log,
                });
            }
        };

        let handle = self.entries.insert(ProgramEntry {
            key: *key,
            source_hash,
            program,
            ref_count: 0,
            last_used: self.frame,
            uniforms: UniformCache::new(program),
        });
        self.by_key.insert(*key, handle);
        self.by_source.insert(source_hash, handle);
        Ok(handle)
    }

    fn record_failure(&mut self, material: MaterialHandle, key: &ProgramKey) {
        self.stats.failures += 1;
        if let Some(binding) = self.bindings.get_mut(&material) {
            binding.failed.push(*key);
        }
    }

    /// Drops one reference. At zero the program is destroyed or kept warm
    /// according to the eviction policy.
    pub fn release<D: GpuDevice>(&mut self, tracker: &mut StateTracker<D>, handle: ProgramHandle) {
        let Some(entry) = self.entries.get_mut(handle) else {
            return;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        entry.last_used = self.frame;
        if entry.ref_count == 0 && self.policy == EvictionPolicy::Immediate {
            self.destroy(tracker, handle);
        }
    }

    /// Releases every binding of a material and forgets its failures.
    pub fn release_material<D: GpuDevice>(
        &mut self,
        tracker: &mut StateTracker<D>,
        material: MaterialHandle,
    ) {
        self.fast.retain(|slot, _| slot.0 != material);
        if let Some(binding) = self.bindings.remove(&material) {
            for (_, handle) in binding.programs {
                self.release(tracker, handle);
            }
        }
    }

    /// Destroys zero-reference programs idle for more than `idle_frames`.
    /// Returns how many were destroyed.
    pub fn trim<D: GpuDevice>(&mut self, tracker: &mut StateTracker<D>) -> usize {
        let idle_frames = self.policy.idle_frames();
        let frame = self.frame;
        let stale: SmallVec<[ProgramHandle; 8]> = self
            .entries
            .iter()
            .filter(|(_, e)| e.ref_count == 0 && frame.saturating_sub(e.last_used) > idle_frames)
            .map(|(h, _)| h)
            .collect();
        for &handle in &stale {
            self.destroy(tracker, handle);
        }
        stale.len()
    }

    /// Destroys every program regardless of references.
    pub fn clear<D: GpuDevice>(&mut self, tracker: &mut StateTracker<D>) {
        let all: Vec<ProgramHandle> = self.entries.keys().collect();
        for handle in all {
            self.destroy(tracker, handle);
        }
        self.bindings.clear();
    }

    fn destroy<D: GpuDevice>(&mut self, tracker: &mut StateTracker<D>, handle: ProgramHandle) {
        let Some(entry) = self.entries.remove(handle) else {
            return;
        };
        log::debug!(
            "destroying program '{}' ({:016x})",
            entry.key.model.name(),
            entry.key.hash_u64()
        );
        self.by_key.retain(|_, h| *h != handle);
        self.by_source.remove(&entry.source_hash);
        self.fast.retain(|_, (_, h)| *h != handle);
        for binding in self.bindings.values_mut() {
            binding.programs.retain(|(_, h)| *h != handle);
        }
        tracker.forget_program(entry.program);
        tracker.device_mut().delete_program(entry.program);
        self.destroyed.push(entry.program);
        self.stats.destroyed += 1;
    }

    /// Releases stale bindings when a material's structure changed.
    fn sync_fingerprint<D: GpuDevice>(
        &mut self,
        tracker: &mut StateTracker<D>,
        material: MaterialHandle,
        fingerprint: MaterialFingerprint,
    ) {
        let stale = match self.bindings.get_mut(&material) {
            Some(binding) if binding.fingerprint != fingerprint => {
                binding.fingerprint = fingerprint;
                binding.failed.clear();
                std::mem::take(&mut binding.programs)
            }
            _ => return,
        };
        for (_, handle) in stale {
            self.release(tracker, handle);
        }
    }

    /// Device programs destroyed since the last call; per-program state
    /// held elsewhere (vertex arrays) must be dropped for them.
    pub fn drain_destroyed(&mut self) -> std::vec::Drain<'_, ProgramId> {
        self.destroyed.drain(..)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    #[must_use]
    pub fn program_id(&self, handle: ProgramHandle) -> Option<ProgramId> {
        self.entries.get(handle).map(|e| e.program)
    }

    #[must_use]
    pub fn key(&self, handle: ProgramHandle) -> Option<&ProgramKey> {
        self.entries.get(handle).map(|e| &e.key)
    }

    #[must_use]
    pub fn ref_count(&self, handle: ProgramHandle) -> Option<u32> {
        self.entries.get(handle).map(|e| e.ref_count)
    }

    /// Forgets the last uploaded uniform values of every program.
    pub fn invalidate_uniforms(&mut self) {
        for entry in self.entries.values_mut() {
            entry.uniforms.invalidate_values();
        }
    }

    /// Per-program uniform cache.
    pub fn uniforms_mut(&mut self, handle: ProgramHandle) -> Option<&mut UniformCache> {
        self.entries.get_mut(handle).map(|e| &mut e.uniforms)
    }

    /// Whether the device finished compiling the program.
    #[must_use]
    pub fn is_ready<D: GpuDevice>(&self, device: &D, handle: ProgramHandle) -> bool {
        self.entries
            .get(handle)
            .is_some_and(|e| device.program_ready(e.program))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> ProgramCacheStats {
        ProgramCacheStats {
            programs: self.entries.len(),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::clipping::ClippingCounts;
    use crate::renderer::headless::HeadlessDevice;
    use crate::renderer::lights::LightCounts;
    use crate::renderer::program::key::{FogKind, OutputTarget, SceneInputs};
    use crate::resources::geometry::GeometryFeatures;
    use crate::resources::material::Side;
    use slotmap::KeyData;

    fn material(n: u64) -> MaterialHandle {
        MaterialHandle::from(KeyData::from_ffi(n))
    }

    fn fingerprint(features: MaterialFeatures) -> MaterialFingerprint {
        MaterialFingerprint {
            model: ShadingModel::Lambert,
            features,
            defines_hash: 0,
        }
    }

    fn key(features: MaterialFeatures, directional: u32) -> ProgramKey {
        ProgramKey::new(
            ShadingModel::Lambert,
            features,
            Side::Front,
            GeometryFeatures::HAS_NORMAL,
            ClippingCounts::default(),
            &SceneInputs {
                lights: LightCounts {
                    directional,
                    ..LightCounts::default()
                },
                shadow_map: None,
                fog: FogKind::None,
                output: OutputTarget::LINEAR,
            },
            false,
            0,
        )
    }

    fn acquire(
        cache: &mut ProgramCache,
        tracker: &mut StateTracker<HeadlessDevice>,
        mat: MaterialHandle,
        features: MaterialFeatures,
        k: &ProgramKey,
    ) -> Result<ProgramHandle> {
        cache.acquire(tracker, &ProgramRequest {
            material: mat,
            fingerprint: fingerprint(features),
            key: k,
            custom_defines: &[],
        })
    }

    #[test]
    fn same_key_compiles_once() {
        let mut tracker = StateTracker::new(HeadlessDevice::new());
        let mut cache = ProgramCache::new(EvictionPolicy::Immediate);
        let k = key(MaterialFeatures::empty(), 1);

        let a = acquire(&mut cache, &mut tracker, material(1), MaterialFeatures::empty(), &k).unwrap();
        let b = acquire(&mut cache, &mut tracker, material(1), MaterialFeatures::empty(), &k).unwrap();
        let c = acquire(&mut cache, &mut tracker, material(2), MaterialFeatures::empty(), &k).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(tracker.device().compile_count(), 1);
        assert_eq!(cache.ref_count(a), Some(2));
    }

    #[test]
    fn fingerprint_change_releases_old_program() {
        let mut tracker = StateTracker::new(HeadlessDevice::new());
        let mut cache = ProgramCache::new(EvictionPolicy::Immediate);
        let plain = key(MaterialFeatures::empty(), 0);
        let mapped_features = MaterialFeatures::USE_MAP;
        let mapped = key(mapped_features, 0);

        let a = acquire(&mut cache, &mut tracker, material(1), MaterialFeatures::empty(), &plain).unwrap();
        let b = acquire(&mut cache, &mut tracker, material(1), mapped_features, &mapped).unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.program_id(a), None);
        assert_eq!(tracker.device().live_programs(), 1);
    }

    #[test]
    fn keep_warm_survives_until_trim() {
        let mut tracker = StateTracker::new(HeadlessDevice::new());
        let mut cache = ProgramCache::new(EvictionPolicy::KeepWarm { idle_frames: 2 });
        let k = key(MaterialFeatures::empty(), 0);
        let a = acquire(&mut cache, &mut tracker, material(1), MaterialFeatures::empty(), &k).unwrap();

        cache.release_material(&mut tracker, material(1));
        assert_eq!(cache.ref_count(a), Some(0));

        cache.begin_frame(2);
        assert_eq!(cache.trim(&mut tracker), 0);
        cache.begin_frame(3);
        assert_eq!(cache.trim(&mut tracker), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn failures_are_memoized() {
        let mut device = HeadlessDevice::new();
        device.fail_compiles_containing("directionalLights");
        let mut tracker = StateTracker::new(device);
        let mut cache = ProgramCache::new(EvictionPolicy::Immediate);
        let k = key(MaterialFeatures::empty(), 1);

        let err = acquire(&mut cache, &mut tracker, material(1), MaterialFeatures::empty(), &k);
        assert!(matches!(err, Err(PrismError::ProgramCompile { .. })));
        assert!(cache.has_failed(material(1), &k));

        // A structural change clears the memo.
        let _ = acquire(&mut cache, &mut tracker, material(1), MaterialFeatures::USE_MAP, &key(MaterialFeatures::USE_MAP, 0));
        assert!(!cache.has_failed(material(1), &k));
    }
}
