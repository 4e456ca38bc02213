use slotmap::{Key, SlotMap};

/// Typed container for one asset kind.
///
/// Single-threaded: the renderer reads it during a frame and the host
/// mutates it between frames.
pub struct AssetStorage<H: Key, T> {
    map: SlotMap<H, T>,
}

impl<H: Key, T> Default for AssetStorage<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Key, T> AssetStorage<H, T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: SlotMap::with_key(),
        }
    }

    pub fn add(&mut self, asset: impl Into<T>) -> H {
        self.map.insert(asset.into())
    }

    #[inline]
    #[must_use]
    pub fn get(&self, handle: H) -> Option<&T> {
        self.map.get(handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.map.get_mut(handle)
    }

    /// Removes the asset. GPU-side copies are released by the renderer's
    /// `dispose_*` calls.
    pub fn remove(&mut self, handle: H) -> Option<T> {
        self.map.remove(handle)
    }

    #[must_use]
    pub fn contains(&self, handle: H) -> bool {
        self.map.contains_key(handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.map.iter()
    }
}
