//! Small least-recently-used caches for computed transforms.
//!
//! Fitting a spectral IDT or searching the DNG calibration blend is far
//! more expensive than everything else `configure()` does, and batches
//! usually contain many shots from the same camera under the same light.

use spectral::SpectralData;

use crate::{transform::Transform, Matrix3};

pub const DEFAULT_CAPACITY: usize = 10;

/// Most recently used entries are kept at the front.
#[derive(Debug, Clone)]
pub struct TransformCache<K, V> {
    entries: Vec<(K, V)>,
    capacity: usize,
    pub disabled: bool,
}

impl<K: PartialEq, V: Clone> TransformCache<K, V> {
    pub fn new(capacity: usize) -> TransformCache<K, V> {
        TransformCache {
            entries: Vec::with_capacity(capacity),
            capacity,
            disabled: false,
        }
    }

    /// Returns the cached value for `key`, or computes, stores and returns
    /// it.  `None` results are not cached.
    pub fn fetch<F>(&mut self, key: K, compute: F) -> Option<V>
    where
        F: FnOnce() -> Option<V>,
    {
        if self.disabled || self.capacity == 0 {
            return compute();
        }

        if let Some(i) = self.entries.iter().position(|(k, _)| *k == key) {
            let entry = self.entries.remove(i);
            let value = entry.1.clone();
            self.entries.insert(0, entry);
            return Some(value);
        }

        let value = compute()?;
        self.entries.insert(0, (key, value.clone()));
        self.entries.truncate(self.capacity);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Inputs that determine a spectral IDT.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralKey {
    pub make: String,
    pub model: String,
    pub illuminant: SpectralData,
}

/// Inputs that determine illuminant-based white balance.
#[derive(Debug, Clone, PartialEq)]
pub struct IlluminantKey {
    pub make: String,
    pub model: String,
    pub illuminant: String,
}

/// All the caches of one converter.
#[derive(Debug, Clone)]
pub struct Caches {
    pub illuminant_wb: TransformCache<IlluminantKey, [f64; 4]>,
    pub spectral_idt: TransformCache<SpectralKey, Matrix3>,
    pub metadata_idt: TransformCache<idt::dng::Profile, Transform>,
}

impl Caches {
    pub fn new() -> Caches {
        Caches {
            illuminant_wb: TransformCache::new(DEFAULT_CAPACITY),
            spectral_idt: TransformCache::new(DEFAULT_CAPACITY),
            metadata_idt: TransformCache::new(DEFAULT_CAPACITY),
        }
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.illuminant_wb.disabled = disabled;
        self.spectral_idt.disabled = disabled;
        self.metadata_idt.disabled = disabled;
    }
}

impl Default for Caches {
    fn default() -> Caches {
        Caches::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_skips_compute() {
        let mut cache = TransformCache::new(3);
        assert_eq!(cache.fetch(1, || Some("one")), Some("one"));
        assert_eq!(cache.fetch(1, || panic!("recomputed")), Some("one"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_least_recent() {
        let mut cache = TransformCache::new(2);
        cache.fetch(1, || Some(10));
        cache.fetch(2, || Some(20));
        cache.fetch(1, || Some(0)); // touch 1
        cache.fetch(3, || Some(30)); // evicts 2
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.fetch(1, || Some(0)), Some(10));
        assert_eq!(cache.fetch(2, || Some(21)), Some(21));
    }

    #[test]
    fn failures_not_cached() {
        let mut cache: TransformCache<u32, u32> = TransformCache::new(2);
        assert_eq!(cache.fetch(1, || None), None);
        assert!(cache.is_empty());
        assert_eq!(cache.fetch(1, || Some(5)), Some(5));
    }

    #[test]
    fn disabled_always_computes() {
        let mut caches = Caches::new();
        caches.set_disabled(true);
        let key = IlluminantKey {
            make: "Acme".into(),
            model: "X".into(),
            illuminant: "d55".into(),
        };
        caches.illuminant_wb.fetch(key.clone(), || Some([1.0; 4]));
        assert!(caches.illuminant_wb.is_empty());
        assert_eq!(
            caches.illuminant_wb.fetch(key, || Some([2.0; 4])),
            Some([2.0; 4])
        );
    }
}
