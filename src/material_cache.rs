//! Per-part material assignment cache.
//!
//! The cache is the sole owner of built materials. An entry is keyed by the
//! part, the identity of its quality profile, and the variant selected for the
//! part's class; a change to either of the latter rebuilds the entry and
//! releases the old resource. Poses never reach this module, so animation
//! cannot invalidate it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::material::{MaterialFactory, MaterialParams, MaterialVariant};
use crate::quality::{PartClass, ProfileKey, QualityProfile};
use crate::scene::PartId;

/// Running counters, mostly for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
    pub releases: u64,
}

struct Entry {
    key: ProfileKey,
    variant: MaterialVariant,
    material: Arc<MaterialParams>,
}

pub struct MaterialAssignmentCache<F: MaterialFactory> {
    factory: F,
    entries: HashMap<PartId, Entry>,
    variants: HashMap<PartClass, MaterialVariant>,
    stats: CacheStats,
}

impl<F: MaterialFactory> MaterialAssignmentCache<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            entries: HashMap::new(),
            variants: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Material for `part` at `profile`, building it on a miss.
    ///
    /// Repeated calls with an equal profile return the same `Arc`. If the
    /// factory fails, a minimal default (with no handle) is stored for this
    /// part only and returned.
    pub fn get(&mut self, part: &PartId, profile: &QualityProfile) -> Arc<MaterialParams> {
        let key = profile.key();
        let variant = self.variant_for(profile.part_class);

        if let Some(entry) = self.entries.get(part) {
            if entry.key == key && entry.variant == variant {
                self.stats.hits += 1;
                return Arc::clone(&entry.material);
            }
        }

        self.stats.misses += 1;
        if let Some(old) = self.entries.remove(part) {
            log::debug!("Rebuilding material for '{}'", part);
            self.release_entry(&old);
        }

        let mut params = MaterialParams::compose(variant, profile);
        match self.factory.create(part, &params) {
            Ok(handle) => params.handle = Some(handle),
            Err(e) => {
                self.stats.failures += 1;
                log::warn!("Material for '{}' failed, using default: {:#}", part, e);
                params = MaterialParams::minimal_default(profile.part_class);
            }
        }

        let material = Arc::new(params);
        self.entries.insert(
            part.clone(),
            Entry {
                key,
                variant,
                material: Arc::clone(&material),
            },
        );
        material
    }

    /// Currently cached material for a part, without building.
    pub fn cached(&self, part: &PartId) -> Option<Arc<MaterialParams>> {
        self.entries.get(part).map(|e| Arc::clone(&e.material))
    }

    /// Select the variant for every part of `variant.class()`.
    ///
    /// Returns whether the selection changed. Affected entries rebuild on
    /// their next `get`.
    pub fn set_variant(&mut self, variant: MaterialVariant) -> bool {
        let class = variant.class();
        let previous = self.variant_for(class);
        self.variants.insert(class, variant);
        if previous != variant {
            log::info!("{:?} variant: {} -> {}", class, previous, variant);
        }
        previous != variant
    }

    pub fn variant_for(&self, class: PartClass) -> MaterialVariant {
        self.variants
            .get(&class)
            .copied()
            .unwrap_or_else(|| MaterialVariant::default_for(class))
    }

    /// Release every cached resource and empty the cache.
    pub fn release_all(&mut self) -> usize {
        let entries: Vec<Entry> = self.entries.drain().map(|(_, e)| e).collect();
        for entry in &entries {
            self.release_entry(entry);
        }
        if !entries.is_empty() {
            log::info!("Released {} materials", entries.len());
        }
        entries.len()
    }

    fn release_entry(&mut self, entry: &Entry) {
        if let Some(handle) = entry.material.handle {
            self.factory.release(handle);
            self.stats.releases += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: MaterialFactory> Drop for MaterialAssignmentCache<F> {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::warn!("Material cache dropped with {} live entries", self.entries.len());
            self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{DeviceTier, GpuScore};
    use crate::material::{MaterialHandle, ParamsOnlyFactory};
    use crate::quality::{QualityResolver, SizeClass};
    use anyhow::{bail, Result};

    fn profile(tier: u8, score: u8, class: PartClass) -> QualityProfile {
        QualityResolver::default().resolve(
            DeviceTier::clamped(tier as i64),
            GpuScore::clamped(score as i64),
            class,
            SizeClass::Main,
        )
    }

    /// Fails for parts whose id starts with "bad".
    #[derive(Default)]
    struct PickyFactory {
        inner: ParamsOnlyFactory,
    }

    impl MaterialFactory for PickyFactory {
        fn create(&mut self, part: &PartId, params: &MaterialParams) -> Result<MaterialHandle> {
            if part.as_str().starts_with("bad") {
                bail!("out of memory");
            }
            self.inner.create(part, params)
        }

        fn release(&mut self, handle: MaterialHandle) {
            self.inner.release(handle)
        }
    }

    #[test]
    fn test_same_key_returns_same_material() {
        let mut cache = MaterialAssignmentCache::new(ParamsOnlyFactory::new());
        let part = PartId::from("center_diamond");
        let p = profile(2, 4, PartClass::Stone);

        let a = cache.get(&part, &p);
        let b = cache.get(&part, &p);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.factory().created_count(), 1);
    }

    #[test]
    fn test_quality_change_rebuilds_and_releases() {
        let mut cache = MaterialAssignmentCache::new(ParamsOnlyFactory::new());
        let part = PartId::from("center_diamond");

        let a = cache.get(&part, &profile(2, 4, PartClass::Stone));
        let b = cache.get(&part, &profile(1, 4, PartClass::Stone));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.samples, b.samples);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.factory().live_count(), 1);
        assert_eq!(cache.stats().releases, 1);
    }

    #[test]
    fn test_variant_change_rebuilds() {
        let mut cache = MaterialAssignmentCache::new(ParamsOnlyFactory::new());
        let part = PartId::from("band");
        let p = profile(1, 5, PartClass::Metal);

        let gold = cache.get(&part, &p);
        assert!(!cache.set_variant(MaterialVariant::Gold));
        assert!(cache.set_variant(MaterialVariant::Platinum));
        let platinum = cache.get(&part, &p);
        assert!(!Arc::ptr_eq(&gold, &platinum));
        assert_eq!(platinum.variant, MaterialVariant::Platinum);

        // Stone variants leave metal parts alone.
        cache.set_variant(MaterialVariant::Ruby);
        assert!(Arc::ptr_eq(&platinum, &cache.get(&part, &p)));
    }

    #[test]
    fn test_failure_is_isolated() {
        let mut cache = MaterialAssignmentCache::new(PickyFactory::default());
        let p = profile(1, 5, PartClass::Stone);

        let bad = cache.get(&PartId::from("bad_stone"), &p);
        let good = cache.get(&PartId::from("good_stone"), &p);
        assert!(bad.is_default_substitute());
        assert!(!good.is_default_substitute());
        assert_eq!(cache.stats().failures, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_release_all() {
        let mut cache = MaterialAssignmentCache::new(ParamsOnlyFactory::new());
        for name in ["a", "b", "c"] {
            cache.get(&PartId::from(name), &profile(3, 3, PartClass::Metal));
        }
        assert_eq!(cache.factory().live_count(), 3);
        assert_eq!(cache.release_all(), 3);
        assert!(cache.is_empty());
        assert_eq!(cache.factory().live_count(), 0);
    }
}
