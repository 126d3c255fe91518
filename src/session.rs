//! Viewer session.
//!
//! A [`ViewerSession`] is the one owner of all per-page state: the capability
//! signature, resolved quality profiles, the material cache and the scroll
//! animation. Viewport events are queued with [`ViewerSession::on_scroll`] and
//! [`ViewerSession::on_resize`] and applied once per [`ViewerSession::frame`].
//!
//! ```text
//! probe ─► signature ─► resolver ─► profiles ─► material cache ─┐
//!                                                                ├─► FrameOutput
//! scroll/resize ─► coalescer ─► scroll mapper ─► animator ───────┘
//! ```

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::animator::{build_keyframes, responsive_factors, AnimationState, KeyframeAnimator, Pose, ResponsiveFactors};
use crate::capability::{CapabilitySignature, SignatureBuilder};
use crate::config::ViewerConfig;
use crate::material::{MaterialFactory, MaterialParams, MaterialVariant};
use crate::material_cache::{CacheStats, MaterialAssignmentCache};
use crate::probe::{sample_signature, CapabilityProbe};
use crate::quality::{QualityProfile, QualityResolver};
use crate::scene::{load_parts, Part, PartId, SceneAssetProvider};
use crate::scheduler::{FrameCoalescer, ViewportEvent};
use crate::scroll::{ScrollDirection, ScrollState, ScrollStateMapper};

/// Material assignment for one part in a frame.
#[derive(Debug, Clone, Serialize)]
pub struct PartMaterial {
    pub part_id: PartId,
    pub profile: QualityProfile,
    pub material: Arc<MaterialParams>,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameOutput {
    pub pose: Pose,
    pub scroll: ScrollState,
    pub direction: ScrollDirection,
    pub signature: CapabilitySignature,
    pub materials: Vec<PartMaterial>,
}

/// Owns all per-page viewer state for one scene.
pub struct ViewerSession<F: MaterialFactory> {
    section_count: usize,
    builder: SignatureBuilder,
    resolver: QualityResolver,
    signature: CapabilitySignature,
    parts: Vec<Part>,
    profiles: Vec<QualityProfile>,
    cache: MaterialAssignmentCache<F>,
    mapper: ScrollStateMapper,
    animator: KeyframeAnimator,
    coalescer: FrameCoalescer,
    config: ViewerConfig,
    factors: ResponsiveFactors,
    width: u32,
    height: u32,
    offset: i64,
    torn_down: bool,
}

impl<F: MaterialFactory> ViewerSession<F> {
    /// Probe capabilities, read the scene and resolve initial profiles.
    ///
    /// Only an invalid config is an error. A failed probe degrades to the
    /// lowest signature and a failed scene read yields a session with no
    /// parts. The viewport height is unknown (0) until the first resize.
    pub fn new(
        config: ViewerConfig,
        probe: &dyn CapabilityProbe,
        scene: &dyn SceneAssetProvider,
        factory: F,
    ) -> Result<Self> {
        config.validate()?;
        let resolver = config.quality.resolver()?;
        let builder = SignatureBuilder::new(config.tier_breakpoints);

        let (signature, signal) = sample_signature(probe, &builder);
        let width = signal.map(|s| s.width).unwrap_or(0);

        let parts = load_parts(scene).unwrap_or_else(|e| {
            log::warn!("Scene unavailable, continuing without parts: {:#}", e);
            Vec::new()
        });

        let factors = responsive_factors(width, &config.animation.responsive);
        let animator = KeyframeAnimator::new(
            build_keyframes(&config.animation.keyframes, factors),
            config.animation.smoothing,
            config.animation.snap_epsilon,
        );

        let mut session = Self {
            section_count: config.section_count(),
            builder,
            resolver,
            signature,
            profiles: Vec::new(),
            parts,
            cache: MaterialAssignmentCache::new(factory),
            mapper: ScrollStateMapper::new(),
            animator,
            coalescer: FrameCoalescer::new(),
            config,
            factors,
            width,
            height: 0,
            offset: 0,
            torn_down: false,
        };
        session.resolve_profiles();
        log::info!(
            "Session ready: {} parts, {} sections, tier {} / score {}",
            session.parts.len(),
            session.section_count,
            signature.device_tier.get(),
            signature.gpu_score.get()
        );
        Ok(session)
    }

    fn resolve_profiles(&mut self) {
        let sig = self.signature;
        self.profiles = self
            .parts
            .iter()
            .map(|p| self.resolver.resolve(sig.device_tier, sig.gpu_score, p.class, p.size_class))
            .collect();
    }

    /// Queue a scroll offset; only the latest one per frame is applied.
    pub fn on_scroll(&mut self, offset: i64) {
        if !self.torn_down {
            self.coalescer.push(ViewportEvent::Scroll { offset });
        }
    }

    /// Queue a viewport resize. Applied at the next frame.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        if !self.torn_down {
            self.coalescer.push(ViewportEvent::Resize { width, height });
        }
    }

    fn apply_resize(&mut self, width: u32, height: u32) {
        self.height = height;
        self.width = width;

        let resized = self.builder.resized(&self.signature, width);
        if resized.device_tier != self.signature.device_tier {
            log::info!(
                "Device tier {} -> {} at width {}",
                self.signature.device_tier.get(),
                resized.device_tier.get(),
                width
            );
            self.signature = resized;
            self.resolve_profiles();
        }

        let factors = responsive_factors(width, &self.config.animation.responsive);
        if factors != self.factors {
            log::debug!("Responsive factors {:?} -> {:?}", self.factors, factors);
            self.factors = factors;
            self.animator
                .set_keyframes(build_keyframes(&self.config.animation.keyframes, factors));
        }
    }

    /// Apply pending events, advance the animation one step and assign
    /// materials. Returns `None` after teardown.
    pub fn frame(&mut self) -> Option<FrameOutput> {
        if self.torn_down {
            return None;
        }

        if let Some(work) = self.coalescer.take() {
            if let Some((width, height)) = work.resize {
                self.apply_resize(width, height);
            }
            if let Some(offset) = work.scroll {
                self.offset = offset;
            }
            let scroll = self
                .mapper
                .map(self.offset, self.height as i64, self.section_count);
            log::debug!("Scroll {} -> {:?}", self.offset, scroll);
            self.animator.set_sample(scroll);
        }

        let pose = self.animator.tick();

        let materials = self
            .parts
            .iter()
            .zip(self.profiles.iter())
            .map(|(part, profile)| PartMaterial {
                part_id: part.id.clone(),
                profile: *profile,
                material: self.cache.get(&part.id, profile),
            })
            .collect();

        Some(FrameOutput {
            pose,
            scroll: self.mapper.state(),
            direction: self.mapper.direction(),
            signature: self.signature,
            materials,
        })
    }

    /// Select a material variant for its part class. Takes effect next frame.
    pub fn set_variant(&mut self, variant: MaterialVariant) -> bool {
        self.cache.set_variant(variant)
    }

    /// Cancel pending work and release all materials. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if self.coalescer.cancel() {
            log::debug!("Cancelled pending viewport work");
        }
        let released = self.cache.release_all();
        log::info!("Session torn down ({} materials released)", released);
    }

    /// Whether [`teardown`](Self::teardown) has run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Current capability signature. The tier follows resizes.
    pub fn signature(&self) -> CapabilitySignature {
        self.signature
    }

    /// Parts that made it through scene loading.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Resolved quality profile for a part, if the part exists.
    pub fn profile(&self, part: &PartId) -> Option<&QualityProfile> {
        self.parts
            .iter()
            .position(|p| &p.id == part)
            .map(|i| &self.profiles[i])
    }

    /// Current animation target and rendered pose.
    pub fn animation(&self) -> &AnimationState {
        self.animator.state()
    }

    /// Number of scroll sections, one per keyframe.
    pub fn section_count(&self) -> usize {
        self.section_count
    }

    /// Last applied viewport as `(width, height)`.
    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether events are queued for the next frame.
    pub fn has_pending_work(&self) -> bool {
        self.coalescer.is_pending()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn factory(&self) -> &F {
        self.cache.factory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::RawProbeSignal;
    use crate::material::ParamsOnlyFactory;
    use crate::probe::StaticProbe;
    use crate::scene::demo_ring;

    fn session(width: u32, renderer: &str) -> ViewerSession<ParamsOnlyFactory> {
        let probe = StaticProbe::new(RawProbeSignal {
            width,
            renderer: Some(renderer.to_string()),
            ..Default::default()
        });
        ViewerSession::new(ViewerConfig::default(), &probe, &demo_ring(), ParamsOnlyFactory::new()).unwrap()
    }

    #[test]
    fn test_scroll_before_resize_keeps_state() {
        let mut s = session(1920, "NVIDIA GeForce RTX 4080");
        s.on_scroll(500);
        let out = s.frame().unwrap();
        assert_eq!(out.scroll, ScrollState::default());
    }

    #[test]
    fn test_events_coalesce_per_frame() {
        let mut s = session(1920, "NVIDIA GeForce RTX 4080");
        s.on_resize(1920, 1000);
        for offset in [100, 900, 2500] {
            s.on_scroll(offset);
        }
        let out = s.frame().unwrap();
        assert_eq!(out.scroll.section_index, 2);
        assert!(!s.has_pending_work());
    }

    #[test]
    fn test_tier_change_rebuilds_materials() {
        let mut s = session(1920, "NVIDIA GeForce RTX 4080");
        let diamond = PartId::from("center_diamond");
        s.on_resize(1920, 1000);
        let before = s.frame().unwrap();
        let samples_before = s.profile(&diamond).unwrap().samples;

        s.on_resize(800, 1000);
        let after = s.frame().unwrap();
        assert_eq!(after.signature.device_tier.get(), 4);
        assert!(s.profile(&diamond).unwrap().samples < samples_before);

        let idx = before.materials.iter().position(|m| m.part_id == diamond).unwrap();
        assert!(!Arc::ptr_eq(&before.materials[idx].material, &after.materials[idx].material));
        assert_eq!(s.factory().live_count(), s.parts().len());
    }

    #[test]
    fn test_pose_only_frames_hit_cache() {
        let mut s = session(1440, "Apple M1");
        s.on_resize(1440, 900);
        s.frame();
        let misses = s.cache_stats().misses;
        s.on_scroll(1800);
        for _ in 0..5 {
            s.frame();
        }
        assert_eq!(s.cache_stats().misses, misses);
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut s = session(1920, "NVIDIA GeForce RTX 4080");
        s.frame();
        assert_eq!(s.factory().live_count(), 5);
        s.on_scroll(10);
        s.teardown();
        s.teardown();
        assert_eq!(s.factory().live_count(), 0);
        assert!(s.frame().is_none());
        assert!(!s.has_pending_work());
    }

    #[test]
    fn test_invalid_config_is_error() {
        let mut config = ViewerConfig::default();
        config.animation.keyframes.clear();
        let result = ViewerSession::new(
            config,
            &StaticProbe::default(),
            &demo_ring(),
            ParamsOnlyFactory::new(),
        );
        assert!(result.is_err());
    }
}
