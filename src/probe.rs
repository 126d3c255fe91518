//! Capability probes.
//!
//! A probe samples raw device signals once at startup. Probes are fallible;
//! [`sample_signature`] turns a failed probe into the lowest-capability
//! signature instead of propagating the error.

use anyhow::Result;

use crate::capability::{CapabilitySignature, RawProbeSignal, SignatureBuilder};

/// Source of raw device/GPU signals.
pub trait CapabilityProbe {
    fn probe(&self) -> Result<RawProbeSignal>;
}

/// Probe returning a fixed signal (CLI flags, tests, replay).
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    signal: RawProbeSignal,
}

impl StaticProbe {
    pub fn new(signal: RawProbeSignal) -> Self {
        Self { signal }
    }
}

impl CapabilityProbe for StaticProbe {
    fn probe(&self) -> Result<RawProbeSignal> {
        Ok(self.signal.clone())
    }
}

/// Probe that reads renderer name and texture limits from a wgpu adapter.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct AdapterProbe {
    width: u32,
    renderer: String,
    max_texture_size: u32,
}

#[cfg(not(target_arch = "wasm32"))]
impl AdapterProbe {
    pub fn new(adapter: &wgpu::Adapter, width: u32) -> Self {
        let info = adapter.get_info();
        let limits = adapter.limits();
        log::info!("Adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        Self {
            width,
            renderer: info.name,
            max_texture_size: limits.max_texture_dimension_2d,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl CapabilityProbe for AdapterProbe {
    fn probe(&self) -> Result<RawProbeSignal> {
        Ok(RawProbeSignal {
            width: self.width,
            renderer: Some(self.renderer.clone()),
            max_texture_size: Some(self.max_texture_size),
            is_mobile_ua: false,
            user_agent: None,
        })
    }
}

/// Sample a probe once and classify it.
///
/// Returns the signature together with the sampled signal (if any) so callers
/// can reuse the width. A failed probe degrades to
/// [`CapabilitySignature::lowest`].
pub fn sample_signature(
    probe: &dyn CapabilityProbe,
    builder: &SignatureBuilder,
) -> (CapabilitySignature, Option<RawProbeSignal>) {
    match probe.probe() {
        Ok(signal) => (builder.build(&signal), Some(signal)),
        Err(e) => {
            log::warn!("Capability probe failed, assuming lowest capability: {:#}", e);
            (CapabilitySignature::lowest(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{DeviceTier, GpuScore};

    struct BrokenProbe;

    impl CapabilityProbe for BrokenProbe {
        fn probe(&self) -> Result<RawProbeSignal> {
            anyhow::bail!("no WebGL context")
        }
    }

    #[test]
    fn test_failed_probe_degrades() {
        let (sig, signal) = sample_signature(&BrokenProbe, &SignatureBuilder::default());
        assert!(signal.is_none());
        assert_eq!(sig.device_tier, DeviceTier::LOWEST);
        assert_eq!(sig.gpu_score, GpuScore::LOWEST);
    }

    #[test]
    fn test_static_probe() {
        let probe = StaticProbe::new(RawProbeSignal {
            width: 1440,
            renderer: Some("NVIDIA GeForce RTX 2070".into()),
            ..Default::default()
        });
        let (sig, signal) = sample_signature(&probe, &SignatureBuilder::default());
        assert_eq!(signal.map(|s| s.width), Some(1440));
        assert_eq!(sig.device_tier.get(), 2);
        assert_eq!(sig.gpu_score.get(), 4);
    }
}
