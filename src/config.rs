//! Viewer configuration.
//!
//! Every field has a default, so an empty JSON object is a complete config.
//! Loading validates the quality table and animation settings before the
//! config is handed to a session.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::animator::{
    default_responsive, default_templates, KeyframeTemplate, ResponsiveBreakpoint, DEFAULT_SMOOTHING,
    DEFAULT_SNAP_EPSILON,
};
use crate::capability::DEFAULT_TIER_BREAKPOINTS;
use crate::quality::{FallbackPolicy, QualityResolver, QualityTable};

fn default_tier_breakpoints() -> [u32; 4] {
    DEFAULT_TIER_BREAKPOINTS
}

fn default_smoothing() -> f32 {
    DEFAULT_SMOOTHING
}

fn default_snap_epsilon() -> f32 {
    DEFAULT_SNAP_EPSILON
}

/// Quality table and fallback thresholds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default)]
    pub table: QualityTable,
    #[serde(default)]
    pub fallback: FallbackPolicy,
}

impl QualityConfig {
    /// Build a validated resolver.
    pub fn resolver(&self) -> Result<QualityResolver> {
        QualityResolver::new(self.table.clone(), self.fallback)
            .with_context(|| format!("Invalid quality table (version {})", self.table.version))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Fraction of the remaining distance covered per frame.
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,

    /// Distance below which a field snaps onto its target.
    #[serde(default = "default_snap_epsilon")]
    pub snap_epsilon: f32,

    /// One template per section.
    #[serde(default = "default_templates")]
    pub keyframes: Vec<KeyframeTemplate>,

    /// Checked in order; the first matching breakpoint applies.
    #[serde(default = "default_responsive")]
    pub responsive: Vec<ResponsiveBreakpoint>,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            smoothing: DEFAULT_SMOOTHING,
            snap_epsilon: DEFAULT_SNAP_EPSILON,
            keyframes: default_templates(),
            responsive: default_responsive(),
        }
    }
}

impl AnimationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            bail!("smoothing must be in (0, 1], got {}", self.smoothing);
        }
        if !(self.snap_epsilon >= 0.0 && self.snap_epsilon.is_finite()) {
            bail!("snap_epsilon must be finite and non-negative, got {}", self.snap_epsilon);
        }
        if self.keyframes.is_empty() {
            bail!("at least one keyframe is required");
        }
        let finite = |v: glam::Vec3| v.is_finite();
        if let Some(i) = self
            .keyframes
            .iter()
            .position(|k| !finite(k.position) || !finite(k.rotation) || !k.scale.is_finite())
        {
            bail!("keyframe {} has non-finite values", i);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Viewport widths at which device tiers 1 to 4 start.
    #[serde(default = "default_tier_breakpoints")]
    pub tier_breakpoints: [u32; 4],

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub animation: AnimationConfig,

    /// Number of scroll sections. Must equal the keyframe count when set.
    #[serde(default)]
    pub section_count: Option<usize>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            tier_breakpoints: DEFAULT_TIER_BREAKPOINTS,
            quality: QualityConfig::default(),
            animation: AnimationConfig::default(),
            section_count: None,
        }
    }
}

impl ViewerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse viewer config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.tier_breakpoints.windows(2).any(|w| w[1] >= w[0]) {
            bail!(
                "tier breakpoints must be strictly decreasing: {:?}",
                self.tier_breakpoints
            );
        }
        self.quality.resolver()?;
        self.animation.validate().context("Invalid animation config")?;
        if let Some(count) = self.section_count {
            if count != self.animation.keyframes.len() {
                bail!(
                    "section_count {} does not match the {} keyframes (one keyframe per section)",
                    count,
                    self.animation.keyframes.len()
                );
            }
        }
        Ok(())
    }

    /// One section per keyframe.
    pub fn section_count(&self) -> usize {
        self.animation.keyframes.len().max(1)
    }
}
