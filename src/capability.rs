//! Device capability classification.
//!
//! Turns best-effort probe output into a small, stable signature:
//! - **Device tier** (1 = strongest) from viewport width breakpoints.
//! - **GPU score** (5 = strongest) from the renderer identifier, falling back
//!   to the maximum texture size, and finally to the lowest score.
//! - **Device class** from the user agent and width.
//!
//! GPU identification is behind the [`GpuClassifier`] trait so the keyword
//! table can be replaced (e.g. by a benchmark-based classifier) without
//! touching quality resolution.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default width breakpoints for tiers 1..=4; anything narrower is tier 5.
pub const DEFAULT_TIER_BREAKPOINTS: [u32; 4] = [1920, 1440, 1024, 768];

/// Score ceiling applied to handheld devices regardless of renderer string.
const HANDHELD_SCORE_CAP: u8 = 3;

/// Raw device/GPU signals reported by a capability probe.
///
/// Every field except `width` is optional: probes are best-effort and a
/// missing signal is expected rather than exceptional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProbeSignal {
    /// Viewport width in CSS pixels.
    pub width: u32,
    /// Unmasked renderer identifier (e.g. "ANGLE (NVIDIA GeForce RTX 3080 ...)").
    pub renderer: Option<String>,
    /// Maximum 2D texture dimension reported by the graphics API.
    pub max_texture_size: Option<u32>,
    /// Whether the user agent was classified as mobile by the host.
    pub is_mobile_ua: bool,
    /// Full user-agent string, when the host exposes it.
    #[serde(default)]
    pub user_agent: Option<String>,
}

// ============================================================================
// Tier / score newtypes
// ============================================================================

/// Coarse capability bucket derived from viewport width (1 = highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DeviceTier(u8);

impl DeviceTier {
    pub const HIGHEST: DeviceTier = DeviceTier(1);
    pub const LOWEST: DeviceTier = DeviceTier(5);

    /// Build a tier, clamping out-of-range values to the nearest valid tier.
    pub fn clamped(value: i64) -> Self {
        DeviceTier(value.clamp(1, 5) as u8)
    }

    /// Tier for a viewport width, given four descending breakpoints.
    pub fn from_width(width: u32, breakpoints: &[u32; 4]) -> Self {
        let idx = breakpoints
            .iter()
            .position(|&min| width >= min)
            .unwrap_or(breakpoints.len());
        DeviceTier(idx as u8 + 1)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based index into per-tier tables.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// All tiers, strongest first.
    pub fn all() -> impl Iterator<Item = DeviceTier> {
        (1..=5).map(DeviceTier)
    }
}

impl TryFrom<u8> for DeviceTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=5).contains(&value) {
            Ok(DeviceTier(value))
        } else {
            Err(format!("device tier {} out of range 1..=5", value))
        }
    }
}

impl From<DeviceTier> for u8 {
    fn from(tier: DeviceTier) -> u8 {
        tier.0
    }
}

/// Coarse GPU capability bucket (5 = highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct GpuScore(u8);

impl GpuScore {
    pub const LOWEST: GpuScore = GpuScore(1);
    pub const HIGHEST: GpuScore = GpuScore(5);

    /// Build a score, clamping out-of-range values to the nearest valid score.
    pub fn clamped(value: i64) -> Self {
        GpuScore(value.clamp(1, 5) as u8)
    }

    /// Score implied by the maximum texture dimension alone.
    pub fn from_max_texture_size(size: u32) -> Self {
        match size {
            s if s >= 16384 => GpuScore(4),
            s if s >= 8192 => GpuScore(3),
            s if s >= 4096 => GpuScore(2),
            _ => GpuScore(1),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based index into per-score tables.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// All scores, weakest first.
    pub fn all() -> impl Iterator<Item = GpuScore> {
        (1..=5).map(GpuScore)
    }
}

impl TryFrom<u8> for GpuScore {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=5).contains(&value) {
            Ok(GpuScore(value))
        } else {
            Err(format!("gpu score {} out of range 1..=5", value))
        }
    }
}

impl From<GpuScore> for u8 {
    fn from(score: GpuScore) -> u8 {
        score.0
    }
}

/// Form factor of the running device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Laptop,
    Desktop,
}

impl DeviceClass {
    /// Whether the device is handheld (phones and tablets).
    pub fn is_handheld(self) -> bool {
        matches!(self, DeviceClass::Mobile | DeviceClass::Tablet)
    }
}

/// Stable per-session capability classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySignature {
    pub device_tier: DeviceTier,
    pub gpu_score: GpuScore,
    pub device_class: DeviceClass,
}

impl CapabilitySignature {
    /// Signature assumed when no probe data is available at all.
    pub fn lowest() -> Self {
        Self {
            device_tier: DeviceTier::LOWEST,
            gpu_score: GpuScore::LOWEST,
            device_class: DeviceClass::Laptop,
        }
    }
}

// ============================================================================
// GPU classification
// ============================================================================

/// Maps a renderer identifier to a GPU score.
pub trait GpuClassifier {
    /// Score a renderer string. Returns `None` when the string carries no
    /// recognisable signal, so the caller can fall back to other probes.
    fn classify_renderer(&self, renderer: &str) -> Option<GpuScore>;
}

/// Keyword rules checked in order; the first match wins.
const RENDERER_RULES: &[(u8, &[&str])] = &[
    // Software rasterisers first: they often embed a vendor name.
    (1, &[r"swiftshader", r"llvmpipe", r"softpipe", r"software", r"microsoft basic render"]),
    (5, &[r"rtx\s*(30|40|50)\d{2}", r"rx\s*[67]\d{3}", r"apple\s*m[234]"]),
    (4, &[r"rtx\s*20\d{2}", r"gtx\s*16\d{2}", r"apple\s*m1", r"rx\s*5\d{3}"]),
    (
        3,
        &[
            r"gtx\s*(9\d{2}|10\d{2})",
            r"apple\s*a1\d",
            r"adreno\D*7\d{2}",
            r"mali-g7\d",
            r"iris",
            r"radeon",
            r"geforce",
        ],
    ),
    (2, &[r"(uhd|hd)\s*graphics", r"adreno", r"mali", r"powervr"]),
];

/// Compile a case-insensitive pattern, or warn and skip it.
fn compile_pattern(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("(?i){}", pattern)) {
        Ok(re) => Some(re),
        Err(e) => {
            log::warn!("Skipping pattern {:?}: {}", pattern, e);
            None
        }
    }
}

/// Case-insensitive keyword ladder over renderer identifiers.
pub struct RendererKeywordClassifier {
    rules: Vec<(Regex, GpuScore)>,
}

impl RendererKeywordClassifier {
    /// Build a classifier from `(score, patterns)` rules, checked in order.
    ///
    /// Patterns that fail to compile are skipped with a warning.
    pub fn from_rules(rules: &[(u8, &[&str])]) -> Self {
        let rules = rules
            .iter()
            .flat_map(|(score, patterns)| patterns.iter().map(move |p| (*score, *p)))
            .filter_map(|(score, pattern)| {
                compile_pattern(pattern).map(|re| (re, GpuScore::clamped(score as i64)))
            })
            .collect();
        Self { rules }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for RendererKeywordClassifier {
    fn default() -> Self {
        Self::from_rules(RENDERER_RULES)
    }
}

impl GpuClassifier for RendererKeywordClassifier {
    fn classify_renderer(&self, renderer: &str) -> Option<GpuScore> {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(renderer))
            .map(|(_, score)| *score)
    }
}

// ============================================================================
// Signature builder
// ============================================================================

const TABLET_UA_PATTERN: &str = "ipad|tablet|playbook|silk";
const MOBILE_UA_PATTERN: &str = "android|webos|iphone|ipod|blackberry|iemobile|opera mini";

/// Builds [`CapabilitySignature`]s from raw probe output.
///
/// Deterministic: the same signal always yields the same signature.
pub struct SignatureBuilder {
    breakpoints: [u32; 4],
    classifier: Box<dyn GpuClassifier>,
    tablet_ua: Option<Regex>,
    mobile_ua: Option<Regex>,
}

impl SignatureBuilder {
    pub fn new(breakpoints: [u32; 4]) -> Self {
        Self::with_classifier(breakpoints, Box::new(RendererKeywordClassifier::default()))
    }

    /// Use a custom GPU classifier in place of the keyword ladder.
    pub fn with_classifier(breakpoints: [u32; 4], classifier: Box<dyn GpuClassifier>) -> Self {
        Self {
            breakpoints,
            classifier,
            tablet_ua: compile_pattern(TABLET_UA_PATTERN),
            mobile_ua: compile_pattern(MOBILE_UA_PATTERN),
        }
    }

    pub fn breakpoints(&self) -> &[u32; 4] {
        &self.breakpoints
    }

    /// Classify a raw probe signal.
    pub fn build(&self, signal: &RawProbeSignal) -> CapabilitySignature {
        let device_class = self.device_class(signal);
        let gpu_score = self.gpu_score(signal, device_class);
        let device_tier = self.device_tier(signal.width);

        log::info!(
            "Capability signature: tier {} / gpu score {} / {:?} (width {}, renderer {:?})",
            device_tier.get(),
            gpu_score.get(),
            device_class,
            signal.width,
            signal.renderer
        );

        CapabilitySignature {
            device_tier,
            gpu_score,
            device_class,
        }
    }

    /// Recompute the width-derived tier after a resize.
    ///
    /// The GPU score and device class are kept: the probe is not re-sampled.
    pub fn resized(&self, signature: &CapabilitySignature, width: u32) -> CapabilitySignature {
        CapabilitySignature {
            device_tier: self.device_tier(width),
            ..*signature
        }
    }

    pub fn device_tier(&self, width: u32) -> DeviceTier {
        DeviceTier::from_width(width, &self.breakpoints)
    }

    fn device_class(&self, signal: &RawProbeSignal) -> DeviceClass {
        let ua = signal.user_agent.as_deref().unwrap_or("");
        let lower = ua.to_ascii_lowercase();
        // Android tablets omit "mobile" from their user agent.
        let android_tablet = lower.contains("android") && !lower.contains("mobile");

        let matches = |re: &Option<Regex>| re.as_ref().is_some_and(|re| re.is_match(ua));

        if matches(&self.tablet_ua) || android_tablet {
            DeviceClass::Tablet
        } else if signal.is_mobile_ua || matches(&self.mobile_ua) {
            DeviceClass::Mobile
        } else if signal.width >= self.breakpoints[1] {
            DeviceClass::Desktop
        } else {
            DeviceClass::Laptop
        }
    }

    fn gpu_score(&self, signal: &RawProbeSignal, class: DeviceClass) -> GpuScore {
        let from_renderer = signal
            .renderer
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .and_then(|r| self.classifier.classify_renderer(r));

        let score = match (from_renderer, signal.max_texture_size) {
            (Some(score), _) => score,
            (None, Some(size)) => {
                log::debug!("Renderer unrecognised; using max texture size {}", size);
                GpuScore::from_max_texture_size(size)
            }
            (None, None) => {
                log::warn!("No GPU signal available; assuming lowest GPU score");
                GpuScore::LOWEST
            }
        };

        if class.is_handheld() && score.get() > HANDHELD_SCORE_CAP {
            GpuScore(HANDHELD_SCORE_CAP)
        } else {
            score
        }
    }
}

impl Default for SignatureBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TIER_BREAKPOINTS)
    }
}
