//! Capability-to-quality resolution.
//!
//! A single versioned lookup table keyed by `(device tier, GPU score)` yields a
//! base [`QualityRow`]. [`QualityResolver::resolve`] specialises that row for a
//! part class and size class into a flat [`QualityProfile`]:
//!
//! - **Stone** parts use the row directly. Main (focal) parts take the main
//!   resolution/sample pair; medium and small parts take the small pair.
//! - **Metal** and **pearl** parts are opaque: no refraction sampling, with
//!   environment intensity scaled by the row's share of the table peak.
//!
//! Every continuous parameter is monotone in capability: a stronger tier or
//! score never yields a worse value for the same part and size class.
//! [`QualityResolver::validate`] checks this over the whole grid, so a table
//! loaded from configuration is rejected if it breaks the ordering.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::capability::{DeviceTier, GpuScore};

/// Version of the canonical table below.
pub const CANONICAL_TABLE_VERSION: u32 = 2;

/// Base environment intensity for opaque metal parts at full capability.
const METAL_ENV_INTENSITY: f32 = 1.5;
const METAL_ROUGHNESS: f32 = 0.2;

/// Base environment intensity for pearl parts at full capability.
const PEARL_ENV_INTENSITY: f32 = 1.2;
const PEARL_ROUGHNESS: f32 = 0.15;
const PEARL_IOR: f32 = 1.3;

// ============================================================================
// Classes and presets
// ============================================================================

/// Material class of a scene part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartClass {
    Stone,
    Metal,
    Pearl,
}

impl PartClass {
    pub const ALL: [PartClass; 3] = [PartClass::Stone, PartClass::Metal, PartClass::Pearl];

    /// Whether parts of this class render with a transmissive material.
    pub fn is_transmissive(self) -> bool {
        matches!(self, PartClass::Stone)
    }
}

impl FromStr for PartClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stone" => Ok(PartClass::Stone),
            "metal" => Ok(PartClass::Metal),
            "pearl" => Ok(PartClass::Pearl),
            other => bail!("unknown part class '{}' (expected stone, metal or pearl)", other),
        }
    }
}

/// Relative visual size of a part, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Main,
    Medium,
    Small,
}

impl SizeClass {
    pub const ALL: [SizeClass; 3] = [SizeClass::Main, SizeClass::Medium, SizeClass::Small];

    /// Whether this size class gets the main (large-feature) sampling budget.
    pub fn uses_main_budget(self) -> bool {
        matches!(self, SizeClass::Main)
    }
}

impl FromStr for SizeClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "main" => Ok(SizeClass::Main),
            "medium" => Ok(SizeClass::Medium),
            "small" => Ok(SizeClass::Small),
            other => bail!("unknown size class '{}' (expected main, medium or small)", other),
        }
    }
}

/// Human-readable name of a table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Low,
    Medium,
    High,
    Ultra,
    Extreme,
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityPreset::Low => "Low",
            QualityPreset::Medium => "Medium",
            QualityPreset::High => "High",
            QualityPreset::Ultra => "Ultra",
            QualityPreset::Extreme => "Extreme",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Table
// ============================================================================

/// One `(tier, score)` cell of the quality table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityRow {
    pub preset: QualityPreset,
    /// Refraction buffer resolution for main (focal) parts.
    pub main_resolution: u32,
    /// Refraction buffer resolution for small/accent parts.
    pub small_resolution: u32,
    pub main_samples: u32,
    pub small_samples: u32,
    pub transmission: f32,
    pub thickness: f32,
    pub ior: f32,
    pub roughness: f32,
    pub reflectivity: f32,
    pub env_map_intensity: f32,
    pub chromatic_aberration: f32,
    pub distortion: f32,
    pub distortion_scale: f32,
    pub attenuation_distance: f32,
}

// Column order: preset, main_res, small_res, main_samples, small_samples,
// transmission, thickness, ior, roughness, reflectivity, env, chromatic,
// distortion, distortion_scale, attenuation_distance.
#[allow(clippy::too_many_arguments)]
const fn row(
    preset: QualityPreset,
    main_resolution: u32,
    small_resolution: u32,
    main_samples: u32,
    small_samples: u32,
    transmission: f32,
    thickness: f32,
    ior: f32,
    roughness: f32,
    reflectivity: f32,
    env_map_intensity: f32,
    chromatic_aberration: f32,
    distortion: f32,
    distortion_scale: f32,
    attenuation_distance: f32,
) -> QualityRow {
    QualityRow {
        preset,
        main_resolution,
        small_resolution,
        main_samples,
        small_samples,
        transmission,
        thickness,
        ior,
        roughness,
        reflectivity,
        env_map_intensity,
        chromatic_aberration,
        distortion,
        distortion_scale,
        attenuation_distance,
    }
}

use QualityPreset::{Extreme, High, Low, Medium, Ultra};

/// Canonical table, indexed `[tier - 1][score - 1]`.
const CANONICAL_ROWS: [[QualityRow; 5]; 5] = [
    // Tier 1: >= 1920px
    [
        row(Low, 128, 64, 3, 2, 1.0, 1.2, 2.35, 0.0, 0.80, 3.5, 0.05, 0.30, 0.5, 2.0),
        row(Medium, 192, 96, 4, 2, 1.0, 1.4, 2.38, 0.0, 0.85, 4.0, 0.06, 0.35, 0.6, 2.5),
        row(High, 256, 128, 5, 3, 1.0, 1.6, 2.40, 0.0, 0.90, 4.5, 0.07, 0.40, 0.7, 3.0),
        row(Ultra, 320, 160, 6, 4, 1.0, 1.8, 2.415, 0.0, 0.95, 5.0, 0.08, 0.45, 0.8, 3.5),
        row(Extreme, 384, 192, 8, 5, 1.0, 2.0, 2.417, 0.0, 1.00, 5.5, 0.10, 0.50, 1.0, 4.0),
    ],
    // Tier 2: >= 1440px
    [
        row(Low, 96, 64, 2, 1, 0.98, 1.0, 2.30, 0.005, 0.75, 3.0, 0.04, 0.25, 0.4, 1.5),
        row(Medium, 128, 96, 3, 2, 1.0, 1.2, 2.35, 0.0, 0.80, 3.5, 0.05, 0.30, 0.5, 2.0),
        row(High, 192, 128, 4, 3, 1.0, 1.4, 2.38, 0.0, 0.85, 4.0, 0.06, 0.35, 0.6, 2.5),
        row(Ultra, 256, 160, 5, 3, 1.0, 1.6, 2.40, 0.0, 0.90, 4.5, 0.07, 0.40, 0.7, 3.0),
        row(Extreme, 320, 192, 6, 4, 1.0, 1.8, 2.415, 0.0, 0.95, 5.0, 0.08, 0.45, 0.8, 3.5),
    ],
    // Tier 3: >= 1024px
    [
        row(Low, 96, 64, 2, 1, 0.96, 0.9, 2.25, 0.01, 0.70, 2.5, 0.035, 0.20, 0.35, 1.2),
        row(Medium, 128, 96, 3, 2, 0.98, 1.0, 2.30, 0.005, 0.75, 3.0, 0.04, 0.25, 0.4, 1.5),
        row(High, 192, 128, 4, 2, 1.0, 1.2, 2.35, 0.0, 0.80, 3.5, 0.05, 0.30, 0.5, 2.0),
        row(Ultra, 256, 160, 5, 3, 1.0, 1.4, 2.38, 0.0, 0.85, 4.0, 0.06, 0.35, 0.6, 2.5),
        row(Extreme, 320, 192, 6, 3, 1.0, 1.6, 2.40, 0.0, 0.90, 4.5, 0.07, 0.40, 0.7, 3.0),
    ],
    // Tier 4: >= 768px
    [
        row(Low, 64, 48, 2, 1, 0.94, 0.8, 2.20, 0.015, 0.65, 2.0, 0.03, 0.15, 0.3, 1.0),
        row(Medium, 96, 64, 2, 1, 0.96, 0.9, 2.25, 0.01, 0.70, 2.5, 0.035, 0.20, 0.35, 1.2),
        row(High, 128, 96, 3, 2, 0.98, 1.0, 2.30, 0.005, 0.75, 3.0, 0.04, 0.25, 0.4, 1.5),
        row(Ultra, 192, 128, 4, 2, 1.0, 1.2, 2.35, 0.0, 0.80, 3.5, 0.05, 0.30, 0.5, 2.0),
        row(Extreme, 256, 160, 5, 3, 1.0, 1.4, 2.38, 0.0, 0.85, 4.0, 0.06, 0.35, 0.6, 2.5),
    ],
    // Tier 5: phones and narrow windows
    [
        row(Low, 64, 48, 1, 1, 0.92, 0.7, 2.15, 0.02, 0.60, 1.8, 0.025, 0.12, 0.25, 0.8),
        row(Medium, 96, 64, 2, 1, 0.94, 0.8, 2.20, 0.015, 0.65, 2.0, 0.03, 0.15, 0.3, 1.0),
        row(High, 128, 96, 3, 1, 0.96, 0.9, 2.25, 0.01, 0.70, 2.5, 0.035, 0.20, 0.35, 1.2),
        row(Ultra, 192, 128, 3, 2, 0.98, 1.0, 2.30, 0.005, 0.75, 3.0, 0.04, 0.25, 0.4, 1.5),
        row(Extreme, 256, 160, 4, 2, 1.0, 1.2, 2.35, 0.0, 0.80, 3.5, 0.05, 0.30, 0.5, 2.0),
    ],
];

/// Fully enumerated `(tier, score)` lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTable {
    pub version: u32,
    /// Indexed `[tier - 1][score - 1]`.
    pub rows: [[QualityRow; 5]; 5],
}

impl QualityTable {
    pub fn canonical() -> Self {
        Self {
            version: CANONICAL_TABLE_VERSION,
            rows: CANONICAL_ROWS,
        }
    }

    pub fn row(&self, tier: DeviceTier, score: GpuScore) -> &QualityRow {
        &self.rows[tier.index()][score.index()]
    }

    /// Highest environment intensity anywhere in the table.
    pub fn peak_env_map_intensity(&self) -> f32 {
        self.rows
            .iter()
            .flatten()
            .map(|r| r.env_map_intensity)
            .fold(0.0, f32::max)
    }

    /// Check per-cell sanity (finite values, physical ranges, size budgets).
    pub fn validate(&self) -> Result<()> {
        for tier in DeviceTier::all() {
            for score in GpuScore::all() {
                let r = self.row(tier, score);
                let cell = format!("tier {} / score {}", tier.get(), score.get());
                let floats = [
                    r.transmission,
                    r.thickness,
                    r.ior,
                    r.roughness,
                    r.reflectivity,
                    r.env_map_intensity,
                    r.chromatic_aberration,
                    r.distortion,
                    r.distortion_scale,
                    r.attenuation_distance,
                ];
                if floats.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    bail!("{}: parameters must be finite and non-negative", cell);
                }
                if r.transmission > 1.0 || r.reflectivity > 1.0 || r.roughness > 1.0 {
                    bail!("{}: transmission, reflectivity and roughness must be <= 1", cell);
                }
                if r.ior < 1.0 {
                    bail!("{}: index of refraction {} below 1", cell, r.ior);
                }
                if r.main_samples == 0 || r.small_samples == 0 || r.small_resolution == 0 {
                    bail!("{}: sample counts and resolutions must be positive", cell);
                }
                if r.small_resolution > r.main_resolution || r.small_samples > r.main_samples {
                    bail!("{}: small-part budget exceeds main-part budget", cell);
                }
            }
        }
        Ok(())
    }
}

impl Default for QualityTable {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Per-tier GPU score thresholds at or below which transmissive parts fall
/// back to an opaque approximation.
///
/// A threshold of 0 disables the fallback for that tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    /// Indexed by `tier - 1`.
    pub thresholds: [u8; 5],
}

impl FallbackPolicy {
    pub fn applies(&self, tier: DeviceTier, score: GpuScore) -> bool {
        score.get() <= self.thresholds[tier.index()]
    }

    /// Weaker tiers must not have a lower threshold than stronger ones.
    pub fn validate(&self) -> Result<()> {
        if self.thresholds.iter().any(|&t| t > 5) {
            bail!("fallback thresholds must be within 0..=5: {:?}", self.thresholds);
        }
        if self.thresholds.windows(2).any(|w| w[1] < w[0]) {
            bail!(
                "fallback thresholds must not decrease from tier 1 to tier 5: {:?}",
                self.thresholds
            );
        }
        Ok(())
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            thresholds: [0, 1, 1, 2, 2],
        }
    }
}

// ============================================================================
// Profile
// ============================================================================

/// Resolved rendering parameters for one part class at one capability level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub part_class: PartClass,
    pub size_class: SizeClass,
    pub preset: QualityPreset,
    pub transmission: f32,
    pub thickness: f32,
    pub ior: f32,
    pub roughness: f32,
    pub reflectivity: f32,
    pub env_map_intensity: f32,
    pub chromatic_aberration: f32,
    pub distortion: f32,
    pub distortion_scale: f32,
    pub attenuation_distance: f32,
    /// Refraction sample count (0 for opaque classes).
    pub samples: u32,
    /// Refraction buffer resolution (0 for opaque classes).
    pub resolution: u32,
    /// Substitute an opaque approximation for the transmissive material.
    pub use_fallback: bool,
}

/// Whether larger or smaller values of a parameter are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Better {
    Higher,
    Lower,
}

/// Bitwise identity of a profile, usable as a hash key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileKey {
    classes: (PartClass, SizeClass),
    bits: [u32; 12],
    use_fallback: bool,
}

impl QualityProfile {
    fn continuous(&self) -> [(&'static str, f32, Better); 12] {
        [
            ("transmission", self.transmission, Better::Higher),
            ("thickness", self.thickness, Better::Higher),
            ("ior", self.ior, Better::Higher),
            ("roughness", self.roughness, Better::Lower),
            ("reflectivity", self.reflectivity, Better::Higher),
            ("env_map_intensity", self.env_map_intensity, Better::Higher),
            ("chromatic_aberration", self.chromatic_aberration, Better::Higher),
            ("distortion", self.distortion, Better::Higher),
            ("distortion_scale", self.distortion_scale, Better::Higher),
            ("attenuation_distance", self.attenuation_distance, Better::Higher),
            ("samples", self.samples as f32, Better::Higher),
            ("resolution", self.resolution as f32, Better::Higher),
        ]
    }

    /// Name of the first parameter in which `self` (the more capable
    /// resolution) is strictly worse than `weaker`, if any.
    pub fn first_regression(&self, weaker: &QualityProfile) -> Option<&'static str> {
        if self.use_fallback && !weaker.use_fallback {
            return Some("use_fallback");
        }
        self.continuous()
            .iter()
            .zip(weaker.continuous().iter())
            .find(|((_, mine, better), (_, theirs, _))| match better {
                Better::Higher => mine < theirs,
                Better::Lower => mine > theirs,
            })
            .map(|((name, _, _), _)| *name)
    }

    /// Identity of everything that affects the built material.
    pub fn key(&self) -> ProfileKey {
        let mut bits = [0u32; 12];
        for (slot, (_, value, _)) in bits.iter_mut().zip(self.continuous().iter()) {
            *slot = value.to_bits();
        }
        ProfileKey {
            classes: (self.part_class, self.size_class),
            bits,
            use_fallback: self.use_fallback,
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Pure, total mapping from capability to [`QualityProfile`].
#[derive(Debug, Clone)]
pub struct QualityResolver {
    table: QualityTable,
    fallback: FallbackPolicy,
    peak_env: f32,
}

impl QualityResolver {
    /// Build a resolver, rejecting tables that are malformed or not monotone.
    pub fn new(table: QualityTable, fallback: FallbackPolicy) -> Result<Self> {
        table.validate()?;
        fallback.validate()?;
        let resolver = Self::unchecked(table, fallback);
        resolver.validate()?;
        Ok(resolver)
    }

    fn unchecked(table: QualityTable, fallback: FallbackPolicy) -> Self {
        let peak_env = table.peak_env_map_intensity().max(f32::EPSILON);
        Self {
            table,
            fallback,
            peak_env,
        }
    }

    pub fn table(&self) -> &QualityTable {
        &self.table
    }

    pub fn fallback(&self) -> &FallbackPolicy {
        &self.fallback
    }

    /// Resolve from raw integers, clamping out-of-range inputs.
    pub fn resolve_clamped(&self, tier: i64, score: i64, class: PartClass, size: SizeClass) -> QualityProfile {
        self.resolve(DeviceTier::clamped(tier), GpuScore::clamped(score), class, size)
    }

    pub fn resolve(&self, tier: DeviceTier, score: GpuScore, class: PartClass, size: SizeClass) -> QualityProfile {
        let r = self.table.row(tier, score);

        match class {
            PartClass::Stone => {
                let (resolution, samples) = if size.uses_main_budget() {
                    (r.main_resolution, r.main_samples)
                } else {
                    (r.small_resolution, r.small_samples)
                };
                QualityProfile {
                    part_class: class,
                    size_class: size,
                    preset: r.preset,
                    transmission: r.transmission,
                    thickness: r.thickness,
                    ior: r.ior,
                    roughness: r.roughness,
                    reflectivity: r.reflectivity,
                    env_map_intensity: r.env_map_intensity,
                    chromatic_aberration: r.chromatic_aberration,
                    distortion: r.distortion,
                    distortion_scale: r.distortion_scale,
                    attenuation_distance: r.attenuation_distance,
                    samples,
                    resolution,
                    use_fallback: self.fallback.applies(tier, score),
                }
            }
            PartClass::Metal | PartClass::Pearl => {
                let env_share = r.env_map_intensity / self.peak_env;
                let (base_env, roughness, ior) = if class == PartClass::Metal {
                    (METAL_ENV_INTENSITY, METAL_ROUGHNESS, 1.0)
                } else {
                    (PEARL_ENV_INTENSITY, PEARL_ROUGHNESS, PEARL_IOR)
                };
                QualityProfile {
                    part_class: class,
                    size_class: size,
                    preset: r.preset,
                    transmission: 0.0,
                    thickness: 0.0,
                    ior,
                    roughness,
                    reflectivity: r.reflectivity,
                    env_map_intensity: base_env * env_share,
                    chromatic_aberration: 0.0,
                    distortion: 0.0,
                    distortion_scale: 0.0,
                    attenuation_distance: 0.0,
                    samples: 0,
                    resolution: 0,
                    use_fallback: false,
                }
            }
        }
    }

    /// Check monotonicity over every adjacent `(tier, score)` pair for every
    /// part and size class.
    pub fn validate(&self) -> Result<()> {
        for class in PartClass::ALL {
            for size in SizeClass::ALL {
                for tier in DeviceTier::all() {
                    for score in GpuScore::all() {
                        let here = self.resolve(tier, score, class, size);

                        if score < GpuScore::HIGHEST {
                            let up = GpuScore::clamped(score.get() as i64 + 1);
                            let stronger = self.resolve(tier, up, class, size);
                            if let Some(field) = stronger.first_regression(&here) {
                                bail!(
                                    "{:?}/{:?}: '{}' regresses from score {} to {} at tier {}",
                                    class, size, field, score.get(), up.get(), tier.get()
                                );
                            }
                        }

                        if tier > DeviceTier::HIGHEST {
                            let up = DeviceTier::clamped(tier.get() as i64 - 1);
                            let stronger = self.resolve(up, score, class, size);
                            if let Some(field) = stronger.first_regression(&here) {
                                bail!(
                                    "{:?}/{:?}: '{}' regresses from tier {} to {} at score {}",
                                    class, size, field, tier.get(), up.get(), score.get()
                                );
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for QualityResolver {
    fn default() -> Self {
        Self::unchecked(QualityTable::canonical(), FallbackPolicy::default())
    }
}
