//! Material presets and construction.
//!
//! A [`MaterialVariant`] is the look a part is dressed in (gold, ruby, black
//! pearl, ...). [`MaterialParams::compose`] combines a variant with a resolved
//! [`QualityProfile`] into the flat parameter set a renderer consumes. The
//! backing resource is created by a [`MaterialFactory`]; materials are only
//! ever built through the assignment cache, which owns their handles.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::quality::{PartClass, QualityProfile};
use crate::scene::PartId;

/// Handle to a backend material resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialHandle(pub u64);

/// Shading model a material is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    /// Refractive, transmissive stone.
    Transmission,
    /// Opaque stand-in for transmission on weak GPUs.
    OpaqueApproximation,
    /// Metallic/roughness surface.
    Standard,
    /// Clearcoat + sheen surface (pearls).
    Physical,
}

// ============================================================================
// Variants
// ============================================================================

/// Selectable look for a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialVariant {
    Gold,
    Silver,
    Platinum,
    RoseGold,
    Diamond,
    Ruby,
    Sapphire,
    Emerald,
    WhitePearl,
    BlackPearl,
    PinkPearl,
    GoldenPearl,
}

/// Fixed appearance of a variant, independent of quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantSpec {
    pub color: [f32; 3],
    pub sheen_color: [f32; 3],
    pub metalness: f32,
    /// Lower bound on roughness; quality may only make it rougher.
    pub roughness: f32,
    /// Multiplier on the profile's transmission.
    pub transmission: f32,
    /// Multiplier on the profile's environment intensity.
    pub env_boost: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
}

fn rgb(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}

fn metal(hex: u32, roughness: f32, env_boost: f32) -> VariantSpec {
    VariantSpec {
        color: rgb(hex),
        sheen_color: [0.0; 3],
        metalness: 1.0,
        roughness,
        transmission: 0.0,
        env_boost,
        clearcoat: 0.0,
        clearcoat_roughness: 0.0,
    }
}

fn stone(hex: u32, roughness: f32, transmission: f32) -> VariantSpec {
    VariantSpec {
        color: rgb(hex),
        sheen_color: [0.0; 3],
        metalness: 0.0,
        roughness,
        transmission,
        env_boost: 1.0,
        clearcoat: 0.0,
        clearcoat_roughness: 0.0,
    }
}

fn pearl(hex: u32, sheen: u32) -> VariantSpec {
    VariantSpec {
        color: rgb(hex),
        sheen_color: rgb(sheen),
        metalness: 0.0,
        roughness: 0.15,
        transmission: 0.0,
        env_boost: 1.0,
        clearcoat: 1.0,
        clearcoat_roughness: 0.05,
    }
}

impl MaterialVariant {
    pub const ALL: [MaterialVariant; 12] = [
        MaterialVariant::Gold,
        MaterialVariant::Silver,
        MaterialVariant::Platinum,
        MaterialVariant::RoseGold,
        MaterialVariant::Diamond,
        MaterialVariant::Ruby,
        MaterialVariant::Sapphire,
        MaterialVariant::Emerald,
        MaterialVariant::WhitePearl,
        MaterialVariant::BlackPearl,
        MaterialVariant::PinkPearl,
        MaterialVariant::GoldenPearl,
    ];

    /// Part class this variant dresses.
    pub fn class(self) -> PartClass {
        use MaterialVariant::*;
        match self {
            Gold | Silver | Platinum | RoseGold => PartClass::Metal,
            Diamond | Ruby | Sapphire | Emerald => PartClass::Stone,
            WhitePearl | BlackPearl | PinkPearl | GoldenPearl => PartClass::Pearl,
        }
    }

    pub fn default_for(class: PartClass) -> Self {
        match class {
            PartClass::Metal => MaterialVariant::Gold,
            PartClass::Stone => MaterialVariant::Diamond,
            PartClass::Pearl => MaterialVariant::WhitePearl,
        }
    }

    pub fn spec(self) -> VariantSpec {
        use MaterialVariant::*;
        match self {
            Gold => metal(0xFFD700, 0.2, 1.0),
            Silver => metal(0xC0C0C0, 0.15, 1.0),
            Platinum => metal(0xE5E4E2, 0.1, 1.2),
            RoseGold => metal(0xB76E79, 0.2, 1.0),
            Diamond => stone(0xFFFFFF, 0.0, 1.0),
            Ruby => stone(0xE0115F, 0.15, 0.6),
            Sapphire => stone(0x0F52BA, 0.15, 0.6),
            Emerald => stone(0x50C878, 0.15, 0.6),
            WhitePearl => pearl(0xFFF5E1, 0xFFD1DC),
            BlackPearl => pearl(0x2C2C2C, 0x4A4A4A),
            PinkPearl => pearl(0xFFE4E8, 0xFFC0CB),
            GoldenPearl => pearl(0xF4E4C1, 0xFFD700),
        }
    }

    pub fn name(self) -> &'static str {
        use MaterialVariant::*;
        match self {
            Gold => "gold",
            Silver => "silver",
            Platinum => "platinum",
            RoseGold => "rose_gold",
            Diamond => "diamond",
            Ruby => "ruby",
            Sapphire => "sapphire",
            Emerald => "emerald",
            WhitePearl => "white_pearl",
            BlackPearl => "black_pearl",
            PinkPearl => "pink_pearl",
            GoldenPearl => "golden_pearl",
        }
    }
}

impl fmt::Display for MaterialVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MaterialVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.to_ascii_lowercase().replace(['-', ' '], "_");
        match MaterialVariant::ALL.iter().find(|v| v.name() == wanted) {
            Some(v) => Ok(*v),
            None => bail!("unknown material variant '{}'", s),
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Fully composed material for one part.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialParams {
    pub part_class: PartClass,
    pub variant: MaterialVariant,
    pub kind: MaterialKind,
    pub color: [f32; 3],
    pub sheen_color: [f32; 3],
    pub metalness: f32,
    pub roughness: f32,
    pub transmission: f32,
    pub thickness: f32,
    pub ior: f32,
    pub reflectivity: f32,
    pub env_map_intensity: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub chromatic_aberration: f32,
    pub distortion: f32,
    pub distortion_scale: f32,
    pub attenuation_distance: f32,
    pub samples: u32,
    pub resolution: u32,
    /// Backend resource; `None` for the minimal default substitute.
    pub handle: Option<MaterialHandle>,
}

impl MaterialParams {
    /// Combine a variant's look with a quality profile.
    pub fn compose(variant: MaterialVariant, profile: &QualityProfile) -> Self {
        let spec = variant.spec();
        let roughness = profile.roughness.max(spec.roughness);
        let env_map_intensity = profile.env_map_intensity * spec.env_boost;

        let base = Self {
            part_class: profile.part_class,
            variant,
            kind: MaterialKind::Standard,
            color: spec.color,
            sheen_color: spec.sheen_color,
            metalness: spec.metalness,
            roughness,
            transmission: 0.0,
            thickness: 0.0,
            ior: profile.ior,
            reflectivity: profile.reflectivity,
            env_map_intensity,
            clearcoat: spec.clearcoat,
            clearcoat_roughness: spec.clearcoat_roughness,
            chromatic_aberration: 0.0,
            distortion: 0.0,
            distortion_scale: 0.0,
            attenuation_distance: 0.0,
            samples: 0,
            resolution: 0,
            handle: None,
        };

        match profile.part_class {
            PartClass::Stone if profile.use_fallback => Self {
                kind: MaterialKind::OpaqueApproximation,
                ..base
            },
            PartClass::Stone => Self {
                kind: MaterialKind::Transmission,
                transmission: profile.transmission * spec.transmission,
                thickness: profile.thickness,
                chromatic_aberration: profile.chromatic_aberration,
                distortion: profile.distortion,
                distortion_scale: profile.distortion_scale,
                attenuation_distance: profile.attenuation_distance,
                samples: profile.samples,
                resolution: profile.resolution,
                ..base
            },
            PartClass::Metal => base,
            PartClass::Pearl => Self {
                kind: MaterialKind::Physical,
                ..base
            },
        }
    }

    /// Plain grey surface substituted when construction fails.
    pub fn minimal_default(part_class: PartClass) -> Self {
        Self {
            part_class,
            variant: MaterialVariant::default_for(part_class),
            kind: MaterialKind::Standard,
            color: [0.8, 0.8, 0.8],
            sheen_color: [0.0; 3],
            metalness: 0.0,
            roughness: 0.5,
            transmission: 0.0,
            thickness: 0.0,
            ior: 1.5,
            reflectivity: 0.5,
            env_map_intensity: 1.0,
            clearcoat: 0.0,
            clearcoat_roughness: 0.0,
            chromatic_aberration: 0.0,
            distortion: 0.0,
            distortion_scale: 0.0,
            attenuation_distance: 0.0,
            samples: 0,
            resolution: 0,
            handle: None,
        }
    }

    pub fn is_default_substitute(&self) -> bool {
        self.handle.is_none()
    }

    pub fn uniform(&self) -> MaterialUniform {
        MaterialUniform {
            color: [self.color[0], self.color[1], self.color[2], self.transmission],
            sheen: [self.sheen_color[0], self.sheen_color[1], self.sheen_color[2], self.clearcoat],
            surface: [self.metalness, self.roughness, self.ior, self.thickness],
            lighting: [
                self.reflectivity,
                self.env_map_intensity,
                self.clearcoat_roughness,
                self.attenuation_distance,
            ],
            refraction: [
                self.chromatic_aberration,
                self.distortion,
                self.distortion_scale,
                self.samples as f32,
            ],
        }
    }
}

/// GPU layout of [`MaterialParams`] (std140-compatible, 80 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MaterialUniform {
    /// rgb + transmission
    pub color: [f32; 4],
    /// sheen rgb + clearcoat
    pub sheen: [f32; 4],
    /// metalness, roughness, ior, thickness
    pub surface: [f32; 4],
    /// reflectivity, env intensity, clearcoat roughness, attenuation distance
    pub lighting: [f32; 4],
    /// chromatic aberration, distortion, distortion scale, samples
    pub refraction: [f32; 4],
}

// ============================================================================
// Factories
// ============================================================================

/// Creates and releases backend material resources.
pub trait MaterialFactory {
    fn create(&mut self, part: &PartId, params: &MaterialParams) -> Result<MaterialHandle>;

    /// Release a handle previously returned by `create`. Unknown handles are
    /// ignored.
    fn release(&mut self, handle: MaterialHandle);
}

/// Factory that hands out sequential handles with no backing resource.
#[derive(Debug, Default)]
pub struct ParamsOnlyFactory {
    next: u64,
    live: HashSet<MaterialHandle>,
    created: usize,
}

impl ParamsOnlyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles created and not yet released.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn created_count(&self) -> usize {
        self.created
    }
}

impl MaterialFactory for ParamsOnlyFactory {
    fn create(&mut self, _part: &PartId, _params: &MaterialParams) -> Result<MaterialHandle> {
        self.next += 1;
        let handle = MaterialHandle(self.next);
        self.live.insert(handle);
        self.created += 1;
        Ok(handle)
    }

    fn release(&mut self, handle: MaterialHandle) {
        self.live.remove(&handle);
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use gpu_factory::WgpuMaterialFactory;

#[cfg(not(target_arch = "wasm32"))]
mod gpu_factory {
    use std::collections::HashMap;

    use anyhow::{anyhow, Result};
    use wgpu::util::DeviceExt;

    use super::{MaterialFactory, MaterialHandle, MaterialParams};
    use crate::scene::PartId;

    /// Uploads each material as a uniform buffer.
    pub struct WgpuMaterialFactory {
        device: wgpu::Device,
        buffers: HashMap<MaterialHandle, wgpu::Buffer>,
        next: u64,
    }

    impl WgpuMaterialFactory {
        pub fn new(device: wgpu::Device) -> Self {
            Self {
                device,
                buffers: HashMap::new(),
                next: 0,
            }
        }

        pub fn buffer(&self, handle: MaterialHandle) -> Option<&wgpu::Buffer> {
            self.buffers.get(&handle)
        }

        pub fn live_count(&self) -> usize {
            self.buffers.len()
        }
    }

    impl MaterialFactory for WgpuMaterialFactory {
        fn create(&mut self, part: &PartId, params: &MaterialParams) -> Result<MaterialHandle> {
            let uniform = params.uniform();
            let label = format!("Material {}", part);

            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&label),
                contents: bytemuck::bytes_of(&uniform),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
                buffer.destroy();
                return Err(anyhow!("Failed to create material buffer for '{}': {}", part, err));
            }

            self.next += 1;
            let handle = MaterialHandle(self.next);
            self.buffers.insert(handle, buffer);
            Ok(handle)
        }

        fn release(&mut self, handle: MaterialHandle) {
            if let Some(buffer) = self.buffers.remove(&handle) {
                buffer.destroy();
            }
        }
    }
}
