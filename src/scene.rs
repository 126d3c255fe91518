//! Scene parts.
//!
//! A [`SceneAssetProvider`] yields the raw named nodes of a loaded asset.
//! [`collect_parts`] turns them into the immutable [`Part`] list the rest of
//! the core works on: nodes without geometry and duplicate names are dropped
//! (with a warning), and each part's class and size class are derived from its
//! name unless the asset states the class explicitly.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::quality::{PartClass, SizeClass};

/// Stable identifier of a part for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(String);

impl PartId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque reference to geometry owned by the asset provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeometryHandle(pub u32);

/// Position, Euler rotation (radians) and per-axis scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

/// A node as reported by the asset provider, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub name: String,
    /// Explicit class; derived from the name when absent.
    #[serde(default)]
    pub class: Option<PartClass>,
    #[serde(default)]
    pub geometry: Option<GeometryHandle>,
    #[serde(default)]
    pub base_transform: Transform,
}

/// A renderable part of the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Part {
    pub id: PartId,
    pub class: PartClass,
    pub size_class: SizeClass,
    pub geometry: GeometryHandle,
    pub base_transform: Transform,
}

/// Source of scene nodes, read once after the asset has loaded.
pub trait SceneAssetProvider {
    fn scene_nodes(&self) -> Result<Vec<SceneNode>>;
}

impl SceneAssetProvider for Vec<SceneNode> {
    fn scene_nodes(&self) -> Result<Vec<SceneNode>> {
        Ok(self.clone())
    }
}

// ============================================================================
// Name heuristics
// ============================================================================

const PEARL_KEYWORDS: &[&str] = &["pearl"];
const STONE_KEYWORDS: &[&str] = &["stone", "diamond", "gem", "ruby", "sapphire", "emerald"];
const MAIN_KEYWORDS: &[&str] = &["main", "center", "centre"];
const SMALL_KEYWORDS: &[&str] = &["side", "accent", "pave", "small", "mini", "pearl"];

fn contains_any(name: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| name.contains(k))
}

/// Material class implied by a node name. Anything unrecognised is metal.
pub fn classify_part(name: &str) -> PartClass {
    let name = name.to_ascii_lowercase();
    if contains_any(&name, PEARL_KEYWORDS) {
        PartClass::Pearl
    } else if contains_any(&name, STONE_KEYWORDS) {
        PartClass::Stone
    } else {
        PartClass::Metal
    }
}

/// Size class implied by a node name.
pub fn classify_size(name: &str) -> SizeClass {
    let name = name.to_ascii_lowercase();
    if contains_any(&name, MAIN_KEYWORDS) {
        SizeClass::Main
    } else if contains_any(&name, SMALL_KEYWORDS) {
        SizeClass::Small
    } else {
        SizeClass::Medium
    }
}

/// Validate raw nodes into parts.
///
/// Order is preserved. A node without geometry, or whose name repeats an
/// earlier part, is excluded without affecting the others.
pub fn collect_parts(nodes: Vec<SceneNode>) -> Vec<Part> {
    let mut seen = HashSet::new();
    let mut parts = Vec::with_capacity(nodes.len());

    for node in nodes {
        let Some(geometry) = node.geometry else {
            log::warn!("Scene node '{}' has no geometry, skipping", node.name);
            continue;
        };
        if !seen.insert(node.name.clone()) {
            log::warn!("Duplicate scene node '{}', keeping the first", node.name);
            continue;
        }

        let class = node.class.unwrap_or_else(|| classify_part(&node.name));
        let size_class = classify_size(&node.name);
        log::debug!("Part '{}': {:?}/{:?}", node.name, class, size_class);

        parts.push(Part {
            id: PartId::new(node.name),
            class,
            size_class,
            geometry,
            base_transform: node.base_transform,
        });
    }

    parts
}

/// Read a provider once and collect its parts.
pub fn load_parts(provider: &dyn SceneAssetProvider) -> Result<Vec<Part>> {
    let nodes = provider.scene_nodes().context("Failed to read scene nodes")?;
    let total = nodes.len();
    let parts = collect_parts(nodes);
    log::info!("Loaded {} parts ({} nodes)", parts.len(), total);
    Ok(parts)
}

// ============================================================================
// Providers
// ============================================================================

/// Scene nodes from a Wavefront OBJ file, one node per object/group.
///
/// Each node's base position is the centre of its bounding box; the geometry
/// handle is the model's index in the file. Objects with no vertices are
/// reported without geometry.
#[derive(Debug, Clone)]
pub struct ObjSceneProvider {
    nodes: Vec<SceneNode>,
}

impl ObjSceneProvider {
    fn load_options() -> tobj::LoadOptions {
        tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        }
    }

    pub fn from_obj_str(content: &str) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(content.as_bytes());
        let (models, _materials) = tobj::load_obj_buf(&mut cursor, &Self::load_options(), |_| {
            Ok((vec![], HashMap::new()))
        })
        .context("Failed to parse OBJ")?;
        Ok(Self::from_models(&models))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let (models, _materials) = tobj::load_obj(path, &Self::load_options())
            .with_context(|| format!("Failed to load OBJ {}", path.display()))?;
        Ok(Self::from_models(&models))
    }

    fn from_models(models: &[tobj::Model]) -> Self {
        let nodes = models
            .iter()
            .enumerate()
            .map(|(i, model)| {
                let positions = &model.mesh.positions;
                let geometry = (!positions.is_empty()).then_some(GeometryHandle(i as u32));
                SceneNode {
                    name: model.name.clone(),
                    class: None,
                    geometry,
                    base_transform: Transform {
                        position: bounds_center(positions),
                        ..Default::default()
                    },
                }
            })
            .collect();
        Self { nodes }
    }
}

impl SceneAssetProvider for ObjSceneProvider {
    fn scene_nodes(&self) -> Result<Vec<SceneNode>> {
        Ok(self.nodes.clone())
    }
}

fn bounds_center(positions: &[f32]) -> Vec3 {
    if positions.len() < 3 {
        return Vec3::ZERO;
    }
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for p in positions.chunks_exact(3) {
        let v = Vec3::new(p[0], p[1], p[2]);
        min = min.min(v);
        max = max.max(v);
    }
    (min + max) * 0.5
}

/// Scene nodes listed in a JSON array of [`SceneNode`].
#[derive(Debug, Clone)]
pub struct JsonSceneProvider {
    nodes: Vec<SceneNode>,
}

impl JsonSceneProvider {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let nodes = serde_json::from_str(json).context("Failed to parse scene JSON")?;
        Ok(Self { nodes })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene {}", path.display()))?;
        Self::from_json_str(&json)
    }
}

impl SceneAssetProvider for JsonSceneProvider {
    fn scene_nodes(&self) -> Result<Vec<SceneNode>> {
        Ok(self.nodes.clone())
    }
}

/// A small ring used when no scene is supplied: a band, a centre diamond,
/// two side stones and a pearl accent.
pub fn demo_ring() -> Vec<SceneNode> {
    ["band", "center_diamond", "side_stone_left", "side_stone_right", "pearl_accent"]
        .iter()
        .enumerate()
        .map(|(i, name)| SceneNode {
            name: name.to_string(),
            class: None,
            geometry: Some(GeometryHandle(i as u32)),
            base_transform: Transform::default(),
        })
        .collect()
}
