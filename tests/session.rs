//! Session-level behaviour: probing, coalescing, material lifecycle.
//!
//! Run with: cargo test --test session

use std::sync::Arc;

use anyhow::{bail, Result};
use showcase::animator::{build_keyframes, responsive_factors};
use showcase::capability::RawProbeSignal;
use showcase::config::ViewerConfig;
use showcase::material::{MaterialFactory, MaterialHandle, MaterialKind, MaterialParams, MaterialVariant, ParamsOnlyFactory};
use showcase::probe::{CapabilityProbe, StaticProbe};
use showcase::scene::{demo_ring, GeometryHandle, PartId, SceneNode, Transform};
use showcase::session::ViewerSession;

struct NoProbe;

impl CapabilityProbe for NoProbe {
    fn probe(&self) -> Result<RawProbeSignal> {
        bail!("WebGL unavailable")
    }
}

/// Refuses to build anything for stone parts.
#[derive(Default)]
struct NoStoneFactory {
    inner: ParamsOnlyFactory,
}

impl MaterialFactory for NoStoneFactory {
    fn create(&mut self, part: &PartId, params: &MaterialParams) -> Result<MaterialHandle> {
        if params.kind == MaterialKind::Transmission {
            bail!("transmission pipeline unavailable for {}", part);
        }
        self.inner.create(part, params)
    }

    fn release(&mut self, handle: MaterialHandle) {
        self.inner.release(handle)
    }
}

fn desktop_probe() -> StaticProbe {
    StaticProbe::new(RawProbeSignal {
        width: 1920,
        renderer: Some("ANGLE (NVIDIA, NVIDIA GeForce RTX 3080 Direct3D11)".into()),
        ..Default::default()
    })
}

#[test]
fn test_failed_probe_starts_at_lowest_quality() {
    let mut session =
        ViewerSession::new(ViewerConfig::default(), &NoProbe, &demo_ring(), ParamsOnlyFactory::new()).unwrap();
    assert_eq!(session.signature().device_tier.get(), 5);
    assert_eq!(session.signature().gpu_score.get(), 1);

    let frame = session.frame().unwrap();
    let diamond = frame
        .materials
        .iter()
        .find(|m| m.part_id.as_str() == "center_diamond")
        .unwrap();
    assert_eq!(diamond.material.kind, MaterialKind::OpaqueApproximation);
}

#[test]
fn test_parts_without_geometry_are_skipped() {
    let mut nodes = demo_ring();
    nodes.push(SceneNode {
        name: "empty_locator".into(),
        class: None,
        geometry: None,
        base_transform: Transform::default(),
    });
    nodes.push(SceneNode {
        name: "side_ruby".into(),
        class: None,
        geometry: Some(GeometryHandle(9)),
        base_transform: Transform::default(),
    });

    let mut session =
        ViewerSession::new(ViewerConfig::default(), &desktop_probe(), &nodes, ParamsOnlyFactory::new()).unwrap();
    assert_eq!(session.parts().len(), 6);
    assert_eq!(session.frame().unwrap().materials.len(), 6);
}

#[test]
fn test_material_failure_is_isolated_to_one_part() {
    let mut session =
        ViewerSession::new(ViewerConfig::default(), &desktop_probe(), &demo_ring(), NoStoneFactory::default())
            .unwrap();
    let frame = session.frame().unwrap();

    for m in &frame.materials {
        let is_stone = m.profile.part_class == showcase::quality::PartClass::Stone;
        assert_eq!(m.material.is_default_substitute(), is_stone, "{}", m.part_id);
    }
    assert_eq!(session.cache_stats().failures, 3);
}

#[test]
fn test_variant_switch_rebuilds_only_that_class() {
    let mut session =
        ViewerSession::new(ViewerConfig::default(), &desktop_probe(), &demo_ring(), ParamsOnlyFactory::new()).unwrap();
    let before = session.frame().unwrap();

    assert!(session.set_variant(MaterialVariant::BlackPearl));
    let after = session.frame().unwrap();

    for (a, b) in before.materials.iter().zip(after.materials.iter()) {
        let is_pearl = a.part_id.as_str() == "pearl_accent";
        assert_eq!(!Arc::ptr_eq(&a.material, &b.material), is_pearl, "{}", a.part_id);
    }
    assert_eq!(session.factory().live_count(), 5);
}

#[test]
fn test_scroll_sweep_reaches_last_keyframe() {
    let config = ViewerConfig::default();
    let last = config.animation.keyframes.last().copied().unwrap();
    let mut session = ViewerSession::new(config, &desktop_probe(), &demo_ring(), ParamsOnlyFactory::new()).unwrap();
    session.on_resize(1920, 1000);

    for offset in (0..=9_500).step_by(250) {
        session.on_scroll(offset);
        session.frame();
    }
    let mut pose = session.frame().unwrap().pose;
    for _ in 0..200 {
        pose = session.frame().unwrap().pose;
    }
    assert_eq!(session.animation().section_index, 9);
    assert_eq!(pose.scale, last.scale);
    assert_eq!(pose.rotation, last.rotation);
}

#[test]
fn test_narrow_resize_shrinks_keyframes() {
    let mut session =
        ViewerSession::new(ViewerConfig::default(), &desktop_probe(), &demo_ring(), ParamsOnlyFactory::new()).unwrap();
    session.on_resize(1920, 1000);
    session.on_scroll(6_000);
    session.frame();
    let wide = session.animation().target;

    session.on_resize(390, 844);
    session.frame();
    let narrow = session.animation().target;
    assert!(narrow.scale < wide.scale);
    assert_eq!(session.signature().device_tier.get(), 5);
}

#[test]
fn test_teardown_cancels_and_releases() {
    let mut session =
        ViewerSession::new(ViewerConfig::default(), &desktop_probe(), &demo_ring(), ParamsOnlyFactory::new()).unwrap();
    session.frame();
    session.on_resize(800, 600);
    assert!(session.has_pending_work());

    session.teardown();
    assert!(!session.has_pending_work());
    assert_eq!(session.factory().live_count(), 0);
    assert!(session.frame().is_none());
    session.on_scroll(100);
    assert!(!session.has_pending_work());
}

#[test]
fn test_shortened_keyframes_settle_on_final_pose() {
    let mut config = ViewerConfig::default();
    config.animation.keyframes.truncate(4);
    let expected = build_keyframes(
        &config.animation.keyframes,
        responsive_factors(1920, &config.animation.responsive),
    );

    let mut session = ViewerSession::new(config, &desktop_probe(), &demo_ring(), ParamsOnlyFactory::new()).unwrap();
    assert_eq!(session.section_count(), 4);

    session.on_resize(1920, 100);
    session.on_scroll(350);
    let mut last = None;
    for _ in 0..400 {
        last = session.frame();
    }
    let out = last.unwrap();
    assert_eq!(out.scroll.section_index, 3);
    assert_eq!(session.animation().target, expected[3]);
    assert_eq!(out.pose, expected[3]);
}

#[test]
fn test_section_count_mismatch_is_rejected() {
    let mut config = ViewerConfig::default();
    config.section_count = Some(4);
    let result = ViewerSession::new(config, &desktop_probe(), &demo_ring(), ParamsOnlyFactory::new());
    assert!(result.is_err());
}
