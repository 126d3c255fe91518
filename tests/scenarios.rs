//! End-to-end scenarios over the public API.
//!
//! Run with: cargo test --test scenarios

use approx::assert_abs_diff_eq;
use showcase::animator::{build_keyframes, default_templates, KeyframeAnimator, ResponsiveFactors};
use showcase::capability::{DeviceTier, GpuScore};
use showcase::quality::{PartClass, QualityResolver, SizeClass};
use showcase::scroll::{ScrollState, ScrollStateMapper};

#[test]
fn test_strongest_device_gets_best_stone_profile() {
    let resolver = QualityResolver::default();
    let best = resolver.resolve_clamped(1, 5, PartClass::Stone, SizeClass::Main);
    assert!(!best.use_fallback);

    for tier in DeviceTier::all() {
        for score in GpuScore::all() {
            for size in SizeClass::ALL {
                let other = resolver.resolve(tier, score, PartClass::Stone, size);
                assert!(other.resolution <= best.resolution);
                assert!(other.samples <= best.samples);
            }
        }
    }
}

#[test]
fn test_weakest_device_falls_back_for_all_stones() {
    let resolver = QualityResolver::default();
    for size in SizeClass::ALL {
        let profile = resolver.resolve_clamped(5, 1, PartClass::Stone, size);
        assert!(profile.use_fallback, "{:?}", size);
    }
}

#[test]
fn test_scroll_offset_maps_to_section_and_progress() {
    let mut mapper = ScrollStateMapper::new();
    let state = mapper.map(250, 100, 10);
    assert_eq!(state.section_index, 2);
    assert_abs_diff_eq!(state.progress, 0.5);
}

#[test]
fn test_mapper_bounds_hold_across_offsets() {
    let mut mapper = ScrollStateMapper::new();
    for offset in (-500..5_000).step_by(37) {
        let s = mapper.map(offset, 333, 7);
        assert!(s.section_index < 7);
        assert!((0.0..1.0).contains(&s.progress));
    }
}

#[test]
fn test_one_tick_moves_fifteen_percent() {
    let keyframes = build_keyframes(&default_templates(), ResponsiveFactors::default());
    let mut animator = KeyframeAnimator::new(keyframes, 0.15, 1e-4);
    let p0 = animator.state().rendered;
    animator.set_sample(ScrollState { section_index: 4, progress: 0.3 });
    let p1 = animator.state().target;

    let next = animator.tick();
    let expected = p0.position + (p1.position - p0.position) * 0.15;
    assert_abs_diff_eq!(next.position.x, expected.x, epsilon = 1e-5);
    assert_abs_diff_eq!(next.position.y, expected.y, epsilon = 1e-5);
    assert_abs_diff_eq!(next.rotation.y, p0.rotation.y + 0.15 * (p1.rotation.y - p0.rotation.y), epsilon = 1e-5);
    assert_abs_diff_eq!(next.scale, p0.scale + 0.15 * (p1.scale - p0.scale), epsilon = 1e-5);
}

#[test]
fn test_last_section_converges_without_drift() {
    let keyframes = build_keyframes(&default_templates(), ResponsiveFactors::default());
    let last = *keyframes.last().unwrap();
    let mut animator = KeyframeAnimator::new(keyframes, 0.15, 1e-4);
    animator.set_sample(ScrollState { section_index: 9, progress: 0.83 });

    for _ in 0..300 {
        animator.tick();
    }
    assert_eq!(animator.state().rendered, last);
    // Further ticks stay put.
    assert_eq!(animator.tick(), last);
}
