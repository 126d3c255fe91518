//! Scroll-driven keyframe animation.
//!
//! Each section `i` has a keyframe pose. For a scroll sample the animator
//! computes a target pose by easing the section progress and interpolating
//! from keyframe `i` to keyframe `i + 1` (the last section targets its own
//! keyframe exactly). The rendered pose then approaches the target by a fixed
//! fraction per frame, so jumps between distant sections stay continuous.
//!
//! Keyframes are built from unscaled templates and per-width
//! [`ResponsiveFactors`]: the scale factor applies to uniform scale and
//! vertical position, the position factor to horizontal and depth position.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::scroll::ScrollState;

pub const DEFAULT_SMOOTHING: f32 = 0.15;
pub const DEFAULT_SNAP_EPSILON: f32 = 1e-4;

/// Model pose: position, Euler rotation (radians) and uniform scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
}

pub type Keyframe = Pose;

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
        }
    }
}

impl Pose {
    pub fn lerp(&self, other: &Pose, t: f32) -> Pose {
        Pose {
            position: self.position.lerp(other.position, t),
            rotation: self.rotation.lerp(other.rotation, t),
            scale: self.scale + (other.scale - self.scale) * t,
        }
    }

    /// Move each field `factor` of the way toward `target`, snapping
    /// components that end up within `epsilon`.
    pub fn approach(&self, target: &Pose, factor: f32, epsilon: f32) -> Pose {
        Pose {
            position: approach_vec3(self.position, target.position, factor, epsilon),
            rotation: approach_vec3(self.rotation, target.rotation, factor, epsilon),
            scale: approach_f32(self.scale, target.scale, factor, epsilon),
        }
    }
}

fn approach_f32(current: f32, target: f32, factor: f32, epsilon: f32) -> f32 {
    let next = current + (target - current) * factor;
    if (target - next).abs() <= epsilon {
        target
    } else {
        next
    }
}

fn approach_vec3(current: Vec3, target: Vec3, factor: f32, epsilon: f32) -> Vec3 {
    Vec3::new(
        approach_f32(current.x, target.x, factor, epsilon),
        approach_f32(current.y, target.y, factor, epsilon),
        approach_f32(current.z, target.z, factor, epsilon),
    )
}

/// Cubic ease-in-out on `[0, 1]`.
pub fn ease_in_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

// ============================================================================
// Keyframe templates
// ============================================================================

/// Unscaled keyframe, as authored for a wide viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyframeTemplate {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
}

impl KeyframeTemplate {
    pub const fn new(position: [f32; 3], rotation: [f32; 3], scale: f32) -> Self {
        Self {
            position: Vec3::from_array(position),
            rotation: Vec3::from_array(rotation),
            scale,
        }
    }

    pub fn build(&self, factors: ResponsiveFactors) -> Keyframe {
        Keyframe {
            position: Vec3::new(
                self.position.x * factors.position,
                self.position.y * factors.scale,
                self.position.z * factors.position,
            ),
            rotation: self.rotation,
            scale: self.scale * factors.scale,
        }
    }
}

/// The ten-section ring tour.
pub fn default_templates() -> Vec<KeyframeTemplate> {
    vec![
        KeyframeTemplate::new([0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 2.0),
        KeyframeTemplate::new([0.0, 0.8, 0.0], [1.57, 0.0, 0.0], 3.2),
        KeyframeTemplate::new([-1.0, 0.0, 0.0], [1.26, 0.0, 0.63], 3.2),
        KeyframeTemplate::new([-3.0, 0.0, 0.0], [0.0, -1.31, -0.63], 2.6),
        KeyframeTemplate::new([1.5, 0.0, 0.0], [1.26, 3.14, 0.63], 3.2),
        KeyframeTemplate::new([3.0, 0.0, 0.0], [0.0, -1.75, -0.63], 2.6),
        KeyframeTemplate::new([0.0, 1.8, 0.0], [0.52, 0.79, 0.0], 4.5),
        KeyframeTemplate::new([-2.0, -0.5, 0.0], [1.05, -1.05, 0.52], 3.0),
        KeyframeTemplate::new([0.0, 0.0, 0.0], [0.79, 4.71, 0.0], 2.8),
        KeyframeTemplate::new([0.0, -0.2, 0.0], [0.39, 1.05, -0.26], 2.5),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponsiveFactors {
    pub scale: f32,
    pub position: f32,
}

impl Default for ResponsiveFactors {
    fn default() -> Self {
        Self {
            scale: 1.0,
            position: 1.0,
        }
    }
}

/// Factors applied below `max_width` (exclusive). `None` matches any width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponsiveBreakpoint {
    pub max_width: Option<u32>,
    pub factors: ResponsiveFactors,
}

pub fn default_responsive() -> Vec<ResponsiveBreakpoint> {
    vec![
        ResponsiveBreakpoint {
            max_width: Some(640),
            factors: ResponsiveFactors { scale: 0.4, position: 0.35 },
        },
        ResponsiveBreakpoint {
            max_width: Some(1024),
            factors: ResponsiveFactors { scale: 0.6, position: 0.5 },
        },
        ResponsiveBreakpoint {
            max_width: None,
            factors: ResponsiveFactors::default(),
        },
    ]
}

/// First breakpoint matching `width`; identity factors if none match.
pub fn responsive_factors(width: u32, breakpoints: &[ResponsiveBreakpoint]) -> ResponsiveFactors {
    breakpoints
        .iter()
        .find(|b| b.max_width.map_or(true, |max| width < max))
        .map(|b| b.factors)
        .unwrap_or_default()
}

pub fn build_keyframes(templates: &[KeyframeTemplate], factors: ResponsiveFactors) -> Vec<Keyframe> {
    templates.iter().map(|t| t.build(factors)).collect()
}

// ============================================================================
// Animator
// ============================================================================

/// Latest sample together with the target and rendered poses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnimationState {
    pub section_index: usize,
    pub progress: f32,
    pub target: Pose,
    pub rendered: Pose,
}

pub struct KeyframeAnimator {
    keyframes: Vec<Keyframe>,
    smoothing: f32,
    snap_epsilon: f32,
    state: AnimationState,
}

impl KeyframeAnimator {
    /// Starts at rest on the first keyframe. An empty keyframe list is
    /// replaced by a single default pose.
    pub fn new(keyframes: Vec<Keyframe>, smoothing: f32, snap_epsilon: f32) -> Self {
        let keyframes = if keyframes.is_empty() {
            log::warn!("No keyframes supplied, animating a single default pose");
            vec![Pose::default()]
        } else {
            keyframes
        };
        let start = keyframes[0];
        Self {
            keyframes,
            smoothing: smoothing.clamp(0.0, 1.0),
            snap_epsilon: snap_epsilon.max(0.0),
            state: AnimationState {
                section_index: 0,
                progress: 0.0,
                target: start,
                rendered: start,
            },
        }
    }

    /// Target pose for a sample. Sections past the last keyframe clamp to it.
    pub fn target_pose(&self, sample: ScrollState) -> Pose {
        let last = self.keyframes.len() - 1;
        let index = sample.section_index.min(last);
        if index == last {
            return self.keyframes[last];
        }
        let t = ease_in_out_cubic(sample.progress);
        self.keyframes[index].lerp(&self.keyframes[index + 1], t)
    }

    /// Accept a new scroll sample. Only the target changes; the rendered pose
    /// keeps approaching from wherever it is.
    pub fn set_sample(&mut self, sample: ScrollState) {
        let last = self.keyframes.len() - 1;
        self.state.section_index = sample.section_index.min(last);
        self.state.progress = sample.progress;
        self.state.target = self.target_pose(sample);
    }

    /// Advance the rendered pose one frame toward the target.
    pub fn tick(&mut self) -> Pose {
        self.state.rendered = self
            .state
            .rendered
            .approach(&self.state.target, self.smoothing, self.snap_epsilon);
        self.state.rendered
    }

    /// Replace the keyframes (e.g. after a responsive breakpoint change) and
    /// retarget the current sample.
    pub fn set_keyframes(&mut self, keyframes: Vec<Keyframe>) {
        if keyframes.is_empty() {
            log::warn!("Ignoring empty keyframe update");
            return;
        }
        self.keyframes = keyframes;
        let sample = ScrollState {
            section_index: self.state.section_index,
            progress: self.state.progress,
        };
        self.set_sample(sample);
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn state(&self) -> &AnimationState {
        &self.state
    }

    pub fn is_settled(&self) -> bool {
        self.state.rendered == self.state.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn animator() -> KeyframeAnimator {
        let keyframes = build_keyframes(&default_templates(), ResponsiveFactors::default());
        KeyframeAnimator::new(keyframes, DEFAULT_SMOOTHING, DEFAULT_SNAP_EPSILON)
    }

    fn sample(section_index: usize, progress: f32) -> ScrollState {
        ScrollState { section_index, progress }
    }

    #[test]
    fn test_easing_endpoints() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        assert_abs_diff_eq!(ease_in_out_cubic(0.5), 0.5);
        assert_abs_diff_eq!(ease_in_out_cubic(0.25), 0.0625);
        assert_abs_diff_eq!(ease_in_out_cubic(0.75), 0.9375);
    }

    #[test]
    fn test_easing_is_monotone() {
        let mut last = 0.0;
        for i in 0..=100 {
            let v = ease_in_out_cubic(i as f32 / 100.0);
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn test_terminal_section_targets_last_keyframe() {
        let a = animator();
        let last = *a.keyframes().last().unwrap();
        assert_eq!(a.target_pose(sample(9, 0.0)), last);
        assert_eq!(a.target_pose(sample(9, 0.7)), last);
        assert_eq!(a.target_pose(sample(42, 0.3)), last);
    }

    #[test]
    fn test_target_interpolates_with_easing() {
        let a = animator();
        let k = a.keyframes();
        let mid = a.target_pose(sample(1, 0.5));
        let expected = k[1].lerp(&k[2], 0.5);
        assert_abs_diff_eq!(mid.position.x, expected.position.x, epsilon = 1e-6);
        assert_abs_diff_eq!(mid.scale, 3.2, epsilon = 1e-6);

        let quarter = a.target_pose(sample(0, 0.25));
        assert_abs_diff_eq!(quarter.scale, 2.0 + 1.2 * 0.0625, epsilon = 1e-6);
    }

    #[test]
    fn test_single_tick_moves_fraction() {
        let mut a = animator();
        let p0 = a.state().rendered;
        a.set_sample(sample(1, 0.0));
        let p1 = a.state().target;
        let next = a.tick();
        assert_abs_diff_eq!(next.scale, p0.scale + 0.15 * (p1.scale - p0.scale), epsilon = 1e-6);
        assert_abs_diff_eq!(
            next.rotation.x,
            p0.rotation.x + 0.15 * (p1.rotation.x - p0.rotation.x),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_converges_exactly() {
        let mut a = animator();
        a.set_sample(sample(6, 0.0));
        let target = a.state().target;
        for _ in 0..200 {
            a.tick();
        }
        assert!(a.is_settled());
        assert_eq!(a.state().rendered, target);
    }

    #[test]
    fn test_jump_does_not_teleport() {
        let mut a = animator();
        a.set_sample(sample(8, 0.0));
        let first = a.tick();
        let target = a.state().target;
        // One step from keyframe 0, not the far target.
        assert_abs_diff_eq!(first.rotation.y, 0.15 * target.rotation.y, epsilon = 1e-5);
    }

    #[test]
    fn test_responsive_factors() {
        let bps = default_responsive();
        assert_eq!(responsive_factors(375, &bps).scale, 0.4);
        assert_eq!(responsive_factors(640, &bps).scale, 0.6);
        assert_eq!(responsive_factors(1023, &bps).position, 0.5);
        assert_eq!(responsive_factors(1920, &bps), ResponsiveFactors::default());
        assert_eq!(responsive_factors(500, &[]), ResponsiveFactors::default());
    }

    #[test]
    fn test_build_keyframes_scales_axes() {
        let factors = ResponsiveFactors { scale: 0.4, position: 0.35 };
        let k = build_keyframes(&default_templates(), factors);
        assert_abs_diff_eq!(k[3].position.x, -3.0 * 0.35, epsilon = 1e-6);
        assert_abs_diff_eq!(k[1].position.y, 0.8 * 0.4, epsilon = 1e-6);
        assert_abs_diff_eq!(k[6].scale, 4.5 * 0.4, epsilon = 1e-6);
        assert_eq!(k[4].rotation, Vec3::new(1.26, 3.14, 0.63));
    }

    #[test]
    fn test_set_keyframes_keeps_rendered_pose() {
        let mut a = animator();
        a.set_sample(sample(2, 0.5));
        a.tick();
        let rendered = a.state().rendered;
        let small = build_keyframes(&default_templates(), ResponsiveFactors { scale: 0.4, position: 0.35 });
        a.set_keyframes(small);
        assert_eq!(a.state().rendered, rendered);
        assert_eq!(a.state().target, a.target_pose(sample(2, 0.5)));
    }

    #[test]
    fn test_empty_keyframes() {
        let mut a = KeyframeAnimator::new(Vec::new(), 0.15, 1e-4);
        a.set_sample(sample(3, 0.5));
        assert_eq!(a.tick(), Pose::default());
    }
}
