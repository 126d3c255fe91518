//! Scroll offset to `(section, progress)` mapping.

use serde::{Deserialize, Serialize};

/// Largest progress value reported; progress never reaches 1.0.
const MAX_PROGRESS: f32 = 1.0 - f32::EPSILON;

/// Position within the section sequence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollState {
    pub section_index: usize,
    /// Fraction of the current section scrolled, in `[0, 1)`.
    pub progress: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    #[default]
    Idle,
}

/// Pure mapping. Returns `None` when the viewport height is not positive.
///
/// Negative offsets clamp to 0 and a section count of 0 behaves as 1.
pub fn map_offset(offset: i64, viewport_height: i64, section_count: usize) -> Option<ScrollState> {
    if viewport_height <= 0 {
        return None;
    }
    let offset = offset.max(0);
    let last = section_count.max(1) - 1;

    let index = usize::try_from(offset / viewport_height).unwrap_or(usize::MAX);
    let progress = (offset % viewport_height) as f64 / viewport_height as f64;

    Some(ScrollState {
        section_index: index.min(last),
        progress: (progress as f32).min(MAX_PROGRESS),
    })
}

/// Stateful mapper remembering the last valid state and scroll direction.
#[derive(Debug, Clone, Default)]
pub struct ScrollStateMapper {
    state: ScrollState,
    last_offset: Option<i64>,
    direction: ScrollDirection,
}

impl ScrollStateMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a scroll sample. An invalid viewport height keeps the previous
    /// state (and direction) unchanged.
    pub fn map(&mut self, offset: i64, viewport_height: i64, section_count: usize) -> ScrollState {
        let Some(state) = map_offset(offset, viewport_height, section_count) else {
            log::debug!("Ignoring scroll sample with viewport height {}", viewport_height);
            return self.state;
        };

        if let Some(last) = self.last_offset {
            if offset > last {
                self.direction = ScrollDirection::Down;
            } else if offset < last {
                self.direction = ScrollDirection::Up;
            }
        }
        self.last_offset = Some(offset);
        self.state = state;
        state
    }

    pub fn state(&self) -> ScrollState {
        self.state
    }

    pub fn direction(&self) -> ScrollDirection {
        self.direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_basic_mapping() {
        let s = map_offset(250, 100, 10).unwrap();
        assert_eq!(s.section_index, 2);
        assert_abs_diff_eq!(s.progress, 0.5);
    }

    #[test]
    fn test_clamps_to_last_section() {
        let s = map_offset(5_000, 100, 10).unwrap();
        assert_eq!(s.section_index, 9);
        assert!(s.progress < 1.0);
    }

    #[test]
    fn test_negative_offset_and_zero_sections() {
        assert_eq!(map_offset(-40, 100, 10).unwrap(), ScrollState::default());
        assert_eq!(map_offset(350, 100, 0).unwrap().section_index, 0);
    }

    #[test]
    fn test_zero_height_keeps_previous_state() {
        let mut mapper = ScrollStateMapper::new();
        let before = mapper.map(250, 100, 10);
        let after = mapper.map(900, 0, 10);
        assert_eq!(before, after);
        assert_eq!(mapper.map(900, -5, 10), before);
    }

    #[test]
    fn test_idempotent() {
        let mut mapper = ScrollStateMapper::new();
        let a = mapper.map(1234, 720, 10);
        let b = mapper.map(1234, 720, 10);
        assert_eq!(a, b);
        assert_eq!(a, map_offset(1234, 720, 10).unwrap());
    }

    #[test]
    fn test_progress_never_reaches_one() {
        let h = 100_000_000;
        let s = map_offset(h - 1, h, 10).unwrap();
        assert!(s.progress < 1.0);
    }

    #[test]
    fn test_direction() {
        let mut mapper = ScrollStateMapper::new();
        assert_eq!(mapper.direction(), ScrollDirection::Idle);
        mapper.map(100, 100, 10);
        assert_eq!(mapper.direction(), ScrollDirection::Idle);
        mapper.map(300, 100, 10);
        assert_eq!(mapper.direction(), ScrollDirection::Down);
        mapper.map(300, 100, 10);
        assert_eq!(mapper.direction(), ScrollDirection::Down);
        mapper.map(50, 100, 10);
        assert_eq!(mapper.direction(), ScrollDirection::Up);
    }
}
