//! Frame-boundary coalescing of viewport events.
//!
//! Scroll and resize events can arrive many times per frame. They are folded
//! into a single pending slot: a newer event of the same kind replaces the
//! older one, and the slot is drained once at the next frame boundary.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ViewportEvent {
    Scroll { offset: i64 },
    Resize { width: u32, height: u32 },
}

/// Work to run at the next frame boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingWork {
    pub scroll: Option<i64>,
    pub resize: Option<(u32, u32)>,
}

#[derive(Debug, Default)]
pub struct FrameCoalescer {
    pending: Option<PendingWork>,
    dropped: u64,
}

impl FrameCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ViewportEvent) {
        let work = self.pending.get_or_insert_with(PendingWork::default);
        let replaced = match event {
            ViewportEvent::Scroll { offset } => work.scroll.replace(offset).is_some(),
            ViewportEvent::Resize { width, height } => work.resize.replace((width, height)).is_some(),
        };
        if replaced {
            self.dropped += 1;
        }
    }

    /// Drain the pending slot at a frame boundary.
    pub fn take(&mut self) -> Option<PendingWork> {
        self.pending.take()
    }

    /// Discard pending work. Returns whether anything was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Events superseded before they were processed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_event_wins() {
        let mut c = FrameCoalescer::new();
        for offset in [10, 20, 30] {
            c.push(ViewportEvent::Scroll { offset });
        }
        let work = c.take().unwrap();
        assert_eq!(work.scroll, Some(30));
        assert_eq!(work.resize, None);
        assert_eq!(c.dropped(), 2);
        assert!(c.take().is_none());
    }

    #[test]
    fn test_scroll_and_resize_share_slot() {
        let mut c = FrameCoalescer::new();
        c.push(ViewportEvent::Resize { width: 800, height: 600 });
        c.push(ViewportEvent::Scroll { offset: 5 });
        c.push(ViewportEvent::Resize { width: 1280, height: 720 });
        let work = c.take().unwrap();
        assert_eq!(work.resize, Some((1280, 720)));
        assert_eq!(work.scroll, Some(5));
    }

    #[test]
    fn test_cancel() {
        let mut c = FrameCoalescer::new();
        assert!(!c.cancel());
        c.push(ViewportEvent::Scroll { offset: 1 });
        assert!(c.is_pending());
        assert!(c.cancel());
        assert!(!c.is_pending());
    }

    #[test]
    fn test_event_json() {
        let e: ViewportEvent = serde_json::from_str(r#"{"type":"resize","width":390,"height":844}"#).unwrap();
        assert_eq!(e, ViewportEvent::Resize { width: 390, height: 844 });
    }
}
