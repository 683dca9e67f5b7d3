//! Recording state across frames.

use tracing::warn;

use crate::error::{RenderError, RenderResult};

/// Index of a frame-in-flight slot.
pub type FrameIndex = u32;

/// Tracks whether a frame is being recorded and which slot it uses.
///
/// Two states: not recording (initial) and recording. `begin` and `end` move
/// between them every frame; nothing is terminal.
#[derive(Debug, Default, Clone)]
pub struct FrameLifecycleTracker {
    recording: bool,
    frame_index: FrameIndex,
    warned_this_frame: bool,
}

impl FrameLifecycleTracker {
    /// Creates a tracker in the not-recording state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks recording active for `frame_index`.
    pub fn begin(&mut self, frame_index: FrameIndex) {
        self.recording = true;
        self.frame_index = frame_index;
        self.warned_this_frame = false;
    }

    /// Marks recording inactive.
    pub fn end(&mut self) {
        self.recording = false;
    }

    /// Returns true while a frame is being recorded.
    #[inline]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Returns the slot being recorded, `None` while not recording.
    #[inline]
    pub fn current_frame_index(&self) -> Option<FrameIndex> {
        self.recording.then_some(self.frame_index)
    }

    /// Same as [`current_frame_index`](Self::current_frame_index), but an
    /// absent frame is an error.
    pub fn require_recording(&self, op: &'static str) -> RenderResult<FrameIndex> {
        self.current_frame_index().ok_or(RenderError::FrameNotRecording(op))
    }

    /// Warns about `op` running outside a frame, at most once per frame.
    ///
    /// Returns true only for the call that emitted the warning.
    pub fn warn_once_if_not_recording(&mut self, op: &str) -> bool {
        if self.recording || self.warned_this_frame {
            return false;
        }
        self.warned_this_frame = true;
        warn!("{} called while no frame is recording", op);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_not_recording() {
        let tracker = FrameLifecycleTracker::new();
        assert!(!tracker.is_recording());
        assert_eq!(tracker.current_frame_index(), None);
    }

    #[test]
    fn test_begin_end_cycle() {
        let mut tracker = FrameLifecycleTracker::new();
        tracker.begin(1);
        assert!(tracker.is_recording());
        assert_eq!(tracker.current_frame_index(), Some(1));

        tracker.end();
        assert!(!tracker.is_recording());
        assert_eq!(tracker.current_frame_index(), None);

        tracker.begin(0);
        assert_eq!(tracker.current_frame_index(), Some(0));
    }

    #[test]
    fn test_require_recording() {
        let mut tracker = FrameLifecycleTracker::new();
        assert!(matches!(
            tracker.require_recording("draw"),
            Err(RenderError::FrameNotRecording("draw"))
        ));
        tracker.begin(2);
        assert_eq!(tracker.require_recording("draw").ok(), Some(2));
    }

    #[test]
    fn test_warn_once_per_frame() {
        let mut tracker = FrameLifecycleTracker::new();
        assert!(tracker.warn_once_if_not_recording("upload"));
        assert!(!tracker.warn_once_if_not_recording("upload"));

        tracker.begin(0);
        assert!(!tracker.warn_once_if_not_recording("upload"));
        tracker.end();

        // begin re-arms the warning
        assert!(tracker.warn_once_if_not_recording("upload"));
    }
}
