//! Frame-in-flight slots and the per-frame context.
//!
//! # Overview
//!
//! - [`FrameSlots`] owns the N recording slots created at start-up and hands
//!   out submission serials
//! - [`FrameCtx`] is what every recording-thread operation receives: the
//!   command recorder, the render-target registry and the frame's indices
//!
//! # Example
//!
//! ```no_run
//! use vkframe_renderer::frame::{FrameCtx, FrameSlots};
//! use vkframe_renderer::render_target::RenderTargetRegistry;
//! use vkframe_rhi::recorder::NullRecorder;
//!
//! # fn example(targets: &impl RenderTargetRegistry) {
//! let mut slots = FrameSlots::new(2);
//! let mut recorder = NullRecorder;
//!
//! let slot = slots.acquire();
//! let ctx = FrameCtx::new(&mut recorder, targets, slot, 0, slots.next_serial());
//! // ... record through ctx ...
//! # drop(ctx);
//! let serial = slots.submit();
//! # let _ = serial;
//! # }
//! ```

use tracing::{debug, warn};

use vkframe_rhi::recorder::CommandRecorder;

use crate::deferred_release::Serial;
use crate::frame_lifecycle::FrameIndex;
use crate::render_target::RenderTargetRegistry;

/// One pre-allocated recording context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameSlot {
    /// Slot index.
    pub index: FrameIndex,
    /// Slot is currently recording.
    pub recording: bool,
    /// Serial of the last submission recorded in this slot.
    pub submit_serial: Option<Serial>,
}

/// Round-robin set of frame slots.
#[derive(Debug, Clone)]
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    current: usize,
    next_serial: Serial,
    last_submitted: Option<Serial>,
}

impl FrameSlots {
    /// Creates `count` slots (at least one).
    pub fn new(count: u32) -> Self {
        let count = count.max(1);
        Self {
            slots: (0..count)
                .map(|index| FrameSlot {
                    index,
                    ..Default::default()
                })
                .collect(),
            current: 0,
            next_serial: 1,
            last_submitted: None,
        }
    }

    /// Starts handing out serials at `serial` instead of 1, e.g. to resume
    /// from a timeline semaphore's counter.
    pub fn with_first_serial(mut self, serial: Serial) -> Self {
        self.next_serial = serial;
        self
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; there is at least one slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the slot the next frame records into.
    #[inline]
    pub fn current_index(&self) -> FrameIndex {
        self.slots[self.current].index
    }

    /// Returns a slot by index.
    pub fn slot(&self, index: FrameIndex) -> Option<&FrameSlot> {
        self.slots.get(index as usize)
    }

    /// Serial the next [`submit`](Self::submit) will assign.
    #[inline]
    pub fn next_serial(&self) -> Serial {
        self.next_serial
    }

    /// Serial of the most recent submission, if any.
    #[inline]
    pub fn last_submitted(&self) -> Option<Serial> {
        self.last_submitted
    }

    /// Serial that must complete before `index` can be recorded again.
    pub fn serial_to_wait(&self, index: FrameIndex) -> Option<Serial> {
        self.slot(index).and_then(|slot| slot.submit_serial)
    }

    /// Marks the current slot recording and returns its index.
    pub fn acquire(&mut self) -> FrameIndex {
        let slot = &mut self.slots[self.current];
        if slot.recording {
            warn!("Frame slot {} acquired while still recording", slot.index);
        }
        slot.recording = true;
        slot.index
    }

    /// Tags the current slot with the next serial and advances to the
    /// following slot. Returns the serial.
    pub fn submit(&mut self) -> Serial {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1);

        let slot = &mut self.slots[self.current];
        slot.recording = false;
        slot.submit_serial = Some(serial);
        self.last_submitted = Some(serial);
        debug!("Frame slot {} submitted with serial {}", slot.index, serial);

        self.current = (self.current + 1) % self.slots.len();
        serial
    }
}

/// Explicit per-frame context passed to every recording operation.
pub struct FrameCtx<'a, R: CommandRecorder, T: RenderTargetRegistry> {
    /// Recorder for this frame's command buffer.
    pub recorder: &'a mut R,
    /// Host render-target images.
    pub targets: &'a T,
    /// Frame-in-flight slot.
    pub frame_index: FrameIndex,
    /// Acquired swapchain image.
    pub image_index: u32,
    /// Serial this frame's submission will carry.
    pub serial: Serial,
}

impl<'a, R: CommandRecorder, T: RenderTargetRegistry> FrameCtx<'a, R, T> {
    /// Bundles the frame's collaborators.
    pub fn new(
        recorder: &'a mut R,
        targets: &'a T,
        frame_index: FrameIndex,
        image_index: u32,
        serial: Serial,
    ) -> Self {
        Self {
            recorder,
            targets,
            frame_index,
            image_index,
            serial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_round_robin() {
        let mut slots = FrameSlots::new(2);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.acquire(), 0);
        assert_eq!(slots.submit(), 1);
        assert_eq!(slots.acquire(), 1);
        assert_eq!(slots.submit(), 2);
        assert_eq!(slots.acquire(), 0);
        assert_eq!(slots.serial_to_wait(0), Some(1));
        assert_eq!(slots.serial_to_wait(1), Some(2));
    }

    #[test]
    fn test_zero_slots_clamps_to_one() {
        let slots = FrameSlots::new(0);
        assert_eq!(slots.len(), 1);
        assert!(!slots.is_empty());
    }

    #[test]
    fn test_recording_flag() {
        let mut slots = FrameSlots::new(3);
        let index = slots.acquire();
        assert!(slots.slot(index).is_some_and(|s| s.recording));
        slots.submit();
        assert!(slots.slot(index).is_some_and(|s| !s.recording));
    }

    #[test]
    fn test_last_submitted() {
        let mut slots = FrameSlots::new(2);
        assert_eq!(slots.last_submitted(), None);
        assert_eq!(slots.serial_to_wait(0), None);
        slots.acquire();
        slots.submit();
        assert_eq!(slots.last_submitted(), Some(1));
        assert_eq!(slots.next_serial(), 2);
    }

    #[test]
    fn test_last_submitted_across_wrap() {
        let mut slots = FrameSlots::new(2).with_first_serial(u32::MAX);
        assert_eq!(slots.last_submitted(), None);
        slots.acquire();
        assert_eq!(slots.submit(), u32::MAX);
        slots.acquire();
        assert_eq!(slots.submit(), 0);
        assert_eq!(slots.next_serial(), 1);
        assert_eq!(slots.last_submitted(), Some(0));
        assert_eq!(slots.serial_to_wait(0), Some(u32::MAX));
    }
}
