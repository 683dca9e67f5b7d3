//! Per-frame linear sub-allocation of transient memory.
//!
//! Each frame slot owns one host-visible buffer. Allocations bump an offset
//! through it and the offset goes back to zero when the slot starts its next
//! frame, which only happens after the GPU finished the slot's previous
//! submission. An allocation never wraps within a frame: once the buffer is
//! full, [`RingAllocator::allocate`] returns `None`.

use tracing::warn;

use crate::frame_lifecycle::FrameIndex;

/// A sub-range handed out by a [`RingAllocator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingAllocation {
    /// Byte offset into the frame's buffer.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
}

/// Bump allocator over one buffer.
#[derive(Clone, Debug)]
pub struct RingAllocator {
    capacity: u64,
    alignment: u64,
    offset: u64,
}

impl RingAllocator {
    /// Creates an allocator over `capacity` bytes. Every allocation is
    /// aligned to at least `alignment`.
    pub fn new(capacity: u64, alignment: u64) -> Self {
        Self {
            capacity,
            alignment: alignment.max(1),
            offset: 0,
        }
    }

    /// Carves `size` bytes aligned to `align`, or to the default alignment
    /// when `align` is `None`.
    ///
    /// Returns `None` when the rest of the buffer cannot hold the request.
    pub fn allocate(&mut self, size: u64, align: Option<u64>) -> Option<RingAllocation> {
        let align = align.unwrap_or(self.alignment).max(1);
        let offset = self.offset.div_ceil(align).checked_mul(align)?;
        let end = offset.checked_add(size)?;
        if end > self.capacity {
            warn!(
                "Ring buffer exhausted: {} bytes requested at offset {} of {}",
                size, offset, self.capacity
            );
            return None;
        }
        self.offset = end;
        Some(RingAllocation { offset, size })
    }

    /// Forgets every allocation.
    #[inline]
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Bytes consumed, padding included.
    #[inline]
    pub fn used(&self) -> u64 {
        self.offset
    }

    /// Bytes left before the allocator is exhausted.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.capacity - self.offset
    }

    /// Size of the backing buffer.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

struct RingFrame<B> {
    buffer: B,
    allocator: RingAllocator,
}

/// One ring buffer per frame slot.
pub struct FrameRing<B> {
    frames: Vec<RingFrame<B>>,
}

impl<B> FrameRing<B> {
    /// Wraps one buffer per frame slot, each `capacity` bytes.
    pub fn new(buffers: Vec<B>, capacity: u64, alignment: u64) -> Self {
        Self {
            frames: buffers
                .into_iter()
                .map(|buffer| RingFrame {
                    buffer,
                    allocator: RingAllocator::new(capacity, alignment),
                })
                .collect(),
        }
    }

    /// Resets the allocator of `slot` at the start of its frame.
    pub fn begin_frame(&mut self, slot: FrameIndex) {
        if let Some(frame) = self.frames.get_mut(slot as usize) {
            frame.allocator.reset();
        }
    }

    /// Allocates from `slot`'s buffer.
    pub fn allocate(
        &mut self,
        slot: FrameIndex,
        size: u64,
        align: Option<u64>,
    ) -> Option<(&B, RingAllocation)> {
        let frame = self.frames.get_mut(slot as usize)?;
        let allocation = frame.allocator.allocate(size, align)?;
        Some((&frame.buffer, allocation))
    }

    /// Buffer owned by `slot`.
    pub fn buffer(&self, slot: FrameIndex) -> Option<&B> {
        self.frames.get(slot as usize).map(|frame| &frame.buffer)
    }

    /// Bytes used in `slot` this frame.
    pub fn used(&self, slot: FrameIndex) -> u64 {
        self.frames
            .get(slot as usize)
            .map_or(0, |frame| frame.allocator.used())
    }

    /// Number of frame slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
