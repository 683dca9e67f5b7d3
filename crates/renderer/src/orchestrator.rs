//! Per-frame control flow.
//!
//! [`FrameOrchestrator`] owns the frame-scoped components and drives them in
//! a fixed order:
//!
//! - `begin_frame(completed)` acquires a frame slot, starts recording,
//!   runs due release closures (deferred queue and buffers), returns aged
//!   bindless slots, assigns slots to pending textures, resets the rendering
//!   session and resets the slot's ring buffer
//! - draws go through [`session_mut`](FrameOrchestrator::session_mut) and
//!   [`push_transient`](FrameOrchestrator::push_transient)
//! - `end_frame(ctx)` closes the session, stops recording and hands out the
//!   frame's submission serial
//!
//! The completed serial comes from the host's submission layer, directly or
//! through a [`SerialSource`] such as the rhi timeline semaphore.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_core::RendererConfig;
//! use vkframe_renderer::buffer_manager::BufferAllocator;
//! use vkframe_renderer::orchestrator::FrameOrchestrator;
//! use vkframe_renderer::render_target::RenderTargetRegistry;
//! use vkframe_rhi::recorder::CommandRecorder;
//!
//! # fn example<A: BufferAllocator, R: CommandRecorder, T: RenderTargetRegistry>(
//! #     allocator: A, recorder: &mut R, targets: &T, completed: u32,
//! # ) -> vkframe_renderer::RenderResult<()> {
//! let mut frames = FrameOrchestrator::new(&RendererConfig::default(), allocator, None)?;
//!
//! let begin = frames.begin_frame(completed)?;
//! let mut ctx = frames.frame_ctx(recorder, targets, 0)?;
//! frames.session_mut().ensure_rendering(&mut ctx)?;
//! // ... draw ...
//! let serial = frames.end_frame(&mut ctx)?;
//! # let _ = (begin, serial);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use glam::Vec4;
use tracing::{debug, info, warn};

use ash::vk;
use vkframe_core::RendererConfig;
use vkframe_rhi::buffer::BufferUsage;
use vkframe_rhi::device::{Device, ExtendedDynamicState3Caps};
use vkframe_rhi::recorder::CommandRecorder;
use vkframe_rhi::sync::SerialSource;

use crate::bindless::{BindlessResidency, SlotAssignment};
use crate::buffer_manager::{BufferAllocator, BufferManager, GpuBufferAllocator};
use crate::deferred_release::{DeferredReleaseQueue, Serial, is_due};
use crate::error::RenderResult;
use crate::frame::{FrameCtx, FrameSlots};
use crate::frame_lifecycle::{FrameIndex, FrameLifecycleTracker};
use crate::render_target::RenderTargetRegistry;
use crate::rendering_session::RenderingSession;
use crate::ring_buffer::FrameRing;
use crate::texture_id::TextureId;

/// Work produced by [`FrameOrchestrator::begin_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBegin {
    /// Slot the frame records into.
    pub frame_index: FrameIndex,
    /// Serial the frame's submission will carry.
    pub serial: Serial,
    /// Release closures and retired buffers destroyed.
    pub released: usize,
    /// Textures that received a bindless slot; write their descriptors.
    pub assignments: Vec<SlotAssignment>,
    /// Retired slots to point at the fallback texture.
    pub fallback_writes: Vec<u32>,
}

/// A range of this frame's transient ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientSlice {
    /// Ring buffer of the current frame slot.
    pub buffer: vk::Buffer,
    /// Byte offset, aligned as requested.
    pub offset: u64,
    /// Bytes written.
    pub size: u64,
}

/// Owner of the frame-scoped components.
pub struct FrameOrchestrator<A: BufferAllocator> {
    slots: FrameSlots,
    tracker: FrameLifecycleTracker,
    releases: DeferredReleaseQueue,
    bindless: BindlessResidency,
    session: RenderingSession,
    buffers: BufferManager<A>,
    ring: FrameRing<A::Buffer>,
    completed: Serial,
}

impl<A: BufferAllocator> FrameOrchestrator<A> {
    /// Builds the frame components from `config`.
    ///
    /// `eds3` is what the device supports; it is used only when the config
    /// enables extended dynamic state 3.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or a ring buffer cannot be
    /// allocated.
    pub fn new(
        config: &RendererConfig,
        mut allocator: A,
        eds3: Option<ExtendedDynamicState3Caps>,
    ) -> RenderResult<Self> {
        config.validate()?;

        let ring_buffers = (0..config.frames_in_flight)
            .map(|_| allocator.allocate(BufferUsage::Transient, config.ring_buffer_size))
            .collect::<RenderResult<Vec<_>>>()?;
        let ring = FrameRing::new(
            ring_buffers,
            config.ring_buffer_size,
            config.ring_buffer_alignment,
        );

        let mut session = RenderingSession::new()
            .with_extended_dynamic_state3(eds3.filter(|_| config.extended_dynamic_state3));
        session.set_clear_color(Vec4::from_array(config.clear_color));

        info!(
            "Frame orchestrator ready: {} frames in flight, release window {}, {} bindless slots",
            config.frames_in_flight, config.release_window, config.max_bindless_textures
        );

        Ok(Self {
            slots: FrameSlots::new(config.frames_in_flight),
            tracker: FrameLifecycleTracker::new(),
            releases: DeferredReleaseQueue::new(config.release_window),
            bindless: BindlessResidency::new(config.max_bindless_textures, config.release_window),
            session,
            buffers: BufferManager::new(allocator, config.release_window),
            ring,
            completed: 0,
        })
    }

    /// Starts the next frame.
    ///
    /// `completed` is the newest serial the GPU has finished. It must not go
    /// backwards between calls.
    pub fn begin_frame(&mut self, completed: Serial) -> RenderResult<FrameBegin> {
        if self.tracker.is_recording() {
            warn!("begin_frame called while a frame is recording; restarting it");
        }

        let frame_index = self.slots.acquire();
        if let Some(wait) = self.slots.serial_to_wait(frame_index) {
            if !is_due(wait, completed, 0) {
                warn!(
                    "Frame slot {} reused before serial {} completed (completed {})",
                    frame_index, wait, completed
                );
            }
        }

        self.tracker.begin(frame_index);
        self.completed = completed;

        let released = self.releases.collect(completed) + self.buffers.collect(completed);
        self.bindless.collect(completed);
        let assignments = self.bindless.process_pending();
        let fallback_writes = self.bindless.take_fallback_writes();

        self.session.begin_frame();
        self.ring.begin_frame(frame_index);

        let serial = self.slots.next_serial();
        debug!(
            "Frame began: slot {}, serial {}, completed {}, {} released, {} textures assigned",
            frame_index,
            serial,
            completed,
            released,
            assignments.len()
        );

        Ok(FrameBegin {
            frame_index,
            serial,
            released,
            assignments,
            fallback_writes,
        })
    }

    /// Starts the next frame with the completed serial read from `source`.
    pub fn begin_frame_from<S: SerialSource + ?Sized>(&mut self, source: &S) -> RenderResult<FrameBegin> {
        let completed = source.completed_serial()?;
        self.begin_frame(completed)
    }

    /// Context for recording the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::FrameNotRecording`](crate::RenderError::FrameNotRecording)
    /// outside a frame.
    pub fn frame_ctx<'a, R, T>(
        &self,
        recorder: &'a mut R,
        targets: &'a T,
        image_index: u32,
    ) -> RenderResult<FrameCtx<'a, R, T>>
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        let frame_index = self.tracker.require_recording("frame_ctx")?;
        Ok(FrameCtx::new(
            recorder,
            targets,
            frame_index,
            image_index,
            self.slots.next_serial(),
        ))
    }

    /// Finishes the frame and returns its submission serial.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::FrameNotRecording`](crate::RenderError::FrameNotRecording)
    /// outside a frame, or the session's error if the swapchain image cannot
    /// be moved to present.
    pub fn end_frame<R, T>(&mut self, ctx: &mut FrameCtx<'_, R, T>) -> RenderResult<Serial>
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        self.tracker.require_recording("end_frame")?;
        self.session.end_frame(ctx)?;
        self.tracker.end();
        let serial = self.slots.submit();
        debug!("Frame ended with serial {}", serial);
        Ok(serial)
    }

    /// Serial that work recorded now will be submitted under.
    #[inline]
    pub fn recording_serial(&self) -> Serial {
        self.slots.next_serial()
    }

    /// Runs `release` once the current frame's serial has aged out.
    pub fn defer_release<F>(&mut self, release: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tracker.warn_once_if_not_recording("defer_release") {
            debug!("Release deferred outside a frame uses serial {}", self.recording_serial());
        }
        let serial = self.recording_serial();
        self.releases.enqueue(serial, release);
    }

    /// Stops sampling `id` through its bindless slot after this frame.
    pub fn retire_texture(&mut self, id: TextureId) -> Option<u32> {
        let serial = self.recording_serial();
        self.bindless.retire(id, serial)
    }

    /// Copies `data` into this frame's ring buffer.
    ///
    /// Returns `Ok(None)` when the ring has no room left this frame.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::FrameNotRecording`](crate::RenderError::FrameNotRecording)
    /// outside a frame, or the allocator's write error.
    pub fn push_transient(&mut self, data: &[u8], align: Option<u64>) -> RenderResult<Option<TransientSlice>> {
        let frame_index = self.tracker.require_recording("push_transient")?;
        let Some((buffer, allocation)) = self.ring.allocate(frame_index, data.len() as u64, align) else {
            return Ok(None);
        };
        self.buffers.allocator().write(buffer, allocation.offset, data)?;
        Ok(Some(TransientSlice {
            buffer: A::handle(buffer),
            offset: allocation.offset,
            size: allocation.size,
        }))
    }

    /// Copies a plain-old-data value, such as a uniform block, into this
    /// frame's ring buffer.
    pub fn push_transient_pod<P: bytemuck::Pod>(&mut self, value: &P) -> RenderResult<Option<TransientSlice>> {
        self.push_transient(bytemuck::bytes_of(value), None)
    }

    /// Destroys everything held back for the GPU. The GPU must be idle.
    pub fn shutdown(&mut self) {
        let closures = self.releases.clear();
        let slots = self.bindless.release_all_retired();
        self.buffers.shutdown();
        self.tracker.end();
        info!(
            "Frame orchestrator shut down ({} deferred releases, {} bindless slots)",
            closures, slots
        );
    }

    // --- accessors ---

    #[inline]
    pub fn session(&self) -> &RenderingSession {
        &self.session
    }

    #[inline]
    pub fn session_mut(&mut self) -> &mut RenderingSession {
        &mut self.session
    }

    #[inline]
    pub fn bindless(&self) -> &BindlessResidency {
        &self.bindless
    }

    #[inline]
    pub fn bindless_mut(&mut self) -> &mut BindlessResidency {
        &mut self.bindless
    }

    #[inline]
    pub fn buffers(&self) -> &BufferManager<A> {
        &self.buffers
    }

    #[inline]
    pub fn buffers_mut(&mut self) -> &mut BufferManager<A> {
        &mut self.buffers
    }

    #[inline]
    pub fn tracker(&self) -> &FrameLifecycleTracker {
        &self.tracker
    }

    #[inline]
    pub fn slots(&self) -> &FrameSlots {
        &self.slots
    }

    /// Extended dynamic state 3 caps the session records with, after the
    /// config gate. Build pipelines with these so the declared dynamic states
    /// match what each draw sets.
    #[inline]
    pub fn extended_dynamic_state3(&self) -> Option<ExtendedDynamicState3Caps> {
        self.session.extended_dynamic_state3()
    }

    /// Release closures still waiting.
    #[inline]
    pub fn pending_releases(&self) -> usize {
        self.releases.len()
    }

    /// Completed serial passed to the latest `begin_frame`.
    #[inline]
    pub fn completed_serial(&self) -> Serial {
        self.completed
    }

    /// Bytes of ring memory used by the current frame.
    pub fn transient_used(&self) -> u64 {
        self.tracker
            .current_frame_index()
            .map_or(0, |index| self.ring.used(index))
    }
}

impl FrameOrchestrator<GpuBufferAllocator> {
    /// Orchestrator allocating through `device`.
    ///
    /// Pair it with a pipeline cache built from
    /// [`extended_dynamic_state3`](Self::extended_dynamic_state3).
    pub fn for_device(config: &RendererConfig, device: Arc<Device>) -> RenderResult<Self> {
        let eds3 = device.caps().extended_dynamic_state3;
        Self::new(config, GpuBufferAllocator::new(device), eds3)
    }
}
