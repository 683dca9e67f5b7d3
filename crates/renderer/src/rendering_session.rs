//! Render-target and pass state machine.
//!
//! The session owns three pieces of state that must never drift from what
//! the GPU has actually been told:
//!
//! - which [`RenderTarget`] is selected
//! - whether a dynamic rendering scope is open, and for which target
//! - the tracked layout of every image the frame renders into
//!
//! Everything that touches render-target state goes through
//! [`request_target`](RenderingSession::request_target),
//! [`ensure_rendering`](RenderingSession::ensure_rendering) and
//! [`suspend_rendering`](RenderingSession::suspend_rendering). Passes open
//! lazily: selecting a target records nothing, and the first draw calls
//! `ensure_rendering`, which moves the attachments into attachment layouts and
//! consumes the one-shot clear ops.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_renderer::frame::FrameCtx;
//! use vkframe_renderer::render_target::{RenderTarget, RenderTargetRegistry};
//! use vkframe_renderer::rendering_session::RenderingSession;
//! use vkframe_rhi::recorder::CommandRecorder;
//!
//! # fn example<R: CommandRecorder, T: RenderTargetRegistry>(
//! #     ctx: &mut FrameCtx<'_, R, T>,
//! # ) -> vkframe_renderer::RenderResult<()> {
//! let mut session = RenderingSession::new();
//! session.begin_frame();
//!
//! session.request_target(ctx, RenderTarget::SceneHdrWithDepth)?;
//! let info = session.ensure_rendering(ctx)?;
//! // ... build a pipeline key from `info`, draw ...
//!
//! session.transition_to_shader_read(ctx, RenderTarget::SceneHdrWithDepth).ok();
//! session.end_frame(ctx)?;
//! # let _ = info;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use ash::vk;
use glam::Vec4;
use tracing::{debug, error, warn};

use vkframe_rhi::barrier::{ImageTransition, to_barriers};
use vkframe_rhi::device::ExtendedDynamicState3Caps;
use vkframe_rhi::recorder::CommandRecorder;
use vkframe_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};

use crate::clear_ops::{ClearOps, LoadOp};
use crate::error::{RenderError, RenderResult};
use crate::frame::FrameCtx;
use crate::pipeline_cache::build_dynamic_state_list;
use crate::render_target::{
    AttachmentImage, BLOOM_MIP_LEVELS, BLOOM_PING_PONG_COUNT, GBUFFER_COUNT, ImageSlot,
    RenderTarget, RenderTargetInfo, RenderTargetRegistry, format_has_stencil,
};

/// Layout an image is known to be in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageLayoutState {
    /// Contents undefined (start of frame, or never written).
    #[default]
    Undefined,
    /// Bound as a color attachment.
    ColorAttachment,
    /// Bound as the depth (and stencil) attachment.
    DepthAttachment,
    /// Sampled by shaders.
    ShaderReadOnly,
    /// Source of a copy.
    TransferSrc,
    /// Destination of a copy.
    TransferDst,
    /// Handed to the presentation engine.
    PresentSrc,
}

impl ImageLayoutState {
    /// Vulkan layout for this state. `has_stencil` selects the combined
    /// depth/stencil layouts.
    pub fn to_vk(self, has_stencil: bool) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthAttachment if has_stencil => {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            }
            Self::DepthAttachment => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            Self::ShaderReadOnly if has_stencil => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// Returns true if the image holds rendered contents.
    #[inline]
    pub fn is_written(self) -> bool {
        matches!(self, Self::ColorAttachment | Self::ShaderReadOnly)
    }
}

/// Cached rasterizer state applied with dynamic state commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DynamicStateCache {
    /// Cull mode.
    pub cull_mode: vk::CullModeFlags,
    /// Depth test enabled.
    pub depth_test: bool,
    /// Depth write enabled.
    pub depth_write: bool,
}

impl Default for DynamicStateCache {
    fn default() -> Self {
        Self {
            cull_mode: vk::CullModeFlags::BACK,
            depth_test: true,
            depth_write: true,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ActivePass {
    target: RenderTarget,
    info: RenderTargetInfo,
}

/// Render-target and pass state for one recording thread.
#[derive(Debug)]
pub struct RenderingSession {
    target: RenderTarget,
    active: Option<ActivePass>,
    clear_ops: ClearOps,
    last_pass_ops: Option<ClearOps>,
    clear_color: Vec4,
    clear_depth: f32,
    clear_non_color: bool,
    lighting_pass_pending: bool,
    pass_start_count: u64,
    layouts: HashMap<ImageSlot, ImageLayoutState>,
    dynamic: DynamicStateCache,
    line_width: f32,
    eds3: Option<ExtendedDynamicState3Caps>,
}

impl Default for RenderingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderingSession {
    /// Creates a session with the default target selected and no pass open.
    pub fn new() -> Self {
        Self {
            target: RenderTarget::default(),
            active: None,
            clear_ops: ClearOps::clear_all(),
            last_pass_ops: None,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            clear_depth: 1.0,
            clear_non_color: false,
            lighting_pass_pending: false,
            pass_start_count: 0,
            layouts: HashMap::new(),
            dynamic: DynamicStateCache::default(),
            line_width: 1.0,
            eds3: None,
        }
    }

    /// Enables the extended dynamic state 3 commands in
    /// [`apply_dynamic_state`](Self::apply_dynamic_state).
    pub fn with_extended_dynamic_state3(mut self, caps: Option<ExtendedDynamicState3Caps>) -> Self {
        self.eds3 = caps.filter(ExtendedDynamicState3Caps::any);
        self
    }

    /// Extended dynamic state 3 commands the session records. Pipelines
    /// drawn through this session must be built with the same caps.
    #[inline]
    pub fn extended_dynamic_state3(&self) -> Option<ExtendedDynamicState3Caps> {
        self.eds3
    }

    /// Dynamic states [`apply_dynamic_state`](Self::apply_dynamic_state)
    /// records, in pipeline creation order.
    pub fn dynamic_state_list(&self) -> Vec<vk::DynamicState> {
        build_dynamic_state_list(self.eds3)
    }

    // --- frame boundaries ---

    /// Resets per-frame state.
    ///
    /// Selects the default target, arms clear-all, and forgets the layout of
    /// every per-frame image. Only render-to-texture bitmaps keep theirs.
    pub fn begin_frame(&mut self) {
        if let Some(pass) = self.active.take() {
            warn!(
                "Frame began with a pass still open on {:?}; dropping it",
                pass.target
            );
        }
        self.target = RenderTarget::default();
        self.clear_ops = ClearOps::clear_all();
        self.last_pass_ops = None;
        self.clear_non_color = false;
        self.lighting_pass_pending = false;
        self.layouts.retain(|slot, _| slot.is_persistent());
    }

    /// Closes the open pass and moves the swapchain image to present.
    pub fn end_frame<R, T>(&mut self, ctx: &mut FrameCtx<'_, R, T>) -> RenderResult<()>
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        self.end_pass(ctx);
        self.transition(
            ctx,
            &[(
                ImageSlot::Swapchain(ctx.image_index),
                ImageLayoutState::PresentSrc,
            )],
        )
    }

    // --- target selection and passes ---

    /// Selects `target`.
    ///
    /// Selecting the current target does nothing. Any other target closes the
    /// open pass first and drops a pending lighting-pass load op.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidTarget`] for a bloom mip or ping-pong
    /// index out of range. The selection is left unchanged.
    pub fn request_target<R, T>(
        &mut self,
        ctx: &mut FrameCtx<'_, R, T>,
        target: RenderTarget,
    ) -> RenderResult<()>
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        if !target.exists() {
            error!("request_target: {:?} does not exist", target);
            return Err(RenderError::InvalidTarget(target));
        }
        self.select(ctx, target);
        Ok(())
    }

    fn select<R, T>(&mut self, ctx: &mut FrameCtx<'_, R, T>, target: RenderTarget)
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        if target == self.target {
            return;
        }
        self.end_pass(ctx);
        self.target = target;
        self.lighting_pass_pending = false;
    }

    /// Opens a pass on the selected target unless one is already open.
    ///
    /// Returns the attachment contract of the open pass.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::MissingAttachment`] if the registry lacks an
    /// image the target binds. No state changes in that case.
    pub fn ensure_rendering<R, T>(
        &mut self,
        ctx: &mut FrameCtx<'_, R, T>,
    ) -> RenderResult<RenderTargetInfo>
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        if let Some(pass) = self.active {
            return Ok(pass.info);
        }

        let target = self.target;
        let color_slots = target.color_slots(ctx.image_index);
        let colors = color_slots
            .iter()
            .map(|&slot| lookup(ctx.targets, slot))
            .collect::<RenderResult<Vec<_>>>()?;
        let depth = if target.has_depth() {
            Some(lookup(ctx.targets, ImageSlot::Depth)?)
        } else {
            None
        };

        let mut changes: Vec<_> = color_slots
            .iter()
            .map(|&slot| (slot, ImageLayoutState::ColorAttachment))
            .collect();
        if depth.is_some() {
            changes.push((ImageSlot::Depth, ImageLayoutState::DepthAttachment));
        }
        self.transition(ctx, &changes)?;

        let ops = self.clear_ops.consume();
        let clear_non_color = std::mem::take(&mut self.clear_non_color);
        let lighting_pass = target == RenderTarget::SwapchainNoDepth
            && std::mem::take(&mut self.lighting_pass_pending);
        let clear_color = match target {
            RenderTarget::DeferredGBuffer | RenderTarget::GBufferEmissive => [0.0; 4],
            _ => self.clear_color.to_array(),
        };

        let mut config = RenderingConfig::from_extent(ctx.targets.extent(target));
        for (index, image) in colors.iter().enumerate() {
            let load = match target {
                _ if lighting_pass => LoadOp::DontCare,
                RenderTarget::DeferredGBuffer if index > 0 && clear_non_color => LoadOp::Clear,
                _ => ops.color,
            };
            config = config.with_color_attachment(
                ColorAttachment::new(ctx.targets.view_for(target, image))
                    .with_load_op(load.to_vk())
                    .with_clear_color(clear_color),
            );
        }

        let mut depth_format = vk::Format::UNDEFINED;
        if let Some(image) = depth {
            depth_format = image.format;
            let mut attachment = DepthAttachment::new(ctx.targets.view_for(target, &image))
                .with_load_op(ops.depth.to_vk())
                .with_clear_depth(self.clear_depth);
            if format_has_stencil(image.format) {
                attachment = attachment.with_stencil(ops.stencil.to_vk());
            }
            config = config.with_depth_attachment(attachment);
        }

        ctx.recorder.begin_rendering(&config.build());

        let info = RenderTargetInfo {
            color_format: colors
                .first()
                .map_or(vk::Format::UNDEFINED, |image| image.format),
            color_attachment_count: colors.len() as u32,
            depth_format,
            samples: ctx.targets.samples(target),
        };
        self.active = Some(ActivePass { target, info });
        self.last_pass_ops = Some(ops);
        self.pass_start_count += 1;

        debug!(
            "Began rendering on {:?} (pass #{}, clears {:?})",
            target, self.pass_start_count, ops
        );
        Ok(info)
    }

    /// Closes the open pass, keeping the selected target.
    pub fn suspend_rendering<R, T>(&mut self, ctx: &mut FrameCtx<'_, R, T>)
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        self.end_pass(ctx);
    }

    fn end_pass<R, T>(&mut self, ctx: &mut FrameCtx<'_, R, T>)
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        if self.active.take().is_some() {
            ctx.recorder.end_rendering();
        }
    }

    // --- clears ---

    /// Clears color, depth and stencil on the next pass.
    ///
    /// Takes precedence over the lighting pass's don't-care load.
    pub fn request_clear(&mut self) {
        self.clear_ops = ClearOps::clear_all();
        self.lighting_pass_pending = false;
    }

    /// Clears depth and stencil on the next pass, leaving color alone.
    pub fn request_depth_stencil_clear(&mut self) {
        self.clear_ops = self.clear_ops.with_depth_stencil_clear();
    }

    /// Sets the color used by color clears.
    pub fn set_clear_color(&mut self, color: Vec4) {
        self.clear_color = color;
    }

    /// Sets the depth used by depth clears.
    pub fn set_clear_depth(&mut self, depth: f32) {
        self.clear_depth = depth;
    }

    // --- layout transitions ---

    /// Makes `target`'s color images sampleable.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::PassActive`] if a pass is open.
    pub fn transition_to_shader_read<R, T>(
        &mut self,
        ctx: &mut FrameCtx<'_, R, T>,
        target: RenderTarget,
    ) -> RenderResult<()>
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        self.require_no_pass("transition_to_shader_read")?;
        let changes: Vec<_> = target
            .color_slots(ctx.image_index)
            .into_iter()
            .map(|slot| (slot, ImageLayoutState::ShaderReadOnly))
            .collect();
        self.transition(ctx, &changes)
    }

    /// Makes every mip of a bloom ping-pong image sampleable.
    ///
    /// Returns `Ok(false)` for an out-of-range `ping_pong` index.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::PassActive`] if a pass is open.
    pub fn transition_bloom_to_shader_read<R, T>(
        &mut self,
        ctx: &mut FrameCtx<'_, R, T>,
        ping_pong: u32,
    ) -> RenderResult<bool>
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        if ping_pong >= BLOOM_PING_PONG_COUNT {
            warn!("Bloom ping-pong index {} out of range", ping_pong);
            return Ok(false);
        }
        self.require_no_pass("transition_bloom_to_shader_read")?;
        self.transition(
            ctx,
            &[(ImageSlot::Bloom(ping_pong), ImageLayoutState::ShaderReadOnly)],
        )?;
        Ok(true)
    }

    /// Copies the HDR scene into the read-only effect snapshot.
    ///
    /// Closes the open pass. The scene image goes back to the layout it was
    /// in; the snapshot ends up sampleable.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::LayoutNeverWritten`] if nothing rendered into
    /// the scene this frame.
    pub fn copy_scene_hdr_to_effect<R, T>(&mut self, ctx: &mut FrameCtx<'_, R, T>) -> RenderResult<()>
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        self.end_pass(ctx);

        let scene_state = self.layout_of(ImageSlot::SceneHdr);
        if !scene_state.is_written() {
            error!(
                "copy_scene_hdr_to_effect: scene HDR is {:?}, nothing to copy",
                scene_state
            );
            return Err(RenderError::LayoutNeverWritten(ImageSlot::SceneHdr));
        }

        let scene = lookup(ctx.targets, ImageSlot::SceneHdr)?;
        let effect = lookup(ctx.targets, ImageSlot::SceneEffect)?;
        let extent = ctx.targets.extent(RenderTarget::SceneHdrNoDepth);

        self.transition(
            ctx,
            &[
                (ImageSlot::SceneHdr, ImageLayoutState::TransferSrc),
                (ImageSlot::SceneEffect, ImageLayoutState::TransferDst),
            ],
        )?;

        let subresource = vk::ImageSubresourceLayers::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(0)
            .base_array_layer(0)
            .layer_count(1);
        let region = vk::ImageCopy::default()
            .src_subresource(subresource)
            .dst_subresource(subresource)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });
        ctx.recorder.copy_image(
            scene.image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            effect.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
        );

        self.transition(
            ctx,
            &[
                (ImageSlot::SceneHdr, scene_state),
                (ImageSlot::SceneEffect, ImageLayoutState::ShaderReadOnly),
            ],
        )
    }

    // --- deferred lighting ---

    /// Selects the G-buffer and arms clears for the geometry pass.
    ///
    /// With `clear_non_color` the normal, position, specular and emissive
    /// attachments are cleared too, even if color is later set to load.
    pub fn begin_deferred_pass<R, T>(&mut self, ctx: &mut FrameCtx<'_, R, T>, clear_non_color: bool)
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        self.select(ctx, RenderTarget::DeferredGBuffer);
        self.clear_ops = ClearOps::clear_all();
        self.clear_non_color = clear_non_color;
    }

    /// Finishes the geometry pass.
    ///
    /// Closes the pass, makes every G-buffer attachment and the depth image
    /// sampleable, and selects the swapchain without depth for lighting.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::WrongTarget`] unless the G-buffer is selected.
    /// Nothing changes in that case.
    pub fn end_deferred_geometry<R, T>(&mut self, ctx: &mut FrameCtx<'_, R, T>) -> RenderResult<()>
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        if self.target != RenderTarget::DeferredGBuffer {
            error!(
                "end_deferred_geometry called with {:?} selected",
                self.target
            );
            return Err(RenderError::WrongTarget {
                op: "end_deferred_geometry",
                expected: RenderTarget::DeferredGBuffer,
                actual: self.target,
            });
        }

        self.end_pass(ctx);

        let mut changes: Vec<_> = (0..GBUFFER_COUNT)
            .map(|i| (ImageSlot::GBuffer(i), ImageLayoutState::ShaderReadOnly))
            .collect();
        changes.push((ImageSlot::Depth, ImageLayoutState::ShaderReadOnly));
        self.transition(ctx, &changes)?;

        self.target = RenderTarget::SwapchainNoDepth;
        self.lighting_pass_pending = true;
        Ok(())
    }

    // --- dynamic state ---

    /// Sets the cached cull mode.
    pub fn set_cull_mode(&mut self, mode: vk::CullModeFlags) {
        self.dynamic.cull_mode = mode;
    }

    /// Enables or disables depth testing.
    pub fn set_depth_test(&mut self, enable: bool) {
        self.dynamic.depth_test = enable;
    }

    /// Enables or disables depth writes.
    pub fn set_depth_write(&mut self, enable: bool) {
        self.dynamic.depth_write = enable;
    }

    /// Sets the width of rasterized lines.
    pub fn set_line_width(&mut self, width: f32) {
        self.line_width = width;
    }

    /// Cached dynamic state.
    #[inline]
    pub fn dynamic_state(&self) -> DynamicStateCache {
        self.dynamic
    }

    /// Records the cached dynamic state for the selected target.
    ///
    /// The viewport is flipped (`y = height`, `height = -height`) and the
    /// front face is clockwise to match.
    pub fn apply_dynamic_state<R, T>(&self, ctx: &mut FrameCtx<'_, R, T>)
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        let extent = ctx.targets.extent(self.target);
        let recorder = &mut *ctx.recorder;

        recorder.set_viewport(vk::Viewport {
            x: 0.0,
            y: extent.height as f32,
            width: extent.width as f32,
            height: -(extent.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        });
        recorder.set_scissor(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });
        recorder.set_line_width(self.line_width);
        recorder.set_cull_mode(self.dynamic.cull_mode);
        recorder.set_front_face(vk::FrontFace::CLOCKWISE);
        recorder.set_primitive_topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        recorder.set_depth_test_enable(self.dynamic.depth_test);
        recorder.set_depth_write_enable(self.dynamic.depth_write);
        recorder.set_depth_compare_op(if self.dynamic.depth_test {
            vk::CompareOp::LESS_OR_EQUAL
        } else {
            vk::CompareOp::ALWAYS
        });
        recorder.set_stencil_test_enable(false);

        if let Some(caps) = self.eds3 {
            let count = self.target.color_attachment_count() as usize;
            if caps.color_blend_enable {
                recorder.set_color_blend_enable(0, &vec![false; count]);
            }
            if caps.color_write_mask {
                recorder.set_color_write_mask(0, &vec![vk::ColorComponentFlags::RGBA; count]);
            }
            if caps.polygon_mode {
                recorder.set_polygon_mode(vk::PolygonMode::FILL);
            }
            if caps.rasterization_samples {
                recorder.set_rasterization_samples(vk::SampleCountFlags::TYPE_1);
            }
        }
    }

    // --- queries ---

    /// Selected target.
    #[inline]
    pub fn current_target(&self) -> RenderTarget {
        self.target
    }

    /// Returns true while a pass is open.
    #[inline]
    pub fn rendering_active(&self) -> bool {
        self.active.is_some()
    }

    /// Number of passes opened since the session was created.
    #[inline]
    pub fn pass_start_count(&self) -> u64 {
        self.pass_start_count
    }

    /// Ops the next pass will use.
    #[inline]
    pub fn clear_ops(&self) -> ClearOps {
        self.clear_ops
    }

    /// Ops consumed by the most recent pass this frame.
    #[inline]
    pub fn last_pass_clear_ops(&self) -> Option<ClearOps> {
        self.last_pass_ops
    }

    /// Attachment contract of the open pass.
    #[inline]
    pub fn current_target_info(&self) -> Option<RenderTargetInfo> {
        self.active.map(|pass| pass.info)
    }

    /// Tracked layout of `slot`.
    #[inline]
    pub fn layout_of(&self, slot: ImageSlot) -> ImageLayoutState {
        self.layouts.get(&slot).copied().unwrap_or_default()
    }

    /// Attachment contract of `target` as the registry describes it, without
    /// opening a pass.
    pub fn target_info<T: RenderTargetRegistry>(
        targets: &T,
        target: RenderTarget,
        image_index: u32,
    ) -> RenderResult<RenderTargetInfo> {
        let slots = target.color_slots(image_index);
        let first = slots
            .first()
            .map(|&slot| lookup(targets, slot))
            .transpose()?;
        let depth_format = if target.has_depth() {
            lookup(targets, ImageSlot::Depth)?.format
        } else {
            vk::Format::UNDEFINED
        };
        Ok(RenderTargetInfo {
            color_format: first.map_or(vk::Format::UNDEFINED, |image| image.format),
            color_attachment_count: slots.len() as u32,
            depth_format,
            samples: targets.samples(target),
        })
    }

    // --- internals ---

    fn require_no_pass(&self, op: &'static str) -> RenderResult<()> {
        if let Some(pass) = self.active {
            error!("{} called while rendering to {:?}", op, pass.target);
            return Err(RenderError::PassActive(op));
        }
        Ok(())
    }

    /// Records barriers moving each slot to its new state. Either every
    /// slot transitions or, on a missing image, none does.
    fn transition<R, T>(
        &mut self,
        ctx: &mut FrameCtx<'_, R, T>,
        changes: &[(ImageSlot, ImageLayoutState)],
    ) -> RenderResult<()>
    where
        R: CommandRecorder,
        T: RenderTargetRegistry,
    {
        let mut transitions = Vec::with_capacity(changes.len());
        for &(slot, new_state) in changes {
            let image = lookup(ctx.targets, slot)?;
            transitions.push(slot_transition(slot, &image, self.layout_of(slot), new_state));
        }

        let barriers = to_barriers(&transitions);
        if !barriers.is_empty() {
            ctx.recorder.image_barriers(&barriers);
        }
        for &(slot, new_state) in changes {
            self.layouts.insert(slot, new_state);
        }
        Ok(())
    }
}

fn lookup<T: RenderTargetRegistry>(targets: &T, slot: ImageSlot) -> RenderResult<AttachmentImage> {
    targets
        .image(slot)
        .ok_or(RenderError::MissingAttachment(slot))
}

fn slot_transition(
    slot: ImageSlot,
    image: &AttachmentImage,
    old_state: ImageLayoutState,
    new_state: ImageLayoutState,
) -> ImageTransition {
    let transition = match slot {
        ImageSlot::Depth => {
            let stencil = format_has_stencil(image.format);
            ImageTransition::depth(
                image.image,
                stencil,
                old_state.to_vk(stencil),
                new_state.to_vk(stencil),
            )
        }
        _ => ImageTransition::color(image.image, old_state.to_vk(false), new_state.to_vk(false)),
    };
    match slot {
        ImageSlot::Bloom(_) => transition.with_level_count(BLOOM_MIP_LEVELS),
        ImageSlot::Bitmap { face, .. } => transition.with_layer(face),
        _ => transition,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::render_target::{GBUFFER_FORMAT, RenderTargetRegistry};
    use ash::vk::Handle;
    use vkframe_rhi::recorder::{CommandLog, RecordedCommand};

    pub(crate) struct FakeTargets {
        pub(crate) depth_format: vk::Format,
    }

    fn raw(slot: ImageSlot) -> u64 {
        match slot {
            ImageSlot::Swapchain(i) => 100 + u64::from(i),
            ImageSlot::Depth => 200,
            ImageSlot::SceneHdr => 300,
            ImageSlot::SceneEffect => 301,
            ImageSlot::PostLdr => 302,
            ImageSlot::PostLuminance => 303,
            ImageSlot::SmaaEdges => 304,
            ImageSlot::SmaaBlend => 305,
            ImageSlot::SmaaOutput => 306,
            ImageSlot::Bloom(i) => 400 + u64::from(i),
            ImageSlot::GBuffer(i) => 500 + u64::from(i),
            ImageSlot::Bitmap { handle, face } => 1000 + handle as u64 * 8 + u64::from(face),
        }
    }

    pub(crate) fn image(slot: ImageSlot) -> vk::Image {
        vk::Image::from_raw(raw(slot))
    }

    impl RenderTargetRegistry for FakeTargets {
        fn image(&self, slot: ImageSlot) -> Option<AttachmentImage> {
            let format = match slot {
                ImageSlot::Depth => self.depth_format,
                ImageSlot::GBuffer(_) => GBUFFER_FORMAT,
                ImageSlot::SceneHdr | ImageSlot::SceneEffect => vk::Format::R16G16B16A16_SFLOAT,
                _ => vk::Format::B8G8R8A8_UNORM,
            };
            Some(AttachmentImage {
                image: vk::Image::from_raw(raw(slot)),
                view: vk::ImageView::from_raw(raw(slot) + 10_000),
                format,
            })
        }

        fn extent(&self, _target: RenderTarget) -> vk::Extent2D {
            vk::Extent2D {
                width: 1280,
                height: 720,
            }
        }
    }

    struct NoEffect;

    impl RenderTargetRegistry for NoEffect {
        fn image(&self, slot: ImageSlot) -> Option<AttachmentImage> {
            (slot != ImageSlot::SceneEffect).then(|| AttachmentImage {
                image: vk::Image::from_raw(raw(slot)),
                view: vk::ImageView::from_raw(raw(slot) + 10_000),
                format: vk::Format::B8G8R8A8_UNORM,
            })
        }

        fn extent(&self, _target: RenderTarget) -> vk::Extent2D {
            vk::Extent2D {
                width: 64,
                height: 64,
            }
        }
    }

    pub(crate) fn targets() -> FakeTargets {
        FakeTargets {
            depth_format: vk::Format::D32_SFLOAT,
        }
    }

    fn ctx<'a>(log: &'a mut CommandLog, targets: &'a FakeTargets) -> FrameCtx<'a, CommandLog, FakeTargets> {
        FrameCtx::new(log, targets, 0, 0, 1)
    }

    #[test]
    fn test_begin_frame_defaults() {
        let mut session = RenderingSession::new();
        session.begin_frame();
        assert_eq!(session.current_target(), RenderTarget::SwapchainWithDepth);
        assert!(!session.rendering_active());
        assert_eq!(session.clear_ops(), ClearOps::clear_all());
    }

    #[test]
    fn test_begin_frame_resets_after_mid_frame_state() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.request_target(&mut ctx, RenderTarget::PostLdr).unwrap();
        session.ensure_rendering(&mut ctx).unwrap();

        session.begin_frame();
        assert_eq!(session.current_target(), RenderTarget::SwapchainWithDepth);
        assert!(!session.rendering_active());
        assert_eq!(session.layout_of(ImageSlot::PostLdr), ImageLayoutState::Undefined);
        assert_eq!(session.clear_ops(), ClearOps::clear_all());
    }

    #[test]
    fn test_same_target_keeps_pass() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();

        session.request_target(&mut ctx, RenderTarget::SceneHdrWithDepth).unwrap();
        session.ensure_rendering(&mut ctx).unwrap();
        session.request_target(&mut ctx, RenderTarget::SceneHdrWithDepth).unwrap();

        assert!(session.rendering_active());
        assert_eq!(log.end_rendering_count(), 0);
    }

    #[test]
    fn test_different_target_ends_pass() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();

        session.ensure_rendering(&mut ctx).unwrap();
        session.request_target(&mut ctx, RenderTarget::PostLdr).unwrap();

        assert!(!session.rendering_active());
        assert_eq!(session.current_target(), RenderTarget::PostLdr);
        drop(ctx);
        assert_eq!(log.end_rendering_count(), 1);
    }

    #[test]
    fn test_ensure_rendering_is_idempotent() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();

        let before = session.pass_start_count();
        let first = session.ensure_rendering(&mut ctx).unwrap();
        let second = session.ensure_rendering(&mut ctx).unwrap();
        assert_eq!(session.pass_start_count(), before + 1);
        assert_eq!(first, second);
        drop(ctx);
        assert_eq!(log.begin_rendering_count(), 1);
    }

    #[test]
    fn test_clear_ops_are_one_shot() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();

        session.ensure_rendering(&mut ctx).unwrap();
        assert_eq!(session.last_pass_clear_ops(), Some(ClearOps::clear_all()));

        session.suspend_rendering(&mut ctx);
        session.ensure_rendering(&mut ctx).unwrap();
        assert_eq!(session.last_pass_clear_ops(), Some(ClearOps::load_all()));
        assert_eq!(session.current_target(), RenderTarget::SwapchainWithDepth);
        drop(ctx);

        let ops: Vec<_> = log
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::BeginRendering {
                    color_load_ops,
                    depth_load_op,
                    ..
                } => Some((color_load_ops[0], *depth_load_op)),
                _ => None,
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                (vk::AttachmentLoadOp::CLEAR, Some(vk::AttachmentLoadOp::CLEAR)),
                (vk::AttachmentLoadOp::LOAD, Some(vk::AttachmentLoadOp::LOAD)),
            ]
        );
    }

    #[test]
    fn test_request_clears() {
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.clear_ops.consume();

        session.request_depth_stencil_clear();
        let ops = session.clear_ops();
        assert_eq!(ops.color, LoadOp::Load);
        assert!(ops.is_depth_clear() && ops.is_stencil_clear());

        session.request_clear();
        assert_eq!(session.clear_ops(), ClearOps::clear_all());
    }

    #[test]
    fn test_ensure_transitions_attachments() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.ensure_rendering(&mut ctx).unwrap();
        drop(ctx);

        assert_eq!(
            log.barriers_for(image(ImageSlot::Swapchain(0))),
            vec![(
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            )]
        );
        assert_eq!(
            log.barriers_for(image(ImageSlot::Depth)),
            vec![(
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
            )]
        );
        assert_eq!(
            session.layout_of(ImageSlot::Depth),
            ImageLayoutState::DepthAttachment
        );
    }

    #[test]
    fn test_stencil_depth_binds_stencil() {
        let targets = FakeTargets {
            depth_format: vk::Format::D24_UNORM_S8_UINT,
        };
        let mut log = CommandLog::new();
        let mut ctx = FrameCtx::new(&mut log, &targets, 0, 0, 1);
        let mut session = RenderingSession::new();
        session.begin_frame();
        let info = session.ensure_rendering(&mut ctx).unwrap();
        drop(ctx);

        assert_eq!(info.depth_format, vk::Format::D24_UNORM_S8_UINT);
        match log.last_begin_rendering() {
            Some(RecordedCommand::BeginRendering {
                stencil_load_op, ..
            }) => assert_eq!(*stencil_load_op, Some(vk::AttachmentLoadOp::CLEAR)),
            other => panic!("unexpected entry: {other:?}"),
        }
        assert_eq!(
            log.barriers_for(image(ImageSlot::Depth)),
            vec![(
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            )]
        );
    }

    #[test]
    fn test_transition_to_shader_read_rejected_in_pass() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.request_target(&mut ctx, RenderTarget::PostLdr).unwrap();
        session.ensure_rendering(&mut ctx).unwrap();

        let result = session.transition_to_shader_read(&mut ctx, RenderTarget::PostLdr);
        assert!(matches!(result, Err(RenderError::PassActive(_))));
        assert_eq!(
            session.layout_of(ImageSlot::PostLdr),
            ImageLayoutState::ColorAttachment
        );

        session.suspend_rendering(&mut ctx);
        session
            .transition_to_shader_read(&mut ctx, RenderTarget::PostLdr)
            .unwrap();
        assert_eq!(
            session.layout_of(ImageSlot::PostLdr),
            ImageLayoutState::ShaderReadOnly
        );
        assert_eq!(session.current_target(), RenderTarget::PostLdr);
    }

    #[test]
    fn test_bloom_transition_range() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();

        assert!(!session.transition_bloom_to_shader_read(&mut ctx, 2).unwrap());
        assert!(session.transition_bloom_to_shader_read(&mut ctx, 1).unwrap());
        assert_eq!(
            session.layout_of(ImageSlot::Bloom(1)),
            ImageLayoutState::ShaderReadOnly
        );

        session
            .request_target(&mut ctx, RenderTarget::BloomMip { ping_pong: 0, mip: 2 })
            .unwrap();
        session.ensure_rendering(&mut ctx).unwrap();
        assert!(matches!(
            session.transition_bloom_to_shader_read(&mut ctx, 0),
            Err(RenderError::PassActive(_))
        ));
    }

    #[test]
    fn test_bloom_target_out_of_range() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.ensure_rendering(&mut ctx).unwrap();

        let past_mips = RenderTarget::BloomMip {
            ping_pong: 0,
            mip: BLOOM_MIP_LEVELS,
        };
        assert!(matches!(
            session.request_target(&mut ctx, past_mips),
            Err(RenderError::InvalidTarget(_))
        ));
        let past_images = RenderTarget::BloomMip {
            ping_pong: BLOOM_PING_PONG_COUNT,
            mip: 0,
        };
        assert!(session.request_target(&mut ctx, past_images).is_err());

        assert_eq!(session.current_target(), RenderTarget::SwapchainWithDepth);
        assert!(session.rendering_active());

        let last_mip = RenderTarget::BloomMip {
            ping_pong: 1,
            mip: BLOOM_MIP_LEVELS - 1,
        };
        session.request_target(&mut ctx, last_mip).unwrap();
        assert_eq!(session.current_target(), last_mip);
    }

    #[test]
    fn test_copy_scene_requires_rendered_scene() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();

        assert!(matches!(
            session.copy_scene_hdr_to_effect(&mut ctx),
            Err(RenderError::LayoutNeverWritten(ImageSlot::SceneHdr))
        ));
        assert_eq!(
            session.layout_of(ImageSlot::SceneEffect),
            ImageLayoutState::Undefined
        );
    }

    #[test]
    fn test_copy_scene_to_effect() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.request_target(&mut ctx, RenderTarget::SceneHdrWithDepth).unwrap();
        session.ensure_rendering(&mut ctx).unwrap();

        session.copy_scene_hdr_to_effect(&mut ctx).unwrap();
        assert!(!session.rendering_active());
        assert_eq!(
            session.layout_of(ImageSlot::SceneHdr),
            ImageLayoutState::ColorAttachment
        );
        assert_eq!(
            session.layout_of(ImageSlot::SceneEffect),
            ImageLayoutState::ShaderReadOnly
        );
        drop(ctx);

        assert_eq!(
            log.count(|c| matches!(c, RecordedCommand::CopyImage { .. })),
            1
        );
        assert_eq!(
            log.barriers_for(image(ImageSlot::SceneEffect)),
            vec![
                (
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL
                ),
                (
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                ),
            ]
        );
    }

    #[test]
    fn test_missing_attachment_changes_nothing() {
        let targets = NoEffect;
        let mut log = CommandLog::new();
        let mut ctx = FrameCtx::new(&mut log, &targets, 0, 0, 1);
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.request_target(&mut ctx, RenderTarget::SceneHdrNoDepth).unwrap();
        session.ensure_rendering(&mut ctx).unwrap();

        assert!(matches!(
            session.copy_scene_hdr_to_effect(&mut ctx),
            Err(RenderError::MissingAttachment(ImageSlot::SceneEffect))
        ));
        assert_eq!(
            session.layout_of(ImageSlot::SceneHdr),
            ImageLayoutState::ColorAttachment
        );
    }

    #[test]
    fn test_end_deferred_geometry_requires_gbuffer() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.ensure_rendering(&mut ctx).unwrap();

        let result = session.end_deferred_geometry(&mut ctx);
        assert!(matches!(result, Err(RenderError::WrongTarget { .. })));
        assert_eq!(session.current_target(), RenderTarget::SwapchainWithDepth);
        assert!(session.rendering_active());
    }

    #[test]
    fn test_deferred_pass_flow() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();

        session.begin_deferred_pass(&mut ctx, true);
        assert_eq!(session.current_target(), RenderTarget::DeferredGBuffer);
        let info = session.ensure_rendering(&mut ctx).unwrap();
        assert_eq!(info.color_attachment_count, GBUFFER_COUNT);
        assert_eq!(info.color_format, GBUFFER_FORMAT);

        session.end_deferred_geometry(&mut ctx).unwrap();
        assert!(!session.rendering_active());
        assert_eq!(session.current_target(), RenderTarget::SwapchainNoDepth);
        for i in 0..GBUFFER_COUNT {
            assert_eq!(
                session.layout_of(ImageSlot::GBuffer(i)),
                ImageLayoutState::ShaderReadOnly
            );
        }
        assert_eq!(
            session.layout_of(ImageSlot::Depth),
            ImageLayoutState::ShaderReadOnly
        );

        let lighting = session.ensure_rendering(&mut ctx).unwrap();
        assert!(!lighting.has_depth());
        drop(ctx);

        match log.last_begin_rendering() {
            Some(RecordedCommand::BeginRendering {
                color_load_ops,
                depth_view,
                ..
            }) => {
                assert_eq!(color_load_ops, &vec![vk::AttachmentLoadOp::DONT_CARE]);
                assert!(depth_view.is_none());
            }
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn test_lighting_load_op_dropped_by_other_target() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.begin_deferred_pass(&mut ctx, false);
        session.ensure_rendering(&mut ctx).unwrap();
        session.end_deferred_geometry(&mut ctx).unwrap();

        session.request_target(&mut ctx, RenderTarget::PostLdr).unwrap();
        session.request_clear();
        session.ensure_rendering(&mut ctx).unwrap();
        session
            .request_target(&mut ctx, RenderTarget::SwapchainNoDepth)
            .unwrap();
        session.ensure_rendering(&mut ctx).unwrap();
        drop(ctx);

        match log.last_begin_rendering() {
            Some(RecordedCommand::BeginRendering { color_load_ops, .. }) => {
                assert_eq!(color_load_ops, &vec![vk::AttachmentLoadOp::LOAD]);
            }
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn test_explicit_clear_beats_lighting_load_op() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.begin_deferred_pass(&mut ctx, false);
        session.ensure_rendering(&mut ctx).unwrap();
        session.end_deferred_geometry(&mut ctx).unwrap();

        session.request_clear();
        session.ensure_rendering(&mut ctx).unwrap();
        drop(ctx);

        match log.last_begin_rendering() {
            Some(RecordedCommand::BeginRendering { color_load_ops, .. }) => {
                assert_eq!(color_load_ops, &vec![vk::AttachmentLoadOp::CLEAR]);
            }
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn test_gbuffer_non_color_clear() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.begin_deferred_pass(&mut ctx, true);
        session.clear_ops.color = LoadOp::Load;
        session.ensure_rendering(&mut ctx).unwrap();
        drop(ctx);

        match log.last_begin_rendering() {
            Some(RecordedCommand::BeginRendering { color_load_ops, .. }) => {
                assert_eq!(color_load_ops[0], vk::AttachmentLoadOp::LOAD);
                assert!(color_load_ops[1..]
                    .iter()
                    .all(|op| *op == vk::AttachmentLoadOp::CLEAR));
            }
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn test_end_frame_presents() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = FrameCtx::new(&mut log, &targets, 1, 2, 5);
        let mut session = RenderingSession::new();
        session.begin_frame();
        session.ensure_rendering(&mut ctx).unwrap();
        session.end_frame(&mut ctx).unwrap();
        assert!(!session.rendering_active());
        drop(ctx);

        assert_eq!(log.end_rendering_count(), 1);
        assert_eq!(
            log.barriers_for(image(ImageSlot::Swapchain(2))),
            vec![
                (
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
                ),
                (
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::ImageLayout::PRESENT_SRC_KHR
                ),
            ]
        );
    }

    #[test]
    fn test_bitmap_layout_survives_frame() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session = RenderingSession::new();
        let bitmap = RenderTarget::BitmapRenderToTexture { handle: 3, face: 1 };
        session.begin_frame();
        session.request_target(&mut ctx, bitmap).unwrap();
        session.ensure_rendering(&mut ctx).unwrap();
        session.suspend_rendering(&mut ctx);
        session.transition_to_shader_read(&mut ctx, bitmap).unwrap();

        session.begin_frame();
        assert_eq!(
            session.layout_of(ImageSlot::Bitmap { handle: 3, face: 1 }),
            ImageLayoutState::ShaderReadOnly
        );
    }

    #[test]
    fn test_apply_dynamic_state() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let mut session =
            RenderingSession::new().with_extended_dynamic_state3(Some(ExtendedDynamicState3Caps::ALL));
        session.begin_frame();
        session.set_depth_test(false);
        session.set_cull_mode(vk::CullModeFlags::NONE);
        session.apply_dynamic_state(&mut ctx);
        drop(ctx);

        let commands = log.commands();
        assert_eq!(commands[0], RecordedCommand::Viewport([0.0, 720.0, 1280.0, -720.0]));
        assert!(commands.contains(&RecordedCommand::LineWidth(1.0)));
        assert!(commands.contains(&RecordedCommand::CullMode(vk::CullModeFlags::NONE)));
        assert!(commands.contains(&RecordedCommand::FrontFace(vk::FrontFace::CLOCKWISE)));
        assert!(commands.contains(&RecordedCommand::DepthTest(false)));
        assert!(commands.contains(&RecordedCommand::DepthCompare(vk::CompareOp::ALWAYS)));
        assert!(commands.contains(&RecordedCommand::StencilTest(false)));
        assert!(commands.contains(&RecordedCommand::ColorBlendEnable(vec![false])));
        assert!(commands.contains(&RecordedCommand::PolygonMode(vk::PolygonMode::FILL)));
    }

    #[test]
    fn test_dynamic_state_without_eds3() {
        let targets = targets();
        let mut log = CommandLog::new();
        let mut ctx = ctx(&mut log, &targets);
        let session = RenderingSession::new();
        session.apply_dynamic_state(&mut ctx);
        drop(ctx);

        assert!(log.commands().contains(&RecordedCommand::DepthCompare(
            vk::CompareOp::LESS_OR_EQUAL
        )));
        assert_eq!(
            log.count(|c| matches!(c, RecordedCommand::ColorBlendEnable(_))),
            0
        );
    }

    #[test]
    fn test_recorded_states_match_declared_list() {
        let targets = targets();
        for caps in [None, Some(ExtendedDynamicState3Caps::ALL)] {
            let session = RenderingSession::new().with_extended_dynamic_state3(caps);
            let mut log = CommandLog::new();
            let mut ctx = ctx(&mut log, &targets);
            session.apply_dynamic_state(&mut ctx);
            drop(ctx);

            let recorded: Vec<_> = log.commands().iter().filter_map(dynamic_state_of).collect();
            assert_eq!(recorded, session.dynamic_state_list());
        }
    }

    fn dynamic_state_of(command: &RecordedCommand) -> Option<vk::DynamicState> {
        use vk::DynamicState as D;
        Some(match command {
            RecordedCommand::Viewport(_) => D::VIEWPORT,
            RecordedCommand::Scissor(_) => D::SCISSOR,
            RecordedCommand::LineWidth(_) => D::LINE_WIDTH,
            RecordedCommand::CullMode(_) => D::CULL_MODE,
            RecordedCommand::FrontFace(_) => D::FRONT_FACE,
            RecordedCommand::Topology(_) => D::PRIMITIVE_TOPOLOGY,
            RecordedCommand::DepthTest(_) => D::DEPTH_TEST_ENABLE,
            RecordedCommand::DepthWrite(_) => D::DEPTH_WRITE_ENABLE,
            RecordedCommand::DepthCompare(_) => D::DEPTH_COMPARE_OP,
            RecordedCommand::StencilTest(_) => D::STENCIL_TEST_ENABLE,
            RecordedCommand::ColorBlendEnable(_) => D::COLOR_BLEND_ENABLE_EXT,
            RecordedCommand::ColorWriteMask(_) => D::COLOR_WRITE_MASK_EXT,
            RecordedCommand::PolygonMode(_) => D::POLYGON_MODE_EXT,
            RecordedCommand::RasterizationSamples(_) => D::RASTERIZATION_SAMPLES_EXT,
            _ => return None,
        })
    }

    #[test]
    fn test_target_info_without_pass() {
        let targets = targets();
        let info = RenderingSession::target_info(&targets, RenderTarget::SceneHdrNoDepth, 0).unwrap();
        assert_eq!(info.color_format, vk::Format::R16G16B16A16_SFLOAT);
        assert!(!info.has_depth());
    }

    #[test]
    fn test_session_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RenderingSession>();
    }
}
