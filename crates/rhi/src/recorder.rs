//! Command recording seam.
//!
//! Everything the frame core records goes through [`CommandRecorder`]. The
//! Vulkan [`CommandBuffer`](crate::command::CommandBuffer) implements it for
//! real devices, [`NullRecorder`] discards every command, and [`CommandLog`]
//! keeps a readable transcript of what would have been recorded.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::recorder::{CommandLog, CommandRecorder, RecordedCommand};
//!
//! let mut log = CommandLog::new();
//! log.end_rendering();
//! assert_eq!(log.commands(), &[RecordedCommand::EndRendering]);
//! ```

use ash::vk;

use crate::rendering::RenderingInfoBundle;

/// Sink for the commands recorded by the frame core.
///
/// Methods mirror the subset of `vkCmd*` entry points the core needs.
pub trait CommandRecorder {
    /// Opens a dynamic rendering scope.
    fn begin_rendering(&mut self, bundle: &RenderingInfoBundle);

    /// Closes the current dynamic rendering scope.
    fn end_rendering(&mut self);

    /// Records a synchronization2 barrier with the given image barriers.
    fn image_barriers(&mut self, barriers: &[vk::ImageMemoryBarrier2<'_>]);

    /// Copies between two images.
    fn copy_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    );

    /// Sets the viewport.
    fn set_viewport(&mut self, viewport: vk::Viewport);

    /// Sets the scissor rectangle.
    fn set_scissor(&mut self, scissor: vk::Rect2D);

    /// Sets the rasterized line width.
    fn set_line_width(&mut self, width: f32);

    /// Sets the cull mode.
    fn set_cull_mode(&mut self, mode: vk::CullModeFlags);

    /// Sets the front face winding.
    fn set_front_face(&mut self, face: vk::FrontFace);

    /// Sets the primitive topology.
    fn set_primitive_topology(&mut self, topology: vk::PrimitiveTopology);

    /// Enables or disables depth testing.
    fn set_depth_test_enable(&mut self, enable: bool);

    /// Enables or disables depth writes.
    fn set_depth_write_enable(&mut self, enable: bool);

    /// Sets the depth compare op.
    fn set_depth_compare_op(&mut self, op: vk::CompareOp);

    /// Enables or disables the stencil test.
    fn set_stencil_test_enable(&mut self, enable: bool);

    /// Sets per-attachment blend enables (extended dynamic state 3).
    fn set_color_blend_enable(&mut self, _first_attachment: u32, _enables: &[bool]) {}

    /// Sets per-attachment color write masks (extended dynamic state 3).
    fn set_color_write_mask(&mut self, _first_attachment: u32, _masks: &[vk::ColorComponentFlags]) {}

    /// Sets the polygon mode (extended dynamic state 3).
    fn set_polygon_mode(&mut self, _mode: vk::PolygonMode) {}

    /// Sets rasterization samples (extended dynamic state 3).
    fn set_rasterization_samples(&mut self, _samples: vk::SampleCountFlags) {}
}

/// Recorder that drops every command.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

impl CommandRecorder for NullRecorder {
    fn begin_rendering(&mut self, _bundle: &RenderingInfoBundle) {}
    fn end_rendering(&mut self) {}
    fn image_barriers(&mut self, _barriers: &[vk::ImageMemoryBarrier2<'_>]) {}
    fn copy_image(
        &mut self,
        _src: vk::Image,
        _src_layout: vk::ImageLayout,
        _dst: vk::Image,
        _dst_layout: vk::ImageLayout,
        _regions: &[vk::ImageCopy],
    ) {
    }
    fn set_viewport(&mut self, _viewport: vk::Viewport) {}
    fn set_scissor(&mut self, _scissor: vk::Rect2D) {}
    fn set_line_width(&mut self, _width: f32) {}
    fn set_cull_mode(&mut self, _mode: vk::CullModeFlags) {}
    fn set_front_face(&mut self, _face: vk::FrontFace) {}
    fn set_primitive_topology(&mut self, _topology: vk::PrimitiveTopology) {}
    fn set_depth_test_enable(&mut self, _enable: bool) {}
    fn set_depth_write_enable(&mut self, _enable: bool) {}
    fn set_depth_compare_op(&mut self, _op: vk::CompareOp) {}
    fn set_stencil_test_enable(&mut self, _enable: bool) {}
}

/// One entry of a [`CommandLog`].
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCommand {
    /// Rendering scope opened.
    BeginRendering {
        /// Render area extent.
        extent: vk::Extent2D,
        /// Color attachment views, in attachment order.
        color_views: Vec<vk::ImageView>,
        /// Load op of each color attachment.
        color_load_ops: Vec<vk::AttachmentLoadOp>,
        /// Depth attachment view, if any.
        depth_view: Option<vk::ImageView>,
        /// Load op of the depth attachment, if any.
        depth_load_op: Option<vk::AttachmentLoadOp>,
        /// Load op of the stencil attachment, if any.
        stencil_load_op: Option<vk::AttachmentLoadOp>,
    },
    /// Rendering scope closed.
    EndRendering,
    /// Image layout transition.
    Barrier {
        /// Transitioned image.
        image: vk::Image,
        /// Layout before the barrier.
        old_layout: vk::ImageLayout,
        /// Layout after the barrier.
        new_layout: vk::ImageLayout,
    },
    /// Image to image copy.
    CopyImage {
        /// Source image.
        src: vk::Image,
        /// Destination image.
        dst: vk::Image,
    },
    /// Viewport set, as `[x, y, width, height]`.
    Viewport([f32; 4]),
    /// Scissor set.
    Scissor(vk::Rect2D),
    /// Line width set.
    LineWidth(f32),
    /// Cull mode set.
    CullMode(vk::CullModeFlags),
    /// Front face set.
    FrontFace(vk::FrontFace),
    /// Topology set.
    Topology(vk::PrimitiveTopology),
    /// Depth test toggled.
    DepthTest(bool),
    /// Depth write toggled.
    DepthWrite(bool),
    /// Depth compare op set.
    DepthCompare(vk::CompareOp),
    /// Stencil test toggled.
    StencilTest(bool),
    /// Blend enables set.
    ColorBlendEnable(Vec<bool>),
    /// Write masks set.
    ColorWriteMask(Vec<vk::ColorComponentFlags>),
    /// Polygon mode set.
    PolygonMode(vk::PolygonMode),
    /// Rasterization samples set.
    RasterizationSamples(vk::SampleCountFlags),
}

/// Recorder that keeps a transcript of everything it receives.
///
/// Useful for capture tooling and for exercising the frame core without a
/// device.
#[derive(Debug, Default, Clone)]
pub struct CommandLog {
    commands: Vec<RecordedCommand>,
}

impl CommandLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded command in order.
    #[inline]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Counts commands matching a predicate.
    pub fn count(&self, pred: impl Fn(&RecordedCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }

    /// Number of rendering scopes opened.
    pub fn begin_rendering_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCommand::BeginRendering { .. }))
    }

    /// Number of rendering scopes closed.
    pub fn end_rendering_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCommand::EndRendering))
    }

    /// Returns the most recent `BeginRendering` entry.
    pub fn last_begin_rendering(&self) -> Option<&RecordedCommand> {
        self.commands
            .iter()
            .rev()
            .find(|c| matches!(c, RecordedCommand::BeginRendering { .. }))
    }

    /// Returns every barrier recorded for `image`, oldest first.
    pub fn barriers_for(&self, image: vk::Image) -> Vec<(vk::ImageLayout, vk::ImageLayout)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::Barrier {
                    image: i,
                    old_layout,
                    new_layout,
                } if *i == image => Some((*old_layout, *new_layout)),
                _ => None,
            })
            .collect()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl CommandRecorder for CommandLog {
    fn begin_rendering(&mut self, bundle: &RenderingInfoBundle) {
        let colors = bundle.color_attachments();
        self.commands.push(RecordedCommand::BeginRendering {
            extent: bundle.render_area().extent,
            color_views: colors.iter().map(|a| a.image_view).collect(),
            color_load_ops: colors.iter().map(|a| a.load_op).collect(),
            depth_view: bundle.depth_attachment().map(|a| a.image_view),
            depth_load_op: bundle.depth_attachment().map(|a| a.load_op),
            stencil_load_op: bundle.stencil_attachment().map(|a| a.load_op),
        });
    }

    fn end_rendering(&mut self) {
        self.commands.push(RecordedCommand::EndRendering);
    }

    fn image_barriers(&mut self, barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        self.commands
            .extend(barriers.iter().map(|b| RecordedCommand::Barrier {
                image: b.image,
                old_layout: b.old_layout,
                new_layout: b.new_layout,
            }));
    }

    fn copy_image(
        &mut self,
        src: vk::Image,
        _src_layout: vk::ImageLayout,
        dst: vk::Image,
        _dst_layout: vk::ImageLayout,
        _regions: &[vk::ImageCopy],
    ) {
        self.commands.push(RecordedCommand::CopyImage { src, dst });
    }

    fn set_viewport(&mut self, viewport: vk::Viewport) {
        self.commands.push(RecordedCommand::Viewport([
            viewport.x,
            viewport.y,
            viewport.width,
            viewport.height,
        ]));
    }

    fn set_scissor(&mut self, scissor: vk::Rect2D) {
        self.commands.push(RecordedCommand::Scissor(scissor));
    }

    fn set_line_width(&mut self, width: f32) {
        self.commands.push(RecordedCommand::LineWidth(width));
    }

    fn set_cull_mode(&mut self, mode: vk::CullModeFlags) {
        self.commands.push(RecordedCommand::CullMode(mode));
    }

    fn set_front_face(&mut self, face: vk::FrontFace) {
        self.commands.push(RecordedCommand::FrontFace(face));
    }

    fn set_primitive_topology(&mut self, topology: vk::PrimitiveTopology) {
        self.commands.push(RecordedCommand::Topology(topology));
    }

    fn set_depth_test_enable(&mut self, enable: bool) {
        self.commands.push(RecordedCommand::DepthTest(enable));
    }

    fn set_depth_write_enable(&mut self, enable: bool) {
        self.commands.push(RecordedCommand::DepthWrite(enable));
    }

    fn set_depth_compare_op(&mut self, op: vk::CompareOp) {
        self.commands.push(RecordedCommand::DepthCompare(op));
    }

    fn set_stencil_test_enable(&mut self, enable: bool) {
        self.commands.push(RecordedCommand::StencilTest(enable));
    }

    fn set_color_blend_enable(&mut self, _first_attachment: u32, enables: &[bool]) {
        self.commands
            .push(RecordedCommand::ColorBlendEnable(enables.to_vec()));
    }

    fn set_color_write_mask(&mut self, _first_attachment: u32, masks: &[vk::ColorComponentFlags]) {
        self.commands
            .push(RecordedCommand::ColorWriteMask(masks.to_vec()));
    }

    fn set_polygon_mode(&mut self, mode: vk::PolygonMode) {
        self.commands.push(RecordedCommand::PolygonMode(mode));
    }

    fn set_rasterization_samples(&mut self, samples: vk::SampleCountFlags) {
        self.commands
            .push(RecordedCommand::RasterizationSamples(samples));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
    use ash::vk::Handle;

    #[test]
    fn test_command_log_begin_rendering_captures_attachments() {
        let view = vk::ImageView::from_raw(7);
        let depth = vk::ImageView::from_raw(9);
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let bundle = RenderingConfig::from_extent(extent)
            .with_color_attachment(ColorAttachment::new(view).with_load_op(vk::AttachmentLoadOp::LOAD))
            .with_depth_attachment(DepthAttachment::new(depth))
            .build();

        let mut log = CommandLog::new();
        log.begin_rendering(&bundle);
        log.end_rendering();

        assert_eq!(log.begin_rendering_count(), 1);
        assert_eq!(log.end_rendering_count(), 1);
        match log.last_begin_rendering() {
            Some(RecordedCommand::BeginRendering {
                extent,
                color_views,
                color_load_ops,
                depth_view,
                depth_load_op,
                ..
            }) => {
                assert_eq!(extent.width, 640);
                assert_eq!(color_views, &vec![view]);
                assert_eq!(color_load_ops, &vec![vk::AttachmentLoadOp::LOAD]);
                assert_eq!(*depth_view, Some(depth));
                assert_eq!(*depth_load_op, Some(vk::AttachmentLoadOp::CLEAR));
            }
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn test_command_log_barriers_for_image() {
        let image = vk::Image::from_raw(3);
        let other = vk::Image::from_raw(4);
        let barriers = [
            vk::ImageMemoryBarrier2::default()
                .image(image)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            vk::ImageMemoryBarrier2::default()
                .image(other)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL),
        ];

        let mut log = CommandLog::new();
        log.image_barriers(&barriers);

        assert_eq!(
            log.barriers_for(image),
            vec![(
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            )]
        );
        assert_eq!(log.commands().len(), 2);
    }

    #[test]
    fn test_null_recorder_accepts_everything() {
        let mut recorder = NullRecorder;
        recorder.end_rendering();
        recorder.set_cull_mode(vk::CullModeFlags::BACK);
        recorder.set_line_width(1.0);
        recorder.set_polygon_mode(vk::PolygonMode::FILL);
    }

    #[test]
    fn test_recorders_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NullRecorder>();
        assert_send_sync::<CommandLog>();
    }
}
