//! Dynamic rendering attachments (Vulkan 1.3).
//!
//! Passes are opened with `vkCmdBeginRendering`, so there are no render pass
//! or framebuffer objects. A [`RenderingConfig`] collects the attachments of
//! one pass and [`RenderingConfig::build`] turns it into a
//! [`RenderingInfoBundle`] the recorder can consume.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use vkframe_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
//! use vkframe_rhi::recorder::CommandRecorder;
//!
//! # fn example(color_view: vk::ImageView, depth_view: vk::ImageView, cmd: &mut impl CommandRecorder) {
//! let extent = vk::Extent2D { width: 1920, height: 1080 };
//! let bundle = RenderingConfig::from_extent(extent)
//!     .with_color_attachment(ColorAttachment::new(color_view).with_clear_color([0.0, 0.0, 0.0, 1.0]))
//!     .with_depth_attachment(DepthAttachment::new(depth_view).with_clear_depth(1.0))
//!     .build();
//!
//! cmd.begin_rendering(&bundle);
//! // ... draw commands ...
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// Color attachment of a pass.
///
/// Starts out cleared to opaque black and stored.
#[derive(Clone, Copy, Debug)]
pub struct ColorAttachment {
    pub view: vk::ImageView,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    /// RGBA clear value, used when `load_op` is `CLEAR`.
    pub clear: [f32; 4],
}

impl ColorAttachment {
    #[inline]
    pub fn new(view: vk::ImageView) -> Self {
        Self {
            view,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear: [0.0, 0.0, 0.0, 1.0],
        }
    }

    #[inline]
    pub fn with_load_op(mut self, load_op: vk::AttachmentLoadOp) -> Self {
        self.load_op = load_op;
        self
    }

    #[inline]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear = color;
        self
    }

    fn to_vk(self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: self.clear },
            })
    }
}

/// Depth attachment of a pass, optionally bound as stencil too.
///
/// Combined depth/stencil formats must bind the same view to both slots;
/// [`with_stencil`](Self::with_stencil) does that.
#[derive(Clone, Copy, Debug)]
pub struct DepthAttachment {
    pub view: vk::ImageView,
    pub load_op: vk::AttachmentLoadOp,
    /// Load op of the stencil aspect, `None` for depth-only formats.
    pub stencil_load_op: Option<vk::AttachmentLoadOp>,
    pub clear_depth: f32,
}

impl DepthAttachment {
    /// Depth-only attachment, cleared to 1.0.
    #[inline]
    pub fn new(view: vk::ImageView) -> Self {
        Self {
            view,
            load_op: vk::AttachmentLoadOp::CLEAR,
            stencil_load_op: None,
            clear_depth: 1.0,
        }
    }

    #[inline]
    pub fn with_load_op(mut self, load_op: vk::AttachmentLoadOp) -> Self {
        self.load_op = load_op;
        self
    }

    /// Binds the stencil aspect with `load_op`. Stencil clears to 0.
    #[inline]
    pub fn with_stencil(mut self, load_op: vk::AttachmentLoadOp) -> Self {
        self.stencil_load_op = Some(load_op);
        self
    }

    #[inline]
    pub fn with_clear_depth(mut self, depth: f32) -> Self {
        self.clear_depth = depth;
        self
    }

    /// Layout the image must be in during the pass.
    pub fn layout(&self) -> vk::ImageLayout {
        if self.stencil_load_op.is_some() {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        }
    }

    fn aspect_info(&self, load_op: vk::AttachmentLoadOp) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(self.layout())
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// Attachments and render area of one pass.
#[derive(Clone, Debug, Default)]
pub struct RenderingConfig {
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
    pub render_area: vk::Rect2D,
}

impl RenderingConfig {
    /// Pass covering `extent` from the origin.
    #[inline]
    pub fn from_extent(extent: vk::Extent2D) -> Self {
        Self {
            color_attachments: Vec::new(),
            depth_attachment: None,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        }
    }

    /// Appends a color attachment. Attachment order is binding order.
    #[inline]
    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    #[inline]
    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    pub fn build(&self) -> RenderingInfoBundle {
        let depth = self.depth_attachment.as_ref();
        RenderingInfoBundle {
            color_attachments: self.color_attachments.iter().map(|a| a.to_vk()).collect(),
            depth_attachment: depth.map(|d| d.aspect_info(d.load_op)),
            stencil_attachment: depth
                .and_then(|d| d.stencil_load_op.map(|load_op| d.aspect_info(load_op))),
            render_area: self.render_area,
        }
    }
}

/// Owned attachment infos backing a `VkRenderingInfo`.
///
/// [`info`](Self::info) borrows the arrays, so the bundle must outlive the
/// begin-rendering call.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    stencil_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);
        if let Some(depth) = &self.depth_attachment {
            info = info.depth_attachment(depth);
        }
        if let Some(stencil) = &self.stencil_attachment {
            info = info.stencil_attachment(stencil);
        }
        info
    }

    #[inline]
    pub fn color_attachments(&self) -> &[vk::RenderingAttachmentInfo<'static>] {
        &self.color_attachments
    }

    #[inline]
    pub fn depth_attachment(&self) -> Option<&vk::RenderingAttachmentInfo<'static>> {
        self.depth_attachment.as_ref()
    }

    #[inline]
    pub fn stencil_attachment(&self) -> Option<&vk::RenderingAttachmentInfo<'static>> {
        self.stencil_attachment.as_ref()
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent() -> vk::Extent2D {
        vk::Extent2D {
            width: 1920,
            height: 1080,
        }
    }

    #[test]
    fn test_color_attachment_defaults_to_clear() {
        let bundle = RenderingConfig::from_extent(extent())
            .with_color_attachment(ColorAttachment::new(vk::ImageView::null()))
            .build();
        let color = &bundle.color_attachments()[0];
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.image_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_depth_only_has_no_stencil_slot() {
        let depth = DepthAttachment::new(vk::ImageView::null());
        assert_eq!(depth.layout(), vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);

        let bundle = RenderingConfig::from_extent(extent())
            .with_depth_attachment(depth)
            .build();
        assert!(bundle.depth_attachment().is_some());
        assert!(bundle.stencil_attachment().is_none());
    }

    #[test]
    fn test_stencil_has_its_own_load_op() {
        let depth = DepthAttachment::new(vk::ImageView::null())
            .with_load_op(vk::AttachmentLoadOp::LOAD)
            .with_stencil(vk::AttachmentLoadOp::CLEAR);
        let bundle = RenderingConfig::from_extent(extent())
            .with_depth_attachment(depth)
            .build();

        let depth_info = bundle.depth_attachment().unwrap();
        let stencil_info = bundle.stencil_attachment().unwrap();
        assert_eq!(depth_info.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(stencil_info.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(
            stencil_info.image_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_info_references_every_attachment() {
        let mut config = RenderingConfig::from_extent(extent());
        for _ in 0..5 {
            config = config.with_color_attachment(ColorAttachment::new(vk::ImageView::null()));
        }
        let bundle = config.build();

        let info = bundle.info();
        assert_eq!(info.render_area.extent.width, 1920);
        assert_eq!(info.color_attachment_count, 5);
        assert_eq!(info.layer_count, 1);
        assert!(info.p_depth_attachment.is_null());
    }

    #[test]
    fn test_rendering_info_bundle_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RenderingInfoBundle>();
        assert_send_sync::<RenderingConfig>();
    }
}
