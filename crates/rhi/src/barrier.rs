//! Image layout transition helpers (synchronization2).
//!
//! [`ImageTransition`] describes a single layout change; [`ImageTransition::to_barrier`]
//! derives the stage and access masks from the old and new layouts so callers
//! only say *what* changes.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use vkframe_rhi::barrier::ImageTransition;
//!
//! # fn example(image: vk::Image) {
//! let barrier = ImageTransition::color(
//!     image,
//!     vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
//!     vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
//! )
//! .to_barrier();
//! # }
//! ```

use ash::vk;

/// Stage and access scope touching an image in a given layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutScope {
    /// Pipeline stages that use the image in this layout.
    pub stage: vk::PipelineStageFlags2,
    /// Memory accesses performed in those stages.
    pub access: vk::AccessFlags2,
}

/// Returns the scope that reads or writes an image held in `layout`.
///
/// `UNDEFINED` maps to top-of-pipe with no access, which makes it a valid
/// source scope for discarding transitions.
pub fn layout_scope(layout: vk::ImageLayout) -> LayoutScope {
    let (stage, access) = match layout {
        vk::ImageLayout::UNDEFINED => (vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => (
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_READ,
        ),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => {
            (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE)
        }
        _ => (
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        ),
    };
    LayoutScope { stage, access }
}

/// An image layout change over one array layer and a run of mips.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageTransition {
    /// Image to transition.
    pub image: vk::Image,
    /// Aspect of the image.
    pub aspect: vk::ImageAspectFlags,
    /// Current layout (may be `UNDEFINED` to discard contents).
    pub old_layout: vk::ImageLayout,
    /// Target layout.
    pub new_layout: vk::ImageLayout,
    /// Number of mip levels from level 0.
    pub level_count: u32,
    /// Array layer (cube face) to transition.
    pub base_layer: u32,
}

impl ImageTransition {
    /// Color-aspect transition.
    #[inline]
    pub fn color(image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        Self {
            image,
            aspect: vk::ImageAspectFlags::COLOR,
            old_layout,
            new_layout,
            level_count: 1,
            base_layer: 0,
        }
    }

    /// Depth (and optionally stencil) aspect transition.
    #[inline]
    pub fn depth(
        image: vk::Image,
        has_stencil: bool,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Self {
        let aspect = if has_stencil {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        };
        Self {
            image,
            aspect,
            old_layout,
            new_layout,
            level_count: 1,
            base_layer: 0,
        }
    }

    /// Covers `level_count` mips starting at level 0.
    #[inline]
    pub fn with_level_count(mut self, level_count: u32) -> Self {
        self.level_count = level_count.max(1);
        self
    }

    /// Targets a single array layer.
    #[inline]
    pub fn with_layer(mut self, layer: u32) -> Self {
        self.base_layer = layer;
        self
    }

    /// Returns true when the old and new layouts are identical.
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.old_layout == self.new_layout
    }

    /// Builds the `VkImageMemoryBarrier2` for this transition.
    pub fn to_barrier(&self) -> vk::ImageMemoryBarrier2<'static> {
        let src = layout_scope(self.old_layout);
        let dst = layout_scope(self.new_layout);
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src.stage)
            .src_access_mask(src.access)
            .dst_stage_mask(dst.stage)
            .dst_access_mask(dst.access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(self.aspect)
                    .base_mip_level(0)
                    .level_count(self.level_count)
                    .base_array_layer(self.base_layer)
                    .layer_count(1),
            )
    }
}

/// Converts a batch of transitions into barriers, dropping no-ops.
pub fn to_barriers(transitions: &[ImageTransition]) -> Vec<vk::ImageMemoryBarrier2<'static>> {
    transitions
        .iter()
        .filter(|t| !t.is_noop())
        .map(ImageTransition::to_barrier)
        .collect()
}
