//! Logical render targets and the registry that backs them.
//!
//! A [`RenderTarget`] names *where* draws land. The images themselves are
//! owned by the host through [`RenderTargetRegistry`]; the session only needs
//! to look them up per [`ImageSlot`] when it opens a pass or moves layouts.

use ash::vk;

/// Number of G-buffer color attachments (color, normal, position, specular,
/// emissive).
pub const GBUFFER_COUNT: u32 = 5;
/// Index of the emissive attachment inside the G-buffer.
pub const GBUFFER_EMISSIVE_INDEX: u32 = 4;
/// G-buffer attachment format.
pub const GBUFFER_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
/// Number of bloom ping-pong images.
pub const BLOOM_PING_PONG_COUNT: u32 = 2;
/// Mip levels of each bloom image.
pub const BLOOM_MIP_LEVELS: u32 = 4;

/// Logical identity of a render target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// Acquired swapchain image with the shared depth buffer.
    #[default]
    SwapchainWithDepth,
    /// Swapchain image without depth (deferred lighting).
    SwapchainNoDepth,
    /// HDR scene color with depth.
    SceneHdrWithDepth,
    /// HDR scene color alone.
    SceneHdrNoDepth,
    /// All G-buffer attachments with depth.
    DeferredGBuffer,
    /// The emissive G-buffer attachment with depth.
    GBufferEmissive,
    /// Face of a host-owned render-to-texture bitmap.
    BitmapRenderToTexture {
        /// Host bitmap handle.
        handle: i32,
        /// Cube face or array layer.
        face: u32,
    },
    /// Tonemapped LDR post-process image.
    PostLdr,
    /// Luminance image for FXAA.
    PostLuminance,
    /// SMAA edge detection output.
    SmaaEdges,
    /// SMAA blend weights.
    SmaaBlend,
    /// SMAA resolved output.
    SmaaOutput,
    /// One mip of a bloom ping-pong image.
    BloomMip {
        /// Ping-pong image index.
        ping_pong: u32,
        /// Mip level.
        mip: u32,
    },
}

impl RenderTarget {
    /// Returns false for bloom targets outside the ping-pong images or their
    /// mip chain.
    pub fn exists(self) -> bool {
        match self {
            Self::BloomMip { ping_pong, mip } => {
                ping_pong < BLOOM_PING_PONG_COUNT && mip < BLOOM_MIP_LEVELS
            }
            _ => true,
        }
    }

    /// Returns true if passes on this target bind the shared depth image.
    pub fn has_depth(self) -> bool {
        matches!(
            self,
            Self::SwapchainWithDepth
                | Self::SceneHdrWithDepth
                | Self::DeferredGBuffer
                | Self::GBufferEmissive
        )
    }

    /// Number of color attachments bound by this target.
    pub fn color_attachment_count(self) -> u32 {
        match self {
            Self::DeferredGBuffer => GBUFFER_COUNT,
            _ => 1,
        }
    }

    /// Image slots bound as color attachments, in attachment order.
    ///
    /// `image_index` selects the acquired swapchain image.
    pub fn color_slots(self, image_index: u32) -> Vec<ImageSlot> {
        match self {
            Self::SwapchainWithDepth | Self::SwapchainNoDepth => {
                vec![ImageSlot::Swapchain(image_index)]
            }
            Self::SceneHdrWithDepth | Self::SceneHdrNoDepth => vec![ImageSlot::SceneHdr],
            Self::DeferredGBuffer => (0..GBUFFER_COUNT).map(ImageSlot::GBuffer).collect(),
            Self::GBufferEmissive => vec![ImageSlot::GBuffer(GBUFFER_EMISSIVE_INDEX)],
            Self::BitmapRenderToTexture { handle, face } => {
                vec![ImageSlot::Bitmap { handle, face }]
            }
            Self::PostLdr => vec![ImageSlot::PostLdr],
            Self::PostLuminance => vec![ImageSlot::PostLuminance],
            Self::SmaaEdges => vec![ImageSlot::SmaaEdges],
            Self::SmaaBlend => vec![ImageSlot::SmaaBlend],
            Self::SmaaOutput => vec![ImageSlot::SmaaOutput],
            Self::BloomMip { ping_pong, .. } => vec![ImageSlot::Bloom(ping_pong)],
        }
    }

    /// Mip level rendered into, for targets that address one mip.
    pub fn mip_level(self) -> u32 {
        match self {
            Self::BloomMip { mip, .. } => mip,
            _ => 0,
        }
    }
}

/// A physical image whose layout the session tracks.
///
/// All mips of a bloom image share one tracked layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    /// Swapchain image by index.
    Swapchain(u32),
    /// Shared depth (and stencil) image.
    Depth,
    /// HDR scene color.
    SceneHdr,
    /// Read-only snapshot of the HDR scene.
    SceneEffect,
    /// LDR post-process image.
    PostLdr,
    /// Luminance image.
    PostLuminance,
    /// SMAA edges.
    SmaaEdges,
    /// SMAA blend weights.
    SmaaBlend,
    /// SMAA output.
    SmaaOutput,
    /// Bloom ping-pong image.
    Bloom(u32),
    /// G-buffer attachment by index.
    GBuffer(u32),
    /// Host render-to-texture bitmap face.
    Bitmap {
        /// Host bitmap handle.
        handle: i32,
        /// Cube face or array layer.
        face: u32,
    },
}

impl ImageSlot {
    /// Returns true if the slot's contents outlive a frame.
    ///
    /// Everything except render-to-texture bitmaps is re-rendered each frame
    /// and may be recreated on resize.
    #[inline]
    pub fn is_persistent(self) -> bool {
        matches!(self, Self::Bitmap { .. })
    }
}

/// Image handles plus format, as supplied by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentImage {
    /// Image handle, used for barriers and copies.
    pub image: vk::Image,
    /// View bound as the attachment.
    pub view: vk::ImageView,
    /// Image format.
    pub format: vk::Format,
}

/// Attachment contract a pipeline must match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTargetInfo {
    /// Format of the color attachments.
    pub color_format: vk::Format,
    /// Number of color attachments.
    pub color_attachment_count: u32,
    /// Depth format, `vk::Format::UNDEFINED` when there is no depth.
    pub depth_format: vk::Format,
    /// Sample count of the attachments.
    pub samples: vk::SampleCountFlags,
}

impl Default for RenderTargetInfo {
    fn default() -> Self {
        Self {
            color_format: vk::Format::UNDEFINED,
            color_attachment_count: 1,
            depth_format: vk::Format::UNDEFINED,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }
}

impl RenderTargetInfo {
    /// Returns true when a depth attachment is bound.
    #[inline]
    pub fn has_depth(&self) -> bool {
        self.depth_format != vk::Format::UNDEFINED
    }
}

/// Host-owned render target images.
pub trait RenderTargetRegistry {
    /// Looks up the image behind `slot`.
    fn image(&self, slot: ImageSlot) -> Option<AttachmentImage>;

    /// Render area of `target` in pixels.
    fn extent(&self, target: RenderTarget) -> vk::Extent2D;

    /// Sample count of `target`'s attachments.
    fn samples(&self, _target: RenderTarget) -> vk::SampleCountFlags {
        vk::SampleCountFlags::TYPE_1
    }

    /// View to bind when `target` renders into `image`.
    ///
    /// Registries override this to return per-mip or per-face views.
    fn view_for(&self, _target: RenderTarget, image: &AttachmentImage) -> vk::ImageView {
        image.view
    }
}

/// Returns true for depth formats that carry a stencil aspect.
pub fn format_has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}
