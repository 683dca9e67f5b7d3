//! Renderer error types.

use thiserror::Error;
use vkframe_rhi::RhiError;

use crate::render_target::{ImageSlot, RenderTarget};

/// Errors returned by the frame orchestration core.
///
/// Most variants are caller bugs: the operation was issued in a state where
/// it is not allowed. They are returned rather than panicking so the host
/// can decide how loudly to fail.
#[derive(Error, Debug)]
pub enum RenderError {
    /// An operation that needs the render pass closed was called inside one
    #[error("{0} requires no active render pass")]
    PassActive(&'static str),

    /// An operation was called while a different target was selected
    #[error("{op} requires target {expected:?}, but {actual:?} is selected")]
    WrongTarget {
        /// Operation name.
        op: &'static str,
        /// Target the operation requires.
        expected: RenderTarget,
        /// Target that was selected.
        actual: RenderTarget,
    },

    /// A target names a bloom image or mip that does not exist
    #[error("{0:?} does not exist")]
    InvalidTarget(RenderTarget),

    /// A frame-scoped operation was called while no frame is recording
    #[error("{0} called while no frame is recording")]
    FrameNotRecording(&'static str),

    /// An image was read before anything rendered into it this frame
    #[error("{0:?} has not been written this frame")]
    LayoutNeverWritten(ImageSlot),

    /// The render-target registry has no image for a slot
    #[error("render-target registry has no image for {0:?}")]
    MissingAttachment(ImageSlot),

    /// A pipeline key failed validation
    #[error("invalid pipeline key: {0}")]
    InvalidPipelineKey(String),

    /// The key's layout hash does not match the vertex layout passed in
    #[error("pipeline key layout hash {key:#018x} does not match vertex layout {layout:#018x}")]
    LayoutHashMismatch {
        /// Hash stored in the key.
        key: u64,
        /// Hash of the layout passed to the cache.
        layout: u64,
    },

    /// A buffer handle that was never created or was already deleted
    #[error("unknown buffer handle {0}")]
    UnknownBuffer(u32),

    /// Error from the Vulkan layer
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] vkframe_core::Error),
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
