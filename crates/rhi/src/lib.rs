//! Vulkan abstraction layer (Render Hardware Interface) for the frame core.
//!
//! This crate wraps the `ash` calls the orchestration layer needs:
//! - Device context and GPU memory allocator
//! - The [`recorder::CommandRecorder`] seam and its Vulkan implementation
//! - Synchronization2 image barriers
//! - Dynamic rendering attachments
//! - Graphics pipeline building
//! - Buffers and timeline-semaphore serials

mod error;

pub mod barrier;
pub mod buffer;
pub mod command;
pub mod device;
pub mod pipeline;
pub mod recorder;
pub mod rendering;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
