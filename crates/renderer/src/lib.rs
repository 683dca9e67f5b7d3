//! Per-frame GPU orchestration.
//!
//! This crate coordinates what happens between `begin_frame` and
//! `end_frame`:
//! - Frame lifecycle and frame-in-flight slots
//! - Serial-gated deferred destruction
//! - Bindless texture slots and their pending upload queue
//! - Render-target switching, dynamic rendering passes and image layouts
//! - Pipeline keys and the pipeline cache
//! - Reusable GPU buffers and the per-frame transient ring

pub mod bindless;
pub mod buffer_manager;
pub mod clear_ops;
pub mod deferred_release;
mod error;
pub mod frame;
pub mod frame_lifecycle;
pub mod orchestrator;
pub mod pipeline_cache;
pub mod pipeline_key;
pub mod render_target;
pub mod rendering_session;
pub mod ring_buffer;
pub mod texture_id;

pub use bindless::{BindlessResidency, PendingUploadQueue, SlotAssignment};
pub use deferred_release::{DeferredReleaseQueue, Serial};
pub use error::{RenderError, RenderResult};
pub use frame::{FrameCtx, FrameSlots};
pub use frame_lifecycle::{FrameIndex, FrameLifecycleTracker};
pub use orchestrator::FrameOrchestrator;
pub use pipeline_cache::PipelineCache;
pub use pipeline_key::{PipelineKey, ShaderType};
pub use render_target::{RenderTarget, RenderTargetRegistry};
pub use rendering_session::RenderingSession;
pub use texture_id::TextureId;
