//! Core utilities for the vkframe orchestration crates.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Configuration management

mod config;
mod error;
mod logging;

pub use config::{MAX_FRAMES_IN_FLIGHT, RESERVED_BINDLESS_SLOTS, RendererConfig};
pub use error::{Error, Result};
pub use logging::{init_logging, try_init_logging};
