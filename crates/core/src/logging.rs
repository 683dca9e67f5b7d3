//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,vkframe=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (RUST_LOG), defaulting to `info,vkframe=debug`
/// - Target and thread ids on every line
///
/// Panics if a global subscriber is already installed; use
/// [`try_init_logging`] from tests.
///
/// # Example
/// ```no_run
/// vkframe_core::init_logging();
/// tracing::info!("Frame orchestrator initialized");
/// ```
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Like [`init_logging`], but returns `false` instead of panicking when a
/// subscriber has already been installed.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_thread_ids(true).with_test_writer())
        .try_init()
        .is_ok()
}
