//! Renderer configuration.
//!
//! Configuration is plain JSON, for example:
//!
//! ```json
//! {
//!   "frames_in_flight": 2,
//!   "release_window": 3,
//!   "max_bindless_textures": 1024,
//!   "extended_dynamic_state3": true
//! }
//! ```
//!
//! Missing fields take their default values.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Upper bound on frames in flight supported by the frame slot ring.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 3;

/// Number of bindless slots reserved for builtin textures.
pub const RESERVED_BINDLESS_SLOTS: u32 = 4;

/// Tunables for the frame orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of frame slots recorded ahead of the GPU.
    pub frames_in_flight: u32,
    /// How many serials a retired resource waits before it is destroyed.
    pub release_window: u32,
    /// Size of the bindless texture descriptor array, reserved slots included.
    pub max_bindless_textures: u32,
    /// Bytes of transient per-frame ring memory per frame slot.
    pub ring_buffer_size: u64,
    /// Minimum alignment of ring sub-allocations.
    pub ring_buffer_alignment: u64,
    /// Whether VK_EXT_extended_dynamic_state3 states are made dynamic.
    pub extended_dynamic_state3: bool,
    /// Default clear color for the first pass of every frame.
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            release_window: 3,
            max_bindless_textures: 1024,
            ring_buffer_size: 4 * 1024 * 1024,
            ring_buffer_alignment: 256,
            extended_dynamic_state3: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RendererConfig {
    /// Parses a configuration from a JSON string and validates it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        info!("Loaded renderer config from {:?}", path);
        Ok(config)
    }

    /// Loads a configuration file, falling back to defaults on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default renderer config ({:?}: {})", path, e);
                Self::default()
            }
        }
    }

    /// Serializes this configuration as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks that all values are within supported bounds.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }

        if self.release_window < self.frames_in_flight {
            return Err(Error::Config(format!(
                "release_window ({}) must be at least frames_in_flight ({})",
                self.release_window, self.frames_in_flight
            )));
        }

        if self.max_bindless_textures <= RESERVED_BINDLESS_SLOTS {
            return Err(Error::Config(format!(
                "max_bindless_textures must exceed the {} reserved slots, got {}",
                RESERVED_BINDLESS_SLOTS, self.max_bindless_textures
            )));
        }

        if !self.ring_buffer_alignment.is_power_of_two() {
            return Err(Error::Config(format!(
                "ring_buffer_alignment must be a power of two, got {}",
                self.ring_buffer_alignment
            )));
        }

        if self.ring_buffer_size < self.ring_buffer_alignment {
            return Err(Error::Config(format!(
                "ring_buffer_size ({}) is smaller than its alignment ({})",
                self.ring_buffer_size, self.ring_buffer_alignment
            )));
        }

        Ok(())
    }
}
