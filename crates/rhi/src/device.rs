//! Device context shared by the orchestration layer.
//!
//! Instance, physical device selection and logical device creation belong to
//! the host application. This module wraps the resulting handles together with
//! a gpu-allocator instance and the optional feature set the frame core cares
//! about.
//!
//! # Overview
//!
//! - [`DeviceCaps`] records optional features (extended dynamic state 3,
//!   vertex attribute divisors)
//! - [`Device`] owns the memory allocator and exposes the `ash` dispatch tables
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vkframe_rhi::device::{Device, DeviceCaps};
//!
//! # fn example(
//! #     instance: &ash::Instance,
//! #     physical_device: vk::PhysicalDevice,
//! #     logical: ash::Device,
//! #     queue: vk::Queue,
//! # ) -> Result<(), vkframe_rhi::RhiError> {
//! let device: Arc<Device> = Device::from_raw(
//!     instance,
//!     physical_device,
//!     logical,
//!     queue,
//!     0,
//!     DeviceCaps::default(),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};

/// Which VK_EXT_extended_dynamic_state3 states the device supports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtendedDynamicState3Caps {
    /// `extendedDynamicState3ColorBlendEnable`
    pub color_blend_enable: bool,
    /// `extendedDynamicState3ColorWriteMask`
    pub color_write_mask: bool,
    /// `extendedDynamicState3PolygonMode`
    pub polygon_mode: bool,
    /// `extendedDynamicState3RasterizationSamples`
    pub rasterization_samples: bool,
}

impl ExtendedDynamicState3Caps {
    /// All four states supported.
    pub const ALL: Self = Self {
        color_blend_enable: true,
        color_write_mask: true,
        polygon_mode: true,
        rasterization_samples: true,
    };

    /// Returns true if any state is supported.
    #[inline]
    pub fn any(&self) -> bool {
        self.color_blend_enable
            || self.color_write_mask
            || self.polygon_mode
            || self.rasterization_samples
    }
}

/// Optional device features consumed by the frame core.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Extended dynamic state 3 support, `None` when the extension is absent.
    pub extended_dynamic_state3: Option<ExtendedDynamicState3Caps>,
    /// `vertexAttributeInstanceRateDivisor` for divisors greater than one.
    pub vertex_attribute_divisor: bool,
}

/// Device context wrapper.
///
/// Holds a clone of the host's `ash::Device` dispatch table, the graphics
/// queue the frame core submits to, and the gpu-allocator instance every
/// buffer allocation goes through.
///
/// # Thread Safety
///
/// The [`Device`] is designed to be shared using `Arc`. The internal
/// allocator is protected by a `Mutex`.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    allocator: Mutex<Allocator>,
    graphics_queue: vk::Queue,
    graphics_family: u32,
    caps: DeviceCaps,
    eds3: Option<ash::ext::extended_dynamic_state3::Device>,
}

impl Device {
    /// Wraps an externally created logical device.
    ///
    /// The logical device must have been created with Vulkan 1.3 dynamic
    /// rendering and synchronization2 enabled, plus the
    /// VK_EXT_extended_dynamic_state3 extension when `caps` reports it.
    ///
    /// # Errors
    ///
    /// Returns an error if allocator initialization fails.
    pub fn from_raw(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        graphics_queue: vk::Queue,
        graphics_family: u32,
        caps: DeviceCaps,
    ) -> RhiResult<Arc<Self>> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        info!("GPU memory allocator initialized");

        let eds3 = caps
            .extended_dynamic_state3
            .filter(ExtendedDynamicState3Caps::any)
            .map(|_| ash::ext::extended_dynamic_state3::Device::new(instance, &device));

        debug!("Device caps: {:?}", caps);

        Ok(Arc::new(Self {
            device,
            physical_device,
            allocator: Mutex::new(allocator),
            graphics_queue,
            graphics_family,
            caps,
            eds3,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the graphics queue family index.
    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// Returns the optional feature set.
    #[inline]
    pub fn caps(&self) -> DeviceCaps {
        self.caps
    }

    /// Returns the extended dynamic state 3 dispatch table when enabled.
    #[inline]
    pub fn extended_dynamic_state3(&self) -> Option<&ash::ext::extended_dynamic_state3::Device> {
        self.eds3.as_ref()
    }

    /// Locks the GPU memory allocator.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SyncError`] if a previous holder panicked.
    pub fn lock_allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::SyncError("GPU allocator mutex poisoned".to_string()))
    }

    /// Waits for the device to become idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // The logical device belongs to the host; only the allocator is ours.
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            tracing::error!("Failed to wait for device idle during drop: {:?}", e);
        }
        info!("Device context released");
    }
}
