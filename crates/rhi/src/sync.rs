//! Submission serials.
//!
//! The frame core never waits on fences. It asks a [`SerialSource`] for the
//! most recent serial the GPU has finished and releases everything older.
//! [`TimelineSemaphore`] is the Vulkan source: every submission signals the
//! next value, and the low 32 bits of the counter are the completed serial.
//! The counter itself stays 64-bit and only grows; [`timeline_value`] lifts a
//! wrapped serial back onto it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::sync::{SerialSource, TimelineSemaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let timeline = TimelineSemaphore::new(device, 0)?;
//! let value = timeline.value_for_serial(1);
//! // ... submit work signalling `value` ...
//! timeline.wait(value, u64::MAX)?;
//! assert!(timeline.completed_serial()? >= 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Anything that can report the latest serial the GPU has completed.
///
/// Serials are 32-bit and compared with wrapping arithmetic.
pub trait SerialSource {
    /// Returns the most recent completed serial.
    fn completed_serial(&self) -> RhiResult<u32>;
}

/// Wrapped 32-bit serial of a timeline value.
#[inline]
pub fn serial_of(value: u64) -> u32 {
    (value & u64::from(u32::MAX)) as u32
}

/// Timeline value for `serial`, the first at or after `previous` whose low
/// 32 bits equal it.
///
/// Serials handed out in order map to strictly increasing values, across
/// the 32-bit wrap as well.
#[inline]
pub fn timeline_value(serial: u32, previous: u64) -> u64 {
    previous + u64::from(serial.wrapping_sub(serial_of(previous)))
}

/// Vulkan timeline semaphore.
///
/// # Thread Safety
///
/// Querying and host-waiting are externally synchronized by Vulkan, so the
/// wrapper can be shared between threads.
pub struct TimelineSemaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
    /// Highest value handed out for signalling.
    issued: AtomicU64,
}

impl TimelineSemaphore {
    /// Creates a timeline semaphore starting at `initial_value`.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>, initial_value: u64) -> RhiResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created timeline semaphore (initial value {})", initial_value);

        Ok(Self {
            device,
            semaphore,
            issued: AtomicU64::new(initial_value),
        })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Returns the current counter value.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails (e.g. device lost).
    pub fn value(&self) -> RhiResult<u64> {
        let value = unsafe {
            self.device
                .handle()
                .get_semaphore_counter_value(self.semaphore)?
        };
        Ok(value)
    }

    /// Blocks until the counter reaches `value` or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns `vk::Result::TIMEOUT` wrapped in [`RhiError`](crate::RhiError)
    /// if the wait expires.
    pub fn wait(&self, value: u64, timeout: u64) -> RhiResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.device.handle().wait_semaphores(&wait_info, timeout)? };
        Ok(())
    }

    /// Timeline value a submission tagged with `serial` must signal.
    ///
    /// Call once per submission, in serial order.
    pub fn value_for_serial(&self, serial: u32) -> u64 {
        let previous = self
            .issued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                Some(timeline_value(serial, prev))
            })
            .unwrap_or_else(|prev| prev);
        timeline_value(serial, previous)
    }

    /// Signals `value` from the host.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not greater than the current value.
    pub fn signal(&self, value: u64) -> RhiResult<()> {
        let signal_info = vk::SemaphoreSignalInfo::default()
            .semaphore(self.semaphore)
            .value(value);
        unsafe { self.device.handle().signal_semaphore(&signal_info)? };
        self.issued.fetch_max(value, Ordering::AcqRel);
        Ok(())
    }

    /// Submit-info entry that signals `value` at `stage`.
    pub fn signal_info(
        &self,
        value: u64,
        stage: vk::PipelineStageFlags2,
    ) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo::default()
            .semaphore(self.semaphore)
            .value(value)
            .stage_mask(stage)
    }
}

impl SerialSource for TimelineSemaphore {
    fn completed_serial(&self) -> RhiResult<u32> {
        Ok(serial_of(self.value()?))
    }
}

impl Drop for TimelineSemaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed timeline semaphore");
    }
}
