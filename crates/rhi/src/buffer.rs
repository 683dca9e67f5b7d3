//! GPU buffer allocation.
//!
//! Buffers are backed by gpu-allocator. Dropping a [`Buffer`] frees its
//! memory and destroys the handle immediately, so owners that may still have
//! the buffer referenced by in-flight GPU work must hand it to a deferred
//! release queue instead of dropping it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let vertices: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//! let buffer = Buffer::new(device, BufferUsage::Vertex, 24)?;
//! buffer.write_data(0, bytemuck::cast_slice(&vertices))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// What a buffer is bound as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    /// Read by vertex-pulling shaders.
    Storage,
    /// Per-frame ring memory sliced into vertex, index and uniform ranges.
    Transient,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        use vk::BufferUsageFlags as F;
        match self {
            Self::Vertex => F::VERTEX_BUFFER | F::TRANSFER_DST,
            Self::Index => F::INDEX_BUFFER | F::TRANSFER_DST,
            Self::Uniform => F::UNIFORM_BUFFER | F::TRANSFER_DST,
            Self::Storage => F::STORAGE_BUFFER | F::TRANSFER_DST,
            Self::Transient => {
                F::VERTEX_BUFFER | F::INDEX_BUFFER | F::UNIFORM_BUFFER | F::STORAGE_BUFFER
            }
        }
    }

    /// Allocation name, shown in allocator reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Index => "index",
            Self::Uniform => "uniform",
            Self::Storage => "storage",
            Self::Transient => "transient",
        }
    }
}

/// Buffer in persistently mapped host-visible memory.
///
/// Every usage streams through mapped memory; there are no staging copies.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates and binds a `size` byte buffer. Zero sizes are rejected.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!("empty {} buffer", usage.name())));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.lock_allocator().and_then(|mut allocator| {
            Ok(allocator.allocate(&AllocationCreateDesc {
                name: usage.name(),
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?)
        });

        let allocation = allocation.inspect_err(|_| unsafe {
            device.handle().destroy_buffer(buffer, None)
        })?;

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Copies `data` into the mapping at `offset`.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let in_bounds = offset
            .checked_add(data.len() as vk::DeviceSize)
            .is_some_and(|end| end <= self.size);
        if !in_bounds {
            return Err(RhiError::InvalidHandle(format!(
                "write of {} bytes at {} overflows {} byte buffer",
                data.len(),
                offset,
                self.size
            )));
        }

        let mapped_ptr = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| RhiError::InvalidHandle("buffer memory is not mapped".into()))?;

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Writes a plain-old-data value at `offset`.
    pub fn write_pod<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, value: &T) -> RhiResult<()> {
        self.write_data(offset, bytemuck::bytes_of(value))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        tracing::error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(e) => tracing::error!("Leaking buffer allocation: {}", e),
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer ({} bytes)", self.usage.name(), self.size);
    }
}
