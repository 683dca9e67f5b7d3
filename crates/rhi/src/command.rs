//! Command pools and the Vulkan [`CommandRecorder`] backend.
//!
//! [`CommandBuffer`] forwards every recorder call to the matching `vkCmd*`
//! entry point. Extended dynamic state 3 calls are dropped when the device
//! did not enable the extension.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::command::{CommandPool, CommandBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone(), device.graphics_family())?;
//! let mut cmd = CommandBuffer::new(device.clone(), &pool)?;
//!
//! cmd.begin()?;
//! // ... hand `&mut cmd` to the frame core ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::recorder::CommandRecorder;
use crate::rendering::RenderingInfoBundle;

/// Resettable command pool, one per recording thread.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Creates a pool on `queue_family_index` whose buffers can be reset
    /// individually.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };
        debug!("Command pool created on queue family {}", queue_family_index);
        Ok(Self { device, pool })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocates `count` primary buffers.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        Ok(unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? })
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_command_pool(self.pool, None) };
        debug!("Command pool destroyed");
    }
}

/// Primary command buffer recording one frame slot.
///
/// The handle belongs to its [`CommandPool`] and is freed with it.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool
            .allocate_command_buffers(1)?
            .pop()
            .ok_or_else(|| RhiError::InvalidHandle("command pool returned no buffer".into()))?;
        Ok(Self { device, buffer })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Resets the buffer and starts one-time-submit recording.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let device = self.device.handle();
        unsafe {
            device.reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
            device.begin_command_buffer(self.buffer, &begin_info)?;
        }
        Ok(())
    }

    /// Finishes recording.
    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.device.handle().end_command_buffer(self.buffer)? };
        Ok(())
    }
}

impl CommandRecorder for CommandBuffer {
    fn begin_rendering(&mut self, bundle: &RenderingInfoBundle) {
        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, &bundle.info());
        }
    }

    fn end_rendering(&mut self) {
        unsafe {
            self.device.handle().cmd_end_rendering(self.buffer);
        }
    }

    fn image_barriers(&mut self, barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        if barriers.is_empty() {
            return;
        }
        let dependency = vk::DependencyInfo::default().image_memory_barriers(barriers);
        unsafe {
            self.device
                .handle()
                .cmd_pipeline_barrier2(self.buffer, &dependency);
        }
    }

    fn copy_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        unsafe {
            self.device.handle().cmd_copy_image(
                self.buffer,
                src,
                src_layout,
                dst,
                dst_layout,
                regions,
            );
        }
    }

    fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(&viewport));
        }
    }

    fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe {
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(&scissor));
        }
    }

    fn set_line_width(&mut self, width: f32) {
        unsafe { self.device.handle().cmd_set_line_width(self.buffer, width) }
    }

    fn set_cull_mode(&mut self, mode: vk::CullModeFlags) {
        unsafe { self.device.handle().cmd_set_cull_mode(self.buffer, mode) }
    }

    fn set_front_face(&mut self, face: vk::FrontFace) {
        unsafe { self.device.handle().cmd_set_front_face(self.buffer, face) }
    }

    fn set_primitive_topology(&mut self, topology: vk::PrimitiveTopology) {
        unsafe {
            self.device
                .handle()
                .cmd_set_primitive_topology(self.buffer, topology)
        }
    }

    fn set_depth_test_enable(&mut self, enable: bool) {
        unsafe {
            self.device
                .handle()
                .cmd_set_depth_test_enable(self.buffer, enable)
        }
    }

    fn set_depth_write_enable(&mut self, enable: bool) {
        unsafe {
            self.device
                .handle()
                .cmd_set_depth_write_enable(self.buffer, enable)
        }
    }

    fn set_depth_compare_op(&mut self, op: vk::CompareOp) {
        unsafe { self.device.handle().cmd_set_depth_compare_op(self.buffer, op) }
    }

    fn set_stencil_test_enable(&mut self, enable: bool) {
        unsafe {
            self.device
                .handle()
                .cmd_set_stencil_test_enable(self.buffer, enable)
        }
    }

    fn set_color_blend_enable(&mut self, first_attachment: u32, enables: &[bool]) {
        if let Some(eds3) = self.device.extended_dynamic_state3() {
            let enables: Vec<vk::Bool32> = enables.iter().map(|&e| vk::Bool32::from(e)).collect();
            unsafe { eds3.cmd_set_color_blend_enable(self.buffer, first_attachment, &enables) }
        }
    }

    fn set_color_write_mask(&mut self, first_attachment: u32, masks: &[vk::ColorComponentFlags]) {
        if let Some(eds3) = self.device.extended_dynamic_state3() {
            unsafe { eds3.cmd_set_color_write_mask(self.buffer, first_attachment, masks) }
        }
    }

    fn set_polygon_mode(&mut self, mode: vk::PolygonMode) {
        if let Some(eds3) = self.device.extended_dynamic_state3() {
            unsafe { eds3.cmd_set_polygon_mode(self.buffer, mode) }
        }
    }

    fn set_rasterization_samples(&mut self, samples: vk::SampleCountFlags) {
        if let Some(eds3) = self.device.extended_dynamic_state3() {
            unsafe { eds3.cmd_set_rasterization_samples(self.buffer, samples) }
        }
    }
}
