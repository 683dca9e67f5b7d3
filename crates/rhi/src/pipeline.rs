//! Graphics pipeline creation for dynamic rendering.
//!
//! # Overview
//!
//! - [`PipelineLayout`] wraps VkPipelineLayout (descriptor set layouts and
//!   push constant ranges)
//! - [`Pipeline`] owns a graphics VkPipeline
//! - [`GraphicsPipelineBuilder`] collects fixed-function state, vertex input
//!   (including instance-rate divisors) and attachment formats
//!
//! Modules come in as raw `vk::ShaderModule` handles; loading and reflection
//! stay with the shader provider.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     vert: vk::ShaderModule,
//! #     frag: vk::ShaderModule,
//! # ) -> Result<(), vkframe_rhi::RhiError> {
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//!
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_module(vert)
//!     .fragment_module(frag)
//!     .color_attachment_formats(&[vk::Format::B8G8R8A8_UNORM])
//!     .depth_attachment_format(vk::Format::D32_SFLOAT)
//!     .build(device, &layout)?;
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Default shader entry point.
pub const DEFAULT_ENTRY_POINT: &CStr = c"main";

/// Vulkan pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout ({} set layout(s), {} push constant range(s))",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Owned graphics pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    fn create(device: Arc<Device>, create_info: &vk::GraphicsPipelineCreateInfo<'_>) -> RhiResult<Self> {
        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(
                    vk::PipelineCache::null(),
                    std::slice::from_ref(create_info),
                    None,
                )
                .map_err(|(_, result)| result)?
        };

        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".into()))?;

        Ok(Self { device, pipeline })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Graphics pipeline destroyed");
    }
}

/// Per-attachment color blend configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorBlendAttachment {
    /// Enable blending for this attachment.
    pub blend_enable: bool,
    /// Source color factor.
    pub src_color: vk::BlendFactor,
    /// Destination color factor.
    pub dst_color: vk::BlendFactor,
    /// Color blend operation.
    pub color_op: vk::BlendOp,
    /// Source alpha factor.
    pub src_alpha: vk::BlendFactor,
    /// Destination alpha factor.
    pub dst_alpha: vk::BlendFactor,
    /// Alpha blend operation.
    pub alpha_op: vk::BlendOp,
    /// Color write mask.
    pub write_mask: vk::ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self::disabled()
    }
}

impl ColorBlendAttachment {
    /// Blending off, all channels written.
    pub const fn disabled() -> Self {
        Self {
            blend_enable: false,
            src_color: vk::BlendFactor::ONE,
            dst_color: vk::BlendFactor::ZERO,
            color_op: vk::BlendOp::ADD,
            src_alpha: vk::BlendFactor::ONE,
            dst_alpha: vk::BlendFactor::ZERO,
            alpha_op: vk::BlendOp::ADD,
            write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    /// Additive blend with the same factors for color and alpha.
    pub const fn with_factors(src: vk::BlendFactor, dst: vk::BlendFactor) -> Self {
        Self {
            blend_enable: true,
            src_color: src,
            dst_color: dst,
            color_op: vk::BlendOp::ADD,
            src_alpha: src,
            dst_alpha: dst,
            alpha_op: vk::BlendOp::ADD,
            write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    /// Returns a copy with a different write mask.
    #[inline]
    pub const fn with_write_mask(mut self, mask: vk::ColorComponentFlags) -> Self {
        self.write_mask = mask;
        self
    }

    /// Converts to Vulkan pipeline color blend attachment state.
    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(self.blend_enable)
            .src_color_blend_factor(self.src_color)
            .dst_color_blend_factor(self.dst_color)
            .color_blend_op(self.color_op)
            .src_alpha_blend_factor(self.src_alpha)
            .dst_alpha_blend_factor(self.dst_alpha)
            .alpha_blend_op(self.alpha_op)
            .color_write_mask(self.write_mask)
    }
}

/// Builder for graphics pipelines targeting dynamic rendering.
///
/// Topology, cull mode, front face, depth compare and the EDS3 states are
/// expected to be dynamic; the baked values are only fallbacks
/// (triangle list, back culling, clockwise, `LESS_OR_EQUAL`). Depth test and
/// write are on whenever a depth format is set.
pub struct GraphicsPipelineBuilder {
    vertex_module: Option<vk::ShaderModule>,
    fragment_module: Option<vk::ShaderModule>,

    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    vertex_divisors: Vec<vk::VertexInputBindingDivisorDescriptionKHR>,

    rasterization_samples: vk::SampleCountFlags,
    depth_test_enable: bool,
    depth_write_enable: bool,
    stencil: Option<(vk::StencilOpState, vk::StencilOpState)>,

    color_blend_attachments: Vec<ColorBlendAttachment>,
    color_attachment_formats: Vec<vk::Format>,
    depth_attachment_format: Option<vk::Format>,
    stencil_attachment_format: Option<vk::Format>,

    dynamic_states: Vec<vk::DynamicState>,
}

impl Default for GraphicsPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsPipelineBuilder {
    pub fn new() -> Self {
        Self {
            vertex_module: None,
            fragment_module: None,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            vertex_divisors: Vec::new(),
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            depth_test_enable: true,
            depth_write_enable: true,
            stencil: None,
            color_blend_attachments: Vec::new(),
            color_attachment_formats: Vec::new(),
            depth_attachment_format: None,
            stencil_attachment_format: None,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    pub fn vertex_module(mut self, module: vk::ShaderModule) -> Self {
        self.vertex_module = Some(module);
        self
    }

    pub fn fragment_module(mut self, module: vk::ShaderModule) -> Self {
        self.fragment_module = Some(module);
        self
    }

    pub fn vertex_bindings(mut self, bindings: &[vk::VertexInputBindingDescription]) -> Self {
        self.vertex_bindings = bindings.to_vec();
        self
    }

    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes = attributes.to_vec();
        self
    }

    /// Adds an instance-rate divisor for `binding`.
    ///
    /// Divisors of 1 are the Vulkan default and are not recorded.
    pub fn vertex_divisor(mut self, binding: u32, divisor: u32) -> Self {
        if divisor != 1 {
            self.vertex_divisors.push(
                vk::VertexInputBindingDivisorDescriptionKHR::default()
                    .binding(binding)
                    .divisor(divisor),
            );
        }
        self
    }

    pub fn rasterization_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.rasterization_samples = samples;
        self
    }

    pub fn depth_test_enable(mut self, enable: bool) -> Self {
        self.depth_test_enable = enable;
        self
    }

    pub fn depth_write_enable(mut self, enable: bool) -> Self {
        self.depth_write_enable = enable;
        self
    }

    /// Enables the stencil test with the given face states.
    pub fn stencil(mut self, front: vk::StencilOpState, back: vk::StencilOpState) -> Self {
        self.stencil = Some((front, back));
        self
    }

    /// Adds a blend state. Attachments past the last given state reuse it.
    pub fn color_blend_attachment(mut self, attachment: ColorBlendAttachment) -> Self {
        self.color_blend_attachments.push(attachment);
        self
    }

    pub fn color_attachment_formats(mut self, formats: &[vk::Format]) -> Self {
        self.color_attachment_formats = formats.to_vec();
        self
    }

    pub fn depth_attachment_format(mut self, format: vk::Format) -> Self {
        self.depth_attachment_format = Some(format);
        self
    }

    pub fn stencil_attachment_format(mut self, format: vk::Format) -> Self {
        self.stencil_attachment_format = Some(format);
        self
    }

    /// Adds dynamic states, skipping ones already present.
    pub fn dynamic_states(mut self, states: &[vk::DynamicState]) -> Self {
        for &state in states {
            if !self.dynamic_states.contains(&state) {
                self.dynamic_states.push(state);
            }
        }
        self
    }

    /// Blend state per color attachment, padding with the last given state
    /// (or disabled blending) up to the color attachment count.
    fn blend_states(&self) -> Vec<vk::PipelineColorBlendAttachmentState> {
        let fill = self
            .color_blend_attachments
            .last()
            .copied()
            .unwrap_or_default();
        (0..self.color_attachment_formats.len())
            .map(|i| {
                self.color_blend_attachments
                    .get(i)
                    .copied()
                    .unwrap_or(fill)
                    .to_vk()
            })
            .collect()
    }

    /// Creates the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if a shader module or every color
    /// format is missing, or the driver error.
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let vertex_module = self
            .vertex_module
            .ok_or_else(|| RhiError::PipelineError("missing vertex shader".into()))?;
        let fragment_module = self
            .fragment_module
            .ok_or_else(|| RhiError::PipelineError("missing fragment shader".into()))?;

        if self.color_attachment_formats.is_empty() {
            return Err(RhiError::PipelineError("no color attachment format".into()));
        }

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module)
                .name(DEFAULT_ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module)
                .name(DEFAULT_ENTRY_POINT),
        ];

        let mut divisor_state = vk::PipelineVertexInputDivisorStateCreateInfoKHR::default()
            .vertex_binding_divisors(&self.vertex_divisors);
        let mut vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);
        if !self.vertex_divisors.is_empty() {
            vertex_input_state = vertex_input_state.push_next(&mut divisor_state);
        }

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(self.rasterization_samples);

        let has_depth = self.depth_attachment_format.is_some();
        let (front, back) = self.stencil.unwrap_or_default();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth && self.depth_test_enable)
            .depth_write_enable(has_depth && self.depth_write_enable)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .stencil_test_enable(self.stencil.is_some())
            .front(front)
            .back(back)
            .max_depth_bounds(1.0);

        let blend_attachments = self.blend_states();
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&self.color_attachment_formats);
        if let Some(format) = self.depth_attachment_format {
            rendering_info = rendering_info.depth_attachment_format(format);
        }
        if let Some(format) = self.stencil_attachment_format {
            rendering_info = rendering_info.stencil_attachment_format(format);
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .push_next(&mut rendering_info);

        let pipeline = Pipeline::create(device, &pipeline_info)?;
        debug!(
            "Graphics pipeline created ({} color attachment(s), depth {:?})",
            self.color_attachment_formats.len(),
            self.depth_attachment_format
        );
        Ok(pipeline)
    }
}
