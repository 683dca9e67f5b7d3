//! Lazily built graphics pipelines keyed by [`PipelineKey`].
//!
//! # Overview
//!
//! [`PipelineCache::get_pipeline`] looks the key up and, on a miss, asks its
//! [`PipelineFactory`] to build one. The cache checks the key against the
//! supplied [`VertexLayout`] before anything is built:
//!
//! - attribute-fed shaders must carry the hash of the layout they are given
//! - the key must name at least one color attachment
//! - a stencil test needs a depth format with stencil
//! - attribute-fed layouts must feed location 0
//! - instance divisors above 1 need device support
//!
//! [`VulkanPipelineFactory`] is the device-backed factory. It builds through
//! the rhi [`GraphicsPipelineBuilder`] with every rasterizer state the frame
//! sets per draw left dynamic (see [`build_dynamic_state_list`]).

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error};

use vkframe_rhi::device::{Device, ExtendedDynamicState3Caps};
use vkframe_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};

use crate::error::{RenderError, RenderResult};
use crate::pipeline_key::{PipelineKey, PipelineLayoutKind, VertexInputMode, VertexLayout};

/// Compiled shader stages for one pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShaderModules {
    /// Vertex stage.
    pub vert: vk::ShaderModule,
    /// Fragment stage.
    pub frag: vk::ShaderModule,
}

/// Builds pipelines on a cache miss.
pub trait PipelineFactory {
    /// Owned pipeline object kept by the cache.
    type Pipeline;

    /// Creates the pipeline for an already validated key.
    fn create(
        &mut self,
        key: &PipelineKey,
        modules: &ShaderModules,
        layout: &VertexLayout,
    ) -> RenderResult<Self::Pipeline>;

    /// Raw handle of a created pipeline.
    fn handle(pipeline: &Self::Pipeline) -> vk::Pipeline;
}

/// Dynamic states every pipeline is created with.
///
/// The extended dynamic state 3 entries are added only for the states `eds3`
/// reports as supported.
pub fn build_dynamic_state_list(eds3: Option<ExtendedDynamicState3Caps>) -> Vec<vk::DynamicState> {
    let mut states = vec![
        vk::DynamicState::VIEWPORT,
        vk::DynamicState::SCISSOR,
        vk::DynamicState::LINE_WIDTH,
        vk::DynamicState::CULL_MODE,
        vk::DynamicState::FRONT_FACE,
        vk::DynamicState::PRIMITIVE_TOPOLOGY,
        vk::DynamicState::DEPTH_TEST_ENABLE,
        vk::DynamicState::DEPTH_WRITE_ENABLE,
        vk::DynamicState::DEPTH_COMPARE_OP,
        vk::DynamicState::STENCIL_TEST_ENABLE,
    ];

    if let Some(caps) = eds3 {
        if caps.color_blend_enable {
            states.push(vk::DynamicState::COLOR_BLEND_ENABLE_EXT);
        }
        if caps.color_write_mask {
            states.push(vk::DynamicState::COLOR_WRITE_MASK_EXT);
        }
        if caps.polygon_mode {
            states.push(vk::DynamicState::POLYGON_MODE_EXT);
        }
        if caps.rasterization_samples {
            states.push(vk::DynamicState::RASTERIZATION_SAMPLES_EXT);
        }
    }

    states
}

/// Cache of built pipelines.
pub struct PipelineCache<F: PipelineFactory> {
    factory: F,
    pipelines: HashMap<PipelineKey, F::Pipeline>,
    supports_divisor: bool,
}

impl<F: PipelineFactory> PipelineCache<F> {
    /// Creates an empty cache. `supports_divisor` reports the
    /// instance-rate divisor feature.
    pub fn new(factory: F, supports_divisor: bool) -> Self {
        Self {
            factory,
            pipelines: HashMap::new(),
            supports_divisor,
        }
    }

    /// Returns the pipeline for `key`, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::LayoutHashMismatch`] if an attribute-fed key
    /// was built for a different layout, [`RenderError::InvalidPipelineKey`]
    /// if the key or layout cannot produce a pipeline, and the factory's
    /// error if creation fails. Nothing is cached on error.
    pub fn get_pipeline(
        &mut self,
        key: &PipelineKey,
        modules: &ShaderModules,
        layout: &VertexLayout,
    ) -> RenderResult<vk::Pipeline> {
        let attributes = key.shader.vertex_input() == VertexInputMode::VertexAttributes;
        if attributes {
            let expected = layout.hash();
            if key.layout_hash != expected {
                error!(
                    "{:?} pipeline key carries layout hash {:#x}, layout hashes to {:#x}",
                    key.shader, key.layout_hash, expected
                );
                return Err(RenderError::LayoutHashMismatch {
                    key: key.layout_hash,
                    layout: expected,
                });
            }
        }

        if let Some(pipeline) = self.pipelines.get(key) {
            return Ok(F::handle(pipeline));
        }

        key.validate()?;
        if attributes {
            if !layout.has_location(0) {
                return Err(RenderError::InvalidPipelineKey(format!(
                    "{:?}: vertex layout has no location 0 attribute",
                    key.shader
                )));
            }
            if layout.needs_divisor() && !self.supports_divisor {
                return Err(RenderError::InvalidPipelineKey(format!(
                    "{:?}: instance divisor requested without device support",
                    key.shader
                )));
            }
        }

        let pipeline = self.factory.create(key, modules, layout)?;
        let handle = F::handle(&pipeline);
        self.pipelines.insert(*key, pipeline);
        debug!(
            "Built {:?} pipeline (variant {:#x}, {} cached)",
            key.shader,
            key.variant_flags,
            self.pipelines.len()
        );
        Ok(handle)
    }

    /// Returns true if `key` has been built.
    pub fn contains(&self, key: &PipelineKey) -> bool {
        self.pipelines.contains_key(key)
    }

    /// Number of cached pipelines.
    #[inline]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Drops every cached pipeline.
    ///
    /// The caller must make sure none of them is still in use by the GPU.
    pub fn clear(&mut self) {
        let count = self.pipelines.len();
        self.pipelines.clear();
        debug!("Pipeline cache cleared ({} pipelines)", count);
    }

    /// Returns the factory.
    #[inline]
    pub fn factory(&self) -> &F {
        &self.factory
    }
}

/// The three pipeline layouts shaders bind against.
pub struct PipelineLayouts {
    /// Per-draw uniforms and the bindless texture array.
    pub standard: PipelineLayout,
    /// Vertex-pulling model shaders.
    pub model: PipelineLayout,
    /// Deferred lighting, sampling the G-buffer.
    pub deferred: PipelineLayout,
}

impl PipelineLayouts {
    /// Layout for `kind`.
    pub fn get(&self, kind: PipelineLayoutKind) -> &PipelineLayout {
        match kind {
            PipelineLayoutKind::Standard => &self.standard,
            PipelineLayoutKind::Model => &self.model,
            PipelineLayoutKind::Deferred => &self.deferred,
        }
    }
}

/// Factory building pipelines on a device.
pub struct VulkanPipelineFactory {
    device: Arc<Device>,
    layouts: PipelineLayouts,
    dynamic_states: Vec<vk::DynamicState>,
}

impl VulkanPipelineFactory {
    /// Creates a factory declaring the dynamic states for `eds3`.
    ///
    /// Pass the caps the drawing session records with (see
    /// [`RenderingSession::extended_dynamic_state3`]), not the raw device
    /// caps.
    ///
    /// [`RenderingSession::extended_dynamic_state3`]: crate::rendering_session::RenderingSession::extended_dynamic_state3
    pub fn new(
        device: Arc<Device>,
        layouts: PipelineLayouts,
        eds3: Option<ExtendedDynamicState3Caps>,
    ) -> Self {
        let dynamic_states = build_dynamic_state_list(eds3);
        Self {
            device,
            layouts,
            dynamic_states,
        }
    }

    /// Pipeline layouts in use.
    #[inline]
    pub fn layouts(&self) -> &PipelineLayouts {
        &self.layouts
    }

    /// Dynamic states every pipeline is created with.
    #[inline]
    pub fn dynamic_states(&self) -> &[vk::DynamicState] {
        &self.dynamic_states
    }
}

impl PipelineCache<VulkanPipelineFactory> {
    /// Cache building on `device`, with divisor support taken from its caps.
    ///
    /// `eds3` must match the drawing session, as for
    /// [`VulkanPipelineFactory::new`].
    pub fn for_device(
        device: Arc<Device>,
        layouts: PipelineLayouts,
        eds3: Option<ExtendedDynamicState3Caps>,
    ) -> Self {
        let supports_divisor = device.caps().vertex_attribute_divisor;
        Self::new(VulkanPipelineFactory::new(device, layouts, eds3), supports_divisor)
    }
}

impl PipelineFactory for VulkanPipelineFactory {
    type Pipeline = Pipeline;

    fn create(
        &mut self,
        key: &PipelineKey,
        modules: &ShaderModules,
        layout: &VertexLayout,
    ) -> RenderResult<Pipeline> {
        let has_depth = key.depth_format != vk::Format::UNDEFINED;
        let color_formats = vec![key.color_format; key.color_attachment_count as usize];

        let mut builder = GraphicsPipelineBuilder::new()
            .vertex_module(modules.vert)
            .fragment_module(modules.frag)
            .rasterization_samples(key.sample_count)
            .depth_test_enable(has_depth)
            .depth_write_enable(has_depth)
            .color_blend_attachment(key.blend_attachment())
            .color_attachment_formats(&color_formats)
            .dynamic_states(&self.dynamic_states);

        if has_depth {
            builder = builder.depth_attachment_format(key.depth_format);
        }
        if key.has_stencil_attachment() {
            builder = builder.stencil_attachment_format(key.depth_format);
        }
        if key.stencil.test_enable {
            let (front, back) = key.stencil.to_vk();
            builder = builder.stencil(front, back);
        }

        if !key.shader.uses_vertex_pulling() {
            let bindings: Vec<_> = layout.bindings().iter().map(|b| b.to_vk()).collect();
            let attributes: Vec<_> = layout.attributes().iter().map(|a| a.to_vk()).collect();
            builder = builder.vertex_bindings(&bindings).vertex_attributes(&attributes);
            for binding in layout.bindings().iter().filter(|b| b.divisor > 1) {
                builder = builder.vertex_divisor(binding.binding, binding.divisor);
            }
        }

        let pipeline_layout = self.layouts.get(key.shader.layout_kind());
        Ok(builder.build(Arc::clone(&self.device), pipeline_layout)?)
    }

    fn handle(pipeline: &Pipeline) -> vk::Pipeline {
        pipeline.handle()
    }
}
