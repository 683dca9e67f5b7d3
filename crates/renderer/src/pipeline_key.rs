//! Pipeline selection criteria.
//!
//! A [`PipelineKey`] captures every input that is baked into a graphics
//! pipeline at creation time: shader type and variant, attachment formats and
//! count, sample count, blending and stencil state, and (for shaders fed by
//! vertex attributes) the vertex layout. Keys are built from the
//! [`RenderTargetInfo`] of the open pass so a pipeline always matches the
//! attachments it is drawn into.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_renderer::pipeline_key::{BlendMode, PipelineKey, ShaderType, VertexLayout};
//! use vkframe_renderer::render_target::RenderTargetInfo;
//! use vkframe_rhi::vk;
//!
//! let layout = VertexLayout::new()
//!     .with_binding(0, 20)
//!     .with_attribute(0, 0, vk::Format::R32G32B32_SFLOAT, 0)
//!     .with_attribute(2, 0, vk::Format::R32G32_SFLOAT, 12);
//!
//! let key = PipelineKey::for_target(ShaderType::Interface, 0, &RenderTargetInfo::default())
//!     .with_blend_mode(BlendMode::AlphaBlendAlpha)
//!     .with_vertex_layout(&layout);
//! # let _ = key;
//! ```

use std::hash::{DefaultHasher, Hash, Hasher};

use ash::vk;

use vkframe_rhi::pipeline::ColorBlendAttachment;

use crate::error::{RenderError, RenderResult};
use crate::render_target::{RenderTargetInfo, format_has_stencil};

/// How a shader receives its vertex data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexInputMode {
    /// Fixed-function vertex attributes described by a [`VertexLayout`].
    VertexAttributes,
    /// Fetched from a storage buffer by vertex index; no layout is consumed.
    VertexPulling,
}

/// Which pipeline layout a shader binds against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineLayoutKind {
    /// Per-draw uniforms and textures.
    Standard,
    /// Bindless model rendering.
    Model,
    /// Deferred lighting with G-buffer inputs.
    Deferred,
}

/// Shader program families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderType {
    /// Bindless, vertex-pulled scene models.
    Model,
    /// Soft particles.
    EffectParticle,
    /// Screen-space distortion effects.
    EffectDistortion,
    /// Final post-process composite.
    PostProcessMain,
    /// Separable blur.
    PostProcessBlur,
    /// Bloom composite.
    PostProcessBloomComp,
    /// Bloom bright-pass extraction.
    PostProcessBrightpass,
    /// FXAA resolve.
    PostProcessFxaa,
    /// Luminance prepass for FXAA.
    PostProcessFxaaPrepass,
    /// Screen-space light shafts.
    PostProcessLightshafts,
    /// HDR to LDR tonemapping.
    PostProcessTonemapping,
    /// Light volumes over the G-buffer.
    DeferredLighting,
    /// G-buffer clear quad.
    DeferredClear,
    /// YUV video frames.
    VideoProcess,
    /// Untransformed textured geometry.
    PassthroughRender,
    /// Shield impact decals, stencil tested.
    ShieldDecal,
    /// Batched, instanced bitmaps.
    BatchedBitmap,
    /// Fallback material.
    DefaultMaterial,
    /// 2D interface elements.
    Interface,
    /// Vector UI paths.
    Nanovg,
    /// Deferred decals.
    Decal,
    /// Distance fog over the scene.
    SceneFog,
    /// Ray-marched volumetric fog.
    VolumetricFog,
    /// Retained-mode UI documents.
    RocketUi,
    /// Fullscreen texture copy.
    Copy,
    /// Texture copy into world space.
    CopyWorld,
    /// Custom multisample resolve.
    MsaaResolve,
    /// SMAA edge detection.
    SmaaEdge,
    /// SMAA blend weights.
    SmaaBlendingWeight,
    /// SMAA neighbourhood blending.
    SmaaNeighborhoodBlending,
    /// Cube map to sphere map warp.
    EnvmapSphereWarp,
    /// Irradiance map generation.
    IrradianceMapGen,
    /// Untextured solid color.
    FlatColor,
}

impl ShaderType {
    /// Every shader type.
    pub const ALL: [ShaderType; 33] = [
        Self::Model,
        Self::EffectParticle,
        Self::EffectDistortion,
        Self::PostProcessMain,
        Self::PostProcessBlur,
        Self::PostProcessBloomComp,
        Self::PostProcessBrightpass,
        Self::PostProcessFxaa,
        Self::PostProcessFxaaPrepass,
        Self::PostProcessLightshafts,
        Self::PostProcessTonemapping,
        Self::DeferredLighting,
        Self::DeferredClear,
        Self::VideoProcess,
        Self::PassthroughRender,
        Self::ShieldDecal,
        Self::BatchedBitmap,
        Self::DefaultMaterial,
        Self::Interface,
        Self::Nanovg,
        Self::Decal,
        Self::SceneFog,
        Self::VolumetricFog,
        Self::RocketUi,
        Self::Copy,
        Self::CopyWorld,
        Self::MsaaResolve,
        Self::SmaaEdge,
        Self::SmaaBlendingWeight,
        Self::SmaaNeighborhoodBlending,
        Self::EnvmapSphereWarp,
        Self::IrradianceMapGen,
        Self::FlatColor,
    ];

    /// Vertex input contract of this shader.
    #[inline]
    pub fn vertex_input(self) -> VertexInputMode {
        match self {
            Self::Model => VertexInputMode::VertexPulling,
            _ => VertexInputMode::VertexAttributes,
        }
    }

    /// Pipeline layout this shader binds against.
    #[inline]
    pub fn layout_kind(self) -> PipelineLayoutKind {
        match self {
            Self::Model => PipelineLayoutKind::Model,
            Self::DeferredLighting => PipelineLayoutKind::Deferred,
            _ => PipelineLayoutKind::Standard,
        }
    }

    /// Returns true if the shader ignores the vertex layout.
    #[inline]
    pub fn uses_vertex_pulling(self) -> bool {
        self.vertex_input() == VertexInputMode::VertexPulling
    }
}

/// Fixed-function blending presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Opaque.
    #[default]
    None,
    /// `src + dst`.
    Additive,
    /// `src * a + dst`.
    AlphaAdditive,
    /// `src * a + dst * (1 - a)`.
    AlphaBlendAlpha,
    /// `src * a + dst * (1 - src)`.
    AlphaBlendSrcColor,
    /// `src + dst * (1 - a)`.
    Premultiplied,
}

impl BlendMode {
    /// Blend attachment state for this mode.
    pub fn to_blend_attachment(self, write_mask: vk::ColorComponentFlags) -> ColorBlendAttachment {
        use vk::BlendFactor as F;

        let state = match self {
            Self::None => ColorBlendAttachment::disabled(),
            Self::Additive => ColorBlendAttachment::with_factors(F::ONE, F::ONE),
            Self::AlphaAdditive => ColorBlendAttachment::with_factors(F::SRC_ALPHA, F::ONE),
            Self::AlphaBlendAlpha => {
                ColorBlendAttachment::with_factors(F::SRC_ALPHA, F::ONE_MINUS_SRC_ALPHA)
            }
            Self::AlphaBlendSrcColor => {
                ColorBlendAttachment::with_factors(F::SRC_ALPHA, F::ONE_MINUS_SRC_COLOR)
            }
            Self::Premultiplied => ColorBlendAttachment::with_factors(F::ONE, F::ONE_MINUS_SRC_ALPHA),
        };
        state.with_write_mask(write_mask)
    }
}

/// Stencil ops for one face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilFaceOps {
    pub fail: vk::StencilOp,
    pub depth_fail: vk::StencilOp,
    pub pass: vk::StencilOp,
}

impl Default for StencilFaceOps {
    fn default() -> Self {
        Self {
            fail: vk::StencilOp::KEEP,
            depth_fail: vk::StencilOp::KEEP,
            pass: vk::StencilOp::KEEP,
        }
    }
}

/// Stencil test configuration baked into a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub test_enable: bool,
    pub compare_op: vk::CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    /// Value the test compares against.
    pub reference: u32,
    /// Ops for front-facing triangles.
    pub front: StencilFaceOps,
    /// Ops for back-facing triangles.
    pub back: StencilFaceOps,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            test_enable: false,
            compare_op: vk::CompareOp::ALWAYS,
            compare_mask: 0xFF,
            write_mask: 0xFF,
            reference: 0,
            front: StencilFaceOps::default(),
            back: StencilFaceOps::default(),
        }
    }
}

impl StencilState {
    /// Enabled test with `compare_op` against `reference`, keeping all ops.
    pub fn test(compare_op: vk::CompareOp, reference: u32) -> Self {
        Self {
            test_enable: true,
            compare_op,
            reference,
            ..Self::default()
        }
    }

    /// Same ops on both faces.
    pub fn with_ops(mut self, ops: StencilFaceOps) -> Self {
        self.front = ops;
        self.back = ops;
        self
    }

    /// Vulkan front and back face states.
    pub fn to_vk(&self) -> (vk::StencilOpState, vk::StencilOpState) {
        let face = |ops: StencilFaceOps| vk::StencilOpState {
            fail_op: ops.fail,
            pass_op: ops.pass,
            depth_fail_op: ops.depth_fail,
            compare_op: self.compare_op,
            compare_mask: self.compare_mask,
            write_mask: self.write_mask,
            reference: self.reference,
        };
        (face(self.front), face(self.back))
    }
}

/// One vertex buffer binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    /// Zero for per-vertex data; otherwise advance every `divisor` instances.
    pub divisor: u32,
}

impl VertexBinding {
    pub fn to_vk(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: self.binding,
            stride: self.stride,
            input_rate: if self.divisor == 0 {
                vk::VertexInputRate::VERTEX
            } else {
                vk::VertexInputRate::INSTANCE
            },
        }
    }
}

/// One vertex attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location.
    pub location: u32,
    /// Binding the attribute reads from.
    pub binding: u32,
    pub format: vk::Format,
    /// Byte offset within one element of the binding.
    pub offset: u32,
}

impl VertexAttribute {
    pub fn to_vk(&self) -> vk::VertexInputAttributeDescription {
        vk::VertexInputAttributeDescription {
            location: self.location,
            binding: self.binding,
            format: self.format,
            offset: self.offset,
        }
    }
}

/// Vertex buffer layout consumed by attribute-fed shaders.
///
/// Location 0 carries the position; other locations are optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    bindings: Vec<VertexBinding>,
    attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Creates an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a per-vertex binding.
    pub fn with_binding(mut self, binding: u32, stride: u32) -> Self {
        self.bindings.push(VertexBinding {
            binding,
            stride,
            divisor: 0,
        });
        self
    }

    /// Adds a per-instance binding advancing every `divisor` instances.
    pub fn with_instance_binding(mut self, binding: u32, stride: u32, divisor: u32) -> Self {
        self.bindings.push(VertexBinding {
            binding,
            stride,
            divisor: divisor.max(1),
        });
        self
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, location: u32, binding: u32, format: vk::Format, offset: u32) -> Self {
        self.attributes.push(VertexAttribute {
            location,
            binding,
            format,
            offset,
        });
        self
    }

    /// Adds a 4x4 float matrix as four consecutive vec4 locations.
    pub fn with_matrix4(mut self, location: u32, binding: u32, offset: u32) -> Self {
        for row in 0..4 {
            self.attributes.push(VertexAttribute {
                location: location + row,
                binding,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: offset + row * 16,
            });
        }
        self
    }

    #[inline]
    pub fn bindings(&self) -> &[VertexBinding] {
        &self.bindings
    }

    #[inline]
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Returns true if some attribute feeds `location`.
    pub fn has_location(&self, location: u32) -> bool {
        self.attributes.iter().any(|a| a.location == location)
    }

    /// Returns true if a binding needs the instance-rate divisor feature.
    pub fn needs_divisor(&self) -> bool {
        self.bindings.iter().any(|b| b.divisor > 1)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.attributes.is_empty()
    }

    /// Hash of the layout, stable for the life of the process.
    pub fn hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        Hash::hash(self, &mut hasher);
        hasher.finish()
    }
}

/// Everything baked into a graphics pipeline.
///
/// Equality and hashing skip `layout_hash` for vertex-pulling shaders.
#[derive(Clone, Copy, Debug)]
pub struct PipelineKey {
    pub shader: ShaderType,
    /// Shader variant bits, opaque to the cache.
    pub variant_flags: u32,
    /// Format shared by every color attachment.
    pub color_format: vk::Format,
    /// `UNDEFINED` when the target has no depth.
    pub depth_format: vk::Format,
    pub sample_count: vk::SampleCountFlags,
    pub color_attachment_count: u32,
    pub blend_mode: BlendMode,
    /// [`VertexLayout::hash`] of the layout the pipeline consumes.
    pub layout_hash: u64,
    pub color_write_mask: vk::ColorComponentFlags,
    pub stencil: StencilState,
}

impl PipelineKey {
    /// Key for `shader` drawing into the attachments described by `info`.
    pub fn for_target(shader: ShaderType, variant_flags: u32, info: &RenderTargetInfo) -> Self {
        Self {
            shader,
            variant_flags,
            color_format: info.color_format,
            depth_format: info.depth_format,
            sample_count: info.samples,
            color_attachment_count: info.color_attachment_count,
            blend_mode: BlendMode::None,
            layout_hash: 0,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            stencil: StencilState::default(),
        }
    }

    /// Sets the blend mode of every color attachment.
    pub fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    /// Binds the key to `layout` through its hash.
    pub fn with_vertex_layout(mut self, layout: &VertexLayout) -> Self {
        self.layout_hash = layout.hash();
        self
    }

    pub fn with_color_write_mask(mut self, mask: vk::ColorComponentFlags) -> Self {
        self.color_write_mask = mask;
        self
    }

    pub fn with_stencil(mut self, stencil: StencilState) -> Self {
        self.stencil = stencil;
        self
    }

    /// Returns true when `layout_hash` takes part in equality.
    #[inline]
    pub fn uses_layout_hash(&self) -> bool {
        !self.shader.uses_vertex_pulling()
    }

    /// Blend state applied to every color attachment.
    #[inline]
    pub fn blend_attachment(&self) -> ColorBlendAttachment {
        self.blend_mode.to_blend_attachment(self.color_write_mask)
    }

    /// Returns true if the depth format carries stencil.
    #[inline]
    pub fn has_stencil_attachment(&self) -> bool {
        format_has_stencil(self.depth_format)
    }

    /// Checks the key describes a pipeline that can be created.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidPipelineKey`] for a zero attachment
    /// count, or a stencil test against a depth format without stencil.
    pub fn validate(&self) -> RenderResult<()> {
        if self.color_attachment_count == 0 {
            return Err(RenderError::InvalidPipelineKey(format!(
                "{:?}: color attachment count must be at least 1",
                self.shader
            )));
        }
        if self.stencil.test_enable && !self.has_stencil_attachment() {
            return Err(RenderError::InvalidPipelineKey(format!(
                "{:?}: stencil test enabled but depth format {:?} has no stencil",
                self.shader, self.depth_format
            )));
        }
        Ok(())
    }
}

impl PartialEq for PipelineKey {
    fn eq(&self, other: &Self) -> bool {
        self.shader == other.shader
            && self.variant_flags == other.variant_flags
            && self.color_format == other.color_format
            && self.depth_format == other.depth_format
            && self.sample_count == other.sample_count
            && self.color_attachment_count == other.color_attachment_count
            && self.blend_mode == other.blend_mode
            && self.color_write_mask == other.color_write_mask
            && self.stencil == other.stencil
            && (!self.uses_layout_hash() || self.layout_hash == other.layout_hash)
    }
}

impl Eq for PipelineKey {}

impl Hash for PipelineKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shader.hash(state);
        self.variant_flags.hash(state);
        self.color_format.hash(state);
        self.depth_format.hash(state);
        self.sample_count.hash(state);
        self.color_attachment_count.hash(state);
        self.blend_mode.hash(state);
        self.color_write_mask.hash(state);
        self.stencil.hash(state);
        if self.uses_layout_hash() {
            self.layout_hash.hash(state);
        }
    }
}
