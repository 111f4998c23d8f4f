//! Rust-native descriptor model for the pipeline-state objects the recorder
//! understands.
//!
//! Raw GPU enum and bitmask fields are carried as `u32` exactly as the
//! application handed them over; identity (hashing) and the serialized form
//! are the only semantics this crate assigns to them.

use serde::{Deserialize, Serialize};

/// 64-bit content hash of a descriptor in canonical form.
pub type StateHash = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum ResourceKind {
    ApplicationInfo = 0,
    Sampler = 1,
    DescriptorSetLayout = 2,
    PipelineLayout = 3,
    ShaderModule = 4,
    RenderPass = 5,
    GraphicsPipeline = 6,
    ComputePipeline = 7,
    PhysicalDeviceFeatures = 8,
}

impl ResourceKind {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::ApplicationInfo),
            1 => Some(Self::Sampler),
            2 => Some(Self::DescriptorSetLayout),
            3 => Some(Self::PipelineLayout),
            4 => Some(Self::ShaderModule),
            5 => Some(Self::RenderPass),
            6 => Some(Self::GraphicsPipeline),
            7 => Some(Self::ComputePipeline),
            8 => Some(Self::PhysicalDeviceFeatures),
            _ => None,
        }
    }

    /// Archive tag value for this kind (matches `kiln-archive`'s
    /// `ResourceTag` constants by convention).
    pub fn tag(self) -> u32 {
        self as u32
    }
}

// Object handles are opaque 64-bit values. In application space they are
// whatever the caller uses to identify objects; in canonical (interned,
// serialized, replayed) space the value is the referenced object's content
// hash. The recorder performs that conversion; nothing ever reinterprets one
// domain as the other.
macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                // Decimal string, so parsers without 64-bit integers survive.
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(
                deserializer: D,
            ) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse::<u64>()
                    .map($name)
                    .map_err(serde::de::Error::custom)
            }
        }
    };
}

handle_type!(SamplerHandle);
handle_type!(SetLayoutHandle);
handle_type!(PipelineLayoutHandle);
handle_type!(ShaderModuleHandle);
handle_type!(RenderPassHandle);
handle_type!(
    /// Handle for a compute or graphics pipeline (base-pipeline references
    /// share one namespace).
    PipelineHandle
);

/// Auxiliary record chained onto a primary descriptor.
///
/// Which records are recognized depends on where the chain sits: each hasher
/// accepts an explicit allowlist for its position and rejects everything
/// else, so a descriptor carrying an unexpected record fails to record
/// instead of silently dropping state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExtensionRecord {
    SamplerReductionMode {
        reduction_mode: u32,
    },
    SamplerYcbcrConversion {
        format: u32,
        ycbcr_model: u32,
        ycbcr_range: u32,
        component_r: u32,
        component_g: u32,
        component_b: u32,
        component_a: u32,
        x_chroma_offset: u32,
        y_chroma_offset: u32,
        chroma_filter: u32,
        force_explicit_reconstruction: bool,
    },
    VertexInputDivisor {
        divisors: Vec<VertexBindingDivisor>,
    },
    TessellationDomainOrigin {
        domain_origin: u32,
    },
    RasterizationDepthClip {
        flags: u32,
        depth_clip_enable: bool,
    },
    RasterizationStream {
        flags: u32,
        rasterization_stream: u32,
    },
}

impl ExtensionRecord {
    /// Stable numeric tag; recognized records fold into a hash sorted by
    /// this value, independent of their order in the chain.
    pub fn type_tag(&self) -> u32 {
        match self {
            Self::SamplerReductionMode { .. } => 1000,
            Self::SamplerYcbcrConversion { .. } => 1001,
            Self::VertexInputDivisor { .. } => 1002,
            Self::TessellationDomainOrigin { .. } => 1003,
            Self::RasterizationDepthClip { .. } => 1004,
            Self::RasterizationStream { .. } => 1005,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VertexBindingDivisor {
    pub binding: u32,
    pub divisor: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplerDesc {
    pub flags: u32,
    pub mag_filter: u32,
    pub min_filter: u32,
    pub mipmap_mode: u32,
    pub address_mode_u: u32,
    pub address_mode_v: u32,
    pub address_mode_w: u32,
    pub mip_lod_bias: f32,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare_enable: bool,
    pub compare_op: u32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: u32,
    pub unnormalized_coordinates: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<ExtensionRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: u32,
    pub descriptor_count: u32,
    pub stage_flags: u32,
    /// Empty when the binding has no immutable samplers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub immutable_samplers: Vec<SamplerHandle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetLayoutDesc {
    pub flags: u32,
    pub bindings: Vec<SetLayoutBinding>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushConstantRange {
    pub stage_flags: u32,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineLayoutDesc {
    pub flags: u32,
    pub set_layouts: Vec<SetLayoutHandle>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShaderModuleDesc {
    pub flags: u32,
    /// SPIR-V blob; base64 in the serialized form.
    #[serde(with = "crate::serialize::b64")]
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachmentDesc {
    pub flags: u32,
    pub format: u32,
    pub samples: u32,
    pub load_op: u32,
    pub store_op: u32,
    pub stencil_load_op: u32,
    pub stencil_store_op: u32,
    pub initial_layout: u32,
    pub final_layout: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachmentRef {
    pub attachment: u32,
    pub layout: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubpassDesc {
    pub flags: u32,
    pub pipeline_bind_point: u32,
    pub input_attachments: Vec<AttachmentRef>,
    pub color_attachments: Vec<AttachmentRef>,
    pub resolve_attachments: Vec<AttachmentRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_stencil_attachment: Option<AttachmentRef>,
    pub preserve_attachments: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubpassDependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stage_mask: u32,
    pub dst_stage_mask: u32,
    pub src_access_mask: u32,
    pub dst_access_mask: u32,
    pub dependency_flags: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderPassDesc {
    pub flags: u32,
    pub attachments: Vec<AttachmentDesc>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<SubpassDependency>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpecializationMapEntry {
    pub constant_id: u32,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpecializationInfo {
    pub map_entries: Vec<SpecializationMapEntry>,
    #[serde(with = "crate::serialize::b64")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShaderStageDesc {
    pub flags: u32,
    pub stage: u32,
    pub module: ShaderModuleHandle,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization: Option<SpecializationInfo>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VertexInputBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VertexInputAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VertexInputState {
    pub flags: u32,
    pub bindings: Vec<VertexInputBinding>,
    pub attributes: Vec<VertexInputAttribute>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<ExtensionRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputAssemblyState {
    pub flags: u32,
    pub topology: u32,
    pub primitive_restart_enable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TessellationState {
    pub flags: u32,
    pub patch_control_points: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<ExtensionRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Viewport block. The count fields govern identity: with dynamic viewport
/// state the arrays may be shorter than the counts (typically empty), and
/// only what is actually present contributes beyond the counts themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewportState {
    pub flags: u32,
    pub viewport_count: u32,
    pub scissor_count: u32,
    pub viewports: Vec<Viewport>,
    pub scissors: Vec<Rect2D>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RasterizationState {
    pub flags: u32,
    pub depth_clamp_enable: bool,
    pub rasterizer_discard_enable: bool,
    pub polygon_mode: u32,
    pub cull_mode: u32,
    pub front_face: u32,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
    pub line_width: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<ExtensionRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultisampleState {
    pub flags: u32,
    pub rasterization_samples: u32,
    pub sample_shading_enable: bool,
    pub min_sample_shading: f32,
    /// Empty when no sample mask is supplied.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sample_mask: Vec<u32>,
    pub alpha_to_coverage_enable: bool,
    pub alpha_to_one_enable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StencilOpState {
    pub fail_op: u32,
    pub pass_op: u32,
    pub depth_fail_op: u32,
    pub compare_op: u32,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DepthStencilState {
    pub flags: u32,
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: u32,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub front: StencilOpState,
    pub back: StencilOpState,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_blend_factor: u32,
    pub dst_color_blend_factor: u32,
    pub color_blend_op: u32,
    pub src_alpha_blend_factor: u32,
    pub dst_alpha_blend_factor: u32,
    pub alpha_blend_op: u32,
    pub color_write_mask: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorBlendState {
    pub flags: u32,
    pub logic_op_enable: bool,
    pub logic_op: u32,
    pub attachments: Vec<ColorBlendAttachment>,
    pub blend_constants: [f32; 4],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DynamicState {
    pub flags: u32,
    pub dynamic_states: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComputePipelineDesc {
    pub flags: u32,
    pub stage: ShaderStageDesc,
    pub layout: PipelineLayoutHandle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_pipeline: Option<PipelineHandle>,
    pub base_pipeline_index: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphicsPipelineDesc {
    pub flags: u32,
    pub stages: Vec<ShaderStageDesc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertex_input: Option<VertexInputState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_assembly: Option<InputAssemblyState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tessellation: Option<TessellationState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<ViewportState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rasterization: Option<RasterizationState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multisample: Option<MultisampleState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_stencil: Option<DepthStencilState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_blend: Option<ColorBlendState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<DynamicState>,
    pub layout: PipelineLayoutHandle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_pass: Option<RenderPassHandle>,
    pub subpass: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_pipeline: Option<PipelineHandle>,
    pub base_pipeline_index: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationInfoDesc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    pub application_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_name: Option<String>,
    pub engine_version: u32,
    pub api_version: u32,
}

/// The one core device feature that changes how pipelines compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhysicalDeviceFeaturesDesc {
    pub robust_buffer_access: bool,
}
