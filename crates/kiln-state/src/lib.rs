//! Capture and replay of GPU pipeline-state descriptors.
//!
//! Applications feed pipeline-creation descriptors into a [`Recorder`],
//! which deduplicates them by 64-bit content hash and serializes the whole
//! interned state into a stable, versioned JSON document. [`replay_state`]
//! parses such a document and drives a [`ReplaySink`] in dependency order,
//! re-verifying every hash on the way — the building blocks for warming
//! on-disk driver caches or reproducing driver bugs in a clean process.
//!
//! Persistence of individual blobs lives in `kiln-archive`; the two crates
//! only share the numeric resource-tag convention.

mod error;
mod hash;
mod recorder;
mod replayer;
mod serialize;
mod types;

pub use crate::error::{HashError, RecordError, ReplayError};
pub use crate::hash::{
    hash_application_info, hash_compute_pipeline, hash_graphics_pipeline, hash_pipeline_layout,
    hash_render_pass, hash_sampler, hash_set_layout, hash_shader_module, HashResolver,
};
pub use crate::recorder::Recorder;
pub use crate::replayer::{replay_state, ReplaySink, ReplayStats, SinkReject};
pub use crate::serialize::STATE_DOCUMENT_VERSION;
pub use crate::types::{
    ApplicationInfoDesc, AttachmentDesc, AttachmentRef, ColorBlendAttachment, ColorBlendState,
    ComputePipelineDesc, DepthStencilState, DynamicState, ExtensionRecord, GraphicsPipelineDesc,
    InputAssemblyState, MultisampleState, PhysicalDeviceFeaturesDesc, PipelineHandle,
    PipelineLayoutDesc, PipelineLayoutHandle, PushConstantRange, RasterizationState, Rect2D,
    RenderPassDesc, RenderPassHandle, ResourceKind, SamplerDesc, SamplerHandle, SetLayoutBinding,
    SetLayoutDesc, SetLayoutHandle, ShaderModuleDesc, ShaderModuleHandle, ShaderStageDesc,
    SpecializationInfo, SpecializationMapEntry, StateHash, StencilOpState, SubpassDependency,
    SubpassDesc, TessellationState, VertexBindingDivisor, VertexInputAttribute,
    VertexInputBinding, VertexInputState, Viewport, ViewportState,
};
