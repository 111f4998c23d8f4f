//! Deterministic content hashing for every descriptor kind.
//!
//! Each descriptor is folded into a canonical little-endian byte stream
//! (fixed field order, floats as IEEE bits, arrays length-prefixed) and the
//! stream is hashed with xxh3. References to other objects fold the
//! *referenced object's* content hash, resolved through [`HashResolver`],
//! never the raw handle value — so the result is stable across processes,
//! platforms and handle assignment.

use xxhash_rust::xxh3::xxh3_64;

use crate::error::HashError;
use crate::types::*;

/// Resolves a dependency handle to the referenced object's content hash.
///
/// The recorder implements this over its handle registry (application
/// handles); the replayer implements it over the set of already-verified
/// hashes (identity).
pub trait HashResolver {
    fn sampler_hash(&self, handle: SamplerHandle) -> Option<StateHash>;
    fn set_layout_hash(&self, handle: SetLayoutHandle) -> Option<StateHash>;
    fn pipeline_layout_hash(&self, handle: PipelineLayoutHandle) -> Option<StateHash>;
    fn shader_module_hash(&self, handle: ShaderModuleHandle) -> Option<StateHash>;
    fn render_pass_hash(&self, handle: RenderPassHandle) -> Option<StateHash>;
    fn pipeline_hash(&self, handle: PipelineHandle) -> Option<StateHash>;
}

struct Canon {
    buf: Vec<u8>,
}

impl Canon {
    fn new(kind: ResourceKind) -> Self {
        let mut canon = Canon { buf: Vec::new() };
        canon.u32(kind.tag());
        canon
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.u32(v as u32);
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.u32(v.to_bits());
    }

    fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    fn bytes(&mut self, b: &[u8]) {
        self.u64(b.len() as u64);
        self.buf.extend_from_slice(b);
    }

    fn str(&mut self, s: &str) {
        self.bytes(s.as_bytes());
    }

    fn len(&mut self, len: usize) {
        self.u64(len as u64);
    }

    fn finish(self) -> StateHash {
        xxh3_64(&self.buf)
    }
}

pub fn hash_sampler(desc: &SamplerDesc) -> Result<StateHash, HashError> {
    let mut c = Canon::new(ResourceKind::Sampler);
    fold_sampler_fields(&mut c, desc)?;
    Ok(c.finish())
}

pub fn hash_set_layout(
    resolver: &impl HashResolver,
    desc: &SetLayoutDesc,
) -> Result<StateHash, HashError> {
    let mut c = Canon::new(ResourceKind::DescriptorSetLayout);
    c.u32(desc.flags);
    c.len(desc.bindings.len());
    for binding in &desc.bindings {
        c.u32(binding.binding);
        c.u32(binding.descriptor_type);
        c.u32(binding.descriptor_count);
        c.u32(binding.stage_flags);
        c.len(binding.immutable_samplers.len());
        for &sampler in &binding.immutable_samplers {
            c.u64(resolve_sampler(resolver, sampler)?);
        }
    }
    Ok(c.finish())
}

pub fn hash_pipeline_layout(
    resolver: &impl HashResolver,
    desc: &PipelineLayoutDesc,
) -> Result<StateHash, HashError> {
    let mut c = Canon::new(ResourceKind::PipelineLayout);
    c.u32(desc.flags);
    c.len(desc.set_layouts.len());
    for &layout in &desc.set_layouts {
        c.u64(resolve_set_layout(resolver, layout)?);
    }
    c.len(desc.push_constant_ranges.len());
    for range in &desc.push_constant_ranges {
        c.u32(range.stage_flags);
        c.u32(range.offset);
        c.u32(range.size);
    }
    Ok(c.finish())
}

pub fn hash_shader_module(desc: &ShaderModuleDesc) -> Result<StateHash, HashError> {
    let mut c = Canon::new(ResourceKind::ShaderModule);
    c.u32(desc.flags);
    c.bytes(&desc.code);
    Ok(c.finish())
}

pub fn hash_render_pass(desc: &RenderPassDesc) -> Result<StateHash, HashError> {
    let mut c = Canon::new(ResourceKind::RenderPass);
    c.u32(desc.flags);

    c.len(desc.attachments.len());
    for att in &desc.attachments {
        c.u32(att.flags);
        c.u32(att.format);
        c.u32(att.samples);
        c.u32(att.load_op);
        c.u32(att.store_op);
        c.u32(att.stencil_load_op);
        c.u32(att.stencil_store_op);
        c.u32(att.initial_layout);
        c.u32(att.final_layout);
    }

    c.len(desc.subpasses.len());
    for subpass in &desc.subpasses {
        c.u32(subpass.flags);
        c.u32(subpass.pipeline_bind_point);
        fold_attachment_refs(&mut c, &subpass.input_attachments);
        fold_attachment_refs(&mut c, &subpass.color_attachments);
        fold_attachment_refs(&mut c, &subpass.resolve_attachments);
        c.bool(subpass.depth_stencil_attachment.is_some());
        if let Some(ds) = &subpass.depth_stencil_attachment {
            c.u32(ds.attachment);
            c.u32(ds.layout);
        }
        c.len(subpass.preserve_attachments.len());
        for &idx in &subpass.preserve_attachments {
            c.u32(idx);
        }
    }

    c.len(desc.dependencies.len());
    for dep in &desc.dependencies {
        c.u32(dep.src_subpass);
        c.u32(dep.dst_subpass);
        c.u32(dep.src_stage_mask);
        c.u32(dep.dst_stage_mask);
        c.u32(dep.src_access_mask);
        c.u32(dep.dst_access_mask);
        c.u32(dep.dependency_flags);
    }

    Ok(c.finish())
}

pub fn hash_compute_pipeline(
    resolver: &impl HashResolver,
    desc: &ComputePipelineDesc,
) -> Result<StateHash, HashError> {
    let mut c = Canon::new(ResourceKind::ComputePipeline);
    c.u32(desc.flags);
    fold_stage(&mut c, resolver, &desc.stage)?;
    c.u64(resolve_pipeline_layout(resolver, desc.layout)?);
    fold_base_pipeline(&mut c, resolver, desc.base_pipeline, desc.base_pipeline_index)?;
    Ok(c.finish())
}

pub fn hash_graphics_pipeline(
    resolver: &impl HashResolver,
    desc: &GraphicsPipelineDesc,
) -> Result<StateHash, HashError> {
    let mut c = Canon::new(ResourceKind::GraphicsPipeline);
    c.u32(desc.flags);

    c.len(desc.stages.len());
    for stage in &desc.stages {
        fold_stage(&mut c, resolver, stage)?;
    }

    c.bool(desc.vertex_input.is_some());
    if let Some(vi) = &desc.vertex_input {
        c.u32(vi.flags);
        c.len(vi.bindings.len());
        for binding in &vi.bindings {
            c.u32(binding.binding);
            c.u32(binding.stride);
            c.u32(binding.input_rate);
        }
        c.len(vi.attributes.len());
        for attr in &vi.attributes {
            c.u32(attr.location);
            c.u32(attr.binding);
            c.u32(attr.format);
            c.u32(attr.offset);
        }
        fold_extensions(
            &mut c,
            ResourceKind::GraphicsPipeline,
            &vi.extensions,
            &[1002],
        )?;
    }

    c.bool(desc.input_assembly.is_some());
    if let Some(ia) = &desc.input_assembly {
        c.u32(ia.flags);
        c.u32(ia.topology);
        c.bool(ia.primitive_restart_enable);
    }

    c.bool(desc.tessellation.is_some());
    if let Some(tess) = &desc.tessellation {
        c.u32(tess.flags);
        c.u32(tess.patch_control_points);
        fold_extensions(
            &mut c,
            ResourceKind::GraphicsPipeline,
            &tess.extensions,
            &[1003],
        )?;
    }

    c.bool(desc.viewport.is_some());
    if let Some(vp) = &desc.viewport {
        c.u32(vp.flags);
        // The counts govern identity; the arrays may be shorter when
        // viewports or scissors are dynamic.
        c.u32(vp.viewport_count);
        c.u32(vp.scissor_count);
        c.len(vp.viewports.len());
        for viewport in &vp.viewports {
            c.f32(viewport.x);
            c.f32(viewport.y);
            c.f32(viewport.width);
            c.f32(viewport.height);
            c.f32(viewport.min_depth);
            c.f32(viewport.max_depth);
        }
        c.len(vp.scissors.len());
        for scissor in &vp.scissors {
            c.i32(scissor.x);
            c.i32(scissor.y);
            c.u32(scissor.width);
            c.u32(scissor.height);
        }
    }

    c.bool(desc.rasterization.is_some());
    if let Some(rs) = &desc.rasterization {
        c.u32(rs.flags);
        c.bool(rs.depth_clamp_enable);
        c.bool(rs.rasterizer_discard_enable);
        c.u32(rs.polygon_mode);
        c.u32(rs.cull_mode);
        c.u32(rs.front_face);
        c.bool(rs.depth_bias_enable);
        c.f32(rs.depth_bias_constant_factor);
        c.f32(rs.depth_bias_clamp);
        c.f32(rs.depth_bias_slope_factor);
        c.f32(rs.line_width);
        fold_extensions(
            &mut c,
            ResourceKind::GraphicsPipeline,
            &rs.extensions,
            &[1004, 1005],
        )?;
    }

    c.bool(desc.multisample.is_some());
    if let Some(ms) = &desc.multisample {
        c.u32(ms.flags);
        c.u32(ms.rasterization_samples);
        c.bool(ms.sample_shading_enable);
        c.f32(ms.min_sample_shading);
        c.len(ms.sample_mask.len());
        for &word in &ms.sample_mask {
            c.u32(word);
        }
        c.bool(ms.alpha_to_coverage_enable);
        c.bool(ms.alpha_to_one_enable);
    }

    c.bool(desc.depth_stencil.is_some());
    if let Some(ds) = &desc.depth_stencil {
        c.u32(ds.flags);
        c.bool(ds.depth_test_enable);
        c.bool(ds.depth_write_enable);
        c.u32(ds.depth_compare_op);
        c.bool(ds.depth_bounds_test_enable);
        c.bool(ds.stencil_test_enable);
        for side in [&ds.front, &ds.back] {
            c.u32(side.fail_op);
            c.u32(side.pass_op);
            c.u32(side.depth_fail_op);
            c.u32(side.compare_op);
            c.u32(side.compare_mask);
            c.u32(side.write_mask);
            c.u32(side.reference);
        }
        c.f32(ds.min_depth_bounds);
        c.f32(ds.max_depth_bounds);
    }

    c.bool(desc.color_blend.is_some());
    if let Some(cb) = &desc.color_blend {
        c.u32(cb.flags);
        c.bool(cb.logic_op_enable);
        c.u32(cb.logic_op);
        c.len(cb.attachments.len());
        for att in &cb.attachments {
            c.bool(att.blend_enable);
            c.u32(att.src_color_blend_factor);
            c.u32(att.dst_color_blend_factor);
            c.u32(att.color_blend_op);
            c.u32(att.src_alpha_blend_factor);
            c.u32(att.dst_alpha_blend_factor);
            c.u32(att.alpha_blend_op);
            c.u32(att.color_write_mask);
        }
        for constant in cb.blend_constants {
            c.f32(constant);
        }
    }

    c.bool(desc.dynamic.is_some());
    if let Some(dynamic) = &desc.dynamic {
        c.u32(dynamic.flags);
        c.len(dynamic.dynamic_states.len());
        for &state in &dynamic.dynamic_states {
            c.u32(state);
        }
    }

    c.u64(resolve_pipeline_layout(resolver, desc.layout)?);
    c.bool(desc.render_pass.is_some());
    if let Some(render_pass) = desc.render_pass {
        c.u64(resolve_render_pass(resolver, render_pass)?);
    }
    c.u32(desc.subpass);
    fold_base_pipeline(&mut c, resolver, desc.base_pipeline, desc.base_pipeline_index)?;

    Ok(c.finish())
}

/// Combined hash over the application-info and device-feature singletons;
/// delivered to the replay sink before any object.
pub fn hash_application_info(
    info: Option<&ApplicationInfoDesc>,
    features: Option<&PhysicalDeviceFeaturesDesc>,
) -> StateHash {
    let mut c = Canon::new(ResourceKind::ApplicationInfo);
    c.bool(info.is_some());
    if let Some(info) = info {
        c.bool(info.application_name.is_some());
        if let Some(name) = &info.application_name {
            c.str(name);
        }
        c.u32(info.application_version);
        c.bool(info.engine_name.is_some());
        if let Some(name) = &info.engine_name {
            c.str(name);
        }
        c.u32(info.engine_version);
        c.u32(info.api_version);
    }
    c.bool(features.is_some());
    if let Some(features) = features {
        c.bool(features.robust_buffer_access);
    }
    c.finish()
}

fn fold_sampler_fields(c: &mut Canon, desc: &SamplerDesc) -> Result<(), HashError> {
    c.u32(desc.flags);
    c.u32(desc.mag_filter);
    c.u32(desc.min_filter);
    c.u32(desc.mipmap_mode);
    c.u32(desc.address_mode_u);
    c.u32(desc.address_mode_v);
    c.u32(desc.address_mode_w);
    c.f32(desc.mip_lod_bias);
    c.bool(desc.anisotropy_enable);
    c.f32(desc.max_anisotropy);
    c.bool(desc.compare_enable);
    c.u32(desc.compare_op);
    c.f32(desc.min_lod);
    c.f32(desc.max_lod);
    c.u32(desc.border_color);
    c.bool(desc.unnormalized_coordinates);
    fold_extensions(c, ResourceKind::Sampler, &desc.extensions, &[1000])
}

fn fold_stage(
    c: &mut Canon,
    resolver: &impl HashResolver,
    stage: &ShaderStageDesc,
) -> Result<(), HashError> {
    c.u32(stage.flags);
    c.u32(stage.stage);
    c.u64(resolve_shader_module(resolver, stage.module)?);
    c.str(&stage.name);
    c.bool(stage.specialization.is_some());
    if let Some(spec) = &stage.specialization {
        c.len(spec.map_entries.len());
        for entry in &spec.map_entries {
            c.u32(entry.constant_id);
            c.u32(entry.offset);
            c.u32(entry.size);
        }
        c.bytes(&spec.data);
    }
    Ok(())
}

fn fold_base_pipeline(
    c: &mut Canon,
    resolver: &impl HashResolver,
    base: Option<PipelineHandle>,
    index: i32,
) -> Result<(), HashError> {
    c.bool(base.is_some());
    if let Some(base) = base {
        let hash = resolver
            .pipeline_hash(base)
            .ok_or(HashError::UnknownReference {
                kind: ResourceKind::GraphicsPipeline,
                handle: base.0,
            })?;
        c.u64(hash);
    }
    c.i32(index);
    Ok(())
}

fn fold_attachment_refs(c: &mut Canon, refs: &[AttachmentRef]) {
    c.len(refs.len());
    for r in refs {
        c.u32(r.attachment);
        c.u32(r.layout);
    }
}

/// Fold a chain position. Records whose tag is not in `allowed` fail the
/// whole descriptor; recognized records contribute in tag order no matter
/// how the chain was linked.
fn fold_extensions(
    c: &mut Canon,
    kind: ResourceKind,
    chain: &[ExtensionRecord],
    allowed: &[u32],
) -> Result<(), HashError> {
    for record in chain {
        if !allowed.contains(&record.type_tag()) {
            return Err(HashError::UnsupportedExtension {
                kind,
                type_tag: record.type_tag(),
            });
        }
    }

    let mut recognized: Vec<&ExtensionRecord> = chain.iter().collect();
    recognized.sort_by_key(|record| record.type_tag());

    c.len(recognized.len());
    for record in recognized {
        c.u32(record.type_tag());
        match record {
            ExtensionRecord::SamplerReductionMode { reduction_mode } => {
                c.u32(*reduction_mode);
            }
            ExtensionRecord::SamplerYcbcrConversion {
                format,
                ycbcr_model,
                ycbcr_range,
                component_r,
                component_g,
                component_b,
                component_a,
                x_chroma_offset,
                y_chroma_offset,
                chroma_filter,
                force_explicit_reconstruction,
            } => {
                c.u32(*format);
                c.u32(*ycbcr_model);
                c.u32(*ycbcr_range);
                c.u32(*component_r);
                c.u32(*component_g);
                c.u32(*component_b);
                c.u32(*component_a);
                c.u32(*x_chroma_offset);
                c.u32(*y_chroma_offset);
                c.u32(*chroma_filter);
                c.bool(*force_explicit_reconstruction);
            }
            ExtensionRecord::VertexInputDivisor { divisors } => {
                c.len(divisors.len());
                for divisor in divisors {
                    c.u32(divisor.binding);
                    c.u32(divisor.divisor);
                }
            }
            ExtensionRecord::TessellationDomainOrigin { domain_origin } => {
                c.u32(*domain_origin);
            }
            ExtensionRecord::RasterizationDepthClip {
                flags,
                depth_clip_enable,
            } => {
                c.u32(*flags);
                c.bool(*depth_clip_enable);
            }
            ExtensionRecord::RasterizationStream {
                flags,
                rasterization_stream,
            } => {
                c.u32(*flags);
                c.u32(*rasterization_stream);
            }
        }
    }
    Ok(())
}

fn resolve_sampler(
    resolver: &impl HashResolver,
    handle: SamplerHandle,
) -> Result<StateHash, HashError> {
    resolver
        .sampler_hash(handle)
        .ok_or(HashError::UnknownReference {
            kind: ResourceKind::Sampler,
            handle: handle.0,
        })
}

fn resolve_set_layout(
    resolver: &impl HashResolver,
    handle: SetLayoutHandle,
) -> Result<StateHash, HashError> {
    resolver
        .set_layout_hash(handle)
        .ok_or(HashError::UnknownReference {
            kind: ResourceKind::DescriptorSetLayout,
            handle: handle.0,
        })
}

fn resolve_pipeline_layout(
    resolver: &impl HashResolver,
    handle: PipelineLayoutHandle,
) -> Result<StateHash, HashError> {
    resolver
        .pipeline_layout_hash(handle)
        .ok_or(HashError::UnknownReference {
            kind: ResourceKind::PipelineLayout,
            handle: handle.0,
        })
}

fn resolve_shader_module(
    resolver: &impl HashResolver,
    handle: ShaderModuleHandle,
) -> Result<StateHash, HashError> {
    resolver
        .shader_module_hash(handle)
        .ok_or(HashError::UnknownReference {
            kind: ResourceKind::ShaderModule,
            handle: handle.0,
        })
}

fn resolve_render_pass(
    resolver: &impl HashResolver,
    handle: RenderPassHandle,
) -> Result<StateHash, HashError> {
    resolver
        .render_pass_hash(handle)
        .ok_or(HashError::UnknownReference {
            kind: ResourceKind::RenderPass,
            handle: handle.0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_hash_changes_with_any_field() {
        let mut desc = SamplerDesc {
            min_lod: 10.0,
            ..SamplerDesc::default()
        };
        let a = hash_sampler(&desc).unwrap();
        desc.min_lod = 11.0;
        let b = hash_sampler(&desc).unwrap();
        assert_ne!(a, b);

        desc.min_lod = 10.0;
        assert_eq!(hash_sampler(&desc).unwrap(), a);
    }

    #[test]
    fn sampler_rejects_foreign_extension_records() {
        let desc = SamplerDesc {
            extensions: vec![
                ExtensionRecord::SamplerYcbcrConversion {
                    format: 0,
                    ycbcr_model: 0,
                    ycbcr_range: 0,
                    component_r: 0,
                    component_g: 0,
                    component_b: 0,
                    component_a: 0,
                    x_chroma_offset: 0,
                    y_chroma_offset: 0,
                    chroma_filter: 0,
                    force_explicit_reconstruction: false,
                },
                ExtensionRecord::SamplerReductionMode { reduction_mode: 2 },
            ],
            ..SamplerDesc::default()
        };
        let err = hash_sampler(&desc).unwrap_err();
        assert!(matches!(
            err,
            HashError::UnsupportedExtension {
                kind: ResourceKind::Sampler,
                type_tag: 1001
            }
        ));
    }

    #[test]
    fn recognized_extensions_fold_in_tag_order() {
        let clip = ExtensionRecord::RasterizationDepthClip {
            flags: 0,
            depth_clip_enable: true,
        };
        let stream = ExtensionRecord::RasterizationStream {
            flags: 0,
            rasterization_stream: 1,
        };

        let raster = |extensions: Vec<ExtensionRecord>| GraphicsPipelineDesc {
            rasterization: Some(RasterizationState {
                extensions,
                ..RasterizationState::default()
            }),
            ..GraphicsPipelineDesc::default()
        };

        let resolver = NoDeps;
        let forward =
            hash_graphics_pipeline(&resolver, &raster(vec![clip.clone(), stream.clone()])).unwrap();
        let backward = hash_graphics_pipeline(&resolver, &raster(vec![stream, clip])).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn viewport_counts_contribute_without_array_entries() {
        let with_counts = GraphicsPipelineDesc {
            viewport: Some(ViewportState {
                viewport_count: 2,
                scissor_count: 2,
                ..ViewportState::default()
            }),
            ..GraphicsPipelineDesc::default()
        };
        let without_counts = GraphicsPipelineDesc {
            viewport: Some(ViewportState::default()),
            ..GraphicsPipelineDesc::default()
        };

        let resolver = NoDeps;
        assert_ne!(
            hash_graphics_pipeline(&resolver, &with_counts).unwrap(),
            hash_graphics_pipeline(&resolver, &without_counts).unwrap()
        );
    }

    #[test]
    fn unknown_reference_is_reported_with_its_kind() {
        let desc = SetLayoutDesc {
            bindings: vec![SetLayoutBinding {
                binding: 0,
                descriptor_count: 1,
                immutable_samplers: vec![SamplerHandle(77)],
                ..SetLayoutBinding::default()
            }],
            ..SetLayoutDesc::default()
        };
        let err = hash_set_layout(&NoDeps, &desc).unwrap_err();
        assert!(matches!(
            err,
            HashError::UnknownReference {
                kind: ResourceKind::Sampler,
                handle: 77
            }
        ));
    }

    #[test]
    fn application_info_hash_covers_both_singletons() {
        let info = ApplicationInfoDesc {
            application_name: Some("testy".to_owned()),
            engine_name: Some("test".to_owned()),
            application_version: 123515,
            engine_version: 1234,
            api_version: (1 << 22) | (1 << 12),
        };
        let features = PhysicalDeviceFeaturesDesc {
            robust_buffer_access: true,
        };

        let base = hash_application_info(Some(&info), Some(&features));
        assert_ne!(base, hash_application_info(Some(&info), None));
        assert_ne!(base, hash_application_info(None, Some(&features)));

        let mut renamed = info.clone();
        renamed.engine_name = Some("other".to_owned());
        assert_ne!(base, hash_application_info(Some(&renamed), Some(&features)));
    }

    struct NoDeps;

    impl HashResolver for NoDeps {
        fn sampler_hash(&self, _: SamplerHandle) -> Option<StateHash> {
            None
        }
        fn set_layout_hash(&self, _: SetLayoutHandle) -> Option<StateHash> {
            None
        }
        fn pipeline_layout_hash(&self, handle: PipelineLayoutHandle) -> Option<StateHash> {
            // The default pipeline-layout handle (0) resolves so descriptors
            // built from Default can hash in tests.
            (handle.0 == 0).then_some(0)
        }
        fn shader_module_hash(&self, handle: ShaderModuleHandle) -> Option<StateHash> {
            (handle.0 == 0).then_some(0)
        }
        fn render_pass_hash(&self, _: RenderPassHandle) -> Option<StateHash> {
            None
        }
        fn pipeline_hash(&self, _: PipelineHandle) -> Option<StateHash> {
            None
        }
    }
}
