use std::collections::HashMap;

use tracing::warn;

use crate::error::{HashError, ReplayError};
use crate::hash::{
    hash_application_info, hash_compute_pipeline, hash_graphics_pipeline, hash_pipeline_layout,
    hash_render_pass, hash_sampler, hash_set_layout, hash_shader_module, HashResolver,
};
use crate::serialize::{StateDocument, STATE_DOCUMENT_VERSION};
use crate::types::*;

/// A sink declined to build one object. Delivery of that object stops; its
/// siblings keep replaying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkReject;

/// Consumer of replayed state, typically a driver-call dispatcher.
///
/// Objects arrive in dependency order; every method receives the expected
/// content hash alongside the descriptor, with dependency handles already
/// rewritten to whatever this sink returned for the dependencies.
pub trait ReplaySink {
    fn set_application_info(
        &mut self,
        hash: StateHash,
        info: Option<&ApplicationInfoDesc>,
        features: Option<&PhysicalDeviceFeaturesDesc>,
    ) {
        let _ = (hash, info, features);
    }

    fn create_sampler(
        &mut self,
        hash: StateHash,
        desc: &SamplerDesc,
    ) -> Result<SamplerHandle, SinkReject>;

    fn create_set_layout(
        &mut self,
        hash: StateHash,
        desc: &SetLayoutDesc,
    ) -> Result<SetLayoutHandle, SinkReject>;

    fn create_pipeline_layout(
        &mut self,
        hash: StateHash,
        desc: &PipelineLayoutDesc,
    ) -> Result<PipelineLayoutHandle, SinkReject>;

    fn create_shader_module(
        &mut self,
        hash: StateHash,
        desc: &ShaderModuleDesc,
    ) -> Result<ShaderModuleHandle, SinkReject>;

    fn create_render_pass(
        &mut self,
        hash: StateHash,
        desc: &RenderPassDesc,
    ) -> Result<RenderPassHandle, SinkReject>;

    fn create_compute_pipeline(
        &mut self,
        hash: StateHash,
        desc: &ComputePipelineDesc,
    ) -> Result<PipelineHandle, SinkReject>;

    fn create_graphics_pipeline(
        &mut self,
        hash: StateHash,
        desc: &GraphicsPipelineDesc,
    ) -> Result<PipelineHandle, SinkReject>;
}

/// Per-replay delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub delivered: u64,
    /// Entries whose recomputed hash disagreed with the recorded one (or
    /// that could not be hashed at all).
    pub hash_mismatches: u64,
    /// Entries referencing a dependency that was itself skipped or missing.
    pub missing_dependencies: u64,
    pub sink_rejections: u64,
}

/// Parse a serialized state document and drive `sink` in dependency order.
///
/// Every entry's hash is recomputed before delivery; a mismatch, a missing
/// dependency or a sink rejection skips that entry and replay continues with
/// the rest. Only a structurally unusable document (malformed JSON, unknown
/// version) fails the call.
pub fn replay_state(bytes: &[u8], sink: &mut impl ReplaySink) -> Result<ReplayStats, ReplayError> {
    let doc: StateDocument = serde_json::from_slice(bytes)?;
    if doc.version != STATE_DOCUMENT_VERSION {
        return Err(ReplayError::UnsupportedVersion(doc.version));
    }

    let mut stats = ReplayStats::default();
    let mut ctx = DeliveryContext::default();

    sink.set_application_info(
        hash_application_info(
            doc.application_info.as_ref(),
            doc.physical_device_features.as_ref(),
        ),
        doc.application_info.as_ref(),
        doc.physical_device_features.as_ref(),
    );

    for entry in &doc.samplers {
        if !verify(&mut stats, entry.hash, hash_sampler(&entry.desc)) {
            continue;
        }
        match sink.create_sampler(entry.hash, &entry.desc) {
            Ok(handle) => {
                ctx.samplers.insert(entry.hash, handle);
                stats.delivered += 1;
            }
            Err(SinkReject) => stats.sink_rejections += 1,
        }
    }

    for entry in &doc.set_layouts {
        if !verify(&mut stats, entry.hash, hash_set_layout(&ctx, &entry.desc)) {
            continue;
        }
        let Some(desc) = ctx.substitute_set_layout(&entry.desc) else {
            stats.missing_dependencies += 1;
            continue;
        };
        match sink.create_set_layout(entry.hash, &desc) {
            Ok(handle) => {
                ctx.set_layouts.insert(entry.hash, handle);
                stats.delivered += 1;
            }
            Err(SinkReject) => stats.sink_rejections += 1,
        }
    }

    for entry in &doc.pipeline_layouts {
        if !verify(
            &mut stats,
            entry.hash,
            hash_pipeline_layout(&ctx, &entry.desc),
        ) {
            continue;
        }
        let Some(desc) = ctx.substitute_pipeline_layout(&entry.desc) else {
            stats.missing_dependencies += 1;
            continue;
        };
        match sink.create_pipeline_layout(entry.hash, &desc) {
            Ok(handle) => {
                ctx.pipeline_layouts.insert(entry.hash, handle);
                stats.delivered += 1;
            }
            Err(SinkReject) => stats.sink_rejections += 1,
        }
    }

    for entry in &doc.shader_modules {
        if !verify(&mut stats, entry.hash, hash_shader_module(&entry.desc)) {
            continue;
        }
        match sink.create_shader_module(entry.hash, &entry.desc) {
            Ok(handle) => {
                ctx.shader_modules.insert(entry.hash, handle);
                stats.delivered += 1;
            }
            Err(SinkReject) => stats.sink_rejections += 1,
        }
    }

    for entry in &doc.render_passes {
        if !verify(&mut stats, entry.hash, hash_render_pass(&entry.desc)) {
            continue;
        }
        match sink.create_render_pass(entry.hash, &entry.desc) {
            Ok(handle) => {
                ctx.render_passes.insert(entry.hash, handle);
                stats.delivered += 1;
            }
            Err(SinkReject) => stats.sink_rejections += 1,
        }
    }

    for entry in &doc.compute_pipelines {
        if !verify(
            &mut stats,
            entry.hash,
            hash_compute_pipeline(&ctx, &entry.desc),
        ) {
            continue;
        }
        let Some(desc) = ctx.substitute_compute_pipeline(&entry.desc) else {
            stats.missing_dependencies += 1;
            continue;
        };
        match sink.create_compute_pipeline(entry.hash, &desc) {
            Ok(handle) => {
                ctx.pipelines.insert(entry.hash, handle);
                stats.delivered += 1;
            }
            Err(SinkReject) => stats.sink_rejections += 1,
        }
    }

    for entry in &doc.graphics_pipelines {
        if !verify(
            &mut stats,
            entry.hash,
            hash_graphics_pipeline(&ctx, &entry.desc),
        ) {
            continue;
        }
        let Some(desc) = ctx.substitute_graphics_pipeline(&entry.desc) else {
            stats.missing_dependencies += 1;
            continue;
        };
        match sink.create_graphics_pipeline(entry.hash, &desc) {
            Ok(handle) => {
                ctx.pipelines.insert(entry.hash, handle);
                stats.delivered += 1;
            }
            Err(SinkReject) => stats.sink_rejections += 1,
        }
    }

    Ok(stats)
}

fn verify(
    stats: &mut ReplayStats,
    expected: StateHash,
    recomputed: Result<StateHash, HashError>,
) -> bool {
    match recomputed {
        Ok(hash) if hash == expected => true,
        Ok(hash) => {
            warn!(expected, recomputed = hash, "hash mismatch, skipping entry");
            stats.hash_mismatches += 1;
            false
        }
        Err(HashError::UnknownReference { kind, handle }) => {
            warn!(expected, ?kind, handle, "dependency unavailable, skipping entry");
            stats.missing_dependencies += 1;
            false
        }
        Err(err) => {
            warn!(expected, error = %err, "unverifiable entry, skipping");
            stats.hash_mismatches += 1;
            false
        }
    }
}

/// Hash -> sink-handle maps for everything delivered so far.
///
/// Doubles as the [`HashResolver`] for re-verification: a canonical handle
/// resolves iff the object it names was delivered, which is exactly the
/// identity resolution the hashes were computed under.
#[derive(Debug, Default)]
struct DeliveryContext {
    samplers: HashMap<StateHash, SamplerHandle>,
    set_layouts: HashMap<StateHash, SetLayoutHandle>,
    pipeline_layouts: HashMap<StateHash, PipelineLayoutHandle>,
    shader_modules: HashMap<StateHash, ShaderModuleHandle>,
    render_passes: HashMap<StateHash, RenderPassHandle>,
    pipelines: HashMap<StateHash, PipelineHandle>,
}

impl DeliveryContext {
    fn substitute_set_layout(&self, desc: &SetLayoutDesc) -> Option<SetLayoutDesc> {
        let mut out = desc.clone();
        for binding in &mut out.bindings {
            for sampler in &mut binding.immutable_samplers {
                *sampler = *self.samplers.get(&sampler.0)?;
            }
        }
        Some(out)
    }

    fn substitute_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> Option<PipelineLayoutDesc> {
        let mut out = desc.clone();
        for layout in &mut out.set_layouts {
            *layout = *self.set_layouts.get(&layout.0)?;
        }
        Some(out)
    }

    fn substitute_stage(&self, stage: &mut ShaderStageDesc) -> Option<()> {
        stage.module = *self.shader_modules.get(&stage.module.0)?;
        Some(())
    }

    fn substitute_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Option<ComputePipelineDesc> {
        let mut out = desc.clone();
        self.substitute_stage(&mut out.stage)?;
        out.layout = *self.pipeline_layouts.get(&out.layout.0)?;
        if let Some(base) = &mut out.base_pipeline {
            *base = *self.pipelines.get(&base.0)?;
        }
        Some(out)
    }

    fn substitute_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
    ) -> Option<GraphicsPipelineDesc> {
        let mut out = desc.clone();
        for stage in &mut out.stages {
            self.substitute_stage(stage)?;
        }
        out.layout = *self.pipeline_layouts.get(&out.layout.0)?;
        if let Some(render_pass) = &mut out.render_pass {
            *render_pass = *self.render_passes.get(&render_pass.0)?;
        }
        if let Some(base) = &mut out.base_pipeline {
            *base = *self.pipelines.get(&base.0)?;
        }
        Some(out)
    }
}

impl HashResolver for DeliveryContext {
    fn sampler_hash(&self, handle: SamplerHandle) -> Option<StateHash> {
        self.samplers.contains_key(&handle.0).then_some(handle.0)
    }

    fn set_layout_hash(&self, handle: SetLayoutHandle) -> Option<StateHash> {
        self.set_layouts.contains_key(&handle.0).then_some(handle.0)
    }

    fn pipeline_layout_hash(&self, handle: PipelineLayoutHandle) -> Option<StateHash> {
        self.pipeline_layouts
            .contains_key(&handle.0)
            .then_some(handle.0)
    }

    fn shader_module_hash(&self, handle: ShaderModuleHandle) -> Option<StateHash> {
        self.shader_modules
            .contains_key(&handle.0)
            .then_some(handle.0)
    }

    fn render_pass_hash(&self, handle: RenderPassHandle) -> Option<StateHash> {
        self.render_passes
            .contains_key(&handle.0)
            .then_some(handle.0)
    }

    fn pipeline_hash(&self, handle: PipelineHandle) -> Option<StateHash> {
        self.pipelines.contains_key(&handle.0).then_some(handle.0)
    }
}
