use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::error::{HashError, RecordError};
use crate::hash::{
    hash_application_info, hash_compute_pipeline, hash_graphics_pipeline, hash_pipeline_layout,
    hash_render_pass, hash_sampler, hash_set_layout, hash_shader_module, HashResolver,
};
use crate::serialize::{Entry, StateDocument, STATE_DOCUMENT_VERSION};
use crate::types::*;

/// In-memory intern tables for every recorded object kind.
///
/// Descriptors are stored in canonical form: dependency handles are rewritten
/// to the referenced object's content hash at record time, so re-hashing an
/// interned descriptor always reproduces its key. A failed record call (bad
/// extension chain, dangling reference) leaves every table untouched.
#[derive(Debug, Default)]
pub struct Recorder {
    application_info: Option<ApplicationInfoDesc>,
    physical_device_features: Option<PhysicalDeviceFeaturesDesc>,

    samplers: BTreeMap<StateHash, SamplerDesc>,
    set_layouts: BTreeMap<StateHash, SetLayoutDesc>,
    pipeline_layouts: BTreeMap<StateHash, PipelineLayoutDesc>,
    shader_modules: BTreeMap<StateHash, ShaderModuleDesc>,
    render_passes: BTreeMap<StateHash, RenderPassDesc>,
    compute_pipelines: BTreeMap<StateHash, ComputePipelineDesc>,
    graphics_pipelines: BTreeMap<StateHash, GraphicsPipelineDesc>,

    sampler_handles: HashMap<SamplerHandle, StateHash>,
    set_layout_handles: HashMap<SetLayoutHandle, StateHash>,
    pipeline_layout_handles: HashMap<PipelineLayoutHandle, StateHash>,
    shader_module_handles: HashMap<ShaderModuleHandle, StateHash>,
    render_pass_handles: HashMap<RenderPassHandle, StateHash>,
    pipeline_handles: HashMap<PipelineHandle, StateHash>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins, as applications may re-announce themselves.
    pub fn record_application_info(&mut self, info: ApplicationInfoDesc) {
        self.application_info = Some(info);
    }

    pub fn record_physical_device_features(&mut self, features: PhysicalDeviceFeaturesDesc) {
        self.physical_device_features = Some(features);
    }

    pub fn record_sampler(
        &mut self,
        handle: SamplerHandle,
        desc: SamplerDesc,
    ) -> Result<StateHash, RecordError> {
        let hash = hash_sampler(&desc).map_err(|err| reject(ResourceKind::Sampler, err))?;
        self.samplers.entry(hash).or_insert(desc);
        self.sampler_handles.insert(handle, hash);
        Ok(hash)
    }

    pub fn record_set_layout(
        &mut self,
        handle: SetLayoutHandle,
        desc: SetLayoutDesc,
    ) -> Result<StateHash, RecordError> {
        let canonical = self
            .canonicalize_set_layout(desc)
            .map_err(|err| reject(ResourceKind::DescriptorSetLayout, err))?;
        let hash = hash_set_layout(&self.interned(), &canonical)
            .map_err(|err| reject(ResourceKind::DescriptorSetLayout, err))?;
        self.set_layouts.entry(hash).or_insert(canonical);
        self.set_layout_handles.insert(handle, hash);
        Ok(hash)
    }

    pub fn record_pipeline_layout(
        &mut self,
        handle: PipelineLayoutHandle,
        desc: PipelineLayoutDesc,
    ) -> Result<StateHash, RecordError> {
        let canonical = self
            .canonicalize_pipeline_layout(desc)
            .map_err(|err| reject(ResourceKind::PipelineLayout, err))?;
        let hash = hash_pipeline_layout(&self.interned(), &canonical)
            .map_err(|err| reject(ResourceKind::PipelineLayout, err))?;
        self.pipeline_layouts.entry(hash).or_insert(canonical);
        self.pipeline_layout_handles.insert(handle, hash);
        Ok(hash)
    }

    pub fn record_shader_module(
        &mut self,
        handle: ShaderModuleHandle,
        desc: ShaderModuleDesc,
    ) -> Result<StateHash, RecordError> {
        let hash =
            hash_shader_module(&desc).map_err(|err| reject(ResourceKind::ShaderModule, err))?;
        self.shader_modules.entry(hash).or_insert(desc);
        self.shader_module_handles.insert(handle, hash);
        Ok(hash)
    }

    pub fn record_render_pass(
        &mut self,
        handle: RenderPassHandle,
        desc: RenderPassDesc,
    ) -> Result<StateHash, RecordError> {
        let hash = hash_render_pass(&desc).map_err(|err| reject(ResourceKind::RenderPass, err))?;
        self.render_passes.entry(hash).or_insert(desc);
        self.render_pass_handles.insert(handle, hash);
        Ok(hash)
    }

    pub fn record_compute_pipeline(
        &mut self,
        handle: PipelineHandle,
        desc: ComputePipelineDesc,
    ) -> Result<StateHash, RecordError> {
        let canonical = self
            .canonicalize_compute_pipeline(desc)
            .map_err(|err| reject(ResourceKind::ComputePipeline, err))?;
        let hash = hash_compute_pipeline(&self.interned(), &canonical)
            .map_err(|err| reject(ResourceKind::ComputePipeline, err))?;
        self.compute_pipelines.entry(hash).or_insert(canonical);
        self.pipeline_handles.insert(handle, hash);
        Ok(hash)
    }

    pub fn record_graphics_pipeline(
        &mut self,
        handle: PipelineHandle,
        desc: GraphicsPipelineDesc,
    ) -> Result<StateHash, RecordError> {
        let canonical = self
            .canonicalize_graphics_pipeline(desc)
            .map_err(|err| reject(ResourceKind::GraphicsPipeline, err))?;
        let hash = hash_graphics_pipeline(&self.interned(), &canonical)
            .map_err(|err| reject(ResourceKind::GraphicsPipeline, err))?;
        self.graphics_pipelines.entry(hash).or_insert(canonical);
        self.pipeline_handles.insert(handle, hash);
        Ok(hash)
    }

    /// Serialize the entire interned state into the versioned JSON document.
    /// Byte-identical output for identical intern state.
    pub fn serialize(&self) -> Result<Vec<u8>, RecordError> {
        let doc = StateDocument {
            version: STATE_DOCUMENT_VERSION,
            application_info: self.application_info.clone(),
            physical_device_features: self.physical_device_features,
            samplers: entries(&self.samplers),
            set_layouts: entries(&self.set_layouts),
            pipeline_layouts: entries(&self.pipeline_layouts),
            shader_modules: entries(&self.shader_modules),
            render_passes: entries(&self.render_passes),
            compute_pipelines: entries(&self.compute_pipelines),
            graphics_pipelines: entries(&self.graphics_pipelines),
        };
        Ok(serde_json::to_vec_pretty(&doc)?)
    }

    pub fn application_info(&self) -> Option<&ApplicationInfoDesc> {
        self.application_info.as_ref()
    }

    pub fn physical_device_features(&self) -> Option<&PhysicalDeviceFeaturesDesc> {
        self.physical_device_features.as_ref()
    }

    /// Combined hash over the two recorded singletons.
    pub fn application_feature_hash(&self) -> StateHash {
        hash_application_info(
            self.application_info.as_ref(),
            self.physical_device_features.as_ref(),
        )
    }

    /// Number of interned objects of `kind` (for the singleton kinds: 0 or 1).
    pub fn interned_len(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::ApplicationInfo => usize::from(self.application_info.is_some()),
            ResourceKind::Sampler => self.samplers.len(),
            ResourceKind::DescriptorSetLayout => self.set_layouts.len(),
            ResourceKind::PipelineLayout => self.pipeline_layouts.len(),
            ResourceKind::ShaderModule => self.shader_modules.len(),
            ResourceKind::RenderPass => self.render_passes.len(),
            ResourceKind::GraphicsPipeline => self.graphics_pipelines.len(),
            ResourceKind::ComputePipeline => self.compute_pipelines.len(),
            ResourceKind::PhysicalDeviceFeatures => {
                usize::from(self.physical_device_features.is_some())
            }
        }
    }

    pub fn contains(&self, kind: ResourceKind, hash: StateHash) -> bool {
        match kind {
            ResourceKind::ApplicationInfo | ResourceKind::PhysicalDeviceFeatures => false,
            ResourceKind::Sampler => self.samplers.contains_key(&hash),
            ResourceKind::DescriptorSetLayout => self.set_layouts.contains_key(&hash),
            ResourceKind::PipelineLayout => self.pipeline_layouts.contains_key(&hash),
            ResourceKind::ShaderModule => self.shader_modules.contains_key(&hash),
            ResourceKind::RenderPass => self.render_passes.contains_key(&hash),
            ResourceKind::GraphicsPipeline => self.graphics_pipelines.contains_key(&hash),
            ResourceKind::ComputePipeline => self.compute_pipelines.contains_key(&hash),
        }
    }

    fn interned(&self) -> InternResolver<'_> {
        InternResolver(self)
    }

    fn canonicalize_set_layout(&self, mut desc: SetLayoutDesc) -> Result<SetLayoutDesc, HashError> {
        for binding in &mut desc.bindings {
            for sampler in &mut binding.immutable_samplers {
                let hash = *self.sampler_handles.get(sampler).ok_or(
                    HashError::UnknownReference {
                        kind: ResourceKind::Sampler,
                        handle: sampler.0,
                    },
                )?;
                *sampler = SamplerHandle(hash);
            }
        }
        Ok(desc)
    }

    fn canonicalize_pipeline_layout(
        &self,
        mut desc: PipelineLayoutDesc,
    ) -> Result<PipelineLayoutDesc, HashError> {
        for layout in &mut desc.set_layouts {
            let hash =
                *self
                    .set_layout_handles
                    .get(layout)
                    .ok_or(HashError::UnknownReference {
                        kind: ResourceKind::DescriptorSetLayout,
                        handle: layout.0,
                    })?;
            *layout = SetLayoutHandle(hash);
        }
        Ok(desc)
    }

    fn canonicalize_stage(&self, stage: &mut ShaderStageDesc) -> Result<(), HashError> {
        let hash = *self
            .shader_module_handles
            .get(&stage.module)
            .ok_or(HashError::UnknownReference {
                kind: ResourceKind::ShaderModule,
                handle: stage.module.0,
            })?;
        stage.module = ShaderModuleHandle(hash);
        Ok(())
    }

    fn canonicalize_base_pipeline(
        &self,
        base: &mut Option<PipelineHandle>,
    ) -> Result<(), HashError> {
        if let Some(pipeline) = base {
            let hash = *self
                .pipeline_handles
                .get(pipeline)
                .ok_or(HashError::UnknownReference {
                    kind: ResourceKind::GraphicsPipeline,
                    handle: pipeline.0,
                })?;
            *pipeline = PipelineHandle(hash);
        }
        Ok(())
    }

    fn canonicalize_compute_pipeline(
        &self,
        mut desc: ComputePipelineDesc,
    ) -> Result<ComputePipelineDesc, HashError> {
        self.canonicalize_stage(&mut desc.stage)?;
        let hash = *self
            .pipeline_layout_handles
            .get(&desc.layout)
            .ok_or(HashError::UnknownReference {
                kind: ResourceKind::PipelineLayout,
                handle: desc.layout.0,
            })?;
        desc.layout = PipelineLayoutHandle(hash);
        self.canonicalize_base_pipeline(&mut desc.base_pipeline)?;
        Ok(desc)
    }

    fn canonicalize_graphics_pipeline(
        &self,
        mut desc: GraphicsPipelineDesc,
    ) -> Result<GraphicsPipelineDesc, HashError> {
        for stage in &mut desc.stages {
            self.canonicalize_stage(stage)?;
        }
        let hash = *self
            .pipeline_layout_handles
            .get(&desc.layout)
            .ok_or(HashError::UnknownReference {
                kind: ResourceKind::PipelineLayout,
                handle: desc.layout.0,
            })?;
        desc.layout = PipelineLayoutHandle(hash);
        if let Some(render_pass) = &mut desc.render_pass {
            let hash =
                *self
                    .render_pass_handles
                    .get(render_pass)
                    .ok_or(HashError::UnknownReference {
                        kind: ResourceKind::RenderPass,
                        handle: render_pass.0,
                    })?;
            *render_pass = RenderPassHandle(hash);
        }
        self.canonicalize_base_pipeline(&mut desc.base_pipeline)?;
        Ok(desc)
    }
}

/// Resolver over the application-handle registry, so callers can hash
/// descriptors that still reference objects by their external handles.
impl HashResolver for Recorder {
    fn sampler_hash(&self, handle: SamplerHandle) -> Option<StateHash> {
        self.sampler_handles.get(&handle).copied()
    }

    fn set_layout_hash(&self, handle: SetLayoutHandle) -> Option<StateHash> {
        self.set_layout_handles.get(&handle).copied()
    }

    fn pipeline_layout_hash(&self, handle: PipelineLayoutHandle) -> Option<StateHash> {
        self.pipeline_layout_handles.get(&handle).copied()
    }

    fn shader_module_hash(&self, handle: ShaderModuleHandle) -> Option<StateHash> {
        self.shader_module_handles.get(&handle).copied()
    }

    fn render_pass_hash(&self, handle: RenderPassHandle) -> Option<StateHash> {
        self.render_pass_handles.get(&handle).copied()
    }

    fn pipeline_hash(&self, handle: PipelineHandle) -> Option<StateHash> {
        self.pipeline_handles.get(&handle).copied()
    }
}

/// Resolver over the intern tables themselves: a canonical handle *is* the
/// referenced object's hash, and resolves iff that object is interned.
struct InternResolver<'a>(&'a Recorder);

impl HashResolver for InternResolver<'_> {
    fn sampler_hash(&self, handle: SamplerHandle) -> Option<StateHash> {
        self.0.samplers.contains_key(&handle.0).then_some(handle.0)
    }

    fn set_layout_hash(&self, handle: SetLayoutHandle) -> Option<StateHash> {
        self.0.set_layouts.contains_key(&handle.0).then_some(handle.0)
    }

    fn pipeline_layout_hash(&self, handle: PipelineLayoutHandle) -> Option<StateHash> {
        self.0
            .pipeline_layouts
            .contains_key(&handle.0)
            .then_some(handle.0)
    }

    fn shader_module_hash(&self, handle: ShaderModuleHandle) -> Option<StateHash> {
        self.0
            .shader_modules
            .contains_key(&handle.0)
            .then_some(handle.0)
    }

    fn render_pass_hash(&self, handle: RenderPassHandle) -> Option<StateHash> {
        self.0
            .render_passes
            .contains_key(&handle.0)
            .then_some(handle.0)
    }

    fn pipeline_hash(&self, handle: PipelineHandle) -> Option<StateHash> {
        (self.0.compute_pipelines.contains_key(&handle.0)
            || self.0.graphics_pipelines.contains_key(&handle.0))
        .then_some(handle.0)
    }
}

fn entries<T: Clone>(map: &BTreeMap<StateHash, T>) -> Vec<Entry<T>> {
    map.iter()
        .map(|(&hash, desc)| Entry {
            hash,
            desc: desc.clone(),
        })
        .collect()
}

fn reject(kind: ResourceKind, err: HashError) -> RecordError {
    // Rejections are part of normal operation (applications probe with
    // unsupported extension chains); the note is for humans reading logs.
    warn!(kind = ?kind, error = %err, "rejected descriptor");
    RecordError::Hash(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sampler(min_lod: f32) -> SamplerDesc {
        SamplerDesc {
            border_color: 4,
            unnormalized_coordinates: true,
            address_mode_u: 3,
            address_mode_v: 2,
            address_mode_w: 4,
            max_anisotropy: 30.0,
            compare_op: 3,
            compare_enable: true,
            mipmap_mode: 1,
            mip_lod_bias: 90.0,
            min_filter: 1,
            mag_filter: 0,
            min_lod,
            max_lod: 20.0,
            ..SamplerDesc::default()
        }
    }

    #[test]
    fn samplers_dedup_by_content_not_by_handle() {
        let mut recorder = Recorder::new();

        let first = recorder
            .record_sampler(SamplerHandle(100), test_sampler(10.0))
            .unwrap();
        let second = recorder
            .record_sampler(SamplerHandle(101), test_sampler(11.0))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(recorder.interned_len(ResourceKind::Sampler), 2);

        // Same content under a new handle: intern table unchanged.
        let again = recorder
            .record_sampler(SamplerHandle(102), test_sampler(10.0))
            .unwrap();
        assert_eq!(again, first);
        assert_eq!(recorder.interned_len(ResourceKind::Sampler), 2);
    }

    #[test]
    fn unsupported_extension_chain_leaves_tables_untouched() {
        let mut recorder = Recorder::new();
        recorder
            .record_sampler(SamplerHandle(100), test_sampler(10.0))
            .unwrap();

        let mut bad = test_sampler(12.0);
        bad.extensions = vec![
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
            ExtensionRecord::SamplerReductionMode { reduction_mode: 1 },
        ];

        let err = recorder.record_sampler(SamplerHandle(102), bad).unwrap_err();
        assert!(matches!(
            err,
            RecordError::Hash(HashError::UnsupportedExtension { .. })
        ));
        assert_eq!(recorder.interned_len(ResourceKind::Sampler), 1);
        assert!(recorder.sampler_hash(SamplerHandle(102)).is_none());
    }

    #[test]
    fn set_layout_depends_on_immutable_sampler_order() {
        let mut recorder = Recorder::new();
        recorder
            .record_sampler(SamplerHandle(100), test_sampler(10.0))
            .unwrap();
        recorder
            .record_sampler(SamplerHandle(101), test_sampler(11.0))
            .unwrap();

        let layout = |samplers: Vec<SamplerHandle>| SetLayoutDesc {
            bindings: vec![SetLayoutBinding {
                binding: 8,
                descriptor_type: 1,
                descriptor_count: 2,
                stage_flags: 0x20,
                immutable_samplers: samplers,
            }],
            ..SetLayoutDesc::default()
        };

        let forward = recorder
            .record_set_layout(
                SetLayoutHandle(1000),
                layout(vec![SamplerHandle(100), SamplerHandle(101)]),
            )
            .unwrap();
        let backward = recorder
            .record_set_layout(
                SetLayoutHandle(1001),
                layout(vec![SamplerHandle(101), SamplerHandle(100)]),
            )
            .unwrap();
        assert_ne!(forward, backward);
    }

    #[test]
    fn dangling_reference_fails_and_changes_nothing() {
        let mut recorder = Recorder::new();
        let desc = SetLayoutDesc {
            bindings: vec![SetLayoutBinding {
                immutable_samplers: vec![SamplerHandle(404)],
                ..SetLayoutBinding::default()
            }],
            ..SetLayoutDesc::default()
        };
        let err = recorder
            .record_set_layout(SetLayoutHandle(1), desc)
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::Hash(HashError::UnknownReference {
                kind: ResourceKind::Sampler,
                handle: 404
            })
        ));
        assert_eq!(recorder.interned_len(ResourceKind::DescriptorSetLayout), 0);
    }

    #[test]
    fn interned_descriptor_rehashes_to_its_key() {
        let mut recorder = Recorder::new();
        recorder
            .record_sampler(SamplerHandle(100), test_sampler(10.0))
            .unwrap();
        let hash = recorder
            .record_set_layout(
                SetLayoutHandle(1000),
                SetLayoutDesc {
                    bindings: vec![SetLayoutBinding {
                        binding: 1,
                        descriptor_count: 1,
                        immutable_samplers: vec![SamplerHandle(100)],
                        ..SetLayoutBinding::default()
                    }],
                    ..SetLayoutDesc::default()
                },
            )
            .unwrap();

        let canonical = recorder.set_layouts.get(&hash).unwrap();
        let rehashed = hash_set_layout(&recorder.interned(), canonical).unwrap();
        assert_eq!(rehashed, hash);
    }

    #[test]
    fn serialization_is_deterministic() {
        let build = || {
            let mut recorder = Recorder::new();
            recorder.record_application_info(ApplicationInfoDesc {
                application_name: Some("testy".to_owned()),
                application_version: 123515,
                engine_name: Some("test".to_owned()),
                engine_version: 1234,
                api_version: (1 << 22) | (1 << 12),
            });
            recorder
                .record_sampler(SamplerHandle(100), test_sampler(10.0))
                .unwrap();
            recorder
                .record_sampler(SamplerHandle(101), test_sampler(11.0))
                .unwrap();
            recorder.serialize().unwrap()
        };
        assert_eq!(build(), build());
    }
}
