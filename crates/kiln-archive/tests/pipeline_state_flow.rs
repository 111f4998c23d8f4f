//! End-to-end flow across the two crates: record descriptors, persist the
//! serialized state through an archive, then replay it from the stored blob.

use kiln_archive::{ArchiveMode, ResourceTag, StreamArchive, WriteOptions};
use kiln_state::{
    replay_state, PhysicalDeviceFeaturesDesc, Recorder, ReplaySink, SamplerDesc, SamplerHandle,
    SetLayoutBinding, SetLayoutDesc, SetLayoutHandle, ShaderModuleDesc, ShaderModuleHandle,
    SinkReject, StateHash,
};
use tempfile::tempdir;

/// Accepts everything under identity handles and counts deliveries.
#[derive(Default)]
struct CountingSink {
    objects: u64,
}

impl ReplaySink for CountingSink {
    fn create_sampler(
        &mut self,
        hash: StateHash,
        _desc: &SamplerDesc,
    ) -> Result<SamplerHandle, SinkReject> {
        self.objects += 1;
        Ok(SamplerHandle(hash))
    }

    fn create_set_layout(
        &mut self,
        hash: StateHash,
        _desc: &SetLayoutDesc,
    ) -> Result<SetLayoutHandle, SinkReject> {
        self.objects += 1;
        Ok(SetLayoutHandle(hash))
    }

    fn create_pipeline_layout(
        &mut self,
        hash: StateHash,
        _desc: &kiln_state::PipelineLayoutDesc,
    ) -> Result<kiln_state::PipelineLayoutHandle, SinkReject> {
        self.objects += 1;
        Ok(kiln_state::PipelineLayoutHandle(hash))
    }

    fn create_shader_module(
        &mut self,
        hash: StateHash,
        _desc: &ShaderModuleDesc,
    ) -> Result<ShaderModuleHandle, SinkReject> {
        self.objects += 1;
        Ok(ShaderModuleHandle(hash))
    }

    fn create_render_pass(
        &mut self,
        hash: StateHash,
        _desc: &kiln_state::RenderPassDesc,
    ) -> Result<kiln_state::RenderPassHandle, SinkReject> {
        self.objects += 1;
        Ok(kiln_state::RenderPassHandle(hash))
    }

    fn create_compute_pipeline(
        &mut self,
        hash: StateHash,
        _desc: &kiln_state::ComputePipelineDesc,
    ) -> Result<kiln_state::PipelineHandle, SinkReject> {
        self.objects += 1;
        Ok(kiln_state::PipelineHandle(hash))
    }

    fn create_graphics_pipeline(
        &mut self,
        hash: StateHash,
        _desc: &kiln_state::GraphicsPipelineDesc,
    ) -> Result<kiln_state::PipelineHandle, SinkReject> {
        self.objects += 1;
        Ok(kiln_state::PipelineHandle(hash))
    }
}

#[test]
fn recorded_state_survives_an_archive_round_trip() {
    let mut recorder = Recorder::new();
    recorder.record_physical_device_features(PhysicalDeviceFeaturesDesc {
        robust_buffer_access: true,
    });
    recorder
        .record_sampler(
            SamplerHandle(100),
            SamplerDesc {
                min_lod: 10.0,
                ..SamplerDesc::default()
            },
        )
        .unwrap();
    recorder
        .record_set_layout(
            SetLayoutHandle(1000),
            SetLayoutDesc {
                bindings: vec![SetLayoutBinding {
                    binding: 0,
                    descriptor_count: 1,
                    immutable_samplers: vec![SamplerHandle(100)],
                    ..SetLayoutBinding::default()
                }],
                ..SetLayoutDesc::default()
            },
        )
        .unwrap();
    recorder
        .record_shader_module(
            ShaderModuleHandle(5000),
            ShaderModuleDesc {
                flags: 0,
                code: vec![0xde, 0xad, 0xbe, 0xef],
            },
        )
        .unwrap();

    let blob = recorder.serialize().unwrap();
    let state_hash = recorder.application_feature_hash();

    let dir = tempdir().unwrap();
    let path = dir.path().join("state.foz");
    {
        let mut db = StreamArchive::open(&path, ArchiveMode::Overwrite).unwrap();
        db.write_entry(
            ResourceTag::APPLICATION_INFO,
            state_hash,
            &blob,
            WriteOptions::COMPRESSED_CHECKSUMMED,
        )
        .unwrap();
    }

    let mut db = StreamArchive::open(&path, ArchiveMode::ReadOnly).unwrap();
    let stored = db.read_entry(ResourceTag::APPLICATION_INFO, state_hash).unwrap();
    assert_eq!(stored, blob);

    let mut sink = CountingSink::default();
    let stats = replay_state(&stored, &mut sink).unwrap();
    assert_eq!(stats.delivered, 3);
    assert_eq!(sink.objects, 3);
    assert_eq!(stats.hash_mismatches, 0);
}
