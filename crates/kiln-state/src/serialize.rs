//! Serialized-state document model.
//!
//! The on-the-wire form is a JSON document with one array per resource kind,
//! entries sorted by content hash. All 64-bit values travel as decimal
//! strings so the document survives parsers without 64-bit integers; byte
//! blobs are base64.

use serde::{Deserialize, Serialize};

use crate::types::{
    ApplicationInfoDesc, ComputePipelineDesc, GraphicsPipelineDesc, PhysicalDeviceFeaturesDesc,
    PipelineLayoutDesc, RenderPassDesc, SamplerDesc, SetLayoutDesc, ShaderModuleDesc, StateHash,
};

pub const STATE_DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Entry<T> {
    #[serde(with = "dec_u64")]
    pub hash: StateHash,
    #[serde(flatten)]
    pub desc: T,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StateDocument {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_info: Option<ApplicationInfoDesc>,
    #[serde(
        rename = "physicalDeviceFeatures2",
        skip_serializing_if = "Option::is_none"
    )]
    pub physical_device_features: Option<PhysicalDeviceFeaturesDesc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samplers: Vec<Entry<SamplerDesc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub set_layouts: Vec<Entry<SetLayoutDesc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pipeline_layouts: Vec<Entry<PipelineLayoutDesc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shader_modules: Vec<Entry<ShaderModuleDesc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub render_passes: Vec<Entry<RenderPassDesc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compute_pipelines: Vec<Entry<ComputePipelineDesc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub graphics_pipelines: Vec<Entry<GraphicsPipelineDesc>>,
}

/// `u64` as a decimal string.
pub(crate) mod dec_u64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u64>().map_err(serde::de::Error::custom)
    }
}

/// `Vec<u8>` as standard-alphabet base64.
pub(crate) mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        STANDARD.decode(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_hash_is_a_decimal_string() {
        let entry = Entry {
            hash: 42,
            desc: SamplerDesc::default(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["hash"], serde_json::json!("42"));
    }

    #[test]
    fn shader_code_round_trips_through_base64() {
        let entry = Entry {
            hash: 1,
            desc: ShaderModuleDesc {
                flags: 0,
                code: vec![0xde, 0xad, 0xbe, 0xef],
            },
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"3q2+7w==\""));
        let back: Entry<ShaderModuleDesc> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.desc.code, entry.desc.code);
    }

    #[test]
    fn empty_document_omits_every_section() {
        let doc = StateDocument {
            version: STATE_DOCUMENT_VERSION,
            ..StateDocument::default()
        };
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, "{\"version\":1}");
    }
}
