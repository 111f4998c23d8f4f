use thiserror::Error;

use crate::types::ResourceKind;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HashError {
    #[error("descriptor references unknown {kind:?} handle {handle:#018x}")]
    UnknownReference { kind: ResourceKind, handle: u64 },

    #[error("unsupported extension record (type tag {type_tag}) on {kind:?}")]
    UnsupportedExtension { kind: ResourceKind, type_tag: u32 },
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Hash(#[from] HashError),

    #[error("failed to encode serialized state: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("malformed state document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported state document version {0}")]
    UnsupportedVersion(u32),
}
