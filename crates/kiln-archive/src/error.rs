use thiserror::Error;

use crate::format::ResourceTag;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a kiln archive (bad magic)")]
    InvalidMagic,

    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u32),

    #[error("entry not found: {tag:?} hash {hash:#018x}")]
    NotFound { tag: ResourceTag, hash: u64 },

    #[error("checksum mismatch for {tag:?} hash {hash:#018x}")]
    ChecksumMismatch { tag: ResourceTag, hash: u64 },

    #[error("archive truncated: {0}")]
    Truncated(&'static str),

    #[error("archive is read-only")]
    ReadOnly,

    #[error("mode not supported for this archive flavor")]
    UnsupportedMode,

    #[error("output buffer too small: need {need} bytes, got {got}")]
    BufferTooSmall { need: usize, got: usize },

    #[error("corrupt archive record: {0}")]
    Corrupt(&'static str),

    #[error("allocation of {len} bytes failed")]
    OutOfMemory { len: usize },

    #[error("no free bucket slot under base path {base}")]
    BucketProbeExhausted { base: String },
}
