use std::fmt;

pub const ARCHIVE_MAGIC: [u8; 8] = *b"KILNARC\0";
pub const ARCHIVE_VERSION: u32 = 1;

/// magic[8] + version u32 + reserved u32.
pub const ARCHIVE_HEADER_SIZE: u32 = 16;
/// tag u32 + hash u64 + stored_size u32 + uncompressed_size u32 + flags u32 + crc32 u32.
pub const RECORD_HEADER_SIZE: u32 = 28;
/// Leading bytes of a raw blob: stored_size u32 + uncompressed_size u32 + flags u32 + crc32 u32.
pub const RAW_PROLOGUE_SIZE: u32 = 16;

/// Stored payload is an lz4 block; `uncompressed_size` is the plaintext length.
pub const ENTRY_FLAG_LZ4: u32 = 1 << 0;
/// `crc32` covers the stored payload bytes and is verified on read.
pub const ENTRY_FLAG_CRC32: u32 = 1 << 1;

pub(crate) const ENTRY_FLAGS_MASK: u32 = ENTRY_FLAG_LZ4 | ENTRY_FLAG_CRC32;

/// Tag identifying what kind of object a blob describes.
///
/// The archive treats the value as opaque; the constants below are the
/// conventional assignment used by the state recorder.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceTag(pub u32);

impl ResourceTag {
    pub const APPLICATION_INFO: ResourceTag = ResourceTag(0);
    pub const SAMPLER: ResourceTag = ResourceTag(1);
    pub const DESCRIPTOR_SET_LAYOUT: ResourceTag = ResourceTag(2);
    pub const PIPELINE_LAYOUT: ResourceTag = ResourceTag(3);
    pub const SHADER_MODULE: ResourceTag = ResourceTag(4);
    pub const RENDER_PASS: ResourceTag = ResourceTag(5);
    pub const GRAPHICS_PIPELINE: ResourceTag = ResourceTag(6);
    pub const COMPUTE_PIPELINE: ResourceTag = ResourceTag(7);
    pub const PHYSICAL_DEVICE_FEATURES: ResourceTag = ResourceTag(8);

    /// Conventional name for the tag, if it is one of the well-known values.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::APPLICATION_INFO => Some("application-info"),
            Self::SAMPLER => Some("sampler"),
            Self::DESCRIPTOR_SET_LAYOUT => Some("descriptor-set-layout"),
            Self::PIPELINE_LAYOUT => Some("pipeline-layout"),
            Self::SHADER_MODULE => Some("shader-module"),
            Self::RENDER_PASS => Some("render-pass"),
            Self::GRAPHICS_PIPELINE => Some("graphics-pipeline"),
            Self::COMPUTE_PIPELINE => Some("compute-pipeline"),
            Self::PHYSICAL_DEVICE_FEATURES => Some("physical-device-features"),
            _ => None,
        }
    }
}

impl fmt::Debug for ResourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "ResourceTag({name})"),
            None => write!(f, "ResourceTag({})", self.0),
        }
    }
}

/// How a payload should be stored by [`crate::StreamArchive::write_entry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Store the payload as an lz4 block instead of plaintext.
    pub compress: bool,
    /// Compute and store a crc32 of the stored bytes.
    pub checksum: bool,
}

impl WriteOptions {
    pub const PLAIN: WriteOptions = WriteOptions {
        compress: false,
        checksum: false,
    };

    pub const COMPRESSED_CHECKSUMMED: WriteOptions = WriteOptions {
        compress: true,
        checksum: true,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_tags_have_names() {
        assert_eq!(ResourceTag::SAMPLER.name(), Some("sampler"));
        assert_eq!(ResourceTag(999).name(), None);
    }

    #[test]
    fn record_header_size_matches_field_layout() {
        assert_eq!(RECORD_HEADER_SIZE, 4 + 8 + 4 + 4 + 4 + 4);
        assert_eq!(RAW_PROLOGUE_SIZE, RECORD_HEADER_SIZE - 4 - 8);
    }
}
