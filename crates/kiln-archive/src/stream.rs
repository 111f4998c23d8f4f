use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::format::{
    ResourceTag, WriteOptions, ARCHIVE_HEADER_SIZE, ARCHIVE_MAGIC, ARCHIVE_VERSION,
    ENTRY_FLAGS_MASK, ENTRY_FLAG_CRC32, ENTRY_FLAG_LZ4, RAW_PROLOGUE_SIZE, RECORD_HEADER_SIZE,
};
use crate::io::{ReadLeExt, WriteLeExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    /// Truncate any existing file at open and start fresh.
    Overwrite,
    /// Open an existing archive for appending, or create an empty one.
    Append,
    /// Open an existing archive for reading; fails if the file is absent.
    ReadOnly,
}

#[derive(Debug, Clone, Copy)]
struct RecordLocation {
    payload_offset: u64,
    stored_size: u32,
    uncompressed_size: u32,
    flags: u32,
    crc32: u32,
}

/// Single-file stream archive.
///
/// Records are append-only; opening scans the file into an in-memory
/// `(tag, hash) -> offset` index. A malformed or torn trailing record ends
/// the scan, so everything written before a producer crash stays readable,
/// and an `Append` open positions new writes over the torn tail.
#[derive(Debug)]
pub struct StreamArchive {
    path: PathBuf,
    file: File,
    mode: ArchiveMode,
    index: BTreeMap<(u32, u64), RecordLocation>,
    write_pos: u64,
}

impl StreamArchive {
    pub fn open(path: impl AsRef<Path>, mode: ArchiveMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match mode {
            ArchiveMode::Overwrite => {
                let mut file = File::options()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)?;
                write_header(&mut file)?;
                Ok(Self {
                    path,
                    file,
                    mode,
                    index: BTreeMap::new(),
                    write_pos: ARCHIVE_HEADER_SIZE as u64,
                })
            }
            ArchiveMode::Append => {
                let mut file = File::options().read(true).write(true).create(true).open(&path)?;
                let file_len = file.seek(SeekFrom::End(0))?;
                if file_len == 0 {
                    write_header(&mut file)?;
                    Ok(Self {
                        path,
                        file,
                        mode,
                        index: BTreeMap::new(),
                        write_pos: ARCHIVE_HEADER_SIZE as u64,
                    })
                } else {
                    let (index, write_pos) = scan(&mut file, file_len)?;
                    debug!(path = %path.display(), entries = index.len(), "opened archive for append");
                    Ok(Self {
                        path,
                        file,
                        mode,
                        index,
                        write_pos,
                    })
                }
            }
            ArchiveMode::ReadOnly => {
                let mut file = File::open(&path)?;
                let file_len = file.seek(SeekFrom::End(0))?;
                let (index, write_pos) = scan(&mut file, file_len)?;
                Ok(Self {
                    path,
                    file,
                    mode,
                    index,
                    write_pos,
                })
            }
        }
    }

    /// Create a fresh archive only if `path` does not exist yet.
    ///
    /// Returns `Ok(None)` when the file already exists, so callers can probe
    /// for a free slot without racing other processes.
    pub(crate) fn try_create_exclusive(path: &Path) -> Result<Option<Self>> {
        let mut file = match File::options().read(true).write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        write_header(&mut file)?;
        Ok(Some(Self {
            path: path.to_path_buf(),
            file,
            mode: ArchiveMode::Append,
            index: BTreeMap::new(),
            write_pos: ARCHIVE_HEADER_SIZE as u64,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> ArchiveMode {
        self.mode
    }

    pub fn has_entry(&self, tag: ResourceTag, hash: u64) -> bool {
        self.index.contains_key(&(tag.0, hash))
    }

    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Distinct tags present in the archive, ascending.
    pub fn tags(&self) -> Vec<ResourceTag> {
        let mut tags: Vec<ResourceTag> = Vec::new();
        for &(tag, _) in self.index.keys() {
            if tags.last().map(|t| t.0) != Some(tag) {
                tags.push(ResourceTag(tag));
            }
        }
        tags
    }

    /// Hashes recorded under `tag`, ascending.
    pub fn hashes_for_tag(&self, tag: ResourceTag) -> Vec<u64> {
        self.index
            .range((tag.0, 0)..=(tag.0, u64::MAX))
            .map(|(&(_, hash), _)| hash)
            .collect()
    }

    pub fn hash_count_for_tag(&self, tag: ResourceTag) -> usize {
        self.index.range((tag.0, 0)..=(tag.0, u64::MAX)).count()
    }

    /// Store a payload under `(tag, hash)`.
    ///
    /// Writing a key that is already present is a no-op: `(tag, hash)` is
    /// unique within an archive and the first record wins.
    pub fn write_entry(
        &mut self,
        tag: ResourceTag,
        hash: u64,
        payload: &[u8],
        options: WriteOptions,
    ) -> Result<()> {
        if self.mode == ArchiveMode::ReadOnly {
            return Err(ArchiveError::ReadOnly);
        }
        if self.has_entry(tag, hash) {
            return Ok(());
        }

        let uncompressed_size: u32 = payload
            .len()
            .try_into()
            .map_err(|_| ArchiveError::Corrupt("payload exceeds u32 size"))?;

        let mut flags = 0u32;
        let stored: Cow<'_, [u8]> = if options.compress {
            flags |= ENTRY_FLAG_LZ4;
            Cow::Owned(lz4_flex::block::compress(payload))
        } else {
            Cow::Borrowed(payload)
        };
        let stored_size: u32 = stored
            .len()
            .try_into()
            .map_err(|_| ArchiveError::Corrupt("compressed payload exceeds u32 size"))?;

        let crc32 = if options.checksum {
            flags |= ENTRY_FLAG_CRC32;
            crc32fast::hash(&stored)
        } else {
            0
        };

        self.append_record(tag, hash, stored_size, uncompressed_size, flags, crc32, &stored)
    }

    /// Splice in a raw blob previously produced by [`Self::read_entry_raw`].
    ///
    /// The blob's prologue supplies the stored flags and checksum verbatim;
    /// nothing is re-compressed or re-checksummed.
    pub fn write_entry_raw(&mut self, tag: ResourceTag, hash: u64, raw: &[u8]) -> Result<()> {
        if self.mode == ArchiveMode::ReadOnly {
            return Err(ArchiveError::ReadOnly);
        }
        if self.has_entry(tag, hash) {
            return Ok(());
        }
        if raw.len() < RAW_PROLOGUE_SIZE as usize {
            return Err(ArchiveError::Corrupt("raw blob shorter than its prologue"));
        }

        let mut prologue = &raw[..RAW_PROLOGUE_SIZE as usize];
        let stored_size = prologue.read_u32_le()?;
        let uncompressed_size = prologue.read_u32_le()?;
        let flags = prologue.read_u32_le()?;
        let crc32 = prologue.read_u32_le()?;

        let stored = &raw[RAW_PROLOGUE_SIZE as usize..];
        if stored.len() != stored_size as usize {
            return Err(ArchiveError::Corrupt("raw blob length disagrees with its prologue"));
        }
        if flags & !ENTRY_FLAGS_MASK != 0 {
            return Err(ArchiveError::Corrupt("raw blob carries unknown entry flags"));
        }

        self.append_record(tag, hash, stored_size, uncompressed_size, flags, crc32, stored)
    }

    /// Read a payload back as plaintext, verifying the checksum and
    /// decompressing as the record's flags dictate.
    pub fn read_entry(&mut self, tag: ResourceTag, hash: u64) -> Result<Vec<u8>> {
        let loc = self.location(tag, hash)?;
        let stored = self.read_stored(&loc)?;

        if loc.flags & ENTRY_FLAG_CRC32 != 0 && crc32fast::hash(&stored) != loc.crc32 {
            return Err(ArchiveError::ChecksumMismatch { tag, hash });
        }

        if loc.flags & ENTRY_FLAG_LZ4 != 0 {
            let len = loc.uncompressed_size as usize;
            let mut out = Vec::new();
            out.try_reserve_exact(len)
                .map_err(|_| ArchiveError::OutOfMemory { len })?;
            out.resize(len, 0);
            let written = lz4_flex::block::decompress_into(&stored, &mut out)
                .map_err(|_| ArchiveError::Corrupt("lz4 decompression failed"))?;
            if written != len {
                return Err(ArchiveError::Corrupt("lz4 plaintext length mismatch"));
            }
            Ok(out)
        } else {
            Ok(stored)
        }
    }

    /// Read a record's on-disk form: the 16-byte prologue followed by the
    /// stored (possibly compressed) payload bytes, untouched.
    pub fn read_entry_raw(&mut self, tag: ResourceTag, hash: u64) -> Result<Vec<u8>> {
        let loc = self.location(tag, hash)?;
        let stored = self.read_stored(&loc)?;

        let mut raw = Vec::with_capacity(RAW_PROLOGUE_SIZE as usize + stored.len());
        raw.write_u32_le(loc.stored_size)?;
        raw.write_u32_le(loc.uncompressed_size)?;
        raw.write_u32_le(loc.flags)?;
        raw.write_u32_le(loc.crc32)?;
        raw.extend_from_slice(&stored);
        Ok(raw)
    }

    /// Plaintext size of an entry, for the size-probe-then-read calling
    /// pattern. The follow-up [`Self::read_entry_into`] with a buffer of at
    /// least this size returns the same bytes as [`Self::read_entry`].
    pub fn entry_size(&self, tag: ResourceTag, hash: u64) -> Result<usize> {
        let loc = self.location(tag, hash)?;
        if loc.flags & ENTRY_FLAG_LZ4 != 0 {
            Ok(loc.uncompressed_size as usize)
        } else {
            Ok(loc.stored_size as usize)
        }
    }

    /// On-disk size of an entry's raw blob (prologue included).
    pub fn raw_entry_size(&self, tag: ResourceTag, hash: u64) -> Result<usize> {
        let loc = self.location(tag, hash)?;
        Ok(RAW_PROLOGUE_SIZE as usize + loc.stored_size as usize)
    }

    /// Read an entry into a caller-provided buffer; returns the payload
    /// length. Fails with [`ArchiveError::BufferTooSmall`] without touching
    /// the archive state if the buffer cannot hold the payload.
    pub fn read_entry_into(&mut self, tag: ResourceTag, hash: u64, buf: &mut [u8]) -> Result<usize> {
        let need = self.entry_size(tag, hash)?;
        if buf.len() < need {
            return Err(ArchiveError::BufferTooSmall {
                need,
                got: buf.len(),
            });
        }
        let bytes = self.read_entry(tag, hash)?;
        buf[..need].copy_from_slice(&bytes);
        Ok(need)
    }

    fn location(&self, tag: ResourceTag, hash: u64) -> Result<RecordLocation> {
        self.index
            .get(&(tag.0, hash))
            .copied()
            .ok_or(ArchiveError::NotFound { tag, hash })
    }

    fn read_stored(&mut self, loc: &RecordLocation) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(loc.payload_offset))?;
        self.file.read_exact_vec(loc.stored_size as usize)
    }

    #[allow(clippy::too_many_arguments)]
    fn append_record(
        &mut self,
        tag: ResourceTag,
        hash: u64,
        stored_size: u32,
        uncompressed_size: u32,
        flags: u32,
        crc32: u32,
        stored: &[u8],
    ) -> Result<()> {
        let mut header = Vec::with_capacity(RECORD_HEADER_SIZE as usize);
        header.write_u32_le(tag.0)?;
        header.write_u64_le(hash)?;
        header.write_u32_le(stored_size)?;
        header.write_u32_le(uncompressed_size)?;
        header.write_u32_le(flags)?;
        header.write_u32_le(crc32)?;

        self.file.seek(SeekFrom::Start(self.write_pos))?;
        self.file.write_all(&header)?;
        self.file.write_all(stored)?;
        // A successful write must survive the process; crash recovery only
        // has to cope with the final, torn record.
        self.file.sync_data()?;

        let payload_offset = self.write_pos + RECORD_HEADER_SIZE as u64;
        self.index.insert(
            (tag.0, hash),
            RecordLocation {
                payload_offset,
                stored_size,
                uncompressed_size,
                flags,
                crc32,
            },
        );
        self.write_pos = payload_offset + stored_size as u64;
        Ok(())
    }
}

fn write_header(file: &mut File) -> Result<()> {
    file.write_all(&ARCHIVE_MAGIC)?;
    file.write_u32_le(ARCHIVE_VERSION)?;
    file.write_u32_le(0)?; // reserved
    file.sync_data()?;
    Ok(())
}

type ScanResult = (BTreeMap<(u32, u64), RecordLocation>, u64);

fn scan(file: &mut File, file_len: u64) -> Result<ScanResult> {
    if file_len < ARCHIVE_HEADER_SIZE as u64 {
        return Err(ArchiveError::Truncated("file shorter than archive header"));
    }
    file.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if magic != ARCHIVE_MAGIC {
        return Err(ArchiveError::InvalidMagic);
    }
    let version = file.read_u32_le()?;
    if version != ARCHIVE_VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }
    let _reserved = file.read_u32_le()?;

    let mut index = BTreeMap::new();
    let mut pos = ARCHIVE_HEADER_SIZE as u64;
    while pos + RECORD_HEADER_SIZE as u64 <= file_len {
        file.seek(SeekFrom::Start(pos))?;
        let tag = file.read_u32_le()?;
        let hash = file.read_u64_le()?;
        let stored_size = file.read_u32_le()?;
        let uncompressed_size = file.read_u32_le()?;
        let flags = file.read_u32_le()?;
        let crc32 = file.read_u32_le()?;

        let payload_offset = pos + RECORD_HEADER_SIZE as u64;
        let Some(payload_end) = payload_offset.checked_add(stored_size as u64) else {
            break;
        };
        // Anything that cannot be a complete record is a torn tail from a
        // crashed writer; stop scanning and keep what came before it.
        if payload_end > file_len || flags & !ENTRY_FLAGS_MASK != 0 {
            break;
        }

        index.entry((tag, hash)).or_insert(RecordLocation {
            payload_offset,
            stored_size,
            uncompressed_size,
            flags,
            crc32,
        });
        pos = payload_end;
    }

    Ok((index, pos))
}
