use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};
use crate::format::{ResourceTag, WriteOptions};
use crate::stream::{ArchiveMode, StreamArchive};

const DEFAULT_MAX_BUCKET_PROBES: u32 = 4096;

/// Multi-file archive for many uncoordinated writer processes.
///
/// A logical archive under base path `P` consists of read-only shards (the
/// caller's extra paths plus `P.foz` when present) and one bucket file
/// `P.<N>.foz` owned exclusively by this writer. The bucket is allocated by
/// an exclusive-create probe on the first write that is not already covered
/// by a shard, so a writer that only produces duplicates leaves no file on
/// disk. Duplicates *across* concurrent buckets are not suppressed here;
/// [`crate::merge_archives`] reconciles them.
#[derive(Debug)]
pub struct ConcurrentArchive {
    base: Option<PathBuf>,
    mode: ArchiveMode,
    shards: Vec<StreamArchive>,
    bucket: Option<StreamArchive>,
    bucket_keys: HashSet<(u32, u64)>,
    max_probes: u32,
}

impl ConcurrentArchive {
    /// Open the logical archive. `base` may be omitted for a read-only view
    /// over just the extra paths.
    pub fn open(base: Option<&Path>, mode: ArchiveMode, extra_paths: &[PathBuf]) -> Result<Self> {
        if mode == ArchiveMode::Overwrite {
            return Err(ArchiveError::UnsupportedMode);
        }
        if base.is_none() && mode != ArchiveMode::ReadOnly {
            return Err(ArchiveError::UnsupportedMode);
        }

        let mut shards = Vec::new();
        for path in extra_paths {
            match StreamArchive::open(path, ArchiveMode::ReadOnly) {
                Ok(shard) => shards.push(shard),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable shard");
                }
            }
        }

        if let Some(base) = base {
            let primary = shard_path(base);
            if primary.exists() {
                match StreamArchive::open(&primary, ArchiveMode::ReadOnly) {
                    Ok(shard) => shards.push(shard),
                    Err(err) => {
                        warn!(path = %primary.display(), error = %err, "skipping unreadable shard");
                    }
                }
            }
        }

        debug!(?base, shards = shards.len(), "prepared concurrent archive");

        Ok(Self {
            base: base.map(Path::to_path_buf),
            mode,
            shards,
            bucket: None,
            bucket_keys: HashSet::new(),
            max_probes: max_bucket_probes_from_env(),
        })
    }

    /// As [`Self::open`], with the extra paths encoded in one string,
    /// `;`-separated. Empty components are ignored, which also keeps Windows
    /// drive-letter colons unambiguous.
    pub fn open_with_encoded_extra_paths(
        base: Option<&Path>,
        mode: ArchiveMode,
        encoded: &str,
    ) -> Result<Self> {
        let extra_paths: Vec<PathBuf> = encoded
            .split(';')
            .filter(|component| !component.is_empty())
            .map(PathBuf::from)
            .collect();
        Self::open(base, mode, &extra_paths)
    }

    pub fn has_entry(&self, tag: ResourceTag, hash: u64) -> bool {
        self.shards.iter().any(|shard| shard.has_entry(tag, hash))
            || self
                .bucket
                .as_ref()
                .is_some_and(|bucket| bucket.has_entry(tag, hash))
    }

    /// Read an entry from the first shard that has it: extra paths in list
    /// order, then the shared `<base>.foz`, then this writer's own bucket.
    pub fn read_entry(&mut self, tag: ResourceTag, hash: u64) -> Result<Vec<u8>> {
        for shard in &mut self.shards {
            if shard.has_entry(tag, hash) {
                return shard.read_entry(tag, hash);
            }
        }
        if let Some(bucket) = &mut self.bucket {
            if bucket.has_entry(tag, hash) {
                return bucket.read_entry(tag, hash);
            }
        }
        Err(ArchiveError::NotFound { tag, hash })
    }

    /// Plaintext size of an entry, consulting shards in lookup order.
    pub fn entry_size(&self, tag: ResourceTag, hash: u64) -> Result<usize> {
        for shard in &self.shards {
            if shard.has_entry(tag, hash) {
                return shard.entry_size(tag, hash);
            }
        }
        if let Some(bucket) = &self.bucket {
            if bucket.has_entry(tag, hash) {
                return bucket.entry_size(tag, hash);
            }
        }
        Err(ArchiveError::NotFound { tag, hash })
    }

    /// Write an entry into this writer's bucket unless some shard (or the
    /// bucket itself) already holds it. Returns whether bytes were written.
    pub fn write_entry(
        &mut self,
        tag: ResourceTag,
        hash: u64,
        payload: &[u8],
        options: WriteOptions,
    ) -> Result<bool> {
        if self.mode == ArchiveMode::ReadOnly {
            return Err(ArchiveError::ReadOnly);
        }
        if self.shards.iter().any(|shard| shard.has_entry(tag, hash)) {
            return Ok(false);
        }
        if self.bucket_keys.contains(&(tag.0, hash)) {
            return Ok(false);
        }

        let bucket = self.ensure_bucket()?;
        bucket.write_entry(tag, hash, payload, options)?;
        self.bucket_keys.insert((tag.0, hash));
        Ok(true)
    }

    /// De-duplicated union of hashes under `tag` across every shard and this
    /// writer's bucket, ascending.
    pub fn hashes_for_tag(&self, tag: ResourceTag) -> Vec<u64> {
        let mut union = BTreeSet::new();
        for shard in &self.shards {
            union.extend(shard.hashes_for_tag(tag));
        }
        if let Some(bucket) = &self.bucket {
            union.extend(bucket.hashes_for_tag(tag));
        }
        union.into_iter().collect()
    }

    pub fn hash_count_for_tag(&self, tag: ResourceTag) -> usize {
        self.hashes_for_tag(tag).len()
    }

    /// Path of the bucket file, once one has been allocated.
    pub fn bucket_path(&self) -> Option<&Path> {
        self.bucket.as_ref().map(StreamArchive::path)
    }

    fn ensure_bucket(&mut self) -> Result<&mut StreamArchive> {
        if self.bucket.is_none() {
            let base = self.base.as_deref().ok_or(ArchiveError::ReadOnly)?;
            let bucket = allocate_bucket(base, self.max_probes)?;
            debug!(path = %bucket.path().display(), "allocated bucket file");
            self.bucket = Some(bucket);
        }
        Ok(self.bucket.as_mut().expect("bucket allocated above"))
    }
}

fn shard_path(base: &Path) -> PathBuf {
    let mut os = base.as_os_str().to_os_string();
    os.push(".foz");
    PathBuf::from(os)
}

fn bucket_path(base: &Path, slot: u32) -> PathBuf {
    let mut os = base.as_os_str().to_os_string();
    os.push(format!(".{slot}.foz"));
    PathBuf::from(os)
}

fn allocate_bucket(base: &Path, max_probes: u32) -> Result<StreamArchive> {
    // Exclusive create keeps concurrent writers from sharing a slot; each
    // probe that loses the race moves on to the next number.
    for slot in 1..=max_probes {
        let path = bucket_path(base, slot);
        if let Some(bucket) = StreamArchive::try_create_exclusive(&path)? {
            return Ok(bucket);
        }
    }
    Err(ArchiveError::BucketProbeExhausted {
        base: base.display().to_string(),
    })
}

fn max_bucket_probes_from_env() -> u32 {
    let raw = match std::env::var("KILN_MAX_BUCKET_PROBES") {
        Ok(raw) => raw,
        Err(std::env::VarError::NotPresent) => return DEFAULT_MAX_BUCKET_PROBES,
        Err(std::env::VarError::NotUnicode(_)) => {
            warn!("ignoring KILN_MAX_BUCKET_PROBES because it is not valid unicode");
            return DEFAULT_MAX_BUCKET_PROBES;
        }
    };
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => value,
        _ => {
            warn!(value = %raw, "ignoring KILN_MAX_BUCKET_PROBES because it is not a positive integer");
            DEFAULT_MAX_BUCKET_PROBES
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_extra_paths_ignore_empty_components() {
        let opened = ConcurrentArchive::open_with_encoded_extra_paths(
            None,
            ArchiveMode::ReadOnly,
            ";;missing-a.foz;;missing-b.foz;",
        );
        // Unreadable shards are skipped, so this still prepares; the view is
        // simply empty.
        let db = opened.unwrap();
        assert!(db.hashes_for_tag(ResourceTag::SAMPLER).is_empty());
    }

    #[test]
    fn overwrite_mode_is_rejected() {
        let err = ConcurrentArchive::open(None, ArchiveMode::Overwrite, &[]).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedMode));
    }
}
