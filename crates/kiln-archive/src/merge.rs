use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::stream::{ArchiveMode, StreamArchive};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub copied: u64,
    pub duplicates_skipped: u64,
}

/// Fold a list of source archives (typically per-writer buckets) into a
/// single archive at `dest`, usually `<base>.foz`.
///
/// Blobs are copied raw, so checksums and compression are preserved without
/// re-encoding. The first occurrence of a `(tag, hash)` across the sources,
/// in list order, wins. Any source error aborts the merge; the partial
/// destination file is left on disk for inspection.
pub fn merge_archives(dest: &Path, sources: &[PathBuf]) -> Result<MergeStats> {
    let mut target = StreamArchive::open(dest, ArchiveMode::Overwrite)?;
    let mut stats = MergeStats::default();

    for source_path in sources {
        let mut source = StreamArchive::open(source_path, ArchiveMode::ReadOnly)?;
        for tag in source.tags() {
            for hash in source.hashes_for_tag(tag) {
                if target.has_entry(tag, hash) {
                    stats.duplicates_skipped += 1;
                    continue;
                }
                let raw = source.read_entry_raw(tag, hash)?;
                target.write_entry_raw(tag, hash, &raw)?;
                stats.copied += 1;
            }
        }
        debug!(source = %source_path.display(), copied = stats.copied, "merged source archive");
    }

    Ok(stats)
}
