//! Content-addressed blob archives for captured GPU pipeline state.
//!
//! A kiln archive is an append-only stream of `(tag, hash) -> payload`
//! records used to persist pipeline-state blobs so they can be replayed
//! later to warm on-disk driver caches. This crate provides:
//!
//! - [`StreamArchive`]: a single-file archive with overwrite/append/read-only
//!   modes and an in-memory `(tag, hash)` index built by scanning the file
//! - [`ConcurrentArchive`]: a multi-file view where every writer process
//!   appends to its own exclusively-created bucket file and reads the union
//!   of all read-only shards
//! - [`merge_archives`]: folds a set of per-writer buckets into one archive,
//!   dropping duplicates and copying raw blobs without re-encoding
//!
//! Payloads are opaque to this crate; hashing and descriptor semantics live
//! in `kiln-state`.

mod concurrent;
mod error;
mod format;
mod io;
mod merge;
mod stream;

pub use concurrent::ConcurrentArchive;
pub use error::{ArchiveError, Result};
pub use format::{
    ResourceTag, WriteOptions, ARCHIVE_HEADER_SIZE, ARCHIVE_MAGIC, ARCHIVE_VERSION,
    ENTRY_FLAG_CRC32, ENTRY_FLAG_LZ4, RAW_PROLOGUE_SIZE, RECORD_HEADER_SIZE,
};
pub use merge::{merge_archives, MergeStats};
pub use stream::{ArchiveMode, StreamArchive};
