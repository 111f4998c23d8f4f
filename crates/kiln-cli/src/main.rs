use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kiln_archive::{merge_archives, ArchiveMode, ResourceTag, StreamArchive};

#[derive(Debug, Parser)]
#[command(name = "kiln", about = "Inspect and merge kiln pipeline-state archives")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Merge per-writer bucket archives into a single archive.
    Merge {
        /// Destination archive, typically `<base>.foz`.
        dest: PathBuf,
        /// Bucket archives, in priority order (first occurrence of a key wins).
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
    /// List an archive's entries grouped by resource tag.
    Ls {
        archive: PathBuf,
    },
    /// Write one entry's payload to stdout.
    Cat {
        archive: PathBuf,
        /// Numeric resource tag (see `kiln ls`).
        tag: u32,
        /// Entry hash, decimal or 0x-prefixed hex.
        hash: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().cmd {
        Cmd::Merge { dest, sources } => {
            let stats = merge_archives(&dest, &sources)
                .with_context(|| format!("merging into {}", dest.display()))?;
            println!(
                "{}: {} entries copied, {} duplicates skipped",
                dest.display(),
                stats.copied,
                stats.duplicates_skipped
            );
        }
        Cmd::Ls { archive } => {
            let db = StreamArchive::open(&archive, ArchiveMode::ReadOnly)
                .with_context(|| format!("opening {}", archive.display()))?;
            for tag in db.tags() {
                let label = tag.name().unwrap_or("unknown");
                println!("{} ({label})", tag.0);
                for hash in db.hashes_for_tag(tag) {
                    println!("  {hash} ({hash:#018x})");
                }
            }
        }
        Cmd::Cat { archive, tag, hash } => {
            let hash = parse_hash(&hash)?;
            let mut db = StreamArchive::open(&archive, ArchiveMode::ReadOnly)
                .with_context(|| format!("opening {}", archive.display()))?;
            let payload = db
                .read_entry(ResourceTag(tag), hash)
                .context("reading entry")?;
            eprintln!("{} bytes", payload.len());
            std::io::stdout().write_all(&payload)?;
        }
    }
    Ok(())
}

fn parse_hash(raw: &str) -> Result<u64> {
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    match parsed {
        Ok(hash) => Ok(hash),
        Err(_) => bail!("invalid hash {raw:?} (expected decimal or 0x-prefixed hex)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hash_accepts_both_radixes() {
        assert_eq!(parse_hash("42").unwrap(), 42);
        assert_eq!(parse_hash("0x2a").unwrap(), 42);
        assert!(parse_hash("zzz").is_err());
    }
}
