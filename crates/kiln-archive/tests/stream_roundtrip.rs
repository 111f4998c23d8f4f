use kiln_archive::{
    ArchiveError, ArchiveMode, ResourceTag, StreamArchive, WriteOptions, ARCHIVE_MAGIC,
};
use proptest::prelude::*;
use tempfile::tempdir;

#[test]
fn overwrite_append_readback_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.foz");

    // Clean write.
    {
        let mut db = StreamArchive::open(&path, ArchiveMode::Overwrite).unwrap();
        db.write_entry(
            ResourceTag::SAMPLER,
            1,
            &[1, 2, 3],
            WriteOptions::COMPRESSED_CHECKSUMMED,
        )
        .unwrap();
        db.write_entry(
            ResourceTag::DESCRIPTOR_SET_LAYOUT,
            2,
            &[10, 20, 30, 40, 50],
            WriteOptions::COMPRESSED_CHECKSUMMED,
        )
        .unwrap();
    }

    // Append sees the previous entries and adds a third.
    {
        let mut db = StreamArchive::open(&path, ArchiveMode::Append).unwrap();
        assert!(db.has_entry(ResourceTag::SAMPLER, 1));
        assert!(db.has_entry(ResourceTag::DESCRIPTOR_SET_LAYOUT, 2));
        assert!(!db.has_entry(ResourceTag::SHADER_MODULE, 3));

        db.write_entry(
            ResourceTag::SHADER_MODULE,
            3,
            &[1, 2, 3, 1, 2, 3],
            WriteOptions {
                compress: false,
                checksum: true,
            },
        )
        .unwrap();
    }

    // Read back twice to make sure reading does not disturb anything.
    for _ in 0..2 {
        let mut db = StreamArchive::open(&path, ArchiveMode::ReadOnly).unwrap();

        assert!(db.has_entry(ResourceTag::SAMPLER, 1));
        assert!(db.has_entry(ResourceTag::DESCRIPTOR_SET_LAYOUT, 2));
        assert!(db.has_entry(ResourceTag::SHADER_MODULE, 3));
        assert!(!db.has_entry(ResourceTag::GRAPHICS_PIPELINE, 3));

        assert_eq!(db.read_entry(ResourceTag::SAMPLER, 1).unwrap(), vec![1, 2, 3]);
        assert_eq!(
            db.read_entry(ResourceTag::DESCRIPTOR_SET_LAYOUT, 2).unwrap(),
            vec![10, 20, 30, 40, 50]
        );
        assert_eq!(
            db.read_entry(ResourceTag::SHADER_MODULE, 3).unwrap(),
            vec![1, 2, 3, 1, 2, 3]
        );
    }
}

#[test]
fn size_probe_then_read_matches_single_shot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("probe.foz");

    let payload: Vec<u8> = (0..200u8).collect();
    let mut db = StreamArchive::open(&path, ArchiveMode::Overwrite).unwrap();
    db.write_entry(
        ResourceTag::SHADER_MODULE,
        42,
        &payload,
        WriteOptions::COMPRESSED_CHECKSUMMED,
    )
    .unwrap();

    let size = db.entry_size(ResourceTag::SHADER_MODULE, 42).unwrap();
    assert_eq!(size, payload.len());

    let mut buf = vec![0u8; size];
    let written = db
        .read_entry_into(ResourceTag::SHADER_MODULE, 42, &mut buf)
        .unwrap();
    assert_eq!(written, size);
    assert_eq!(buf, db.read_entry(ResourceTag::SHADER_MODULE, 42).unwrap());

    let mut short = vec![0u8; size - 1];
    let err = db
        .read_entry_into(ResourceTag::SHADER_MODULE, 42, &mut short)
        .unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::BufferTooSmall { need, got } if need == size && got == size - 1
    ));
}

#[test]
fn raw_copy_preserves_plaintext() {
    let dir = tempdir().unwrap();
    let src_path = dir.path().join("src.foz");
    let dst_path = dir.path().join("dst.foz");

    let entries: &[(ResourceTag, u64, &[u8], WriteOptions)] = &[
        (
            ResourceTag::SAMPLER,
            1,
            &[1, 2, 3],
            WriteOptions::COMPRESSED_CHECKSUMMED,
        ),
        (
            ResourceTag::DESCRIPTOR_SET_LAYOUT,
            2,
            &[10, 20, 30, 40, 50],
            WriteOptions {
                compress: false,
                checksum: true,
            },
        ),
        (
            ResourceTag::SHADER_MODULE,
            3,
            &[9; 64],
            WriteOptions::PLAIN,
        ),
    ];

    {
        let mut src = StreamArchive::open(&src_path, ArchiveMode::Overwrite).unwrap();
        for &(tag, hash, payload, options) in entries {
            src.write_entry(tag, hash, payload, options).unwrap();
        }
    }

    {
        let mut src = StreamArchive::open(&src_path, ArchiveMode::ReadOnly).unwrap();
        let mut dst = StreamArchive::open(&dst_path, ArchiveMode::Overwrite).unwrap();
        for tag in src.tags() {
            for hash in src.hashes_for_tag(tag) {
                let size = src.raw_entry_size(tag, hash).unwrap();
                let raw = src.read_entry_raw(tag, hash).unwrap();
                assert_eq!(raw.len(), size);
                dst.write_entry_raw(tag, hash, &raw).unwrap();
            }
        }
    }

    let mut dst = StreamArchive::open(&dst_path, ArchiveMode::ReadOnly).unwrap();
    for &(tag, hash, payload, _) in entries {
        assert_eq!(dst.read_entry(tag, hash).unwrap(), payload);
    }
}

#[test]
fn corrupted_payload_fails_checksum() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("corrupt.foz");

    {
        let mut db = StreamArchive::open(&path, ArchiveMode::Overwrite).unwrap();
        db.write_entry(
            ResourceTag::SAMPLER,
            1,
            &[7; 32],
            WriteOptions {
                compress: false,
                checksum: true,
            },
        )
        .unwrap();
    }

    // Flip the last payload byte on disk.
    {
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();
    }

    let mut db = StreamArchive::open(&path, ArchiveMode::ReadOnly).unwrap();
    let err = db.read_entry(ResourceTag::SAMPLER, 1).unwrap_err();
    assert!(matches!(err, ArchiveError::ChecksumMismatch { .. }));
}

#[test]
fn bad_magic_and_version_are_rejected() {
    let dir = tempdir().unwrap();

    let not_an_archive = dir.path().join("not.foz");
    std::fs::write(&not_an_archive, b"definitely not an archive").unwrap();
    let err = StreamArchive::open(&not_an_archive, ArchiveMode::ReadOnly).unwrap_err();
    assert!(matches!(err, ArchiveError::InvalidMagic));

    let future = dir.path().join("future.foz");
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&ARCHIVE_MAGIC);
    bytes.extend_from_slice(&99u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    std::fs::write(&future, bytes).unwrap();
    let err = StreamArchive::open(&future, ArchiveMode::ReadOnly).unwrap_err();
    assert!(matches!(err, ArchiveError::UnsupportedVersion(99)));
}

#[test]
fn read_only_rejects_writes_and_missing_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ro.foz");

    {
        let mut db = StreamArchive::open(&path, ArchiveMode::Overwrite).unwrap();
        db.write_entry(ResourceTag::SAMPLER, 1, &[1], WriteOptions::PLAIN)
            .unwrap();
    }

    let mut db = StreamArchive::open(&path, ArchiveMode::ReadOnly).unwrap();
    let err = db
        .write_entry(ResourceTag::SAMPLER, 2, &[2], WriteOptions::PLAIN)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::ReadOnly));

    let err = db.read_entry(ResourceTag::SAMPLER, 99).unwrap_err();
    assert!(matches!(err, ArchiveError::NotFound { .. }));

    let missing = dir.path().join("missing.foz");
    assert!(StreamArchive::open(&missing, ArchiveMode::ReadOnly).is_err());
}

proptest! {
    // Guard the scanner against panics on corrupted or truncated files. Every
    // outcome is acceptable except a crash.
    #[test]
    fn scan_never_panics(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fuzz.foz");
        std::fs::write(&path, &data).unwrap();
        let _ = StreamArchive::open(&path, ArchiveMode::ReadOnly);
    }

    #[test]
    fn scan_never_panics_with_valid_header(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fuzz.foz");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&ARCHIVE_MAGIC);
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&data);
        std::fs::write(&path, bytes).unwrap();

        if let Ok(mut db) = StreamArchive::open(&path, ArchiveMode::ReadOnly) {
            for tag in db.tags() {
                for hash in db.hashes_for_tag(tag) {
                    let _ = db.read_entry(tag, hash);
                }
            }
        }
    }
}
