//! Volumes with missing or incompatible manifests are unusable

use blockvol::{
    BlockReader, BlockSizePolicy, CodecRegistry, CompressionHint, ContainerCodec, ContentHash,
    ManifestError, VolumeConfig, VolumeError, ZipCodec,
};
use chrono::Utc;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const BLOCK: &[u8] = b"payload";

/// Zip with a hand-written manifest (or none) and one block
fn volume_with_manifest(dir: &Path, manifest: Option<&str>) -> (PathBuf, ContentHash) {
    let path = dir.join("volume.zip");
    let hash = ContentHash::compute(BLOCK);

    let mut writer = ZipCodec::default()
        .create(File::create(&path).unwrap())
        .unwrap();
    if let Some(manifest) = manifest {
        writer
            .create_entry("manifest", CompressionHint::Compressible, Utc::now())
            .unwrap()
            .write_all(manifest.as_bytes())
            .unwrap();
    }
    writer
        .create_entry(&hash.to_block_id(), CompressionHint::Default, Utc::now())
        .unwrap()
        .write_all(BLOCK)
        .unwrap();
    writer.finish().unwrap();
    (path, hash)
}

fn manifest(version: i64, encoding: &str, blocksize: u64, hash: &str) -> String {
    format!(
        r#"{{"Version":{},"Created":"20240115T103000Z","Encoding":"{}","Blocksize":{},"PrimaryHash":"{}"}}"#,
        version, encoding, blocksize, hash
    )
}

fn config(dir: &Path) -> VolumeConfig {
    VolumeConfig::with_temp_dir(dir).with_block_size(102400)
}

#[test]
fn test_newer_version_is_fatal_for_every_operation() {
    let dir = tempdir().unwrap();
    let (path, hash) =
        volume_with_manifest(dir.path(), Some(&manifest(2, "utf8", 102400, "sha256")));
    let mut reader = BlockReader::open(&path, &config(dir.path()), &CodecRegistry::default()).unwrap();

    let mut buf = [0u8; 64];
    assert!(matches!(
        reader.read_block(&hash, &mut buf),
        Err(VolumeError::Manifest(ManifestError::VersionTooNew {
            found: 2,
            supported: 1
        }))
    ));
    assert!(matches!(
        reader.enumerate_blocks(),
        Err(VolumeError::Manifest(ManifestError::VersionTooNew { .. }))
    ));
    assert!(matches!(
        reader.read_blocklist(&hash, 32),
        Err(VolumeError::Manifest(ManifestError::VersionTooNew { .. }))
    ));
    assert!(reader.verify().is_err());
}

#[test]
fn test_missing_manifest() {
    let dir = tempdir().unwrap();
    let (path, hash) = volume_with_manifest(dir.path(), None);
    let mut reader = BlockReader::open(&path, &config(dir.path()), &CodecRegistry::default()).unwrap();

    let mut buf = [0u8; 64];
    assert!(matches!(
        reader.read_block(&hash, &mut buf),
        Err(VolumeError::ManifestNotFound)
    ));
    assert!(matches!(
        reader.enumerate_blocks(),
        Err(VolumeError::ManifestNotFound)
    ));
}

#[test]
fn test_wrong_encoding_and_hash() {
    let dir = tempdir().unwrap();
    let registry = CodecRegistry::default();

    let (path, _) = volume_with_manifest(dir.path(), Some(&manifest(1, "utf16", 102400, "sha256")));
    let mut reader = BlockReader::open(&path, &config(dir.path()), &registry).unwrap();
    assert!(matches!(
        reader.enumerate_blocks(),
        Err(VolumeError::Manifest(ManifestError::EncodingMismatch(e))) if e == "utf16"
    ));

    let (path, _) = volume_with_manifest(dir.path(), Some(&manifest(1, "utf8", 102400, "md5")));
    let mut reader = BlockReader::open(&path, &config(dir.path()), &registry).unwrap();
    assert!(matches!(
        reader.enumerate_blocks(),
        Err(VolumeError::Manifest(ManifestError::HashAlgorithmMismatch(h))) if h == "md5"
    ));
}

#[test]
fn test_garbage_manifest_is_malformed() {
    let dir = tempdir().unwrap();
    let (path, _) = volume_with_manifest(dir.path(), Some("{not json"));
    let mut reader = BlockReader::open(&path, &config(dir.path()), &CodecRegistry::default()).unwrap();
    assert!(matches!(
        reader.enumerate_blocks(),
        Err(VolumeError::Manifest(ManifestError::Malformed(_)))
    ));
}

#[test]
fn test_older_version_and_extra_fields_are_accepted() {
    let dir = tempdir().unwrap();
    let raw = r#"{"Version":0,"Created":"20240115T103000Z","Encoding":"utf8","Blocksize":102400,"PrimaryHash":"sha256","AppVersion":"2.0"}"#;
    let (path, hash) = volume_with_manifest(dir.path(), Some(raw));
    let mut reader = BlockReader::open(&path, &config(dir.path()), &CodecRegistry::default()).unwrap();

    assert_eq!(reader.read_block_to_vec(&hash).unwrap(), BLOCK);
}

#[test]
fn test_block_size_policies() {
    let dir = tempdir().unwrap();
    let registry = CodecRegistry::default();
    let (path, hash) =
        volume_with_manifest(dir.path(), Some(&manifest(1, "utf8", 8192, "sha256")));

    for policy in [BlockSizePolicy::Ignore, BlockSizePolicy::Warn] {
        let config = config(dir.path()).with_block_size_policy(policy);
        let mut reader = BlockReader::open(&path, &config, &registry).unwrap();
        assert_eq!(reader.manifest().unwrap().block_size(), 8192);
        assert!(!reader.manifest().unwrap().block_size_matches());
        assert_eq!(reader.read_block_to_vec(&hash).unwrap(), BLOCK);
    }

    let config = config(dir.path()).with_block_size_policy(BlockSizePolicy::Reject);
    let mut reader = BlockReader::open(&path, &config, &registry).unwrap();
    assert!(matches!(
        reader.read_block_to_vec(&hash),
        Err(VolumeError::BlockSizeMismatch {
            volume: 8192,
            configured: 102400
        })
    ));
}

#[test]
fn test_not_a_zip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("noise.zip");
    std::fs::write(&path, b"this is not a container").unwrap();

    assert!(BlockReader::open(&path, &config(dir.path()), &CodecRegistry::default()).is_err());
}

#[test]
fn test_corrupt_block_is_reported_by_verify() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("volume.zip");
    let claimed = ContentHash::compute(b"original");

    let mut writer = ZipCodec::default()
        .create(File::create(&path).unwrap())
        .unwrap();
    writer
        .create_entry("manifest", CompressionHint::Compressible, Utc::now())
        .unwrap()
        .write_all(manifest(1, "utf8", 102400, "sha256").as_bytes())
        .unwrap();
    writer
        .create_entry(&claimed.to_block_id(), CompressionHint::Default, Utc::now())
        .unwrap()
        .write_all(b"tampered")
        .unwrap();
    writer.finish().unwrap();

    let mut reader = BlockReader::open(&path, &config(dir.path()), &CodecRegistry::default()).unwrap();
    let report = reader.verify().unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.corrupt, vec![claimed.to_block_id()]);
    assert!(!report.is_ok());
}
