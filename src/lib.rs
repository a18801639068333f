//! # blockvol - Content-Addressed Block Volumes
//!
//! `blockvol` stores deduplicated data blocks in compressed container files
//! ("block volumes") for upload to dumb remote storage:
//!
//! - **Content addressing**: every block is an entry named after the URL-safe
//!   base64 form of its SHA-256 hash
//! - **Self-describing volumes**: a JSON manifest records format version,
//!   block size and hash algorithm
//! - **Blocklists**: large files are described by blocks listing other
//!   blocks, streamed one hash at a time
//! - **Remote naming**: `<prefix>-<type>-<guid|timestamp>.<compression>[.<encryption>]`
//! - **Pluggable codecs and encryption**: zip and AES-256-GCM built in
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blockvol::{BlockReader, BlockWriter, CodecRegistry, ContentHash, Result, VolumeConfig};
//!
//! # fn main() -> Result<()> {
//! let config = VolumeConfig::with_temp_dir("/var/tmp/backup");
//! let registry = CodecRegistry::default();
//!
//! let mut writer = BlockWriter::create(&config, &registry)?;
//! let data = b"Hello, World!";
//! let hash = ContentHash::compute(data);
//! writer.add_block(&hash, data, data.len())?;
//! writer.close()?;
//!
//! let mut reader = BlockReader::open(writer.local_path(), &config, &registry)?;
//! let mut buf = vec![0u8; config.block_size as usize];
//! let n = reader.read_block(&hash, &mut buf)?;
//! assert_eq!(&buf[..n], data);
//! # Ok(())
//! # }
//! ```
//!
//! ## Parsing remote listings
//!
//! ```rust
//! use blockvol::{parse_name, RemoteVolumeType};
//!
//! # fn main() -> blockvol::Result<()> {
//! let parsed = parse_name("backup-files-20240102T030405Z.zip.aes")?.unwrap();
//! assert_eq!(parsed.volume_type(), RemoteVolumeType::Files);
//! assert!(parsed.is_encrypted());
//!
//! assert!(parse_name("notes.txt")?.is_none());
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use self::core::{
    blocklist, config, container, encryption, error, filename, hash, manifest, naming, reader,
    timestamp, transfer, writer,
};

pub use crate::core::{
    blocklist::BlocklistIter,
    config::{BlockSizePolicy, VolumeConfig},
    container::{
        CodecRegistry, CompressionHint, ContainerCodec, ContainerReader, ContainerWriter,
        ZipCodec, ZipMethod,
    },
    encryption::{AesGcmModule, EncryptionModule},
    error::{ManifestError, Result, VolumeError},
    hash::ContentHash,
    manifest::{ManifestDocument, ValidatedManifest},
    naming::{
        filter_listing, generate_name, parse_name, Disambiguator, ParsedVolume, RemoteVolumeType,
        VolumeKind, VolumeName,
    },
    reader::{BlockEntry, BlockReader, VerifyReport},
    transfer::{prepare_download, prepare_upload, DownloadedVolume, UploadFile},
    writer::BlockWriter,
};
