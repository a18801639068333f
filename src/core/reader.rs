//! Block volume reader
//!
//! Opens a finished (local or downloaded) volume and serves blocks by hash.
//! The manifest is validated lazily on the first block access. Once it fails,
//! every later access fails the same way; a volume is never partially trusted.

use crate::blocklist::{self, BlocklistIter};
use crate::config::{BlockSizePolicy, VolumeConfig};
use crate::container::{CodecRegistry, ContainerCodec, ContainerReader};
use crate::error::{ManifestError, Result, VolumeError};
use crate::filename;
use crate::hash::ContentHash;
use crate::manifest::{self, ValidatedManifest};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A block entry found in a volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    /// Entry name as stored
    pub id: String,
    pub hash: ContentHash,
    /// Uncompressed size in bytes
    pub size: u64,
}

/// Outcome of [`BlockReader::verify`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Number of blocks re-hashed
    pub checked: usize,
    /// Ids of blocks whose content does not hash to their name
    pub corrupt: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.corrupt.is_empty()
    }
}

enum ManifestState {
    Unchecked,
    Valid(ValidatedManifest),
    Missing,
    Invalid(ManifestError),
    BlockSizeRejected { volume: u64, configured: u64 },
}

/// Reader for a single block volume
///
/// Not safe to share between threads without external locking.
pub struct BlockReader {
    container: Box<dyn ContainerReader>,
    path: PathBuf,
    block_size: u64,
    policy: BlockSizePolicy,
    manifest: ManifestState,
}

impl BlockReader {
    /// Open a volume with the codec named in `config`
    pub fn open(
        path: impl AsRef<Path>,
        config: &VolumeConfig,
        registry: &CodecRegistry,
    ) -> Result<Self> {
        let codec = registry.get(&config.compression)?;
        Self::open_with_codec(path, config, codec.as_ref())
    }

    /// Open a volume with an explicit codec
    pub fn open_with_codec(
        path: impl AsRef<Path>,
        config: &VolumeConfig,
        codec: &dyn ContainerCodec,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let container = codec.open(File::open(&path)?)?;

        Ok(BlockReader {
            container,
            path,
            block_size: config.block_size,
            policy: config.block_size_policy,
            manifest: ManifestState::Unchecked,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validated manifest of this volume
    pub fn manifest(&mut self) -> Result<&ValidatedManifest> {
        if let ManifestState::Unchecked = self.manifest {
            self.manifest = match self.load_manifest() {
                Ok(state) => state,
                Err(e) => {
                    warn!("Volume {:?} has an unreadable manifest: {}", self.path, e);
                    ManifestState::Invalid(ManifestError::Malformed(format!(
                        "manifest entry unreadable: {}",
                        e
                    )))
                }
            };
        }

        match &self.manifest {
            ManifestState::Valid(manifest) => Ok(manifest),
            ManifestState::Missing | ManifestState::Unchecked => Err(VolumeError::ManifestNotFound),
            ManifestState::Invalid(e) => Err(e.clone().into()),
            ManifestState::BlockSizeRejected { volume, configured } => {
                Err(VolumeError::BlockSizeMismatch {
                    volume: *volume,
                    configured: *configured,
                })
            }
        }
    }

    fn load_manifest(&mut self) -> Result<ManifestState> {
        let mut raw = Vec::new();
        match self.container.open_entry(manifest::ENTRY_NAME)? {
            Some(mut entry) => {
                entry.read_to_end(&mut raw)?;
            }
            None => {
                warn!("Volume {:?} has no manifest", self.path);
                return Ok(ManifestState::Missing);
            }
        }

        let text = match String::from_utf8(raw) {
            Ok(text) => text,
            Err(_) => {
                warn!("Volume {:?} has a manifest that is not utf8", self.path);
                return Ok(ManifestState::Invalid(ManifestError::Malformed(
                    "manifest is not valid utf8".to_string(),
                )));
            }
        };

        let validated = match manifest::validate(&text, self.block_size) {
            Ok(validated) => validated,
            Err(e) => {
                warn!("Volume {:?} failed manifest validation: {}", self.path, e);
                return Ok(ManifestState::Invalid(e));
            }
        };

        if !validated.block_size_matches() {
            match self.policy {
                BlockSizePolicy::Ignore => {}
                BlockSizePolicy::Warn => warn!(
                    "Volume {:?} uses block size {}, configuration uses {}",
                    self.path,
                    validated.block_size(),
                    self.block_size
                ),
                BlockSizePolicy::Reject => {
                    warn!(
                        "Rejecting volume {:?}: block size {} differs from configured {}",
                        self.path,
                        validated.block_size(),
                        self.block_size
                    );
                    return Ok(ManifestState::BlockSizeRejected {
                        volume: validated.block_size(),
                        configured: self.block_size,
                    });
                }
            }
        }

        Ok(ManifestState::Valid(validated))
    }

    /// Read the block `hash` into `buf`
    ///
    /// Fills as much of `buf` as the block provides and returns the number of
    /// bytes read. Short reads from the container are retried internally; a
    /// block shorter than expected is for the caller to judge (see
    /// [`read_block_exact`](Self::read_block_exact)).
    pub fn read_block(&mut self, hash: &ContentHash, buf: &mut [u8]) -> Result<usize> {
        self.manifest()?;

        let id = hash.to_block_id();
        let mut entry = match self.container.open_entry(&id)? {
            Some(entry) => entry,
            None => return Err(VolumeError::BlockNotFound(id)),
        };

        let mut total = 0;
        while total < buf.len() {
            match entry.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    /// Read exactly `expected` bytes of block `hash` into `buf`
    ///
    /// Fails with `TruncatedBlock` when the block holds fewer bytes.
    pub fn read_block_exact(
        &mut self,
        hash: &ContentHash,
        buf: &mut [u8],
        expected: usize,
    ) -> Result<()> {
        if expected > buf.len() {
            return Err(VolumeError::InvalidBlockSize {
                size: expected,
                available: buf.len(),
            });
        }

        let actual = self.read_block(hash, &mut buf[..expected])?;
        if actual < expected {
            return Err(VolumeError::TruncatedBlock {
                id: hash.to_block_id(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Read a whole block into a new buffer
    pub fn read_block_to_vec(&mut self, hash: &ContentHash) -> Result<Vec<u8>> {
        self.manifest()?;

        let id = hash.to_block_id();
        let mut entry = match self.container.open_entry(&id)? {
            Some(entry) => entry,
            None => return Err(VolumeError::BlockNotFound(id)),
        };

        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Lazily decode the blocklist stored under `hash`
    ///
    /// The returned iterator borrows this reader and yields one hash per
    /// step without buffering the list.
    pub fn read_blocklist(
        &mut self,
        hash: &ContentHash,
        expected_byte_size: u64,
    ) -> Result<BlocklistIter<Box<dyn Read + '_>>> {
        self.manifest()?;
        blocklist::record_count(expected_byte_size)?;

        let id = hash.to_block_id();
        match self.container.open_entry(&id)? {
            Some(entry) => BlocklistIter::new(entry, id, expected_byte_size),
            None => Err(VolumeError::BlockNotFound(id)),
        }
    }

    /// List every block in the volume
    ///
    /// The manifest and any entry whose name does not decode to a full-width
    /// hash are skipped. Order follows the container.
    pub fn enumerate_blocks(&mut self) -> Result<Vec<BlockEntry>> {
        self.manifest()?;

        let mut blocks = Vec::new();
        for (name, size) in self.container.entries_with_size(None)? {
            if name == manifest::ENTRY_NAME || !filename::is_well_formed(&name) {
                continue;
            }
            match ContentHash::from_block_id(&name) {
                Ok(hash) => blocks.push(BlockEntry {
                    id: name,
                    hash,
                    size,
                }),
                Err(e) => debug!("Skipping entry {} in {:?}: {}", name, self.path, e),
            }
        }
        Ok(blocks)
    }

    /// Re-hash every block and report those that do not match their name
    ///
    /// A block whose stored bytes fail the container's own integrity check
    /// counts as corrupt. Other errors abort the run.
    pub fn verify(&mut self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        for block in self.enumerate_blocks()? {
            report.checked += 1;
            let intact = match self.read_block_to_vec(&block.hash) {
                Ok(data) => {
                    data.len() as u64 == block.size && ContentHash::compute(&data) == block.hash
                }
                Err(VolumeError::Io(e))
                    if matches!(e.kind(), ErrorKind::InvalidData | ErrorKind::UnexpectedEof) =>
                {
                    debug!("Block {} in {:?} is unreadable: {}", block.id, self.path, e);
                    false
                }
                Err(VolumeError::TruncatedBlock { .. }) => false,
                Err(e) => return Err(e),
            };
            if !intact {
                warn!("Block {} in {:?} is corrupt", block.id, self.path);
                report.corrupt.push(block.id);
            }
        }
        Ok(report)
    }
}

impl std::fmt::Debug for BlockReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockReader")
            .field("path", &self.path)
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}
