//! Block volume writer
//!
//! A [`BlockWriter`] stages one block volume in a local temp file. It is
//! either open (accepting blocks) or closed; there is no way back.
//!
//! The manifest is written as the first entry when the writer is created, so
//! even a volume interrupted right after creation describes itself.
//!
//! Callers must pass the true content hash of each block. The writer does
//! not re-hash; hashing belongs to the chunker.

use crate::blocklist;
use crate::config::VolumeConfig;
use crate::container::{CodecRegistry, CompressionHint, ContainerCodec, ContainerWriter};
use crate::error::{Result, VolumeError};
use crate::hash::ContentHash;
use crate::manifest;
use crate::naming::{VolumeKind, VolumeName};
use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

enum WriterState {
    Open(Box<dyn ContainerWriter>),
    Closed,
    /// Finishing the container failed; the staging file is not a volume
    Failed(VolumeError),
}

/// Writer for a single block volume
///
/// Not safe to share between threads without external locking; use one
/// writer per thread instead.
pub struct BlockWriter {
    state: WriterState,

    /// Staging file, deleted on drop unless handed out
    staging: Option<TempPath>,

    local_path: PathBuf,
    name: VolumeName,
    written: HashSet<ContentHash>,
    block_count: u64,
    source_size: u64,
    final_size: u64,
}

impl BlockWriter {
    /// Create a writer using the codec named in `config`
    pub fn create(config: &VolumeConfig, registry: &CodecRegistry) -> Result<Self> {
        let codec = registry.get(&config.compression)?;
        Self::create_with_codec(config, codec.as_ref())
    }

    /// Create a writer with an explicit codec
    ///
    /// Allocates a uniquely named staging file under `config.temp_dir` and
    /// writes the manifest entry.
    pub fn create_with_codec(config: &VolumeConfig, codec: &dyn ContainerCodec) -> Result<Self> {
        let name = VolumeName::new(
            config.prefix.as_str(),
            VolumeKind::new_blocks(),
            codec.name(),
            config.encryption.clone(),
        )?;

        let staging = tempfile::Builder::new()
            .prefix(&format!("{}-", name.unencrypted()))
            .suffix(".tmp")
            .tempfile_in(&config.temp_dir)?;
        let (file, staging) = staging.into_parts();
        let local_path = staging.to_path_buf();

        let mut container = codec.create(file)?;
        let manifest = manifest::serialize(config.block_size);
        container
            .create_entry(manifest::ENTRY_NAME, CompressionHint::Compressible, Utc::now())?
            .write_all(manifest.as_bytes())?;

        debug!("Created block volume {} at {:?}", name, local_path);

        Ok(BlockWriter {
            state: WriterState::Open(container),
            staging: Some(staging),
            local_path,
            name,
            written: HashSet::new(),
            block_count: 0,
            source_size: 0,
            final_size: 0,
        })
    }

    /// Append `data[..size]` as the block identified by `hash`
    pub fn add_block(&mut self, hash: &ContentHash, data: &[u8], size: usize) -> Result<()> {
        self.add_block_with_hint(hash, data, size, CompressionHint::Default)
    }

    /// Append a block with an explicit compression hint
    ///
    /// A hash that was already written to this volume is skipped.
    pub fn add_block_with_hint(
        &mut self,
        hash: &ContentHash,
        data: &[u8],
        size: usize,
        hint: CompressionHint,
    ) -> Result<()> {
        let container = match &mut self.state {
            WriterState::Open(container) => container,
            WriterState::Closed | WriterState::Failed(_) => return Err(VolumeError::VolumeClosed),
        };

        if size > data.len() {
            return Err(VolumeError::InvalidBlockSize {
                size,
                available: data.len(),
            });
        }

        if self.written.contains(hash) {
            debug!("Block {} already in volume {}, skipping", hash, self.name);
            return Ok(());
        }

        let id = hash.to_block_id();
        container
            .create_entry(&id, hint, Utc::now())?
            .write_all(&data[..size])?;

        self.written.insert(*hash);
        self.block_count += 1;
        self.source_size += size as u64;
        Ok(())
    }

    /// Store a blocklist for `hashes` as a block and return its hash
    pub fn add_blocklist(&mut self, hashes: &[ContentHash]) -> Result<ContentHash> {
        let (list_hash, data) = blocklist::encode(hashes);
        self.add_block_with_hint(
            &list_hash,
            &data,
            data.len(),
            CompressionHint::Noncompressible,
        )?;
        Ok(list_hash)
    }

    /// Finish the container and release it
    ///
    /// Calling this again after a successful close is a no-op. When finishing
    /// fails the container is still released, and every later `close` or
    /// [`into_local_file`](Self::into_local_file) returns the same failure.
    pub fn close(&mut self) -> Result<()> {
        let container = match std::mem::replace(&mut self.state, WriterState::Closed) {
            WriterState::Open(container) => container,
            WriterState::Closed => return Ok(()),
            WriterState::Failed(e) => {
                let err = replay(&e);
                self.state = WriterState::Failed(e);
                return Err(err);
            }
        };

        if let Err(e) = container.finish() {
            warn!("Failed to finish block volume {}: {}", self.name, e);
            self.final_size = fs::metadata(&self.local_path).map_or(0, |m| m.len());
            self.state = WriterState::Failed(replay(&e));
            return Err(e);
        }
        self.final_size = fs::metadata(&self.local_path)?.len();

        info!(
            "Closed block volume {}: {} blocks, {} source bytes, {} bytes on disk",
            self.name, self.block_count, self.source_size, self.final_size
        );
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        !matches!(self.state, WriterState::Open(_))
    }

    /// True when closing was attempted and the container could not be finished
    pub fn is_failed(&self) -> bool {
        matches!(self.state, WriterState::Failed(_))
    }

    /// Current volume size, including data the container has not flushed yet
    pub fn filesize(&self) -> u64 {
        match &self.state {
            WriterState::Open(container) => container.size() + container.flush_buffer_size(),
            WriterState::Closed | WriterState::Failed(_) => self.final_size,
        }
    }

    /// Number of blocks written
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Sum of the source sizes of all blocks written
    pub fn source_size(&self) -> u64 {
        self.source_size
    }

    /// Path of the local staging file
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Name the volume will have on the remote side
    pub fn remote_name(&self) -> String {
        self.name.to_string()
    }

    pub fn volume_name(&self) -> &VolumeName {
        &self.name
    }

    /// Close the volume and take ownership of its staging file
    pub fn into_local_file(mut self) -> Result<TempPath> {
        self.close()?;
        self.staging.take().ok_or(VolumeError::VolumeClosed)
    }
}

impl Drop for BlockWriter {
    fn drop(&mut self) {
        if let WriterState::Open(_) = self.state {
            debug!("Abandoning unclosed block volume {}", self.name);
        }
    }
}

/// Copy of a finish failure that keeps its error class
fn replay(err: &VolumeError) -> VolumeError {
    match err {
        VolumeError::Io(e) => VolumeError::Io(io::Error::new(e.kind(), e.to_string())),
        VolumeError::Container(msg) => VolumeError::Container(msg.clone()),
        VolumeError::VolumeClosed => VolumeError::VolumeClosed,
        other => VolumeError::Container(other.to_string()),
    }
}

impl std::fmt::Debug for BlockWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockWriter")
            .field("name", &self.name.to_string())
            .field("local_path", &self.local_path)
            .field("block_count", &self.block_count)
            .field("source_size", &self.source_size)
            .field("closed", &self.is_closed())
            .field("failed", &self.is_failed())
            .finish()
    }
}
