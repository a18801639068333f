//! Pluggable container formats
//!
//! A volume is a container of named entries. The engine never depends on a
//! concrete format: writers and readers go through [`ContainerCodec`], and the
//! codec is looked up by module name in a [`CodecRegistry`] chosen at
//! configuration time.

pub mod zipfile;

use crate::error::{Result, VolumeError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::sync::Arc;

pub use self::zipfile::{ZipCodec, ZipMethod};

/// How an entry's payload is expected to respond to compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionHint {
    /// Let the codec decide
    #[default]
    Default,
    /// Text or other data that is known to compress well
    Compressible,
    /// Already compressed or encrypted data; store as-is
    Noncompressible,
}

/// Write side of a container
pub trait ContainerWriter: Send {
    /// Start a new entry and return a stream for its contents
    ///
    /// The stream stays valid until the next call on this writer.
    fn create_entry(
        &mut self,
        name: &str,
        hint: CompressionHint,
        modified: DateTime<Utc>,
    ) -> Result<&mut dyn Write>;

    /// Bytes physically handed to the underlying file so far
    fn size(&self) -> u64;

    /// Bytes the container will still write when finished
    fn flush_buffer_size(&self) -> u64;

    /// Write trailing structures and flush everything to disk
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Read side of a container
pub trait ContainerReader: Send {
    /// Open an entry by exact name, `None` if it does not exist
    fn open_entry(&mut self, name: &str) -> Result<Option<Box<dyn Read + '_>>>;

    /// Names and uncompressed sizes of all entries, optionally restricted to
    /// names starting with `prefix`
    fn entries_with_size(&mut self, prefix: Option<&str>) -> Result<Vec<(String, u64)>>;
}

/// Factory for one container format
pub trait ContainerCodec: Send + Sync {
    /// Module name used in volume file names (e.g. `zip`)
    fn name(&self) -> &str;

    /// Start a new container in an empty file
    fn create(&self, file: File) -> Result<Box<dyn ContainerWriter>>;

    /// Open an existing container
    fn open(&self, file: File) -> Result<Box<dyn ContainerReader>>;
}

/// Container codecs by module name
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Arc<dyn ContainerCodec>>,
}

impl CodecRegistry {
    /// Registry with no codecs
    pub fn empty() -> Self {
        CodecRegistry {
            codecs: BTreeMap::new(),
        }
    }

    /// Registry with the built-in codecs (`zip`)
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ZipCodec::default()));
        registry
    }

    /// Add or replace a codec under its own name
    pub fn register(&mut self, codec: Arc<dyn ContainerCodec>) {
        self.codecs.insert(codec.name().to_string(), codec);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ContainerCodec>> {
        self.codecs
            .get(name)
            .cloned()
            .ok_or_else(|| VolumeError::UnknownCodec(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(String::as_str)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.codecs.keys()).finish()
    }
}
