//! Zip container codec
//!
//! Entries are stored as regular zip members, so a volume can be inspected
//! with any zip tool.

use super::{CompressionHint, ContainerCodec, ContainerReader, ContainerWriter};
use crate::error::Result;
use ::zip::result::ZipError;
use ::zip::write::SimpleFileOptions;
use ::zip::{CompressionMethod, ZipArchive, ZipWriter};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Central directory record size without the file name
const CENTRAL_HEADER_SIZE: u64 = 46;

/// End of central directory record size
const END_OF_DIRECTORY_SIZE: u64 = 22;

/// Compression applied to entries without a `Noncompressible` hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZipMethod {
    Stored,
    #[default]
    Deflated,
}

impl ZipMethod {
    fn to_zip(self) -> CompressionMethod {
        match self {
            ZipMethod::Stored => CompressionMethod::Stored,
            ZipMethod::Deflated => CompressionMethod::Deflated,
        }
    }
}

/// Zip codec registered as `zip`
#[derive(Debug, Clone, Default)]
pub struct ZipCodec {
    method: ZipMethod,
}

impl ZipCodec {
    pub const NAME: &'static str = "zip";

    pub fn new(method: ZipMethod) -> Self {
        ZipCodec { method }
    }
}

impl ContainerCodec for ZipCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn create(&self, file: File) -> Result<Box<dyn ContainerWriter>> {
        let written = Arc::new(AtomicU64::new(0));
        let counting = CountingWriter::new(BufWriter::new(file), Arc::clone(&written));
        Ok(Box::new(ZipContainerWriter {
            zip: ZipWriter::new(counting),
            method: self.method,
            written,
            pending_directory: END_OF_DIRECTORY_SIZE,
        }))
    }

    fn open(&self, file: File) -> Result<Box<dyn ContainerReader>> {
        let archive = ZipArchive::new(BufReader::new(file))?;
        Ok(Box::new(ZipContainerReader { archive }))
    }
}

/// Tracks the furthest byte handed to the inner writer
struct CountingWriter<W> {
    inner: W,
    position: u64,
    high_water: Arc<AtomicU64>,
}

impl<W> CountingWriter<W> {
    fn new(inner: W, high_water: Arc<AtomicU64>) -> Self {
        CountingWriter {
            inner,
            position: 0,
            high_water,
        }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        self.high_water.fetch_max(self.position, Ordering::Relaxed);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Seek> Seek for CountingWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }
}

struct ZipContainerWriter {
    zip: ZipWriter<CountingWriter<BufWriter<File>>>,
    method: ZipMethod,
    written: Arc<AtomicU64>,
    pending_directory: u64,
}

impl ContainerWriter for ZipContainerWriter {
    fn create_entry(
        &mut self,
        name: &str,
        hint: CompressionHint,
        modified: DateTime<Utc>,
    ) -> Result<&mut dyn Write> {
        let method = match hint {
            CompressionHint::Noncompressible => CompressionMethod::Stored,
            CompressionHint::Compressible => CompressionMethod::Deflated,
            CompressionHint::Default => self.method.to_zip(),
        };

        let mut options = SimpleFileOptions::default().compression_method(method);
        if let Some(stamp) = zip_datetime(&modified) {
            options = options.last_modified_time(stamp);
        }

        self.zip.start_file(name, options)?;
        self.pending_directory += CENTRAL_HEADER_SIZE + name.len() as u64;
        Ok(&mut self.zip)
    }

    fn size(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    fn flush_buffer_size(&self) -> u64 {
        self.pending_directory
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let mut counting = self.zip.finish()?;
        counting.flush()?;
        counting.inner.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        Ok(())
    }
}

struct ZipContainerReader {
    archive: ZipArchive<BufReader<File>>,
}

impl ContainerReader for ZipContainerReader {
    fn open_entry(&mut self, name: &str) -> Result<Option<Box<dyn Read + '_>>> {
        match self.archive.by_name(name) {
            Ok(entry) => Ok(Some(Box::new(entry))),
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn entries_with_size(&mut self, prefix: Option<&str>) -> Result<Vec<(String, u64)>> {
        let mut entries = Vec::with_capacity(self.archive.len());
        for index in 0..self.archive.len() {
            let entry = self.archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            if let Some(prefix) = prefix {
                if !entry.name().starts_with(prefix) {
                    continue;
                }
            }
            entries.push((entry.name().to_string(), entry.size()));
        }
        Ok(entries)
    }
}

/// Zip timestamps only cover 1980..=2107
fn zip_datetime(time: &DateTime<Utc>) -> Option<::zip::DateTime> {
    let year = u16::try_from(time.year()).ok()?;
    ::zip::DateTime::from_date_and_time(
        year,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .ok()
}
