//! Blocklists: indirection blocks for oversized chunks
//!
//! A blocklist is the concatenation of fixed-width content hashes. It is
//! stored as an ordinary block under the hash of its own bytes, and read back
//! one record at a time.

use crate::error::{Result, VolumeError};
use crate::hash::{ContentHash, HASH_SIZE};
use std::io::{ErrorKind, Read};

/// Serialize `hashes` into blocklist bytes and return them with their own hash
pub fn encode(hashes: &[ContentHash]) -> (ContentHash, Vec<u8>) {
    let mut data = Vec::with_capacity(hashes.len() * HASH_SIZE);
    for hash in hashes {
        data.extend_from_slice(hash.as_bytes());
    }
    (ContentHash::compute(&data), data)
}

/// Number of records in a blocklist of `byte_size` bytes
pub fn record_count(byte_size: u64) -> Result<u64> {
    if byte_size % HASH_SIZE as u64 != 0 {
        return Err(VolumeError::InvalidBlocklistSize {
            size: byte_size,
            width: HASH_SIZE,
        });
    }
    Ok(byte_size / HASH_SIZE as u64)
}

/// Forward-only iterator over the hashes in a blocklist entry
///
/// Only one record is held in memory at a time. The iterator ends after the
/// number of records implied by the expected byte size, or after the first
/// error.
pub struct BlocklistIter<R: Read> {
    reader: R,
    id: String,
    remaining: u64,
    total: u64,
    failed: bool,
}

impl<R: Read> BlocklistIter<R> {
    pub fn new(reader: R, id: impl Into<String>, expected_byte_size: u64) -> Result<Self> {
        let total = record_count(expected_byte_size)?;
        Ok(BlocklistIter {
            reader,
            id: id.into(),
            remaining: total,
            total,
            failed: false,
        })
    }

    /// Records not yet yielded
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: Read> Iterator for BlocklistIter<R> {
    type Item = Result<ContentHash>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }

        let mut record = [0u8; HASH_SIZE];
        match self.reader.read_exact(&mut record) {
            Ok(()) => {
                self.remaining -= 1;
                Some(Ok(ContentHash::from_bytes(record)))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.failed = true;
                let read_records = self.total - self.remaining;
                Some(Err(VolumeError::TruncatedBlock {
                    id: self.id.clone(),
                    expected: (self.total as usize) * HASH_SIZE,
                    actual: (read_records as usize) * HASH_SIZE,
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(VolumeError::Io(e)))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let remaining = self.remaining as usize;
        (0, Some(remaining))
    }
}
