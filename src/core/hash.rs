//! Content hashes that identify blocks
//!
//! A block is addressed by the SHA-256 of its plaintext, computed before any
//! compression or encryption is applied.

use crate::error::{Result, VolumeError};
use crate::filename;
use sha2::{Digest, Sha256};
use std::fmt;

/// Width of the primary hash in bytes
pub const HASH_SIZE: usize = 32;

/// Name of the primary hash algorithm recorded in every manifest
pub const PRIMARY_HASH: &str = "sha256";

/// SHA-256 identity of a block
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; HASH_SIZE]);

impl ContentHash {
    /// Hash `data` with the primary hash algorithm
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(&digest);
        ContentHash(out)
    }

    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        ContentHash(bytes)
    }

    /// Build a hash from a slice, rejecting anything that is not exactly
    /// [`HASH_SIZE`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; HASH_SIZE] =
            bytes
                .try_into()
                .map_err(|_| VolumeError::InvalidHashLength {
                    expected: HASH_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(ContentHash(array))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Filesystem-safe block id for this hash
    pub fn to_block_id(&self) -> String {
        filename::encode(&self.0)
    }

    /// Decode a block id back into a hash
    pub fn from_block_id(id: &str) -> Result<Self> {
        let bytes = filename::decode(id)?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
