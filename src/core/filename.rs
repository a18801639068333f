//! Filesystem-safe block identifiers
//!
//! A block id is the standard base64 form of a content hash with `+` mapped to
//! `-` and `/` mapped to `_`, so it can be used as a path segment or URL
//! component. Padding is kept.

use crate::error::{Result, VolumeError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

/// Full-string pattern for a block id
const BLOCK_ID_PATTERN: &str = r"^[A-Za-z0-9_-]+={0,2}$";

static BLOCK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(BLOCK_ID_PATTERN).expect("block id pattern is valid"));

/// Encode raw hash bytes as a block id
pub fn encode(hash: &[u8]) -> String {
    STANDARD
        .encode(hash)
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect()
}

/// Decode a block id back into raw hash bytes
///
/// # Errors
///
/// Returns `MalformedBlockId` when `id` is not a well-formed block id or the
/// reversed string is not valid base64.
pub fn decode(id: &str) -> Result<Vec<u8>> {
    if !is_well_formed(id) {
        return Err(VolumeError::MalformedBlockId(id.to_string()));
    }

    let standard: String = id
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    STANDARD
        .decode(standard.as_bytes())
        .map_err(|_| VolumeError::MalformedBlockId(id.to_string()))
}

/// True when the whole of `id` looks like a block id.
///
/// Used to tell block entries apart from the manifest and other control
/// entries inside a volume.
pub fn is_well_formed(id: &str) -> bool {
    BLOCK_ID_RE.is_match(id)
}
