//! Per-volume manifest
//!
//! Every volume carries exactly one manifest entry describing the format it
//! was written with:
//!
//! ```json
//! {"Version":1,"Created":"20240115T103000Z","Encoding":"utf8","Blocksize":102400,"PrimaryHash":"sha256"}
//! ```
//!
//! Readers ignore unknown fields, but all five listed fields must be present.
//! Version, encoding and hash algorithm are hard checks. The block size is only
//! surfaced; whether a different block size is acceptable is the caller's
//! decision (see [`crate::config::BlockSizePolicy`]).

use crate::error::ManifestError;
use crate::hash::PRIMARY_HASH;
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest manifest version this reader understands
pub const MANIFEST_VERSION: i64 = 1;

/// Only supported text encoding
pub const ENCODING: &str = "utf8";

/// Name of the manifest entry inside a volume
pub const ENTRY_NAME: &str = "manifest";

/// Manifest document as stored in a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(rename = "Version")]
    pub version: i64,

    /// Creation time in the shared compact UTC format
    #[serde(rename = "Created")]
    pub created: String,

    #[serde(rename = "Encoding")]
    pub encoding: String,

    /// Block size in bytes the volume was written with
    #[serde(rename = "Blocksize")]
    pub blocksize: u64,

    #[serde(rename = "PrimaryHash")]
    pub primary_hash: String,
}

impl ManifestDocument {
    /// Manifest for a volume created now with the given block size
    pub fn new(block_size: u64) -> Self {
        ManifestDocument {
            version: MANIFEST_VERSION,
            created: timestamp::serialize(&timestamp::now()),
            encoding: ENCODING.to_string(),
            blocksize: block_size,
            primary_hash: PRIMARY_HASH.to_string(),
        }
    }

    /// Compact JSON rendering
    pub fn to_json(&self) -> String {
        // A struct of strings and integers always serializes
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse the `Created` field
    pub fn created_at(&self) -> crate::error::Result<DateTime<Utc>> {
        timestamp::parse(&self.created)
    }
}

/// A manifest that passed validation, along with the block size the caller
/// expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedManifest {
    pub document: ManifestDocument,
    pub expected_block_size: u64,
}

impl ValidatedManifest {
    pub fn block_size(&self) -> u64 {
        self.document.blocksize
    }

    pub fn block_size_matches(&self) -> bool {
        self.document.blocksize == self.expected_block_size
    }
}

/// Render a fresh manifest for `block_size`
pub fn serialize(block_size: u64) -> String {
    ManifestDocument::new(block_size).to_json()
}

/// Parse and check a raw manifest
///
/// Fails on a version newer than [`MANIFEST_VERSION`], an encoding other
/// than `utf8`, or a primary hash other than `sha256`. A block size that
/// differs from `expected_block_size` is not an error here.
pub fn validate(
    raw: &str,
    expected_block_size: u64,
) -> Result<ValidatedManifest, ManifestError> {
    let document: ManifestDocument =
        serde_json::from_str(raw).map_err(|e| ManifestError::Malformed(e.to_string()))?;

    if document.version > MANIFEST_VERSION {
        return Err(ManifestError::VersionTooNew {
            found: document.version,
            supported: MANIFEST_VERSION,
        });
    }

    if document.encoding != ENCODING {
        return Err(ManifestError::EncodingMismatch(document.encoding));
    }

    if document.primary_hash != PRIMARY_HASH {
        return Err(ManifestError::HashAlgorithmMismatch(document.primary_hash));
    }

    Ok(ValidatedManifest {
        document,
        expected_block_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(version: i64, encoding: &str, hash: &str) -> String {
        format!(
            r#"{{"Version":{},"Created":"20240115T103000Z","Encoding":"{}","Blocksize":102400,"PrimaryHash":"{}"}}"#,
            version, encoding, hash
        )
    }

    #[test]
    fn test_serialize_contains_all_fields() {
        let json = serialize(4096);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["Version"], 1);
        assert_eq!(value["Encoding"], "utf8");
        assert_eq!(value["Blocksize"], 4096);
        assert_eq!(value["PrimaryHash"], "sha256");
        assert!(value["Created"].is_string());
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_serialized_manifest_validates() {
        let validated = validate(&serialize(4096), 4096).unwrap();
        assert_eq!(validated.block_size(), 4096);
        assert!(validated.block_size_matches());
        assert!(validated.document.created_at().is_ok());
    }

    #[test]
    fn test_version_gate() {
        assert!(validate(&raw(1, "utf8", "sha256"), 102400).is_ok());

        let err = validate(&raw(2, "utf8", "sha256"), 102400).unwrap_err();
        assert_eq!(
            err,
            ManifestError::VersionTooNew {
                found: 2,
                supported: 1
            }
        );
    }

    #[test]
    fn test_encoding_mismatch() {
        let err = validate(&raw(1, "utf16", "sha256"), 102400).unwrap_err();
        assert_eq!(err, ManifestError::EncodingMismatch("utf16".to_string()));
    }

    #[test]
    fn test_hash_algorithm_mismatch() {
        let err = validate(&raw(1, "utf8", "md5"), 102400).unwrap_err();
        assert_eq!(err, ManifestError::HashAlgorithmMismatch("md5".to_string()));
    }

    #[test]
    fn test_block_size_difference_is_not_an_error() {
        let validated = validate(&raw(1, "utf8", "sha256"), 1024).unwrap();
        assert_eq!(validated.block_size(), 102400);
        assert!(!validated.block_size_matches());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let json = r#"{"Version":1,"Created":"20240115T103000Z","Encoding":"utf8","Blocksize":10,"PrimaryHash":"sha256","AppVersion":"2.0"}"#;
        assert!(validate(json, 10).is_ok());
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let json = r#"{"Version":1,"Created":"20240115T103000Z","Encoding":"utf8","PrimaryHash":"sha256"}"#;
        let err = validate(json, 10).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed(_)));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            validate("not json", 10).unwrap_err(),
            ManifestError::Malformed(_)
        ));
    }
}
