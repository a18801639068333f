//! Remote volume names
//!
//! Grammar:
//!
//! ```text
//! <prefix>-<filetype>-<guid-hex|timestamp>.<compression>[.<encryption>]
//! ```
//!
//! Fileset volumes (`files`) are disambiguated by their UTC creation time, all
//! other types by a random GUID rendered as 32 lowercase hex digits. The
//! disambiguator lives inside [`VolumeKind`], so a block volume can never be
//! given a timestamp or a fileset a GUID.

use crate::error::{Result, VolumeError};
use crate::timestamp;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    let types = RemoteVolumeType::ALL
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(
        r"^(?P<prefix>.+?)-(?P<filetype>(?i:{}))-(?:(?P<guid>[0-9a-fA-F]{{32}})|(?P<time>\d{{8}}T\d{{6}}Z))\.(?P<compression>[A-Za-z0-9_]+)(?:\.(?P<encryption>[A-Za-z0-9_]+))?$",
        types
    );
    Regex::new(&pattern).expect("volume name pattern is valid")
});

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+(-[A-Za-z0-9_]+)*$").expect("segment pattern is valid"));

/// Functional category of a remote volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteVolumeType {
    /// Deduplicated data blocks
    Blocks,
    /// One fileset listing per backup
    Files,
    /// Control files indexing block volumes
    Index,
}

impl RemoteVolumeType {
    pub const ALL: [RemoteVolumeType; 3] = [
        RemoteVolumeType::Blocks,
        RemoteVolumeType::Files,
        RemoteVolumeType::Index,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteVolumeType::Blocks => "blocks",
            RemoteVolumeType::Files => "files",
            RemoteVolumeType::Index => "index",
        }
    }

    /// Case-insensitive lookup
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }

    /// Fileset volumes are named by time rather than GUID
    pub fn uses_timestamp(&self) -> bool {
        matches!(self, RemoteVolumeType::Files)
    }
}

impl fmt::Display for RemoteVolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteVolumeType {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
            .ok_or_else(|| VolumeError::Config(format!("unknown volume type '{}'", s)))
    }
}

/// The value that makes a volume name unique within its type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disambiguator {
    Guid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl fmt::Display for Disambiguator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disambiguator::Guid(guid) => write!(f, "{}", guid.simple()),
            Disambiguator::Timestamp(time) => f.write_str(&timestamp::serialize(time)),
        }
    }
}

/// Volume type together with its disambiguator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    Blocks(Uuid),
    Files(DateTime<Utc>),
    Index(Uuid),
}

impl VolumeKind {
    /// Block volume with a fresh random GUID
    pub fn new_blocks() -> Self {
        VolumeKind::Blocks(Uuid::new_v4())
    }

    /// Index volume with a fresh random GUID
    pub fn new_index() -> Self {
        VolumeKind::Index(Uuid::new_v4())
    }

    /// Fileset volume for the backup taken at `time`
    pub fn files_at(time: DateTime<Utc>) -> Self {
        VolumeKind::Files(time)
    }

    /// Pair a type with a disambiguator, rejecting combinations the naming
    /// scheme does not allow.
    pub fn from_parts(kind: RemoteVolumeType, disambiguator: Disambiguator) -> Option<Self> {
        match (kind, disambiguator) {
            (RemoteVolumeType::Blocks, Disambiguator::Guid(g)) => Some(VolumeKind::Blocks(g)),
            (RemoteVolumeType::Index, Disambiguator::Guid(g)) => Some(VolumeKind::Index(g)),
            (RemoteVolumeType::Files, Disambiguator::Timestamp(t)) => Some(VolumeKind::Files(t)),
            _ => None,
        }
    }

    pub fn volume_type(&self) -> RemoteVolumeType {
        match self {
            VolumeKind::Blocks(_) => RemoteVolumeType::Blocks,
            VolumeKind::Files(_) => RemoteVolumeType::Files,
            VolumeKind::Index(_) => RemoteVolumeType::Index,
        }
    }

    pub fn disambiguator(&self) -> Disambiguator {
        match self {
            VolumeKind::Blocks(g) | VolumeKind::Index(g) => Disambiguator::Guid(*g),
            VolumeKind::Files(t) => Disambiguator::Timestamp(*t),
        }
    }

    pub fn guid(&self) -> Option<Uuid> {
        match self.disambiguator() {
            Disambiguator::Guid(g) => Some(g),
            Disambiguator::Timestamp(_) => None,
        }
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        match self.disambiguator() {
            Disambiguator::Timestamp(t) => Some(t),
            Disambiguator::Guid(_) => None,
        }
    }
}

/// Structured form of a remote volume name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeName {
    pub prefix: String,
    pub kind: VolumeKind,
    pub compression: String,
    pub encryption: Option<String>,
}

impl VolumeName {
    /// Build a name, checking that every segment is safe to embed
    ///
    /// # Errors
    ///
    /// Returns `InvalidPrefix` for an empty or unsafe prefix, and `Config` for
    /// module names containing separators.
    pub fn new(
        prefix: impl Into<String>,
        kind: VolumeKind,
        compression: impl Into<String>,
        encryption: Option<String>,
    ) -> Result<Self> {
        let prefix = prefix.into();
        let compression = compression.into();

        if !SEGMENT_RE.is_match(&prefix) {
            return Err(VolumeError::InvalidPrefix(prefix));
        }
        check_module_name(&compression)?;
        if let Some(module) = &encryption {
            check_module_name(module)?;
        }

        Ok(VolumeName {
            prefix,
            kind,
            compression,
            encryption,
        })
    }

    pub fn volume_type(&self) -> RemoteVolumeType {
        self.kind.volume_type()
    }

    /// Same volume without the encryption suffix
    pub fn unencrypted(&self) -> VolumeName {
        VolumeName {
            encryption: None,
            ..self.clone()
        }
    }

    /// Same volume with a different encryption suffix
    pub fn with_encryption(&self, encryption: Option<String>) -> Result<VolumeName> {
        if let Some(module) = &encryption {
            check_module_name(module)?;
        }
        Ok(VolumeName {
            encryption,
            ..self.clone()
        })
    }
}

impl fmt::Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}.{}",
            self.prefix,
            self.kind.volume_type(),
            self.kind.disambiguator(),
            self.compression
        )?;
        if let Some(encryption) = &self.encryption {
            write!(f, ".{}", encryption)?;
        }
        Ok(())
    }
}

fn check_module_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(VolumeError::Config(format!("invalid module name '{}'", name)));
    }
    Ok(())
}

/// A remote listing entry that matched the naming grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVolume {
    /// The name exactly as it appeared in the listing
    pub file_name: String,
    pub name: VolumeName,
}

impl ParsedVolume {
    pub fn volume_type(&self) -> RemoteVolumeType {
        self.name.volume_type()
    }

    pub fn is_encrypted(&self) -> bool {
        self.name.encryption.is_some()
    }
}

/// Render the remote name for a volume
pub fn generate_name(
    kind: VolumeKind,
    prefix: &str,
    compression: &str,
    encryption: Option<&str>,
) -> Result<String> {
    let name = VolumeName::new(prefix, kind, compression, encryption.map(str::to_string))?;
    Ok(name.to_string())
}

/// Parse a remote file name
///
/// Returns `Ok(None)` for anything that does not match the grammar in full;
/// remote listings are expected to contain unrelated files. A name that
/// matches but carries an impossible timestamp is an error.
pub fn parse_name(file_name: &str) -> Result<Option<ParsedVolume>> {
    let caps = match NAME_RE.captures(file_name) {
        Some(caps) => caps,
        None => return Ok(None),
    };

    let volume_type = match RemoteVolumeType::from_name(&caps["filetype"]) {
        Some(t) => t,
        None => return Ok(None),
    };

    let disambiguator = if let Some(time) = caps.name("time") {
        Disambiguator::Timestamp(timestamp::parse(time.as_str())?)
    } else if let Some(guid) = caps.name("guid") {
        match Uuid::parse_str(guid.as_str()) {
            Ok(guid) => Disambiguator::Guid(guid),
            Err(_) => return Ok(None),
        }
    } else {
        return Ok(None);
    };

    let kind = match VolumeKind::from_parts(volume_type, disambiguator) {
        Some(kind) => kind,
        None => {
            debug!(
                "Ignoring {}: {} volumes cannot use that disambiguator",
                file_name, volume_type
            );
            return Ok(None);
        }
    };

    let name = VolumeName {
        prefix: caps["prefix"].to_string(),
        kind,
        compression: caps["compression"].to_string(),
        encryption: caps.name("encryption").map(|m| m.as_str().to_string()),
    };

    Ok(Some(ParsedVolume {
        file_name: file_name.to_string(),
        name,
    }))
}

/// Keep the entries of a remote listing that are volumes
///
/// Non-matching names are dropped silently. Names with a malformed timestamp
/// are dropped with a warning.
pub fn filter_listing<I, S>(names: I) -> Vec<ParsedVolume>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| match parse_name(name.as_ref()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Skipping remote file {}: {}", name.as_ref(), e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_block_name_roundtrip() {
        let guid = Uuid::new_v4();
        let name = generate_name(VolumeKind::Blocks(guid), "prefix", "zip", Some("aes")).unwrap();
        assert_eq!(name, format!("prefix-blocks-{}.zip.aes", guid.simple()));

        let parsed = parse_name(&name).unwrap().unwrap();
        assert_eq!(parsed.name.prefix, "prefix");
        assert_eq!(parsed.volume_type(), RemoteVolumeType::Blocks);
        assert_eq!(parsed.name.kind.guid(), Some(guid));
        assert_eq!(parsed.name.compression, "zip");
        assert_eq!(parsed.name.encryption.as_deref(), Some("aes"));
    }

    #[test]
    fn test_files_name_uses_timestamp_without_encryption() {
        let time = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let name = generate_name(VolumeKind::files_at(time), "p", "zip", None).unwrap();
        assert_eq!(name, "p-files-20240115T103000Z.zip");

        let parsed = parse_name(&name).unwrap().unwrap();
        assert_eq!(parsed.name.kind.time(), Some(time));
        assert_eq!(parsed.name.encryption, None);
        assert!(!parsed.is_encrypted());
    }

    #[test]
    fn test_index_name_roundtrip() {
        let kind = VolumeKind::new_index();
        let name = generate_name(kind, "backup", "zip", None).unwrap();
        let parsed = parse_name(&name).unwrap().unwrap();
        assert_eq!(parsed.name.kind, kind);
        assert_eq!(parsed.name.to_string(), name);
    }

    #[test]
    fn test_unrelated_files_do_not_match() {
        assert_eq!(parse_name("random-unrelated-file.txt").unwrap(), None);
        assert_eq!(parse_name("").unwrap(), None);
        assert_eq!(parse_name("p-blocks-xyz.zip").unwrap(), None);
        assert_eq!(parse_name("p-other-20240115T103000Z.zip").unwrap(), None);
    }

    #[test]
    fn test_trailing_content_is_rejected() {
        let name = generate_name(VolumeKind::new_blocks(), "p", "zip", Some("aes")).unwrap();
        assert!(parse_name(&name).unwrap().is_some());
        assert_eq!(parse_name(&format!("{}.part", name)).unwrap(), None);
        assert_eq!(parse_name(&format!("{} ", name)).unwrap(), None);
        assert_eq!(parse_name(&format!("{}.aes", name)).unwrap(), None);
        assert_eq!(parse_name(&format!("{}\n", name)).unwrap(), None);
        assert_eq!(parse_name(&name.replace(".aes", ".a/s")).unwrap(), None);
    }

    #[test]
    fn test_parsed_module_names_are_generatable() {
        let parsed = parse_name("p-files-20240115T103000Z.zip.aes_2").unwrap().unwrap();
        let regenerated = generate_name(
            parsed.name.kind,
            &parsed.name.prefix,
            &parsed.name.compression,
            parsed.name.encryption.as_deref(),
        )
        .unwrap();
        assert_eq!(regenerated, parsed.file_name);
    }

    #[test]
    fn test_type_is_case_insensitive() {
        let parsed = parse_name("p-FILES-20240115T103000Z.zip").unwrap().unwrap();
        assert_eq!(parsed.volume_type(), RemoteVolumeType::Files);
    }

    #[test]
    fn test_mismatched_disambiguator_is_not_a_volume() {
        assert_eq!(parse_name("p-blocks-20240115T103000Z.zip").unwrap(), None);
        assert_eq!(
            parse_name("p-files-0123456789abcdef0123456789abcdef.zip").unwrap(),
            None
        );
    }

    #[test]
    fn test_bad_timestamp_is_hard_error() {
        let err = parse_name("p-files-20241345T999999Z.zip").unwrap_err();
        assert!(matches!(err, VolumeError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_prefix_may_contain_hyphens() {
        let kind = VolumeKind::new_blocks();
        let name = generate_name(kind, "my-backup", "zip", None).unwrap();
        let parsed = parse_name(&name).unwrap().unwrap();
        assert_eq!(parsed.name.prefix, "my-backup");
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        for prefix in ["", "a.b", "a/b", "-a", "a b"] {
            let err = generate_name(VolumeKind::new_blocks(), prefix, "zip", None).unwrap_err();
            assert!(matches!(err, VolumeError::InvalidPrefix(_)), "{}", prefix);
        }
    }

    #[test]
    fn test_invalid_module_name_rejected() {
        assert!(generate_name(VolumeKind::new_blocks(), "p", "zip.gz", None).is_err());
        assert!(generate_name(VolumeKind::new_blocks(), "p", "zip", Some("")).is_err());
    }

    #[test]
    fn test_filter_listing_skips_noise_and_bad_timestamps() {
        let good = generate_name(VolumeKind::new_blocks(), "p", "zip", None).unwrap();
        let listing = vec![
            good.clone(),
            "random-unrelated-file.txt".to_string(),
            "p-files-20241345T999999Z.zip".to_string(),
            "p-files-20240115T103000Z.zip.aes".to_string(),
        ];

        let volumes = filter_listing(&listing);
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].file_name, good);
        assert_eq!(volumes[1].volume_type(), RemoteVolumeType::Files);
    }

    #[test]
    fn test_unencrypted_drops_suffix() {
        let name = VolumeName::new("p", VolumeKind::new_blocks(), "zip", Some("aes".into())).unwrap();
        assert!(name.to_string().ends_with(".zip.aes"));
        assert!(name.unencrypted().to_string().ends_with(".zip"));
    }
}
