use thiserror::Error;

/// Manifest validation failures.
///
/// Every variant is fatal for the volume that carries the manifest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Manifest version {found} is newer than supported version {supported}")]
    VersionTooNew { found: i64, supported: i64 },

    #[error("Manifest encoding '{0}' is not supported (expected utf8)")]
    EncodingMismatch(String),

    #[error("Manifest primary hash '{0}' is not supported (expected sha256)")]
    HashAlgorithmMismatch(String),

    #[error("Malformed manifest: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("Malformed block id: {0}")]
    MalformedBlockId(String),

    #[error("Invalid hash length: expected {expected} bytes, got {actual}")]
    InvalidHashLength { expected: usize, actual: usize },

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Manifest not found: volume does not contain a manifest entry")]
    ManifestNotFound,

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Volume is closed")]
    VolumeClosed,

    #[error("Truncated block {id}: expected {expected} bytes, read {actual}")]
    TruncatedBlock {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid block size: {size} bytes requested but only {available} available")]
    InvalidBlockSize { size: usize, available: usize },

    #[error("Invalid blocklist size: {size} is not a multiple of hash width {width}")]
    InvalidBlocklistSize { size: u64, width: usize },

    #[error("Block size mismatch: volume uses {volume}, configuration uses {configured}")]
    BlockSizeMismatch { volume: u64, configured: u64 },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid volume prefix: {0}")]
    InvalidPrefix(String),

    #[error("Unknown compression module: {0}")]
    UnknownCodec(String),

    #[error("Unknown encryption module: {0}")]
    UnknownEncryption(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<zip::result::ZipError> for VolumeError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => VolumeError::Io(e),
            other => VolumeError::Container(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, VolumeError>;
