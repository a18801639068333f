//! Volume engine configuration
//!
//! All settings are passed explicitly to writers and readers; there is no
//! process-wide state. A configuration can be built in code or loaded from
//! TOML:
//!
//! ```toml
//! temp_dir = "/var/tmp/backup"
//! prefix = "nightly"
//! block_size = 102400
//! volume_size = 52428800
//! compression = "zip"
//! encryption = "aes"
//! block_size_policy = "warn"
//! ```

use crate::error::{Result, VolumeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Default block size (100 KiB)
pub const DEFAULT_BLOCK_SIZE: u64 = 100 * 1024;

/// Default target size of an uploaded volume (50 MiB)
pub const DEFAULT_VOLUME_SIZE: u64 = 50 * 1024 * 1024;

/// What a reader does when a volume's manifest block size differs from the
/// configured one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSizePolicy {
    /// Accept silently
    Ignore,
    /// Accept and log a warning
    #[default]
    Warn,
    /// Refuse the volume
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VolumeConfig {
    /// Directory for staging files
    pub temp_dir: PathBuf,

    /// Prefix shared by every volume of one backup
    #[validate(length(min = 1, max = 64))]
    pub prefix: String,

    /// Block size in bytes
    #[validate(range(min = 1024, max = 67108864))]
    pub block_size: u64,

    /// Size at which a block volume should be closed and uploaded
    #[validate(range(min = 1024))]
    pub volume_size: u64,

    /// Container codec module name
    #[validate(length(min = 1))]
    pub compression: String,

    /// Encryption module name, `None` for unencrypted volumes
    pub encryption: Option<String>,

    pub block_size_policy: BlockSizePolicy,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        VolumeConfig {
            temp_dir: std::env::temp_dir(),
            prefix: "backup".to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
            volume_size: DEFAULT_VOLUME_SIZE,
            compression: "zip".to_string(),
            encryption: None,
            block_size_policy: BlockSizePolicy::default(),
        }
    }
}

impl VolumeConfig {
    /// Default configuration staging files under `temp_dir`
    pub fn with_temp_dir(temp_dir: impl Into<PathBuf>) -> Self {
        VolumeConfig {
            temp_dir: temp_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_volume_size(mut self, volume_size: u64) -> Self {
        self.volume_size = volume_size;
        self
    }

    pub fn with_encryption(mut self, encryption: impl Into<String>) -> Self {
        self.encryption = Some(encryption.into());
        self
    }

    pub fn with_block_size_policy(mut self, policy: BlockSizePolicy) -> Self {
        self.block_size_policy = policy;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: VolumeConfig =
            toml::from_str(text).map_err(|e| VolumeError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Run field validation
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| VolumeError::Config(e.to_string()))
    }
}
