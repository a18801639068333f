//! Volume encryption
//!
//! Encryption is applied to a whole finished volume file before upload, and
//! removed after download before the container is opened. The engine only
//! sees the [`EncryptionModule`] trait; [`AesGcmModule`] is the built-in
//! implementation registered as `aes`.
//!
//! **AES-256-GCM file format**:
//! - `[magic: 4 bytes "BVE1"][nonce: 12 bytes][ciphertext][tag: 16 bytes]`
//! - Fresh random nonce for every file
//! - Authenticated, so tampering is detected on decrypt

use crate::error::{Result, VolumeError};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Encryption key (32 bytes for AES-256)
pub type EncryptionKey = [u8; 32];

/// File magic for encrypted volumes
pub const MAGIC: &[u8; 4] = b"BVE1";

/// Nonce size for AES-GCM (96 bits / 12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;

/// Overhead added by encryption (magic + nonce + tag)
pub const ENCRYPTION_OVERHEAD: usize = MAGIC.len() + NONCE_SIZE + TAG_SIZE;

/// Whole-file encryption used for uploaded volumes
pub trait EncryptionModule: Send + Sync {
    /// Module name used as the volume file suffix (e.g. `aes`)
    fn name(&self) -> &str;

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;

    fn encrypt_file(&self, source: &Path, destination: &Path) -> Result<()> {
        let plaintext = fs::read(source)?;
        fs::write(destination, self.encrypt(&plaintext)?)?;
        Ok(())
    }

    fn decrypt_file(&self, source: &Path, destination: &Path) -> Result<()> {
        let ciphertext = fs::read(source)?;
        fs::write(destination, self.decrypt(&ciphertext)?)?;
        Ok(())
    }
}

/// AES-256-GCM encryption module
#[derive(Clone)]
pub struct AesGcmModule {
    key: EncryptionKey,
}

impl AesGcmModule {
    pub const NAME: &'static str = "aes";

    pub fn new(key: EncryptionKey) -> Self {
        AesGcmModule { key }
    }

    /// Derive the key as the SHA-256 of a passphrase
    ///
    /// The derivation is a single unsalted hash, so the passphrase is as good
    /// as the raw key: an attacker holding a volume can test one guess per
    /// hash. Use a long random passphrase, or [`new`](Self::new) with a key
    /// from [`generate_key`](Self::generate_key).
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut key = [0u8; 32];
        key.copy_from_slice(&Sha256::digest(passphrase.as_bytes()));
        AesGcmModule { key }
    }

    /// Generate a random encryption key
    pub fn generate_key() -> EncryptionKey {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }
}

impl std::fmt::Debug for AesGcmModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmModule").finish_non_exhaustive()
    }
}

impl EncryptionModule for AesGcmModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new((&self.key).into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| VolumeError::Encryption(format!("encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(MAGIC.len() + NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(MAGIC);
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < ENCRYPTION_OVERHEAD {
            return Err(VolumeError::Encryption(
                "encrypted data too short".to_string(),
            ));
        }
        if &data[..MAGIC.len()] != MAGIC {
            return Err(VolumeError::Encryption(
                "not an encrypted volume".to_string(),
            ));
        }

        let cipher = Aes256Gcm::new((&self.key).into());
        let body = &data[MAGIC.len()..];
        let nonce = Nonce::from_slice(&body[..NONCE_SIZE]);

        cipher
            .decrypt(nonce, &body[NONCE_SIZE..])
            .map_err(|e| VolumeError::Encryption(format!("decryption failed: {}", e)))
    }
}
