//! Hand-off between volumes and the remote transport
//!
//! Uploads: a closed [`BlockWriter`] becomes an [`UploadFile`] holding the
//! bytes to send (encrypted when the volume name carries an encryption
//! suffix) and the remote name to send them under.
//!
//! Downloads: a fetched file becomes a [`DownloadedVolume`], decrypted into a
//! staging file when needed, ready for [`BlockReader`].

use crate::config::VolumeConfig;
use crate::container::CodecRegistry;
use crate::encryption::EncryptionModule;
use crate::error::{Result, VolumeError};
use crate::naming::{parse_name, VolumeName};
use crate::reader::BlockReader;
use crate::writer::BlockWriter;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

/// A finished volume ready for upload
#[derive(Debug)]
pub struct UploadFile {
    file: TempPath,
    remote_name: String,
}

impl UploadFile {
    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    /// Move the file to `directory` under its remote name
    pub fn persist_in(self, directory: impl AsRef<Path>) -> Result<PathBuf> {
        let destination = directory.as_ref().join(&self.remote_name);
        self.file
            .persist(&destination)
            .map_err(|e| VolumeError::Io(e.error))?;
        Ok(destination)
    }
}

/// A downloaded volume ready to be opened
#[derive(Debug)]
pub struct DownloadedVolume {
    path: PathBuf,
    name: VolumeName,
    /// Decrypted staging copy, removed on drop
    _decrypted: Option<TempPath>,
}

impl DownloadedVolume {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &VolumeName {
        &self.name
    }

    /// Open the volume with the codec named in its file name
    ///
    /// The reader must not outlive `self`.
    pub fn open(&self, config: &VolumeConfig, registry: &CodecRegistry) -> Result<BlockReader> {
        let codec = registry.get(&self.name.compression)?;
        BlockReader::open_with_codec(&self.path, config, codec.as_ref())
    }
}

fn check_module<'a>(
    expected: &str,
    module: Option<&'a dyn EncryptionModule>,
) -> Result<&'a dyn EncryptionModule> {
    match module {
        Some(module) if module.name() == expected => Ok(module),
        _ => Err(VolumeError::UnknownEncryption(expected.to_string())),
    }
}

/// Close `writer` and produce the file to upload
///
/// When the volume is named with an encryption suffix, `encryption` must be
/// the module of that name; the staging file is encrypted into a new temp
/// file under `temp_dir` and the plain copy is removed.
pub fn prepare_upload(
    writer: BlockWriter,
    encryption: Option<&dyn EncryptionModule>,
    temp_dir: &Path,
) -> Result<UploadFile> {
    let name = writer.volume_name().clone();
    let plain = writer.into_local_file()?;

    let file = match &name.encryption {
        None => plain,
        Some(expected) => {
            let module = check_module(expected, encryption)?;
            let sealed = tempfile::Builder::new()
                .prefix(&format!("{}-", name))
                .suffix(".tmp")
                .tempfile_in(temp_dir)?
                .into_temp_path();
            module.encrypt_file(&plain, &sealed)?;
            debug!("Encrypted {} with {}", name, module.name());
            sealed
        }
    };

    Ok(UploadFile {
        file,
        remote_name: name.to_string(),
    })
}

/// Prepare a downloaded file for reading
///
/// `remote_name` must follow the volume naming grammar. Encrypted volumes
/// are decrypted into a staging file under `temp_dir`.
pub fn prepare_download(
    path: impl AsRef<Path>,
    remote_name: &str,
    encryption: Option<&dyn EncryptionModule>,
    temp_dir: &Path,
) -> Result<DownloadedVolume> {
    let parsed = parse_name(remote_name)?.ok_or_else(|| {
        VolumeError::Config(format!("'{}' is not a volume name", remote_name))
    })?;
    let path = path.as_ref();

    match &parsed.name.encryption {
        None => Ok(DownloadedVolume {
            path: path.to_path_buf(),
            name: parsed.name,
            _decrypted: None,
        }),
        Some(expected) => {
            let module = check_module(expected, encryption)?;
            let staging = tempfile::Builder::new()
                .prefix(&format!("{}-", parsed.name.unencrypted()))
                .suffix(".tmp")
                .tempfile_in(temp_dir)?
                .into_temp_path();
            module.decrypt_file(path, &staging)?;
            debug!("Decrypted {} with {}", remote_name, module.name());

            Ok(DownloadedVolume {
                path: staging.to_path_buf(),
                name: parsed.name,
                _decrypted: Some(staging),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::AesGcmModule;
    use crate::hash::ContentHash;
    use tempfile::tempdir;

    #[test]
    fn test_unencrypted_upload_keeps_container() {
        let dir = tempdir().unwrap();
        let config = VolumeConfig::with_temp_dir(dir.path());
        let registry = CodecRegistry::default();

        let mut writer = BlockWriter::create(&config, &registry).unwrap();
        writer
            .add_block(&ContentHash::compute(b"abc"), b"abc", 3)
            .unwrap();
        let local = writer.local_path().to_path_buf();

        let upload = prepare_upload(writer, None, dir.path()).unwrap();
        assert_eq!(upload.path(), local.as_path());
        assert!(upload.remote_name().ends_with(".zip"));
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let dir = tempdir().unwrap();
        let out = tempdir().unwrap();
        let config = VolumeConfig::with_temp_dir(dir.path()).with_encryption("aes");
        let registry = CodecRegistry::default();
        let module = AesGcmModule::from_passphrase("hunter2");

        let data = b"secret block".to_vec();
        let hash = ContentHash::compute(&data);
        let mut writer = BlockWriter::create(&config, &registry).unwrap();
        writer.add_block(&hash, &data, data.len()).unwrap();
        let plain_path = writer.local_path().to_path_buf();

        let upload = prepare_upload(writer, Some(&module), dir.path()).unwrap();
        assert!(!plain_path.exists());
        assert!(upload.remote_name().ends_with(".zip.aes"));

        let remote_name = upload.remote_name().to_string();
        let uploaded = upload.persist_in(out.path()).unwrap();
        assert_eq!(uploaded, out.path().join(&remote_name));

        let download =
            prepare_download(&uploaded, &remote_name, Some(&module), dir.path()).unwrap();
        let mut reader = download.open(&config, &registry).unwrap();
        assert_eq!(reader.read_block_to_vec(&hash).unwrap(), data);
    }

    #[test]
    fn test_missing_module_is_rejected() {
        let dir = tempdir().unwrap();
        let config = VolumeConfig::with_temp_dir(dir.path()).with_encryption("aes");
        let writer = BlockWriter::create(&config, &CodecRegistry::default()).unwrap();

        assert!(matches!(
            prepare_upload(writer, None, dir.path()),
            Err(VolumeError::UnknownEncryption(name)) if name == "aes"
        ));
    }

    #[test]
    fn test_download_requires_volume_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("whatever");
        assert!(matches!(
            prepare_download(&path, "random-unrelated-file.txt", None, dir.path()),
            Err(VolumeError::Config(_))
        ));
    }
}
