//! Current (directory-form) attachment layout (spec.md §4.3): `Store`,
//! `Exists`, `GetMetadata`, `GetPath`, `GetAttachmentFilePath`.
//!
//! Base-relative path resolution under a repository root, paired with a
//! metadata-sidecar convention, in the hash-directory-plus-`metadata.yaml`
//! shape spec.md §3 names.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::attachment::AttachmentInfo;
use crate::hash::{self, HashError};

#[cfg(unix)]
const SHARD_DIR_MODE: u32 = 0o750;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("hash: {0}")]
    Hash(#[from] HashError),
    #[error("attachment {0} not found")]
    NotFound(String),
    #[error("malformed metadata.yaml for {hash}: {source}")]
    MalformedMetadata {
        hash: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Operates on `attachments/<hh>/<hash>/` directories under a repository
/// root.
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Storage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_dir(&self, hash: &str) -> Result<PathBuf, StorageError> {
        let prefix = hash::shard_prefix(hash)?;
        Ok(self.root.join("attachments").join(prefix))
    }

    fn entry_dir(&self, hash: &str) -> Result<PathBuf, StorageError> {
        Ok(self.shard_dir(hash)?.join(hash))
    }

    fn metadata_path(&self, hash: &str) -> Result<PathBuf, StorageError> {
        Ok(self.entry_dir(hash)?.join("metadata.yaml"))
    }

    /// `Store`: create the shard directory, write the data file named by
    /// `GenerateFilename`, then write `metadata.yaml` — data before
    /// metadata, so a crash between the two leaves an entity the manager
    /// classifies as not-yet-committed (spec.md §3 "Ownership & lifecycle").
    pub fn store(&self, hash: &str, bytes: &[u8], metadata: &AttachmentInfo) -> Result<(), StorageError> {
        self.store_from_reader(hash, &mut io::Cursor::new(bytes), metadata)
    }

    /// `StoreFromReader`: as `store`, but streams from `reader`. Writes to
    /// a temp file in the shard directory first and renames into place,
    /// so a mid-copy read error never mutates an existing on-disk entity.
    pub fn store_from_reader(
        &self,
        hash: &str,
        reader: &mut dyn Read,
        metadata: &AttachmentInfo,
    ) -> Result<(), StorageError> {
        let entry_dir = self.entry_dir(hash)?;
        fs::create_dir_all(&entry_dir).map_err(|e| StorageError::io(&entry_dir, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(SHARD_DIR_MODE);
            let _ = fs::set_permissions(&entry_dir, perms);
        }

        let filename = crate::hash::generate_filename(metadata.original_name.as_deref(), &metadata.mime_type);
        let data_path = entry_dir.join(&filename);
        let tmp_path = entry_dir.join(format!(".{filename}.tmp"));

        {
            let mut tmp = fs::File::create(&tmp_path).map_err(|e| StorageError::io(&tmp_path, e))?;
            let mut buf = [0_u8; 8192];
            loop {
                let read = reader.read(&mut buf).map_err(|e| StorageError::io(&tmp_path, e))?;
                if read == 0 {
                    break;
                }
                tmp.write_all(&buf[..read]).map_err(|e| StorageError::io(&tmp_path, e))?;
            }
        }
        fs::rename(&tmp_path, &data_path).map_err(|e| StorageError::io(&data_path, e))?;

        let metadata_path = entry_dir.join("metadata.yaml");
        let yaml = serde_yaml::to_string(metadata)
            .map_err(|source| StorageError::MalformedMetadata { hash: hash.to_string(), source })?;
        fs::write(&metadata_path, yaml).map_err(|e| StorageError::io(&metadata_path, e))?;

        Ok(())
    }

    /// `Exists`: true iff both the hash directory and `metadata.yaml` exist.
    pub fn exists(&self, hash: &str) -> Result<bool, StorageError> {
        let metadata_path = self.metadata_path(hash)?;
        Ok(metadata_path.is_file())
    }

    /// `GetMetadata`: parse `metadata.yaml`.
    pub fn get_metadata(&self, hash: &str) -> Result<AttachmentInfo, StorageError> {
        let metadata_path = self.metadata_path(hash)?;
        let contents = fs::read_to_string(&metadata_path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound(hash.to_string())
            } else {
                StorageError::io(&metadata_path, e)
            }
        })?;
        serde_yaml::from_str(&contents)
            .map_err(|source| StorageError::MalformedMetadata { hash: hash.to_string(), source })
    }

    /// `GetPath`: repository-relative path of the data file, resolved via
    /// metadata.
    pub fn get_path(&self, hash: &str) -> Result<PathBuf, StorageError> {
        let metadata = self.get_metadata(hash)?;
        let filename = crate::hash::generate_filename(metadata.original_name.as_deref(), &metadata.mime_type);
        let prefix = hash::shard_prefix(hash)?;
        Ok(PathBuf::from("attachments").join(prefix).join(hash).join(filename))
    }

    /// `GetAttachmentFilePath`: absolute path to the data file.
    pub fn get_attachment_file_path(&self, hash: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(self.get_path(hash)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_metadata(hash: &str) -> AttachmentInfo {
        AttachmentInfo {
            hash: hash.to_string(),
            original_name: Some("photo.jpg".to_string()),
            mime_type: "image/jpeg".to_string(),
            size: 6,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            source_mms: None,
        }
    }

    #[test]
    fn store_then_round_trip() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let hash = "e".repeat(64);
        let metadata = sample_metadata(&hash);

        storage.store(&hash, b"abc123", &metadata).unwrap();

        assert!(storage.exists(&hash).unwrap());
        let read_back = storage.get_metadata(&hash).unwrap();
        assert_eq!(read_back, metadata);

        let data_path = storage.get_attachment_file_path(&hash).unwrap();
        assert_eq!(fs::read(&data_path).unwrap(), b"abc123");
        assert!(data_path.ends_with("photo.jpg"));
    }

    #[test]
    fn store_generates_filename_when_original_missing() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let hash = "f".repeat(64);
        let metadata = AttachmentInfo {
            hash: hash.clone(),
            original_name: None,
            mime_type: "image/png".to_string(),
            size: 4,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            source_mms: None,
        };
        storage.store(&hash, b"data", &metadata).unwrap();
        let path = storage.get_path(&hash).unwrap();
        assert_eq!(path.file_name().unwrap(), "attachment.png");
    }

    #[test]
    fn exists_false_when_metadata_missing() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let hash = "a".repeat(64);
        assert!(!storage.exists(&hash).unwrap());
    }

    #[test]
    fn get_metadata_not_found_is_well_typed() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let hash = "b".repeat(64);
        let err = storage.get_metadata(&hash).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(h) if h == hash));
    }

    #[test]
    fn rejects_hash_shorter_than_two_chars() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let err = storage.exists("a").unwrap_err();
        assert!(matches!(err, StorageError::Hash(_)));
    }

    #[test]
    fn overwrite_with_identical_content_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let hash = "c".repeat(64);
        let metadata = sample_metadata(&hash);
        storage.store(&hash, b"abc123", &metadata).unwrap();
        storage.store(&hash, b"abc123", &metadata).unwrap();
        assert!(storage.exists(&hash).unwrap());
    }
}
