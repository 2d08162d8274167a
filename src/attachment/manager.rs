//! Unifies reads over the legacy (flat-file) and current (directory-form)
//! attachment layouts (spec.md §4.4).
//!
//! A depth-2 shard walk driven by a caller-supplied callback, per
//! spec.md §4.4's `StreamAttachments`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::attachment::storage::{Storage, StorageError};
use crate::attachment::{Attachment, Layout};
use crate::hash::{self, HashError};
use crate::report::{Severity, Violation, ViolationType};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("hash: {0}")]
    Hash(#[from] HashError),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("attachment {0} not found")]
    NotFound(String),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Surfaced by `StreamAttachments` when the callback short-circuits
    /// the walk with its own error.
    #[error("{0}")]
    Callback(String),
}

impl ManagerError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ManagerError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttachmentStats {
    pub total: u64,
    pub total_bytes: u64,
    pub orphaned: u64,
    pub corrupted: u64,
    pub by_mime: HashMap<String, u64>,
}

/// Reads over both attachment layouts, rooted at a repository directory.
pub struct AttachmentManager {
    root: PathBuf,
    storage: Storage,
}

impl AttachmentManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        AttachmentManager {
            storage: Storage::new(&root),
            root,
        }
    }

    fn attachments_dir(&self) -> PathBuf {
        self.root.join("attachments")
    }

    fn legacy_path(&self, hash: &str) -> Result<PathBuf, ManagerError> {
        let prefix = hash::shard_prefix(hash)?;
        Ok(self.attachments_dir().join(prefix).join(hash))
    }

    /// Dispatch rule (spec.md §4.4): current wins if the directory and
    /// its `metadata.yaml` both exist; else legacy if the flat file
    /// exists; else the hash is absent.
    fn layout_of(&self, hash: &str) -> Result<Option<Layout>, ManagerError> {
        if self.storage.exists(hash)? {
            return Ok(Some(Layout::Current));
        }
        if self.legacy_path(hash)?.is_file() {
            return Ok(Some(Layout::Legacy));
        }
        Ok(None)
    }

    /// `GetAttachment`.
    pub fn get_attachment(&self, hash: &str) -> Result<Attachment, ManagerError> {
        match self.layout_of(hash)? {
            Some(Layout::Current) => {
                let metadata = self.storage.get_metadata(hash)?;
                let path = self.storage.get_path(hash)?;
                Ok(Attachment {
                    hash: hash.to_string(),
                    path,
                    size: metadata.size,
                    exists: true,
                })
            }
            Some(Layout::Legacy) => {
                let path = self.legacy_path(hash)?;
                let size = fs::metadata(&path).map_err(|e| ManagerError::io(&path, e))?.len();
                let prefix = hash::shard_prefix(hash)?;
                Ok(Attachment {
                    hash: hash.to_string(),
                    path: PathBuf::from("attachments").join(prefix).join(hash),
                    size,
                    exists: true,
                })
            }
            None => Ok(Attachment {
                hash: hash.to_string(),
                path: PathBuf::new(),
                size: 0,
                exists: false,
            }),
        }
    }

    /// `ReadAttachment`.
    pub fn read_attachment(&self, hash: &str) -> Result<Vec<u8>, ManagerError> {
        match self.layout_of(hash)? {
            Some(Layout::Current) => {
                let path = self.storage.get_attachment_file_path(hash)?;
                fs::read(&path).map_err(|e| ManagerError::io(&path, e))
            }
            Some(Layout::Legacy) => {
                let path = self.legacy_path(hash)?;
                fs::read(&path).map_err(|e| ManagerError::io(&path, e))
            }
            None => Err(ManagerError::NotFound(hash.to_string())),
        }
    }

    /// `VerifyAttachment`: recompute SHA-256 and compare case-insensitively.
    pub fn verify_attachment(&self, hash: &str) -> Result<bool, ManagerError> {
        let bytes = self.read_attachment(hash)?;
        let computed = hash::sha256_hex(&bytes);
        Ok(computed.eq_ignore_ascii_case(hash))
    }

    /// `StreamAttachments`: depth-2 walk of `attachments/`, shard
    /// directories in lexicographic order, each shard's entries likewise.
    /// The callback's `Err` short-circuits the walk.
    pub fn stream_attachments(
        &self,
        mut callback: impl FnMut(&Attachment) -> Result<(), ManagerError>,
    ) -> Result<(), ManagerError> {
        let base = self.attachments_dir();
        if !base.is_dir() {
            return Ok(());
        }
        let mut shards: Vec<_> = fs::read_dir(&base)
            .map_err(|e| ManagerError::io(&base, e))?
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .collect();
        shards.sort_by_key(|e| e.file_name());

        for shard in shards {
            let shard_name = shard.file_name();
            let shard_name = shard_name.to_string_lossy();
            if !is_shard_name(&shard_name) {
                continue;
            }
            let shard_path = shard.path();
            let mut entries: Vec<_> = fs::read_dir(&shard_path)
                .map_err(|e| ManagerError::io(&shard_path, e))?
                .filter_map(Result::ok)
                .collect();
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if !hash::is_valid_hash(&name) || !name.starts_with(shard_name.as_ref()) {
                    continue;
                }
                let attachment = self.get_attachment(&name)?;
                if attachment.exists {
                    callback(&attachment)?;
                }
            }
        }
        Ok(())
    }

    /// `ListAttachments`: materialize the stream.
    pub fn list_attachments(&self) -> Result<Vec<Attachment>, ManagerError> {
        let mut out = Vec::new();
        self.stream_attachments(|a| {
            out.push(a.clone());
            Ok(())
        })?;
        Ok(out)
    }

    /// `FindOrphanedAttachments`: every attachment whose hash is absent
    /// from `refs`.
    pub fn find_orphaned_attachments(&self, refs: &HashSet<String>) -> Result<Vec<Attachment>, ManagerError> {
        let mut orphans = Vec::new();
        self.stream_attachments(|a| {
            if !refs.contains(&a.hash) {
                orphans.push(a.clone());
            }
            Ok(())
        })?;
        Ok(orphans)
    }

    /// `ValidateAttachmentStructure`: single aggregating pass, never
    /// short-circuits.
    pub fn validate_attachment_structure(&self) -> Result<Vec<Violation>, ManagerError> {
        let mut violations = Vec::new();
        let base = self.attachments_dir();
        if !base.is_dir() {
            return Ok(violations);
        }

        for entry in fs::read_dir(&base).map_err(|e| ManagerError::io(&base, e))?.filter_map(Result::ok) {
            let file_type = entry.file_type().map_err(|e| ManagerError::io(entry.path(), e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if file_type.is_file() {
                violations.push(Violation::error(
                    ViolationType::StructureViolation,
                    format!("attachments/{name}"),
                    "loose file at attachments/ top level",
                ));
                continue;
            }
            if !is_shard_name(&name) {
                violations.push(Violation::error(
                    ViolationType::StructureViolation,
                    format!("attachments/{name}"),
                    "shard directory name is not exactly two lowercase hex characters",
                ));
                continue;
            }

            let shard_path = entry.path();
            for child in fs::read_dir(&shard_path).map_err(|e| ManagerError::io(&shard_path, e))?.filter_map(Result::ok) {
                let child_name = child.file_name().to_string_lossy().into_owned();
                let rel = format!("attachments/{name}/{child_name}");
                if !hash::is_valid_hash(&child_name) {
                    violations.push(Violation::error(
                        ViolationType::StructureViolation,
                        rel,
                        "entry name is not a valid 64-character hex hash",
                    ));
                    continue;
                }
                if !child_name.starts_with(&name) {
                    violations.push(Violation::error(
                        ViolationType::StructureViolation,
                        rel,
                        "misplaced file: hash prefix does not match its shard directory",
                    ));
                    continue;
                }
                let child_type = child.file_type().map_err(|e| ManagerError::io(child.path(), e))?;
                if child_type.is_dir() {
                    let metadata_path = child.path().join("metadata.yaml");
                    if !metadata_path.is_file() {
                        violations.push(Violation::error(
                            ViolationType::StructureViolation,
                            rel,
                            "current-layout directory missing metadata.yaml",
                        ));
                    }
                }
            }
        }
        Ok(violations)
    }

    /// `GetAttachmentStats`: one streaming pass; `verify` is best-effort —
    /// read/verify errors are swallowed (not reported here), only an
    /// explicit verification failure counts as corrupted.
    pub fn get_attachment_stats(&self, refs: &HashSet<String>, verify: bool) -> Result<AttachmentStats, ManagerError> {
        let mut stats = AttachmentStats::default();
        self.stream_attachments(|a| {
            stats.total += 1;
            stats.total_bytes += a.size;
            if !refs.contains(&a.hash) {
                stats.orphaned += 1;
            }
            if verify {
                if let Ok(ok) = self.verify_attachment(&a.hash) {
                    if !ok {
                        stats.corrupted += 1;
                    }
                }
            }
            if let Ok(metadata) = self.metadata_for_stats(&a.hash) {
                *stats.by_mime.entry(metadata).or_insert(0) += 1;
            }
            Ok(())
        })?;
        Ok(stats)
    }

    fn metadata_for_stats(&self, hash: &str) -> Result<String, ManagerError> {
        match self.layout_of(hash)? {
            Some(Layout::Current) => Ok(self.storage.get_metadata(hash)?.mime_type),
            _ => Ok("application/octet-stream".to_string()),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_shard_name(name: &str) -> bool {
    name.len() == 2 && name.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
