//! Orphan detection and removal (spec.md §4.6).
//!
//! A counts-aggregation pattern over every unreferenced attachment, with
//! the re-validation step required by spec.md §4.6.3: every orphan's
//! path is re-checked through path safety before anything is deleted.

use std::collections::HashSet;
use std::fs;

use crate::attachment::manager::{AttachmentManager, ManagerError};
use crate::path_safety::{self, PathSafetyError};

#[derive(Debug, thiserror::Error)]
pub enum OrphanError {
    #[error("manager: {0}")]
    Manager(#[from] ManagerError),
    #[error("orphan path escapes the repository: {0}")]
    PathSafety(#[from] PathSafetyError),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FailedRemoval {
    pub hash: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct OrphanSummary {
    pub attachments_scanned: u64,
    pub orphans_found: u64,
    pub orphans_removed: u64,
    pub bytes_freed: u64,
    pub removal_failures: u64,
    pub failed_removals: Vec<FailedRemoval>,
    pub shard_dirs_removed: u64,
}

pub struct OrphanRemover<'a> {
    manager: &'a AttachmentManager,
}

impl<'a> OrphanRemover<'a> {
    pub fn new(manager: &'a AttachmentManager) -> Self {
        OrphanRemover { manager }
    }

    /// Remove every attachment whose hash is absent from `refs`. With
    /// `dry_run` set, reports as if every orphan were removed but never
    /// mutates the filesystem.
    pub fn remove_orphans(&self, refs: &HashSet<String>, dry_run: bool) -> Result<OrphanSummary, OrphanError> {
        let mut summary = OrphanSummary::default();
        let all = self.manager.list_attachments().map_err(OrphanError::Manager)?;
        summary.attachments_scanned = all.len() as u64;

        let orphans: Vec<_> = all.into_iter().filter(|a| !refs.contains(&a.hash)).collect();
        summary.orphans_found = orphans.len() as u64;

        if dry_run {
            summary.orphans_removed = summary.orphans_found;
            summary.bytes_freed = orphans.iter().map(|a| a.size).sum();
            return Ok(summary);
        }

        let mut touched_shards: HashSet<std::path::PathBuf> = HashSet::new();

        for orphan in &orphans {
            match self.remove_one(orphan) {
                Ok(shard_dir) => {
                    summary.orphans_removed += 1;
                    summary.bytes_freed += orphan.size;
                    touched_shards.insert(shard_dir);
                }
                Err(err) => {
                    summary.removal_failures += 1;
                    summary.failed_removals.push(FailedRemoval {
                        hash: orphan.hash.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        for shard_dir in touched_shards {
            if let Ok(mut entries) = fs::read_dir(&shard_dir) {
                if entries.next().is_none() && fs::remove_dir(&shard_dir).is_ok() {
                    summary.shard_dirs_removed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Re-validates the orphan's repository-relative path through path
    /// safety before deleting, then removes the legacy file or the whole
    /// current-layout directory. Returns the shard directory that should
    /// be considered for empty-directory cleanup.
    fn remove_one(&self, orphan: &crate::attachment::Attachment) -> Result<std::path::PathBuf, OrphanError> {
        let rel = orphan.path.to_string_lossy();
        let safe_rel = path_safety::validate_path(self.manager.root(), &rel)?;
        let absolute = self.manager.root().join(&safe_rel);

        let shard_dir = absolute
            .parent()
            .and_then(|p| if p.file_name().map(|n| n == orphan.hash.as_str()).unwrap_or(false) {
                p.parent()
            } else {
                Some(p)
            })
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.manager.root().join("attachments"));

        if self.manager.storage().exists(&orphan.hash).unwrap_or(false) {
            let entry_dir = absolute
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| self.manager.root().join("attachments"));
            fs::remove_dir_all(&entry_dir).map_err(|source| OrphanError::Io { path: entry_dir, source })?;
        } else {
            fs::remove_file(&absolute).map_err(|source| OrphanError::Io { path: absolute.clone(), source })?;
        }

        Ok(shard_dir)
    }
}
