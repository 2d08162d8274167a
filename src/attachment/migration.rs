//! Legacy → current layout migration (spec.md §4.5).
//!
//! A `Mode` (dry-run vs real) drives per-entity results collected into
//! run-wide counts, never aborting on a single entity's failure.

use std::fs;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};

use crate::attachment::manager::{AttachmentManager, ManagerError};
use crate::attachment::AttachmentInfo;
use crate::format;
use crate::hash;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("manager: {0}")]
    Manager(#[from] ManagerError),
    #[error("storage: {0}")]
    Storage(#[from] crate::attachment::storage::StorageError),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationMode {
    DryRun,
    Real,
}

#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub hash: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationSummary {
    pub total_found: u64,
    pub migrated: u64,
    pub failed: u64,
    pub skipped: u64,
    pub already_migrated: u64,
    pub results: Vec<MigrationResult>,
}

pub struct MigrationManager<'a> {
    manager: &'a AttachmentManager,
}

impl<'a> MigrationManager<'a> {
    pub fn new(manager: &'a AttachmentManager) -> Self {
        MigrationManager { manager }
    }

    /// `MigrateAllAttachments`: walk every entity, migrate each legacy
    /// one, collect per-entity results; a single entity's failure never
    /// aborts the run.
    pub fn migrate_all_attachments(&self, mode: MigrationMode) -> Result<MigrationSummary, MigrationError> {
        let mut summary = MigrationSummary::default();
        let attachments = self.manager.list_attachments().map_err(MigrationError::Manager)?;
        summary.total_found = attachments.len() as u64;

        for attachment in attachments {
            match self.migrate_one(&attachment.hash, mode) {
                Ok(Outcome::Migrated) => {
                    summary.migrated += 1;
                    summary.results.push(MigrationResult {
                        hash: attachment.hash,
                        success: true,
                        error: None,
                    });
                }
                Ok(Outcome::AlreadyMigrated) => {
                    summary.already_migrated += 1;
                }
                Ok(Outcome::Skipped) => {
                    summary.skipped += 1;
                }
                Err(err) => {
                    summary.failed += 1;
                    summary.results.push(MigrationResult {
                        hash: attachment.hash,
                        success: false,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        Ok(summary)
    }

    fn migrate_one(&self, hash: &str, mode: MigrationMode) -> Result<Outcome, MigrationError> {
        let storage = self.manager.storage();

        // Step 1: classify. Already current → nothing to do.
        if storage.exists(hash)? {
            return Ok(Outcome::AlreadyMigrated);
        }

        let legacy_path = match self.legacy_path(hash) {
            Some(path) if path.is_file() => path,
            _ => return Ok(Outcome::Skipped),
        };

        // Step 2: read legacy bytes.
        let bytes = fs::read(&legacy_path).map_err(|source| MigrationError::Io {
            path: legacy_path.clone(),
            source,
        })?;

        // Step 3: classify MIME by magic bytes, else heuristic text, else
        // a generic binary fallback.
        let mime = format::detect_bytes(&bytes)
            .map(str::to_string)
            .unwrap_or_else(|| {
                if format::looks_like_text(&bytes) {
                    "text/plain".to_string()
                } else {
                    "application/octet-stream".to_string()
                }
            });

        // Step 4: synthesize metadata.
        let metadata = AttachmentInfo {
            hash: hash.to_string(),
            original_name: None,
            mime_type: mime,
            size: bytes.len() as u64,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            source_mms: None,
        };

        if mode == MigrationMode::DryRun {
            // Step 5: report success without touching disk.
            return Ok(Outcome::Migrated);
        }

        // Step 6: write new layout, then remove the legacy file. A crash
        // between the two leaves both forms present for this hash; the
        // `AlreadyMigrated` branch above treats a re-run as already done,
        // but the legacy file would linger — callers are expected to run
        // `ValidateMigration` after a crash to surface that case.
        storage.store(hash, &bytes, &metadata)?;
        fs::remove_file(&legacy_path).map_err(|source| MigrationError::Io {
            path: legacy_path,
            source,
        })?;

        Ok(Outcome::Migrated)
    }

    fn legacy_path(&self, hash: &str) -> Option<PathBuf> {
        let prefix = hash::shard_prefix(hash).ok()?;
        Some(self.manager.root().join("attachments").join(prefix).join(hash))
    }

    /// `ValidateMigration`: report remaining legacy entities, missing
    /// data files in current layouts, and metadata/directory hash
    /// disagreements.
    pub fn validate_migration(&self) -> Result<Vec<MigrationViolation>, MigrationError> {
        let mut violations = Vec::new();
        let attachments = self.manager.list_attachments().map_err(MigrationError::Manager)?;
        let storage = self.manager.storage();

        for attachment in attachments {
            if storage.exists(&attachment.hash)? {
                let metadata = storage.get_metadata(&attachment.hash)?;
                if metadata.hash != attachment.hash {
                    violations.push(MigrationViolation::MetadataHashMismatch {
                        hash: attachment.hash.clone(),
                        recorded: metadata.hash,
                    });
                }
                let data_path = storage.get_attachment_file_path(&attachment.hash)?;
                if !data_path.is_file() {
                    violations.push(MigrationViolation::MissingDataFile {
                        hash: attachment.hash,
                        path: data_path,
                    });
                }
            } else if let Some(path) = self.legacy_path(&attachment.hash) {
                if path.is_file() {
                    violations.push(MigrationViolation::StillLegacy {
                        hash: attachment.hash,
                        path,
                    });
                }
            }
        }
        Ok(violations)
    }
}

#[derive(Debug, Clone)]
pub enum MigrationViolation {
    StillLegacy { hash: String, path: PathBuf },
    MissingDataFile { hash: String, path: PathBuf },
    MetadataHashMismatch { hash: String, recorded: String },
}

enum Outcome {
    Migrated,
    AlreadyMigrated,
    Skipped,
}
