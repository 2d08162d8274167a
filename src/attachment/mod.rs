//! Attachment storage, unification across layouts, migration, and orphan
//! removal (spec.md §3, §4.3–§4.6).

pub mod manager;
pub mod migration;
pub mod orphan;
pub mod storage;

use serde::{Deserialize, Serialize};

/// Logical view of a stored binary, regardless of which on-disk layout
/// backs it (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub hash: String,
    pub path: std::path::PathBuf,
    pub size: u64,
    pub exists: bool,
}

/// The persisted metadata sidecar for a current-layout attachment
/// (spec.md §3). `created_at` is RFC-3339.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub hash: String,
    #[serde(default)]
    pub original_name: Option<String>,
    pub mime_type: String,
    pub size: u64,
    pub created_at: String,
    #[serde(default)]
    pub source_mms: Option<String>,
}

/// Which on-disk form backs a hash, per the manager's dispatch rule
/// (spec.md §4.4): current wins if both metadata.yaml and directory
/// exist, else legacy if the flat file exists, else the hash is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Current,
    Legacy,
}
