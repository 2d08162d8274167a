//! Manifest and checksum validation (spec.md §4.7 G): `files.yaml` and its
//! self-checksum `files.yaml.sha256`.
//!
//! An accumulate-all-errors pattern (never short-circuit on the first
//! bad row) over the manifest's four passes: format, completeness,
//! per-entry checksum, self-checksum.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::hash;
use crate::report::{Violation, ViolationType};

pub const MANIFEST_FILE: &str = "files.yaml";
pub const MANIFEST_CHECKSUM_FILE: &str = "files.yaml.sha256";

static CHECKSUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^sha256:[0-9a-f]{64}$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed YAML in {path}: {source}")]
    Yaml {
        path: std::path::PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// One entry of `files.yaml`: `sha256` is accepted bare
/// (`<64-hex>`) or prefixed (`sha256:<64-hex>`) on read; writes always
/// emit the bare form (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ManifestError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes are always bare lowercase hex, regardless of what form a
    /// loaded manifest carried (see DESIGN.md's Open Question decision).
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        let normalized = Manifest {
            files: self
                .files
                .iter()
                .map(|e| ManifestEntry {
                    file: e.file.clone(),
                    sha256: bare_hex(&e.sha256).to_string(),
                    size_bytes: e.size_bytes,
                })
                .collect(),
        };
        serde_yaml::to_string(&normalized)
    }
}

fn bare_hex(sha256: &str) -> &str {
    sha256.strip_prefix("sha256:").unwrap_or(sha256)
}

fn checksum_matches_either_form(sha256: &str) -> bool {
    CHECKSUM_RE.is_match(sha256) || hash::is_valid_hash(sha256)
}

/// *Format* pass (spec.md §4.7 G): duplicates, checksum shape, size,
/// path safety, and the two reserved filenames.
pub fn validate_format(manifest: &Manifest) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut seen = HashSet::new();

    for entry in &manifest.files {
        if entry.file == MANIFEST_FILE || entry.file == MANIFEST_CHECKSUM_FILE {
            violations.push(Violation::error(
                ViolationType::StructureViolation,
                entry.file.clone(),
                "manifest must not list itself or its checksum file",
            ));
            continue;
        }
        if !seen.insert(entry.file.clone()) {
            violations.push(Violation::error(
                ViolationType::StructureViolation,
                entry.file.clone(),
                "duplicate path in manifest",
            ));
        }
        if !checksum_matches_either_form(&entry.sha256) {
            violations.push(Violation::error(
                ViolationType::InvalidFormat,
                entry.file.clone(),
                "checksum is not `sha256:<64-hex>` or bare 64-hex",
            ));
        }
        if entry.size_bytes == 0 {
            violations.push(Violation::error(
                ViolationType::SizeMismatch,
                entry.file.clone(),
                "manifest size must be greater than zero",
            ));
        }
        if entry.file.is_empty() || Path::new(&entry.file).is_absolute() || entry.file.split('/').any(|c| c == "..") {
            violations.push(Violation::error(
                ViolationType::StructureViolation,
                entry.file.clone(),
                "path must be relative and free of `..`",
            ));
        }
    }
    violations
}

/// *Completeness* pass: every regular file other than the manifest and
/// its checksum sidecar must have an entry, and vice versa.
pub fn validate_completeness(repo_root: &Path, manifest: &Manifest) -> Vec<Violation> {
    let mut violations = Vec::new();
    let manifest_paths: HashSet<&str> = manifest.files.iter().map(|e| e.file.as_str()).collect();
    let mut on_disk: HashSet<String> = HashSet::new();

    for entry in WalkDir::new(repo_root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match entry.path().strip_prefix(repo_root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if rel == MANIFEST_FILE || rel == MANIFEST_CHECKSUM_FILE {
            continue;
        }
        on_disk.insert(rel);
    }

    for path in &on_disk {
        if !manifest_paths.contains(path.as_str()) {
            violations.push(Violation::error(
                ViolationType::ExtraFile,
                path.clone(),
                "file on disk has no manifest entry",
            ));
        }
    }
    for path in &manifest_paths {
        if !on_disk.contains(*path) {
            violations.push(Violation::error(
                ViolationType::MissingFile,
                path.to_string(),
                "manifest entry has no corresponding file on disk",
            ));
        }
    }
    violations
}

/// *Checksums* pass: per-entry SHA-256 and size against the file's
/// actual bytes.
pub fn validate_checksums(repo_root: &Path, manifest: &Manifest) -> Vec<Violation> {
    let mut violations = Vec::new();
    for entry in &manifest.files {
        let path = repo_root.join(&entry.file);
        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(_) => continue, // reported by the completeness pass
        };
        if metadata.len() != entry.size_bytes {
            violations.push(
                Violation::error(
                    ViolationType::SizeMismatch,
                    entry.file.clone(),
                    "file size does not match manifest",
                )
                .with_expected_actual(entry.size_bytes.to_string(), metadata.len().to_string()),
            );
        }
        match hash::file_sha256(&path) {
            Ok(actual) => {
                let expected = bare_hex(&entry.sha256);
                if !actual.eq_ignore_ascii_case(expected) {
                    violations.push(
                        Violation::error(
                            ViolationType::ChecksumMismatch,
                            entry.file.clone(),
                            "SHA-256 does not match manifest",
                        )
                        .with_expected_actual(expected.to_string(), actual),
                    );
                }
            }
            Err(err) => {
                violations.push(Violation::error(
                    ViolationType::StructureViolation,
                    entry.file.clone(),
                    format!("failed to hash file: {err}"),
                ));
            }
        }
    }
    violations
}

/// *Manifest self-checksum*: `files.yaml.sha256` must be a single line
/// `"<64-hex>  files.yaml"` matching a fresh hash of `files.yaml`.
pub fn validate_self_checksum(repo_root: &Path) -> Vec<Violation> {
    let manifest_path = repo_root.join(MANIFEST_FILE);
    let checksum_path = repo_root.join(MANIFEST_CHECKSUM_FILE);

    let mut violations = Vec::new();
    let recorded = match std::fs::read_to_string(&checksum_path) {
        Ok(s) => s,
        Err(_) => {
            violations.push(Violation::error(
                ViolationType::MissingFile,
                MANIFEST_CHECKSUM_FILE,
                "files.yaml.sha256 is missing",
            ));
            return violations;
        }
    };

    let line = recorded.lines().next().unwrap_or("").trim_end();
    let expected_suffix = format!("  {MANIFEST_FILE}");
    let recorded_hash = match line.strip_suffix(&expected_suffix) {
        Some(h) if hash::is_valid_hash(h) => h,
        _ => {
            violations.push(Violation::error(
                ViolationType::InvalidFormat,
                MANIFEST_CHECKSUM_FILE,
                format!("expected a single line `<64-hex>  {MANIFEST_FILE}`"),
            ));
            return violations;
        }
    };

    match hash::file_sha256(&manifest_path) {
        Ok(actual) if actual == recorded_hash => {}
        Ok(actual) => {
            violations.push(
                Violation::error(
                    ViolationType::ChecksumMismatch,
                    MANIFEST_FILE,
                    "files.yaml.sha256 does not match files.yaml",
                )
                .with_expected_actual(recorded_hash.to_string(), actual),
            );
        }
        Err(_) => {
            violations.push(Violation::error(
                ViolationType::MissingFile,
                MANIFEST_FILE,
                "files.yaml is missing",
            ));
        }
    }
    violations
}
