//! Marker file validation (spec.md §4.7 H): `.mobilecombackup.yaml`.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::report::{Violation, ViolationType};

pub const MARKER_FILE: &str = ".mobilecombackup.yaml";
pub const SUPPORTED_VERSION: &str = "1";

#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marker {
    pub repository_structure_version: String,
    pub created_at: String,
    pub created_by: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct MarkerValidation {
    pub violations: Vec<Violation>,
    pub version_supported: bool,
}

/// Validates `.mobilecombackup.yaml` at `repo_root` per spec.md §4.7 H.
/// A missing marker is a single error but does not itself block further
/// validation (`version_supported` stays `true`); a malformed file or an
/// unsupported version both set `version_supported` to `false`.
pub fn validate_marker(repo_root: &Path) -> MarkerValidation {
    let path = repo_root.join(MARKER_FILE);
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) => {
            return MarkerValidation {
                violations: vec![Violation::error(
                    ViolationType::MissingMarkerFile,
                    MARKER_FILE,
                    "marker file is missing",
                )],
                version_supported: true,
            };
        }
    };

    let raw: Value = match serde_yaml::from_str(&contents) {
        Ok(v) => v,
        Err(err) => {
            return MarkerValidation {
                violations: vec![Violation::error(
                    ViolationType::InvalidFormat,
                    MARKER_FILE,
                    format!("marker file is not valid YAML: {err}"),
                )],
                version_supported: false,
            };
        }
    };

    let marker: Marker = match serde_yaml::from_value(raw) {
        Ok(m) => m,
        Err(err) => {
            return MarkerValidation {
                violations: vec![Violation::error(
                    ViolationType::InvalidFormat,
                    MARKER_FILE,
                    format!("marker file is missing required fields: {err}"),
                )],
                version_supported: false,
            };
        }
    };

    let mut violations = Vec::new();
    let mut version_supported = true;

    if marker.repository_structure_version != SUPPORTED_VERSION {
        violations.push(
            Violation::error(
                ViolationType::UnsupportedVersion,
                MARKER_FILE,
                "unsupported repository_structure_version",
            )
            .with_expected_actual(SUPPORTED_VERSION, marker.repository_structure_version.clone()),
        );
        version_supported = false;
    }

    if marker.created_by.is_empty() {
        violations.push(Violation::error(
            ViolationType::InvalidFormat,
            MARKER_FILE,
            "created_by must not be empty",
        ));
    }

    if DateTime::parse_from_rfc3339(&marker.created_at).is_err() {
        violations.push(Violation::error(
            ViolationType::InvalidFormat,
            MARKER_FILE,
            "created_at is not a valid RFC-3339 timestamp",
        ));
    }

    for key in marker.extra.keys() {
        tracing::warn!(target: "mobilecombackup_repo", field = %key, "unknown field in marker file");
    }

    MarkerValidation {
        violations,
        version_supported,
    }
}
