//! Report data model (spec.md §4.7, §6): the closed violation taxonomy,
//! severity, and the aggregate repository status derived from it.
//!
//! A serializable report shape — one struct capturing everything a run
//! produced — built on spec.md's specific, closed set of violation
//! types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Error,
    Warning,
}

/// The closed set of 12 violation types named in spec.md §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationType {
    MissingFile,
    ExtraFile,
    ChecksumMismatch,
    InvalidFormat,
    OrphanedAttachment,
    CountMismatch,
    SizeMismatch,
    StructureViolation,
    MissingMarkerFile,
    UnsupportedVersion,
    FormatMismatch,
    UnknownFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationType,
    pub severity: Severity,
    pub file: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl Violation {
    pub fn new(kind: ViolationType, severity: Severity, file: impl Into<String>, message: impl Into<String>) -> Self {
        Violation {
            kind,
            severity,
            file: file.into(),
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn with_expected_actual(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    pub fn error(kind: ViolationType, file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, file, message)
    }

    pub fn warning(kind: ViolationType, file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, file, message)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    Valid,
    Invalid,
    Error,
}

/// Aggregate output of a validation run (spec.md §6's `status` field plus
/// the full violation list it is derived from).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub violations: Vec<Violation>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, violations: impl IntoIterator<Item = Violation>) {
        self.violations.extend(violations);
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Worst-severity status: `Invalid` if any violation is an error,
    /// else `Valid` (warnings are permitted).
    pub fn status(&self) -> RepositoryStatus {
        if self.violations.iter().any(Violation::is_error) {
            RepositoryStatus::Invalid
        } else {
            RepositoryStatus::Valid
        }
    }

    pub fn error_count(&self) -> usize {
        self.violations.iter().filter(|v| v.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.violations.len() - self.error_count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{:?}: {} error(s), {} warning(s)",
            self.status(),
            self.error_count(),
            self.warning_count()
        )
    }
}
