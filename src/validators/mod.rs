//! Per-domain validators (spec.md §4.7 I): calls, SMS, attachments,
//! contacts. Each shares the year-based structure/content/count
//! pattern except attachments, which is driven by the attachment
//! manager instead of a reader trait.

pub mod attachments;
pub mod calls;
pub mod contacts;
pub mod sms;

use std::collections::HashMap;
use std::path::Path;

use crate::report::{Violation, ViolationType};

/// Shared year-based structure check for `calls/` and `sms/` (spec.md
/// §4.7 I): the domain directory is required only when at least one
/// year is advertised, and each advertised year needs its own file.
pub(crate) fn year_structure_violations(
    repo_root: &Path,
    dir_name: &str,
    file_prefix: &str,
    years: &[i32],
) -> Vec<Violation> {
    let mut violations = Vec::new();
    if years.is_empty() {
        return violations;
    }

    let dir = repo_root.join(dir_name);
    if !dir.is_dir() {
        violations.push(Violation::error(
            ViolationType::StructureViolation,
            dir_name,
            format!("{dir_name}/ is required when years are advertised"),
        ));
        return violations;
    }

    for year in years {
        let filename = format!("{file_prefix}-{year}.xml");
        let path = dir.join(&filename);
        if !path.is_file() {
            violations.push(Violation::error(
                ViolationType::MissingFile,
                format!("{dir_name}/{filename}"),
                format!("missing file for advertised year {year}"),
            ));
        }
    }
    violations
}

/// Shared count-vs-expected check (spec.md §4.7 I): report any expected
/// year missing from the reported counts.
pub(crate) fn count_mismatch_violations(
    file_label: &str,
    reported: &HashMap<i32, u64>,
    expected: &HashMap<i32, u64>,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (year, expected_count) in expected {
        match reported.get(year) {
            None => {
                violations.push(Violation::error(
                    ViolationType::MissingFile,
                    format!("{file_label}-{year}.xml"),
                    format!("expected year {year} not reported"),
                ));
            }
            Some(actual_count) if actual_count != expected_count => {
                violations.push(
                    Violation::error(
                        ViolationType::CountMismatch,
                        format!("{file_label}-{year}.xml"),
                        "record count does not match expected count",
                    )
                    .with_expected_actual(expected_count.to_string(), actual_count.to_string()),
                );
            }
            _ => {}
        }
    }
    violations
}
