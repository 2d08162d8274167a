//! SMS domain validator (spec.md §4.7 I).

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::readers::SmsReader;
use crate::report::{Violation, ViolationType};
use crate::validators::{count_mismatch_violations, year_structure_violations};

const MIN_REFERENCE_LEN: usize = 16;
static ATTACHMENT_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^attachments/[0-9a-f]{2}/").unwrap());

/// *Structure*: as calls, over `sms/`.
pub fn validate_structure<R: SmsReader>(repo_root: &Path, reader: &R) -> Vec<Violation> {
    let years = match reader.available_years() {
        Ok(years) => years,
        Err(err) => {
            return vec![Violation::error(
                ViolationType::StructureViolation,
                "sms/",
                format!("failed to enumerate years: {err}"),
            )]
        }
    };
    year_structure_violations(repo_root, "sms", "sms", &years)
}

/// *Content*: per-year self-validation, per-record year check, and
/// attachment-reference shape validation.
pub fn validate_content<R: SmsReader>(reader: &R) -> Vec<Violation> {
    let mut violations = Vec::new();
    let years = match reader.available_years() {
        Ok(years) => years,
        Err(err) => {
            return vec![Violation::error(
                ViolationType::StructureViolation,
                "sms/",
                format!("failed to enumerate years: {err}"),
            )]
        }
    };

    for year in years {
        let file_label = format!("sms/sms-{year}.xml");
        if let Err(err) = reader.validate_sms_file(year) {
            violations.push(Violation::error(
                ViolationType::InvalidFormat,
                file_label.clone(),
                format!("self-validation failed: {err}"),
            ));
            continue;
        }

        let mut mismatches = 0_u64;
        let result = reader.stream_sms_for_year(year, &mut |record| {
            use crate::readers::HasYear;
            if record.year() != year {
                mismatches += 1;
            }
            Ok(())
        });
        if let Err(err) = result {
            violations.push(Violation::error(
                ViolationType::InvalidFormat,
                file_label.clone(),
                format!("failed streaming records: {err}"),
            ));
            continue;
        }
        if mismatches > 0 {
            violations.push(Violation::error(
                ViolationType::CountMismatch,
                file_label.clone(),
                format!("{mismatches} record(s) have a timestamp year outside {year}"),
            ));
        }

        match reader.attachment_refs(year) {
            Ok(refs) => {
                for reference in refs {
                    if !is_valid_reference_shape(&reference) {
                        violations.push(Violation::error(
                            ViolationType::InvalidFormat,
                            file_label.clone(),
                            format!("malformed attachment reference `{reference}`"),
                        ));
                    }
                }
            }
            Err(err) => {
                violations.push(Violation::error(
                    ViolationType::InvalidFormat,
                    file_label,
                    format!("failed reading attachment references: {err}"),
                ));
            }
        }
    }
    violations
}

fn is_valid_reference_shape(reference: &str) -> bool {
    reference.len() >= MIN_REFERENCE_LEN && ATTACHMENT_REF_RE.is_match(reference)
}

/// *Counts*: as calls.
pub fn validate_counts<R: SmsReader>(reader: &R, expected: &HashMap<i32, u64>) -> Vec<Violation> {
    let years = match reader.available_years() {
        Ok(years) => years,
        Err(err) => {
            return vec![Violation::error(
                ViolationType::StructureViolation,
                "sms/",
                format!("failed to enumerate years: {err}"),
            )]
        }
    };

    let mut reported = HashMap::new();
    for year in years {
        if let Ok(count) = reader.sms_count(year) {
            reported.insert(year, count);
        }
    }
    count_mismatch_violations("sms/sms", &reported, expected)
}
