//! Calls domain validator (spec.md §4.7 I).

use std::collections::HashMap;
use std::path::Path;

use crate::readers::CallsReader;
use crate::report::{Violation, ViolationType};
use crate::validators::{count_mismatch_violations, year_structure_violations};

/// *Structure*: `calls/` is required only when the reader advertises at
/// least one year; each advertised year needs `calls-<year>.xml`.
pub fn validate_structure<R: CallsReader>(repo_root: &Path, reader: &R) -> Vec<Violation> {
    let years = match reader.available_years() {
        Ok(years) => years,
        Err(err) => {
            return vec![Violation::error(
                ViolationType::StructureViolation,
                "calls/",
                format!("failed to enumerate years: {err}"),
            )]
        }
    };
    year_structure_violations(repo_root, "calls", "calls", &years)
}

/// *Content*: per-year self-validation plus a per-record check that each
/// record's timestamp year equals the file's year.
pub fn validate_content<R: CallsReader>(reader: &R) -> Vec<Violation> {
    let mut violations = Vec::new();
    let years = match reader.available_years() {
        Ok(years) => years,
        Err(err) => {
            return vec![Violation::error(
                ViolationType::StructureViolation,
                "calls/",
                format!("failed to enumerate years: {err}"),
            )]
        }
    };

    for year in years {
        let file_label = format!("calls/calls-{year}.xml");
        if let Err(err) = reader.validate_calls_file(year) {
            violations.push(Violation::error(
                ViolationType::InvalidFormat,
                file_label.clone(),
                format!("self-validation failed: {err}"),
            ));
            continue;
        }

        let mut mismatches = 0_u64;
        let result = reader.stream_calls_for_year(year, &mut |record| {
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
                file_label,
                format!("{mismatches} record(s) have a timestamp year outside {year}"),
            ));
        }
    }
    violations
}

/// *Counts*: compare reader-reported per-year counts against an expected
/// map (e.g. recovered from a prior manifest or import plan).
pub fn validate_counts<R: CallsReader>(reader: &R, expected: &HashMap<i32, u64>) -> Vec<Violation> {
    let years = match reader.available_years() {
        Ok(years) => years,
        Err(err) => {
            return vec![Violation::error(
                ViolationType::StructureViolation,
                "calls/",
                format!("failed to enumerate years: {err}"),
            )]
        }
    };

    let mut reported = HashMap::new();
    for year in years {
        if let Ok(count) = reader.calls_count(year) {
            reported.insert(year, count);
        }
    }
    count_mismatch_violations("calls/calls", &reported, expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::{HasYear, ReaderError};
    use tempfile::tempdir;

    struct FakeRecord {
        year: i32,
    }
    impl HasYear for FakeRecord {
        fn year(&self) -> i32 {
            self.year
        }
    }

    struct FakeCallsReader {
        years: Vec<i32>,
        records: HashMap<i32, Vec<FakeRecord>>,
    }
    impl CallsReader for FakeCallsReader {
        type Record = FakeRecord;

        fn available_years(&self) -> Result<Vec<i32>, ReaderError> {
            Ok(self.years.clone())
        }
        fn calls_count(&self, year: i32) -> Result<u64, ReaderError> {
            Ok(self.records.get(&year).map(|r| r.len() as u64).unwrap_or(0))
        }
        fn stream_calls_for_year(
            &self,
            year: i32,
            callback: &mut dyn FnMut(&Self::Record) -> Result<(), ReaderError>,
        ) -> Result<(), ReaderError> {
            if let Some(records) = self.records.get(&year) {
                for record in records {
                    callback(record)?;
                }
            }
            Ok(())
        }
        fn validate_calls_file(&self, _year: i32) -> Result<(), ReaderError> {
            Ok(())
        }
    }

    #[test]
    fn structure_flags_missing_year_file() {
        let dir = tempdir().unwrap();
        let reader = FakeCallsReader {
            years: vec![2020],
            records: HashMap::new(),
        };
        let violations = validate_structure(dir.path(), &reader);
        assert!(violations.iter().any(|v| v.kind == ViolationType::MissingFile));
    }

    #[test]
    fn structure_passes_when_year_file_present() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("calls")).unwrap();
        std::fs::write(dir.path().join("calls/calls-2020.xml"), b"<calls/>").unwrap();
        let reader = FakeCallsReader {
            years: vec![2020],
            records: HashMap::new(),
        };
        assert!(validate_structure(dir.path(), &reader).is_empty());
    }

    #[test]
    fn content_flags_year_mismatch_in_records() {
        let mut records = HashMap::new();
        records.insert(2020, vec![FakeRecord { year: 2019 }]);
        let reader = FakeCallsReader {
            years: vec![2020],
            records,
        };
        let violations = validate_content(&reader);
        assert!(violations.iter().any(|v| v.kind == ViolationType::CountMismatch));
    }

    #[test]
    fn counts_flags_missing_expected_year() {
        let reader = FakeCallsReader {
            years: vec![],
            records: HashMap::new(),
        };
        let mut expected = HashMap::new();
        expected.insert(2021, 5);
        let violations = validate_counts(&reader, &expected);
        assert!(violations.iter().any(|v| v.kind == ViolationType::MissingFile));
    }
}
