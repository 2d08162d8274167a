//! Contacts domain validator (spec.md §4.7 I, §6).
//!
//! The contacts store itself is out of scope (spec.md §1); this module
//! only checks that every contact reference a caller cares about (e.g.
//! names surfaced by the SMS reader) actually resolves.

use crate::readers::ContactsReader;
use crate::report::{Violation, ViolationType};

/// Confirms that each name in `expected_names` resolves via the reader.
pub fn validate_references<R: ContactsReader>(reader: &R, expected_names: &[String]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for name in expected_names {
        match reader.contact_exists(name) {
            Ok(true) => {}
            Ok(false) => {
                violations.push(Violation::error(
                    ViolationType::MissingFile,
                    "contacts.yaml",
                    format!("referenced contact `{name}` not found"),
                ));
            }
            Err(err) => {
                violations.push(Violation::error(
                    ViolationType::InvalidFormat,
                    "contacts.yaml",
                    format!("failed to look up contact `{name}`: {err}"),
                ));
            }
        }
    }
    violations
}
