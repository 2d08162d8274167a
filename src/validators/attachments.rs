//! Attachments domain validator (spec.md §4.7 I): structure, integrity,
//! and reference checks over the attachment manager.

use std::collections::HashSet;

use crate::attachment::manager::AttachmentManager;
use crate::attachment::Layout;
use crate::format;
use crate::hash;
use crate::readers::SmsReader;
use crate::report::{Violation, ViolationType};

/// 1. *Structure*: delegates to the manager's structural pass, then adds
/// the per-current-layout metadata/filename/mime checks named in
/// spec.md §4.7.
pub fn validate_structure(manager: &AttachmentManager) -> Vec<Violation> {
    let mut violations = manager.validate_attachment_structure().unwrap_or_default();

    let attachments = match manager.list_attachments() {
        Ok(list) => list,
        Err(err) => {
            violations.push(Violation::error(
                ViolationType::StructureViolation,
                "attachments/",
                format!("failed to enumerate attachments: {err}"),
            ));
            return violations;
        }
    };

    for attachment in &attachments {
        let storage = manager.storage();
        let metadata = match storage.get_metadata(&attachment.hash) {
            Ok(m) => m,
            Err(_) => continue, // legacy-layout entity, or already reported above
        };

        if metadata.hash != attachment.hash {
            violations.push(
                Violation::error(
                    ViolationType::ChecksumMismatch,
                    attachment.path.display().to_string(),
                    "metadata hash does not match directory identity",
                )
                .with_expected_actual(attachment.hash.clone(), metadata.hash.clone()),
            );
        }
        if metadata.size != attachment.size {
            violations.push(
                Violation::error(
                    ViolationType::SizeMismatch,
                    attachment.path.display().to_string(),
                    "metadata size does not match data file size",
                )
                .with_expected_actual(metadata.size.to_string(), attachment.size.to_string()),
            );
        }
        let data_path = manager.root().join(&attachment.path);
        if !data_path.is_file() {
            violations.push(Violation::error(
                ViolationType::MissingFile,
                attachment.path.display().to_string(),
                "current-layout entity has no data file",
            ));
        }
        let expected_name = hash::generate_filename(metadata.original_name.as_deref(), &metadata.mime_type);
        if attachment.path.file_name().map(|n| n.to_string_lossy().into_owned()) != Some(expected_name.clone()) {
            violations.push(Violation::warning(
                ViolationType::StructureViolation,
                attachment.path.display().to_string(),
                format!("filename does not match GenerateFilename(original_name, mime_type) (expected `{expected_name}`)"),
            ));
        }
        if mime_guess::get_mime_extensions_str(&metadata.mime_type).is_none() {
            violations.push(Violation::warning(
                ViolationType::FormatMismatch,
                attachment.path.display().to_string(),
                format!("mime type `{}` is not recognized", metadata.mime_type),
            ));
        }
    }

    violations
}

/// 2. *Integrity*: existence, content-vs-hash verification, and
/// magic-byte sniffing, cross-checked against any MIME the SMS reader
/// declared for the same hash.
pub fn validate_integrity<R: SmsReader>(manager: &AttachmentManager, sms_reader: &R) -> Vec<Violation> {
    let mut violations = Vec::new();
    let attachments = match manager.list_attachments() {
        Ok(list) => list,
        Err(err) => {
            return vec![Violation::error(
                ViolationType::StructureViolation,
                "attachments/",
                format!("failed to enumerate attachments: {err}"),
            )]
        }
    };

    for attachment in &attachments {
        let data_path = manager.root().join(&attachment.path);
        if !data_path.is_file() {
            violations.push(Violation::error(
                ViolationType::MissingFile,
                attachment.path.display().to_string(),
                "attachment data file does not exist",
            ));
            continue;
        }

        match manager.verify_attachment(&attachment.hash) {
            Ok(true) => {}
            Ok(false) => {
                violations.push(Violation::error(
                    ViolationType::ChecksumMismatch,
                    attachment.path.display().to_string(),
                    "content SHA-256 does not match stored hash",
                ));
            }
            Err(err) => {
                violations.push(Violation::error(
                    ViolationType::StructureViolation,
                    attachment.path.display().to_string(),
                    format!("failed to read attachment for verification: {err}"),
                ));
            }
        }

        let sniffed = format::detect_file(&data_path).ok();
        let declared_mime = sms_reader
            .mms_parts_for_hash(&attachment.hash)
            .ok()
            .and_then(|parts| parts.first().map(|p| p.content_type.clone()));

        match (&declared_mime, sniffed) {
            (Some(declared), Some(sniffed)) if !declared.eq_ignore_ascii_case(sniffed) => {
                violations.push(
                    Violation::error(
                        ViolationType::FormatMismatch,
                        attachment.path.display().to_string(),
                        "declared MMS content type disagrees with sniffed format",
                    )
                    .with_expected_actual(declared.clone(), sniffed.to_string()),
                );
            }
            (None, None) => {
                violations.push(Violation::error(
                    ViolationType::UnknownFormat,
                    attachment.path.display().to_string(),
                    "no declared MIME type and magic-byte sniffing found no match",
                ));
            }
            _ => {}
        }
    }
    violations
}

/// 3. *References*: every referenced hash must exist; every unreferenced
/// attachment is reported as an orphan warning.
pub fn validate_references(manager: &AttachmentManager, refs: &HashSet<String>) -> Vec<Violation> {
    let mut violations = Vec::new();

    for reference in refs {
        let shard = &reference[..reference.len().min(2)];
        let label = format!("attachments/{shard}/{reference}");
        match manager.get_attachment(reference) {
            Ok(attachment) if attachment.exists => {}
            _ => {
                violations.push(Violation::error(
                    ViolationType::MissingFile,
                    label,
                    "referenced attachment does not exist",
                ));
            }
        }
    }

    if let Ok(orphans) = manager.find_orphaned_attachments(refs) {
        for orphan in orphans {
            violations.push(Violation::warning(
                ViolationType::OrphanedAttachment,
                orphan.path.display().to_string(),
                "attachment has no incoming reference",
            ));
        }
    }

    violations
}

#[allow(dead_code)]
fn layout_label(layout: Layout) -> &'static str {
    match layout {
        Layout::Current => "current",
        Layout::Legacy => "legacy",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::AttachmentInfo;
    use crate::readers::{MmsPart, ReaderError};
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct NoRecord;
    impl crate::readers::HasYear for NoRecord {
        fn year(&self) -> i32 {
            0
        }
    }

    struct FakeSmsReader {
        mms_by_hash: HashMap<String, Vec<MmsPart>>,
    }
    impl SmsReader for FakeSmsReader {
        type Record = NoRecord;

        fn available_years(&self) -> Result<Vec<i32>, ReaderError> {
            Ok(vec![])
        }
        fn sms_count(&self, _year: i32) -> Result<u64, ReaderError> {
            Ok(0)
        }
        fn stream_sms_for_year(
            &self,
            _year: i32,
            _callback: &mut dyn FnMut(&Self::Record) -> Result<(), ReaderError>,
        ) -> Result<(), ReaderError> {
            Ok(())
        }
        fn validate_sms_file(&self, _year: i32) -> Result<(), ReaderError> {
            Ok(())
        }
        fn attachment_refs(&self, _year: i32) -> Result<Vec<String>, ReaderError> {
            Ok(vec![])
        }
        fn all_attachment_refs(&self) -> Result<HashSet<String>, ReaderError> {
            Ok(HashSet::new())
        }
        fn mms_parts_for_hash(&self, hash: &str) -> Result<Vec<MmsPart>, ReaderError> {
            Ok(self.mms_by_hash.get(hash).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn references_flags_missing_and_orphaned() {
        let dir = tempdir().unwrap();
        let manager = AttachmentManager::new(dir.path());
        let referenced = "a".repeat(64);
        let missing = "b".repeat(64);
        let orphan = "c".repeat(64);
        let metadata = AttachmentInfo {
            hash: referenced.clone(),
            original_name: None,
            mime_type: "text/plain".to_string(),
            size: 3,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            source_mms: None,
        };
        manager.storage().store(&referenced, b"abc", &metadata).unwrap();
        manager
            .storage()
            .store(&orphan, b"xyz", &AttachmentInfo { hash: orphan.clone(), ..metadata.clone() })
            .unwrap();

        let mut refs = HashSet::new();
        refs.insert(referenced);
        refs.insert(missing);
        let violations = validate_references(&manager, &refs);

        assert!(violations.iter().any(|v| v.kind == ViolationType::MissingFile));
        assert!(violations.iter().any(|v| v.kind == ViolationType::OrphanedAttachment));
    }

    #[test]
    fn integrity_flags_checksum_mismatch() {
        let dir = tempdir().unwrap();
        let manager = AttachmentManager::new(dir.path());
        let hash = "d".repeat(64);
        let metadata = AttachmentInfo {
            hash: hash.clone(),
            original_name: None,
            mime_type: "text/plain".to_string(),
            size: 3,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            source_mms: None,
        };
        manager.storage().store(&hash, b"abc", &metadata).unwrap();
        let sms_reader = FakeSmsReader {
            mms_by_hash: HashMap::new(),
        };
        let violations = validate_integrity(&manager, &sms_reader);
        assert!(violations.iter().any(|v| v.kind == ViolationType::ChecksumMismatch));
    }
}
