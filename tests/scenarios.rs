//! End-to-end scenarios against the public API, one per concrete example
//! this crate's design was checked against: store+verify, orphan dry-run,
//! migration + corruption detection, misplaced-file detection, manifest
//! checksum failure, and path-traversal rejection.

use std::collections::HashSet;
use std::fs;

use mobilecombackup_repo::attachment::manager::AttachmentManager;
use mobilecombackup_repo::attachment::migration::{MigrationManager, MigrationMode};
use mobilecombackup_repo::attachment::orphan::OrphanRemover;
use mobilecombackup_repo::attachment::AttachmentInfo;
use mobilecombackup_repo::hash;
use mobilecombackup_repo::manifest::{self, Manifest, ManifestEntry};
use mobilecombackup_repo::path_safety::{self, PathSafetyError};
use mobilecombackup_repo::report::ViolationType;
use tempfile::tempdir;

#[test]
fn s1_store_and_verify_empty_attachment() {
    let dir = tempdir().unwrap();
    let manager = AttachmentManager::new(dir.path());
    let hash = hash::sha256_hex(b"");
    assert_eq!(hash, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");

    let metadata = AttachmentInfo {
        hash: hash.clone(),
        original_name: None,
        mime_type: "application/octet-stream".to_string(),
        size: 0,
        created_at: "2024-01-01T00:00:00Z".to_string(),
        source_mms: None,
    };
    manager.storage().store(&hash, b"", &metadata).unwrap();

    assert!(manager.storage().exists(&hash).unwrap());
    assert_eq!(manager.read_attachment(&hash).unwrap(), b"");
    assert!(manager.verify_attachment(&hash).unwrap());

    let path = manager.storage().get_attachment_file_path(&hash).unwrap();
    assert!(path.to_string_lossy().ends_with("/attachments/e3/e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855/attachment.bin"));
}

#[test]
fn s2_orphan_dry_run_reports_without_deleting() {
    let dir = tempdir().unwrap();
    let manager = AttachmentManager::new(dir.path());

    for seed in [b'a', b'b', b'c'] {
        let bytes = [seed; 5];
        let hash = hash::sha256_hex(&bytes);
        let metadata = AttachmentInfo {
            hash: hash.clone(),
            original_name: None,
            mime_type: "application/octet-stream".to_string(),
            size: 5,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            source_mms: None,
        };
        manager.storage().store(&hash, &bytes, &metadata).unwrap();
    }

    let remover = OrphanRemover::new(&manager);
    let refs = HashSet::new();
    let summary = remover.remove_orphans(&refs, true).unwrap();

    assert_eq!(summary.orphans_found, 3);
    assert_eq!(summary.orphans_removed, 3);
    assert_eq!(summary.bytes_freed, 15);
    assert_eq!(manager.list_attachments().unwrap().len(), 3);
}

#[test]
fn s3_migration_then_corruption_is_caught_by_validate_migration() {
    let dir = tempdir().unwrap();
    let empty_hash = hash::sha256_hex(b"");
    let shard_dir = dir.path().join("attachments").join(&empty_hash[0..2]);
    fs::create_dir_all(&shard_dir).unwrap();
    fs::write(shard_dir.join(&empty_hash), b"").unwrap();

    let manager = AttachmentManager::new(dir.path());
    let migration = MigrationManager::new(&manager);
    let summary = migration.migrate_all_attachments(MigrationMode::Real).unwrap();
    assert_eq!(summary.total_found, 1);
    assert_eq!(summary.migrated, 1);

    let entry_dir = dir.path().join("attachments").join(&empty_hash[0..2]).join(&empty_hash);
    assert!(entry_dir.join("metadata.yaml").is_file());
    assert!(entry_dir.join("attachment.bin").is_file());

    let metadata_path = entry_dir.join("metadata.yaml");
    let corrupted = fs::read_to_string(&metadata_path)
        .unwrap()
        .replace(&empty_hash, &"0".repeat(64));
    fs::write(&metadata_path, corrupted).unwrap();

    let violations = migration.validate_migration().unwrap();
    assert!(!violations.is_empty());
}

#[test]
fn s4_misplaced_hash_is_flagged_as_structure_violation() {
    let dir = tempdir().unwrap();
    let manager = AttachmentManager::new(dir.path());
    let misplaced_hash = "c".repeat(64); // does not start with shard "ab"
    let shard_dir = dir.path().join("attachments").join("ab");
    fs::create_dir_all(&shard_dir).unwrap();
    fs::write(shard_dir.join(&misplaced_hash), b"misplaced").unwrap();

    let violations = manager.validate_attachment_structure().unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationType::StructureViolation);
    assert!(violations[0].message.contains("prefix"));
}

#[test]
fn s5_manifest_checksum_mismatch_is_reported() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), b"hello world").unwrap();

    let manifest = Manifest {
        files: vec![ManifestEntry {
            file: "notes.txt".to_string(),
            sha256: "0".repeat(64),
            size_bytes: 11,
        }],
    };

    let violations = manifest::validate_checksums(dir.path(), &manifest);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationType::ChecksumMismatch);
}

#[test]
fn s6_path_traversal_and_nul_byte_are_rejected() {
    let dir = tempdir().unwrap();
    assert_eq!(
        path_safety::validate_path(dir.path(), "../../etc/passwd").unwrap_err(),
        PathSafetyError::PathOutsideRepository
    );
    assert_eq!(
        path_safety::validate_path(dir.path(), "file\0.txt").unwrap_err(),
        PathSafetyError::InvalidPath
    );
}

#[test]
fn empty_repository_yields_no_violations_and_zero_stats() {
    let dir = tempdir().unwrap();
    let manager = AttachmentManager::new(dir.path());
    assert!(manager.validate_attachment_structure().unwrap().is_empty());
    let stats = manager.get_attachment_stats(&HashSet::new(), true).unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.total_bytes, 0);
    assert_eq!(stats.corrupted, 0);
}

#[test]
fn migration_is_idempotent_on_second_run() {
    let dir = tempdir().unwrap();
    let bytes = b"idempotent";
    let hash = hash::sha256_hex(bytes);
    let shard_dir = dir.path().join("attachments").join(&hash[0..2]);
    fs::create_dir_all(&shard_dir).unwrap();
    fs::write(shard_dir.join(&hash), bytes).unwrap();

    let manager = AttachmentManager::new(dir.path());
    let migration = MigrationManager::new(&manager);

    let first = migration.migrate_all_attachments(MigrationMode::Real).unwrap();
    assert_eq!(first.migrated, 1);
    assert_eq!(first.already_migrated, 0);

    let second = migration.migrate_all_attachments(MigrationMode::Real).unwrap();
    assert_eq!(second.migrated, 0);
    assert_eq!(second.already_migrated, 1);
}

#[test]
fn uppercase_hash_input_normalizes_to_lowercase_storage() {
    let upper = "A".repeat(64);
    let normalized = hash::normalize_hash(&upper).unwrap();
    assert_eq!(normalized, "a".repeat(64));

    let dir = tempdir().unwrap();
    let manager = AttachmentManager::new(dir.path());
    let metadata = AttachmentInfo {
        hash: normalized.clone(),
        original_name: None,
        mime_type: "text/plain".to_string(),
        size: 3,
        created_at: "2024-01-01T00:00:00Z".to_string(),
        source_mms: None,
    };
    manager.storage().store(&normalized, b"abc", &metadata).unwrap();
    let shard_dir = dir.path().join("attachments").join("aa");
    assert!(shard_dir.is_dir());
}

#[test]
fn directory_with_data_file_but_no_metadata_is_not_current() {
    let dir = tempdir().unwrap();
    let hash = "f".repeat(64);
    let entry_dir = dir.path().join("attachments").join("ff").join(&hash);
    fs::create_dir_all(&entry_dir).unwrap();
    fs::write(entry_dir.join("attachment.bin"), b"partial").unwrap();

    let manager = AttachmentManager::new(dir.path());
    let attachment = manager.get_attachment(&hash).unwrap();
    assert!(!attachment.exists);

    let violations = manager.validate_attachment_structure().unwrap();
    assert!(violations.iter().any(|v| v.message.contains("metadata.yaml")));
}
