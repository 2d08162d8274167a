//! Exercises the `mobilecombackup-repo` binary end to end, the way the
//! scenario tests exercise the library directly.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn repo() -> Command {
    Command::cargo_bin("mobilecombackup-repo").unwrap()
}

#[test]
fn validate_on_empty_repository_with_no_marker_reports_missing_marker() {
    let dir = tempdir().unwrap();
    repo()
        .arg("validate")
        .arg(dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing-marker-file"));
}

#[test]
fn validate_passes_on_a_well_formed_marker_only_repository() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join(".mobilecombackup.yaml"),
        "repository_structure_version: \"1\"\ncreated_at: \"2024-01-01T00:00:00Z\"\ncreated_by: \"test-harness/1.0\"\n",
    )
    .unwrap();

    repo().arg("validate").arg(dir.path()).assert().success();
}

#[test]
fn stats_on_empty_repository_reports_zero_totals() {
    let dir = tempdir().unwrap();
    repo()
        .arg("stats")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("total: 0"))
        .stdout(predicate::str::contains("total_bytes: 0"));
}

#[test]
fn migrate_dry_run_reports_without_mutating_disk() {
    let dir = tempdir().unwrap();
    let hash = "a".repeat(64);
    let shard = dir.path().join("attachments").join("aa");
    fs::create_dir_all(&shard).unwrap();
    fs::write(shard.join(&hash), b"legacy").unwrap();

    repo()
        .arg("migrate")
        .arg(dir.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrated: 1"));

    assert!(shard.join(&hash).is_file());
}

#[test]
fn prune_orphans_dry_run_reports_without_deleting() {
    let dir = tempdir().unwrap();
    let hash = "b".repeat(64);
    let entry_dir = dir.path().join("attachments").join("bb").join(&hash);
    fs::create_dir_all(&entry_dir).unwrap();
    fs::write(entry_dir.join("attachment.bin"), b"data").unwrap();
    fs::write(
        entry_dir.join("metadata.yaml"),
        format!("hash: \"{hash}\"\nmime_type: application/octet-stream\nsize: 4\ncreated_at: \"2024-01-01T00:00:00Z\"\n"),
    )
    .unwrap();

    repo()
        .arg("prune-orphans")
        .arg(dir.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("orphans_found: 1"));

    assert!(entry_dir.join("attachment.bin").is_file());
}
