//! Property coverage for the path-safety primitive: no accepted output
//! ever points outside the declared base, for any input the traversal
//! patterns can throw at it.

use proptest::prelude::*;
use tempfile::tempdir;

use mobilecombackup_repo::path_safety::validate_path;

fn segment_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("..".to_string()),
        Just(".".to_string()),
        "[a-zA-Z0-9_]{1,8}".prop_map(|s| s),
    ]
}

proptest! {
    #[test]
    fn accepted_paths_never_escape_base(segments in prop::collection::vec(segment_strategy(), 1..8)) {
        let dir = tempdir().unwrap();
        let candidate = segments.join("/");
        if let Ok(relative) = validate_path(dir.path(), &candidate) {
            let resolved = dir.path().join(&relative);
            prop_assert!(resolved.starts_with(dir.path()));
            prop_assert!(!relative.to_string_lossy().split('/').any(|c| c == ".."));
        }
    }

    #[test]
    fn nul_bytes_are_always_rejected(prefix in "[a-zA-Z0-9]{0,8}", suffix in "[a-zA-Z0-9]{0,8}") {
        let dir = tempdir().unwrap();
        let candidate = format!("{prefix}\0{suffix}");
        prop_assert!(validate_path(dir.path(), &candidate).is_err());
    }
}
