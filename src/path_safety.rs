//! Resolve user-supplied relative paths to absolute paths that are
//! provably inside a declared base directory.
//!
//! Canonicalize-and-verify against a repository root, UNC/drive
//! rejection, symlink walk, and per-component normalization, unified
//! into the single primitive spec.md §4.1 names, with that section's
//! exact error taxonomy and algorithm steps.

use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

const MAX_PATH_BYTES: usize = 4096;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathSafetyError {
    #[error("path is empty")]
    EmptyPath,
    #[error("path exceeds {MAX_PATH_BYTES} bytes")]
    PathTooLong,
    #[error("path contains a NUL byte or disallowed control character")]
    InvalidPath,
    #[error("path is not valid UTF-8")]
    InvalidUnicode,
    #[error("path escapes the repository root")]
    PathOutsideRepository,
}

/// Validate `user_path` against `base`, returning the path relative to
/// `base` on success. Implements spec.md §4.1's eight-step algorithm.
pub fn validate_path(base: &Path, user_path: &str) -> Result<PathBuf, PathSafetyError> {
    if user_path.is_empty() {
        return Err(PathSafetyError::EmptyPath);
    }
    if user_path.as_bytes().len() > MAX_PATH_BYTES {
        return Err(PathSafetyError::PathTooLong);
    }
    if user_path.as_bytes().contains(&0) {
        return Err(PathSafetyError::InvalidPath);
    }
    if user_path
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        return Err(PathSafetyError::InvalidPath);
    }

    let normalized = user_path.replace('\\', "/");
    if is_windows_drive(&normalized) || normalized.starts_with("//") {
        return Err(PathSafetyError::InvalidPath);
    }

    // Absoluteness has to be read off `normalized`, before `clean_path`
    // strips the leading separator along with every other empty segment —
    // checking it on the cleaned string can never see a leading "/" and
    // would silently rebase every absolute input under `base` instead of
    // routing it through containment on its own merits (step 5 vs. step 7
    // of spec.md §4.1).
    let is_absolute_input = Path::new(&normalized).is_absolute();
    let cleaned = clean_path(&normalized);

    let candidate = if is_absolute_input {
        let mut p = PathBuf::from("/");
        p.push(&cleaned);
        p
    } else {
        let mut p = base.to_path_buf();
        p.push(&cleaned);
        p
    };

    let resolved = resolve_against_base(base, &candidate)?;

    if resolved != base && !resolved.starts_with(base) {
        return Err(PathSafetyError::PathOutsideRepository);
    }

    let relative = resolved
        .strip_prefix(base)
        .map_err(|_| PathSafetyError::PathOutsideRepository)?;
    if relative
        .components()
        .next()
        .map(|c| c == Component::ParentDir)
        .unwrap_or(false)
    {
        return Err(PathSafetyError::PathOutsideRepository);
    }

    Ok(relative.to_path_buf())
}

/// Normalize a single path segment (NFC form), used when synthesizing
/// on-disk filenames from attacker-influenced metadata such as
/// `AttachmentInfo::original_name` before it is joined onto a path.
pub fn normalize_component(segment: &str) -> String {
    segment.nfc().collect()
}

fn is_windows_drive(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && (bytes[0] as char).is_ascii_alphabetic()
}

/// Collapse `.` and duplicate separators, and resolve `..` lexically
/// against what precedes it (step 4 of spec.md §4.1). A leading `..`
/// with nothing to consume is preserved so the later containment check
/// can reject it explicitly.
fn clean_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                if matches!(out.last(), Some(&last) if last != "..") {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

/// Resolve symlinks on the longest existing prefix of `candidate`,
/// re-appending the non-existent tail (step 6 of spec.md §4.1).
fn resolve_against_base(base: &Path, candidate: &Path) -> Result<PathBuf, PathSafetyError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());

    let mut existing = candidate.to_path_buf();
    let mut tail: Vec<Component> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(resolved) => {
                let mut result = resolved;
                for comp in tail.iter().rev() {
                    result.push(comp.as_os_str());
                }
                return rebase(&canonical_base, base, result);
            }
            Err(_) => {
                if let Some(parent_tail) = existing.file_name() {
                    tail.push(Component::Normal(parent_tail));
                    if !existing.pop() {
                        return Err(PathSafetyError::PathOutsideRepository);
                    }
                } else {
                    // Nothing left to strip; treat as relative-to-base literal.
                    let mut result = base.to_path_buf();
                    for comp in tail.iter().rev() {
                        result.push(comp.as_os_str());
                    }
                    return Ok(result);
                }
            }
        }
    }
}

/// `resolve_against_base` canonicalizes against the filesystem's view of
/// `base`, but callers compare against the caller-supplied `base` value;
/// re-express the resolved path relative to the original `base` so a
/// symlinked base directory itself does not break containment checks.
fn rebase(canonical_base: &Path, original_base: &Path, resolved: PathBuf) -> Result<PathBuf, PathSafetyError> {
    match resolved.strip_prefix(canonical_base) {
        Ok(rel) => Ok(original_base.join(rel)),
        Err(_) => Ok(resolved),
    }
}
