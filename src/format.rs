//! Format detection (spec.md §4.8): magic-byte sniffing over a fixed
//! table of required entries, built on the `infer` crate for MIME
//! sniffing during the attachment walk.

use std::fs::File;
use std::io::Read;
use std::path::Path;

const SNIFF_WINDOW: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("unknown file format")]
    Unknown,
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One entry of spec.md §4.8's fixed magic-byte table.
struct Magic {
    mime: &'static str,
    bytes: &'static [u8],
    offset: usize,
}

const REQUIRED_TABLE: &[Magic] = &[
    Magic {
        mime: "image/png",
        bytes: &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
        offset: 0,
    },
    Magic {
        mime: "image/jpeg",
        bytes: &[0xFF, 0xD8, 0xFF],
        offset: 0,
    },
    Magic {
        mime: "image/gif",
        bytes: &[0x47, 0x49, 0x46, 0x38],
        offset: 0,
    },
    Magic {
        mime: "video/mp4",
        bytes: &[0x66, 0x74, 0x79, 0x70],
        offset: 4,
    },
    Magic {
        mime: "application/pdf",
        bytes: &[0x25, 0x50, 0x44, 0x46],
        offset: 0,
    },
];

fn sniff_buf(buf: &[u8]) -> Option<&'static str> {
    for entry in REQUIRED_TABLE {
        let end = entry.offset + entry.bytes.len();
        if buf.len() >= end && &buf[entry.offset..end] == entry.bytes {
            return Some(entry.mime);
        }
    }
    // Fall back to `infer`'s broader matcher set for types outside the
    // five spec-required entries (it reads the same leading window).
    infer::get(buf).map(|kind| kind.mime_type())
}

/// Read up to the first 512 bytes of `path` and classify by magic bytes.
/// First table match wins; `infer`'s broader matcher set is consulted
/// second; no match is `FormatError::Unknown`.
pub fn detect_file(path: &Path) -> Result<&'static str, FormatError> {
    let mut file = File::open(path).map_err(|source| FormatError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut buf = vec![0_u8; SNIFF_WINDOW];
    let mut total = 0;
    loop {
        let read = file.read(&mut buf[total..]).map_err(|source| FormatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        total += read;
        if total == buf.len() {
            break;
        }
    }
    buf.truncate(total);
    sniff_buf(&buf).ok_or(FormatError::Unknown)
}

/// Classify an in-memory buffer the same way (used by the migration
/// manager, which already holds legacy bytes in memory).
pub fn detect_bytes(bytes: &[u8]) -> Option<&'static str> {
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    sniff_buf(window)
}

/// Heuristic text classification used by the migration manager (spec.md
/// §4.5 step 3) when magic-byte sniffing finds nothing: at least 95% of
/// the first 512 bytes are printable ASCII or TAB/LF/CR.
pub fn looks_like_text(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    if window.is_empty() {
        return true;
    }
    let printable = window
        .iter()
        .filter(|&&b| matches!(b, 0x20..=0x7E | b'\t' | b'\n' | b'\r'))
        .count();
    (printable as f64) / (window.len() as f64) >= 0.95
}
