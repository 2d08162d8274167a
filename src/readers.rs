//! External collaborator interfaces (spec.md §1, §6).
//!
//! The XML parsers for call logs and SMS/MMS streams, and the contacts
//! store, are explicitly out of scope for this crate — it consumes them
//! through these traits. Production implementations live elsewhere;
//! this crate only needs the shapes below to drive the per-domain
//! validators (`validators::{calls, sms, contacts}`) and the orphan
//! remover / attachment reference checks.

use std::collections::HashSet;

/// A single call record's timestamp-derived year, as spec.md §6 requires
/// ("a UTC year is derivable" from each record).
pub trait HasYear {
    fn year(&self) -> i32;
}

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// `CallsReader` (spec.md §6): enumerates available years, streams call
/// records for a year, and self-validates a year's backing file.
pub trait CallsReader {
    type Record: HasYear;

    fn available_years(&self) -> Result<Vec<i32>, ReaderError>;
    fn calls_count(&self, year: i32) -> Result<u64, ReaderError>;
    fn stream_calls_for_year(
        &self,
        year: i32,
        callback: &mut dyn FnMut(&Self::Record) -> Result<(), ReaderError>,
    ) -> Result<(), ReaderError>;
    fn validate_calls_file(&self, year: i32) -> Result<(), ReaderError>;
}

/// One MMS part, carrying the MIME type an attachment claims to have and
/// the reference string pointing at the stored attachment (spec.md §6).
#[derive(Debug, Clone)]
pub struct MmsPart {
    pub content_type: String,
    pub attachment_ref: String,
}

/// `SMSReader` (spec.md §6): as `CallsReader`, plus attachment reference
/// extraction across all years and per year.
pub trait SmsReader {
    type Record: HasYear;

    fn available_years(&self) -> Result<Vec<i32>, ReaderError>;
    fn sms_count(&self, year: i32) -> Result<u64, ReaderError>;
    fn stream_sms_for_year(
        &self,
        year: i32,
        callback: &mut dyn FnMut(&Self::Record) -> Result<(), ReaderError>,
    ) -> Result<(), ReaderError>;
    fn validate_sms_file(&self, year: i32) -> Result<(), ReaderError>;

    /// Attachment reference strings (`attachments/<hh>/<hash>/...`)
    /// present in year `year`'s MMS parts.
    fn attachment_refs(&self, year: i32) -> Result<Vec<String>, ReaderError>;

    /// The full reference set across all years — the input the orphan
    /// remover (§4.6) and the attachments validator's reference pass
    /// (§4.7) both consume.
    fn all_attachment_refs(&self) -> Result<HashSet<String>, ReaderError>;

    /// MMS parts declared for `hash`, if any were recorded against it —
    /// used by the attachments validator's integrity pass to compare a
    /// declared MIME type against the sniffed one.
    fn mms_parts_for_hash(&self, hash: &str) -> Result<Vec<MmsPart>, ReaderError>;
}

/// `ContactsReader` (spec.md §6): name ↔ number lookup.
pub trait ContactsReader {
    fn load_contacts(&mut self) -> Result<(), ReaderError>;
    fn all_contacts(&self) -> Result<Vec<Contact>, ReaderError>;
    fn contact_exists(&self, name: &str) -> Result<bool, ReaderError>;
    fn contacts_count(&self) -> Result<u64, ReaderError>;
    fn numbers_for_name(&self, name: &str) -> Result<Vec<String>, ReaderError>;
    fn name_for_number(&self, number: &str) -> Result<Option<String>, ReaderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub numbers: Vec<String>,
}

/// Extracts a repository-relative attachment hash from a reference
/// string of the form `attachments/<hh>/<hash>` or
/// `attachments/<hh>/<hash>/<filename>`, used by the SMS domain
/// validator's reference-format check (spec.md §4.7 I).
pub fn hash_from_attachment_ref(reference: &str) -> Option<&str> {
    let mut parts = reference.split('/');
    if parts.next() != Some("attachments") {
        return None;
    }
    let shard = parts.next()?;
    let hash = parts.next()?;
    if shard.len() == 2 && crate::hash::is_valid_hash(hash) && hash.starts_with(shard) {
        Some(hash)
    } else {
        None
    }
}
