//! Evidence gate - validates uploaded artifacts before completion
//!
//! Every activity requires exactly one accepted artifact before it can
//! be marked complete. The gate checks format first, then size; the
//! first failing check wins and its reason is user-facing.

use crate::error::EvidenceRejection;
use crate::record::EvidenceRef;

/// Maximum accepted artifact size: 5 MiB.
pub const MAX_EVIDENCE_BYTES: u64 = 5 * 1024 * 1024;

/// An artifact as supplied by the evidence source: filename, declared
/// extension and declared size. Raw bytes never reach this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceUpload {
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
}

impl EvidenceUpload {
    /// Build an upload from a filename, deriving the extension from the
    /// final dot segment the way the original upload control does.
    pub fn from_filename(filename: impl Into<String>, size_bytes: u64) -> Self {
        let filename = filename.into();
        let extension = filename
            .rsplit('.')
            .next()
            .filter(|ext| *ext != filename)
            .unwrap_or("")
            .to_ascii_lowercase();
        Self {
            filename,
            extension,
            size_bytes,
        }
    }
}

/// Validate an upload. Check order is part of the contract: format
/// before size.
pub fn check(upload: &EvidenceUpload) -> Result<(), EvidenceRejection> {
    let extension = upload.extension.to_ascii_lowercase();
    if extension != "pdf" {
        return Err(EvidenceRejection::NotPdf { extension });
    }
    if upload.size_bytes > MAX_EVIDENCE_BYTES {
        return Err(EvidenceRejection::TooLarge {
            size_bytes: upload.size_bytes,
        });
    }
    Ok(())
}

/// Convert an accepted upload into the stored artifact reference.
/// Replaces any prior artifact for the activity (replace-not-append).
pub fn accept(upload: EvidenceUpload) -> Result<EvidenceRef, EvidenceRejection> {
    check(&upload)?;
    Ok(EvidenceRef {
        filename: upload.filename,
        extension: upload.extension.to_ascii_lowercase(),
        size_bytes: upload.size_bytes,
    })
}
