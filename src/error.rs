//! Error types for mobility-route

use thiserror::Error;

/// Reason an uploaded evidence artifact was rejected.
///
/// The `Display` output is the user-facing reason shown next to the
/// upload control, so the wording here is part of the contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvidenceRejection {
    #[error("must be PDF")]
    NotPdf {
        /// Lowercased extension that was offered; carried for callers
        /// that show it separately, not part of the displayed reason
        extension: String,
    },

    #[error("exceeds 5MB, actual is {} MB", format_mib(.size_bytes))]
    TooLarge { size_bytes: u64 },
}

/// Two-decimal MiB rendering used in rejection messages.
fn format_mib(size_bytes: &u64) -> String {
    format!("{:.2}", *size_bytes as f64 / (1024.0 * 1024.0))
}

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Unknown activity: {0}")]
    UnknownActivity(u32),

    #[error("Activity {0} is locked: complete the previous step first")]
    ActivityLocked(u32),

    #[error("Activity {0} has no accepted evidence")]
    NoEvidence(u32),

    #[error("Evidence rejected: {0}")]
    EvidenceRejected(#[from] EvidenceRejection),

    #[error("Stale progress record for {identity}: reload and retry")]
    VersionConflict { identity: String },

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Store error: {0}")]
    Store(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
