//! Error kinds for the Librarian query pipeline.
//!
//! Every recoverable kind is surfaced to the caller through a disclosure
//! tag rather than a panic; only the kinds marked fatal below unwind
//! the call.

use thiserror::Error;

/// Primary error type for the retrieval engine and its collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An LLM or embedding provider could not be reached.
    ///
    /// Local recovery when the requirement was `optional` (caller emits a
    /// `*_unavailable` disclosure and degrades); fatal when `required`.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A provider responded, but its output could not be parsed or was
    /// structurally invalid (wrong JSON shape, dimension mismatch, ...).
    #[error("provider returned invalid output: {0}")]
    ProviderInvalidOutput(String),

    /// A transient storage failure (busy/locked) that `attempt_storage_recovery`
    /// may resolve with at most one retry.
    #[error("storage busy: {0}")]
    StorageRecoverable(String),

    /// A non-recoverable storage failure: schema mismatch, corrupted file, I/O.
    #[error("storage error: {0}")]
    StorageFatal(String),

    /// The Freshness Gate determined the index must be rebuilt before the
    /// query can be served with confidence.
    #[error("bootstrap required: {0}")]
    BootstrapRequired(String),

    /// The index is usable but degraded (stale watcher, git lag); callers
    /// that are not strict may still be served, with disclosures attached.
    #[error("freshness degraded: {0}")]
    FreshnessDegraded(String),

    /// Malformed caller input: bad depth, invalid filter, bad observer.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation was cancelled or exceeded its deadline.
    #[error("cancelled or timed out: {0}")]
    Cancelled(String),

    /// Programmer error: a code path the design asserts cannot occur.
    #[error("unreachable: {0}")]
    Unreachable(String),
}

impl Error {
    /// The disclosure tag this error contributes to a response envelope.
    /// Every recoverable kind appears exactly once in `disclosures`
    /// under a stable name.
    pub fn disclosure_tag(&self) -> String {
        match self {
            Error::ProviderUnavailable(_) => "provider_unavailable".to_string(),
            Error::ProviderInvalidOutput(_) => "provider_invalid_output".to_string(),
            Error::StorageRecoverable(_) => "unverified_by_trace(storage_recoverable)".to_string(),
            Error::StorageFatal(_) => "storage_fatal".to_string(),
            Error::BootstrapRequired(_) => "bootstrap_required".to_string(),
            Error::FreshnessDegraded(_) => "unverified_by_trace(freshness_degraded)".to_string(),
            Error::InvalidInput(_) => "invalid_input".to_string(),
            Error::Cancelled(_) => "unverified_by_trace(cancelled)".to_string(),
            Error::Unreachable(_) => "internal_error".to_string(),
        }
    }

    /// Whether this kind is fatal to the call (vs. locally recoverable
    /// or surfaced via disclosures on a still-served response).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::StorageFatal(_) | Error::InvalidInput(_) | Error::Unreachable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ProviderInvalidOutput(format!("json: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageFatal(format!("io: {}", err))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        let transient = matches!(
            &err,
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
        );
        if transient {
            Error::StorageRecoverable(err.to_string())
        } else {
            Error::StorageFatal(err.to_string())
        }
    }
}
