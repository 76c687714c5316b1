//! Catalog Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// Validation and permission failures are raised before anything is written.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Malformed caller input: a bad field name, an empty id, and so on.
    #[display("invalid input: {_0}")]
    Validation(#[error(not(source))] String),
    #[display("add-on already exists: {_0}")]
    DuplicateAddon(#[error(not(source))] String),
    /// The uploaded file identifier is already used by some revision.
    #[display("revision already exists: {_0}")]
    DuplicateRevision(#[error(not(source))] String),
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// A storage call failed. Re-read state before retrying.
    #[display("database error")]
    Persistence,
    /// The filesystem step of a cache clear failed; the index was not touched.
    #[display("could not clear the cache directory")]
    CacheClear,
    #[display("add-on not found: {_0}")]
    AddonNotFound(#[error(not(source))] String),
    #[display("revision {_1} of add-on {_0} not found")]
    RevisionNotFound(String, u32),
    #[display("database migration error")]
    Migration,
    /// A stored row could not be converted into its model.
    #[display("invalid catalog data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence | Self::CacheClear)
    }
}
