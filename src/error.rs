//! Binary Error Types

use addons_catalog::error::Error as CatalogError;
use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("could not install the log subscriber")]
    Telemetry,
    #[display("could not open the cache directory")]
    Storage,
    #[display("catalog operation failed")]
    Catalog { retryable: bool },
    /// Arguments that parse but make no sense together.
    #[display("{_0}")]
    Usage(#[error(not(source))] String),
}

impl ErrorKind {
    /// Wrap a catalog error, keeping its error tree as a child and whether
    /// running the command again might succeed.
    #[track_caller]
    pub fn catalog(err: CatalogError) -> Error {
        let retryable = err.is_retryable();
        err.raise(ErrorKind::Catalog { retryable })
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Catalog { retryable: true })
    }
}
