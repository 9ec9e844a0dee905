//! Error taxonomy shared across the engine and backends.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure an engine operation can surface. The first five
/// variants are client-visible outcomes with fixed HTTP statuses;
/// `Backend` covers blob-store and index-store failures.
#[derive(Debug, Error)]
pub enum Error {
    /// No document or directory at the requested path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The write would make a path both a document and a directory.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An `If-Match`/`If-None-Match` precondition did not hold.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The request carried an unusable `Content-Type`.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The request itself is malformed (bad path, `Content-Range`, ...).
    #[error("unsupported request: {0}")]
    UnsupportedRequest(String),

    /// A backend failed; the client only learns that the server erred.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl Error {
    /// Wraps any backend error.
    pub fn backend(err: impl Into<anyhow::Error>) -> Error {
        Error::Backend(err.into())
    }

    /// The HTTP status code this error maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::PreconditionFailed(_) => 412,
            Error::UnsupportedMediaType(_) => 415,
            Error::UnsupportedRequest(_) => 400,
            Error::Backend(_) => 500,
        }
    }
}
