//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate returns [`Result`]. Variants map
//! onto the kinds enumerated in the error-handling design: each carries an
//! HTTP-like `status` and a stable `code` so that an out-of-scope transport
//! layer can translate failures without this crate depending on anything
//! HTTP-shaped.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Unparseable select, unknown variable, malformed `where` pattern.
    InvalidQuery(String),
    /// Unknown auth identity or malformed credential.
    InvalidAuth(String),
    /// DB root missing for the requested block/t/instant.
    Unavailable(String),
    /// Node id referenced by a branch could not be resolved.
    StorageError(String),
    /// Deadline exceeded on a read, query, or sync wait.
    Timeout(String),
    /// No healthy server reachable before the backoff ceiling.
    ConnectionError(String),
    /// Invariant violation; the accompanying payload is a diagnostic dump.
    UnexpectedError(String),
    /// Transaction rejected, e.g. idempotent resubmission at the same `t`.
    InvalidTx(String),
    /// Underlying filesystem / OS error, wrapped at the Store boundary.
    Io(String),
    /// Serde capability failed to encode or decode a blob.
    Codec(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP-like status code for callers that need one (the core itself
    /// never depends on an HTTP crate).
    pub fn status(&self) -> u16 {
        match self {
            Error::InvalidQuery(_) => 400,
            Error::InvalidAuth(_) => 401,
            Error::Unavailable(_) => 404,
            Error::StorageError(_) => 500,
            Error::Timeout(_) => 408,
            Error::ConnectionError(_) => 500,
            Error::UnexpectedError(_) => 500,
            Error::InvalidTx(_) => 400,
            Error::Io(_) => 500,
            Error::Codec(_) => 500,
        }
    }

    /// Stable symbolic code, suitable for machine matching across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidQuery(_) => "invalid-query",
            Error::InvalidAuth(_) => "invalid-auth",
            Error::Unavailable(_) => "unavailable",
            Error::StorageError(_) => "storage-error",
            Error::Timeout(_) => "timeout",
            Error::ConnectionError(_) => "connection-error",
            Error::UnexpectedError(_) => "unexpected-error",
            Error::InvalidTx(_) => "invalid-tx",
            Error::Io(_) => "io-error",
            Error::Codec(_) => "codec-error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidQuery(msg) => write!(f, "invalid-query: {}", msg),
            Error::InvalidAuth(msg) => write!(f, "invalid-auth: {}", msg),
            Error::Unavailable(msg) => write!(f, "unavailable: {}", msg),
            Error::StorageError(msg) => write!(f, "storage-error: {}", msg),
            Error::Timeout(msg) => write!(f, "timeout: {}", msg),
            Error::ConnectionError(msg) => write!(f, "connection-error: {}", msg),
            Error::UnexpectedError(msg) => write!(f, "unexpected-error: {}", msg),
            Error::InvalidTx(msg) => write!(f, "invalid-tx: {}", msg),
            Error::Io(msg) => write!(f, "io-error: {}", msg),
            Error::Codec(msg) => write!(f, "codec-error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Codec(err.to_string())
    }
}

impl From<std::sync::mpsc::RecvTimeoutError> for Error {
    fn from(err: std::sync::mpsc::RecvTimeoutError) -> Error {
        Error::Timeout(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Error {
        Error::Codec(err.to_string())
    }
}
