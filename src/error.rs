//! Error types
//!
//! Every fallible operation in the crate returns [`Error`], which pairs an
//! [`ErrorKind`] with optional diagnostic context. The kind is what callers
//! branch on; the context is only there for logging.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = core::result::Result<T, Error>;

/// Classification of every failure the engine can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// File missing, unreadable, short, or with an invalid size
    InvalidFile,
    /// Buffer reservation failed
    AllocFail,
    /// Name is not a known secure boot variable
    InvalidVariableName,
    /// Certificate or PKCS#7 blob could not be parsed or failed structural checks
    CertFail,
    /// ESL or authentication descriptor violates its layout invariants
    MalformedInput,
    /// No authority certificate verifies the update
    SignatureMismatch,
    /// Timestamp is not calendar-legal or does not advance
    BadTimestamp,
    /// Command line could not be parsed
    ArgParseFail,
    /// Subcommand is unknown or unsupported by the active backend
    UnknownCommand,
    /// Platform backend could not be identified
    BackendIdFail,
}

impl ErrorKind {
    /// Process exit code for this kind (success is 0)
    pub const fn exit_code(self) -> i32 {
        match self {
            ErrorKind::InvalidFile => 1,
            ErrorKind::AllocFail => 2,
            ErrorKind::InvalidVariableName => 3,
            ErrorKind::CertFail => 4,
            ErrorKind::MalformedInput => 5,
            ErrorKind::SignatureMismatch => 6,
            ErrorKind::BadTimestamp => 7,
            ErrorKind::ArgParseFail => 8,
            ErrorKind::UnknownCommand => 9,
            ErrorKind::BackendIdFail => 10,
        }
    }
}

/// Errors returned by the secure variable engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid file {path}: {reason}")]
    InvalidFile { path: PathBuf, reason: String },

    #[error("i/o error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to allocate {0} bytes")]
    AllocFail(usize),

    #[error("unknown secure variable '{0}'")]
    InvalidVariableName(String),

    #[error("certificate error: {0}")]
    CertFail(String),

    #[error("malformed {field} at offset {offset}")]
    MalformedInput { offset: usize, field: &'static str },

    #[error("no authority certificate verifies the update to {0}")]
    SignatureMismatch(String),

    #[error("bad timestamp: {0}")]
    BadTimestamp(String),

    #[error("argument error: {0}")]
    ArgParseFail(String),

    #[error("unsupported command: {0}")]
    UnknownCommand(String),

    #[error("could not identify backend: {0}")]
    BackendIdFail(String),
}

impl Error {
    /// The kind of failure, for exit codes and matching
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidFile { .. } | Error::Io { .. } => ErrorKind::InvalidFile,
            Error::AllocFail(_) => ErrorKind::AllocFail,
            Error::InvalidVariableName(_) => ErrorKind::InvalidVariableName,
            Error::CertFail(_) => ErrorKind::CertFail,
            Error::MalformedInput { .. } => ErrorKind::MalformedInput,
            Error::SignatureMismatch(_) => ErrorKind::SignatureMismatch,
            Error::BadTimestamp(_) => ErrorKind::BadTimestamp,
            Error::ArgParseFail(_) => ErrorKind::ArgParseFail,
            Error::UnknownCommand(_) => ErrorKind::UnknownCommand,
            Error::BackendIdFail(_) => ErrorKind::BackendIdFail,
        }
    }

    pub(crate) fn malformed(offset: usize, field: &'static str) -> Self {
        Error::MalformedInput { offset, field }
    }

    pub(crate) fn invalid_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allocate a zeroed buffer of `len` bytes, reporting exhaustion as `AllocFail`
pub(crate) fn try_alloc(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::AllocFail(len))?;
    buf.resize(len, 0);
    Ok(buf)
}
