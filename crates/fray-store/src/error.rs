use std::fmt;
use std::path::PathBuf;

/// Result type for fray-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the store layer
#[derive(Debug)]
pub enum Error {
    /// IO operation failed (open, extend, lock)
    Io(std::io::Error),

    /// Record serialization failed
    Serde(serde_json::Error),

    /// Identity / sequence bookkeeping failed
    Identity(fray_core::Error),

    /// Migration precondition failed
    Migration(String),

    /// Caller misuse of the store surface
    Invalid(String),

    /// Expected layout element missing
    MissingLayout(PathBuf),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Serde(err) => write!(f, "Record error: {}", err),
            Error::Identity(err) => write!(f, "Machine identity error: {}", err),
            Error::Migration(msg) => write!(f, "Migration error: {}", msg),
            Error::Invalid(msg) => write!(f, "Invalid store operation: {}", msg),
            Error::MissingLayout(path) => {
                write!(f, "Missing store layout element: {}", path.display())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Serde(err) => Some(err),
            Error::Identity(err) => Some(err),
            Error::Migration(_) | Error::Invalid(_) | Error::MissingLayout(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}

impl From<fray_core::Error> for Error {
    fn from(err: fray_core::Error) -> Self {
        Error::Identity(err)
    }
}
