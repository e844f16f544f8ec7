use std::fmt;

/// Result type for fray-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the engine layer. Lookup errors are
/// returned verbatim to callers; create-if-missing is always explicit.
#[derive(Debug)]
pub enum Error {
    /// Reference did not resolve
    NotFound(String),

    /// Reference resolved to more than one entity
    Ambiguous(String),

    /// Token shape is not a legal reference, or an operation argument is
    /// missing/malformed (e.g. an agent edit without a reason)
    InvalidInput(String),

    /// Claim already held, thread depth exceeded, or similar contention
    Conflict(String),

    /// Store layer error
    Store(fray_store::Error),

    /// Cache layer error
    Index(fray_index::Error),

    /// Project layout / discovery error
    Project(fray_core::Error),

    /// IO operation failed
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Ambiguous(msg) => write!(f, "Ambiguous: {}", msg),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Error::Store(err) => write!(f, "Store error: {}", err),
            Error::Index(err) => write!(f, "Cache error: {}", err),
            Error::Project(err) => write!(f, "{}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err),
            Error::Index(err) => Some(err),
            Error::Project(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::NotFound(_)
            | Error::Ambiguous(_)
            | Error::InvalidInput(_)
            | Error::Conflict(_) => None,
        }
    }
}

impl From<fray_store::Error> for Error {
    fn from(err: fray_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<fray_index::Error> for Error {
    fn from(err: fray_index::Error) -> Self {
        Error::Index(err)
    }
}

impl From<fray_core::Error> for Error {
    fn from(err: fray_core::Error) -> Self {
        Error::Project(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Index(fray_index::Error::Database(err))
    }
}
