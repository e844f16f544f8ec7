use std::fmt;

/// Result type for fray-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Engine layer error
    Engine(fray_engine::Error),

    /// Store layer error
    Store(fray_store::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Driver spawn or monitor failure
    Supervision(String),

    /// Hosted sync transport failure (after retries)
    Network(String),

    /// Sync setup precondition failed
    Sync(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Engine(err) => write!(f, "{}", err),
            Error::Store(err) => write!(f, "Store error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Supervision(msg) => write!(f, "Supervision error: {}", msg),
            Error::Network(msg) => write!(f, "Network error: {}", msg),
            Error::Sync(msg) => write!(f, "Sync error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Engine(err) => Some(err),
            Error::Store(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Config(_) | Error::Supervision(_) | Error::Network(_) | Error::Sync(_) => None,
        }
    }
}

impl From<fray_engine::Error> for Error {
    fn from(err: fray_engine::Error) -> Self {
        Error::Engine(err)
    }
}

impl From<fray_store::Error> for Error {
    fn from(err: fray_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<fray_index::Error> for Error {
    fn from(err: fray_index::Error) -> Self {
        Error::Engine(fray_engine::Error::Index(err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}
