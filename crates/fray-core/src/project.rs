use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// No `.fray` marker found between the start directory and the root.
    NoProject(PathBuf),
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::NoProject(start) => write!(
                f,
                "No fray channel found from {} (run `fray new` to create one)",
                start.display()
            ),
            Error::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::NoProject(_) | Error::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// Marker directory that makes a directory tree a fray channel.
pub const FRAY_DIR: &str = ".fray";

/// Discover the project root by walking from `start` toward the filesystem
/// root until a `.fray` directory is found.
pub fn discover_project(start: &Path) -> Result<PathBuf> {
    let mut current = if start.is_absolute() {
        start.to_path_buf()
    } else {
        std::env::current_dir()?.join(start)
    };

    loop {
        if current.join(FRAY_DIR).is_dir() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(Error::NoProject(start.to_path_buf()));
        }
    }
}

pub fn fray_dir(project_root: &Path) -> PathBuf {
    project_root.join(FRAY_DIR)
}

pub fn shared_dir(project_root: &Path) -> PathBuf {
    fray_dir(project_root).join("shared")
}

pub fn local_dir(project_root: &Path) -> PathBuf {
    fray_dir(project_root).join("local")
}

/// Global (per-user) config directory: `<config dir>/fray`, falling back to
/// `$HOME/.fray` on systems without a standard config directory.
pub fn global_config_dir() -> Result<PathBuf> {
    if let Some(config_dir) = dirs::config_dir() {
        return Ok(config_dir.join("fray"));
    }
    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".fray"));
    }
    Err(Error::Config(
        "Could not determine config directory: no HOME or system config directory found"
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover_from_project_root() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(FRAY_DIR)).unwrap();

        let found = discover_project(temp.path()).unwrap();
        assert_eq!(found, temp.path());
    }

    #[test]
    fn test_discover_from_nested_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(FRAY_DIR)).unwrap();
        let nested = temp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let found = discover_project(&nested).unwrap();
        assert_eq!(found, temp.path());
    }

    #[test]
    fn test_discover_fails_without_marker() {
        let temp = TempDir::new().unwrap();
        let result = discover_project(temp.path());
        assert!(matches!(result, Err(Error::NoProject(_))));
    }

    #[test]
    fn test_marker_file_does_not_count() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(FRAY_DIR), "not a dir").unwrap();
        assert!(discover_project(temp.path()).is_err());
    }
}
