//! Path utilities for soundboard applications.

use std::io;
use std::path::PathBuf;

/// Default base configuration directory name.
pub const DEFAULT_BASE_DIR: &str = ".soundboard";

/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Provides access to the soundboard directory structure.
#[derive(Debug, Clone)]
pub struct Paths {
    /// User's home directory.
    pub home_dir: PathBuf,
}

impl Paths {
    /// Resolves paths under the current user's home directory.
    pub fn new() -> io::Result<Self> {
        let home_dir = dirs::home_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "could not find home directory")
        })?;
        Ok(Self { home_dir })
    }

    /// Returns the base directory (~/.soundboard).
    pub fn base_dir(&self) -> PathBuf {
        self.home_dir.join(DEFAULT_BASE_DIR)
    }

    /// Returns the config file path (~/.soundboard/config.yaml).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir().join(DEFAULT_CONFIG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_structure() {
        let paths = Paths {
            home_dir: PathBuf::from("/home/dj"),
        };

        assert_eq!(paths.base_dir(), PathBuf::from("/home/dj/.soundboard"));
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/home/dj/.soundboard/config.yaml")
        );
    }
}
