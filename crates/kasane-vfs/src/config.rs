//! File system configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```toml
//! copy_buffer_size = 65536
//! replica_dir = "/var/tmp/kasane"
//! read_only = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};

/// Default buffer size for content copies.
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Settings for a [`crate::FileSystem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Buffer size used when streaming content between files.
    pub copy_buffer_size: usize,
    /// Where replicas are materialized; the system temp dir when unset.
    pub replica_dir: Option<PathBuf>,
    /// Treat every file as read-only regardless of what the backend says.
    pub read_only: bool,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            replica_dir: None,
            read_only: false,
        }
    }
}

impl VfsConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> VfsResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| VfsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> VfsResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> VfsResult<()> {
        if self.copy_buffer_size == 0 {
            return Err(VfsError::Config(
                "copy_buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the copy buffer size.
    pub fn with_copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = size;
        self
    }

    /// Set the replica directory.
    pub fn with_replica_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.replica_dir = Some(dir.into());
        self
    }

    /// Set the read-only override.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}
