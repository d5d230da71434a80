//! Configuration types for shared session regions

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GpuPortError, Result};

/// Prefix for backing file names
pub const REGION_FILE_PREFIX: &str = "gpuport_";

/// Directory used when none is configured: tmpfs where available
pub fn default_directory() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if cfg!(target_os = "linux") && shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// Configuration for attaching to a named shared region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Session key; the same key names the same memory in every process
    pub key: String,
    /// Usable size of the region in bytes
    pub size: usize,
    /// Directory holding the backing file
    pub directory: Option<PathBuf>,
    /// Permissions for a newly created backing file (Unix permissions)
    pub permissions: u32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            size: 0,
            directory: None,
            permissions: 0o600,
        }
    }
}

impl RegionConfig {
    /// Create a new region configuration
    pub fn new(key: impl Into<String>, size: usize) -> Self {
        Self {
            key: key.into(),
            size,
            ..Default::default()
        }
    }

    /// Set the directory holding the backing file
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Set the permissions for the backing file
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(GpuPortError::invalid_parameter(
                "key",
                "Session key cannot be empty",
            ));
        }

        if self
            .key
            .chars()
            .any(|c| c == '/' || c == '\0' || c.is_whitespace())
        {
            return Err(GpuPortError::invalid_parameter(
                "key",
                format!("Session key {:?} must not contain '/', NUL or whitespace", self.key),
            ));
        }

        if self.size == 0 {
            return Err(GpuPortError::invalid_parameter(
                "size",
                "Region size must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Path of the backing file for this key
    pub fn file_path(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(default_directory)
            .join(format!("{}{}", REGION_FILE_PREFIX, self.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_config_builder() {
        let config = RegionConfig::new("lights", 4096)
            .with_directory("/tmp/x")
            .with_permissions(0o644);
        assert_eq!(config.key, "lights");
        assert_eq!(config.size, 4096);
        assert_eq!(config.permissions, 0o644);
        assert_eq!(config.file_path(), PathBuf::from("/tmp/x/gpuport_lights"));
    }

    #[test]
    fn test_region_config_validation() {
        let mut config = RegionConfig::default();
        assert!(config.validate().is_err());

        config.key = "a/b".to_string();
        assert!(config.validate().is_err());

        config.key = "ok".to_string();
        assert!(config.validate().is_err());

        config.size = 64;
        assert!(config.validate().is_ok());
    }
}
