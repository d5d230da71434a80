//! Shared memory as an injected capability
//!
//! Sessions never reach for a global allocator. They are handed a
//! [`SharedMemoryProvider`] and get back a [`SharedHandle`], which owns one
//! attach and releases it on drop.

use std::path::PathBuf;

use crate::error::Result;

use super::config::{default_directory, RegionConfig};
use super::regions::SharedRegion;

/// One attach to a named region, as seen by the session layer
pub trait SharedMapping: Send + Sync + std::fmt::Debug {
    /// Start of the usable memory
    fn as_ptr(&self) -> *mut u8;
    /// Usable size in bytes
    fn len(&self) -> usize;
    fn key(&self) -> &str;
    /// Current number of attaches across all processes
    fn attach_count(&self) -> u32;
    /// Release this attach, returning the remaining count
    fn detach(&self) -> Result<u32>;
}

impl SharedMapping for SharedRegion {
    fn as_ptr(&self) -> *mut u8 {
        SharedRegion::as_ptr(self)
    }

    fn len(&self) -> usize {
        self.size()
    }

    fn key(&self) -> &str {
        SharedRegion::key(self)
    }

    fn attach_count(&self) -> u32 {
        SharedRegion::attach_count(self)
    }

    fn detach(&self) -> Result<u32> {
        SharedRegion::detach(self)
    }
}

/// Source of named cross-process memory
pub trait SharedMemoryProvider: Send + Sync {
    /// Attach to `key`, creating a zero-filled region of `size` bytes if no
    /// attach is currently live
    fn alloc(&self, key: &str, size: usize) -> Result<SharedAllocation>;
}

/// Result of [`SharedMemoryProvider::alloc`]
#[derive(Debug)]
pub struct SharedAllocation {
    pub handle: SharedHandle,
    /// Attach count including this attach
    pub attach_count: u32,
    /// True if another attach was live; the contents are then left untouched
    pub existed_already: bool,
}

/// Owned attach to a shared region; detaches on drop
#[derive(Debug)]
pub struct SharedHandle {
    mapping: Option<Box<dyn SharedMapping>>,
    ptr: *mut u8,
    len: usize,
}

// SAFETY: the mapping itself is Send + Sync; the cached pointer aliases it.
unsafe impl Send for SharedHandle {}
unsafe impl Sync for SharedHandle {}

impl SharedHandle {
    pub fn new(mapping: Box<dyn SharedMapping>) -> Self {
        let ptr = mapping.as_ptr();
        let len = mapping.len();
        Self {
            mapping: Some(mapping),
            ptr,
            len,
        }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn key(&self) -> &str {
        self.mapping.as_ref().map(|m| m.key()).unwrap_or("")
    }

    pub fn attach_count(&self) -> u32 {
        self.mapping.as_ref().map(|m| m.attach_count()).unwrap_or(0)
    }

    /// Detach now and report how many attaches remain
    pub fn free(mut self) -> Result<u32> {
        match self.mapping.take() {
            Some(mapping) => mapping.detach(),
            None => Ok(0),
        }
    }
}

impl Drop for SharedHandle {
    fn drop(&mut self) {
        if let Some(mapping) = self.mapping.take() {
            if let Err(e) = mapping.detach() {
                log::warn!("Failed to detach shared region {}: {}", mapping.key(), e);
            }
        }
    }
}

/// Provider backed by memory-mapped files, one per key
#[derive(Debug, Clone)]
pub struct FileBackedProvider {
    directory: PathBuf,
    permissions: u32,
}

impl Default for FileBackedProvider {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            permissions: 0o600,
        }
    }
}

impl FileBackedProvider {
    /// Keep backing files in `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Default::default()
        }
    }

    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn directory(&self) -> &std::path::Path {
        &self.directory
    }

    /// Region config for `key`, used by both alloc and diagnostics
    pub fn region_config(&self, key: &str, size: usize) -> RegionConfig {
        RegionConfig::new(key, size)
            .with_directory(self.directory.clone())
            .with_permissions(self.permissions)
    }
}

impl SharedMemoryProvider for FileBackedProvider {
    fn alloc(&self, key: &str, size: usize) -> Result<SharedAllocation> {
        let config = self.region_config(key, size);
        let (region, info) = SharedRegion::attach(&config)?;
        Ok(SharedAllocation {
            handle: SharedHandle::new(Box::new(region)),
            attach_count: info.attach_count,
            existed_already: info.existed_already,
        })
    }
}
