//! File-backed shared region with a cross-process attach count

use std::{
    fs::{File, OpenOptions},
    os::fd::{AsRawFd, RawFd},
    os::unix::fs::{MetadataExt, OpenOptionsExt},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};

use memmap2::{MmapMut, MmapOptions};
use nix::fcntl::{flock, FlockArg};

use crate::error::{GpuPortError, Result};

use super::config::RegionConfig;

/// Magic number marking an initialized region prefix
const REGION_MAGIC: u64 = 0x4750_5052_4547_4E31; // "GPPREGN1"

/// Bytes reserved in front of the user area
pub const REGION_PREFIX_SIZE: usize = 64;

/// Attach bookkeeping stored in front of the user area.
/// Only modified while the backing file is exclusively locked.
#[repr(C, align(64))]
struct RegionPrefix {
    magic: AtomicU64,
    size: AtomicU64,
    attach_count: AtomicU32,
}

/// Outcome of attaching to a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachInfo {
    /// Attach count including this attach
    pub attach_count: u32,
    /// False if this attach created the region (count went 0 -> 1)
    pub existed_already: bool,
}

/// Exclusive `flock` held for the lifetime of the guard
struct FileLock {
    fd: RawFd,
}

impl FileLock {
    fn acquire(file: &File) -> Result<Self> {
        let fd = file.as_raw_fd();
        flock(fd, FlockArg::LockExclusive)
            .map_err(|e| GpuPortError::platform(format!("Failed to lock region file: {}", e)))?;
        Ok(Self { fd })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = flock(self.fd, FlockArg::Unlock);
    }
}

/// A mapped shared region.
///
/// The same key maps the same file in every process. The attach count lives in
/// the file itself, so reference counting works across unrelated processes;
/// the last detach removes the file.
#[derive(Debug)]
pub struct SharedRegion {
    key: String,
    path: PathBuf,
    size: usize,
    base: *mut u8,
    _mmap: MmapMut,
    file: File,
}

// SAFETY: the mapping is process-wide and all shared bookkeeping is atomic.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Attach to the region named by `config`, creating it if needed.
    ///
    /// A creator gets a zero-filled user area. Attaching to an existing
    /// region never touches its contents.
    pub fn attach(config: &RegionConfig) -> Result<(Self, AttachInfo)> {
        config.validate()?;
        let path = config.file_path();
        let total = REGION_PREFIX_SIZE + config.size;

        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .mode(config.permissions)
                .open(&path)
                .map_err(|e| GpuPortError::from_io(e, "Failed to create/open region file"))?;

            let lock = FileLock::acquire(&file)?;

            // The last detacher may have unlinked this inode while we waited
            if !Self::still_linked(&file, &path)? {
                drop(lock);
                continue;
            }

            let len = file
                .metadata()
                .map_err(|e| GpuPortError::from_io(e, "Failed to stat region file"))?
                .len() as usize;
            if len < total {
                file.set_len(total as u64)
                    .map_err(|e| GpuPortError::from_io(e, "Failed to set region size"))?;
            }

            let mut mmap = unsafe {
                MmapOptions::new()
                    .len(total)
                    .map_mut(&file)
                    .map_err(|e| GpuPortError::from_io(e, "Failed to create memory mapping"))?
            };
            let base = mmap.as_mut_ptr();

            let region = Self {
                key: config.key.clone(),
                path: path.clone(),
                size: config.size,
                base,
                _mmap: mmap,
                file,
            };

            let info = region.register_attach(config.size)?;
            drop(lock);

            log::debug!(
                "Attached region {:?} ({} bytes), attach count {}, existed {}",
                region.path,
                region.size,
                info.attach_count,
                info.existed_already
            );
            return Ok((region, info));
        }
    }

    fn still_linked(file: &File, path: &Path) -> Result<bool> {
        let opened = file
            .metadata()
            .map_err(|e| GpuPortError::from_io(e, "Failed to stat region file"))?;
        match std::fs::metadata(path) {
            Ok(current) => Ok(current.ino() == opened.ino() && current.dev() == opened.dev()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GpuPortError::from_io(e, "Failed to stat region path")),
        }
    }

    fn prefix(&self) -> &RegionPrefix {
        unsafe { &*(self.base as *const RegionPrefix) }
    }

    /// Must be called with the file lock held
    fn register_attach(&self, size: usize) -> Result<AttachInfo> {
        let prefix = self.prefix();
        let prior = prefix.attach_count.load(Ordering::Acquire);
        let existed = prior > 0 && prefix.magic.load(Ordering::Acquire) == REGION_MAGIC;

        if existed {
            let existing = prefix.size.load(Ordering::Relaxed) as usize;
            if existing < size {
                return Err(GpuPortError::memory(format!(
                    "Region {} holds {} bytes, {} requested",
                    self.key, existing, size
                )));
            }
        } else {
            // Stale contents from a crashed session are discarded
            unsafe {
                std::ptr::write_bytes(self.base.add(REGION_PREFIX_SIZE), 0, size);
            }
            prefix.size.store(size as u64, Ordering::Relaxed);
            prefix.magic.store(REGION_MAGIC, Ordering::Release);
        }

        let count = if existed { prior + 1 } else { 1 };
        prefix.attach_count.store(count, Ordering::Release);

        Ok(AttachInfo {
            attach_count: count,
            existed_already: existed,
        })
    }

    /// Drop this attach. Returns the remaining attach count; at zero the
    /// backing file is removed.
    pub fn detach(&self) -> Result<u32> {
        let _lock = FileLock::acquire(&self.file)?;
        let prefix = self.prefix();
        let remaining = prefix.attach_count.load(Ordering::Acquire).saturating_sub(1);
        prefix.attach_count.store(remaining, Ordering::Release);

        if remaining == 0 {
            prefix.magic.store(0, Ordering::Release);
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(GpuPortError::from_io(e, "Failed to remove region file")),
            }
            log::debug!("Released region {:?}", self.path);
        }
        Ok(remaining)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Usable size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Start of the user area
    pub fn as_ptr(&self) -> *mut u8 {
        unsafe { self.base.add(REGION_PREFIX_SIZE) }
    }

    pub fn attach_count(&self) -> u32 {
        self.prefix().attach_count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_attach_detach_counts() {
        let dir = TempDir::new().unwrap();
        let config = RegionConfig::new("regions_unit", 256).with_directory(dir.path());

        let (first, info) = SharedRegion::attach(&config).unwrap();
        assert_eq!(info, AttachInfo { attach_count: 1, existed_already: false });

        let (second, info) = SharedRegion::attach(&config).unwrap();
        assert_eq!(info, AttachInfo { attach_count: 2, existed_already: true });
        assert_eq!(first.attach_count(), 2);

        assert_eq!(second.detach().unwrap(), 1);
        assert!(first.path().exists());
        assert_eq!(first.detach().unwrap(), 0);
        assert!(!first.path().exists());
    }

    #[test]
    fn test_creator_sees_zeroed_memory() {
        let dir = TempDir::new().unwrap();
        let config = RegionConfig::new("regions_zero", 128).with_directory(dir.path());
        let (region, _) = SharedRegion::attach(&config).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(region.as_ptr(), region.size()) };
        assert!(bytes.iter().all(|&b| b == 0));
        region.detach().unwrap();
    }
}
