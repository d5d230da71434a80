//! Named shared memory regions
//!
//! Provides the cross-process memory a session lives in:
//! - `config`: region configuration
//! - `regions`: file-backed mapping with a locked attach count
//! - `provider`: the injectable provider trait and owned handles

pub mod config;
pub mod provider;
pub mod regions;

pub use config::{default_directory, RegionConfig};
pub use provider::{
    FileBackedProvider, SharedAllocation, SharedHandle, SharedMapping, SharedMemoryProvider,
};
pub use regions::{AttachInfo, SharedRegion, REGION_PREFIX_SIZE};
