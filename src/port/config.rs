//! Configuration for a GpuPort session

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use std::time::Duration;

use crate::color::{BlendMode, NodeColor, DEFAULT_BRIGHTNESS_CEILING, FULL_BRIGHTNESS};
use crate::display::DisplaySurfaceConfig;
use crate::encoder::{BitTiming, Protocol};
use crate::error::{GpuPortError, Result};
use crate::layout::{MAX_UNIVERSES, MAX_UNIVERSE_LEN};
use crate::sync::SyncPolicy;

/// What `fill`/`set_pixel` do with coordinates outside the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangePolicy {
    /// Reject the call with `SoftError::OutOfRange`
    Strict,
    /// Write the in-range part and log a warning
    #[default]
    ClipWithWarning,
    /// Write the in-range part quietly
    SilentClip,
}

/// Rectangle of cells addressed by `fill`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub universes: Range<usize>,
    /// Node positions; `None` covers the whole universe
    pub nodes: Option<Range<usize>>,
}

impl Region {
    pub fn new(universes: Range<usize>, nodes: Range<usize>) -> Self {
        Self {
            universes,
            nodes: Some(nodes),
        }
    }

    /// Every node of one universe
    pub fn universe(universe: usize) -> Self {
        Self {
            universes: universe..universe + 1,
            nodes: None,
        }
    }

    /// Every node of a range of universes
    pub fn universes(universes: Range<usize>) -> Self {
        Self {
            universes,
            nodes: None,
        }
    }
}

/// Configuration for constructing a [`GpuPort`](super::GpuPort)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuPortConfig {
    /// Names the shared session; every process using the same key joins it
    pub session_key: String,
    pub num_universes: usize,
    pub universe_len: usize,
    pub protocol: Protocol,
    /// Swap red and green on the wire for GRB strips
    pub rg_swap: bool,
    /// Color a new session starts with
    pub init_color: NodeColor,
    /// Universes this attach writes; the default region for `fill`
    pub owned_universes: Option<u32>,
    /// How `fill` and `set_pixel` combine with the cells they write
    pub blend_mode: BlendMode,
    pub out_of_range: OutOfRangePolicy,
    pub sync_policy: SyncPolicy,
    /// Upper bound on R+G+B per node
    pub brightness_ceiling: u32,
    /// Encode from the dirty-row pivot cache instead of a full gather
    pub use_pivot: bool,
    /// How long a later attacher waits for the creator to publish the session
    pub attach_timeout_ms: u64,
    pub display: DisplaySurfaceConfig,
}

impl Default for GpuPortConfig {
    fn default() -> Self {
        let display = DisplaySurfaceConfig::default();
        Self {
            session_key: "gpuport".to_string(),
            num_universes: MAX_UNIVERSES,
            universe_len: display.v_visible as usize,
            protocol: Protocol::Ws281x,
            rg_swap: false,
            init_color: NodeColor::BLACK,
            owned_universes: None,
            blend_mode: BlendMode::default(),
            out_of_range: OutOfRangePolicy::default(),
            sync_policy: SyncPolicy::default(),
            brightness_ceiling: DEFAULT_BRIGHTNESS_CEILING,
            use_pivot: true,
            attach_timeout_ms: 2000,
            display,
        }
    }
}

impl GpuPortConfig {
    /// Create a new session configuration
    pub fn new(session_key: impl Into<String>, num_universes: usize, universe_len: usize) -> Self {
        Self {
            session_key: session_key.into(),
            num_universes,
            universe_len,
            ..Default::default()
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_rg_swap(mut self, rg_swap: bool) -> Self {
        self.rg_swap = rg_swap;
        self
    }

    pub fn with_init_color(mut self, color: NodeColor) -> Self {
        self.init_color = color;
        self
    }

    pub fn with_owned_universes(mut self, mask: u32) -> Self {
        self.owned_universes = Some(mask);
        self
    }

    pub fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    pub fn with_out_of_range(mut self, policy: OutOfRangePolicy) -> Self {
        self.out_of_range = policy;
        self
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    pub fn with_brightness_ceiling(mut self, ceiling: u32) -> Self {
        self.brightness_ceiling = ceiling;
        self
    }

    pub fn with_pivot(mut self, use_pivot: bool) -> Self {
        self.use_pivot = use_pivot;
        self
    }

    pub fn with_attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_display(mut self, display: DisplaySurfaceConfig) -> Self {
        self.display = display;
        self
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }

    /// Mask with a bit for every universe in the session
    pub fn all_universes_mask(&self) -> u32 {
        if self.num_universes >= 32 {
            u32::MAX
        } else {
            (1u32 << self.num_universes) - 1
        }
    }

    /// Parse a configuration from TOML; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GpuPortError::from_io(e, &format!("Failed to read {}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Validate the configuration and derive the bit timing.
    ///
    /// Touches neither shared memory nor the display.
    pub fn validate(&self) -> Result<BitTiming> {
        if self.session_key.is_empty() {
            return Err(GpuPortError::invalid_parameter(
                "session_key",
                "Session key cannot be empty",
            ));
        }
        if self.num_universes == 0 || self.universe_len == 0 {
            return Err(GpuPortError::invalid_parameter(
                "geometry",
                "Universe count and length must be greater than 0",
            ));
        }
        if self.num_universes > MAX_UNIVERSES {
            return Err(GpuPortError::geometry_exceeded(
                "num_universes",
                self.num_universes,
                MAX_UNIVERSES,
            ));
        }
        if self.universe_len > MAX_UNIVERSE_LEN {
            return Err(GpuPortError::geometry_exceeded(
                "universe_len",
                self.universe_len,
                MAX_UNIVERSE_LEN,
            ));
        }
        if let Some(owned) = self.owned_universes {
            if owned & !self.all_universes_mask() != 0 {
                return Err(GpuPortError::invalid_parameter(
                    "owned_universes",
                    format!(
                        "mask {:#x} names universes beyond {}",
                        owned, self.num_universes
                    ),
                ));
            }
        }
        if self.brightness_ceiling == 0 || self.brightness_ceiling > FULL_BRIGHTNESS {
            return Err(GpuPortError::invalid_parameter(
                "brightness_ceiling",
                format!("must be within 1..={}", FULL_BRIGHTNESS),
            ));
        }

        let timing = BitTiming::from_config(&self.display)?;
        if self.universe_len > timing.max_universe_len() {
            return Err(GpuPortError::geometry_exceeded(
                "universe_len",
                self.universe_len,
                timing.max_universe_len(),
            ));
        }
        Ok(timing)
    }
}
