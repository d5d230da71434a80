//! Error types and handling for GpuPort
//!
//! Two channels are kept apart. [`GpuPortError`] carries fatal failures
//! (construction, shared memory, display open, bit timing) and is returned
//! through [`Result`]. [`SoftError`] describes recoverable conditions that are
//! either handed back from the non-blocking write paths or logged and counted
//! while a frame is being produced.

/// Result type alias for fatal GpuPort operations
pub type Result<T> = std::result::Result<T, GpuPortError>;

/// Fatal errors: the detecting call fails and the caller decides whether to abort
#[derive(Debug, thiserror::Error)]
pub enum GpuPortError {
    /// I/O related errors (backing files, device nodes, mmap)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Shared memory allocation or mapping failures
    #[error("Memory error: {message}")]
    Memory { message: String },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Requested geometry is larger than the compiled or display bound
    #[error("Geometry exceeded: {what} is {requested}, limit {limit}")]
    GeometryExceeded {
        what: String,
        requested: usize,
        limit: usize,
    },

    /// Display timing cannot reproduce the WS281X bit timing
    #[error("Bit timing violated: {message}")]
    BitTiming { message: String },

    /// The display surface could not be opened
    #[error("Display open failed: {message}")]
    DisplayOpen { message: String },

    /// The display is in a different mode than configured
    #[error("Display mode mismatch: {message}")]
    ModeMismatch { message: String },

    /// An existing session was created with different geometry
    #[error("Session mismatch: {message}")]
    SessionMismatch { message: String },

    /// Configuration file could not be loaded
    #[error("Config error: {message}")]
    Config { message: String },

    /// Platform-specific errors
    #[error("Platform error: {message}")]
    Platform { message: String },
}

impl GpuPortError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a memory error
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a geometry exceeded error
    pub fn geometry_exceeded(what: impl Into<String>, requested: usize, limit: usize) -> Self {
        Self::GeometryExceeded {
            what: what.into(),
            requested,
            limit,
        }
    }

    /// Create a bit timing error
    pub fn bit_timing(message: impl Into<String>) -> Self {
        Self::BitTiming {
            message: message.into(),
        }
    }

    /// Create a display open error
    pub fn display_open(message: impl Into<String>) -> Self {
        Self::DisplayOpen {
            message: message.into(),
        }
    }

    /// Create a mode mismatch error
    pub fn mode_mismatch(message: impl Into<String>) -> Self {
        Self::ModeMismatch {
            message: message.into(),
        }
    }

    /// Create a session mismatch error
    pub fn session_mismatch(message: impl Into<String>) -> Self {
        Self::SessionMismatch {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for GpuPortError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<nix::Error> for GpuPortError {
    fn from(err: nix::Error) -> Self {
        Self::platform(format!("System call failed: {}", err))
    }
}

impl From<toml::de::Error> for GpuPortError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("TOML parse error: {}", err))
    }
}

/// Recoverable conditions; never abort a session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SoftError {
    /// Coordinates outside the node buffer
    #[error("Out of range: universe {universe}, node {node} (buffer is {num_universes} x {universe_len})")]
    OutOfRange {
        universe: usize,
        node: usize,
        num_universes: usize,
        universe_len: usize,
    },

    /// Vsync unavailable; pacing fell back to sleeping one frame period
    #[error("Missed vsync: {message}")]
    MissedVsync { message: String },

    /// A frame could not be presented and was dropped
    #[error("Present failed for frame {frame}: {message}")]
    PresentFailed { frame: u32, message: String },

    /// A caller-imposed deadline expired
    #[error("Timed out after {waited_ms} ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },
}

impl SoftError {
    /// Create an out of range error
    pub fn out_of_range(
        universe: usize,
        node: usize,
        num_universes: usize,
        universe_len: usize,
    ) -> Self {
        Self::OutOfRange {
            universe,
            node,
            num_universes,
            universe_len,
        }
    }

    /// Log this condition; soft errors never propagate further than the log
    pub fn log(&self) {
        log::warn!("{}", self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = GpuPortError::memory("Out of memory");
        assert!(matches!(err, GpuPortError::Memory { .. }));

        let err = GpuPortError::geometry_exceeded("universe_len", 4096, 2048);
        assert!(matches!(err, GpuPortError::GeometryExceeded { .. }));

        let err = GpuPortError::bit_timing("slice too short");
        assert!(matches!(err, GpuPortError::BitTiming { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = GpuPortError::geometry_exceeded("universe_len", 4096, 2048);
        let display = format!("{}", err);
        assert!(display.contains("universe_len"));
        assert!(display.contains("4096"));
        assert!(display.contains("2048"));
    }

    #[test]
    fn test_soft_error_display() {
        let err = SoftError::out_of_range(30, 2, 24, 100);
        let display = format!("{}", err);
        assert!(display.contains("universe 30"));
        assert!(display.contains("24 x 100"));
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such device");
        let err: GpuPortError = io.into();
        match err {
            GpuPortError::Io { source, .. } => assert!(source.is_some()),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
