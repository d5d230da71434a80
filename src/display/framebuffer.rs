//! Linux console framebuffer surface
//!
//! The video mode itself (pixel clock, porches) is set outside this crate,
//! e.g. with `fbset` or a DPI overlay. Opening only verifies the visible
//! resolution and depth match what the encoder was built for.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use memmap2::{MmapMut, MmapOptions};

use crate::error::{GpuPortError, Result, SoftError};

use super::{DisplayBackend, DisplaySurface, DisplaySurfaceConfig, PixelRegion, SleepPacer};

/// Device used when the config does not name one
pub const DEFAULT_FB_DEVICE: &str = "/dev/fb0";

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

/// `struct fb_var_screeninfo` from `<linux/fb.h>`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

/// `struct fb_fix_screeninfo` from `<linux/fb.h>`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

nix::ioctl_read_bad!(fbioget_vscreeninfo, 0x4600, FbVarScreeninfo);
nix::ioctl_read_bad!(fbioget_fscreeninfo, 0x4602, FbFixScreeninfo);
nix::ioctl_write_ptr!(fbio_waitforvsync, b'F', 0x20, u32);

impl FbVarScreeninfo {
    /// Pixel clock in Hz, if the driver reports one
    fn pixel_clock_hz(&self) -> Option<u64> {
        (self.pixclock != 0).then(|| 1_000_000_000_000u64 / self.pixclock as u64)
    }

    fn h_total(&self) -> u32 {
        self.xres + self.left_margin + self.right_margin + self.hsync_len
    }

    fn v_total(&self) -> u32 {
        self.yres + self.upper_margin + self.lower_margin + self.vsync_len
    }
}

/// Opens [`FramebufferSurface`]s on a framebuffer device
#[derive(Debug, Clone, Default)]
pub struct FramebufferBackend {
    device: Option<PathBuf>,
}

impl FramebufferBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the device named in the display config
    pub fn with_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.device = Some(device.into());
        self
    }
}

impl DisplayBackend for FramebufferBackend {
    fn open(&mut self, config: &DisplaySurfaceConfig) -> Result<Box<dyn DisplaySurface>> {
        let path = self
            .device
            .clone()
            .or_else(|| config.device.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FB_DEVICE));
        Ok(Box::new(FramebufferSurface::open(path, config)?))
    }

    fn name(&self) -> &'static str {
        "framebuffer"
    }
}

/// Memory-mapped `/dev/fbN`
#[derive(Debug)]
pub struct FramebufferSurface {
    path: PathBuf,
    file: File,
    mmap: Option<MmapMut>,
    region: PixelRegion,
    vsync_supported: bool,
    pacer: SleepPacer,
}

impl FramebufferSurface {
    pub fn open(path: PathBuf, config: &DisplaySurfaceConfig) -> Result<Self> {
        config.validate()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    GpuPortError::display_open(format!("{}: device not found", path.display()))
                }
                ErrorKind::PermissionDenied => {
                    GpuPortError::display_open(format!("{}: permission denied", path.display()))
                }
                _ => GpuPortError::from_io(e, "Failed to open framebuffer"),
            })?;

        let fd = file.as_raw_fd();
        let mut var = FbVarScreeninfo::default();
        let mut fix = FbFixScreeninfo::default();
        unsafe {
            fbioget_vscreeninfo(fd, &mut var).map_err(|e| {
                GpuPortError::display_open(format!("FBIOGET_VSCREENINFO failed: {}", e))
            })?;
            fbioget_fscreeninfo(fd, &mut fix).map_err(|e| {
                GpuPortError::display_open(format!("FBIOGET_FSCREENINFO failed: {}", e))
            })?;
        }

        Self::check_mode(&var, config)?;

        let len = Self::check_memory(&var, &fix)?;
        let height = var.yres as usize;
        let line_length = fix.line_length as usize;

        let mmap = unsafe {
            MmapOptions::new()
                .len(len)
                .map_mut(&file)
                .map_err(|e| GpuPortError::from_io(e, "Failed to map framebuffer"))?
        };

        log::info!(
            "Opened framebuffer {} ({}x{}, pitch {} bytes)",
            path.display(),
            var.xres,
            var.yres,
            line_length
        );

        Ok(Self {
            path,
            file,
            mmap: Some(mmap),
            region: PixelRegion {
                width: var.xres as usize,
                height,
                pitch: line_length / 4,
            },
            vsync_supported: true,
            pacer: SleepPacer::new(config.frame_period()),
        })
    }

    /// Bytes to map: every row must hold `xres` pixels and fit video memory
    fn check_memory(var: &FbVarScreeninfo, fix: &FbFixScreeninfo) -> Result<usize> {
        let height = var.yres as usize;
        let line_length = fix.line_length as usize;
        if line_length % 4 != 0 || line_length / 4 < var.xres as usize {
            return Err(GpuPortError::mode_mismatch(format!(
                "line length {} bytes cannot hold {} 32-bit pixels",
                line_length, var.xres
            )));
        }
        let len = line_length * height;
        if len > fix.smem_len as usize {
            return Err(GpuPortError::mode_mismatch(format!(
                "line length {} x {} rows does not fit {} bytes of video memory",
                line_length, height, fix.smem_len
            )));
        }
        Ok(len)
    }

    fn check_mode(var: &FbVarScreeninfo, config: &DisplaySurfaceConfig) -> Result<()> {
        if var.bits_per_pixel != 32 {
            return Err(GpuPortError::mode_mismatch(format!(
                "{} bits per pixel, 32 required",
                var.bits_per_pixel
            )));
        }
        if var.xres != config.h_visible || var.yres != config.v_visible {
            return Err(GpuPortError::mode_mismatch(format!(
                "display is {}x{}, configured for {}x{}",
                var.xres, var.yres, config.h_visible, config.v_visible
            )));
        }
        if let Some(clock) = var.pixel_clock_hz() {
            let drift = (clock as f64 - config.pixel_clock_hz as f64).abs() / config.pixel_clock_hz as f64;
            if drift > 0.01 || var.h_total() != config.h_total || var.v_total() != config.v_total {
                log::warn!(
                    "Framebuffer timing {} Hz {}x{} differs from configured {} Hz {}x{}",
                    clock,
                    var.h_total(),
                    var.v_total(),
                    config.pixel_clock_hz,
                    config.h_total,
                    config.v_total
                );
            }
        }
        Ok(())
    }
}

impl DisplaySurface for FramebufferSurface {
    fn pixel_region(&self) -> PixelRegion {
        self.region
    }

    fn present(&mut self, pixels: &[u32]) -> Result<()> {
        let PixelRegion { width, height, pitch } = self.region;
        if pixels.len() != width * height {
            return Err(GpuPortError::invalid_parameter(
                "pixels",
                format!("frame has {} pixels, surface needs {}", pixels.len(), width * height),
            ));
        }
        let mmap = self
            .mmap
            .as_mut()
            .ok_or_else(|| GpuPortError::platform(format!("{} is closed", self.path.display())))?;

        let dst = mmap.as_mut_ptr() as *mut u32;
        for (row, src) in pixels.chunks_exact(width).enumerate() {
            // SAFETY: the mapping holds `height` rows of `pitch` u32s and is page aligned
            unsafe {
                std::ptr::copy_nonoverlapping(src.as_ptr(), dst.add(row * pitch), width);
            }
        }
        self.vsync()
    }

    fn vsync(&mut self) -> Result<()> {
        if self.vsync_supported {
            let screen: u32 = 0;
            match unsafe { fbio_waitforvsync(self.file.as_raw_fd(), &screen) } {
                Ok(_) => return Ok(()),
                Err(e) => {
                    SoftError::MissedVsync {
                        message: format!(
                            "{}: FBIO_WAITFORVSYNC unsupported ({}), pacing by sleep",
                            self.path.display(),
                            e
                        ),
                    }
                    .log();
                    self.vsync_supported = false;
                }
            }
        }
        self.pacer.wait();
        Ok(())
    }

    fn close(&mut self) {
        if self.mmap.take().is_some() {
            log::debug!("Closed framebuffer {}", self.path.display());
        }
    }
}

impl Drop for FramebufferSurface {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_is_fatal() {
        let mut backend = FramebufferBackend::new().with_device("/nonexistent/fb9");
        let Err(err) = backend.open(&DisplaySurfaceConfig::default()) else {
            panic!("opened a missing framebuffer device");
        };
        assert!(matches!(err, GpuPortError::DisplayOpen { .. }));
    }

    #[test]
    fn test_memory_check() {
        let var = FbVarScreeninfo {
            xres: 1562,
            yres: 1111,
            bits_per_pixel: 32,
            ..Default::default()
        };
        let mut fix = FbFixScreeninfo {
            line_length: 1568 * 4,
            smem_len: 1568 * 4 * 1111,
            ..Default::default()
        };
        assert_eq!(FramebufferSurface::check_memory(&var, &fix).unwrap(), 1568 * 4 * 1111);

        // Rows shorter than the visible width
        fix.line_length = 1500 * 4;
        assert!(matches!(
            FramebufferSurface::check_memory(&var, &fix),
            Err(GpuPortError::ModeMismatch { .. })
        ));

        fix.line_length = 1562 * 4 + 2;
        assert!(FramebufferSurface::check_memory(&var, &fix).is_err());

        fix.line_length = 1568 * 4;
        fix.smem_len = 1568 * 4 * 1000;
        assert!(FramebufferSurface::check_memory(&var, &fix).is_err());
    }

    #[test]
    fn test_mode_check() {
        let config = DisplaySurfaceConfig::default();
        let mut var = FbVarScreeninfo {
            xres: 1562,
            yres: 1111,
            bits_per_pixel: 32,
            ..Default::default()
        };
        assert!(FramebufferSurface::check_mode(&var, &config).is_ok());

        var.bits_per_pixel = 16;
        assert!(matches!(
            FramebufferSurface::check_mode(&var, &config),
            Err(GpuPortError::ModeMismatch { .. })
        ));

        var.bits_per_pixel = 32;
        var.yres = 1080;
        assert!(FramebufferSurface::check_mode(&var, &config).is_err());
    }
}
