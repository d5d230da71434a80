//! Rainbow across all universes from a single process
//!
//! Runs against the in-memory display unless a TOML config path is given, in
//! which case the configured display (the console framebuffer on Linux) is used.
//!
//! ```text
//! cargo run --example color_cycle [config.toml]
//! ```

use gpuport::{GpuPort, GpuPortConfig, HeadlessBackend, NodeColor, Result};
use gpuport::memory::FileBackedProvider;
use smart_leds::hsv::{hsv2rgb, Hsv};

const FRAMES: u32 = 300;

fn main() -> Result<()> {
    env_logger::init();

    let mut port = match std::env::args().nth(1) {
        Some(path) => GpuPort::open(GpuPortConfig::from_file(path)?)?,
        None => {
            let config = GpuPortConfig::new("color_cycle", 8, 60);
            let backend = HeadlessBackend::new().with_pacing(true);
            GpuPort::construct(config, &FileBackedProvider::default(), backend)?
        }
    };

    println!("GpuPort color cycle");
    println!("===================");
    println!("  {:?}", port);
    println!("  Frame period: {:?}", port.frame_period());

    let universes = port.num_universes();
    let len = port.universe_len();
    let mask = port.all_universes_mask();

    for frame in 0..FRAMES {
        for universe in 0..universes {
            for node in 0..len {
                let hue = (frame as usize * 2 + node * 256 / len + universe * 8) as u8;
                let rgb = hsv2rgb(Hsv {
                    hue,
                    sat: 255,
                    val: 255,
                });
                if let Err(err) = port.set_pixel(universe, node, NodeColor::from(rgb)) {
                    err.log();
                }
            }
        }
        if !port.ready(mask)? {
            log::warn!("Frame {} was not shown", frame);
        }
        if frame % 60 == 59 {
            println!("  {}", port.stats().summary());
        }
    }

    println!("\nDone after {} frames", port.frame_count());
    Ok(())
}
