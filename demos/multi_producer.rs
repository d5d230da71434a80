//! One session shared by three processes
//!
//! The parent creates the session, so it owns the display and drives universe
//! 0. It then re-runs this binary twice as producers for universes 1-2 and 3.
//!
//! ```text
//! cargo run --example multi_producer
//! ```

use std::process::{Child, Command};
use std::time::Duration;

use gpuport::memory::FileBackedProvider;
use gpuport::{
    DisplaySurfaceConfig, GpuPort, GpuPortConfig, GpuPortError, HeadlessBackend, NodeColor, Result,
};

const SESSION: &str = "multi_producer_demo";
const FRAMES: u32 = 120;
const WAIT: Duration = Duration::from_secs(5);

fn session_config(mask: u32) -> GpuPortConfig {
    GpuPortConfig::new(SESSION, 4, 30)
        .with_owned_universes(mask)
        .with_display(DisplaySurfaceConfig::default())
}

fn attach(mask: u32) -> Result<GpuPort> {
    GpuPort::construct(
        session_config(mask),
        &FileBackedProvider::default(),
        HeadlessBackend::new().with_pacing(true),
    )
}

/// Fill our universes with `color` and take part in every frame
fn run_frames(port: &mut GpuPort, mask: u32, color: NodeColor) -> Result<()> {
    for frame in 0..FRAMES {
        let level = (frame * 255 / FRAMES) as u8;
        let shaded = NodeColor::from_argb(0xFF, color.r().min(level), color.g().min(level), color.b().min(level));
        if let Err(err) = port.fill(shaded, None) {
            err.log();
        }
        if !port.ready_timeout(mask, WAIT)? {
            return Err(GpuPortError::platform(format!(
                "attach {} gave up at frame {}",
                port.attach_id(),
                frame
            )));
        }
    }
    Ok(())
}

fn spawn_producer(mask: u32) -> Result<Child> {
    let exe = std::env::current_exe()?;
    Ok(Command::new(exe).arg("producer").arg(mask.to_string()).spawn()?)
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("producer") {
        let mask: u32 = args
            .next()
            .and_then(|m| m.parse().ok())
            .ok_or_else(|| GpuPortError::config("producer needs a universe mask"))?;
        let mut port = attach(mask)?;
        let color = if mask & 0b0110 != 0 { NodeColor::GREEN } else { NodeColor::BLUE };
        return run_frames(&mut port, mask, color);
    }

    let mut owner = attach(0b0001)?;
    if !owner.is_owner() {
        return Err(GpuPortError::session_mismatch(format!(
            "session {} is already running",
            SESSION
        )));
    }
    println!("Owner attached, starting producers");

    let children = [spawn_producer(0b0110)?, spawn_producer(0b1000)?];
    run_frames(&mut owner, 0b0001, NodeColor::RED)?;

    for mut child in children {
        let status = child.wait()?;
        println!("Producer exited with {}", status);
    }
    println!("{}", owner.stats().summary());
    Ok(())
}
