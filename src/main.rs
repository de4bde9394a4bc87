//! v4l2-camera binary: list a device's capabilities or grab frames from it.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use v4l2_camera::{list_devices, FourCC, Format, Interval, V4l2Camera};

/// Capture frames from a V4L2 device
#[derive(Parser)]
#[command(name = "v4l2-camera")]
#[command(version)]
struct Args {
    /// Device node to open
    #[arg(short, long, default_value = "/dev/video0")]
    device: PathBuf,

    /// Requested frame width (0 keeps the driver's current width)
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Requested frame height (0 keeps the driver's current height)
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Pixel format code, e.g. YUYV or MJPG
    #[arg(long, default_value = "YUYV")]
    fourcc: FourCC,

    /// Requested frame rate (0 keeps the driver's current rate)
    #[arg(long, default_value_t = 0)]
    fps: u32,

    /// Number of frames to capture
    #[arg(short = 'n', long, default_value_t = 10)]
    frames: u32,

    /// Per-frame wait in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Write the last frame here (PPM for YUYV, raw bytes otherwise)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print devices, formats and controls instead of capturing
    #[arg(short, long)]
    list: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(&args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let env = env_logger::Env::default().default_filter_or(if verbose { "debug" } else { "info" });
    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    if args.list {
        for node in list_devices() {
            println!(
                "{}: {}",
                node.path.display(),
                node.name.as_deref().unwrap_or("(unnamed)")
            );
        }
    }

    let mut camera = V4l2Camera::open(&args.device)?;
    camera.initialize()?;

    if let Some(caps) = camera.capabilities() {
        println!("Device: {}", caps.card);
        println!("Driver: {} ({})", caps.driver, caps.bus_info);
    }

    if args.list {
        print_listing(&mut camera)?;
        camera.close()?;
        return Ok(());
    }

    let format = Format::new(args.width, args.height, args.fourcc)
        .with_interval(Interval::from_fps(args.fps));
    camera.configure(format)?;
    println!("Format: {}", camera.format());

    camera.start()?;
    let timeout = Duration::from_millis(args.timeout_ms);
    let mut captured = 0;
    while captured < args.frames {
        if !camera.wait_and_capture(timeout)? {
            eprintln!("no frame within {timeout:?}");
            break;
        }
        captured += 1;
        let meta = camera.frame_metadata();
        println!(
            "Frame {}: {} bytes, timestamp: {:?}",
            meta.sequence, meta.bytes_used, meta.timestamp
        );
    }

    if captured > 0 {
        if let Some(path) = &args.output {
            save_frame(&camera, path)?;
            println!("Saved {}", path.display());
        }
    }

    camera.stop()?;
    camera.close()?;
    Ok(())
}

fn print_listing(camera: &mut V4l2Camera) -> v4l2_camera::Result<()> {
    println!("Current: {}", camera.get_format()?);

    println!("Pixel formats:");
    for desc in camera.list_pixel_formats() {
        let mut notes = String::new();
        if desc.compressed {
            notes.push_str(" compressed");
        }
        if desc.emulated {
            notes.push_str(" emulated");
        }
        println!("  [{}] {} '{}'{notes}", desc.index, desc.fourcc, desc.description);
    }

    println!("Frame formats:");
    for format in camera.list_formats() {
        println!("  {format}");
    }

    println!("Controls:");
    for control in camera.list_controls() {
        println!(
            "  0x{:08x} {:<32} {:<8} min={} max={} step={} default={}",
            control.id,
            control.name,
            control.kind.name(),
            control.minimum,
            control.maximum,
            control.step,
            control.default_value
        );
        for entry in &control.menu {
            println!("      {}: {:?}", entry.index, entry.item);
        }
    }
    Ok(())
}

fn save_frame(camera: &V4l2Camera, path: &Path) -> Result<(), Box<dyn Error>> {
    if camera.format().fourcc == FourCC::YUYV {
        let rgb = camera.frame_rgb()?;
        let mut ppm = format!("P6\n{} {}\n255\n", camera.width(), camera.height()).into_bytes();
        ppm.extend_from_slice(&rgb);
        fs::write(path, ppm)?;
    } else {
        fs::write(path, camera.frame())?;
    }
    Ok(())
}
