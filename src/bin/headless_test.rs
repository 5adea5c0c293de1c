//! Runs the demo scene for a fixed number of frames without a window and
//! optionally writes the last frame as a PPM.
//!
//! Usage: headless_test PPU_ROM [--revised] [--frames N] [--ppm PATH]

use std::env;
use std::path::PathBuf;
use std::process;

use twinchip::demo;
use twinchip::display::FrameCapture;
use twinchip::rom::load_rom_image;
use twinchip::{Machine, Profile};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut rom: Option<PathBuf> = None;
    let mut revised = false;
    let mut frames: u64 = 3;
    let mut ppm: Option<PathBuf> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--revised" => revised = true,
            "--frames" => {
                i += 1;
                frames = match args.get(i).and_then(|s| s.parse().ok()) {
                    Some(n) => n,
                    None => {
                        eprintln!("--frames requires a count");
                        process::exit(2);
                    }
                };
            }
            "--ppm" => {
                i += 1;
                ppm = args.get(i).map(PathBuf::from);
            }
            s if s.starts_with('-') => {
                eprintln!("Unknown option: {}", s);
                process::exit(2);
            }
            s => rom = Some(PathBuf::from(s)),
        }
        i += 1;
    }

    let profile = if revised { Profile::revised() } else { Profile::classic() };
    let mut machine = match Machine::new(profile, None) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    let Some(path) = rom else {
        eprintln!("Usage: headless_test PPU_ROM [--revised] [--frames N] [--ppm PATH]");
        process::exit(2);
    };
    match load_rom_image(&path, machine.profile().layout.code_rom_len) {
        Ok(image) => {
            machine.load_ppu_rom(&image);
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
    demo::install(&mut machine);

    let mut capture = FrameCapture::new();
    while capture.frames < frames {
        if let Err(e) = machine.tick(&mut capture) {
            eprintln!("{}", e);
            process::exit(1);
        }
    }

    let nonzero = capture.pixels.iter().filter(|&&p| p != 0).count();
    println!(
        "HEADLESS: {} frames, {} ticks, {} anomalies, {}x{} frame with {} lit pixels",
        capture.frames,
        machine.ticks(),
        machine.take_anomalies().len(),
        capture.width,
        capture.height,
        nonzero
    );
    if let Some(path) = ppm {
        if let Err(e) = std::fs::write(&path, capture.to_ppm()) {
            eprintln!("Couldn't write {}: {}", path.display(), e);
            process::exit(1);
        }
        println!("Wrote {}", path.display());
    }
}
