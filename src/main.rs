use std::env;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use twinchip::cpu::ProcessorId;
use twinchip::debug_flags;
use twinchip::debugger::{Action, DebugCommand, Debugger};
use twinchip::demo;
use twinchip::display::{DisplaySink, FrameCapture};
use twinchip::memory::load_memory_map;
use twinchip::rom::load_rom_image;
use twinchip::{Machine, Profile};

// PPU code runs alone this long before the host touches the tables.
const WARM_UP_T_STATES: u32 = 60;

const USAGE: &str = "Usage: twinchip --ppu-rom PATH [--cpu-rom PATH] [--mem-map PATH] \
[--revised] [--debug] [--frames N] [--window] [--main-stack-guard HEX]";

#[derive(Debug, Default)]
struct Options {
    ppu_rom: PathBuf,
    cpu_rom: Option<PathBuf>,
    mem_map: Option<PathBuf>,
    revised: bool,
    debug: bool,
    frames: Option<u64>,
    window: bool,
    main_stack_guard: Option<u32>,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();
    let mut ppu_rom = None;
    let mut i = 0;
    while i < args.len() {
        let value = |i: usize| {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} requires a value", args[i]))
        };
        match args[i].as_str() {
            "--ppu-rom" => {
                ppu_rom = Some(PathBuf::from(value(i)?));
                i += 2;
            }
            "--cpu-rom" => {
                options.cpu_rom = Some(PathBuf::from(value(i)?));
                i += 2;
            }
            "--mem-map" => {
                options.mem_map = Some(PathBuf::from(value(i)?));
                i += 2;
            }
            "--frames" => {
                let v = value(i)?;
                options.frames = Some(v.parse().map_err(|_| format!("--frames: bad count '{}'", v))?);
                i += 2;
            }
            "--main-stack-guard" => {
                let v = value(i)?;
                let digits = v.trim_start_matches("0x");
                options.main_stack_guard =
                    Some(u32::from_str_radix(digits, 16).map_err(|_| format!("--main-stack-guard: bad address '{}'", v))?);
                i += 2;
            }
            "--revised" => {
                options.revised = true;
                i += 1;
            }
            "--debug" => {
                options.debug = true;
                i += 1;
            }
            "--window" => {
                options.window = true;
                i += 1;
            }
            other => return Err(format!("Unknown option: {}", other)),
        }
    }
    options.ppu_rom = ppu_rom.ok_or_else(|| "--ppu-rom is required".to_string())?;
    Ok(options)
}

enum Output {
    Headless(FrameCapture),
    #[cfg(feature = "window")]
    Window(twinchip::window::SdlWindow),
}

impl Output {
    fn open(options: &Options, profile: &Profile) -> Self {
        if options.window {
            #[cfg(feature = "window")]
            {
                match twinchip::window::SdlWindow::open(profile, "twinchip") {
                    Ok(window) => return Output::Window(window),
                    Err(e) => log::warn!("Window creation failed ({}). Falling back to headless.", e),
                }
            }
            #[cfg(not(feature = "window"))]
            log::warn!(
                "Built without the window feature; running headless ({}x{})",
                profile.frame.visible_width,
                profile.frame.visible_height
            );
        }
        Output::Headless(FrameCapture::new())
    }

    fn sink(&mut self) -> &mut dyn DisplaySink {
        match self {
            Output::Headless(capture) => capture,
            #[cfg(feature = "window")]
            Output::Window(window) => window,
        }
    }

    fn closed(&self) -> bool {
        match self {
            Output::Headless(_) => false,
            #[cfg(feature = "window")]
            Output::Window(window) => window.closed(),
        }
    }
}

fn build_machine(options: &Options) -> Result<Machine, Box<dyn Error>> {
    let mut profile = if options.revised {
        Profile::revised()
    } else {
        Profile::classic()
    };
    if let Some(guard) = options.main_stack_guard {
        profile.stack_guards.main = Some(guard);
    }

    let map = options.mem_map.as_deref().map(load_memory_map).transpose()?;
    let mut machine = Machine::new(profile, map.as_deref())?;

    let image = load_rom_image(&options.ppu_rom, machine.profile().layout.code_rom_len)?;
    machine.load_ppu_rom(&image);
    if let Some(path) = &options.cpu_rom {
        let capacity = machine
            .space(ProcessorId::Main)
            .first_rom()
            .map_or(0, |(_, len)| len);
        let image = load_rom_image(path, capacity)?;
        machine.load_main_rom(&image);
    }

    machine.warm_up(WARM_UP_T_STATES);
    demo::install(&mut machine);
    Ok(machine)
}

fn run(options: &Options) -> Result<(), Box<dyn Error>> {
    let mut machine = build_machine(options)?;
    let mut output = Output::open(options, machine.profile());
    let mut debugger = Debugger::new(options.debug);

    if !debug_flags::quiet() {
        println!("Starting emulation");
    }
    drive(
        &mut machine,
        &mut output,
        &mut debugger,
        options.frames,
        &mut io::stdin().lock(),
        &mut io::stdout(),
    )?;

    log::info!(
        "Stopped after {} ticks, {} frames, {} anomalies",
        machine.ticks(),
        machine.frames_presented(),
        machine.anomaly_count()
    );
    Ok(())
}

/// Ticks the machine until the frame limit, a closed window, end of input or
/// a quit command, prompting whenever the debugger asks for a command.
fn drive(
    machine: &mut Machine,
    output: &mut Output,
    debugger: &mut Debugger,
    frames: Option<u64>,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<(), Box<dyn Error>> {
    loop {
        // Anomalies are logged when reported; the queue only holds copies.
        machine.take_anomalies();
        if frames.is_some_and(|n| machine.frames_presented() >= n) || output.closed() {
            break;
        }
        if debugger.wants_input() {
            write!(out, "{}> ", debugger.prompt(machine))?;
            out.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            match debugger.execute(DebugCommand::parse(&line), machine, out)? {
                Action::Prompt => continue,
                Action::Quit => break,
                Action::Tick => {}
            }
        }
        let report = machine.tick(output.sink())?;
        debugger.after_tick(machine, &report);
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("{}", USAGE);
        return;
    }
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("{}", msg);
            eprintln!("{}", USAGE);
            process::exit(2);
        }
    };

    if let Err(e) = run(&options) {
        log::error!("{}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> Machine {
        let mut machine = Machine::new(Profile::classic(), None).unwrap();
        // loop: LD A,1 ; LD (0x0100),A ; JR loop
        machine.load_ppu_rom(&[0x3E, 0x01, 0x32, 0x00, 0x01, 0x18, 0xF9]);
        machine
    }

    fn session(machine: &mut Machine, commands: &str) -> String {
        let mut output = Output::Headless(FrameCapture::new());
        let mut debugger = Debugger::new(true);
        let mut out = Vec::new();
        drive(machine, &mut output, &mut debugger, None, &mut commands.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_args() {
        let args: Vec<String> = ["--ppu-rom", "ppu.bin", "--revised", "--frames", "3", "--main-stack-guard", "0xC000"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let options = parse_args(&args).unwrap();
        assert_eq!(options.ppu_rom, PathBuf::from("ppu.bin"));
        assert!(options.revised);
        assert_eq!(options.frames, Some(3));
        assert_eq!(options.main_stack_guard, Some(0xC000));

        assert!(parse_args(&["--revised".to_string()]).is_err());
        assert!(parse_args(&["--ppu-rom".to_string()]).is_err());
        assert!(parse_args(&["--bogus".to_string()]).is_err());
    }

    #[test]
    fn test_anomaly_queue_drained_between_commands() {
        let mut machine = machine();
        let text = session(&mut machine, "zap\nzap\nj6\nq\n");
        assert_eq!(text.matches("Unrecognised command").count(), 2);
        // Two bad commands plus a ROM write every third tick.
        assert_eq!(machine.anomaly_count(), 4);
        assert!(machine.take_anomalies().is_empty());
    }

    #[test]
    fn test_end_of_input_stops_the_session() {
        let mut machine = machine();
        session(&mut machine, "j2\n");
        assert_eq!(machine.ticks(), 2);
        assert!(machine.take_anomalies().is_empty());
    }
}
