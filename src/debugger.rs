//! Interactive debugger primitives. The REPL in `main.rs` reads lines, hands
//! them to [`DebugCommand::parse`] and lets [`Debugger`] act on the machine.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::cpu::{describe_flags, ProcessorId};
use crate::error::Anomaly;
use crate::machine::{Machine, TickReport};
use crate::ppu::Section;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugCommand {
    /// Empty line: execute one tick.
    Step,
    Continue,
    WaitFor(Section),
    Registers,
    Flags,
    Stack,
    Trace,
    Skip(u32),
    UntilPc(u16),
    Inspect(u16),
    DumpFrame,
    SwitchFocus,
    Checkpoint,
    RestoreCheckpoint,
    Quit,
    Unknown(String),
}

fn parse_hex(text: &str) -> Option<u16> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).ok()
}

impl DebugCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let unknown = || DebugCommand::Unknown(line.to_string());
        match line {
            "" => DebugCommand::Step,
            "c" => DebugCommand::Continue,
            "h" => DebugCommand::WaitFor(Section::Hblank),
            "v" => DebugCommand::WaitFor(Section::Vblank),
            "d" => DebugCommand::WaitFor(Section::Display),
            "dv" => DebugCommand::DumpFrame,
            "r" => DebugCommand::Registers,
            "f" => DebugCommand::Flags,
            "s" => DebugCommand::Stack,
            "t" => DebugCommand::Trace,
            "x" => DebugCommand::SwitchFocus,
            "k" => DebugCommand::Checkpoint,
            "K" => DebugCommand::RestoreCheckpoint,
            "q" => DebugCommand::Quit,
            _ => {
                let mut chars = line.chars();
                let head = chars.next();
                let rest = chars.as_str();
                if rest.is_empty() {
                    return unknown();
                }
                match head {
                    Some('j') => match rest.trim().parse::<u32>() {
                        Ok(n) if n > 0 => DebugCommand::Skip(n),
                        _ => unknown(),
                    },
                    Some('w') => parse_hex(rest).map_or_else(unknown, DebugCommand::UntilPc),
                    Some('m') => parse_hex(rest).map_or_else(unknown, DebugCommand::Inspect),
                    _ => unknown(),
                }
            }
        }
    }
}

/// How the driver loop advances between prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Interactive,
    Continue,
    WaitSection(Section),
    Skip(u32),
    UntilPc(u16),
}

/// What the driver should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run one tick, then consult the debugger again.
    Tick,
    /// Read another command.
    Prompt,
    Quit,
}

pub struct Debugger {
    mode: RunMode,
    focus: ProcessorId,
    checkpoint: Option<Snapshot>,
    vram_path: PathBuf,
}

impl Debugger {
    pub fn new(interactive: bool) -> Self {
        Self {
            mode: if interactive {
                RunMode::Interactive
            } else {
                RunMode::Continue
            },
            focus: ProcessorId::Ppu,
            checkpoint: None,
            vram_path: PathBuf::from("vram.log"),
        }
    }

    pub fn with_vram_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.vram_path = path.into();
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn focus(&self) -> ProcessorId {
        self.focus
    }

    pub fn wants_input(&self) -> bool {
        self.mode == RunMode::Interactive
    }

    /// Prompt line: focused processor, PC and the bytes at PC.
    pub fn prompt(&self, machine: &Machine) -> String {
        let pc = machine.pc(self.focus);
        let bytes: Vec<String> = (0..4u16)
            .map(|i| format!("{:02x}", machine.peek(self.focus, pc.wrapping_add(i))))
            .collect();
        format!("{} PC {:x} ({})", self.focus, pc, bytes.join(" "))
    }

    /// Acts on one command. Any pending wait is replaced.
    pub fn execute(&mut self, cmd: DebugCommand, machine: &mut Machine, out: &mut dyn Write) -> io::Result<Action> {
        machine.scheduler_mut().cancel_wait();
        let focus = self.focus;
        match cmd {
            DebugCommand::Step => return Ok(Action::Tick),
            DebugCommand::Continue => {
                writeln!(out, "Continuing")?;
                self.mode = RunMode::Continue;
                return Ok(Action::Tick);
            }
            DebugCommand::WaitFor(section) => {
                writeln!(out, "Waiting until {}", section)?;
                machine.scheduler_mut().wait_for(section);
                self.mode = RunMode::WaitSection(section);
                return Ok(Action::Tick);
            }
            DebugCommand::Skip(n) => {
                writeln!(out, "Executing {} instructions", n)?;
                self.mode = RunMode::Skip(n);
                return Ok(Action::Tick);
            }
            DebugCommand::UntilPc(pc) => {
                writeln!(out, "Skipping to {:x}", pc)?;
                self.mode = RunMode::UntilPc(pc);
                return Ok(Action::Tick);
            }
            DebugCommand::Registers => writeln!(out, "{}", machine.registers(focus))?,
            DebugCommand::Flags => writeln!(out, "{}", describe_flags(machine.flags(focus)))?,
            DebugCommand::Stack => {
                writeln!(out, "Stack:")?;
                for slot in machine.stack_dump(focus) {
                    match slot.pushed_by {
                        Some(pc) => writeln!(out, "\t{} (pushed by {:x})", slot.value, pc)?,
                        None => writeln!(out, "\t{}", slot.value)?,
                    }
                }
            }
            DebugCommand::Trace => {
                writeln!(out, "Stack trace:")?;
                for line in machine.trace(focus) {
                    writeln!(out, "{}", line)?;
                }
            }
            DebugCommand::Inspect(addr) => {
                writeln!(out, "Byte at addr {:x} is {}", addr, machine.peek(focus, addr))?;
            }
            DebugCommand::DumpFrame => match self.dump_frame(machine) {
                Ok(()) => writeln!(out, "Framebuffer written to {}", self.vram_path.display())?,
                Err(e) => writeln!(out, "Couldn't write {}: {}", self.vram_path.display(), e)?,
            },
            DebugCommand::SwitchFocus => {
                self.focus = focus.other();
                writeln!(out, "Debugging {}", self.focus)?;
            }
            DebugCommand::Checkpoint => match machine.snapshot() {
                Ok(snapshot) => {
                    writeln!(out, "Checkpoint taken at tick {} ({} bytes)", machine.ticks(), snapshot.len())?;
                    self.checkpoint = Some(snapshot);
                }
                Err(e) => writeln!(out, "{}", e)?,
            },
            DebugCommand::RestoreCheckpoint => match &self.checkpoint {
                Some(snapshot) => match machine.restore(snapshot) {
                    Ok(()) => writeln!(out, "Restored checkpoint from tick {}", machine.ticks())?,
                    Err(e) => writeln!(out, "{}", e)?,
                },
                None => writeln!(out, "No checkpoint")?,
            },
            DebugCommand::Quit => return Ok(Action::Quit),
            DebugCommand::Unknown(text) => {
                machine.report_anomaly(Anomaly::UnknownCommand(text));
                writeln!(out, "Unrecognised command")?;
            }
        }
        Ok(Action::Prompt)
    }

    /// Updates the run mode after a tick ran outside the prompt.
    pub fn after_tick(&mut self, machine: &Machine, report: &TickReport) {
        self.mode = match self.mode {
            RunMode::Skip(n) if n > 1 => RunMode::Skip(n - 1),
            RunMode::Skip(_) => RunMode::Interactive,
            RunMode::UntilPc(pc) if machine.pc(self.focus) == pc => RunMode::Interactive,
            RunMode::WaitSection(_) if report.wait_satisfied => RunMode::Interactive,
            mode => mode,
        };
    }

    fn dump_frame(&self, machine: &Machine) -> io::Result<()> {
        let mut file = File::create(&self.vram_path)?;
        file.write_all(machine.frame_view().dump_cells().as_bytes())
    }
}
