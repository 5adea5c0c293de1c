use std::fmt;
use std::path::PathBuf;

use crate::cpu::{describe_flags, ProcessorId, Registers};
use crate::instrumentation::TraceLine;

/// Conditions that stop the driver loop.
#[derive(Debug)]
pub enum EmuError {
    StackUnderflow(Box<CrashReport>),
    MemoryMap(MapError),
    MissingRom {
        path: PathBuf,
        source: std::io::Error,
    },
    InvalidProfile(String),
    Snapshot(String),
}

impl fmt::Display for EmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmuError::StackUnderflow(report) => write!(f, "{}", report),
            EmuError::MemoryMap(err) => write!(f, "Invalid memory map: {}", err),
            EmuError::MissingRom { path, source } => {
                write!(f, "Couldn't open {}: {}", path.display(), source)
            }
            EmuError::InvalidProfile(msg) => write!(f, "Invalid profile: {}", msg),
            EmuError::Snapshot(msg) => write!(f, "Snapshot failed: {}", msg),
        }
    }
}

impl std::error::Error for EmuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EmuError::MemoryMap(err) => Some(err),
            EmuError::MissingRom { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<MapError> for EmuError {
    fn from(err: MapError) -> Self {
        EmuError::MemoryMap(err)
    }
}

impl From<bincode::Error> for EmuError {
    fn from(err: bincode::Error) -> Self {
        EmuError::Snapshot(err.to_string())
    }
}

/// Everything printed when a processor's stack runs past its guard.
#[derive(Debug, Clone)]
pub struct CrashReport {
    pub processor: ProcessorId,
    pub pc: u16,
    pub sp: u16,
    pub guard: u32,
    pub registers: Registers,
    pub trace: Vec<TraceLine>,
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} stack overflowed to address {:x} at PC {:x} (guard {:x})",
            self.processor, self.sp, self.pc, self.guard
        )?;
        writeln!(f, "Stack trace:")?;
        for line in &self.trace {
            writeln!(f, "{}", line)?;
        }
        writeln!(f, "{}", self.registers)?;
        write!(f, "{}", describe_flags(self.registers.flags()))
    }
}

/// Malformed main-CPU memory map description. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    Io(String),
    FieldCount { line: usize, found: usize },
    BadNumber { line: usize, text: String },
    EndBeforeStart { line: usize },
    UnknownKind { line: usize, kind: String },
    Overlap { line: usize },
    /// Two regions handed to the decoder clash. Each side is `name start-end`.
    RegionsClash { earlier: String, later: String },
    OverlapsTableWindow { line: usize },
    TooManyRegions { max: usize },
    LineTooLong { line: usize, max: usize },
    NoRomRegion,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::Io(msg) => write!(f, "{}", msg),
            MapError::FieldCount { line, found } => {
                write!(f, "line {}: expected start,end,kind but found {} fields", line, found)
            }
            MapError::BadNumber { line, text } => write!(f, "line {}: bad address '{}'", line, text),
            MapError::EndBeforeStart { line } => write!(f, "line {}: end is before start", line),
            MapError::UnknownKind { line, kind } => {
                write!(f, "line {}: unknown region kind '{}'", line, kind)
            }
            MapError::Overlap { line } => write!(f, "line {}: region overlaps an earlier one", line),
            MapError::RegionsClash { earlier, later } => write!(f, "{} overlaps {}", later, earlier),
            MapError::OverlapsTableWindow { line } => {
                write!(f, "line {}: region overlaps the shared table window", line)
            }
            MapError::TooManyRegions { max } => write!(f, "more than {} regions", max),
            MapError::LineTooLong { line, max } => {
                write!(f, "line {}: longer than {} bytes", line, max)
            }
            MapError::NoRomRegion => write!(f, "no rom region declared"),
        }
    }
}

impl std::error::Error for MapError {}

/// Diagnosed but non-fatal events. Emulation continues unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    RomWrite {
        processor: ProcessorId,
        pc: u16,
        addr: u16,
        value: u8,
    },
    UnmappedWrite {
        processor: ProcessorId,
        pc: u16,
        addr: u16,
        value: u8,
    },
    SuspiciousReturn {
        processor: ProcessorId,
        pc: u16,
        return_addr: u16,
        rom_len: usize,
    },
    UnknownCommand(String),
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::RomWrite {
                processor,
                pc,
                addr,
                value,
            } => write!(
                f,
                "{}: writing {:02x} to ROM address {:04x} after PC {:04x}",
                processor, value, addr, pc
            ),
            Anomaly::UnmappedWrite {
                processor,
                pc,
                addr,
                value,
            } => write!(
                f,
                "{}: writing {:02x} to unmapped address {:04x} after PC {:04x}",
                processor, value, addr, pc
            ),
            Anomaly::SuspiciousReturn {
                processor,
                pc,
                return_addr,
                rom_len,
            } => write!(
                f,
                "{}: RETI at {:04x} returns to {:04x}, outside {} bytes of code",
                processor, pc, return_addr, rom_len
            ),
            Anomaly::UnknownCommand(cmd) => write!(f, "Unrecognised command '{}'", cmd),
        }
    }
}

/// Queue of anomalies. Every one is logged at `warn` and kept until drained.
#[derive(Debug, Default)]
pub struct AnomalyLog {
    pending: Vec<Anomaly>,
    total: u64,
}

impl AnomalyLog {
    pub fn report(&mut self, anomaly: Anomaly) {
        log::warn!("{}", anomaly);
        self.total += 1;
        self.pending.push(anomaly);
    }

    pub fn take(&mut self) -> Vec<Anomaly> {
        std::mem::take(&mut self.pending)
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}
