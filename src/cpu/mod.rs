use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cpu_bus::CpuBus;

mod z80;

pub use z80::Z80;


bitflags! {
    /// Z80 `F` register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CpuFlags: u8 {
        const CARRY = 0b0000_0001;
        const SUBTRACT = 0b0000_0010;
        const PARITY_OVERFLOW = 0b0000_0100;
        const X = 0b0000_1000;
        const HALF_CARRY = 0b0001_0000;
        const Y = 0b0010_0000;
        const ZERO = 0b0100_0000;
        const SIGN = 0b1000_0000;
    }
}

/// Which of the two processors a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessorId {
    Main,
    Ppu,
}

impl ProcessorId {
    pub fn other(self) -> Self {
        match self {
            ProcessorId::Main => ProcessorId::Ppu,
            ProcessorId::Ppu => ProcessorId::Main,
        }
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorId::Main => write!(f, "CPU"),
            ProcessorId::Ppu => write!(f, "PPU"),
        }
    }
}

/// Full register file of a Z80-compatible core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub af_alt: u16,
    pub bc_alt: u16,
    pub de_alt: u16,
    pub hl_alt: u16,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    pub r: u8,
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub halted: bool,
}

impl Registers {
    pub const fn af(&self) -> u16 {
        (self.a as u16) << 8 | self.f as u16
    }

    pub const fn bc(&self) -> u16 {
        (self.b as u16) << 8 | self.c as u16
    }

    pub const fn de(&self) -> u16 {
        (self.d as u16) << 8 | self.e as u16
    }

    pub const fn hl(&self) -> u16 {
        (self.h as u16) << 8 | self.l as u16
    }

    pub fn set_af(&mut self, value: u16) {
        self.a = (value >> 8) as u8;
        self.f = value as u8;
    }

    pub fn set_bc(&mut self, value: u16) {
        self.b = (value >> 8) as u8;
        self.c = value as u8;
    }

    pub fn set_de(&mut self, value: u16) {
        self.d = (value >> 8) as u8;
        self.e = value as u8;
    }

    pub fn set_hl(&mut self, value: u16) {
        self.h = (value >> 8) as u8;
        self.l = value as u8;
    }

    pub fn flags(&self) -> CpuFlags {
        CpuFlags::from_bits_truncate(self.f)
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Regs:")?;
        writeln!(f, "\tA: {:02X}  F: {:02X}  AF: {:04X}", self.a, self.f, self.af())?;
        writeln!(f, "\tB: {:02X}  C: {:02X}  BC: {:04X}", self.b, self.c, self.bc())?;
        writeln!(f, "\tD: {:02X}  E: {:02X}  DE: {:04X}", self.d, self.e, self.de())?;
        writeln!(f, "\tH: {:02X}  L: {:02X}  HL: {:04X}", self.h, self.l, self.hl())?;
        writeln!(f, "\tIX: {:04X}  IY: {:04X}", self.ix, self.iy)?;
        writeln!(f, "\tSP: {:04X}  PC: {:04X}", self.sp, self.pc)?;
        write!(
            f,
            "\tI: {:02X}  IM: {}  IFF1: {}  IFF2: {}{}",
            self.i,
            self.im,
            self.iff1 as u8,
            self.iff2 as u8,
            if self.halted { "  HALTED" } else { "" }
        )
    }
}

/// Formats the flag register the way the debugger's `f` command prints it.
pub fn describe_flags(flags: CpuFlags) -> String {
    format!(
        "Flags:\n\tC: {}\n\tN: {}\n\tPV: {}\n\tHC: {}\n\tZ: {}\n\tS: {}",
        flags.contains(CpuFlags::CARRY) as u8,
        flags.contains(CpuFlags::SUBTRACT) as u8,
        flags.contains(CpuFlags::PARITY_OVERFLOW) as u8,
        flags.contains(CpuFlags::HALF_CARRY) as u8,
        flags.contains(CpuFlags::ZERO) as u8,
        flags.contains(CpuFlags::SIGN) as u8,
    )
}

/// Interrupt requests latched but not yet accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInterrupts {
    pub nmi: bool,
    pub int: Option<u8>,
    /// An EI was just executed; acceptance waits one instruction.
    pub ei_delay: bool,
}

/// Instruction-stepping unit driven by the machine once per tick.
///
/// The machine never looks inside the interpreter: it peeks at memory before
/// a step for instrumentation and reads PC/SP/flags afterwards.
pub trait Executor {
    fn reset(&mut self);

    /// Executes exactly one instruction (or accepts a pending interrupt) and
    /// returns the T-states it took.
    fn step(&mut self, bus: &mut dyn CpuBus) -> u32;

    fn raise_nmi(&mut self);

    fn raise_int(&mut self, vector: u8);

    fn pc(&self) -> u16;

    fn sp(&self) -> u16;

    fn flags(&self) -> CpuFlags;

    fn registers(&self) -> Registers;

    fn set_registers(&mut self, regs: &Registers);

    fn is_halted(&self) -> bool {
        self.registers().halted
    }

    /// Whether the last `step` was an interrupt acceptance that pushed a
    /// return address.
    fn accepted_interrupt(&self) -> bool {
        false
    }

    fn pending_interrupts(&self) -> PendingInterrupts {
        PendingInterrupts::default()
    }

    fn set_pending_interrupts(&mut self, _pending: &PendingInterrupts) {}
}
