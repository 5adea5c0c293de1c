//! Instruction-stepped Z80 interpreter.
//!
//! Covers the documented instruction set the console programs use. Timing is
//! approximate: 4 T-states per opcode fetch and 3 per other memory access.

use super::{CpuFlags, Executor, PendingInterrupts, Registers};
use crate::cpu_bus::CpuBus;

const C: u8 = CpuFlags::CARRY.bits();
const N: u8 = CpuFlags::SUBTRACT.bits();
const PV: u8 = CpuFlags::PARITY_OVERFLOW.bits();
const XF: u8 = CpuFlags::X.bits();
const H: u8 = CpuFlags::HALF_CARRY.bits();
const YF: u8 = CpuFlags::Y.bits();
const Z: u8 = CpuFlags::ZERO.bits();
const S: u8 = CpuFlags::SIGN.bits();

const NMI_VECTOR: u16 = 0x0066;

fn sz53(value: u8) -> u8 {
    let mut f = value & (S | YF | XF);
    if value == 0 {
        f |= Z;
    }
    f
}

fn sz53p(value: u8) -> u8 {
    let mut f = sz53(value);
    if value.count_ones() % 2 == 0 {
        f |= PV;
    }
    f
}

/// Which register stands in for HL under the DD/FD prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Index {
    Hl,
    Ix,
    Iy,
}

pub struct Z80 {
    regs: Registers,
    nmi_pending: bool,
    int_pending: Option<u8>,
    // EI takes effect after the following instruction.
    ei_delay: bool,
    // Set when the last step pushed a return address for an interrupt.
    accepted: bool,
    cycles: u32,
    total_cycles: u64,
}

impl Z80 {
    pub fn new() -> Self {
        let mut cpu = Self {
            regs: Registers::default(),
            nmi_pending: false,
            int_pending: None,
            ei_delay: false,
            accepted: false,
            cycles: 0,
            total_cycles: 0,
        };
        cpu.reset();
        cpu
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    fn read(&mut self, bus: &mut dyn CpuBus, addr: u16) -> u8 {
        self.cycles += 3;
        bus.read_u8(addr)
    }

    fn write(&mut self, bus: &mut dyn CpuBus, addr: u16, value: u8) {
        self.cycles += 3;
        bus.write_u8(addr, value);
    }

    fn read16(&mut self, bus: &mut dyn CpuBus, addr: u16) -> u16 {
        let lo = self.read(bus, addr) as u16;
        let hi = self.read(bus, addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn write16(&mut self, bus: &mut dyn CpuBus, addr: u16, value: u16) {
        self.write(bus, addr, value as u8);
        self.write(bus, addr.wrapping_add(1), (value >> 8) as u8);
    }

    fn fetch_opcode(&mut self, bus: &mut dyn CpuBus) -> u8 {
        self.cycles += 4;
        self.regs.r = (self.regs.r & 0x80) | (self.regs.r.wrapping_add(1) & 0x7F);
        let op = bus.read_u8(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        op
    }

    fn fetch(&mut self, bus: &mut dyn CpuBus) -> u8 {
        let value = self.read(bus, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    fn fetch16(&mut self, bus: &mut dyn CpuBus) -> u16 {
        let lo = self.fetch(bus) as u16;
        let hi = self.fetch(bus) as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut dyn CpuBus, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write(bus, self.regs.sp, (value >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write(bus, self.regs.sp, value as u8);
    }

    fn pop(&mut self, bus: &mut dyn CpuBus) -> u16 {
        let value = self.read16(bus, self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    fn flag(&self, f: u8) -> bool {
        self.regs.f & f != 0
    }

    fn condition(&self, cc: u8) -> bool {
        match cc {
            0 => !self.flag(Z),
            1 => self.flag(Z),
            2 => !self.flag(C),
            3 => self.flag(C),
            4 => !self.flag(PV),
            5 => self.flag(PV),
            6 => !self.flag(S),
            _ => self.flag(S),
        }
    }

    fn hl(&self, idx: Index) -> u16 {
        match idx {
            Index::Hl => self.regs.hl(),
            Index::Ix => self.regs.ix,
            Index::Iy => self.regs.iy,
        }
    }

    fn set_hl(&mut self, idx: Index, value: u16) {
        match idx {
            Index::Hl => self.regs.set_hl(value),
            Index::Ix => self.regs.ix = value,
            Index::Iy => self.regs.iy = value,
        }
    }

    fn rp(&self, p: u8, idx: Index) -> u16 {
        match p {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.hl(idx),
            _ => self.regs.sp,
        }
    }

    fn set_rp(&mut self, p: u8, idx: Index, value: u16) {
        match p {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_hl(idx, value),
            _ => self.regs.sp = value,
        }
    }

    fn rp2(&self, p: u8, idx: Index) -> u16 {
        if p == 3 {
            self.regs.af()
        } else {
            self.rp(p, idx)
        }
    }

    fn set_rp2(&mut self, p: u8, idx: Index, value: u16) {
        if p == 3 {
            self.regs.set_af(value);
        } else {
            self.set_rp(p, idx, value);
        }
    }

    /// Register operand `r` (never 6). H/L become the index halves under a prefix.
    fn reg8(&self, r: u8, idx: Index) -> u8 {
        match r {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => (self.hl(idx) >> 8) as u8,
            5 => self.hl(idx) as u8,
            _ => self.regs.a,
        }
    }

    fn set_reg8(&mut self, r: u8, idx: Index, value: u8) {
        match r {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => {
                let v = (self.hl(idx) & 0x00FF) | ((value as u16) << 8);
                self.set_hl(idx, v);
            }
            5 => {
                let v = (self.hl(idx) & 0xFF00) | value as u16;
                self.set_hl(idx, v);
            }
            _ => self.regs.a = value,
        }
    }

    /// Address of the `(HL)` operand; fetches the displacement under a prefix.
    fn mem_operand(&mut self, bus: &mut dyn CpuBus, idx: Index) -> u16 {
        match idx {
            Index::Hl => self.regs.hl(),
            _ => {
                let d = self.fetch(bus) as i8;
                self.hl(idx).wrapping_add(d as i16 as u16)
            }
        }
    }

    fn alu(&mut self, op: u8, value: u8) {
        let a = self.regs.a;
        match op {
            0 | 1 => {
                let carry = if op == 1 { (self.regs.f & C) as u16 } else { 0 };
                let wide = a as u16 + value as u16 + carry;
                let result = wide as u8;
                let mut f = sz53(result);
                if (a & 0x0F) as u16 + (value & 0x0F) as u16 + carry > 0x0F {
                    f |= H;
                }
                if (a ^ value) & 0x80 == 0 && (a ^ result) & 0x80 != 0 {
                    f |= PV;
                }
                if wide > 0xFF {
                    f |= C;
                }
                self.regs.a = result;
                self.regs.f = f;
            }
            2 | 3 | 7 => {
                let carry = if op == 3 { (self.regs.f & C) as u16 } else { 0 };
                let result = (a as u16).wrapping_sub(value as u16).wrapping_sub(carry) as u8;
                let mut f = N | (result & (S)) | if result == 0 { Z } else { 0 };
                if ((a & 0x0F) as u16) < (value & 0x0F) as u16 + carry {
                    f |= H;
                }
                if (a ^ value) & 0x80 != 0 && (value ^ result) & 0x80 == 0 {
                    f |= PV;
                }
                if (a as u16) < value as u16 + carry {
                    f |= C;
                }
                if op == 7 {
                    // CP takes the undocumented bits from the operand.
                    self.regs.f = f | (value & (YF | XF));
                } else {
                    self.regs.f = f | (result & (YF | XF));
                    self.regs.a = result;
                }
            }
            4 => {
                self.regs.a = a & value;
                self.regs.f = sz53p(self.regs.a) | H;
            }
            5 => {
                self.regs.a = a ^ value;
                self.regs.f = sz53p(self.regs.a);
            }
            _ => {
                self.regs.a = a | value;
                self.regs.f = sz53p(self.regs.a);
            }
        }
    }

    fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        let mut f = (self.regs.f & C) | sz53(result);
        if value & 0x0F == 0x0F {
            f |= H;
        }
        if value == 0x7F {
            f |= PV;
        }
        self.regs.f = f;
        result
    }

    fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        let mut f = (self.regs.f & C) | sz53(result) | N;
        if value & 0x0F == 0 {
            f |= H;
        }
        if value == 0x80 {
            f |= PV;
        }
        self.regs.f = f;
        result
    }

    fn add16(&mut self, a: u16, b: u16) -> u16 {
        let wide = a as u32 + b as u32;
        let result = wide as u16;
        let mut f = self.regs.f & (S | Z | PV);
        f |= ((result >> 8) as u8) & (YF | XF);
        if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
            f |= H;
        }
        if wide > 0xFFFF {
            f |= C;
        }
        self.regs.f = f;
        result
    }

    fn adc16(&mut self, a: u16, b: u16) -> u16 {
        let carry = (self.regs.f & C) as u32;
        let wide = a as u32 + b as u32 + carry;
        let result = wide as u16;
        let mut f = ((result >> 8) as u8) & (S | YF | XF);
        if result == 0 {
            f |= Z;
        }
        if (a & 0x0FFF) as u32 + (b & 0x0FFF) as u32 + carry > 0x0FFF {
            f |= H;
        }
        if (a ^ b) & 0x8000 == 0 && (a ^ result) & 0x8000 != 0 {
            f |= PV;
        }
        if wide > 0xFFFF {
            f |= C;
        }
        self.regs.f = f;
        result
    }

    fn sbc16(&mut self, a: u16, b: u16) -> u16 {
        let carry = (self.regs.f & C) as u32;
        let result = (a as u32).wrapping_sub(b as u32).wrapping_sub(carry) as u16;
        let mut f = N | (((result >> 8) as u8) & (S | YF | XF));
        if result == 0 {
            f |= Z;
        }
        if ((a & 0x0FFF) as u32) < (b & 0x0FFF) as u32 + carry {
            f |= H;
        }
        if (a ^ b) & 0x8000 != 0 && (b ^ result) & 0x8000 == 0 {
            f |= PV;
        }
        if (a as u32) < b as u32 + carry {
            f |= C;
        }
        self.regs.f = f;
        result
    }

    fn rotate(&mut self, op: u8, value: u8) -> u8 {
        let carry_in = self.regs.f & C;
        let (result, carry_out) = match op {
            0 => (value.rotate_left(1), value >> 7),
            1 => (value.rotate_right(1), value & 1),
            2 => ((value << 1) | carry_in, value >> 7),
            3 => ((value >> 1) | (carry_in << 7), value & 1),
            4 => (value << 1, value >> 7),
            5 => ((value >> 1) | (value & 0x80), value & 1),
            6 => ((value << 1) | 1, value >> 7),
            _ => (value >> 1, value & 1),
        };
        self.regs.f = sz53p(result) | carry_out;
        result
    }

    fn accumulator_op(&mut self, y: u8) {
        let a = self.regs.a;
        let keep = self.regs.f & (S | Z | PV);
        match y {
            0..=3 => {
                let carry_in = self.regs.f & C;
                let (result, carry) = match y {
                    0 => (a.rotate_left(1), a >> 7),
                    1 => (a.rotate_right(1), a & 1),
                    2 => ((a << 1) | carry_in, a >> 7),
                    _ => ((a >> 1) | (carry_in << 7), a & 1),
                };
                self.regs.a = result;
                self.regs.f = keep | (result & (YF | XF)) | carry;
            }
            4 => self.daa(),
            5 => {
                self.regs.a = !a;
                self.regs.f = (self.regs.f & (S | Z | PV | C)) | H | N | (self.regs.a & (YF | XF));
            }
            6 => self.regs.f = keep | (a & (YF | XF)) | C,
            _ => {
                let carry = self.regs.f & C;
                let half = if carry != 0 { H } else { 0 };
                self.regs.f = keep | (a & (YF | XF)) | half | (carry ^ C);
            }
        }
    }

    fn daa(&mut self) {
        let a = self.regs.a;
        let mut correction = 0u8;
        let mut carry = self.regs.f & C;
        if self.flag(H) || a & 0x0F > 9 {
            correction |= 0x06;
        }
        if carry != 0 || a > 0x99 {
            correction |= 0x60;
            carry = C;
        }
        let result = if self.flag(N) {
            a.wrapping_sub(correction)
        } else {
            a.wrapping_add(correction)
        };
        let half = if self.flag(N) {
            self.flag(H) && a & 0x0F < 6
        } else {
            a & 0x0F > 9
        };
        self.regs.a = result;
        self.regs.f = sz53p(result) | (self.regs.f & N) | carry | if half { H } else { 0 };
    }

    fn accept_nmi(&mut self, bus: &mut dyn CpuBus) {
        self.nmi_pending = false;
        self.regs.halted = false;
        self.regs.iff2 = self.regs.iff1;
        self.regs.iff1 = false;
        self.cycles += 5;
        let pc = self.regs.pc;
        self.push(bus, pc);
        self.accepted = true;
        self.regs.pc = NMI_VECTOR;
    }

    fn accept_int(&mut self, bus: &mut dyn CpuBus, vector: u8) {
        self.int_pending = None;
        self.regs.halted = false;
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.cycles += 7;
        let pc = self.regs.pc;
        match self.regs.im {
            0 => {
                // Only a restart opcode placed on the data bus transfers control.
                if vector & 0xC7 == 0xC7 {
                    self.push(bus, pc);
                    self.accepted = true;
                    self.regs.pc = (vector & 0x38) as u16;
                }
            }
            1 => {
                self.push(bus, pc);
                self.accepted = true;
                self.regs.pc = 0x0038;
            }
            _ => {
                self.push(bus, pc);
                self.accepted = true;
                let table = ((self.regs.i as u16) << 8) | (vector & 0xFE) as u16;
                self.regs.pc = self.read16(bus, table);
            }
        }
    }

    fn execute(&mut self, bus: &mut dyn CpuBus, op: u8, idx: Index) {
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match x {
            0 => self.execute_x0(bus, y, z, p, q, idx),
            1 => {
                if y == 6 && z == 6 {
                    self.regs.halted = true;
                } else if z == 6 {
                    let addr = self.mem_operand(bus, idx);
                    let value = self.read(bus, addr);
                    self.set_reg8(y, Index::Hl, value);
                } else if y == 6 {
                    let addr = self.mem_operand(bus, idx);
                    let value = self.reg8(z, Index::Hl);
                    self.write(bus, addr, value);
                } else {
                    let value = self.reg8(z, idx);
                    self.set_reg8(y, idx, value);
                }
            }
            2 => {
                let value = if z == 6 {
                    let addr = self.mem_operand(bus, idx);
                    self.read(bus, addr)
                } else {
                    self.reg8(z, idx)
                };
                self.alu(y, value);
            }
            _ => self.execute_x3(bus, y, z, p, q, idx),
        }
    }

    fn execute_x0(&mut self, bus: &mut dyn CpuBus, y: u8, z: u8, p: u8, q: u8, idx: Index) {
        match z {
            0 => match y {
                0 => {}
                1 => {
                    let af = self.regs.af();
                    self.regs.set_af(self.regs.af_alt);
                    self.regs.af_alt = af;
                }
                2 => {
                    let d = self.fetch(bus) as i8;
                    self.regs.b = self.regs.b.wrapping_sub(1);
                    if self.regs.b != 0 {
                        self.regs.pc = self.regs.pc.wrapping_add(d as i16 as u16);
                        self.cycles += 5;
                    }
                }
                3 => {
                    let d = self.fetch(bus) as i8;
                    self.regs.pc = self.regs.pc.wrapping_add(d as i16 as u16);
                    self.cycles += 5;
                }
                _ => {
                    let d = self.fetch(bus) as i8;
                    if self.condition(y - 4) {
                        self.regs.pc = self.regs.pc.wrapping_add(d as i16 as u16);
                        self.cycles += 5;
                    }
                }
            },
            1 => {
                if q == 0 {
                    let nn = self.fetch16(bus);
                    self.set_rp(p, idx, nn);
                } else {
                    let result = self.add16(self.hl(idx), self.rp(p, idx));
                    self.set_hl(idx, result);
                }
            }
            2 => match (q, p) {
                (0, 0) => self.write(bus, self.regs.bc(), self.regs.a),
                (0, 1) => self.write(bus, self.regs.de(), self.regs.a),
                (0, 2) => {
                    let nn = self.fetch16(bus);
                    self.write16(bus, nn, self.hl(idx));
                }
                (0, _) => {
                    let nn = self.fetch16(bus);
                    self.write(bus, nn, self.regs.a);
                }
                (_, 0) => self.regs.a = self.read(bus, self.regs.bc()),
                (_, 1) => self.regs.a = self.read(bus, self.regs.de()),
                (_, 2) => {
                    let nn = self.fetch16(bus);
                    let value = self.read16(bus, nn);
                    self.set_hl(idx, value);
                }
                _ => {
                    let nn = self.fetch16(bus);
                    self.regs.a = self.read(bus, nn);
                }
            },
            3 => {
                let value = self.rp(p, idx);
                let value = if q == 0 {
                    value.wrapping_add(1)
                } else {
                    value.wrapping_sub(1)
                };
                self.set_rp(p, idx, value);
                self.cycles += 2;
            }
            4 | 5 => {
                if y == 6 {
                    let addr = self.mem_operand(bus, idx);
                    let value = self.read(bus, addr);
                    let result = if z == 4 { self.inc8(value) } else { self.dec8(value) };
                    self.write(bus, addr, result);
                } else {
                    let value = self.reg8(y, idx);
                    let result = if z == 4 { self.inc8(value) } else { self.dec8(value) };
                    self.set_reg8(y, idx, result);
                }
            }
            6 => {
                if y == 6 {
                    let addr = self.mem_operand(bus, idx);
                    let n = self.fetch(bus);
                    self.write(bus, addr, n);
                } else {
                    let n = self.fetch(bus);
                    self.set_reg8(y, idx, n);
                }
            }
            _ => self.accumulator_op(y),
        }
    }

    fn execute_x3(&mut self, bus: &mut dyn CpuBus, y: u8, z: u8, p: u8, q: u8, idx: Index) {
        match z {
            0 => {
                self.cycles += 1;
                if self.condition(y) {
                    self.regs.pc = self.pop(bus);
                }
            }
            1 => {
                if q == 0 {
                    let value = self.pop(bus);
                    self.set_rp2(p, idx, value);
                } else {
                    match p {
                        0 => self.regs.pc = self.pop(bus),
                        1 => {
                            let (bc, de, hl) = (self.regs.bc(), self.regs.de(), self.regs.hl());
                            self.regs.set_bc(self.regs.bc_alt);
                            self.regs.set_de(self.regs.de_alt);
                            self.regs.set_hl(self.regs.hl_alt);
                            self.regs.bc_alt = bc;
                            self.regs.de_alt = de;
                            self.regs.hl_alt = hl;
                        }
                        2 => self.regs.pc = self.hl(idx),
                        _ => {
                            self.regs.sp = self.hl(idx);
                            self.cycles += 2;
                        }
                    }
                }
            }
            2 => {
                let nn = self.fetch16(bus);
                if self.condition(y) {
                    self.regs.pc = nn;
                }
            }
            3 => match y {
                0 => self.regs.pc = self.fetch16(bus),
                1 => self.execute_cb(bus, idx),
                2 => {
                    let n = self.fetch(bus);
                    let port = ((self.regs.a as u16) << 8) | n as u16;
                    bus.io_write(port, self.regs.a);
                }
                3 => {
                    let n = self.fetch(bus);
                    let port = ((self.regs.a as u16) << 8) | n as u16;
                    self.regs.a = bus.io_read(port);
                }
                4 => {
                    let sp = self.regs.sp;
                    let value = self.read16(bus, sp);
                    self.write16(bus, sp, self.hl(idx));
                    self.set_hl(idx, value);
                }
                5 => {
                    let de = self.regs.de();
                    self.regs.set_de(self.regs.hl());
                    self.regs.set_hl(de);
                }
                6 => {
                    self.regs.iff1 = false;
                    self.regs.iff2 = false;
                }
                _ => {
                    self.regs.iff1 = true;
                    self.regs.iff2 = true;
                    self.ei_delay = true;
                }
            },
            4 => {
                let nn = self.fetch16(bus);
                if self.condition(y) {
                    let pc = self.regs.pc;
                    self.push(bus, pc);
                    self.regs.pc = nn;
                }
            }
            5 => {
                if q == 0 {
                    let value = self.rp2(p, idx);
                    self.cycles += 1;
                    self.push(bus, value);
                } else {
                    match p {
                        0 => {
                            let nn = self.fetch16(bus);
                            let pc = self.regs.pc;
                            self.push(bus, pc);
                            self.regs.pc = nn;
                        }
                        1 => {
                            let op = self.fetch_opcode(bus);
                            self.execute(bus, op, Index::Ix);
                        }
                        2 => self.execute_ed(bus),
                        _ => {
                            let op = self.fetch_opcode(bus);
                            self.execute(bus, op, Index::Iy);
                        }
                    }
                }
            }
            6 => {
                let n = self.fetch(bus);
                self.alu(y, n);
            }
            _ => {
                let pc = self.regs.pc;
                self.cycles += 1;
                self.push(bus, pc);
                self.regs.pc = (y as u16) * 8;
            }
        }
    }

    fn execute_cb(&mut self, bus: &mut dyn CpuBus, idx: Index) {
        // DD CB d op: the displacement comes before the final opcode.
        let indexed_addr = if idx != Index::Hl {
            Some(self.mem_operand(bus, idx))
        } else {
            None
        };
        let op = if indexed_addr.is_some() {
            self.fetch(bus)
        } else {
            self.fetch_opcode(bus)
        };
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;

        let addr = match indexed_addr {
            Some(addr) => Some(addr),
            None if z == 6 => Some(self.regs.hl()),
            None => None,
        };
        let value = match addr {
            Some(addr) => self.read(bus, addr),
            None => self.reg8(z, Index::Hl),
        };

        let result = match x {
            0 => Some(self.rotate(y, value)),
            1 => {
                let bit = value & (1 << y);
                let mut f = (self.regs.f & C) | H | (value & (YF | XF));
                if bit == 0 {
                    f |= Z | PV;
                }
                if y == 7 && bit != 0 {
                    f |= S;
                }
                self.regs.f = f;
                None
            }
            2 => Some(value & !(1 << y)),
            _ => Some(value | (1 << y)),
        };

        if let Some(result) = result {
            match addr {
                Some(addr) => self.write(bus, addr, result),
                None => self.set_reg8(z, Index::Hl, result),
            }
        }
    }

    fn execute_ed(&mut self, bus: &mut dyn CpuBus) {
        let op = self.fetch_opcode(bus);
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match (x, z) {
            (1, 0) => {
                let value = bus.io_read(self.regs.bc());
                self.regs.f = (self.regs.f & C) | sz53p(value);
                if y != 6 {
                    self.set_reg8(y, Index::Hl, value);
                }
            }
            (1, 1) => {
                let value = if y == 6 { 0 } else { self.reg8(y, Index::Hl) };
                bus.io_write(self.regs.bc(), value);
            }
            (1, 2) => {
                let hl = self.regs.hl();
                let rp = self.rp(p, Index::Hl);
                let result = if q == 0 { self.sbc16(hl, rp) } else { self.adc16(hl, rp) };
                self.regs.set_hl(result);
            }
            (1, 3) => {
                let nn = self.fetch16(bus);
                if q == 0 {
                    let value = self.rp(p, Index::Hl);
                    self.write16(bus, nn, value);
                } else {
                    let value = self.read16(bus, nn);
                    self.set_rp(p, Index::Hl, value);
                }
            }
            (1, 4) => {
                let a = self.regs.a;
                self.regs.a = 0;
                self.alu(2, a);
            }
            (1, 5) => {
                // RETI (y == 1) and RETN both restore IFF1 from IFF2.
                self.regs.pc = self.pop(bus);
                self.regs.iff1 = self.regs.iff2;
            }
            (1, 6) => self.regs.im = [0, 0, 1, 2][(y & 3) as usize],
            (1, 7) => match y {
                0 => self.regs.i = self.regs.a,
                1 => self.regs.r = self.regs.a,
                2 | 3 => {
                    let value = if y == 2 { self.regs.i } else { self.regs.r };
                    self.regs.a = value;
                    let mut f = (self.regs.f & C) | sz53(value);
                    if self.regs.iff2 {
                        f |= PV;
                    }
                    self.regs.f = f;
                }
                4 | 5 => {
                    let hl = self.regs.hl();
                    let mem = self.read(bus, hl);
                    let a = self.regs.a;
                    let (new_mem, new_a) = if y == 4 {
                        ((a << 4) | (mem >> 4), (a & 0xF0) | (mem & 0x0F))
                    } else {
                        ((mem << 4) | (a & 0x0F), (a & 0xF0) | (mem >> 4))
                    };
                    self.write(bus, hl, new_mem);
                    self.regs.a = new_a;
                    self.regs.f = (self.regs.f & C) | sz53p(new_a);
                }
                _ => {}
            },
            (2, 0) if y >= 4 => self.block_load(bus, y),
            (2, 1) if y >= 4 => self.block_compare(bus, y),
            _ => log::debug!("Unimplemented ED opcode {:02X} at {:04X}", op, self.regs.pc.wrapping_sub(2)),
        }
    }

    fn block_load(&mut self, bus: &mut dyn CpuBus, y: u8) {
        let hl = self.regs.hl();
        let de = self.regs.de();
        let value = self.read(bus, hl);
        self.write(bus, de, value);
        let step: u16 = if y & 1 == 0 { 1 } else { 0xFFFF };
        self.regs.set_hl(hl.wrapping_add(step));
        self.regs.set_de(de.wrapping_add(step));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);
        let mut f = self.regs.f & (S | Z | C);
        if bc != 0 {
            f |= PV;
        }
        self.regs.f = f;
        if y >= 6 && bc != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.cycles += 5;
        }
    }

    fn block_compare(&mut self, bus: &mut dyn CpuBus, y: u8) {
        let hl = self.regs.hl();
        let value = self.read(bus, hl);
        let carry = self.regs.f & C;
        self.alu(7, value);
        let step: u16 = if y & 1 == 0 { 1 } else { 0xFFFF };
        self.regs.set_hl(hl.wrapping_add(step));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);
        let mut f = (self.regs.f & !(PV | C)) | carry;
        if bc != 0 {
            f |= PV;
        }
        self.regs.f = f;
        if y >= 6 && bc != 0 && f & Z == 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.cycles += 5;
        }
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for Z80 {
    fn reset(&mut self) {
        self.regs = Registers {
            a: 0xFF,
            f: 0xFF,
            sp: 0xFFFF,
            ..Registers::default()
        };
        self.nmi_pending = false;
        self.int_pending = None;
        self.ei_delay = false;
        self.accepted = false;
    }

    fn step(&mut self, bus: &mut dyn CpuBus) -> u32 {
        self.cycles = 0;
        self.accepted = false;
        if self.nmi_pending {
            self.accept_nmi(bus);
        } else if let Some(vector) = self.int_pending.filter(|_| self.regs.iff1 && !self.ei_delay) {
            self.accept_int(bus, vector);
        } else {
            self.ei_delay = false;
            if self.regs.halted {
                // A halted CPU keeps executing NOPs.
                self.cycles += 4;
            } else {
                bus.set_last_cpu_pc(self.regs.pc);
                let op = self.fetch_opcode(bus);
                self.execute(bus, op, Index::Hl);
            }
        }
        self.total_cycles += self.cycles as u64;
        self.cycles
    }

    fn raise_nmi(&mut self) {
        self.nmi_pending = true;
    }

    fn raise_int(&mut self, vector: u8) {
        self.int_pending = Some(vector);
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn sp(&self) -> u16 {
        self.regs.sp
    }

    fn flags(&self) -> CpuFlags {
        self.regs.flags()
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn set_registers(&mut self, regs: &Registers) {
        self.regs = *regs;
    }

    fn is_halted(&self) -> bool {
        self.regs.halted
    }

    fn accepted_interrupt(&self) -> bool {
        self.accepted
    }

    fn pending_interrupts(&self) -> PendingInterrupts {
        PendingInterrupts {
            nmi: self.nmi_pending,
            int: self.int_pending,
            ei_delay: self.ei_delay,
        }
    }

    fn set_pending_interrupts(&mut self, pending: &PendingInterrupts) {
        self.nmi_pending = pending.nmi;
        self.int_pending = pending.int;
        self.ei_delay = pending.ei_delay;
    }
}
