//! Shadow call stack and executed-PC trace.
//!
//! Both are fed by inspecting the opcode at PC before the executor runs it;
//! the interpreter itself is never consulted. The shadow stack mirrors the
//! real stack byte for byte, so one 16-bit push records the pushing PC twice.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::cpu::{CpuFlags, ProcessorId};
use crate::error::Anomaly;

/// How the instruction about to execute moves the stack pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    Push,
    Pop,
    /// RETI: a pop whose return address is checked against the code ROM.
    ReturnFromInterrupt,
    Other,
}

// cc field of conditional CALL/RET: NZ Z NC C PO PE P M
fn condition_holds(cc: u8, flags: CpuFlags) -> bool {
    let flag = match cc >> 1 {
        0 => CpuFlags::ZERO,
        1 => CpuFlags::CARRY,
        2 => CpuFlags::PARITY_OVERFLOW,
        _ => CpuFlags::SIGN,
    };
    flags.contains(flag) == (cc & 1 == 1)
}

/// Classifies the instruction at `pc`. `peek` must be side-effect free.
pub fn classify(pc: u16, flags: CpuFlags, peek: impl Fn(u16) -> u8) -> StackEffect {
    let op = peek(pc);
    match op {
        0xC5 | 0xD5 | 0xE5 | 0xF5 | 0xCD => StackEffect::Push,
        0xC1 | 0xD1 | 0xE1 | 0xF1 | 0xC9 => StackEffect::Pop,
        // RST p
        op if op & 0xC7 == 0xC7 => StackEffect::Push,
        // CALL cc,nn
        op if op & 0xC7 == 0xC4 => {
            if condition_holds((op >> 3) & 7, flags) {
                StackEffect::Push
            } else {
                StackEffect::Other
            }
        }
        // RET cc
        op if op & 0xC7 == 0xC0 => {
            if condition_holds((op >> 3) & 7, flags) {
                StackEffect::Pop
            } else {
                StackEffect::Other
            }
        }
        0xDD | 0xFD => match peek(pc.wrapping_add(1)) {
            0xE5 => StackEffect::Push,
            0xE1 => StackEffect::Pop,
            _ => StackEffect::Other,
        },
        0xED => match peek(pc.wrapping_add(1)) {
            0x4D => StackEffect::ReturnFromInterrupt,
            // RETN and its mirrors
            sub if sub & 0xC7 == 0x45 => StackEffect::Pop,
            _ => StackEffect::Other,
        },
        _ => StackEffect::Other,
    }
}

/// Bounded mirror of the real stack. When full, the oldest entry is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowStack {
    entries: VecDeque<u16>,
    capacity: usize,
    underflows: u64,
}

impl ShadowStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(2),
            underflows: 0,
        }
    }

    fn push_entry(&mut self, pc: u16) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(pc);
    }

    pub fn push(&mut self, pc: u16) {
        self.push_entry(pc);
        self.push_entry(pc);
    }

    pub fn pop(&mut self) {
        for _ in 0..2 {
            if self.entries.pop_back().is_none() {
                self.underflows += 1;
            }
        }
    }

    /// Logical depth: one per 16-bit push.
    pub fn depth(&self) -> usize {
        self.entries.len() / 2
    }

    /// Byte-level entries, newest first. Entry `i` pushed the byte at `SP + i`.
    pub fn entries(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.iter().rev().copied()
    }

    /// Pops issued against an empty shadow stack.
    pub fn underflows(&self) -> u64 {
        self.underflows
    }
}

/// One line of a collapsed trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceLine {
    pub pc: u16,
    pub repeats: usize,
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.pc)?;
        if self.repeats > 1 {
            write!(f, " (repeated {} times)", self.repeats)?;
        }
        Ok(())
    }
}

/// Ring of recently executed PCs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcTrace {
    ring: VecDeque<u16>,
    capacity: usize,
}

impl PcTrace {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, pc: u16) {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(pc);
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Newest to oldest with consecutive duplicates folded.
    pub fn collapsed(&self) -> Vec<TraceLine> {
        let mut lines: Vec<TraceLine> = Vec::new();
        for &pc in self.ring.iter().rev() {
            match lines.last_mut() {
                Some(last) if last.pc == pc => last.repeats += 1,
                _ => lines.push(TraceLine { pc, repeats: 1 }),
            }
        }
        lines
    }
}

/// Result of the pre-step inspection, applied once the step has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub pc: u16,
    pub effect: StackEffect,
    /// Top of the real stack, read for RETI only.
    pub return_addr: Option<u16>,
}

/// Per-processor instrumentation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrumentation {
    processor: ProcessorId,
    shadow: ShadowStack,
    trace: PcTrace,
    code_len: usize,
}

impl Instrumentation {
    pub fn new(processor: ProcessorId, shadow_depth: usize, trace_depth: usize) -> Self {
        Self {
            processor,
            shadow: ShadowStack::new(shadow_depth),
            trace: PcTrace::new(trace_depth),
            code_len: 0,
        }
    }

    /// Number of loaded code bytes; RETI targets at or past it are suspicious.
    pub fn set_code_len(&mut self, len: usize) {
        self.code_len = len;
    }

    pub fn code_len(&self) -> usize {
        self.code_len
    }

    pub fn shadow(&self) -> &ShadowStack {
        &self.shadow
    }

    pub fn trace(&self) -> &PcTrace {
        &self.trace
    }

    pub fn observe(&self, pc: u16, sp: u16, flags: CpuFlags, peek: impl Fn(u16) -> u8) -> Observation {
        let effect = classify(pc, flags, &peek);
        let return_addr = (effect == StackEffect::ReturnFromInterrupt)
            .then(|| u16::from_le_bytes([peek(sp), peek(sp.wrapping_add(1))]));
        Observation { pc, effect, return_addr }
    }

    /// Applies an observation after the executor stepped. When the step
    /// accepted an interrupt instead, the inspected instruction never ran and
    /// only the interrupt's return-address push is recorded.
    pub fn apply(&mut self, obs: Observation, accepted_interrupt: bool) -> Option<Anomaly> {
        self.trace.record(obs.pc);
        if accepted_interrupt {
            self.shadow.push(obs.pc);
            return None;
        }
        match obs.effect {
            StackEffect::Push => self.shadow.push(obs.pc),
            StackEffect::Pop => self.shadow.pop(),
            StackEffect::ReturnFromInterrupt => {
                self.shadow.pop();
                if let Some(ret) = obs.return_addr {
                    if ret as usize >= self.code_len {
                        return Some(Anomaly::SuspiciousReturn {
                            processor: self.processor,
                            pc: obs.pc,
                            return_addr: ret,
                            rom_len: self.code_len,
                        });
                    }
                }
            }
            StackEffect::Other => {}
        }
        None
    }

    /// Records an interrupt taken while the processor was halted.
    pub fn record_interrupt(&mut self, pc: u16) {
        self.shadow.push(pc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(bytes: &[u8]) -> impl Fn(u16) -> u8 + '_ {
        move |addr| bytes.get(addr as usize).copied().unwrap_or(0)
    }

    #[test]
    fn test_classify_pushes_and_pops() {
        let none = CpuFlags::empty();
        for op in [0xC5u8, 0xD5, 0xE5, 0xF5, 0xCD, 0xC7, 0xFF] {
            assert_eq!(classify(0, none, program(&[op])), StackEffect::Push, "{:02x}", op);
        }
        for op in [0xC1u8, 0xD1, 0xE1, 0xF1, 0xC9] {
            assert_eq!(classify(0, none, program(&[op])), StackEffect::Pop, "{:02x}", op);
        }
        assert_eq!(classify(0, none, program(&[0xDD, 0xE5])), StackEffect::Push);
        assert_eq!(classify(0, none, program(&[0xFD, 0xE1])), StackEffect::Pop);
        assert_eq!(classify(0, none, program(&[0xDD, 0x21])), StackEffect::Other);
        assert_eq!(classify(0, none, program(&[0xED, 0x4D])), StackEffect::ReturnFromInterrupt);
        assert_eq!(classify(0, none, program(&[0xED, 0x45])), StackEffect::Pop);
        assert_eq!(classify(0, none, program(&[0xED, 0xB0])), StackEffect::Other);
        // EX (SP),HL leaves SP alone.
        assert_eq!(classify(0, none, program(&[0xE3])), StackEffect::Other);
    }

    #[test]
    fn test_conditional_call_and_ret_follow_flags() {
        let call_z = program(&[0xCC]);
        assert_eq!(classify(0, CpuFlags::ZERO, &call_z), StackEffect::Push);
        assert_eq!(classify(0, CpuFlags::empty(), &call_z), StackEffect::Other);

        let ret_nc = program(&[0xD0]);
        assert_eq!(classify(0, CpuFlags::empty(), &ret_nc), StackEffect::Pop);
        assert_eq!(classify(0, CpuFlags::CARRY, &ret_nc), StackEffect::Other);

        let call_m = program(&[0xFC]);
        assert_eq!(classify(0, CpuFlags::SIGN, &call_m), StackEffect::Push);
        let ret_po = program(&[0xE0]);
        assert_eq!(classify(0, CpuFlags::PARITY_OVERFLOW, &ret_po), StackEffect::Other);
    }

    #[test]
    fn test_shadow_depth_tracks_pushes_minus_pops() {
        let code = [0xC5u8, 0xCD, 0xC1, 0xE5, 0xDD, 0xE5, 0xC9, 0xF1, 0x00];
        let mut instr = Instrumentation::new(ProcessorId::Ppu, 1024, 16);
        instr.set_code_len(code.len());
        // push, call, pop, push, push ix, ret, pop, nop
        let order = [0u16, 1, 2, 3, 4, 6, 7, 8];
        let (mut pushes, mut pops) = (0, 0);
        for &pc in &order {
            let obs = instr.observe(pc, 0xF000, CpuFlags::empty(), program(&code));
            match obs.effect {
                StackEffect::Push => pushes += 1,
                StackEffect::Pop | StackEffect::ReturnFromInterrupt => pops += 1,
                StackEffect::Other => {}
            }
            assert_eq!(instr.apply(obs, false), None);
            assert_eq!(instr.shadow().depth(), pushes - pops);
        }
        assert_eq!(instr.shadow().depth(), 1);
        assert_eq!(instr.shadow().entries().collect::<Vec<_>>(), vec![0, 0]);
    }

    #[test]
    fn test_reti_outside_rom_reports_exactly_once() {
        let mut memory = vec![0u8; 0x10000];
        memory[0x0010] = 0xED;
        memory[0x0011] = 0x4D;
        memory[0xF000] = 0x34;
        memory[0xF001] = 0x12;
        let peek = |addr: u16| memory[addr as usize];

        let mut instr = Instrumentation::new(ProcessorId::Main, 64, 16);
        instr.set_code_len(0x1000);
        let obs = instr.observe(0x0010, 0xF000, CpuFlags::empty(), peek);
        assert_eq!(obs.return_addr, Some(0x1234));
        let anomalies: Vec<_> = instr.apply(obs, false).into_iter().collect();
        assert_eq!(
            anomalies,
            vec![Anomaly::SuspiciousReturn {
                processor: ProcessorId::Main,
                pc: 0x0010,
                return_addr: 0x1234,
                rom_len: 0x1000,
            }]
        );

        instr.set_code_len(0x2000);
        let obs = instr.observe(0x0010, 0xF000, CpuFlags::empty(), peek);
        assert_eq!(instr.apply(obs, false), None);
    }

    #[test]
    fn test_accepted_interrupt_replaces_inspected_instruction() {
        let code = [0xC1u8];
        let mut instr = Instrumentation::new(ProcessorId::Ppu, 64, 16);
        let obs = instr.observe(0, 0xF000, CpuFlags::empty(), program(&code));
        assert_eq!(obs.effect, StackEffect::Pop);
        instr.apply(obs, true);
        assert_eq!(instr.shadow().depth(), 1);
        assert_eq!(instr.shadow().underflows(), 0);
    }

    #[test]
    fn test_shadow_stack_drops_oldest_when_full() {
        let mut shadow = ShadowStack::new(4);
        shadow.push(1);
        shadow.push(2);
        shadow.push(3);
        assert_eq!(shadow.depth(), 2);
        assert_eq!(shadow.entries().collect::<Vec<_>>(), vec![3, 3, 2, 2]);
        shadow.pop();
        shadow.pop();
        shadow.pop();
        assert_eq!(shadow.depth(), 0);
        assert_eq!(shadow.underflows(), 2);
    }

    #[test]
    fn test_trace_collapses_repeats_newest_first() {
        let mut trace = PcTrace::new(8);
        for pc in [1u16, 2, 2, 2, 3, 3] {
            trace.record(pc);
        }
        let lines = trace.collapsed();
        assert_eq!(
            lines,
            vec![
                TraceLine { pc: 3, repeats: 2 },
                TraceLine { pc: 2, repeats: 3 },
                TraceLine { pc: 1, repeats: 1 },
            ]
        );
        assert_eq!(lines[1].to_string(), "0002 (repeated 3 times)");
        assert_eq!(lines[2].to_string(), "0001");
    }

    #[test]
    fn test_trace_ring_is_bounded() {
        let mut trace = PcTrace::new(3);
        for pc in 0..10u16 {
            trace.record(pc);
        }
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.collapsed()[0].pc, 9);
        assert_eq!(trace.collapsed()[2].pc, 7);
    }
}
