//! The driver: two processors, the shared table RAM and the PPU, advanced
//! in lockstep one tick at a time.

use crate::bus::BusView;
use crate::config::{PpuLayout, Profile};
use crate::cpu::{CpuFlags, Executor, ProcessorId, Registers, Z80};
use crate::cpu_bus::CpuBus;
use crate::debug_flags;
use crate::display::DisplaySink;
use crate::error::{Anomaly, AnomalyLog, CrashReport, EmuError};
use crate::instrumentation::{Instrumentation, TraceLine};
use crate::memory::{AddressSpace, MapEntry, RegionKind};
use crate::ppu::{AnimationDef, Edge, FrameView, Ppu, RenderStats, SpriteEntry, VideoBeamState};
use crate::scheduler::InterruptScheduler;
use crate::snapshot::{MachineState, ProcessorState, Snapshot};

/// One processor with its private address space and instrumentation.
pub struct Processor {
    id: ProcessorId,
    cpu: Box<dyn Executor>,
    space: AddressSpace,
    instr: Instrumentation,
    guard: Option<u32>,
}

impl Processor {
    fn new(id: ProcessorId, space: AddressSpace, guard: Option<u32>) -> Self {
        Self {
            id,
            cpu: Box::new(Z80::new()),
            space,
            instr: Instrumentation::new(id, debug_flags::shadow_depth(), debug_flags::trace_depth()),
            guard,
        }
    }

    /// Steps the executor once with instrumentation around it.
    fn step(&mut self, tables: &mut [u8], anomalies: &mut AnomalyLog) -> u32 {
        let pc = self.cpu.pc();
        let observation = if self.cpu.is_halted() {
            None
        } else {
            let space = &self.space;
            let view: &[u8] = tables;
            Some(self.instr.observe(pc, self.cpu.sp(), self.cpu.flags(), |addr| space.read(addr, view)))
        };

        let cycles = {
            let mut bus = BusView::new(self.id, &mut self.space, tables, anomalies);
            self.cpu.step(&mut bus)
        };

        let accepted = self.cpu.accepted_interrupt();
        match observation {
            Some(obs) => {
                if let Some(anomaly) = self.instr.apply(obs, accepted) {
                    anomalies.report(anomaly);
                }
            }
            None if accepted => self.instr.record_interrupt(pc),
            None => {}
        }
        cycles
    }

    fn check_guard(&self) -> Result<(), EmuError> {
        let Some(guard) = self.guard else {
            return Ok(());
        };
        // SP 0 means the stack is empty at the top of memory.
        let sp = match self.cpu.sp() {
            0 => 0x10000,
            sp => sp as u32,
        };
        if sp < guard {
            return Err(EmuError::StackUnderflow(Box::new(self.crash_report(guard))));
        }
        Ok(())
    }

    fn crash_report(&self, guard: u32) -> CrashReport {
        CrashReport {
            processor: self.id,
            pc: self.cpu.pc(),
            sp: self.cpu.sp(),
            guard,
            registers: self.cpu.registers(),
            trace: self.instr.trace().collapsed(),
        }
    }

    fn state(&self) -> ProcessorState {
        ProcessorState {
            registers: self.cpu.registers(),
            pending: self.cpu.pending_interrupts(),
            space: self.space.clone(),
            instrumentation: self.instr.clone(),
        }
    }

    fn restore(&mut self, state: ProcessorState) {
        self.cpu.set_registers(&state.registers);
        self.cpu.set_pending_interrupts(&state.pending);
        self.space = state.space;
        self.instr = state.instrumentation;
    }
}

/// One byte of the real stack next to the shadow entry that pushed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSlot {
    pub addr: u16,
    pub value: u8,
    pub pushed_by: Option<u16>,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub main_cycles: u32,
    pub ppu_cycles: u32,
    pub edges: Vec<Edge>,
    /// The debugger's wait-for-section request was satisfied.
    pub wait_satisfied: bool,
    pub frame_presented: bool,
    pub rendered: Option<RenderStats>,
}

/// Main-CPU map used when none is supplied: ROM low, RAM around the shared
/// table window.
pub fn default_main_map(layout: &PpuLayout) -> Vec<MapEntry> {
    let window = layout.main_table_window as usize;
    let window_end = window + layout.table_ram_len;
    let mut entries = vec![MapEntry {
        start: 0,
        end: 0x7FFF,
        kind: RegionKind::Rom,
        line: 1,
    }];
    if window > 0x8000 {
        entries.push(MapEntry {
            start: 0x8000,
            end: (window - 1) as u16,
            kind: RegionKind::Ram,
            line: 2,
        });
    }
    if window_end < 0x10000 {
        entries.push(MapEntry {
            start: window_end as u16,
            end: 0xFFFF,
            kind: RegionKind::Ram,
            line: 3,
        });
    }
    entries
}

pub struct Machine {
    profile: Profile,
    main: Processor,
    ppu_cpu: Processor,
    /// The main CPU only runs once a program has been loaded for it.
    main_running: bool,
    tables: Vec<u8>,
    ppu: Ppu,
    scheduler: InterruptScheduler,
    anomalies: AnomalyLog,
    ticks: u64,
}

impl Machine {
    /// Builds a powered-on machine. `main_map` defaults to [`default_main_map`].
    pub fn new(profile: Profile, main_map: Option<&[MapEntry]>) -> Result<Self, EmuError> {
        profile.validate()?;
        let layout = profile.layout;
        let main_space = match main_map {
            Some(entries) => AddressSpace::main(entries, &layout)?,
            None => AddressSpace::main(&default_main_map(&layout), &layout)?,
        };
        let ppu_space = AddressSpace::ppu(&layout)?;

        let guards = profile.stack_guards;
        Ok(Self {
            main: Processor::new(ProcessorId::Main, main_space, guards.for_processor(ProcessorId::Main)),
            ppu_cpu: Processor::new(ProcessorId::Ppu, ppu_space, guards.for_processor(ProcessorId::Ppu)),
            main_running: false,
            tables: vec![0; layout.table_ram_len],
            ppu: Ppu::new(&profile),
            scheduler: InterruptScheduler::new(profile.routes.clone()),
            anomalies: AnomalyLog::default(),
            ticks: 0,
            profile,
        })
    }

    /// Swaps in another executor, reset.
    pub fn set_executor(&mut self, id: ProcessorId, mut cpu: Box<dyn Executor>) {
        cpu.reset();
        self.processor_mut(id).cpu = cpu;
    }

    fn processor(&self, id: ProcessorId) -> &Processor {
        match id {
            ProcessorId::Main => &self.main,
            ProcessorId::Ppu => &self.ppu_cpu,
        }
    }

    fn processor_mut(&mut self, id: ProcessorId) -> &mut Processor {
        match id {
            ProcessorId::Main => &mut self.main,
            ProcessorId::Ppu => &mut self.ppu_cpu,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Copies a program into PPU code ROM. The copied length bounds the RETI check.
    pub fn load_ppu_rom(&mut self, image: &[u8]) -> usize {
        let count = self.ppu_cpu.space.load(0, image, &mut self.tables);
        self.ppu_cpu.instr.set_code_len(count);
        log::info!("Loaded {} bytes of PPU code", count);
        count
    }

    /// Copies a program into the main CPU's lowest ROM region and starts it.
    pub fn load_main_rom(&mut self, image: &[u8]) -> usize {
        let Some((base, _)) = self.main.space.first_rom() else {
            return 0;
        };
        let count = self.main.space.load(base, image, &mut self.tables);
        self.main.instr.set_code_len(base as usize + count);
        self.main_running = true;
        log::info!("Loaded {} bytes of main CPU code at {:04x}", count, base);
        count
    }

    pub fn main_running(&self) -> bool {
        self.main_running
    }

    /// Runs only the PPU executor for at least `t_states`, with the beam
    /// stopped. Gives PPU code time to set up its stack before the host
    /// touches the tables.
    pub fn warm_up(&mut self, t_states: u32) {
        let mut spent = 0;
        while spent < t_states {
            let cycles = self.ppu_cpu.step(&mut self.tables, &mut self.anomalies);
            spent += cycles.max(1);
        }
    }

    /// One driver tick: main step, PPU step, the beam steps, interrupt
    /// edges, then a requested render pass and the stack guards.
    pub fn tick(&mut self, sink: &mut dyn DisplaySink) -> Result<TickReport, EmuError> {
        let mut report = TickReport::default();
        if self.main_running {
            report.main_cycles = self.main.step(&mut self.tables, &mut self.anomalies);
        }
        report.ppu_cycles = self.ppu_cpu.step(&mut self.tables, &mut self.anomalies);

        for _ in 0..self.profile.beam_steps_per_tick {
            let Some(edge) = self.ppu.step_beam(&self.ppu_cpu.space, &self.tables, sink) else {
                continue;
            };
            self.scheduler
                .dispatch(edge, self.main.cpu.as_mut(), self.ppu_cpu.cpu.as_mut());
            if self.scheduler.check_wait(edge) {
                report.wait_satisfied = true;
            }
            if let Edge::HblankEntry { after_last_line: true } = edge {
                report.frame_presented = true;
            }
            report.edges.push(edge);
        }

        if self.ppu.take_render_request(&mut self.ppu_cpu.space, &mut self.tables) {
            report.rendered = Some(self.ppu.render(&mut self.ppu_cpu.space, &mut self.tables));
        }

        self.ticks += 1;
        self.main.check_guard()?;
        self.ppu_cpu.check_guard()?;
        Ok(report)
    }

    /// Runs the render pipeline once, outside of program control.
    pub fn render(&mut self) -> RenderStats {
        self.ppu.render(&mut self.ppu_cpu.space, &mut self.tables)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn beam(&self) -> VideoBeamState {
        self.ppu.beam()
    }

    pub fn frames_presented(&self) -> u64 {
        self.ppu.frames_presented()
    }

    pub fn frame_view(&self) -> FrameView<'_> {
        self.ppu.frame_view(&self.ppu_cpu.space, &self.tables)
    }

    pub fn scheduler(&self) -> &InterruptScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut InterruptScheduler {
        &mut self.scheduler
    }

    /// Host read; no side effects.
    pub fn peek(&self, id: ProcessorId, addr: u16) -> u8 {
        self.processor(id).space.read(addr, &self.tables)
    }

    /// Host write; never diagnosed.
    pub fn poke(&mut self, id: ProcessorId, addr: u16, value: u8) {
        let proc = match id {
            ProcessorId::Main => &mut self.main,
            ProcessorId::Ppu => &mut self.ppu_cpu,
        };
        BusView::emulator(id, &mut proc.space, &mut self.tables, &mut self.anomalies).write_u8(addr, value);
    }

    /// Host block copy into whatever region holds `addr`.
    pub fn load(&mut self, id: ProcessorId, addr: u16, bytes: &[u8]) -> usize {
        let proc = match id {
            ProcessorId::Main => &mut self.main,
            ProcessorId::Ppu => &mut self.ppu_cpu,
        };
        proc.space.load(addr, bytes, &mut self.tables)
    }

    pub fn space(&self, id: ProcessorId) -> &AddressSpace {
        &self.processor(id).space
    }

    pub fn pc(&self, id: ProcessorId) -> u16 {
        self.processor(id).cpu.pc()
    }

    pub fn registers(&self, id: ProcessorId) -> Registers {
        self.processor(id).cpu.registers()
    }

    pub fn flags(&self, id: ProcessorId) -> CpuFlags {
        self.processor(id).cpu.flags()
    }

    pub fn instrumentation(&self, id: ProcessorId) -> &Instrumentation {
        &self.processor(id).instr
    }

    pub fn trace(&self, id: ProcessorId) -> Vec<TraceLine> {
        self.processor(id).instr.trace().collapsed()
    }

    /// Real stack bytes from SP to the top of memory, each with the PC that
    /// the shadow stack says pushed it.
    pub fn stack_dump(&self, id: ProcessorId) -> Vec<StackSlot> {
        let proc = self.processor(id);
        let sp = proc.cpu.sp() as usize;
        if sp == 0 {
            return Vec::new();
        }
        let mut shadow = proc.instr.shadow().entries();
        (sp..0x10000)
            .map(|addr| StackSlot {
                addr: addr as u16,
                value: proc.space.read(addr as u16, &self.tables),
                pushed_by: shadow.next(),
            })
            .collect()
    }

    pub fn crash_report(&self, id: ProcessorId) -> CrashReport {
        let proc = self.processor(id);
        proc.crash_report(proc.guard.unwrap_or(0))
    }

    pub fn report_anomaly(&mut self, anomaly: Anomaly) {
        self.anomalies.report(anomaly);
    }

    /// Drains every anomaly reported since the last call.
    pub fn take_anomalies(&mut self) -> Vec<Anomaly> {
        self.anomalies.take()
    }

    pub fn anomaly_count(&self) -> u64 {
        self.anomalies.total()
    }

    pub fn write_entry(&mut self, index: usize, entry: &SpriteEntry) {
        self.ppu
            .pipeline()
            .write_entry(&mut self.ppu_cpu.space, &mut self.tables, index, entry);
    }

    pub fn read_entry(&self, index: usize) -> SpriteEntry {
        self.ppu.pipeline().read_entry(&self.ppu_cpu.space, &self.tables, index)
    }

    pub fn write_anim(&mut self, index: u8, def: &AnimationDef) {
        self.ppu
            .pipeline()
            .write_anim(&mut self.ppu_cpu.space, &mut self.tables, index, def);
    }

    pub fn read_anim(&self, index: u8) -> AnimationDef {
        self.ppu.pipeline().read_anim(&self.ppu_cpu.space, &self.tables, index)
    }

    pub fn blank_anim(&self) -> AnimationDef {
        self.ppu.pipeline().blank_anim()
    }

    /// Writes a tile into sprite definition slot `index`. Slots from
    /// [`Profile::distinct_tiles`] up share bytes with animation definitions.
    pub fn load_tile(&mut self, index: u8, bytes: &[u8]) -> usize {
        if index as usize >= self.profile.distinct_tiles() {
            log::warn!("Sprite definition {} overlaps the animation table", index);
        }
        let addr = self.ppu.pipeline().tile_addr(index);
        let len = bytes.len().min(self.profile.tile_bytes());
        self.ppu_cpu.space.load(addr, &bytes[..len], &mut self.tables)
    }

    pub fn snapshot(&self) -> Result<Snapshot, EmuError> {
        Snapshot::encode(&MachineState::new(
            self.main.state(),
            self.ppu_cpu.state(),
            self.main_running,
            self.tables.clone(),
            self.ppu.timer().clone(),
            self.ppu.frames_presented(),
            self.ticks,
        ))
    }

    /// Reinstates a snapshot taken from a machine with the same profile.
    /// A pending wait-for-section request is dropped.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<(), EmuError> {
        let state = snapshot.decode()?;
        if state.tables.len() != self.tables.len() {
            return Err(EmuError::Snapshot(format!(
                "table RAM is {} bytes, snapshot has {}",
                self.tables.len(),
                state.tables.len()
            )));
        }
        self.main.restore(state.main);
        self.ppu_cpu.restore(state.ppu);
        self.main_running = state.main_running;
        self.tables = state.tables;
        *self.ppu.timer_mut() = state.beam;
        self.ppu.set_frames_presented(state.frames_presented);
        self.ticks = state.ticks;
        self.scheduler.cancel_wait();
        log::debug!("Snapshot restored at tick {}", self.ticks);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BeamGeometry;
    use crate::cpu::PendingInterrupts;
    use crate::demo;
    use crate::display::{FrameCapture, NullSink};
    use crate::memory::parse_memory_map;
    use crate::ppu::Section;

    fn classic() -> Machine {
        Machine::new(Profile::classic(), None).unwrap()
    }

    fn ticks(machine: &mut Machine, n: u64) {
        let mut sink = NullSink;
        for _ in 0..n {
            machine.tick(&mut sink).unwrap();
        }
    }

    fn frame_ticks(profile: &Profile) -> u64 {
        profile.beam.frame_steps() / profile.beam_steps_per_tick as u64
    }

    // 0000: LD SP,0 ; IM 1 ; EI ; HALT ; JR -3
    // 0038: count INTs in 0x3000, EI, RETI
    // 0066: count NMIs in 0x3002, RETN
    fn counting_program() -> Vec<u8> {
        let mut p = vec![0u8; 0x70];
        p[..9].copy_from_slice(&[0x31, 0x00, 0x00, 0xED, 0x56, 0xFB, 0x76, 0x18, 0xFD]);
        p[0x38..0x43].copy_from_slice(&[0xE5, 0x2A, 0x00, 0x30, 0x23, 0x22, 0x00, 0x30, 0xE1, 0xFB, 0xED]);
        p[0x43] = 0x4D;
        p[0x66..0x70].copy_from_slice(&[0xE5, 0x2A, 0x02, 0x30, 0x23, 0x22, 0x02, 0x30, 0xE1, 0xED]);
        p.push(0x45);
        p
    }

    fn counter(machine: &Machine, addr: u16) -> u16 {
        u16::from_le_bytes([machine.peek(ProcessorId::Ppu, addr), machine.peek(ProcessorId::Ppu, addr + 1)])
    }

    #[test]
    fn test_demo_render_places_tiles_in_entry_regions() {
        let mut machine = classic();
        demo::install(&mut machine);
        machine.render();

        let frame = machine.frame_view();
        let bytes = frame.bytes();
        assert_eq!(&bytes[0..64], &demo::solid_tile()[..]);
        assert_eq!(&bytes[64..128], &demo::checker_tile()[..]);
        assert_eq!(&bytes[128..192], &demo::solid_tile()[..]);
        // Entry 25 opens the second tile-row; 25 is odd so it shows slot 1.
        assert_eq!(&bytes[1600..1664], &demo::checker_tile()[..]);
        assert!(machine.take_anomalies().is_empty());
    }

    #[test]
    fn test_interrupts_reach_ppu_program() {
        let profile = Profile::classic();
        let mut machine = classic();
        machine.load_ppu_rom(&counting_program());
        ticks(&mut machine, frame_ticks(&profile) + 10);

        assert_eq!(counter(&machine, 0x3000), 600);
        assert_eq!(counter(&machine, 0x3002), 600);
        assert_eq!(machine.frames_presented(), 1);
        assert_eq!(machine.instrumentation(ProcessorId::Ppu).shadow().depth(), 0);
        assert!(machine.take_anomalies().is_empty());
    }

    #[test]
    fn test_frame_capture_receives_one_frame() {
        let profile = Profile::classic();
        let mut machine = classic();
        machine.load_ppu_rom(&counting_program());
        demo::install(&mut machine);
        machine.render();
        let mut capture = FrameCapture::new();
        let mut presented = 0;
        for _ in 0..frame_ticks(&profile) {
            if machine.tick(&mut capture).unwrap().frame_presented {
                presented += 1;
            }
        }
        assert_eq!(presented, 1);
        assert_eq!(capture.frames, 1);
        assert_eq!(capture.streamed_pixels, 800 * 600);
        assert_eq!(capture.pixel(0, 0), Some(0xDD));
        assert_eq!(capture.pixel(8, 0), Some(0x00));
        assert_eq!(capture.pixel(9, 0), Some(0xDD));
        assert_eq!(capture.pixel(8, 1), Some(0xBB));
    }

    #[test]
    fn test_suspicious_reti_reported_once() {
        // LD HL,0x5000 ; PUSH HL ; RETI
        let program = [0x21, 0x00, 0x50, 0xE5, 0xED, 0x4D];
        let mut machine = classic();
        machine.load_ppu_rom(&program);
        ticks(&mut machine, 4);
        assert_eq!(
            machine.take_anomalies(),
            vec![Anomaly::SuspiciousReturn {
                processor: ProcessorId::Ppu,
                pc: 0x0004,
                return_addr: 0x5000,
                rom_len: program.len(),
            }]
        );
        // One NOP from definition ROM after the return.
        assert_eq!(machine.pc(ProcessorId::Ppu), 0x5001);
    }

    #[test]
    fn test_rom_write_is_an_anomaly_not_a_fault() {
        // LD A,1 ; LD (0x0100),A ; LD A,(0x0100)
        let mut machine = classic();
        machine.load_ppu_rom(&[0x3E, 0x01, 0x32, 0x00, 0x01, 0x3A, 0x00, 0x01]);
        ticks(&mut machine, 3);
        assert_eq!(
            machine.take_anomalies(),
            vec![Anomaly::RomWrite {
                processor: ProcessorId::Ppu,
                pc: 0x0002,
                addr: 0x0100,
                value: 1,
            }]
        );
        assert_eq!(machine.registers(ProcessorId::Ppu).a, 1);
    }

    #[test]
    fn test_stack_underflow_stops_with_report() {
        // LD SP,0xF802 ; PUSH HL ; PUSH HL
        let mut machine = classic();
        machine.load_ppu_rom(&[0x31, 0x02, 0xF8, 0xE5, 0xE5]);
        let mut sink = NullSink;
        machine.tick(&mut sink).unwrap();
        machine.tick(&mut sink).unwrap();
        let err = machine.tick(&mut sink).unwrap_err();
        match err {
            EmuError::StackUnderflow(report) => {
                assert_eq!(report.processor, ProcessorId::Ppu);
                assert_eq!(report.sp, 0xF7FE);
                assert_eq!(report.pc, 0x0005);
                assert_eq!(report.trace[0], TraceLine { pc: 0x0004, repeats: 1 });
                assert!(report.to_string().contains("Stack trace:"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_render_bit_triggers_one_pass() {
        // LD A,1 ; LD (0x2B32),A ; HALT
        let mut machine = classic();
        machine.load_ppu_rom(&[0x3E, 0x01, 0x32, 0x32, 0x2B, 0x76]);
        let mut sink = NullSink;
        assert!(machine.tick(&mut sink).unwrap().rendered.is_none());
        let report = machine.tick(&mut sink).unwrap();
        assert_eq!(report.rendered.map(|s| s.entries), Some(475));
        assert_eq!(machine.peek(ProcessorId::Ppu, 0x2B32), 0);
        assert!(machine.tick(&mut sink).unwrap().rendered.is_none());
    }

    #[test]
    fn test_main_cpu_shares_table_ram() {
        let map = parse_memory_map("0x0000,0x7FFF,rom\n0x8000,0xBFFF,ram\n").unwrap();
        let mut machine = Machine::new(Profile::classic(), Some(&map)).unwrap();
        // LD A,0x42 ; LD (0xD000),A ; LD (0xE000),A ; HALT
        machine.load_main_rom(&[0x3E, 0x42, 0x32, 0x00, 0xD0, 0x32, 0x00, 0xE0, 0x76]);
        assert!(machine.main_running());
        ticks(&mut machine, 4);

        assert_eq!(machine.peek(ProcessorId::Ppu, 0x3000), 0x42);
        assert_eq!(machine.peek(ProcessorId::Main, 0xE000), 0xFF);
        assert_eq!(
            machine.take_anomalies(),
            vec![Anomaly::UnmappedWrite {
                processor: ProcessorId::Main,
                pc: 0x0005,
                addr: 0xE000,
                value: 0x42,
            }]
        );
    }

    #[test]
    fn test_main_cpu_idle_without_program() {
        let mut machine = classic();
        ticks(&mut machine, 10);
        assert_eq!(machine.pc(ProcessorId::Main), 0);
        assert!(machine.trace(ProcessorId::Main).is_empty());
    }

    #[test]
    fn test_wait_for_vblank() {
        let mut machine = classic();
        machine.load_ppu_rom(&counting_program());
        machine.scheduler_mut().wait_for(Section::Vblank);
        let mut sink = NullSink;
        let mut waited = 0u64;
        loop {
            waited += 1;
            if machine.tick(&mut sink).unwrap().wait_satisfied {
                break;
            }
        }
        let beam = machine.beam();
        assert_eq!(beam.section, Section::Vblank);
        assert_eq!(beam.v, 600);
        assert!(machine.scheduler().waiting_for().is_none());
        // 600 lines of 1056 steps, two steps per tick.
        assert_eq!(waited, 600 * 1056 / 2);
    }

    #[test]
    fn test_stack_dump_pairs_bytes_with_pushers() {
        // LD SP,0 ; LD HL,0x1234 ; PUSH HL
        let mut machine = classic();
        machine.load_ppu_rom(&[0x31, 0x00, 0x00, 0x21, 0x34, 0x12, 0xE5]);
        ticks(&mut machine, 3);
        let dump = machine.stack_dump(ProcessorId::Ppu);
        assert_eq!(
            dump,
            vec![
                StackSlot {
                    addr: 0xFFFE,
                    value: 0x34,
                    pushed_by: Some(0x0006),
                },
                StackSlot {
                    addr: 0xFFFF,
                    value: 0x12,
                    pushed_by: Some(0x0006),
                },
            ]
        );
    }

    #[test]
    fn test_default_main_map_surrounds_window() {
        let layout = Profile::classic().layout;
        let map = default_main_map(&layout);
        assert_eq!(map.len(), 3);
        assert_eq!((map[1].start, map[1].end), (0x8000, 0xBFFF));
        assert_eq!((map[2].start, map[2].end), (0xE000, 0xFFFF));
        assert!(AddressSpace::main(&map, &layout).is_ok());
    }

    #[test]
    fn test_edges_on_both_beam_steps_of_a_tick() {
        // Minimal beam: HBLANK entry and the next line start are adjacent steps.
        let mut profile = Profile::classic();
        profile.beam = BeamGeometry {
            visible_width: 1,
            total_width: 3,
            visible_height: 2,
            total_height: 3,
        };
        let mut machine = Machine::new(profile, None).unwrap();
        machine.ppu.timer_mut().set_state(VideoBeamState {
            section: Section::Display,
            h: 1,
            v: 0,
        });
        machine.scheduler_mut().wait_for(Section::Display);

        let report = machine.tick(&mut NullSink).unwrap();
        assert_eq!(
            report.edges,
            vec![Edge::HblankEntry { after_last_line: false }, Edge::LineStart]
        );
        assert!(report.wait_satisfied);
        assert_eq!(
            machine.ppu_cpu.cpu.pending_interrupts(),
            PendingInterrupts {
                nmi: true,
                int: Some(0),
                ei_delay: false,
            }
        );
        assert_eq!(
            machine.beam(),
            VideoBeamState {
                section: Section::Display,
                h: 0,
                v: 1,
            }
        );
    }

    #[test]
    fn test_edge_on_second_beam_step_reaches_wait() {
        let mut machine = classic();
        machine.ppu.timer_mut().set_state(VideoBeamState {
            section: Section::Display,
            h: 799,
            v: 0,
        });
        machine.scheduler_mut().wait_for(Section::Hblank);
        let report = machine.tick(&mut NullSink).unwrap();
        assert_eq!(report.edges, vec![Edge::HblankEntry { after_last_line: false }]);
        assert!(report.wait_satisfied);
        assert_eq!(machine.ppu_cpu.cpu.pending_interrupts().int, Some(0));

        machine.ppu.timer_mut().set_state(VideoBeamState {
            section: Section::Hblank,
            h: 1055,
            v: 0,
        });
        machine.scheduler_mut().wait_for(Section::Display);
        let report = machine.tick(&mut NullSink).unwrap();
        assert_eq!(report.edges, vec![Edge::LineStart]);
        assert!(report.wait_satisfied);
        assert!(machine.ppu_cpu.cpu.pending_interrupts().nmi);
    }

    #[test]
    fn test_revised_frame_interrupts_and_whole_frame_present() {
        let profile = Profile::revised();
        let mut machine = Machine::new(profile.clone(), None).unwrap();
        machine.load_ppu_rom(&counting_program());
        // 0000: LD SP,0 ; HALT ; JR -3
        // 0066: count NMIs in 0x8000, RETN
        let mut main = vec![0u8; 0x66];
        main[..6].copy_from_slice(&[0x31, 0x00, 0x00, 0x76, 0x18, 0xFD]);
        main.extend_from_slice(&[0xE5, 0x2A, 0x00, 0x80, 0x23, 0x22, 0x00, 0x80, 0xE1, 0xED, 0x45]);
        machine.load_main_rom(&main);

        let mut capture = FrameCapture::new();
        for _ in 0..frame_ticks(&profile) + 10 {
            machine.tick(&mut capture).unwrap();
        }

        assert_eq!(counter(&machine, 0x3000), 600);
        assert_eq!(counter(&machine, 0x3002), 1);
        let main_nmis = u16::from_le_bytes([
            machine.peek(ProcessorId::Main, 0x8000),
            machine.peek(ProcessorId::Main, 0x8001),
        ]);
        assert_eq!(main_nmis, 1);
        assert_eq!(machine.frames_presented(), 1);
        assert_eq!(capture.frames, 1);
        assert_eq!(capture.streamed_pixels, 0);
        assert!(machine.take_anomalies().is_empty());
    }

    #[test]
    fn test_high_tile_slots_alias_animation_table() {
        let mut machine = classic();
        assert_eq!(machine.profile().distinct_tiles(), 240);
        let mut tile = [0u8; 64];
        tile[0] = 9;
        machine.load_tile(240, &tile);
        assert_eq!(machine.read_anim(0).next_anim_index(), 9);
    }
}
