//! Maps beam section-entry edges to interrupt lines and owns the debugger's
//! wait-for-section request.

use crate::config::{InterruptLine, InterruptRoute, InterruptRoutes};
use crate::cpu::{Executor, ProcessorId};
use crate::debug_flags;
use crate::ppu::{Edge, Section};

#[derive(Debug, Clone)]
pub struct InterruptScheduler {
    routes: InterruptRoutes,
    wait: Option<Section>,
}

impl InterruptScheduler {
    pub fn new(routes: InterruptRoutes) -> Self {
        Self {
            routes,
            wait: None,
        }
    }

    pub fn routes_for(&self, edge: Edge) -> &[InterruptRoute] {
        match edge {
            Edge::HblankEntry { .. } => &self.routes.hblank,
            Edge::VblankEntry => &self.routes.vblank,
            Edge::FrameStart => &self.routes.frame_start,
            Edge::LineStart => &self.routes.line_start,
        }
    }

    /// Raises every interrupt routed to `edge` on its target executor.
    pub fn dispatch(&mut self, edge: Edge, main: &mut dyn Executor, ppu: &mut dyn Executor) {
        if debug_flags::print_section_changes() {
            log::debug!("Beam entered {} ({:?})", edge.section(), edge);
        }
        for route in self.routes_for(edge) {
            let cpu: &mut dyn Executor = match route.target {
                ProcessorId::Main => &mut *main,
                ProcessorId::Ppu => &mut *ppu,
            };
            match route.line {
                InterruptLine::Nmi => cpu.raise_nmi(),
                InterruptLine::Int(vector) => cpu.raise_int(vector),
            }
        }
    }

    /// Suspends interactive stepping until `section` is next entered.
    /// Replaces any pending wait.
    pub fn wait_for(&mut self, section: Section) {
        self.wait = Some(section);
    }

    pub fn cancel_wait(&mut self) {
        self.wait = None;
    }

    pub fn waiting_for(&self) -> Option<Section> {
        self.wait
    }

    /// Clears the wait if `edge` enters the awaited section and reports
    /// whether it did.
    pub fn check_wait(&mut self, edge: Edge) -> bool {
        if self.wait == Some(edge.section()) {
            self.wait = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::cpu::{CpuFlags, Registers};
    use crate::cpu_bus::CpuBus;
    use crate::ppu::BeamTimer;

    #[derive(Default)]
    struct CountingCpu {
        nmis: u32,
        ints: Vec<u8>,
    }

    impl Executor for CountingCpu {
        fn reset(&mut self) {}
        fn step(&mut self, _bus: &mut dyn CpuBus) -> u32 {
            4
        }
        fn raise_nmi(&mut self) {
            self.nmis += 1;
        }
        fn raise_int(&mut self, vector: u8) {
            self.ints.push(vector);
        }
        fn pc(&self) -> u16 {
            0
        }
        fn sp(&self) -> u16 {
            0
        }
        fn flags(&self) -> CpuFlags {
            CpuFlags::empty()
        }
        fn registers(&self) -> Registers {
            Registers::default()
        }
        fn set_registers(&mut self, _regs: &Registers) {}
    }

    fn run_frame(profile: &Profile) -> (CountingCpu, CountingCpu) {
        let mut scheduler = InterruptScheduler::new(profile.routes.clone());
        let mut timer = BeamTimer::new(profile.beam);
        let mut main = CountingCpu::default();
        let mut ppu = CountingCpu::default();
        for _ in 0..profile.beam.frame_steps() {
            if let Some(edge) = timer.step().edge {
                scheduler.dispatch(edge, &mut main, &mut ppu);
            }
        }
        (main, ppu)
    }

    #[test]
    fn test_classic_nmi_on_every_display_entry() {
        let (main, ppu) = run_frame(&Profile::classic());
        // One frame start plus 599 line starts.
        assert_eq!(ppu.nmis, 600);
        assert_eq!(ppu.ints.len(), 600);
        assert!(ppu.ints.iter().all(|&v| v == 0));
        assert_eq!(main.nmis, 0);
        assert!(main.ints.is_empty());
    }

    #[test]
    fn test_revised_routes_vblank_to_main() {
        let (main, ppu) = run_frame(&Profile::revised());
        assert_eq!(ppu.nmis, 1);
        assert_eq!(ppu.ints.len(), 600);
        assert_eq!(main.nmis, 1);
    }

    #[test]
    fn test_no_interrupt_without_edges() {
        let profile = Profile::classic();
        let mut timer = BeamTimer::new(profile.beam);
        // The first W steps stay inside DISPLAY.
        for _ in 0..profile.beam.visible_width {
            assert!(timer.step().edge.is_none());
        }
    }

    #[test]
    fn test_wait_is_one_shot_and_replaceable() {
        let mut scheduler = InterruptScheduler::new(InterruptRoutes::default());
        scheduler.wait_for(Section::Vblank);
        assert!(!scheduler.check_wait(Edge::HblankEntry { after_last_line: true }));
        scheduler.wait_for(Section::Hblank);
        assert_eq!(scheduler.waiting_for(), Some(Section::Hblank));
        assert!(scheduler.check_wait(Edge::HblankEntry { after_last_line: false }));
        assert_eq!(scheduler.waiting_for(), None);
        assert!(!scheduler.check_wait(Edge::HblankEntry { after_last_line: false }));

        scheduler.wait_for(Section::Display);
        scheduler.cancel_wait();
        assert!(!scheduler.check_wait(Edge::FrameStart));
    }

    #[test]
    fn test_display_wait_matches_both_entry_kinds() {
        let mut scheduler = InterruptScheduler::new(InterruptRoutes::default());
        scheduler.wait_for(Section::Display);
        assert!(scheduler.check_wait(Edge::LineStart));
        scheduler.wait_for(Section::Display);
        assert!(scheduler.check_wait(Edge::FrameStart));
    }
}
