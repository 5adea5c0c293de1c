use crate::cpu::ProcessorId;
use crate::cpu_bus::CpuBus;
use crate::error::{Anomaly, AnomalyLog};
use crate::memory::{AddressSpace, Origin, WriteFault};

/// One processor's view of its address space for the duration of a step.
///
/// CPU-originated views report ROM and unmapped writes to the anomaly log;
/// emulator-originated views (host pokes) never do. The shared table RAM is
/// borrowed alongside the space because both processors decode into it.
pub struct BusView<'a> {
    processor: ProcessorId,
    origin: Origin,
    space: &'a mut AddressSpace,
    tables: &'a mut [u8],
    anomalies: &'a mut AnomalyLog,
    last_pc: u16,
}

impl<'a> BusView<'a> {
    pub fn new(
        processor: ProcessorId,
        space: &'a mut AddressSpace,
        tables: &'a mut [u8],
        anomalies: &'a mut AnomalyLog,
    ) -> Self {
        Self {
            processor,
            origin: Origin::Cpu,
            space,
            tables,
            anomalies,
            last_pc: 0,
        }
    }

    /// A view for host-side setup writes.
    pub fn emulator(
        processor: ProcessorId,
        space: &'a mut AddressSpace,
        tables: &'a mut [u8],
        anomalies: &'a mut AnomalyLog,
    ) -> Self {
        Self {
            origin: Origin::Emulator,
            ..Self::new(processor, space, tables, anomalies)
        }
    }
}

impl CpuBus for BusView<'_> {
    fn read_u8(&mut self, addr: u16) -> u8 {
        self.space.read(addr, self.tables)
    }

    fn write_u8(&mut self, addr: u16, value: u8) {
        let fault = self.space.write(addr, value, self.origin, self.tables);
        let processor = self.processor;
        let pc = self.last_pc;
        match fault {
            Some(WriteFault::Rom) => self.anomalies.report(Anomaly::RomWrite {
                processor,
                pc,
                addr,
                value,
            }),
            Some(WriteFault::Unmapped) => self.anomalies.report(Anomaly::UnmappedWrite {
                processor,
                pc,
                addr,
                value,
            }),
            None => {}
        }
    }

    fn set_last_cpu_pc(&mut self, pc: u16) {
        self.last_pc = pc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    #[test]
    fn test_rom_write_is_reported_with_instruction_pc() {
        let layout = Profile::classic().layout;
        let mut space = AddressSpace::ppu(&layout).unwrap();
        let mut tables = vec![0u8; layout.table_ram_len];
        let mut log = AnomalyLog::default();

        let mut bus = BusView::new(ProcessorId::Ppu, &mut space, &mut tables, &mut log);
        bus.set_last_cpu_pc(0x0123);
        bus.write_u8(0x0040, 0x99);
        bus.write_u8(0x2000, 0x01);
        assert_eq!(bus.read_u8(0x0040), 0x99);

        assert_eq!(
            log.take(),
            vec![Anomaly::RomWrite {
                processor: ProcessorId::Ppu,
                pc: 0x0123,
                addr: 0x0040,
                value: 0x99
            }]
        );
    }

    #[test]
    fn test_emulator_writes_land_in_rom_silently() {
        let layout = Profile::classic().layout;
        let mut space = AddressSpace::ppu(&layout).unwrap();
        let mut tables = vec![0u8; layout.table_ram_len];
        let mut log = AnomalyLog::default();

        let mut bus = BusView::emulator(ProcessorId::Ppu, &mut space, &mut tables, &mut log);
        bus.set_last_cpu_pc(0x0123);
        bus.write_u8(0x0040, 0x99);
        bus.write_u16(layout.def_rom_base(), 0xBEEF);
        assert_eq!(bus.read_u8(0x0040), 0x99);
        assert_eq!(bus.read_u16(layout.def_rom_base()), 0xBEEF);
        assert!(log.take().is_empty());
        assert_eq!(log.total(), 0);
    }

    #[test]
    fn test_unmapped_write_is_reported() {
        let layout = Profile::classic().layout;
        let entries = crate::memory::parse_memory_map("0x0000,0x3FFF,rom").unwrap();
        let mut space = AddressSpace::main(&entries, &layout).unwrap();
        let mut tables = vec![0u8; layout.table_ram_len];
        let mut log = AnomalyLog::default();

        let mut bus = BusView::new(ProcessorId::Main, &mut space, &mut tables, &mut log);
        bus.write_u16(0x8000, 0xBEEF);
        assert_eq!(bus.read_u16(0x8000), 0xFFFF);
        assert_eq!(log.take().len(), 2);
    }
}
