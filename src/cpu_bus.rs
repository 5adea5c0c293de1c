//! Minimal bus interface an executor needs from either processor's address space.

pub trait CpuBus {
    fn read_u8(&mut self, addr: u16) -> u8;
    fn write_u8(&mut self, addr: u16, value: u8);

    fn read_u16(&mut self, addr: u16) -> u16 {
        let lo = self.read_u8(addr) as u16;
        let hi = self.read_u8(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn write_u16(&mut self, addr: u16, value: u16) {
        self.write_u8(addr, (value & 0xFF) as u8);
        self.write_u8(addr.wrapping_add(1), (value >> 8) as u8);
    }

    /// No peripherals sit on the I/O ports; reads float high.
    fn io_read(&mut self, _port: u16) -> u8 {
        0xFF
    }

    fn io_write(&mut self, _port: u16, _value: u8) {}

    /// Hook telling the bus which instruction is executing, for write diagnostics.
    fn set_last_cpu_pc(&mut self, _pc: u16) {}
}
