//! Range-decoded 16-bit address spaces.
//!
//! Every address resolves to exactly one [`Region`]. Regions are kept in
//! ascending base order and the first containing range wins; construction
//! rejects overlaps and fills every gap with an `Unmapped` region so decoding
//! never falls through.

use serde::{Deserialize, Serialize};

use crate::config::PpuLayout;
use crate::error::MapError;

pub mod map;

pub use map::{load_memory_map, parse_memory_map, MapEntry};

const SPACE_SIZE: usize = 0x10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    Rom,
    Ram,
    Unmapped,
}

/// Where a region's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Backing {
    Owned(Vec<u8>),
    /// The table RAM both processors share; passed in on every access.
    SharedTables,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Issued by emulated code; diagnosed.
    Cpu,
    /// Issued by the host for setup or inspection; never diagnosed.
    Emulator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    Rom,
    Unmapped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub base: u16,
    pub len: usize,
    pub kind: RegionKind,
    backing: Backing,
}

impl Region {
    pub fn owned(name: &str, base: u16, len: usize, kind: RegionKind) -> Self {
        Self {
            name: name.to_string(),
            base,
            len,
            kind,
            backing: Backing::Owned(vec![0; len]),
        }
    }

    pub fn shared_tables(name: &str, base: u16, len: usize) -> Self {
        Self {
            name: name.to_string(),
            base,
            len,
            kind: RegionKind::Ram,
            backing: Backing::SharedTables,
        }
    }

    fn unmapped(base: u16, len: usize) -> Self {
        Self {
            name: "unmapped".to_string(),
            base,
            len,
            kind: RegionKind::Unmapped,
            backing: Backing::Absent,
        }
    }

    pub fn end(&self) -> usize {
        self.base as usize + self.len
    }

    pub fn contains(&self, addr: u16) -> bool {
        (self.base as usize..self.end()).contains(&(addr as usize))
    }

    fn describe(&self) -> String {
        format!("{} {:04x}-{:04x}", self.name, self.base, self.end() - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSpace {
    regions: Vec<Region>,
}

impl AddressSpace {
    /// Builds a space from non-overlapping regions, synthesizing `Unmapped`
    /// regions for the gaps.
    pub fn from_regions(mut regions: Vec<Region>) -> Result<Self, MapError> {
        regions.retain(|r| r.len > 0);
        regions.sort_by_key(|r| r.base);

        let mut filled: Vec<Region> = Vec::with_capacity(regions.len() * 2 + 1);
        let mut cursor = 0usize;
        for region in regions {
            if (region.base as usize) < cursor {
                let earlier = filled.last().map_or_else(String::new, Region::describe);
                return Err(MapError::RegionsClash {
                    earlier,
                    later: region.describe(),
                });
            }
            if region.end() > SPACE_SIZE {
                return Err(MapError::RegionsClash {
                    earlier: "end of address space ffff".to_string(),
                    later: region.describe(),
                });
            }
            if (region.base as usize) > cursor {
                filled.push(Region::unmapped(cursor as u16, region.base as usize - cursor));
            }
            cursor = region.end();
            filled.push(region);
        }
        if cursor < SPACE_SIZE {
            filled.push(Region::unmapped(cursor as u16, SPACE_SIZE - cursor));
        }
        Ok(Self { regions: filled })
    }

    /// The PPU's fixed map: code ROM, table RAM, definition ROM, pixel RAM.
    pub fn ppu(layout: &PpuLayout) -> Result<Self, MapError> {
        Self::from_regions(vec![
            Region::owned("code ROM", 0, layout.code_rom_len, RegionKind::Rom),
            Region::shared_tables("table RAM", layout.table_base(), layout.table_ram_len),
            Region::owned("definition ROM", layout.def_rom_base(), layout.def_rom_len, RegionKind::Rom),
            Region::owned("pixel RAM", layout.pixel_base(), layout.pixel_ram_len, RegionKind::Ram),
        ])
    }

    /// The main CPU's map: declared regions plus the shared table window.
    pub fn main(entries: &[MapEntry], layout: &PpuLayout) -> Result<Self, MapError> {
        let window = layout.main_table_window as usize..layout.main_table_window as usize + layout.table_ram_len;
        let mut regions = Vec::with_capacity(entries.len() + 1);
        for entry in entries {
            let range = entry.start as usize..entry.end as usize + 1;
            if range.start < window.end && window.start < range.end {
                return Err(MapError::OverlapsTableWindow { line: entry.line });
            }
            let name = match entry.kind {
                RegionKind::Rom => "ROM",
                _ => "RAM",
            };
            regions.push(Region::owned(name, entry.start, range.len(), entry.kind));
        }
        if !regions.iter().any(|r| r.kind == RegionKind::Rom) {
            return Err(MapError::NoRomRegion);
        }
        regions.push(Region::shared_tables("table window", layout.main_table_window, layout.table_ram_len));
        Self::from_regions(regions)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn resolve(&self, addr: u16) -> Option<(usize, usize)> {
        self.regions
            .iter()
            .position(|r| r.contains(addr))
            .map(|i| (i, addr as usize - self.regions[i].base as usize))
    }

    pub fn region_at(&self, addr: u16) -> Option<&Region> {
        self.resolve(addr).map(|(i, _)| &self.regions[i])
    }

    /// Reads have no side effects; unmapped addresses float high.
    pub fn read(&self, addr: u16, tables: &[u8]) -> u8 {
        let Some((i, offset)) = self.resolve(addr) else {
            return 0xFF;
        };
        match &self.regions[i].backing {
            Backing::Owned(bytes) => bytes[offset],
            Backing::SharedTables => tables.get(offset).copied().unwrap_or(0xFF),
            Backing::Absent => 0xFF,
        }
    }

    /// Stores `value` and reports what a CPU-originated write did wrong.
    ///
    /// ROM writes still land. Unmapped writes are dropped. Host writes are
    /// never reported.
    pub fn write(&mut self, addr: u16, value: u8, origin: Origin, tables: &mut [u8]) -> Option<WriteFault> {
        let (i, offset) = self.resolve(addr)?;
        let region = &mut self.regions[i];
        let fault = match region.kind {
            RegionKind::Rom => Some(WriteFault::Rom),
            RegionKind::Unmapped => Some(WriteFault::Unmapped),
            RegionKind::Ram => None,
        };
        match &mut region.backing {
            Backing::Owned(bytes) => bytes[offset] = value,
            Backing::SharedTables => {
                if let Some(slot) = tables.get_mut(offset) {
                    *slot = value;
                }
            }
            Backing::Absent => {}
        }
        match origin {
            Origin::Cpu => fault,
            Origin::Emulator => None,
        }
    }

    /// Copies `bytes` into the region containing `base`, truncating at its end.
    /// Returns how many bytes were stored.
    pub fn load(&mut self, base: u16, bytes: &[u8], tables: &mut [u8]) -> usize {
        let Some((i, offset)) = self.resolve(base) else {
            return 0;
        };
        let target = match &mut self.regions[i].backing {
            Backing::Owned(owned) => &mut owned[offset..],
            Backing::SharedTables => match tables.get_mut(offset..) {
                Some(slice) => slice,
                None => return 0,
            },
            Backing::Absent => return 0,
        };
        let count = bytes.len().min(target.len());
        target[..count].copy_from_slice(&bytes[..count]);
        count
    }

    /// Owned bytes from `addr` to the end of its region.
    pub fn bytes_at(&self, addr: u16) -> Option<&[u8]> {
        let (i, offset) = self.resolve(addr)?;
        match &self.regions[i].backing {
            Backing::Owned(bytes) => Some(&bytes[offset..]),
            _ => None,
        }
    }

    /// Base and length of the lowest ROM region.
    pub fn first_rom(&self) -> Option<(u16, usize)> {
        self.regions
            .iter()
            .find(|r| r.kind == RegionKind::Rom)
            .map(|r| (r.base, r.len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    fn layout() -> PpuLayout {
        Profile::classic().layout
    }

    fn entries() -> Vec<MapEntry> {
        vec![
            MapEntry {
                start: 0x0000,
                end: 0x3FFF,
                kind: RegionKind::Rom,
                line: 1,
            },
            MapEntry {
                start: 0x8000,
                end: 0xBFFF,
                kind: RegionKind::Ram,
                line: 2,
            },
        ]
    }

    #[test]
    fn test_every_address_resolves_to_one_region() {
        let ppu = AddressSpace::ppu(&layout()).unwrap();
        let main = AddressSpace::main(&entries(), &layout()).unwrap();
        for space in [&ppu, &main] {
            for addr in 0..=0xFFFFu16 {
                let hits = space.regions().iter().filter(|r| r.contains(addr)).count();
                assert_eq!(hits, 1, "address {:04x}", addr);
            }
        }
    }

    #[test]
    fn test_clashing_regions_name_both_ranges() {
        let err = AddressSpace::from_regions(vec![
            Region::owned("ROM", 0x0000, 0x4000, RegionKind::Rom),
            Region::owned("RAM", 0x3000, 0x2000, RegionKind::Ram),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            MapError::RegionsClash {
                earlier: "ROM 0000-3fff".into(),
                later: "RAM 3000-4fff".into(),
            }
        );
        assert_eq!(err.to_string(), "RAM 3000-4fff overlaps ROM 0000-3fff");

        let err = AddressSpace::from_regions(vec![Region::owned("RAM", 0xF000, 0x2000, RegionKind::Ram)]).unwrap_err();
        assert!(matches!(err, MapError::RegionsClash { later, .. } if later == "RAM f000-10fff"));
    }

    #[test]
    fn test_ppu_regions_in_ascending_order() {
        let ppu = AddressSpace::ppu(&layout()).unwrap();
        let kinds: Vec<_> = ppu.regions().iter().map(|r| (r.base, r.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (0x0000, RegionKind::Rom),
                (0x2000, RegionKind::Ram),
                (0x4000, RegionKind::Rom),
                (0x8000, RegionKind::Ram),
            ]
        );
    }

    #[test]
    fn test_ram_round_trips() {
        let mut tables = vec![0u8; 0x2000];
        let mut main = AddressSpace::main(&entries(), &layout()).unwrap();
        let mut ppu = AddressSpace::ppu(&layout()).unwrap();
        for &addr in &[0x8000u16, 0x9ABC, 0xBFFF] {
            assert_eq!(main.write(addr, 0x5A, Origin::Cpu, &mut tables), None);
            assert_eq!(main.read(addr, &tables), 0x5A);
        }
        for &addr in &[0x2000u16, 0x3FFF, 0x8000, 0xFFFF] {
            assert_eq!(ppu.write(addr, 0xA5, Origin::Cpu, &mut tables), None);
            assert_eq!(ppu.read(addr, &tables), 0xA5);
        }
    }

    #[test]
    fn test_rom_write_lands_and_is_reported_only_for_cpu_origin() {
        let mut tables = vec![0u8; 0x2000];
        let mut ppu = AddressSpace::ppu(&layout()).unwrap();
        assert_eq!(ppu.write(0x0010, 0x11, Origin::Cpu, &mut tables), Some(WriteFault::Rom));
        assert_eq!(ppu.read(0x0010, &tables), 0x11);
        assert_eq!(ppu.write(0x4000, 0x22, Origin::Emulator, &mut tables), None);
        assert_eq!(ppu.read(0x4000, &tables), 0x22);
    }

    #[test]
    fn test_unmapped_reads_high_and_drops_writes() {
        let mut tables = vec![0u8; 0x2000];
        let mut main = AddressSpace::main(&entries(), &layout()).unwrap();
        assert_eq!(main.region_at(0x5000).map(|r| r.kind), Some(RegionKind::Unmapped));
        assert_eq!(main.read(0x5000, &tables), 0xFF);
        assert_eq!(main.write(0x5000, 0x00, Origin::Cpu, &mut tables), Some(WriteFault::Unmapped));
        assert_eq!(main.read(0x5000, &tables), 0xFF);
        assert_eq!(main.write(0xF000, 0x00, Origin::Emulator, &mut tables), None);
    }

    #[test]
    fn test_table_window_aliases_ppu_tables() {
        let mut tables = vec![0u8; 0x2000];
        let mut main = AddressSpace::main(&entries(), &layout()).unwrap();
        let ppu = AddressSpace::ppu(&layout()).unwrap();
        main.write(0xC010, 0x77, Origin::Cpu, &mut tables);
        assert_eq!(ppu.read(0x2010, &tables), 0x77);
    }

    #[test]
    fn test_main_rejects_window_overlap_and_missing_rom() {
        let mut overlapping = entries();
        overlapping.push(MapEntry {
            start: 0xD000,
            end: 0xD0FF,
            kind: RegionKind::Ram,
            line: 3,
        });
        assert_eq!(
            AddressSpace::main(&overlapping, &layout()),
            Err(MapError::OverlapsTableWindow { line: 3 })
        );

        let ram_only = vec![entries()[1].clone()];
        assert_eq!(AddressSpace::main(&ram_only, &layout()), Err(MapError::NoRomRegion));
    }

    #[test]
    fn test_load_truncates_at_region_end() {
        let mut tables = vec![0u8; 0x2000];
        let mut ppu = AddressSpace::ppu(&layout()).unwrap();
        let image = vec![0xAB; 0x3000];
        assert_eq!(ppu.load(0x0000, &image, &mut tables), 0x2000);
        assert_eq!(ppu.read(0x1FFF, &tables), 0xAB);
        assert_eq!(ppu.read(0x2000, &tables), 0x00);
    }

    #[test]
    fn test_first_rom() {
        let main = AddressSpace::main(&entries(), &layout()).unwrap();
        assert_eq!(main.first_rom(), Some((0x0000, 0x4000)));
    }
}
