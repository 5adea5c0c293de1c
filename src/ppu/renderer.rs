use crate::config::{AdvanceMode, PixelFormat, PpuLayout, Profile};
use crate::memory::{AddressSpace, Origin};

use super::pixel_map::PixelMap;
use super::registers::{anim_layout, entry_layout, AnimLayout, AnimationDef, EntryLayout, SpriteEntry};

/// Counters from one render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub entries: usize,
    pub advanced: usize,
    pub pixels_written: usize,
    pub pixels_clipped: usize,
}

/// Fixed-function sprite compositor.
///
/// Walks the sprite-entry table in row-major grid order, advances each
/// entry's animation and copies the selected tile into pixel RAM. All reads
/// and writes go through the PPU address space with emulator origin.
#[derive(Debug, Clone)]
pub struct RenderPipeline {
    layout: PpuLayout,
    entry: &'static EntryLayout,
    anim: &'static AnimLayout,
    map: PixelMap,
    advance: AdvanceMode,
    pixel_format: PixelFormat,
    tile_bytes: usize,
    clip: bool,
}

impl RenderPipeline {
    pub fn new(profile: &Profile) -> Self {
        Self {
            layout: profile.layout,
            entry: entry_layout(profile.revision),
            anim: anim_layout(profile.revision),
            map: PixelMap::new(profile.frame),
            advance: profile.advance,
            pixel_format: profile.pixel_format,
            tile_bytes: profile.tile_bytes(),
            clip: profile.clip,
        }
    }

    pub fn read_entry(&self, space: &AddressSpace, tables: &[u8], index: usize) -> SpriteEntry {
        let base = self.entry_addr(index);
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().take(self.entry.size).enumerate() {
            *b = space.read(base.wrapping_add(i as u16), tables);
        }
        SpriteEntry::decode(self.entry, &bytes)
    }

    pub fn write_entry(&self, space: &mut AddressSpace, tables: &mut [u8], index: usize, entry: &SpriteEntry) {
        let base = self.entry_addr(index);
        let mut bytes = [0u8; 4];
        entry.encode(self.entry, &mut bytes);
        for (i, &b) in bytes.iter().take(self.entry.size).enumerate() {
            space.write(base.wrapping_add(i as u16), b, Origin::Emulator, tables);
        }
    }

    pub fn read_anim(&self, space: &AddressSpace, tables: &[u8], index: u8) -> AnimationDef {
        let base = self.anim_addr(index);
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().take(self.anim.size).enumerate() {
            *b = space.read(base.wrapping_add(i as u16), tables);
        }
        AnimationDef::from_bytes(self.anim, &bytes)
    }

    pub fn write_anim(&self, space: &mut AddressSpace, tables: &mut [u8], index: u8, def: &AnimationDef) {
        let base = self.anim_addr(index);
        for (i, &b) in def.bytes().iter().enumerate() {
            space.write(base.wrapping_add(i as u16), b, Origin::Emulator, tables);
        }
    }

    pub fn blank_anim(&self) -> AnimationDef {
        AnimationDef::new(self.anim)
    }

    fn entry_addr(&self, index: usize) -> u16 {
        (self.layout.sprite_table as usize + index * self.entry.size) as u16
    }

    fn anim_addr(&self, index: u8) -> u16 {
        (self.layout.anim_defs as usize + index as usize * self.anim.size) as u16
    }

    /// First byte of sprite definition `index`.
    pub fn tile_addr(&self, index: u8) -> u16 {
        (self.layout.sprite_defs as usize + index as usize * self.tile_bytes) as u16
    }

    fn advance_entry(&self, entry: &mut SpriteEntry, def: &AnimationDef) -> bool {
        match self.advance {
            AdvanceMode::Unconditional => {
                entry.anim_index = def.next_anim_index();
                true
            }
            AdvanceMode::CounterGated => {
                let speed = def.speed();
                if speed != 0 && entry.frame_counter == speed {
                    entry.frame_counter = 0;
                    entry.anim_index = def.next_anim_index();
                    true
                } else {
                    entry.frame_counter = entry.frame_counter.wrapping_add(1);
                    false
                }
            }
        }
    }

    /// Source pixel for destination `(dx, dy)` inside a tile: the tile is
    /// rotated clockwise first, then flipped.
    fn source_coords(&self, def: &AnimationDef, dx: usize, dy: usize) -> (usize, usize) {
        let last = self.map.geometry().tile_size as usize - 1;
        let x = if def.horizontal_flip() { last - dx } else { dx };
        let y = if def.vertical_flip() { last - dy } else { dy };
        if def.rotate() {
            (y, last - x)
        } else {
            (x, y)
        }
    }

    fn source_colour(&self, space: &AddressSpace, tables: &[u8], tile: u16, def: &AnimationDef, sx: usize, sy: usize) -> u8 {
        let ts = self.map.geometry().tile_size as usize;
        let index = sy * ts + sx;
        match self.pixel_format {
            PixelFormat::Direct => space.read(tile.wrapping_add(index as u16), tables),
            PixelFormat::Indexed4 => {
                let packed = space.read(tile.wrapping_add((index / 2) as u16), tables);
                let nibble = if index % 2 == 0 { packed & 0x0F } else { packed >> 4 };
                let slot = (nibble + def.palette_offset() * 4) & 0x0F;
                space.read(self.layout.palette.wrapping_add(slot as u16), tables)
            }
        }
    }

    pub fn render(&self, space: &mut AddressSpace, tables: &mut [u8]) -> RenderStats {
        let geometry = *self.map.geometry();
        let ts = geometry.tile_size as usize;
        let pixel_base = self.layout.pixel_base() as usize;
        let mut stats = RenderStats::default();
        let mut slot_x = 0usize;
        let mut slot_y = 0usize;

        for i in 0..geometry.entry_count() {
            let mut entry = self.read_entry(space, tables, i);
            let def = self.read_anim(space, tables, entry.anim_index);
            if self.advance_entry(&mut entry, &def) {
                stats.advanced += 1;
            }
            self.write_entry(space, tables, i, &entry);

            let tile = self.tile_addr(entry.sprite_index.wrapping_add(def.sprite_offset()));
            let origin_x = slot_x * ts + def.x_offset() as usize;
            let origin_y = slot_y * ts + def.y_offset() as usize;

            for dy in 0..ts {
                for dx in 0..ts {
                    let (px, py) = (origin_x + dx, origin_y + dy);
                    if self.clip && !self.map.in_bounds(px, py) {
                        stats.pixels_clipped += 1;
                        continue;
                    }
                    let (sx, sy) = self.source_coords(&def, dx, dy);
                    let colour = self.source_colour(space, tables, tile, &def, sx, sy);
                    let offset = self.map.offset(px, py) % self.layout.pixel_ram_len;
                    space.write((pixel_base + offset) as u16, colour, Origin::Emulator, tables);
                    stats.pixels_written += 1;
                }
            }

            stats.entries += 1;
            slot_x += 1;
            if slot_x == geometry.grid_width as usize {
                slot_x = 0;
                slot_y += 1;
            }
        }
        stats
    }
}
