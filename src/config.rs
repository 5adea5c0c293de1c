//! Target profiles: every parameter that differs between hardware revisions.

use serde::{Deserialize, Serialize};

use crate::cpu::ProcessorId;
use crate::error::EmuError;

/// Which record layouts the PPU tables use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Revision {
    /// 2-byte sprite entries, 2-byte animation definitions.
    Classic,
    /// 3-byte sprite entries with a frame counter, 4-byte animation definitions.
    Revised,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvanceMode {
    /// Every render pass moves each entry to its successor animation.
    Unconditional,
    /// Entries advance only when their frame counter reaches the definition's speed.
    CounterGated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// One colour byte per pixel, copied verbatim.
    Direct,
    /// Two 4-bit palette indices per byte, low nibble first.
    Indexed4,
}

impl PixelFormat {
    pub fn tile_bytes(self, tile_size: u16) -> usize {
        let pixels = tile_size as usize * tile_size as usize;
        match self {
            PixelFormat::Direct => pixels,
            PixelFormat::Indexed4 => pixels / 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    /// The beam hands each visible position to the sink as it passes.
    PerPixel,
    /// The sink only sees whole frames.
    WholeFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptLine {
    Nmi,
    Int(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptRoute {
    pub target: ProcessorId,
    pub line: InterruptLine,
}

impl InterruptRoute {
    pub const fn nmi(target: ProcessorId) -> Self {
        Self {
            target,
            line: InterruptLine::Nmi,
        }
    }

    pub const fn int(target: ProcessorId, vector: u8) -> Self {
        Self {
            target,
            line: InterruptLine::Int(vector),
        }
    }
}

/// Interrupts raised on each kind of section-entry edge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterruptRoutes {
    pub hblank: Vec<InterruptRoute>,
    pub frame_start: Vec<InterruptRoute>,
    pub line_start: Vec<InterruptRoute>,
    pub vblank: Vec<InterruptRoute>,
}

/// Beam counters, in beam steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamGeometry {
    pub visible_width: u32,
    pub total_width: u32,
    pub visible_height: u32,
    pub total_height: u32,
}

impl BeamGeometry {
    pub const fn frame_steps(&self) -> u64 {
        self.total_width as u64 * self.total_height as u64
    }
}

/// Sprite grid and framebuffer dimensions, in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub grid_width: u16,
    pub grid_height: u16,
    pub tile_size: u16,
    pub visible_width: u16,
    pub visible_height: u16,
    /// Beam positions per framebuffer pixel along each axis.
    pub display_scale: u32,
}

impl FrameGeometry {
    pub const fn entry_count(&self) -> usize {
        self.grid_width as usize * self.grid_height as usize
    }

    pub const fn tile_area(&self) -> usize {
        self.tile_size as usize * self.tile_size as usize
    }

    /// Bytes between the starts of two consecutive tile rows.
    pub const fn row_stride(&self) -> usize {
        self.grid_width as usize * self.tile_area()
    }

    pub const fn pixel_bytes(&self) -> usize {
        self.grid_height as usize * self.row_stride()
    }
}

/// PPU address space and the positions of the tables inside it.
///
/// Regions follow each other in ascending order: code ROM from 0, then table
/// RAM, definition ROM and pixel RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpuLayout {
    pub code_rom_len: usize,
    pub table_ram_len: usize,
    pub def_rom_len: usize,
    pub pixel_ram_len: usize,
    pub sprite_table: u16,
    pub palette: u16,
    pub video_control: u16,
    pub sprite_defs: u16,
    pub anim_defs: u16,
    /// Where the main CPU sees table RAM.
    pub main_table_window: u16,
}

impl PpuLayout {
    pub const fn table_base(&self) -> u16 {
        self.code_rom_len as u16
    }

    pub const fn def_rom_base(&self) -> u16 {
        (self.code_rom_len + self.table_ram_len) as u16
    }

    pub const fn pixel_base(&self) -> u16 {
        (self.code_rom_len + self.table_ram_len + self.def_rom_len) as u16
    }
}

/// Stack low-water marks. `None` disables the check for that processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackGuards {
    pub main: Option<u32>,
    pub ppu: Option<u32>,
}

impl StackGuards {
    pub fn for_processor(&self, id: ProcessorId) -> Option<u32> {
        match id {
            ProcessorId::Main => self.main,
            ProcessorId::Ppu => self.ppu,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub revision: Revision,
    pub beam: BeamGeometry,
    pub frame: FrameGeometry,
    pub layout: PpuLayout,
    pub advance: AdvanceMode,
    pub pixel_format: PixelFormat,
    pub clip: bool,
    /// Whether the `VIDEO_ON` control bit blanks the output.
    pub video_gate: bool,
    pub routes: InterruptRoutes,
    pub display_mode: DisplayMode,
    pub stack_guards: StackGuards,
    pub beam_steps_per_tick: u32,
}

const BEAM_800X600: BeamGeometry = BeamGeometry {
    visible_width: 800,
    total_width: 1056,
    visible_height: 600,
    total_height: 629,
};

const GRID_25X19: FrameGeometry = FrameGeometry {
    grid_width: 25,
    grid_height: 19,
    tile_size: 8,
    visible_width: 200,
    visible_height: 19 * 8 - 2,
    display_scale: 4,
};

const STACK_TOP: u32 = 0x10000;
const STACK_SIZE: u32 = 2 * 1024;

impl Profile {
    /// The original machine.
    pub fn classic() -> Self {
        Self {
            revision: Revision::Classic,
            beam: BEAM_800X600,
            frame: GRID_25X19,
            layout: PpuLayout {
                code_rom_len: 0x2000,
                table_ram_len: 0x2000,
                def_rom_len: 0x4000,
                pixel_ram_len: 0x8000,
                sprite_table: 0x2000,
                palette: 0x2B22,
                video_control: 0x2B32,
                sprite_defs: 0x4000,
                anim_defs: 0x7C00,
                main_table_window: 0xC000,
            },
            advance: AdvanceMode::Unconditional,
            pixel_format: PixelFormat::Direct,
            clip: false,
            video_gate: false,
            routes: InterruptRoutes {
                hblank: vec![InterruptRoute::int(ProcessorId::Ppu, 0)],
                frame_start: vec![InterruptRoute::nmi(ProcessorId::Ppu)],
                line_start: vec![InterruptRoute::nmi(ProcessorId::Ppu)],
                vblank: Vec::new(),
            },
            display_mode: DisplayMode::PerPixel,
            stack_guards: StackGuards {
                main: None,
                ppu: Some(STACK_TOP - STACK_SIZE),
            },
            beam_steps_per_tick: 2,
        }
    }

    /// Later board with richer sprite tables and a palette.
    pub fn revised() -> Self {
        let classic = Self::classic();
        Self {
            revision: Revision::Revised,
            layout: PpuLayout {
                anim_defs: 0x5FE0,
                ..classic.layout
            },
            advance: AdvanceMode::CounterGated,
            pixel_format: PixelFormat::Indexed4,
            clip: true,
            video_gate: true,
            routes: InterruptRoutes {
                hblank: vec![InterruptRoute::int(ProcessorId::Ppu, 0)],
                frame_start: vec![InterruptRoute::nmi(ProcessorId::Ppu)],
                line_start: Vec::new(),
                vblank: vec![InterruptRoute::nmi(ProcessorId::Main)],
            },
            display_mode: DisplayMode::WholeFrame,
            ..classic
        }
    }

    pub const fn entry_size(&self) -> usize {
        match self.revision {
            Revision::Classic => 2,
            Revision::Revised => 3,
        }
    }

    pub const fn anim_def_size(&self) -> usize {
        match self.revision {
            Revision::Classic => 2,
            Revision::Revised => 4,
        }
    }

    pub fn tile_bytes(&self) -> usize {
        self.pixel_format.tile_bytes(self.frame.tile_size)
    }

    /// Sprite definition slots that end before the animation table starts.
    /// Higher slots still decode, reading animation definitions as pixels,
    /// since both tables share definition ROM the way the board wires it.
    pub fn distinct_tiles(&self) -> usize {
        let span = (self.layout.anim_defs as usize).saturating_sub(self.layout.sprite_defs as usize);
        match self.tile_bytes() {
            0 => 0,
            size => (span / size).min(256),
        }
    }

    pub fn validate(&self) -> Result<(), EmuError> {
        let invalid = |msg: String| Err(EmuError::InvalidProfile(msg));
        let beam = &self.beam;
        if beam.visible_width == 0 || beam.visible_height == 0 {
            return invalid("beam has a zero visible size".into());
        }
        if beam.visible_width + 1 >= beam.total_width {
            return invalid(format!(
                "visible width {} leaves no HBLANK in total width {}",
                beam.visible_width, beam.total_width
            ));
        }
        if beam.visible_height >= beam.total_height {
            return invalid(format!(
                "visible height {} leaves no VBLANK in total height {}",
                beam.visible_height, beam.total_height
            ));
        }
        if self.beam_steps_per_tick == 0 {
            return invalid("beam must advance every tick".into());
        }

        let frame = &self.frame;
        if frame.grid_width == 0 || frame.grid_height == 0 || frame.tile_size == 0 {
            return invalid("sprite grid has a zero dimension".into());
        }
        if frame.display_scale == 0 {
            return invalid("display scale is zero".into());
        }
        if frame.tile_size % 2 != 0 && self.pixel_format == PixelFormat::Indexed4 {
            return invalid("4-bit pixels need an even tile size".into());
        }
        if frame.visible_width as usize > frame.grid_width as usize * frame.tile_size as usize
            || frame.visible_height as usize > frame.grid_height as usize * frame.tile_size as usize
        {
            return invalid("visible framebuffer is larger than the sprite grid".into());
        }
        if frame.pixel_bytes() > self.layout.pixel_ram_len {
            return invalid(format!(
                "framebuffer needs {} bytes, pixel RAM has {}",
                frame.pixel_bytes(),
                self.layout.pixel_ram_len
            ));
        }

        let layout = &self.layout;
        let total = layout.code_rom_len + layout.table_ram_len + layout.def_rom_len + layout.pixel_ram_len;
        if total != 0x10000 {
            return invalid(format!("PPU regions cover {:#x} bytes, not 64K", total));
        }
        let table = layout.table_base() as usize..layout.def_rom_base() as usize;
        let defs = layout.def_rom_base() as usize..layout.pixel_base() as usize;
        let sprite_table_end = layout.sprite_table as usize + frame.entry_count() * self.entry_size();
        if !table.contains(&(layout.sprite_table as usize)) || sprite_table_end > table.end {
            return invalid("sprite table does not fit in table RAM".into());
        }
        if !table.contains(&(layout.palette as usize + 15)) || !table.contains(&(layout.video_control as usize)) {
            return invalid("PPU registers are outside table RAM".into());
        }
        if !defs.contains(&(layout.sprite_defs as usize))
            || layout.anim_defs as usize + 256 * self.anim_def_size() > defs.end
        {
            return invalid("definition tables do not fit in definition ROM".into());
        }
        if self.distinct_tiles() == 0 {
            return invalid("animation table overlaps the first sprite definition".into());
        }
        if layout.main_table_window as usize + layout.table_ram_len > 0x10000 {
            return invalid("shared table window runs past the end of the address space".into());
        }

        if self.advance == AdvanceMode::CounterGated && self.revision == Revision::Classic {
            return invalid("counter-gated advance needs frame counters in the sprite entries".into());
        }
        Ok(())
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::classic()
    }
}
