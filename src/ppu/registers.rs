use bitflags::bitflags;

use crate::config::Revision;

bitflags! {
    /// Control byte in table RAM, next to the palette.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VideoControl: u8 {
        /// Set by PPU code to request a render pass; cleared once it runs.
        const RENDER = 0b0000_0001;
        const VIDEO_ON = 0b1000_0000;
    }
}

/// A sub-byte field: `(bytes[byte] & mask) >> shift`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub byte: usize,
    pub mask: u8,
    pub shift: u8,
}

impl BitField {
    pub const fn new(byte: usize, mask: u8, shift: u8) -> Self {
        Self { byte, mask, shift }
    }

    pub const fn whole(byte: usize) -> Self {
        Self::new(byte, 0xFF, 0)
    }

    pub fn get(self, bytes: &[u8]) -> u8 {
        (bytes[self.byte] & self.mask) >> self.shift
    }

    pub fn set(self, bytes: &mut [u8], value: u8) {
        let b = &mut bytes[self.byte];
        *b = (*b & !self.mask) | ((value << self.shift) & self.mask);
    }
}

/// Field positions of a sprite entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryLayout {
    pub size: usize,
    pub anim_index: BitField,
    pub frame_counter: Option<BitField>,
    pub sprite_index: BitField,
}

pub static CLASSIC_ENTRY: EntryLayout = EntryLayout {
    size: 2,
    anim_index: BitField::whole(0),
    frame_counter: None,
    sprite_index: BitField::whole(1),
};

pub static REVISED_ENTRY: EntryLayout = EntryLayout {
    size: 3,
    anim_index: BitField::whole(0),
    frame_counter: Some(BitField::whole(1)),
    sprite_index: BitField::whole(2),
};

/// Field positions of an animation definition.
#[derive(Debug, Clone, Copy)]
pub struct AnimLayout {
    pub size: usize,
    pub speed: Option<BitField>,
    pub next_anim_index: BitField,
    pub x_offset: BitField,
    pub y_offset: BitField,
    pub sprite_offset: BitField,
    pub horizontal_flip: Option<BitField>,
    pub vertical_flip: Option<BitField>,
    pub rotate: Option<BitField>,
    pub palette_offset: Option<BitField>,
}

// next | x:3 y:3 spriteOffset:2
pub static CLASSIC_ANIM: AnimLayout = AnimLayout {
    size: 2,
    speed: None,
    next_anim_index: BitField::whole(0),
    x_offset: BitField::new(1, 0b0000_0111, 0),
    y_offset: BitField::new(1, 0b0011_1000, 3),
    sprite_offset: BitField::new(1, 0b1100_0000, 6),
    horizontal_flip: None,
    vertical_flip: None,
    rotate: None,
    palette_offset: None,
};

// speed | next | x:4 y:4 | spriteOffset:3 hflip vflip rotate palette:2
pub static REVISED_ANIM: AnimLayout = AnimLayout {
    size: 4,
    speed: Some(BitField::whole(0)),
    next_anim_index: BitField::whole(1),
    x_offset: BitField::new(2, 0b0000_1111, 0),
    y_offset: BitField::new(2, 0b1111_0000, 4),
    sprite_offset: BitField::new(3, 0b0000_0111, 0),
    horizontal_flip: Some(BitField::new(3, 0b0000_1000, 3)),
    vertical_flip: Some(BitField::new(3, 0b0001_0000, 4)),
    rotate: Some(BitField::new(3, 0b0010_0000, 5)),
    palette_offset: Some(BitField::new(3, 0b1100_0000, 6)),
};

pub fn entry_layout(revision: Revision) -> &'static EntryLayout {
    match revision {
        Revision::Classic => &CLASSIC_ENTRY,
        Revision::Revised => &REVISED_ENTRY,
    }
}

pub fn anim_layout(revision: Revision) -> &'static AnimLayout {
    match revision {
        Revision::Classic => &CLASSIC_ANIM,
        Revision::Revised => &REVISED_ANIM,
    }
}

/// One grid cell's animation state, decoded from its packed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpriteEntry {
    pub anim_index: u8,
    pub frame_counter: u8,
    pub sprite_index: u8,
}

impl SpriteEntry {
    pub fn decode(layout: &EntryLayout, bytes: &[u8]) -> Self {
        Self {
            anim_index: layout.anim_index.get(bytes),
            frame_counter: layout.frame_counter.map_or(0, |f| f.get(bytes)),
            sprite_index: layout.sprite_index.get(bytes),
        }
    }

    pub fn encode(&self, layout: &EntryLayout, bytes: &mut [u8]) {
        layout.anim_index.set(bytes, self.anim_index);
        if let Some(f) = layout.frame_counter {
            f.set(bytes, self.frame_counter);
        }
        layout.sprite_index.set(bytes, self.sprite_index);
    }
}

/// Packed animation definition. Fields the layout lacks read as zero.
#[derive(Debug, Clone, Copy)]
pub struct AnimationDef {
    raw: [u8; 4],
    layout: &'static AnimLayout,
}

impl AnimationDef {
    pub fn new(layout: &'static AnimLayout) -> Self {
        Self { raw: [0; 4], layout }
    }

    pub fn from_bytes(layout: &'static AnimLayout, bytes: &[u8]) -> Self {
        let mut raw = [0; 4];
        raw[..layout.size].copy_from_slice(&bytes[..layout.size]);
        Self { raw, layout }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.raw[..self.layout.size]
    }

    fn opt(&self, field: Option<BitField>) -> u8 {
        field.map_or(0, |f| f.get(&self.raw))
    }

    fn set_opt(&mut self, field: Option<BitField>, value: u8) {
        if let Some(f) = field {
            f.set(&mut self.raw, value);
        }
    }

    pub fn speed(&self) -> u8 {
        self.opt(self.layout.speed)
    }

    pub fn set_speed(&mut self, value: u8) {
        self.set_opt(self.layout.speed, value);
    }

    pub fn next_anim_index(&self) -> u8 {
        self.layout.next_anim_index.get(&self.raw)
    }

    pub fn set_next_anim_index(&mut self, value: u8) {
        self.layout.next_anim_index.set(&mut self.raw, value);
    }

    pub fn x_offset(&self) -> u8 {
        self.layout.x_offset.get(&self.raw)
    }

    pub fn set_x_offset(&mut self, value: u8) {
        self.layout.x_offset.set(&mut self.raw, value);
    }

    pub fn y_offset(&self) -> u8 {
        self.layout.y_offset.get(&self.raw)
    }

    pub fn set_y_offset(&mut self, value: u8) {
        self.layout.y_offset.set(&mut self.raw, value);
    }

    pub fn sprite_offset(&self) -> u8 {
        self.layout.sprite_offset.get(&self.raw)
    }

    pub fn set_sprite_offset(&mut self, value: u8) {
        self.layout.sprite_offset.set(&mut self.raw, value);
    }

    pub fn horizontal_flip(&self) -> bool {
        self.opt(self.layout.horizontal_flip) != 0
    }

    pub fn set_horizontal_flip(&mut self, on: bool) {
        self.set_opt(self.layout.horizontal_flip, on as u8);
    }

    pub fn vertical_flip(&self) -> bool {
        self.opt(self.layout.vertical_flip) != 0
    }

    pub fn set_vertical_flip(&mut self, on: bool) {
        self.set_opt(self.layout.vertical_flip, on as u8);
    }

    pub fn rotate(&self) -> bool {
        self.opt(self.layout.rotate) != 0
    }

    pub fn set_rotate(&mut self, on: bool) {
        self.set_opt(self.layout.rotate, on as u8);
    }

    pub fn palette_offset(&self) -> u8 {
        self.opt(self.layout.palette_offset)
    }

    pub fn set_palette_offset(&mut self, value: u8) {
        self.set_opt(self.layout.palette_offset, value);
    }
}
