//! Tile-grouped framebuffer addressing.
//!
//! Pixels are stored tile by tile: the 64 bytes of one 8x8 tile are
//! contiguous, tiles of a tile-row follow each other, and a tile-row is
//! `grid_width * tile_area` bytes long. Raster order never appears in memory.

use crate::config::FrameGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelMap {
    geometry: FrameGeometry,
}

impl PixelMap {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Byte offset of framebuffer pixel `(x, y)` from the start of pixel RAM.
    pub fn offset(&self, x: usize, y: usize) -> usize {
        let ts = self.geometry.tile_size as usize;
        (x / ts) * self.geometry.tile_area() + (y / ts) * self.geometry.row_stride() + (x % ts) + (y % ts) * ts
    }

    /// Offset of the beam position `(bx, by)`, scaled down to framebuffer pixels.
    pub fn beam_offset(&self, bx: u32, by: u32) -> usize {
        let scale = self.geometry.display_scale;
        self.offset((bx / scale) as usize, (by / scale) as usize)
    }

    pub fn in_bounds(&self, x: usize, y: usize) -> bool {
        x < self.geometry.visible_width as usize && y < self.geometry.visible_height as usize
    }
}

/// Borrowed framebuffer handed to display sinks and dumps.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    bytes: &'a [u8],
    map: PixelMap,
    video_on: bool,
}

impl<'a> FrameView<'a> {
    pub fn new(bytes: &'a [u8], map: PixelMap, video_on: bool) -> Self {
        Self { bytes, map, video_on }
    }

    pub fn width(&self) -> usize {
        self.map.geometry().visible_width as usize
    }

    pub fn height(&self) -> usize {
        self.map.geometry().visible_height as usize
    }

    pub fn video_on(&self) -> bool {
        self.video_on
    }

    /// Raw tile-grouped pixel RAM.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn map(&self) -> &PixelMap {
        &self.map
    }

    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.bytes.get(self.map.offset(x, y)).copied().unwrap_or(0)
    }

    /// Visible pixels in raster order.
    pub fn to_raster(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width() * self.height());
        for y in 0..self.height() {
            for x in 0..self.width() {
                out.push(self.pixel(x, y));
            }
        }
        out
    }

    /// One line per raster row, every pixel as a `|x|` cell in hex.
    pub fn dump_cells(&self) -> String {
        let mut out = String::with_capacity(self.width() * self.height() * 4);
        for y in 0..self.height() {
            for x in 0..self.width() {
                out.push_str(&format!("|{:x}|", self.pixel(x, y)));
            }
            out.push('\n');
        }
        out
    }
}
