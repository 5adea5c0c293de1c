//! Display sinks: where the beam sends pixels and finished frames.

use crate::ppu::FrameView;

pub trait DisplaySink {
    /// Per-pixel streaming, in beam coordinates.
    fn set_pixel(&mut self, x: u32, y: u32, colour: u8);

    /// Called on the HBLANK entry that follows the last visible line.
    fn present_frame(&mut self, frame: &FrameView<'_>);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn set_pixel(&mut self, _x: u32, _y: u32, _colour: u8) {}

    fn present_frame(&mut self, _frame: &FrameView<'_>) {}
}

/// Headless sink that keeps the most recent frame in raster order.
#[derive(Debug, Default)]
pub struct FrameCapture {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
    pub frames: u64,
    pub streamed_pixels: u64,
}

impl FrameCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        if x < self.width && y < self.height {
            self.pixels.get(y * self.width + x).copied()
        } else {
            None
        }
    }

    /// Binary PPM of the last frame, colours decoded to RGB.
    pub fn to_ppm(&self) -> Vec<u8> {
        let mut out = format!("P6\n{} {}\n255\n", self.width, self.height).into_bytes();
        for &p in &self.pixels {
            let (r, g, b) = decode_colour(p);
            out.extend_from_slice(&[r, g, b]);
        }
        out
    }
}

impl DisplaySink for FrameCapture {
    fn set_pixel(&mut self, _x: u32, _y: u32, _colour: u8) {
        self.streamed_pixels += 1;
    }

    fn present_frame(&mut self, frame: &FrameView<'_>) {
        self.width = frame.width();
        self.height = frame.height();
        self.pixels = if frame.video_on() {
            frame.to_raster()
        } else {
            vec![0; self.width * self.height]
        };
        self.frames += 1;
    }
}

/// Colour byte layout: `..bbggrr`, each 2-bit channel widened to 8 bits.
pub fn decode_colour(pixel: u8) -> (u8, u8, u8) {
    let widen = |c: u8| c | (c << 2) | (c << 4) | (c << 6);
    (widen(pixel & 0b11), widen((pixel >> 2) & 0b11), widen((pixel >> 4) & 0b11))
}
