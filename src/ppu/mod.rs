//! Picture processing: beam timing, table formats, framebuffer layout and
//! the sprite compositor.

pub mod pixel_map;
pub mod registers;
pub mod renderer;
pub mod timing;


pub use pixel_map::{FrameView, PixelMap};
pub use registers::{AnimationDef, BitField, SpriteEntry, VideoControl};
pub use renderer::{RenderPipeline, RenderStats};
pub use timing::{BeamStep, BeamTimer, Edge, Section, VideoBeamState};

use crate::config::{DisplayMode, PpuLayout, Profile};
use crate::display::DisplaySink;
use crate::memory::{AddressSpace, Origin};

/// The PPU's fixed-function side. Its instruction stream runs on an executor
/// owned by the machine; this owns the beam and the render path.
#[derive(Debug, Clone)]
pub struct Ppu {
    timer: BeamTimer,
    pipeline: RenderPipeline,
    map: PixelMap,
    layout: PpuLayout,
    display_mode: DisplayMode,
    video_gate: bool,
    frames_presented: u64,
}

impl Ppu {
    pub fn new(profile: &Profile) -> Self {
        Self {
            timer: BeamTimer::new(profile.beam),
            pipeline: RenderPipeline::new(profile),
            map: PixelMap::new(profile.frame),
            layout: profile.layout,
            display_mode: profile.display_mode,
            video_gate: profile.video_gate,
            frames_presented: 0,
        }
    }

    pub fn beam(&self) -> VideoBeamState {
        self.timer.state()
    }

    pub fn timer(&self) -> &BeamTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut BeamTimer {
        &mut self.timer
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn pixel_map(&self) -> &PixelMap {
        &self.map
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn set_frames_presented(&mut self, frames: u64) {
        self.frames_presented = frames;
    }

    pub fn video_control(&self, space: &AddressSpace, tables: &[u8]) -> VideoControl {
        VideoControl::from_bits_retain(space.read(self.layout.video_control, tables))
    }

    fn video_on(&self, space: &AddressSpace, tables: &[u8]) -> bool {
        !self.video_gate || self.video_control(space, tables).contains(VideoControl::VIDEO_ON)
    }

    /// Clears a pending `RENDER` request and reports whether there was one.
    pub fn take_render_request(&self, space: &mut AddressSpace, tables: &mut [u8]) -> bool {
        let mut control = self.video_control(space, tables);
        if !control.contains(VideoControl::RENDER) {
            return false;
        }
        control.remove(VideoControl::RENDER);
        space.write(self.layout.video_control, control.bits(), Origin::Emulator, tables);
        true
    }

    pub fn render(&self, space: &mut AddressSpace, tables: &mut [u8]) -> RenderStats {
        let stats = self.pipeline.render(space, tables);
        log::trace!(
            "Rendered {} entries ({} advanced, {} pixels, {} clipped)",
            stats.entries,
            stats.advanced,
            stats.pixels_written,
            stats.pixels_clipped
        );
        stats
    }

    pub fn frame_view<'a>(&self, space: &'a AddressSpace, tables: &[u8]) -> FrameView<'a> {
        let bytes = space.bytes_at(self.layout.pixel_base()).unwrap_or(&[]);
        FrameView::new(bytes, self.map, self.video_on(space, tables))
    }

    /// Advances the beam one step, streaming the passed pixel and presenting
    /// the frame when the last visible line ends.
    pub fn step_beam(&mut self, space: &AddressSpace, tables: &[u8], sink: &mut dyn DisplaySink) -> Option<Edge> {
        let step = self.timer.step();
        if let Some((x, y)) = step.pixel {
            if self.display_mode == DisplayMode::PerPixel {
                let colour = if self.video_on(space, tables) {
                    let offset = self.map.beam_offset(x, y);
                    space.read(self.layout.pixel_base().wrapping_add(offset as u16), tables)
                } else {
                    0
                };
                sink.set_pixel(x, y, colour);
            }
        }
        if let Some(Edge::HblankEntry { after_last_line: true }) = step.edge {
            sink.present_frame(&self.frame_view(space, tables));
            self.frames_presented += 1;
        }
        step.edge
    }
}
