//! SDL2 window sink, built with the `window` feature.

use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;

use crate::config::Profile;
use crate::display::{decode_colour, DisplaySink};
use crate::ppu::FrameView;

pub struct SdlWindow {
    canvas: Canvas<Window>,
    textures: TextureCreator<WindowContext>,
    events: EventPump,
    width: u32,
    height: u32,
    scale: u32,
    rgb: Vec<u8>,
    streamed: bool,
    closed: bool,
}

impl SdlWindow {
    /// Opens a window the size of the scaled visible area. Fails without a
    /// video device; callers fall back to headless output.
    pub fn open(profile: &Profile, title: &str) -> Result<Self, String> {
        let scale = profile.frame.display_scale;
        let width = profile.frame.visible_width as u32 * scale;
        let height = profile.frame.visible_height as u32 * scale;

        let sdl = sdl2::init()?;
        let video = sdl.video()?;
        let window = video
            .window(title, width, height)
            .position_centered()
            .build()
            .map_err(|e| e.to_string())?;
        let canvas = window.into_canvas().build().map_err(|e| e.to_string())?;
        let textures = canvas.texture_creator();
        let events = sdl.event_pump()?;
        log::info!("Window opened at {}x{}", width, height);

        Ok(Self {
            canvas,
            textures,
            events,
            width,
            height,
            scale,
            rgb: vec![0; (width * height * 3) as usize],
            streamed: false,
            closed: false,
        })
    }

    /// True once the user closed the window or pressed Escape.
    pub fn closed(&self) -> bool {
        self.closed
    }

    fn put(&mut self, x: u32, y: u32, colour: u8) {
        if x >= self.width || y >= self.height {
            return;
        }
        let (r, g, b) = decode_colour(colour);
        let at = ((y * self.width + x) * 3) as usize;
        self.rgb[at..at + 3].copy_from_slice(&[r, g, b]);
    }

    fn blit_frame(&mut self, frame: &FrameView<'_>) {
        let raster = if frame.video_on() {
            frame.to_raster()
        } else {
            vec![0; frame.width() * frame.height()]
        };
        for y in 0..self.height {
            for x in 0..self.width {
                let src = (y / self.scale) as usize * frame.width() + (x / self.scale) as usize;
                self.put(x, y, raster.get(src).copied().unwrap_or(0));
            }
        }
    }

    fn upload(&mut self) -> Result<(), String> {
        let mut texture = self
            .textures
            .create_texture_streaming(PixelFormatEnum::RGB24, self.width, self.height)
            .map_err(|e| e.to_string())?;
        texture
            .update(None, &self.rgb, (self.width * 3) as usize)
            .map_err(|e| e.to_string())?;
        self.canvas.copy(&texture, None, None)?;
        self.canvas.present();
        Ok(())
    }

    fn pump(&mut self) {
        for event in self.events.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => self.closed = true,
                _ => {}
            }
        }
    }
}

impl DisplaySink for SdlWindow {
    fn set_pixel(&mut self, x: u32, y: u32, colour: u8) {
        self.streamed = true;
        self.put(x, y, colour);
    }

    fn present_frame(&mut self, frame: &FrameView<'_>) {
        if !self.streamed {
            self.blit_frame(frame);
        }
        self.streamed = false;
        if let Err(e) = self.upload() {
            log::warn!("Frame upload failed: {}", e);
        }
        self.pump();
    }
}
