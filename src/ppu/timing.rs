//! Video beam state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::BeamGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    Display,
    Hblank,
    Vblank,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Display => write!(f, "DISPLAY"),
            Section::Hblank => write!(f, "HBLANK"),
            Section::Vblank => write!(f, "VBLANK"),
        }
    }
}

/// A transition into a new section.
///
/// Entries into DISPLAY are split by where the beam came from: `FrameStart`
/// leaves VBLANK, `LineStart` leaves HBLANK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    HblankEntry { after_last_line: bool },
    VblankEntry,
    FrameStart,
    LineStart,
}

impl Edge {
    pub fn section(self) -> Section {
        match self {
            Edge::HblankEntry { .. } => Section::Hblank,
            Edge::VblankEntry => Section::Vblank,
            Edge::FrameStart | Edge::LineStart => Section::Display,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoBeamState {
    pub section: Section,
    pub h: u32,
    pub v: u32,
}

impl VideoBeamState {
    pub const POWER_ON: Self = Self {
        section: Section::Display,
        h: 0,
        v: 0,
    };
}

/// What a single beam step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BeamStep {
    /// Visible position passed in DISPLAY, in beam coordinates.
    pub pixel: Option<(u32, u32)>,
    pub edge: Option<Edge>,
}

/// Every line takes exactly `total_width` steps: DISPLAY covers
/// `h = 0..=visible_width` and the blanking sections wrap at `total_width - 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamTimer {
    geometry: BeamGeometry,
    state: VideoBeamState,
    frames: u64,
}

impl BeamTimer {
    pub fn new(geometry: BeamGeometry) -> Self {
        Self {
            geometry,
            state: VideoBeamState::POWER_ON,
            frames: 0,
        }
    }

    pub fn state(&self) -> VideoBeamState {
        self.state
    }

    /// Places the beam mid-frame.
    #[cfg(test)]
    pub(crate) fn set_state(&mut self, state: VideoBeamState) {
        self.state = state;
    }

    /// Completed frames since power-on.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn step(&mut self) -> BeamStep {
        let g = self.geometry;
        let VideoBeamState { section, h, v } = self.state;
        let line_end = g.total_width - 1;
        let mut out = BeamStep::default();

        self.state = match section {
            Section::Display if h < g.visible_width => {
                out.pixel = Some((h, v));
                VideoBeamState { section, h: h + 1, v }
            }
            Section::Display => {
                out.edge = Some(Edge::HblankEntry {
                    after_last_line: v + 1 == g.visible_height,
                });
                VideoBeamState {
                    section: Section::Hblank,
                    h: h + 1,
                    v,
                }
            }
            Section::Hblank | Section::Vblank if h < line_end => VideoBeamState { section, h: h + 1, v },
            Section::Hblank if v + 1 == g.visible_height => {
                out.edge = Some(Edge::VblankEntry);
                VideoBeamState {
                    section: Section::Vblank,
                    h: 0,
                    v: v + 1,
                }
            }
            Section::Hblank => {
                out.edge = Some(Edge::LineStart);
                VideoBeamState {
                    section: Section::Display,
                    h: 0,
                    v: v + 1,
                }
            }
            Section::Vblank if v + 1 == g.total_height => {
                self.frames += 1;
                out.edge = Some(Edge::FrameStart);
                VideoBeamState::POWER_ON
            }
            Section::Vblank => VideoBeamState { section, h: 0, v: v + 1 },
        };
        out
    }
}
