//! Host-side demo scene: two tiles alternating across the whole grid.

use crate::config::PixelFormat;
use crate::cpu::ProcessorId;
use crate::machine::Machine;
use crate::ppu::{SpriteEntry, VideoControl};

const SOLID: u8 = 0xDD;
// Palette used to express the demo colours as 4-bit indices.
const DEMO_PALETTE: [u8; 4] = [0x00, 0xDD, 0xBB, 0x99];

/// 8x8 tile of colour 0xDD.
pub fn solid_tile() -> Vec<u8> {
    vec![SOLID; 64]
}

/// Even rows alternate 0x00/0xDD, odd rows 0xBB/0x99.
pub fn checker_tile() -> Vec<u8> {
    let mut tile = Vec::with_capacity(64);
    for row in 0..8 {
        for column in 0..8 {
            tile.push(match (row % 2 == 0, column % 2 == 0) {
                (true, true) => 0x00,
                (true, false) => SOLID,
                (false, true) => 0xBB,
                (false, false) => 0x99,
            });
        }
    }
    tile
}

fn pack_indexed(colours: &[u8]) -> Vec<u8> {
    let index = |c: u8| DEMO_PALETTE.iter().position(|&p| p == c).unwrap_or(0) as u8;
    colours
        .chunks(2)
        .map(|pair| index(pair[0]) | index(pair.get(1).copied().unwrap_or(0)) << 4)
        .collect()
}

/// Loads the two tiles into definition slots 0 and 1 and points every sprite
/// entry at them in turn. Animation definition 0 stays all-zero, a still
/// frame that loops on itself.
pub fn install(machine: &mut Machine) {
    let profile = machine.profile().clone();
    match profile.pixel_format {
        PixelFormat::Direct => {
            machine.load_tile(0, &solid_tile());
            machine.load_tile(1, &checker_tile());
        }
        PixelFormat::Indexed4 => {
            machine.load_tile(0, &pack_indexed(&solid_tile()));
            machine.load_tile(1, &pack_indexed(&checker_tile()));
            machine.load(ProcessorId::Ppu, profile.layout.palette, &DEMO_PALETTE);
        }
    }
    let blank = machine.blank_anim();
    machine.write_anim(0, &blank);

    for i in 0..profile.frame.entry_count() {
        let entry = SpriteEntry {
            anim_index: 0,
            frame_counter: 0,
            sprite_index: (i % 2) as u8,
        };
        machine.write_entry(i, &entry);
    }
    if profile.video_gate {
        machine.poke(ProcessorId::Ppu, profile.layout.video_control, VideoControl::VIDEO_ON.bits());
    }
    log::info!("Demo scene installed in {} sprite entries", profile.frame.entry_count());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    #[test]
    fn test_checker_pattern() {
        let tile = checker_tile();
        assert_eq!(&tile[..4], &[0x00, 0xDD, 0x00, 0xDD]);
        assert_eq!(&tile[8..12], &[0xBB, 0x99, 0xBB, 0x99]);
    }

    #[test]
    fn test_pack_indexed_low_nibble_first() {
        assert_eq!(pack_indexed(&[0x00, 0xDD, 0xBB, 0x99]), vec![0x10, 0x32]);
    }

    #[test]
    fn test_revised_demo_renders_same_colours() {
        let mut machine = Machine::new(Profile::revised(), None).unwrap();
        install(&mut machine);
        machine.render();
        let frame = machine.frame_view();
        assert!(frame.video_on());
        assert_eq!(&frame.bytes()[0..64], &solid_tile()[..]);
        assert_eq!(&frame.bytes()[64..128], &checker_tile()[..]);
    }
}
