use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::EmuError;

/// Reads at most `capacity` bytes of a raw ROM dump. Short files are fine;
/// the caller gets exactly the bytes that were present.
pub fn load_rom_image(path: &Path, capacity: usize) -> Result<Vec<u8>, EmuError> {
    let missing = |source| EmuError::MissingRom {
        path: path.to_path_buf(),
        source,
    };
    log::info!("Reading {}", path.display());
    let file = File::open(path).map_err(missing)?;
    let mut image = Vec::with_capacity(capacity);
    file.take(capacity as u64)
        .read_to_end(&mut image)
        .map_err(missing)?;
    log::info!("Read {} bytes", image.len());
    Ok(image)
}
