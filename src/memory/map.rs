//! Main-CPU memory map description: one `start,end,kind` region per line.

use std::path::Path;

use super::RegionKind;
use crate::error::MapError;

pub const MAX_REGIONS: usize = 16;
pub const MAX_LINE_LEN: usize = 80;

/// One declared region; `end` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub start: u16,
    pub end: u16,
    pub kind: RegionKind,
    pub line: usize,
}

fn parse_addr(text: &str, line: usize) -> Result<u16, MapError> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse::<u16>(),
    };
    parsed.map_err(|_| MapError::BadNumber {
        line,
        text: text.to_string(),
    })
}

pub fn parse_memory_map(text: &str) -> Result<Vec<MapEntry>, MapError> {
    let mut entries: Vec<MapEntry> = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        if raw.len() > MAX_LINE_LEN {
            return Err(MapError::LineTooLong { line, max: MAX_LINE_LEN });
        }
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let fields: Vec<&str> = content.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(MapError::FieldCount {
                line,
                found: fields.len(),
            });
        }
        let start = parse_addr(fields[0], line)?;
        let end = parse_addr(fields[1], line)?;
        if end < start {
            return Err(MapError::EndBeforeStart { line });
        }
        let kind = match fields[2].to_ascii_lowercase().as_str() {
            "ram" => RegionKind::Ram,
            "rom" => RegionKind::Rom,
            other => {
                return Err(MapError::UnknownKind {
                    line,
                    kind: other.to_string(),
                })
            }
        };
        if entries.iter().any(|e| start <= e.end && e.start <= end) {
            return Err(MapError::Overlap { line });
        }
        if entries.len() == MAX_REGIONS {
            return Err(MapError::TooManyRegions { max: MAX_REGIONS });
        }
        entries.push(MapEntry { start, end, kind, line });
    }
    Ok(entries)
}

pub fn load_memory_map(path: &Path) -> Result<Vec<MapEntry>, MapError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| MapError::Io(format!("couldn't read {}: {}", path.display(), e)))?;
    let entries = parse_memory_map(&text)?;
    log::info!("Loaded {} memory map regions from {}", entries.len(), path.display());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_regions_and_comments() {
        let text = "# main board\n0x0000,0x7FFF,rom\n\n32768, 49151 , RAM  # work ram\n";
        let entries = parse_memory_map(text).unwrap();
        assert_eq!(
            entries,
            vec![
                MapEntry {
                    start: 0x0000,
                    end: 0x7FFF,
                    kind: RegionKind::Rom,
                    line: 2
                },
                MapEntry {
                    start: 0x8000,
                    end: 0xBFFF,
                    kind: RegionKind::Ram,
                    line: 4
                },
            ]
        );
    }

    #[test]
    fn test_field_count() {
        assert_eq!(
            parse_memory_map("0x0000,0x7FFF"),
            Err(MapError::FieldCount { line: 1, found: 2 })
        );
        assert_eq!(
            parse_memory_map("0,1,rom,extra"),
            Err(MapError::FieldCount { line: 1, found: 4 })
        );
    }

    #[test]
    fn test_bad_numbers() {
        assert!(matches!(
            parse_memory_map("0xZZ,0x10,rom"),
            Err(MapError::BadNumber { line: 1, .. })
        ));
        assert!(matches!(
            parse_memory_map("0,70000,rom"),
            Err(MapError::BadNumber { line: 1, .. })
        ));
    }

    #[test]
    fn test_end_before_start() {
        assert_eq!(
            parse_memory_map("0x100,0x0FF,ram"),
            Err(MapError::EndBeforeStart { line: 1 })
        );
    }

    #[test]
    fn test_unknown_kind() {
        assert_eq!(
            parse_memory_map("0,0xFF,flash"),
            Err(MapError::UnknownKind {
                line: 1,
                kind: "flash".to_string()
            })
        );
    }

    #[test]
    fn test_overlap() {
        assert_eq!(
            parse_memory_map("0,0x1000,rom\n0x1000,0x2000,ram"),
            Err(MapError::Overlap { line: 2 })
        );
    }

    #[test]
    fn test_too_many_regions() {
        let text: String = (0..17).map(|i| format!("{},{},ram\n", i * 16, i * 16 + 15)).collect();
        assert_eq!(
            parse_memory_map(&text),
            Err(MapError::TooManyRegions { max: MAX_REGIONS })
        );
    }

    #[test]
    fn test_line_too_long() {
        let text = format!("0,1,rom #{}", "x".repeat(80));
        assert_eq!(
            parse_memory_map(&text),
            Err(MapError::LineTooLong { line: 1, max: MAX_LINE_LEN })
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_memory_map(Path::new("/nonexistent/twinchip.map")).unwrap_err();
        assert!(matches!(err, MapError::Io(_)));
    }
}
