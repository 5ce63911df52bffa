//! Saved offset list
//!
//! Line-oriented text: `#` lines are comments, data lines are exactly
//! `Name,Offset,AbsoluteAddress`. Commas are never quoted or escaped.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{format_hex_address, parse_hex_address};
use crate::error::{Error, Result};
use crate::memory::{ModuleInfo, ProcessInfo};

pub const FORMAT_VERSION: &str = "1.0";

/// Inputs within this distance above the module base are taken as absolute.
pub const RELATIVE_SPAN: u64 = 0x1000_0000;

const PROCESS_NAME_PREFIX: &str = "# Process Name:";
const BASE_UNKNOWN: &str = "Module base unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetEntry {
    pub name: String,
    pub offset: String,
    pub absolute: String,
}

impl OffsetEntry {
    /// Build an entry from a user-supplied address.
    ///
    /// An address inside `(base, base + RELATIVE_SPAN)` is converted to a
    /// module offset. Anything else is taken to be an offset already.
    pub fn from_input(name: impl Into<String>, address: u64, module_base: u64) -> Self {
        let name = name.into();
        let is_absolute = module_base != 0
            && address > module_base
            && address < module_base.saturating_add(RELATIVE_SPAN);

        let (offset, absolute) = if is_absolute {
            let offset = address - module_base;
            info!(
                "Converted absolute address 0x{:X} to offset 0x{:X}",
                address, offset
            );
            (offset, format_hex_address(address, true))
        } else if module_base != 0 {
            (address, format_hex_address(module_base.wrapping_add(address), true))
        } else {
            (address, BASE_UNKNOWN.to_string())
        };

        Self {
            name,
            offset: format_hex_address(offset, true),
            absolute,
        }
    }

    /// Entry for an address known to be absolute, such as a resolved global.
    ///
    /// `None` when `address` lies below `module_base`.
    pub fn from_absolute(name: impl Into<String>, address: u64, module_base: u64) -> Option<Self> {
        let offset = address.checked_sub(module_base)?;
        Some(Self {
            name: name.into(),
            offset: format_hex_address(offset, true),
            absolute: format_hex_address(address, true),
        })
    }

    pub fn offset_value(&self) -> u64 {
        parse_hex_address(&self.offset)
    }

    pub fn to_line(&self) -> String {
        format!("{},{},{}", self.name, self.offset, self.absolute)
    }
}

impl FromStr for OffsetEntry {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [name, offset, absolute] = fields[..] else {
            return Err(Error::InvalidOffsetLine(line.to_string()));
        };
        if name.is_empty() || offset.is_empty() {
            return Err(Error::InvalidOffsetLine(line.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            offset: offset.to_string(),
            absolute: absolute.to_string(),
        })
    }
}

/// Process context written into the list header.
#[derive(Debug, Clone)]
pub struct GameInfo {
    pub process: ProcessInfo,
    pub module: ModuleInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetList {
    pub process_name: Option<String>,
    pub entries: Vec<OffsetEntry>,
}

impl OffsetList {
    /// Parse list text. Malformed data lines are skipped with a warning.
    pub fn parse(text: &str) -> Self {
        let mut list = Self::default();

        for (index, line) in text.lines().enumerate() {
            if let Some(name) = line.strip_prefix(PROCESS_NAME_PREFIX) {
                let name = name.trim();
                if !name.is_empty() {
                    list.process_name = Some(name.to_string());
                }
            }

            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            match line.parse::<OffsetEntry>() {
                Ok(entry) => list.entries.push(entry),
                Err(_) => warn!("Skipped invalid line {}: {}", index + 1, line),
            }
        }

        list
    }

    pub fn push(&mut self, entry: OffsetEntry) {
        self.entries.push(entry);
    }

    pub fn remove(&mut self, index: usize) -> Option<OffsetEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self, game: Option<&GameInfo>) -> String {
        self.render_at(game, Local::now())
    }

    /// Render with an explicit generation time.
    pub fn render_at(&self, game: Option<&GameInfo>, generated: DateTime<Local>) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_header(&mut out, game, generated);
        for entry in &self.entries {
            out.push_str(&entry.to_line());
            out.push('\n');
        }
        out
    }

    fn write_header(
        &self,
        out: &mut String,
        game: Option<&GameInfo>,
        generated: DateTime<Local>,
    ) -> std::fmt::Result {
        writeln!(out, "# Unreal Offset Finder - Saved Offsets")?;
        writeln!(out, "# File Format Version: {}", FORMAT_VERSION)?;
        writeln!(out, "# Generated on: {}", generated.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(out, "# Tool Version: {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(out, "#")?;

        writeln!(out, "# === Game Information ===")?;
        match game {
            Some(GameInfo { process, module }) => {
                writeln!(out, "{} {}", PROCESS_NAME_PREFIX, process.name)?;
                writeln!(out, "# Process ID: {} (changes on restart)", process.pid)?;
                writeln!(
                    out,
                    "# Module Base: {} (changes with ASLR)",
                    format_hex_address(module.base_address, true)
                )?;
                writeln!(
                    out,
                    "# Module Size: {}",
                    format_hex_address(module.image_size, true)
                )?;
                if process.base_address != 0 && process.base_address != module.base_address {
                    writeln!(
                        out,
                        "# Process Base: {}",
                        format_hex_address(process.base_address, true)
                    )?;
                }
            }
            None => writeln!(out, "# Status: Not connected to any process")?,
        }
        writeln!(out, "# Offset Count: {}", self.entries.len())?;

        writeln!(out, "#")?;
        writeln!(out, "# === Format Information ===")?;
        writeln!(out, "# Format: Name,Offset,AbsoluteAddress")?;
        writeln!(out, "# Note: Offsets are relative to module base address")?;
        writeln!(out, "# Note: Absolute addresses change with ASLR, use offsets!")?;
        writeln!(out, "#")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let list = Self::parse(&content);
        info!(
            "Loaded {} offsets from {}{}",
            list.len(),
            path.as_ref().display(),
            list.process_name
                .as_deref()
                .map(|name| format!(" (Game: {})", name))
                .unwrap_or_default()
        );
        Ok(list)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, game: Option<&GameInfo>) -> Result<()> {
        fs::write(&path, self.render(game))?;
        info!("Saved {} offsets to {}", self.len(), path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    const BASE: u64 = 0x7FF6_1000_0000;

    fn game() -> GameInfo {
        GameInfo {
            process: ProcessInfo {
                pid: 4242,
                name: "Game-Win64-Shipping.exe".to_string(),
                base_address: BASE,
                image_size: 0x500_0000,
            },
            module: ModuleInfo::new("Game-Win64-Shipping.exe", BASE, 0x500_0000),
        }
    }

    #[test]
    fn test_from_input_converts_absolute_address() {
        let entry = OffsetEntry::from_input("GWorld", BASE + 0x8A2_3C40, BASE);
        assert_eq!(entry.offset, "0x8A23C40");
        assert_eq!(entry.absolute, format!("0x{:X}", BASE + 0x8A2_3C40));
        assert_eq!(entry.offset_value(), 0x8A2_3C40);
    }

    #[test]
    fn test_from_input_treats_small_values_as_offsets() {
        let entry = OffsetEntry::from_input("GNames", 0x8A2_3C40, BASE);
        assert_eq!(entry.offset, "0x8A23C40");
        assert_eq!(entry.absolute, format!("0x{:X}", BASE + 0x8A2_3C40));

        // Exactly the base and exactly base + span are not converted.
        let at_base = OffsetEntry::from_input("A", BASE, BASE);
        assert_eq!(at_base.offset_value(), BASE);
        let at_span = OffsetEntry::from_input("B", BASE + RELATIVE_SPAN, BASE);
        assert_eq!(at_span.offset_value(), BASE + RELATIVE_SPAN);
    }

    #[test]
    fn test_from_input_without_base() {
        let entry = OffsetEntry::from_input("GObjects", 0x1234, 0);
        assert_eq!(entry.offset, "0x1234");
        assert_eq!(entry.absolute, "Module base unknown");
    }

    #[test]
    fn test_from_absolute_beyond_relative_span() {
        let address = BASE + 0x1200_0000;
        let entry = OffsetEntry::from_absolute("GWorld", address, BASE).unwrap();
        assert_eq!(entry.offset, "0x12000000");
        assert_eq!(entry.absolute, format!("0x{:X}", address));

        assert!(OffsetEntry::from_absolute("GNames", BASE - 0x10, BASE).is_none());
    }

    #[test]
    fn test_entry_parse_trims_fields() {
        let entry: OffsetEntry = " GWorld , 0x10 , 0x140000010 ".parse().unwrap();
        assert_eq!(entry.name, "GWorld");
        assert_eq!(entry.offset, "0x10");
        assert_eq!(entry.absolute, "0x140000010");
    }

    #[test]
    fn test_entry_parse_rejects_extra_fields() {
        assert!(matches!(
            "GWorld,0x10,note, with comma".parse::<OffsetEntry>(),
            Err(Error::InvalidOffsetLine(_))
        ));
    }

    #[test]
    fn test_entry_parse_rejects_short_lines() {
        assert!(matches!(
            "GWorld,0x10".parse::<OffsetEntry>(),
            Err(Error::InvalidOffsetLine(_))
        ));
        assert!(",0x10,0x20".parse::<OffsetEntry>().is_err());
        assert!("GWorld,,0x20".parse::<OffsetEntry>().is_err());
    }

    #[test]
    fn test_parse_list() {
        let text = "\
# Unreal Offset Finder - Saved Offsets
# Process Name: Game.exe
#
GWorld,0x8A23C40,0x7FF618A23C40
broken line
GObjects,0x10,0x140000010,extra
GNames,0x89F0000,Module base unknown

";
        let list = OffsetList::parse(text);
        assert_eq!(list.process_name.as_deref(), Some("Game.exe"));
        assert_eq!(list.len(), 2);
        assert_eq!(list.entries[1].absolute, "Module base unknown");
    }

    #[test]
    fn test_render_header_and_entries() {
        let mut list = OffsetList::default();
        list.push(OffsetEntry::from_input("GWorld", BASE + 0x100, BASE));

        let generated = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let text = list.render_at(Some(&game()), generated);

        assert!(text.contains("# Generated on: 2024-03-01 12:30:00\n"));
        assert!(text.contains("# Process Name: Game-Win64-Shipping.exe\n"));
        assert!(text.contains("# Module Size: 0x5000000\n"));
        assert!(text.contains("# Offset Count: 1\n"));
        assert!(!text.contains("# Process Base:"));
        assert!(text.ends_with(&format!("GWorld,0x100,0x{:X}\n", BASE + 0x100)));

        let disconnected = list.render_at(None, generated);
        assert!(disconnected.contains("# Status: Not connected to any process\n"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offsets.txt");

        let mut list = OffsetList::default();
        list.push(OffsetEntry::from_input("GWorld", BASE + 0x100, BASE));
        list.push(OffsetEntry::from_input("GObjects", 0x200, 0));
        list.save(&path, Some(&game())).unwrap();

        let loaded = OffsetList::load(&path).unwrap();
        assert_eq!(loaded.process_name.as_deref(), Some("Game-Win64-Shipping.exe"));
        assert_eq!(loaded.entries, list.entries);
    }

    #[test]
    fn test_remove() {
        let mut list = OffsetList::default();
        list.push(OffsetEntry::from_input("A", 1, 0));
        assert!(list.remove(3).is_none());
        assert_eq!(list.remove(0).map(|e| e.name), Some("A".to_string()));
        assert!(list.is_empty());
    }
}
