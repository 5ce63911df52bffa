//! Offsets command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use uefind_core::OffsetList;

/// Run the offsets command
pub fn run(path: &Path, json: bool) -> Result<()> {
    let list = OffsetList::load(path)
        .with_context(|| format!("Failed to load offsets from {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&list.entries)?);
        return Ok(());
    }

    if let Some(name) = &list.process_name {
        println!("Process: {}", name);
    }
    println!("{} offsets", list.len());
    println!();
    for entry in &list.entries {
        println!("  {:<24} {:<14} {}", entry.name, entry.offset, entry.absolute);
    }
    Ok(())
}
