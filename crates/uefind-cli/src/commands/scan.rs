//! Scan command implementation.

use std::path::Path;

use anyhow::{Result, anyhow, bail};
use serde_json::json;
use tracing::warn;
use uefind_core::{
    GameInfo, ImageFile, MemoryPort, OffsetEntry, OffsetList, ResolvedGlobals, TargetClass,
};

use super::paint_address;
use crate::session::{Session, forward};

/// Run the scan command
pub fn run(session: &Session<ImageFile>, save: Option<&Path>, json: bool) -> Result<()> {
    let base = session
        .request(|finder, tx| finder.submit_main_module_base(forward(tx)))?
        .into_result()
        .map_err(|e| anyhow!(e))?;

    let result = session.request(|finder, tx| finder.submit_scan_all_globals(forward(tx)))?;
    let globals = result.payload;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "module_base": base,
                "globals": globals,
                "message": result.message(),
            }))?
        );
    } else {
        println!("Main module base: 0x{:X}", base);
        println!();
        for class in TargetClass::all() {
            println!("  {:<9} {}", class, paint_address(globals.get(class)));
        }
        println!();
        println!("{}", result.message());
    }

    if let Some(path) = save {
        if !globals.is_valid() {
            bail!("Nothing to save: {}", result.error_message);
        }
        let list = offset_list(&globals, base);
        let port = session.finder().port();
        let game = port.current_process().map(|process| GameInfo {
            process,
            module: port.module(),
        });
        list.save(path, game.as_ref())?;
        if !json {
            println!("Saved {} offsets to {}", list.len(), path.display());
        }
    }

    Ok(())
}

/// Found globals as module-relative entries.
pub fn offset_list(globals: &ResolvedGlobals, module_base: u64) -> OffsetList {
    let mut list = OffsetList::default();
    for (class, address) in globals.found() {
        match OffsetEntry::from_absolute(class.to_string(), address, module_base) {
            Some(entry) => list.push(entry),
            None => warn!(
                "{} at 0x{:X} lies below module base 0x{:X}, not saved",
                class, address, module_base
            ),
        }
    }
    list
}
