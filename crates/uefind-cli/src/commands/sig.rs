//! Signature scan command implementation.

use anyhow::{Result, bail};
use serde_json::json;
use uefind_core::{CompiledPattern, ImageFile};

use super::paint_address;
use crate::session::{Session, forward};

/// Run the sig command
pub fn run(session: &Session<ImageFile>, pattern: &str, json: bool) -> Result<()> {
    // Reject bad input before queueing anything.
    let compiled = CompiledPattern::compile(pattern)?;

    let result = session.request(|finder, tx| finder.submit_scan_signature(pattern, forward(tx)))?;
    let base = session.finder().port().module().base_address;
    let offset = result.payload.checked_sub(base).filter(|_| result.is_success);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "pattern": compiled.to_string(),
                "address": result.payload,
                "offset": offset,
            }))?
        );
    } else {
        println!("Pattern: {}", compiled);
        match offset {
            Some(offset) => println!(
                "Found at {} (module + 0x{:X})",
                paint_address(result.payload),
                offset
            ),
            None => println!("{}", paint_address(0)),
        }
    }

    if !result.is_success {
        bail!("{}", result.error_message);
    }
    Ok(())
}
