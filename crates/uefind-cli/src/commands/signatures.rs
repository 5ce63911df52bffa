//! Signatures command implementation.

use std::path::Path;

use anyhow::Result;
use uefind_core::{SignatureTable, save_signatures};

/// Run the signatures command
pub fn run(table: &SignatureTable, output: Option<&Path>, json: bool) -> Result<()> {
    if let Some(path) = output {
        save_signatures(path, table)?;
        println!("Saved {} signatures to {}", table.len(), path.display());
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&table.to_file())?);
        return Ok(());
    }

    println!("Signature table {} ({} variants)", table.version(), table.len());
    for class in table.classes() {
        println!();
        println!("{}:", class);
        for signature in table.variants(class) {
            println!("  {:<20} {}", signature.name, signature.pattern);
        }
    }
    Ok(())
}
