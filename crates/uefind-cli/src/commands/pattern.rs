//! Pattern command implementation.

use anyhow::Result;
use serde_json::json;
use uefind_core::{CompiledPattern, MaskBit};

/// Run the pattern command
pub fn run(pattern: &str, json: bool) -> Result<()> {
    let compiled = CompiledPattern::compile(pattern)?;
    let mask = code_mask(&compiled);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "pattern": compiled.to_string(),
                "bytes": hex_bytes(compiled.bytes()),
                "mask": mask,
                "length": compiled.len(),
                "anchor": compiled.anchor().map(|(index, _)| index),
            }))?
        );
        return Ok(());
    }

    println!("Pattern: {}", compiled);
    println!("Bytes:   {}", hex_bytes(compiled.bytes()));
    println!("Mask:    {}", mask);
    println!("Length:  {}", compiled.len());
    match compiled.anchor() {
        Some((index, byte)) => println!("Anchor:  0x{:02X} at {}", byte, index),
        None => println!("Anchor:  none (all wildcards)"),
    }
    Ok(())
}

/// `x` for exact bytes, `?` for wildcards.
pub fn code_mask(pattern: &CompiledPattern) -> String {
    pattern
        .mask()
        .iter()
        .map(|bit| match bit {
            MaskBit::Exact => 'x',
            MaskBit::Wildcard => '?',
        })
        .collect()
}

/// Escaped byte string, e.g. `\x48\x8B\x00`.
pub fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\x{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mask() {
        let pattern = CompiledPattern::compile("48 8B 05 ?? ?? ?? ?? C3").unwrap();
        assert_eq!(code_mask(&pattern), "xxx????x");
    }

    #[test]
    fn test_hex_bytes() {
        let pattern = CompiledPattern::compile("48 ? 05").unwrap();
        assert_eq!(hex_bytes(pattern.bytes()), "\\x48\\x00\\x05");
    }
}
