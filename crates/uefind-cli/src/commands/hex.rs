//! Hex command implementation.

use anyhow::{Result, bail};
use serde_json::json;
use uefind_core::{format_hex_address, parse_hex_address};

/// Run the hex command
pub fn run(value: &str, json: bool) -> Result<()> {
    let address = parse_hex_address(value);
    if address == 0 && !is_zero(value) {
        bail!("Invalid hex address: {}", value);
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "upper": format_hex_address(address, true),
                "lower": format_hex_address(address, false),
                "decimal": address,
            }))?
        );
    } else {
        println!("{}", format_hex_address(address, true));
        println!("{}", format_hex_address(address, false));
        println!("{}", address);
    }
    Ok(())
}

/// A literal zero such as `0`, `0x0` or `000`.
fn is_zero(value: &str) -> bool {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b == b'0')
}
