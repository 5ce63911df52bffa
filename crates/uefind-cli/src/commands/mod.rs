//! CLI command implementations.
//!
//! Image-backed commands (`scan`, `locate`, `sig`) run through a
//! [`Session`](crate::session::Session); the rest work on text and files only.

pub mod hex;
pub mod locate;
pub mod offsets;
pub mod pattern;
pub mod scan;
pub mod sig;
pub mod signatures;

use owo_colors::OwoColorize;

/// `0x...` in green, or a red "not found".
pub(crate) fn paint_address(address: u64) -> String {
    if address == 0 {
        "not found".red().to_string()
    } else {
        uefind_core::format_hex_address(address, true).green().to_string()
    }
}
