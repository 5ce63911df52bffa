//! Hex address parsing and formatting.

/// Parse a hex address string (with or without `0x` prefix).
///
/// Invalid input parses to 0.
///
/// ```
/// use uefind_core::offset::parse_hex_address;
///
/// assert_eq!(parse_hex_address("0x1A"), 26);
/// assert_eq!(parse_hex_address("1000"), 0x1000);
/// assert_eq!(parse_hex_address("bad"), 0);
/// ```
pub fn parse_hex_address(s: &str) -> u64 {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return 0;
    }
    u64::from_str_radix(digits, 16).unwrap_or(0)
}

/// Format an address as a hex string with `0x` prefix.
///
/// ```
/// use uefind_core::offset::format_hex_address;
///
/// assert_eq!(format_hex_address(255, true), "0xFF");
/// assert_eq!(format_hex_address(255, false), "0xff");
/// ```
pub fn format_hex_address(address: u64, uppercase: bool) -> String {
    if uppercase {
        format!("0x{:X}", address)
    } else {
        format!("0x{:x}", address)
    }
}
