//! Hex payloads on the command line

use common::{Error, Result};

/// Parse `3f2323`, `3f 23 23` or `0x3f,0x23,0x23` into bytes
pub fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .map(|chunk| {
            chunk
                .strip_prefix("0x")
                .or_else(|| chunk.strip_prefix("0X"))
                .unwrap_or(chunk)
        })
        .collect();

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidArgument(format!(
            "Invalid hex payload '{}'",
            input
        )));
    }
    if digits.len() % 2 != 0 {
        return Err(Error::InvalidArgument(format!(
            "Odd number of hex digits in '{}'",
            input
        )));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| Error::InvalidArgument(format!("Invalid hex payload '{}'", input)))
        })
        .collect()
}

/// Render bytes as space-separated lowercase hex
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
