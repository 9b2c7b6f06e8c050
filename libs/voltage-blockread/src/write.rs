//! Write payload parsing
//!
//! Write requests arrive as text. Coil payloads are boolean words, register
//! payloads are hexadecimal.

use crate::error::{BlockReadError, Result};

/// FC05 value that switches a coil on
pub const COIL_ON: u16 = 0xFF00;
/// FC05 value that switches a coil off
pub const COIL_OFF: u16 = 0x0000;

/// Parse a coil payload: "true"/"1" switch on, "false"/"0" switch off
pub fn parse_coil_payload(payload: &str) -> Result<u16> {
    let trimmed = payload.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed == "1" {
        Ok(COIL_ON)
    } else if trimmed.eq_ignore_ascii_case("false") || trimmed == "0" {
        Ok(COIL_OFF)
    } else {
        Err(BlockReadError::data(format!(
            "Invalid coil payload '{payload}': expected true, false, 1 or 0"
        )))
    }
}

/// Parse a register payload as hexadecimal, with or without a `0x` prefix
pub fn parse_register_payload(payload: &str) -> Result<u16> {
    let trimmed = payload.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    // from_str_radix accepts a leading '+', plain hex does not
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BlockReadError::data(format!(
            "Invalid register payload '{payload}': expected hexadecimal"
        )));
    }

    u16::from_str_radix(digits, 16).map_err(|e| {
        BlockReadError::data(format!("Invalid register payload '{payload}': {e}"))
    })
}
