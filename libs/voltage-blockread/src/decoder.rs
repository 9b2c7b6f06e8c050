//! Offset-based block decoding
//!
//! A block's results carry no boundary markers: each device's slice is located
//! purely from its address relative to the block start. Registers are two
//! big-endian bytes each; coils and discrete inputs are packed LSB-first, eight
//! per byte.

use tracing::warn;

use crate::config::DeviceConfig;
use crate::error::{BlockReadError, Result};
use crate::types::RegisterKind;
use crate::value::Value;

/// Slice the bytes of `width` registers starting at `address` out of a block
/// that begins at `start_register`.
pub fn register_slice(
    results: &[u8],
    start_register: u16,
    address: u16,
    width: u16,
) -> Result<&[u8]> {
    let offset = address.checked_sub(start_register).ok_or_else(|| {
        BlockReadError::bounds(format!(
            "Address {address} precedes block start {start_register}"
        ))
    })?;

    let begin = 2 * usize::from(offset);
    let end = begin + 2 * usize::from(width);
    if end > results.len() {
        return Err(BlockReadError::bounds(format!(
            "Register {} (width {}) needs bytes {}..{}, block has {}",
            address,
            width,
            begin,
            end,
            results.len()
        )));
    }

    Ok(&results[begin..end])
}

/// Extract one bit from a packed coil/discrete-input block
pub fn coil_bit(results: &[u8], start_register: u16, address: u16) -> Result<bool> {
    let bit_index = address.checked_sub(start_register).ok_or_else(|| {
        BlockReadError::bounds(format!(
            "Address {address} precedes block start {start_register}"
        ))
    })?;

    let byte_index = usize::from(bit_index / 8);
    let bit = bit_index % 8;
    let byte = results.get(byte_index).ok_or_else(|| {
        BlockReadError::bounds(format!(
            "Bit {} needs byte {}, block has {}",
            address,
            byte_index,
            results.len()
        ))
    })?;

    Ok(byte & (1 << bit) != 0)
}

/// Decode one device's value from its block results
pub fn decode_device(
    kind: RegisterKind,
    results: &[u8],
    start_register: u16,
    config: &DeviceConfig,
) -> Result<Value> {
    if kind.is_bit_addressed() {
        return coil_bit(results, start_register, config.address()).map(Value::Bool);
    }

    let bytes = register_slice(results, start_register, config.address(), config.width())?;
    config.value_type().decode(bytes)
}

/// Route a decode failure through the device's `fail_on_error` policy.
///
/// Returns `Ok(None)` when the failure only skips this reading.
pub fn apply_policy(result: Result<Value>, config: &DeviceConfig) -> Result<Option<Value>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_policy_gated() && !config.fail_on_error() => {
            warn!(
                "No reading for {}:{} address {}: {}",
                config.host(),
                config.port(),
                config.address(),
                e
            );
            Ok(None)
        },
        Err(e) => Err(e),
    }
}
