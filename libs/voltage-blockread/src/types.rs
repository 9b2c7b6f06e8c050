//! Shared block-read types and protocol limits

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::Value;

/// Largest register count read in a single block.
///
/// Kept below the protocol's 125-register ceiling so one block always fits a
/// single transaction over every supported transport.
pub const MAX_REGISTER_COUNT: u16 = 123;

/// Size of the register address space (16-bit addresses)
pub const REGISTER_ADDRESS_SPACE: u32 = 65536;

/// Opaque caller-supplied identity used to route readings back
pub type DeviceId = u32;

/// Register table a handler reads from
///
/// Used as the registry key: devices of different kinds never share a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    /// FC01
    Coils,
    /// FC02
    DiscreteInputs,
    /// FC03
    HoldingRegisters,
    /// FC04
    InputRegisters,
}

impl RegisterKind {
    /// Read function code for this table
    pub fn function_code(&self) -> u8 {
        match self {
            Self::Coils => 0x01,
            Self::DiscreteInputs => 0x02,
            Self::HoldingRegisters => 0x03,
            Self::InputRegisters => 0x04,
        }
    }

    /// Coils and discrete inputs are addressed per bit, registers per 16-bit word
    pub fn is_bit_addressed(&self) -> bool {
        matches!(self, Self::Coils | Self::DiscreteInputs)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coils => "coils",
            Self::DiscreteInputs => "discrete_inputs",
            Self::HoldingRegisters => "holding_registers",
            Self::InputRegisters => "input_registers",
        }
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One decoded device reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// Caller identity of the device
    pub device_id: DeviceId,
    /// Register (or bit) address the value was read from
    pub address: u16,
    /// Decoded value
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_codes() {
        assert_eq!(RegisterKind::Coils.function_code(), 1);
        assert_eq!(RegisterKind::DiscreteInputs.function_code(), 2);
        assert_eq!(RegisterKind::HoldingRegisters.function_code(), 3);
        assert_eq!(RegisterKind::InputRegisters.function_code(), 4);
    }

    #[test]
    fn test_bit_addressed_kinds() {
        assert!(RegisterKind::Coils.is_bit_addressed());
        assert!(RegisterKind::DiscreteInputs.is_bit_addressed());
        assert!(!RegisterKind::HoldingRegisters.is_bit_addressed());
        assert!(!RegisterKind::InputRegisters.is_bit_addressed());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(RegisterKind::HoldingRegisters.to_string(), "holding_registers");
        assert_eq!(RegisterKind::Coils.to_string(), "coils");
    }
}
