//! Transport capability traits
//!
//! The block reader never frames requests itself. It talks to a device through
//! `ModbusClient`, whatever the underlying transport (TCP, RTU, simulator),
//! and obtains clients from a `ClientFactory` keyed by connection parameters.

use async_trait::async_trait;

use crate::config::ConnectionParams;
use crate::error::Result;

/// Modbus client capability set
///
/// Every call addresses the unit given at connection time. Read calls return
/// the raw response data bytes: two big-endian bytes per register, or bits
/// packed LSB-first for coils and discrete inputs.
#[async_trait]
pub trait ModbusClient: Send {
    /// Read coils (Function Code 0x01)
    async fn read_coils(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>>;

    /// Read discrete inputs (Function Code 0x02)
    async fn read_discrete_inputs(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>>;

    /// Read holding registers (Function Code 0x03)
    async fn read_holding_registers(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>>;

    /// Read input registers (Function Code 0x04)
    async fn read_input_registers(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>>;

    /// Write single coil (Function Code 0x05); `value` is 0xFF00 (on) or 0x0000 (off)
    async fn write_single_coil(&mut self, address: u16, value: u16) -> Result<Vec<u8>>;

    /// Write multiple coils (Function Code 0x0F); `value` holds packed bits
    async fn write_multiple_coils(
        &mut self,
        address: u16,
        quantity: u16,
        value: &[u8],
    ) -> Result<Vec<u8>>;

    /// Write single register (Function Code 0x06)
    async fn write_single_register(&mut self, address: u16, value: u16) -> Result<Vec<u8>>;

    /// Write multiple registers (Function Code 0x10); `value` holds big-endian register bytes
    async fn write_multiple_registers(
        &mut self,
        address: u16,
        quantity: u16,
        value: &[u8],
    ) -> Result<Vec<u8>>;

    /// Write then read registers in one transaction (Function Code 0x17)
    async fn read_write_multiple_registers(
        &mut self,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        write_quantity: u16,
        value: &[u8],
    ) -> Result<Vec<u8>>;

    /// Mask write register (Function Code 0x16): `(current & and_mask) | (or_mask & !and_mask)`
    async fn mask_write_register(
        &mut self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<Vec<u8>>;

    /// Read FIFO queue (Function Code 0x18)
    async fn read_fifo_queue(&mut self, address: u16) -> Result<Vec<u8>>;
}

/// Creates transport clients for a connection identity
///
/// A factory is consulted whenever a group has no client, including after a
/// failed call dropped the previous one.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn ModbusClient>>;
}
