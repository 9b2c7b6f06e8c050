//! In-memory Modbus device simulator
//!
//! `SimulatedDevice` keeps the four register tables plus FIFO queues in shared
//! memory and answers every `ModbusClient` call against them, applying the
//! protocol's quantity and address limits. Failures can be injected per call
//! and connections can be refused at the factory, which makes client reset
//! and `fail_on_error` behavior testable without a network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::{ClientFactory, ModbusClient};
use crate::config::ConnectionParams;
use crate::error::{BlockReadError, Result};
use crate::types::RegisterKind;
use crate::value::Value;

/// Maximum registers in one read request (FC03/FC04)
const MAX_READ_REGISTERS: u16 = 125;
/// Maximum bits in one read request (FC01/FC02)
const MAX_READ_BITS: u16 = 2000;
/// Maximum registers in one write request (FC16)
const MAX_WRITE_REGISTERS: u16 = 123;
/// Maximum bits in one write request (FC15)
const MAX_WRITE_BITS: u16 = 1968;
/// Maximum registers written by FC23
const MAX_READ_WRITE_REGISTERS: u16 = 121;
/// Maximum entries in a FIFO queue (FC24)
const MAX_FIFO_COUNT: usize = 31;

#[derive(Debug, Default)]
struct Tables {
    coils: HashMap<u16, bool>,
    discrete_inputs: HashMap<u16, bool>,
    holding: HashMap<u16, u16>,
    input: HashMap<u16, u16>,
    fifo: HashMap<u16, Vec<u16>>,
}

fn illegal_value(detail: impl std::fmt::Display) -> BlockReadError {
    BlockReadError::transport(format!("Modbus exception 0x03 (illegal data value): {detail}"))
}

fn illegal_address(detail: impl std::fmt::Display) -> BlockReadError {
    BlockReadError::transport(format!(
        "Modbus exception 0x02 (illegal data address): {detail}"
    ))
}

fn check_range(address: u16, quantity: u16, max: u16) -> Result<()> {
    if quantity == 0 || quantity > max {
        return Err(illegal_value(format!("quantity {quantity} not in 1..={max}")));
    }
    if u32::from(address) + u32::from(quantity) > 0x1_0000 {
        return Err(illegal_address(format!("{address} + {quantity} > 65536")));
    }
    Ok(())
}

/// Consecutive addresses from `start`, wrapping at the end of the address space
fn addresses(start: u16) -> impl Iterator<Item = u16> {
    (0..=u16::MAX).map(move |i| start.wrapping_add(i))
}

/// Pack bits LSB-first, eight per byte
fn pack_bits(bits: impl Iterator<Item = bool>) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (i, bit) in bits.enumerate() {
        if i % 8 == 0 {
            bytes.push(0);
        }
        if bit {
            if let Some(last) = bytes.last_mut() {
                *last |= 1 << (i % 8);
            }
        }
    }
    bytes
}

fn unpack_bit(bytes: &[u8], index: usize) -> bool {
    bytes
        .get(index / 8)
        .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
}

fn register_bytes(values: impl Iterator<Item = u16>) -> Vec<u8> {
    values.flat_map(u16::to_be_bytes).collect()
}

fn echo(words: &[u16]) -> Vec<u8> {
    register_bytes(words.iter().copied())
}

/// Simulated Modbus unit backed by in-memory tables
///
/// Clones share the same tables and counters.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    tables: Arc<Mutex<Tables>>,
    pending_failures: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed consecutive holding registers starting at `address`
    pub async fn set_holding(&self, address: u16, values: &[u16]) {
        let mut tables = self.tables.lock().await;
        for (addr, value) in addresses(address).zip(values) {
            tables.holding.insert(addr, *value);
        }
    }

    /// Seed consecutive input registers starting at `address`
    pub async fn set_input(&self, address: u16, values: &[u16]) {
        let mut tables = self.tables.lock().await;
        for (addr, value) in addresses(address).zip(values) {
            tables.input.insert(addr, *value);
        }
    }

    /// Seed consecutive coils starting at `address`
    pub async fn set_coils(&self, address: u16, values: &[bool]) {
        let mut tables = self.tables.lock().await;
        for (addr, value) in addresses(address).zip(values) {
            tables.coils.insert(addr, *value);
        }
    }

    /// Seed consecutive discrete inputs starting at `address`
    pub async fn set_discrete_inputs(&self, address: u16, values: &[bool]) {
        let mut tables = self.tables.lock().await;
        for (addr, value) in addresses(address).zip(values) {
            tables.discrete_inputs.insert(addr, *value);
        }
    }

    /// Store a typed value in the given table.
    ///
    /// Register tables receive the value's big-endian register image; bit
    /// tables receive its truth value.
    pub async fn set_value(&self, kind: RegisterKind, address: u16, value: Value) {
        match kind {
            RegisterKind::Coils => self.set_coils(address, &[value.as_f64() != 0.0]).await,
            RegisterKind::DiscreteInputs => {
                self.set_discrete_inputs(address, &[value.as_f64() != 0.0])
                    .await
            },
            RegisterKind::HoldingRegisters => {
                self.set_holding(address, &value.to_registers()).await
            },
            RegisterKind::InputRegisters => self.set_input(address, &value.to_registers()).await,
        }
    }

    /// Append entries to the FIFO queue behind `address`
    pub async fn push_fifo(&self, address: u16, values: &[u16]) {
        let mut tables = self.tables.lock().await;
        tables.fifo.entry(address).or_default().extend_from_slice(values);
    }

    pub async fn holding(&self, address: u16) -> u16 {
        let tables = self.tables.lock().await;
        tables.holding.get(&address).copied().unwrap_or(0)
    }

    pub async fn coil(&self, address: u16) -> bool {
        let tables = self.tables.lock().await;
        tables.coils.get(&address).copied().unwrap_or(false)
    }

    /// Make the next `count` calls fail with a transport error
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of calls received, failed ones included
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Create a client bound to this device
    pub fn client(&self) -> SimulatorClient {
        SimulatorClient {
            device: self.clone(),
        }
    }

    fn begin_request(&self, operation: &str) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            warn!("[Simulator] Injected failure for {}", operation);
            return Err(BlockReadError::transport(format!(
                "Simulated transport failure during {operation}"
            )));
        }
        Ok(())
    }
}

/// `ModbusClient` answering from a `SimulatedDevice`
#[derive(Debug, Clone)]
pub struct SimulatorClient {
    device: SimulatedDevice,
}

impl SimulatorClient {
    async fn read_bits(&self, kind: RegisterKind, address: u16, quantity: u16) -> Result<Vec<u8>> {
        self.device.begin_request(kind.as_str())?;
        check_range(address, quantity, MAX_READ_BITS)?;
        let tables = self.device.tables.lock().await;
        let table = match kind {
            RegisterKind::Coils => &tables.coils,
            _ => &tables.discrete_inputs,
        };
        let bits = (0..quantity).map(|i| table.get(&(address + i)).copied().unwrap_or(false));
        Ok(pack_bits(bits))
    }

    async fn read_registers(
        &self,
        kind: RegisterKind,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>> {
        self.device.begin_request(kind.as_str())?;
        check_range(address, quantity, MAX_READ_REGISTERS)?;
        let tables = self.device.tables.lock().await;
        let table = match kind {
            RegisterKind::HoldingRegisters => &tables.holding,
            _ => &tables.input,
        };
        Ok(register_bytes(
            (0..quantity).map(|i| table.get(&(address + i)).copied().unwrap_or(0)),
        ))
    }
}

#[async_trait]
impl ModbusClient for SimulatorClient {
    async fn read_coils(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>> {
        self.read_bits(RegisterKind::Coils, address, quantity).await
    }

    async fn read_discrete_inputs(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>> {
        self.read_bits(RegisterKind::DiscreteInputs, address, quantity)
            .await
    }

    async fn read_holding_registers(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>> {
        self.read_registers(RegisterKind::HoldingRegisters, address, quantity)
            .await
    }

    async fn read_input_registers(&mut self, address: u16, quantity: u16) -> Result<Vec<u8>> {
        self.read_registers(RegisterKind::InputRegisters, address, quantity)
            .await
    }

    async fn write_single_coil(&mut self, address: u16, value: u16) -> Result<Vec<u8>> {
        self.device.begin_request("write_single_coil")?;
        let on = match value {
            0xFF00 => true,
            0x0000 => false,
            other => return Err(illegal_value(format!("coil value 0x{other:04X}"))),
        };
        self.device.tables.lock().await.coils.insert(address, on);
        Ok(echo(&[address, value]))
    }

    async fn write_multiple_coils(
        &mut self,
        address: u16,
        quantity: u16,
        value: &[u8],
    ) -> Result<Vec<u8>> {
        self.device.begin_request("write_multiple_coils")?;
        check_range(address, quantity, MAX_WRITE_BITS)?;
        if value.len() < usize::from(quantity).div_ceil(8) {
            return Err(illegal_value(format!(
                "{} byte(s) for {} coil(s)",
                value.len(),
                quantity
            )));
        }
        let mut tables = self.device.tables.lock().await;
        for i in 0..quantity {
            tables
                .coils
                .insert(address + i, unpack_bit(value, usize::from(i)));
        }
        Ok(echo(&[address, quantity]))
    }

    async fn write_single_register(&mut self, address: u16, value: u16) -> Result<Vec<u8>> {
        self.device.begin_request("write_single_register")?;
        self.device.tables.lock().await.holding.insert(address, value);
        Ok(echo(&[address, value]))
    }

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        quantity: u16,
        value: &[u8],
    ) -> Result<Vec<u8>> {
        self.device.begin_request("write_multiple_registers")?;
        check_range(address, quantity, MAX_WRITE_REGISTERS)?;
        if value.len() != 2 * usize::from(quantity) {
            return Err(illegal_value(format!(
                "{} byte(s) for {} register(s)",
                value.len(),
                quantity
            )));
        }
        let mut tables = self.device.tables.lock().await;
        for (addr, pair) in addresses(address).zip(value.chunks_exact(2)) {
            tables
                .holding
                .insert(addr, u16::from_be_bytes([pair[0], pair[1]]));
        }
        Ok(echo(&[address, quantity]))
    }

    async fn read_write_multiple_registers(
        &mut self,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        write_quantity: u16,
        value: &[u8],
    ) -> Result<Vec<u8>> {
        self.device.begin_request("read_write_multiple_registers")?;
        check_range(read_address, read_quantity, MAX_READ_REGISTERS)?;
        check_range(write_address, write_quantity, MAX_READ_WRITE_REGISTERS)?;
        if value.len() != 2 * usize::from(write_quantity) {
            return Err(illegal_value(format!(
                "{} byte(s) for {} register(s)",
                value.len(),
                write_quantity
            )));
        }

        // the write is applied before the read
        let mut tables = self.device.tables.lock().await;
        for (addr, pair) in addresses(write_address).zip(value.chunks_exact(2)) {
            tables
                .holding
                .insert(addr, u16::from_be_bytes([pair[0], pair[1]]));
        }
        Ok(register_bytes((0..read_quantity).map(|i| {
            tables
                .holding
                .get(&(read_address + i))
                .copied()
                .unwrap_or(0)
        })))
    }

    async fn mask_write_register(
        &mut self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<Vec<u8>> {
        self.device.begin_request("mask_write_register")?;
        let mut tables = self.device.tables.lock().await;
        let current = tables.holding.get(&address).copied().unwrap_or(0);
        let updated = (current & and_mask) | (or_mask & !and_mask);
        tables.holding.insert(address, updated);
        Ok(echo(&[address, and_mask, or_mask]))
    }

    /// Returns the FIFO count followed by the queued registers
    async fn read_fifo_queue(&mut self, address: u16) -> Result<Vec<u8>> {
        self.device.begin_request("read_fifo_queue")?;
        let tables = self.device.tables.lock().await;
        let queue = tables.fifo.get(&address).map(Vec::as_slice).unwrap_or(&[]);
        if queue.len() > MAX_FIFO_COUNT {
            return Err(illegal_value(format!("FIFO count {} > 31", queue.len())));
        }
        let count = queue.len() as u16;
        Ok(register_bytes(
            std::iter::once(count).chain(queue.iter().copied()),
        ))
    }
}

/// `ClientFactory` resolving `host:port` endpoints to simulated devices
#[derive(Debug, Default)]
pub struct SimulatorFactory {
    devices: HashMap<String, SimulatedDevice>,
    refuse: AtomicBool,
    connects: AtomicUsize,
}

impl SimulatorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under an endpoint such as `"plc:502"`
    pub fn with_device(mut self, endpoint: impl Into<String>, device: SimulatedDevice) -> Self {
        self.add_device(endpoint, device);
        self
    }

    pub fn add_device(&mut self, endpoint: impl Into<String>, device: SimulatedDevice) {
        self.devices.insert(endpoint.into(), device);
    }

    pub fn device(&self, endpoint: &str) -> Option<&SimulatedDevice> {
        self.devices.get(endpoint)
    }

    /// Refuse (or accept again) every subsequent connection attempt
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of clients handed out so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for SimulatorFactory {
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn ModbusClient>> {
        let endpoint = params.endpoint();
        if self.refuse.load(Ordering::SeqCst) {
            return Err(BlockReadError::connection(format!(
                "Connection refused: {endpoint}"
            )));
        }
        let device = self.devices.get(&endpoint).ok_or_else(|| {
            BlockReadError::connection(format!("No simulated device at {endpoint}"))
        })?;

        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!(
            "[Simulator] Connected to {} (slave {})",
            endpoint, params.slave_id
        );
        Ok(Box::new(device.client()))
    }
}
