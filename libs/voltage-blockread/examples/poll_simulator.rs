//! Block Read Polling Demo
//!
//! Loads device descriptors from YAML, assigns them to a registry and polls a
//! simulated device twice, once with an injected transport failure.
//!
//! Run with: `RUST_LOG=debug cargo run -p voltage-blockread --example poll_simulator`

use anyhow::Context;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use voltage_blockread::{
    DeviceDescriptor, DeviceId, Registry, RegisterKind, SimulatedDevice, SimulatorFactory, Value,
};

const DEVICES_YAML: &str = r#"
devices:
  - id: 1
    host: plc
    port: 502
    slaveId: 1
    address: 2
    width: 2
    type: float32
  - id: 2
    host: plc
    port: 502
    slaveId: 1
    address: 8
    width: 2
    type: uint32
  - id: 3
    host: plc
    port: 502
    slaveId: 1
    address: 200
    width: 1
    type: int16
"#;

#[derive(Debug, Deserialize)]
struct DeviceEntry {
    id: DeviceId,
    #[serde(flatten)]
    descriptor: DeviceDescriptor,
}

#[derive(Debug, Deserialize)]
struct DeviceFile {
    devices: Vec<DeviceEntry>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let file: DeviceFile = serde_yaml::from_str(DEVICES_YAML).context("parse device list")?;

    let mut registry = Registry::new();
    for entry in &file.devices {
        registry
            .assign_descriptor(RegisterKind::HoldingRegisters, entry.id, &entry.descriptor)
            .with_context(|| format!("assign device {}", entry.id))?;
    }

    let device = SimulatedDevice::new();
    let kind = RegisterKind::HoldingRegisters;
    device.set_value(kind, 2, Value::F32(230.5)).await;
    device.set_value(kind, 8, Value::U32(123_456)).await;
    device.set_value(kind, 200, Value::S16(-40)).await;
    let factory = SimulatorFactory::new().with_device("plc:502", device.clone());

    for group in registry.groups_mut(kind) {
        for block in group.plan()? {
            println!(
                "block start={} count={} devices={}",
                block.start_register,
                block.register_count,
                block.members.len()
            );
        }
    }

    println!("\n=== Cycle 1 ===");
    for reading in registry.read_all(kind, &factory).await? {
        println!("device {} @ {} = {}", reading.device_id, reading.address, reading.value);
    }

    println!("\n=== Cycle 2 (first block fails) ===");
    device.fail_next(1);
    for reading in registry.read_all(kind, &factory).await? {
        println!("device {} @ {} = {}", reading.device_id, reading.address, reading.value);
    }

    println!(
        "\n{} request(s), {} connection(s)",
        device.request_count(),
        factory.connect_count()
    );
    Ok(())
}
