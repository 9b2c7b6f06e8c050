//! Voltage Block Read Library
//!
//! Block-batched Modbus reads for VoltageEMS. Many logical devices share one
//! physical connection and neighbouring register ranges, so reads are planned
//! per connection instead of per device.
//!
//! # Architecture
//!
//! ```text
//! voltage-blockread/
//! ├── registry   - Register-kind → connection groups, device assignment
//! ├── group      - Devices sharing a connection, client handle, plan state
//! ├── planner    - Sort + greedy bin-packing into bounded read blocks
//! ├── reader     - One transport call per block, failure policy, client reset
//! ├── decoder    - Offset-based slicing of block results
//! ├── value      - Value types and big-endian casts
//! ├── write      - Coil / register write payloads
//! ├── client     - ModbusClient / ClientFactory capability traits
//! ├── simulator  - In-memory device for tests and demos
//! └── config     - Device descriptors and validation
//! ```
//!
//! # Flow
//!
//! descriptors → `Registry::assign` → `ConnectionGroup::sort` →
//! `ConnectionGroup::plan` → block reads → per-device decode → readings

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod group;
pub mod planner;
pub mod reader;
pub mod registry;
pub mod simulator;
pub mod types;
pub mod value;
pub mod write;

pub use client::{ClientFactory, ModbusClient};
pub use config::{ConnectionIdentity, ConnectionParams, DeviceConfig, DeviceDescriptor, PlanConfig};
pub use error::{BlockReadError, Result};
pub use group::{ConnectionGroup, PlanState};
pub use planner::{BlockPlanner, DeviceRecord, ReadBlock};
pub use registry::Registry;
pub use simulator::{SimulatedDevice, SimulatorFactory};
pub use types::{DeviceId, Reading, RegisterKind, MAX_REGISTER_COUNT};
pub use value::{Value, ValueType};
