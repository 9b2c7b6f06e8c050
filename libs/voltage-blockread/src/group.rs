//! Connection groups
//!
//! A group owns every device of one register table that shares a physical
//! connection, the lazily created transport client for it, and the current
//! read plan. Adding a device invalidates the plan; planning requires a
//! sorted device list.

use std::fmt;
use tracing::{debug, info, warn};

use crate::client::{ClientFactory, ModbusClient};
use crate::config::{ConnectionIdentity, ConnectionParams, DeviceConfig};
use crate::decoder::{apply_policy, decode_device};
use crate::error::{BlockReadError, Result};
use crate::planner::{BlockPlanner, DeviceRecord, ReadBlock};
use crate::reader::{ensure_client, read_blocks};
use crate::types::{DeviceId, Reading, RegisterKind};
use crate::write::{parse_coil_payload, parse_register_payload};

/// Planning state of a group's device list
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PlanState {
    /// Devices were added since the last sort
    #[default]
    Unsorted,
    /// Sorted, no plan computed yet
    Sorted,
    /// Sorted and planned
    Planned(Vec<ReadBlock>),
}

/// Devices sharing one connection identity within one register table
pub struct ConnectionGroup {
    kind: RegisterKind,
    identity: ConnectionIdentity,
    params: ConnectionParams,
    planner: BlockPlanner,
    client: Option<Box<dyn ModbusClient>>,
    devices: Vec<DeviceRecord>,
    next_ordinal: u64,
    state: PlanState,
}

impl fmt::Debug for ConnectionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionGroup")
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .field("slave_id", &self.params.slave_id)
            .field("has_client", &self.client.is_some())
            .field("devices", &self.devices.len())
            .field("state", &self.state)
            .finish()
    }
}

impl ConnectionGroup {
    /// Create a group seeded with its first device. The group starts unsorted.
    pub fn new(
        kind: RegisterKind,
        planner: BlockPlanner,
        device_id: DeviceId,
        config: DeviceConfig,
    ) -> Result<Self> {
        config.check_kind(kind)?;

        let mut group = Self {
            kind,
            identity: config.identity(),
            params: config.connection_params(),
            planner,
            client: None,
            devices: Vec::new(),
            next_ordinal: 0,
            state: PlanState::Unsorted,
        };
        group.push(device_id, config);

        debug!(
            "New {} group for {} (slave {})",
            kind,
            group.params.endpoint(),
            group.params.slave_id
        );
        Ok(group)
    }

    pub fn kind(&self) -> RegisterKind {
        self.kind
    }

    pub fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn state(&self) -> &PlanState {
        &self.state
    }

    /// Whether `config` shares this group's connection identity
    pub fn matches(&self, config: &DeviceConfig) -> bool {
        config.matches(&self.identity)
    }

    /// Append a device. Any previous sort or plan is invalidated.
    pub fn add(&mut self, device_id: DeviceId, config: DeviceConfig) -> Result<()> {
        config.check_kind(self.kind)?;
        if !self.matches(&config) {
            return Err(BlockReadError::config(format!(
                "Device {} ({}:{}) does not belong to group {}",
                device_id,
                config.host(),
                config.port(),
                self.params.endpoint()
            )));
        }
        if let Some(existing) = self.devices.iter().find(|d| d.same_address(&config)) {
            warn!(
                "Duplicate device address {} on {}:{} (devices {} and {})",
                config.address(),
                config.host(),
                config.port(),
                existing.id(),
                device_id
            );
        }
        if config.slave_id() != self.params.slave_id {
            warn!(
                "Device {} uses slave {} but group {} reads as slave {}",
                device_id,
                config.slave_id(),
                self.params.endpoint(),
                self.params.slave_id
            );
        }

        self.push(device_id, config);
        Ok(())
    }

    fn push(&mut self, device_id: DeviceId, config: DeviceConfig) {
        self.devices
            .push(DeviceRecord::new(device_id, config, self.next_ordinal));
        self.next_ordinal += 1;
        self.state = PlanState::Unsorted;
    }

    /// Sort devices by `(host, port, address)`
    pub fn sort(&mut self) {
        self.planner.sort(&mut self.devices);
        self.state = PlanState::Sorted;
    }

    pub fn is_sorted(&self) -> bool {
        !matches!(self.state, PlanState::Unsorted)
    }

    /// Compute the read plan, or return the existing one.
    ///
    /// Fails with `NotSorted` if devices were added since the last sort; the
    /// group is left unchanged in that case.
    pub fn plan(&mut self) -> Result<&[ReadBlock]> {
        match self.state {
            PlanState::Unsorted => return Err(BlockReadError::NotSorted),
            PlanState::Sorted => {
                let blocks = self.planner.plan(&mut self.devices);
                self.state = PlanState::Planned(blocks);
            },
            PlanState::Planned(_) => {},
        }
        Ok(self.blocks().unwrap_or_default())
    }

    /// Current plan, if one has been computed
    pub fn blocks(&self) -> Option<&[ReadBlock]> {
        match &self.state {
            PlanState::Planned(blocks) => Some(blocks),
            _ => None,
        }
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Drop the transport client; the next call creates a new one
    pub fn reset_client(&mut self) {
        if self.client.take().is_some() {
            info!("Dropped Modbus client for {}", self.params.endpoint());
        }
    }

    /// Read every planned block and decode each member device.
    ///
    /// Readings come back in `sort_index` order. Devices whose value could not
    /// be read or decoded are absent unless `fail_on_error` turns the failure
    /// into an error.
    pub async fn read(&mut self, factory: &dyn ClientFactory) -> Result<Vec<Reading>> {
        self.plan()?;
        let PlanState::Planned(blocks) = &mut self.state else {
            return Err(BlockReadError::NotSorted);
        };

        read_blocks(
            &mut self.client,
            factory,
            &self.params,
            self.kind,
            self.identity.fail_on_error,
            blocks,
        )
        .await?;

        let mut readings = Vec::with_capacity(self.devices.len());
        for block in blocks.iter() {
            for &index in &block.members {
                let device = &self.devices[index];
                let decoded = decode_device(
                    self.kind,
                    &block.results,
                    block.start_register,
                    device.config(),
                );
                if let Some(value) = apply_policy(decoded, device.config())? {
                    readings.push(Reading {
                        device_id: device.id(),
                        address: device.config().address(),
                        value,
                    });
                }
            }
        }

        debug!(
            "Read {} of {} {} device(s) from {}",
            readings.len(),
            self.devices.len(),
            self.kind,
            self.params.endpoint()
        );
        Ok(readings)
    }

    /// Write one coil (FC05). `payload` is "true"/"false"/"1"/"0".
    pub async fn write_coil(
        &mut self,
        factory: &dyn ClientFactory,
        address: u16,
        payload: &str,
    ) -> Result<()> {
        let value = parse_coil_payload(payload)?;
        let client = ensure_client(&mut self.client, factory, &self.params).await?;
        if let Err(e) = client.write_single_coil(address, value).await {
            self.reset_client();
            return Err(e);
        }
        debug!(
            "Wrote coil {} = 0x{:04X} on {}",
            address,
            value,
            self.params.endpoint()
        );
        Ok(())
    }

    /// Write one holding register (FC06). `payload` is hexadecimal.
    pub async fn write_register(
        &mut self,
        factory: &dyn ClientFactory,
        address: u16,
        payload: &str,
    ) -> Result<()> {
        let value = parse_register_payload(payload)?;
        let client = ensure_client(&mut self.client, factory, &self.params).await?;
        if let Err(e) = client.write_single_register(address, value).await {
            self.reset_client();
            return Err(e);
        }
        debug!(
            "Wrote register {} = 0x{:04X} on {}",
            address,
            value,
            self.params.endpoint()
        );
        Ok(())
    }
}
