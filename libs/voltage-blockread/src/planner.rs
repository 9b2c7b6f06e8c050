//! Block planning
//!
//! Sorts a group's devices by `(host, port, address)` and packs them greedily
//! into read blocks no wider than the configured register limit. A block
//! always covers the tightest span of its members, which may overlap or leave
//! gaps between them.

use std::cmp::Ordering;
use tracing::debug;

use crate::config::{DeviceConfig, PlanConfig};
use crate::types::DeviceId;

/// A device assigned to a connection group
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    id: DeviceId,
    config: DeviceConfig,
    ordinal: u64,
    sort_index: Option<usize>,
}

impl DeviceRecord {
    /// `ordinal` is the insertion order inside the group, used to break sort ties
    pub fn new(id: DeviceId, config: DeviceConfig, ordinal: u64) -> Self {
        Self {
            id,
            config,
            ordinal,
            sort_index: None,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Emission order assigned by the last planning pass
    pub fn sort_index(&self) -> Option<usize> {
        self.sort_index
    }

    /// Whether both devices read the same address on the same endpoint
    pub fn same_address(&self, other: &DeviceConfig) -> bool {
        self.sort_key() == (other.host(), other.port(), other.address())
    }

    fn sort_key(&self) -> (&str, u16, u16) {
        (self.config.host(), self.config.port(), self.config.address())
    }
}

/// One bounded read serving every member device
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadBlock {
    pub start_register: u16,
    pub register_count: u16,
    /// Indices into the owning group's device list, in sorted order
    pub members: Vec<usize>,
    /// Raw bytes of the last successful read; empty until then
    pub results: Vec<u8>,
}

impl ReadBlock {
    fn seed(index: usize, config: &DeviceConfig) -> Self {
        Self {
            start_register: config.address(),
            register_count: config.width(),
            members: vec![index],
            results: Vec::new(),
        }
    }

    /// Whether the device's range lies inside this block
    pub fn covers(&self, config: &DeviceConfig) -> bool {
        config.address() >= self.start_register
            && config.end() <= u32::from(self.start_register) + u32::from(self.register_count)
    }

    /// One past the last register covered by the block
    pub fn end(&self) -> u32 {
        u32::from(self.start_register) + u32::from(self.register_count)
    }
}

/// Sorts and packs devices into read blocks
#[derive(Debug, Clone, Copy)]
pub struct BlockPlanner {
    max_register_count: u16,
}

impl Default for BlockPlanner {
    fn default() -> Self {
        Self::new(PlanConfig::default())
    }
}

impl BlockPlanner {
    pub fn new(config: PlanConfig) -> Self {
        Self {
            max_register_count: config.max_register_count,
        }
    }

    pub fn max_register_count(&self) -> u16 {
        self.max_register_count
    }

    /// Sort devices by `(host, port, address)`.
    ///
    /// Exact duplicates keep their insertion order.
    pub fn sort(&self, devices: &mut [DeviceRecord]) {
        devices.sort_by(|a, b| match a.sort_key().cmp(&b.sort_key()) {
            Ordering::Equal => a.ordinal.cmp(&b.ordinal),
            other => other,
        });
    }

    /// Pack sorted devices into blocks in a single linear pass.
    ///
    /// Each device also receives its `sort_index` (0, 1, 2, ...).
    pub fn plan(&self, devices: &mut [DeviceRecord]) -> Vec<ReadBlock> {
        let max = u32::from(self.max_register_count);
        let mut blocks = Vec::new();
        let mut current: Option<ReadBlock> = None;

        for (index, device) in devices.iter_mut().enumerate() {
            device.sort_index = Some(index);

            if let Some(block) = current.as_mut() {
                let span = device
                    .config
                    .end()
                    .saturating_sub(u32::from(block.start_register));
                if span < max {
                    block.members.push(index);
                    block.register_count = block.register_count.max(span as u16);
                    continue;
                }
            }

            if let Some(done) = current.take() {
                blocks.push(done);
            }
            current = Some(ReadBlock::seed(index, &device.config));
        }

        if let Some(done) = current.take() {
            blocks.push(done);
        }

        debug!(
            "Planned {} block(s) for {} device(s), max {} registers",
            blocks.len(),
            devices.len(),
            self.max_register_count
        );
        blocks
    }
}
