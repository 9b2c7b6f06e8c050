//! Device registry
//!
//! Keeps connection groups per register table. A device joins the first group
//! whose connection identity it matches, otherwise it opens a new group.
//! Groups are re-sorted after every assignment so they are always ready to be
//! planned.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::client::ClientFactory;
use crate::config::{DeviceConfig, DeviceDescriptor, PlanConfig};
use crate::error::Result;
use crate::group::ConnectionGroup;
use crate::planner::BlockPlanner;
use crate::types::{DeviceId, Reading, RegisterKind};

/// Connection groups keyed by register table
#[derive(Debug, Default)]
pub struct Registry {
    planner: BlockPlanner,
    groups: HashMap<RegisterKind, Vec<ConnectionGroup>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with a custom block limit
    pub fn with_config(config: PlanConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            planner: BlockPlanner::new(config),
            groups: HashMap::new(),
        })
    }

    /// Assign a validated device to a connection group of `kind`
    pub fn assign(
        &mut self,
        kind: RegisterKind,
        device_id: DeviceId,
        config: DeviceConfig,
    ) -> Result<()> {
        config.check_kind(kind)?;
        let groups = self.groups.entry(kind).or_default();

        if let Some(group) = groups.iter_mut().find(|g| g.matches(&config)) {
            group.add(device_id, config)?;
            group.sort();
            debug!(
                "Device {} joined {} group {} ({} devices)",
                device_id,
                kind,
                group.params().endpoint(),
                group.len()
            );
            return Ok(());
        }

        let mut group = ConnectionGroup::new(kind, self.planner, device_id, config)?;
        group.sort();
        info!(
            "Device {} opened {} group #{} for {}",
            device_id,
            kind,
            groups.len(),
            group.params().endpoint()
        );
        groups.push(group);
        Ok(())
    }

    /// Validate a raw descriptor and assign it
    pub fn assign_descriptor(
        &mut self,
        kind: RegisterKind,
        device_id: DeviceId,
        descriptor: &DeviceDescriptor,
    ) -> Result<()> {
        let config = descriptor.validate()?;
        self.assign(kind, device_id, config)
    }

    /// Groups of `kind` in creation order
    pub fn groups(&self, kind: RegisterKind) -> &[ConnectionGroup] {
        self.groups.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn groups_mut(&mut self, kind: RegisterKind) -> &mut [ConnectionGroup] {
        self.groups
            .get_mut(&kind)
            .map(Vec::as_mut_slice)
            .unwrap_or(&mut [])
    }

    /// Total number of groups across all register tables
    pub fn group_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Total number of devices across all register tables
    pub fn device_count(&self) -> usize {
        self.groups
            .values()
            .flat_map(|groups| groups.iter().map(ConnectionGroup::len))
            .sum()
    }

    /// Read every group of `kind` in creation order.
    ///
    /// Readings are concatenated group by group. A group failing under
    /// `fail_on_error` aborts the pass and its error is returned.
    pub async fn read_all(
        &mut self,
        kind: RegisterKind,
        factory: &dyn ClientFactory,
    ) -> Result<Vec<Reading>> {
        let mut readings = Vec::new();
        for group in self.groups_mut(kind) {
            readings.extend(group.read(factory).await?);
        }
        Ok(readings)
    }

    /// Drop all groups (and their clients)
    pub fn clear(&mut self) {
        let dropped = self.group_count();
        self.groups.clear();
        if dropped > 0 {
            info!("Cleared {} connection group(s)", dropped);
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::error::BlockReadError;
    use tracing_test::traced_test;

    fn desc(host: &str, address: u32) -> DeviceDescriptor {
        DeviceDescriptor::new(host, 502, address, 1, "u16")
    }

    #[test]
    fn test_assign_groups_by_identity() {
        let mut registry = Registry::new();
        let kind = RegisterKind::HoldingRegisters;

        registry.assign_descriptor(kind, 1, &desc("a", 40)).unwrap();
        registry.assign_descriptor(kind, 2, &desc("b", 0)).unwrap();
        registry.assign_descriptor(kind, 3, &desc("a", 2)).unwrap();
        registry
            .assign_descriptor(kind, 4, &desc("a", 2).timeout("1s"))
            .unwrap();

        let groups = registry.groups(kind);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 1);
        assert_eq!(groups[2].len(), 1);
        assert_eq!(registry.group_count(), 3);
        assert_eq!(registry.device_count(), 4);

        // joined group is re-sorted immediately
        let ids: Vec<DeviceId> = groups[0].devices().iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec![3, 1]);
        assert!(groups.iter().all(ConnectionGroup::is_sorted));
    }

    #[test]
    fn test_register_tables_are_separate() {
        let mut registry = Registry::new();
        registry
            .assign_descriptor(RegisterKind::HoldingRegisters, 1, &desc("a", 0))
            .unwrap();
        registry
            .assign_descriptor(RegisterKind::InputRegisters, 2, &desc("a", 0))
            .unwrap();

        assert_eq!(registry.groups(RegisterKind::HoldingRegisters).len(), 1);
        assert_eq!(registry.groups(RegisterKind::InputRegisters).len(), 1);
        assert!(registry.groups(RegisterKind::Coils).is_empty());
    }

    #[test]
    fn test_assign_rejects_invalid_devices() {
        let mut registry = Registry::new();
        let err = registry
            .assign_descriptor(RegisterKind::Coils, 1, &desc("a", 0))
            .unwrap_err();
        assert!(matches!(err, BlockReadError::Config(_)));

        let mut missing_port = desc("a", 0);
        missing_port.port = None;
        assert!(registry
            .assign_descriptor(RegisterKind::HoldingRegisters, 2, &missing_port)
            .is_err());
        assert_eq!(registry.device_count(), 0);
    }

    #[test]
    fn test_with_config_validates_limit() {
        assert!(Registry::with_config(PlanConfig {
            max_register_count: 200
        })
        .is_err());

        let mut registry = Registry::with_config(PlanConfig {
            max_register_count: 4,
        })
        .unwrap();
        let kind = RegisterKind::InputRegisters;
        registry.assign_descriptor(kind, 1, &desc("a", 0)).unwrap();
        registry.assign_descriptor(kind, 2, &desc("a", 5)).unwrap();
        let blocks = registry.groups_mut(kind)[0].plan().unwrap();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_with_config_fits_widest_device() {
        assert!(matches!(
            Registry::with_config(PlanConfig {
                max_register_count: 2
            }),
            Err(BlockReadError::Config(_))
        ));

        let mut registry = Registry::with_config(PlanConfig {
            max_register_count: 4,
        })
        .unwrap();
        let kind = RegisterKind::HoldingRegisters;
        registry
            .assign_descriptor(kind, 1, &DeviceDescriptor::new("a", 502, 0, 4, "u64"))
            .unwrap();
        registry
            .assign_descriptor(kind, 2, &DeviceDescriptor::new("a", 502, 4, 4, "f64"))
            .unwrap();
        let blocks = registry.groups_mut(kind)[0].plan().unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.register_count <= 4));
    }

    #[test]
    #[traced_test]
    fn test_duplicate_address_warned_once() {
        let mut registry = Registry::new();
        let kind = RegisterKind::HoldingRegisters;
        registry.assign_descriptor(kind, 1, &desc("a", 10)).unwrap();
        registry.assign_descriptor(kind, 2, &desc("a", 10)).unwrap();
        for (id, address) in [(3, 20), (4, 30), (5, 40)] {
            registry
                .assign_descriptor(kind, id, &desc("a", address))
                .unwrap();
        }

        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("Duplicate device address 10"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one duplicate warning, got {n}")),
            }
        });
    }

    #[test]
    fn test_padded_timeout_joins_same_group() {
        let mut registry = Registry::new();
        let kind = RegisterKind::InputRegisters;
        registry
            .assign_descriptor(kind, 1, &desc("a", 0).timeout("5s"))
            .unwrap();
        registry
            .assign_descriptor(kind, 2, &desc("a", 1).timeout(" 5s"))
            .unwrap();
        assert_eq!(registry.group_count(), 1);
        assert_eq!(registry.device_count(), 2);
    }

    #[test]
    fn test_clear() {
        let mut registry = Registry::new();
        registry
            .assign_descriptor(RegisterKind::HoldingRegisters, 1, &desc("a", 0))
            .unwrap();
        registry.clear();
        assert_eq!(registry.group_count(), 0);
        assert!(registry.groups_mut(RegisterKind::HoldingRegisters).is_empty());
    }
}
