//! Block execution
//!
//! Issues one transport call per planned block, sequentially, and stores the
//! raw response bytes on the block. A client that failed a call is dropped and
//! a fresh one is requested from the factory before the next call; clients are
//! never repaired in place.

use tracing::{debug, error, warn};

use crate::client::{ClientFactory, ModbusClient};
use crate::config::ConnectionParams;
use crate::error::{BlockReadError, Result};
use crate::planner::ReadBlock;
use crate::types::RegisterKind;

/// Expected response length in bytes for `count` registers or bits
pub fn expected_len(kind: RegisterKind, count: u16) -> usize {
    if kind.is_bit_addressed() {
        usize::from(count).div_ceil(8)
    } else {
        2 * usize::from(count)
    }
}

/// Execute the read call matching `kind` for one block
pub async fn read_block(
    client: &mut dyn ModbusClient,
    kind: RegisterKind,
    block: &ReadBlock,
) -> Result<Vec<u8>> {
    let start = block.start_register;
    let count = block.register_count;
    match kind {
        RegisterKind::Coils => client.read_coils(start, count).await,
        RegisterKind::DiscreteInputs => client.read_discrete_inputs(start, count).await,
        RegisterKind::HoldingRegisters => client.read_holding_registers(start, count).await,
        RegisterKind::InputRegisters => client.read_input_registers(start, count).await,
    }
}

/// Make sure `slot` holds a client, asking the factory for a new one if needed
pub async fn ensure_client<'a>(
    slot: &'a mut Option<Box<dyn ModbusClient>>,
    factory: &dyn ClientFactory,
    params: &ConnectionParams,
) -> Result<&'a mut Box<dyn ModbusClient>> {
    if slot.is_none() {
        debug!("Creating Modbus client for {}", params.endpoint());
        *slot = Some(factory.connect(params).await?);
    }
    slot.as_mut()
        .ok_or_else(|| BlockReadError::connection(format!("No client for {}", params.endpoint())))
}

/// Execute every block of a group, storing raw results.
///
/// With `fail_on_error` the first failure aborts and is returned. Otherwise the
/// failing block keeps empty results and reading continues; a connect failure
/// ends the cycle for the group without readings.
pub async fn read_blocks(
    slot: &mut Option<Box<dyn ModbusClient>>,
    factory: &dyn ClientFactory,
    params: &ConnectionParams,
    kind: RegisterKind,
    fail_on_error: bool,
    blocks: &mut [ReadBlock],
) -> Result<()> {
    for block in blocks.iter_mut() {
        block.results.clear();
    }

    for block in blocks.iter_mut() {
        let client = match ensure_client(slot, factory, params).await {
            Ok(client) => client,
            Err(e) if fail_on_error || !e.is_policy_gated() => {
                error!("Failed to connect to {}: {}", params.endpoint(), e);
                return Err(e);
            },
            Err(e) => {
                warn!(
                    "Failed to connect to {}: {} - skipping remaining blocks this cycle",
                    params.endpoint(),
                    e
                );
                return Ok(());
            },
        };

        debug!(
            "Reading {} block: slave={}, start={}, count={}, devices={}",
            kind,
            params.slave_id,
            block.start_register,
            block.register_count,
            block.members.len()
        );

        match read_block(client.as_mut(), kind, block).await {
            Ok(bytes) => {
                let expected = expected_len(kind, block.register_count);
                if bytes.len() != expected {
                    warn!(
                        "Received {} bytes, expected {} for {} block at address {}",
                        bytes.len(),
                        expected,
                        kind,
                        block.start_register
                    );
                }
                block.results = bytes;
            },
            Err(e) => {
                // a client that failed a call is never reused
                *slot = None;

                if fail_on_error || !e.is_policy_gated() {
                    error!(
                        "Block read failed ({}, start={}, count={}): {}",
                        params.endpoint(),
                        block.start_register,
                        block.register_count,
                        e
                    );
                    return Err(e);
                }
                warn!(
                    "Block read failed ({}, start={}, count={}): {} - continuing with next block",
                    params.endpoint(),
                    block.start_register,
                    block.register_count,
                    e
                );
            },
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::simulator::{SimulatedDevice, SimulatorFactory};
    use std::time::Duration;

    fn params() -> ConnectionParams {
        ConnectionParams {
            host: "sim".to_string(),
            port: 502,
            slave_id: 1,
            timeout: Duration::from_secs(1),
        }
    }

    fn block(start: u16, count: u16) -> ReadBlock {
        ReadBlock {
            start_register: start,
            register_count: count,
            members: vec![0],
            results: Vec::new(),
        }
    }

    #[test]
    fn test_expected_len() {
        assert_eq!(expected_len(RegisterKind::HoldingRegisters, 8), 16);
        assert_eq!(expected_len(RegisterKind::Coils, 8), 1);
        assert_eq!(expected_len(RegisterKind::DiscreteInputs, 9), 2);
    }

    #[tokio::test]
    async fn test_read_blocks_one_call_per_block() {
        let device = SimulatedDevice::new();
        device.set_holding(2, &[0x0102, 0x0304]).await;
        device.set_holding(200, &[0xAAAA]).await;
        let factory = SimulatorFactory::new().with_device("sim:502", device.clone());

        let mut slot = None;
        let mut blocks = vec![block(2, 2), block(200, 1)];
        read_blocks(
            &mut slot,
            &factory,
            &params(),
            RegisterKind::HoldingRegisters,
            true,
            &mut blocks,
        )
        .await
        .unwrap();

        assert_eq!(blocks[0].results, vec![0x01, 0x02, 0x03, 0x04]);
        assert_eq!(blocks[1].results, vec![0xAA, 0xAA]);
        assert_eq!(device.request_count(), 2);
        assert_eq!(factory.connect_count(), 1);
        assert!(slot.is_some());
    }

    #[tokio::test]
    async fn test_read_blocks_fatal_failure_drops_client() {
        let device = SimulatedDevice::new();
        device.fail_next(1);
        let factory = SimulatorFactory::new().with_device("sim:502", device.clone());

        let mut slot = None;
        let mut blocks = vec![block(0, 1), block(300, 1)];
        let err = read_blocks(
            &mut slot,
            &factory,
            &params(),
            RegisterKind::InputRegisters,
            true,
            &mut blocks,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BlockReadError::Transport(_)));
        assert!(slot.is_none());
        assert!(blocks.iter().all(|b| b.results.is_empty()));
    }

    #[tokio::test]
    async fn test_read_blocks_non_fatal_failure_continues_with_new_client() {
        let device = SimulatedDevice::new();
        device.set_input(300, &[7]).await;
        device.fail_next(1);
        let factory = SimulatorFactory::new().with_device("sim:502", device.clone());

        let mut slot = None;
        let mut blocks = vec![block(0, 1), block(300, 1)];
        read_blocks(
            &mut slot,
            &factory,
            &params(),
            RegisterKind::InputRegisters,
            false,
            &mut blocks,
        )
        .await
        .unwrap();

        assert!(blocks[0].results.is_empty());
        assert_eq!(blocks[1].results, vec![0x00, 0x07]);
        // the failed client was replaced before the second block
        assert_eq!(factory.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_read_blocks_connect_failure_policy() {
        let factory = SimulatorFactory::new();
        let mut blocks = vec![block(0, 1)];

        let mut slot = None;
        read_blocks(
            &mut slot,
            &factory,
            &params(),
            RegisterKind::Coils,
            false,
            &mut blocks,
        )
        .await
        .unwrap();
        assert!(slot.is_none());
        assert!(blocks[0].results.is_empty());

        let err = read_blocks(
            &mut slot,
            &factory,
            &params(),
            RegisterKind::Coils,
            true,
            &mut blocks,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BlockReadError::Connection(_)));
    }

    #[tokio::test]
    async fn test_read_blocks_clears_stale_results() {
        let device = SimulatedDevice::new();
        let factory = SimulatorFactory::new().with_device("sim:502", device.clone());
        factory.refuse_connections(true);

        let mut slot = None;
        let mut blocks = vec![block(0, 1)];
        blocks[0].results = vec![0xDE, 0xAD];

        read_blocks(
            &mut slot,
            &factory,
            &params(),
            RegisterKind::HoldingRegisters,
            false,
            &mut blocks,
        )
        .await
        .unwrap();
        assert!(blocks[0].results.is_empty());
    }
}
