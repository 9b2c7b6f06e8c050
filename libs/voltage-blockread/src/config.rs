//! Device configuration
//!
//! `DeviceDescriptor` is the serde-facing per-device schema handed over by the
//! host runtime. `validate()` turns it into an immutable `DeviceConfig`,
//! resolving the value type and timeout once so the read path works with
//! typed, range-checked fields only.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BlockReadError, Result};
use crate::types::{RegisterKind, MAX_REGISTER_COUNT, REGISTER_ADDRESS_SPACE};
use crate::value::ValueType;

/// Default transport timeout for a connection identity
pub const DEFAULT_TIMEOUT: &str = "5s";

fn default_timeout() -> String {
    DEFAULT_TIMEOUT.to_string()
}

fn default_max_register_count() -> u16 {
    MAX_REGISTER_COUNT
}

/// Raw device descriptor as supplied by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device host name or IP (required, non-empty)
    #[serde(default)]
    pub host: String,
    /// TCP port (required)
    #[serde(default)]
    pub port: Option<u32>,
    /// Unit identifier behind the endpoint
    #[serde(default, alias = "slaveId")]
    pub slave_id: u32,
    /// Transport timeout as duration text, e.g. "5s", "250ms"
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Abort the read on any data or transport failure instead of skipping
    #[serde(default, alias = "failOnError")]
    pub fail_on_error: bool,
    /// First register (or bit) address
    pub address: u32,
    /// Number of registers (or bits)
    pub width: u32,
    /// Value type name (e.g. "u16", "uint32", "float")
    #[serde(rename = "type")]
    pub value_type: String,
}

impl DeviceDescriptor {
    pub fn new(
        host: impl Into<String>,
        port: u32,
        address: u32,
        width: u32,
        value_type: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
            slave_id: 0,
            timeout: default_timeout(),
            fail_on_error: false,
            address,
            width,
            value_type: value_type.into(),
        }
    }

    pub fn slave_id(mut self, slave_id: u32) -> Self {
        self.slave_id = slave_id;
        self
    }

    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = timeout.into();
        self
    }

    pub fn fail_on_error(mut self, fail_on_error: bool) -> Self {
        self.fail_on_error = fail_on_error;
        self
    }

    /// Validate the descriptor into an immutable `DeviceConfig`
    pub fn validate(&self) -> Result<DeviceConfig> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(BlockReadError::config("Host is required"));
        }

        let port = match self.port {
            Some(port) => u16::try_from(port).map_err(|_| {
                BlockReadError::config(format!("Invalid port: {port} > 65535"))
            })?,
            None => return Err(BlockReadError::config("Port is required")),
        };

        let slave_id = u8::try_from(self.slave_id).map_err(|_| {
            BlockReadError::config(format!("Invalid slave id: {} > 255", self.slave_id))
        })?;

        let timeout_text = self.timeout.trim();
        let timeout = humantime::parse_duration(timeout_text).map_err(|e| {
            BlockReadError::config(format!("Invalid timeout '{}': {}", self.timeout, e))
        })?;

        let value_type: ValueType = self.value_type.parse()?;

        if self.width == 0 {
            return Err(BlockReadError::config("Width must be at least 1"));
        }
        if self.address >= REGISTER_ADDRESS_SPACE {
            return Err(BlockReadError::config(format!(
                "Invalid address: {} > 65535",
                self.address
            )));
        }
        let end = self.address + self.width;
        if end > REGISTER_ADDRESS_SPACE {
            return Err(BlockReadError::config(format!(
                "Invalid range: {} + {} = {} > 65536",
                self.address, self.width, end
            )));
        }
        if self.width != u32::from(value_type.register_width()) {
            return Err(BlockReadError::config(format!(
                "Width {} does not match type {} ({} register(s))",
                self.width,
                value_type,
                value_type.register_width()
            )));
        }

        Ok(DeviceConfig {
            host: host.to_string(),
            port,
            slave_id,
            timeout,
            timeout_text: timeout_text.to_string(),
            fail_on_error: self.fail_on_error,
            address: self.address as u16,
            width: self.width as u16,
            value_type,
        })
    }
}

/// Validated, immutable device configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    host: String,
    port: u16,
    slave_id: u8,
    timeout: Duration,
    timeout_text: String,
    fail_on_error: bool,
    address: u16,
    width: u16,
    value_type: ValueType,
}

impl DeviceConfig {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn fail_on_error(&self) -> bool {
        self.fail_on_error
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    /// One past the last register (or bit) of the device
    pub fn end(&self) -> u32 {
        u32::from(self.address) + u32::from(self.width)
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Connection identity used for grouping
    pub fn identity(&self) -> ConnectionIdentity {
        ConnectionIdentity {
            host: self.host.clone(),
            port: self.port,
            timeout: self.timeout_text.clone(),
            fail_on_error: self.fail_on_error,
        }
    }

    /// Whether this device shares a connection with `identity`
    pub fn matches(&self, identity: &ConnectionIdentity) -> bool {
        self.host == identity.host
            && self.port == identity.port
            && self.timeout_text == identity.timeout
            && self.fail_on_error == identity.fail_on_error
    }

    /// Check the device can be read from the given register table
    pub fn check_kind(&self, kind: RegisterKind) -> Result<()> {
        if kind.is_bit_addressed() && (self.value_type != ValueType::Bool || self.width != 1) {
            return Err(BlockReadError::config(format!(
                "{} device at {} must be bool with width 1, got {} width {}",
                kind, self.address, self.value_type, self.width
            )));
        }
        Ok(())
    }

    /// Parameters handed to a `ClientFactory`
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.host.clone(),
            port: self.port,
            slave_id: self.slave_id,
            timeout: self.timeout,
        }
    }
}

/// Fields that decide whether two devices share a physical connection
///
/// The timeout is compared as configured text, not as a parsed duration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    pub host: String,
    pub port: u16,
    pub timeout: String,
    pub fail_on_error: bool,
}

/// Parameters used to open a transport client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    pub timeout: Duration,
}

impl ConnectionParams {
    /// `host:port` endpoint string
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Block planning configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Upper bound on registers (or bits) covered by one read block
    #[serde(default = "default_max_register_count")]
    pub max_register_count: u16,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            max_register_count: MAX_REGISTER_COUNT,
        }
    }
}

impl PlanConfig {
    /// The limit must fit the widest device (a 64-bit value spans four
    /// registers) and stay within `MAX_REGISTER_COUNT`.
    pub fn validate(&self) -> Result<()> {
        let widest = ValueType::F64.register_width();
        if self.max_register_count < widest || self.max_register_count > MAX_REGISTER_COUNT {
            return Err(BlockReadError::config(format!(
                "max_register_count must be within {}..={}, got {}",
                widest, MAX_REGISTER_COUNT, self.max_register_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    // ========== Deserialization ==========

    #[test]
    fn test_descriptor_deserialization_minimal() {
        let json = r#"{
            "host": "10.0.0.5",
            "port": 502,
            "address": 100,
            "width": 2,
            "type": "float32"
        }"#;

        let desc: DeviceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.slave_id, 0);
        assert_eq!(desc.timeout, "5s");
        assert!(!desc.fail_on_error);

        let config = desc.validate().unwrap();
        assert_eq!(config.host(), "10.0.0.5");
        assert_eq!(config.port(), 502);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.value_type(), ValueType::F32);
        assert_eq!(config.end(), 102);
    }

    #[test]
    fn test_descriptor_accepts_camel_case_aliases() {
        let json = r#"{
            "host": "plc",
            "port": 1502,
            "slaveId": 7,
            "failOnError": true,
            "timeout": "250ms",
            "address": 3,
            "width": 1,
            "type": "UINT16"
        }"#;

        let config = serde_json::from_str::<DeviceDescriptor>(json)
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(config.slave_id(), 7);
        assert!(config.fail_on_error());
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.value_type(), ValueType::U16);
    }

    // ========== Validation ==========

    #[test]
    fn test_validate_missing_host_and_port() {
        let desc = DeviceDescriptor::new("  ", 502, 0, 1, "u16");
        assert!(matches!(desc.validate(), Err(BlockReadError::Config(_))));

        let mut desc = DeviceDescriptor::new("plc", 502, 0, 1, "u16");
        desc.port = None;
        assert_eq!(
            desc.validate().unwrap_err(),
            BlockReadError::config("Port is required")
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range_ids() {
        let desc = DeviceDescriptor::new("plc", 70000, 0, 1, "u16");
        assert!(matches!(desc.validate(), Err(BlockReadError::Config(_))));

        let desc = DeviceDescriptor::new("plc", 502, 0, 1, "u16").slave_id(256);
        assert!(matches!(desc.validate(), Err(BlockReadError::Config(_))));
    }

    #[test]
    fn test_validate_bad_timeout() {
        let desc = DeviceDescriptor::new("plc", 502, 0, 1, "u16").timeout("soon");
        let err = desc.validate().unwrap_err();
        assert!(matches!(err, BlockReadError::Config(ref m) if m.contains("soon")));
    }

    #[test]
    fn test_validate_unsupported_type() {
        let desc = DeviceDescriptor::new("plc", 502, 0, 1, "bcd16");
        assert_eq!(
            desc.validate().unwrap_err(),
            BlockReadError::UnsupportedType("bcd16".to_string())
        );
    }

    #[test]
    fn test_validate_address_space() {
        let desc = DeviceDescriptor::new("plc", 502, 65535, 1, "u16");
        assert!(desc.validate().is_ok());

        let desc = DeviceDescriptor::new("plc", 502, 65535, 2, "u32");
        assert!(matches!(desc.validate(), Err(BlockReadError::Config(_))));

        let desc = DeviceDescriptor::new("plc", 502, 0, 0, "u16");
        assert!(matches!(desc.validate(), Err(BlockReadError::Config(_))));
    }

    #[test]
    fn test_validate_width_matches_type() {
        assert!(DeviceDescriptor::new("plc", 502, 0, 2, "u32")
            .validate()
            .is_ok());
        assert!(DeviceDescriptor::new("plc", 502, 0, 4, "f64")
            .validate()
            .is_ok());
        assert!(matches!(
            DeviceDescriptor::new("plc", 502, 0, 1, "u32").validate(),
            Err(BlockReadError::Config(_))
        ));
    }

    // ========== Identity ==========

    #[test]
    fn test_identity_ignores_span_and_type() {
        let a = DeviceDescriptor::new("plc", 502, 0, 1, "u16")
            .validate()
            .unwrap();
        let b = DeviceDescriptor::new("plc", 502, 40, 4, "f64")
            .slave_id(9)
            .validate()
            .unwrap();
        assert!(b.matches(&a.identity()));
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_identity_compares_timeout_text() {
        let a = DeviceDescriptor::new("plc", 502, 0, 1, "u16")
            .timeout("1s")
            .validate()
            .unwrap();
        let b = DeviceDescriptor::new("plc", 502, 0, 1, "u16")
            .timeout("1000ms")
            .validate()
            .unwrap();
        assert_eq!(a.timeout(), b.timeout());
        assert!(!b.matches(&a.identity()));

        let c = DeviceDescriptor::new("plc", 502, 0, 1, "u16")
            .timeout("1s")
            .fail_on_error(true)
            .validate()
            .unwrap();
        assert!(!c.matches(&a.identity()));
    }

    #[test]
    fn test_identity_trims_timeout_text() {
        let plain = DeviceDescriptor::new("plc", 502, 0, 1, "u16")
            .validate()
            .unwrap();
        let padded = DeviceDescriptor::new("plc", 502, 4, 1, "u16")
            .timeout(" 5s ")
            .validate()
            .unwrap();
        assert_eq!(plain.identity(), padded.identity());
        assert_eq!(padded.identity().timeout, "5s");
    }

    #[test]
    fn test_check_kind_for_bit_tables() {
        let coil = DeviceDescriptor::new("plc", 502, 17, 1, "bool")
            .validate()
            .unwrap();
        assert!(coil.check_kind(RegisterKind::Coils).is_ok());

        let reg = DeviceDescriptor::new("plc", 502, 17, 1, "u16")
            .validate()
            .unwrap();
        assert!(reg.check_kind(RegisterKind::HoldingRegisters).is_ok());
        assert!(matches!(
            reg.check_kind(RegisterKind::DiscreteInputs),
            Err(BlockReadError::Config(_))
        ));
    }

    // ========== PlanConfig ==========

    #[test]
    fn test_plan_config_defaults_and_bounds() {
        let config: PlanConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PlanConfig::default());
        assert_eq!(config.max_register_count, 123);
        assert!(config.validate().is_ok());

        assert!(PlanConfig {
            max_register_count: 0
        }
        .validate()
        .is_err());
        assert!(PlanConfig {
            max_register_count: 124
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_plan_config_limit_fits_widest_type() {
        for too_small in 1..4 {
            assert!(matches!(
                PlanConfig {
                    max_register_count: too_small
                }
                .validate(),
                Err(BlockReadError::Config(_))
            ));
        }
        assert!(PlanConfig {
            max_register_count: ValueType::F64.register_width()
        }
        .validate()
        .is_ok());
    }
}
