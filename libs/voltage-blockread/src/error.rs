//! Block Read Error Types
//!
//! Error taxonomy for device grouping, block planning, transport calls and
//! register decoding.

use thiserror::Error;

/// Result type for voltage-blockread operations
pub type Result<T> = std::result::Result<T, BlockReadError>;

/// Block read errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlockReadError {
    /// Missing or invalid device configuration (host, port, timeout, slave id, span)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport client could not be created for a connection identity
    #[error("Connection error: {0}")]
    Connection(String),

    /// Block planning requested before the group was sorted
    #[error("Devices must be sorted before block planning")]
    NotSorted,

    /// Computed offset exceeds the bytes returned for a block
    #[error("Bounds error: {0}")]
    Bounds(String),

    /// Value type name not recognised
    #[error("Unsupported value type: {0}")]
    UnsupportedType(String),

    /// Byte slice could not be cast to the configured value type
    #[error("Decode error: {0}")]
    Decode(String),

    /// Malformed write payload
    #[error("Invalid data: {0}")]
    Data(String),

    /// Wire-level failure reported by the transport client
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<std::io::Error> for BlockReadError {
    fn from(err: std::io::Error) -> Self {
        BlockReadError::Transport(err.to_string())
    }
}

// Helper methods for creating errors
impl BlockReadError {
    pub fn config(msg: impl Into<String>) -> Self {
        BlockReadError::Config(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        BlockReadError::Connection(msg.into())
    }

    pub fn bounds(msg: impl Into<String>) -> Self {
        BlockReadError::Bounds(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        BlockReadError::Decode(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        BlockReadError::Data(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        BlockReadError::Transport(msg.into())
    }

    /// Whether the owning connection's `fail_on_error` flag decides if this
    /// error aborts the operation or only skips the affected reading.
    ///
    /// Ordering violations and structural configuration errors always propagate.
    pub fn is_policy_gated(&self) -> bool {
        !matches!(self, BlockReadError::NotSorted | BlockReadError::Config(_))
    }

    /// Check if this error leaves the transport client unusable
    pub fn needs_reset(&self) -> bool {
        matches!(
            self,
            BlockReadError::Transport(_) | BlockReadError::Connection(_)
        )
    }
}
