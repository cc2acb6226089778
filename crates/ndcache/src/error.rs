//! Error types for the neighbor cache
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Structured error types with contextual information

use thiserror::Error;

/// Errors raised while setting up the neighbor cache
///
/// # NIST Controls
/// - SI-11(a): Generate error messages providing information necessary for corrective actions
#[derive(Debug, Error)]
pub enum NdError {
    /// Configuration error
    /// NIST: CM-6 (Configuration Settings) - Configuration validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Table created outside of a tokio runtime; timers have nowhere to run
    #[error("No tokio runtime available for the timer engine")]
    NoRuntime,

    /// Metrics registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for neighbor cache setup operations
pub type Result<T> = std::result::Result<T, NdError>;

/// Outcome of a resolve that did not yield a link-layer address
///
/// Only `WouldBlock` is transient; the other two mean the probe budget for the
/// neighbor is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Resolution in progress, the packet was queued
    #[error("Resolution in progress")]
    WouldBlock,

    /// Gateway neighbor did not answer
    #[error("Host unreachable")]
    HostUnreachable,

    /// On-link neighbor did not answer
    #[error("Host is down")]
    HostDown,
}

impl ResolveError {
    /// Whether the caller should simply wait for resolution to complete
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}
