//! Error kinds surfaced by the connection bridge
//!
//! Every failed start attempt is reported as exactly one user-facing message
//! built from a [`BridgeError`]. Nothing here is fatal to the process.

use std::time::Duration;
use thiserror::Error;

/// Why a host name did not produce a usable address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveFailure {
    /// The resolver answered with an error
    #[error("name lookup failed: {0}")]
    LookupFailed(String),

    /// The resolver answered, but without any address
    #[error("name lookup returned no usable address")]
    NoAddress,

    /// No answer arrived before the deadline
    #[error("name lookup timed out after {0:?}")]
    TimedOut(Duration),
}

/// Failures of a connection attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Name lookup failed or timed out
    #[error("could not resolve '{host}': {reason}")]
    HostUnresolvable { host: String, reason: ResolveFailure },

    /// The local virtual MIDI device is not present
    #[error("MIDI device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The native session refused to start
    #[error("transport failed to start: {0}")]
    TransportStartFailed(String),

    /// Start requested while a session is starting or running
    #[error("a session is already active")]
    AlreadyActive,
}

impl BridgeError {
    /// The single line shown to the user for a failed attempt
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::HostUnresolvable { host, .. } => {
                format!("ERROR: Could not connect to '{}'.", host)
            },
            BridgeError::DeviceUnavailable(detail) => {
                format!("ERROR: MIDI device not found! ({})", detail)
            },
            BridgeError::TransportStartFailed(detail) => {
                format!("ERROR: Could not start the network session: {}", detail)
            },
            BridgeError::AlreadyActive => "A session is already active.".to_string(),
        }
    }
}
