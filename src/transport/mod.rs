//! Native Network MIDI 2.0 transport
//!
//! A transport owns the network session with the remote endpoint. It is
//! driven synchronously by the controller from tokio's blocking pool and
//! moves traffic through the [`PortPair`] it is started with: it binds
//! itself as the destination of `app_to_net` and feeds `net_to_app`.

pub mod loopback;
#[cfg(feature = "netump")]
pub mod netump;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::forwarder::PortPair;

pub use loopback::LoopbackTransport;
#[cfg(feature = "netump")]
pub use netump::NetUmpTransport;

pub const DEFAULT_LOCAL_PORT: u16 = 5504;
pub const DEFAULT_PRODUCT_INSTANCE_ID: &str = "ZNK_001";

/// Errors reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("a session is already running")]
    AlreadyRunning,

    #[error("could not create the session handler")]
    CreateFailed,

    #[error("session invitation failed (code {0})")]
    SessionFailed(i32),

    #[error("unsupported remote address {0}")]
    UnsupportedAddress(SocketAddr),

    #[error("{0}")]
    Unavailable(String),
}

/// Parameters of one native session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub endpoint_name: String,
    pub remote: SocketAddr,
    pub local_port: u16,
    pub product_instance_id: String,
}

/// Fixed per-process session options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    #[serde(default = "default_product_instance_id")]
    pub product_instance_id: String,
}

fn default_local_port() -> u16 {
    DEFAULT_LOCAL_PORT
}

fn default_product_instance_id() -> String {
    DEFAULT_PRODUCT_INSTANCE_ID.to_string()
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            local_port: DEFAULT_LOCAL_PORT,
            product_instance_id: DEFAULT_PRODUCT_INSTANCE_ID.to_string(),
        }
    }
}

impl SessionOptions {
    pub fn session_for(&self, endpoint_name: &str, remote: SocketAddr) -> SessionConfig {
        SessionConfig {
            endpoint_name: endpoint_name.to_string(),
            remote,
            local_port: self.local_port,
            product_instance_id: self.product_instance_id.clone(),
        }
    }
}

/// Contract of the native session
///
/// All calls block; `stop` is idempotent and safe when nothing runs.
pub trait NativeTransport: Send + Sync {
    fn start(&self, session: &SessionConfig, ports: &PortPair) -> Result<(), TransportError>;
    fn stop(&self);
    fn is_running(&self) -> bool;
}

/// Which transport the binary drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Netump,
    Loopback,
}

/// Build the configured transport
pub fn build_transport(kind: TransportKind) -> Arc<dyn NativeTransport> {
    match kind {
        TransportKind::Loopback => Arc::new(LoopbackTransport::new()),
        #[cfg(feature = "netump")]
        TransportKind::Netump => Arc::new(NetUmpTransport::new()),
        #[cfg(not(feature = "netump"))]
        TransportKind::Netump => Arc::new(MissingTransport),
    }
}

/// Stand-in used when the binary was built without the native library
#[cfg(not(feature = "netump"))]
struct MissingTransport;

#[cfg(not(feature = "netump"))]
impl NativeTransport for MissingTransport {
    fn start(&self, _session: &SessionConfig, _ports: &PortPair) -> Result<(), TransportError> {
        Err(TransportError::Unavailable(
            "built without NetUMP support (enable the `netump` feature)".to_string(),
        ))
    }

    fn stop(&self) {}

    fn is_running(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_for_uses_options() {
        let options = SessionOptions::default();
        let session = options.session_for("Nakama", "10.0.0.5:5673".parse().unwrap());
        assert_eq!(session.local_port, 5504);
        assert_eq!(session.product_instance_id, "ZNK_001");
        assert_eq!(session.remote.port(), 5673);
    }

    #[test]
    fn test_kind_from_yaml() {
        let kind: TransportKind = serde_yaml::from_str("loopback").unwrap();
        assert_eq!(kind, TransportKind::Loopback);
        assert_eq!(TransportKind::default(), TransportKind::Netump);
    }

    #[cfg(not(feature = "netump"))]
    #[test]
    fn test_missing_native_library_fails_start() {
        let transport = build_transport(TransportKind::Netump);
        let session = SessionOptions::default().session_for("Nakama", "10.0.0.5:5504".parse().unwrap());
        let err = transport.start(&session, &PortPair::new()).unwrap_err();
        assert!(err.to_string().contains("netump"));
        assert!(!transport.is_running());
        transport.stop();
    }
}
