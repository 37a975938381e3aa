//! Local virtual MIDI device
//!
//! The host application talks to a virtual MIDI device named
//! [`DEVICE_NAME`]. Attaching the device wires its two ports to the
//! forwarders: what the application writes is relayed into `app_to_net`,
//! and `net_to_app` delivers into the port the application reads.

pub mod midi_ports;

use tracing::debug;

use crate::error::BridgeError;
use crate::forwarder::PortPair;

pub use midi_ports::{print_ports, MidirRegistry};

/// Name of the virtual device the bridge serves
pub const DEVICE_NAME: &str = "Network MIDI 2.0 VD";

/// Lookup of the local MIDI device
pub trait DeviceRegistry: Send + Sync {
    /// Open the device called `name` and bind it to `ports`
    fn attach(&self, name: &str, ports: &PortPair) -> Result<DeviceHandle, BridgeError>;
}

/// An attached device; dropping it releases the OS connections
pub struct DeviceHandle {
    name: String,
    ports: PortPair,
    _connections: Box<dyn Send>,
}

impl DeviceHandle {
    /// Wrap the OS connections that keep the device open
    pub fn new(name: impl Into<String>, ports: PortPair, connections: Box<dyn Send>) -> Self {
        Self {
            name: name.into(),
            ports,
            _connections: connections,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.ports.net_to_app.clear_output();
        debug!("MIDI device '{}' released", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::{MidiMessage, MidiReceiver};
    use std::sync::Arc;

    struct Sink;

    impl MidiReceiver for Sink {
        fn send(&self, _msg: &MidiMessage<'_>) {}
    }

    #[test]
    fn test_drop_unbinds_app_side() {
        let ports = PortPair::new();
        ports.net_to_app.set_output(Arc::new(Sink));

        let handle = DeviceHandle::new(DEVICE_NAME, ports.clone(), Box::new(()));
        assert_eq!(handle.name(), DEVICE_NAME);
        assert!(ports.net_to_app.is_bound());

        drop(handle);
        assert!(!ports.net_to_app.is_bound());
    }
}
