//! Loopback transport: everything the application sends comes straight back
//!
//! No network is involved. Useful to check the virtual device wiring and in
//! tests.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::{NativeTransport, SessionConfig, TransportError};
use crate::forwarder::{MidiForwarder, MidiMessage, MidiReceiver, PortPair};

#[derive(Default)]
pub struct LoopbackTransport {
    running: AtomicBool,
    ports: Mutex<Option<PortPair>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

struct Echo {
    target: Arc<MidiForwarder>,
}

impl MidiReceiver for Echo {
    fn send(&self, msg: &MidiMessage<'_>) {
        self.target.relay(msg);
    }
}

impl NativeTransport for LoopbackTransport {
    fn start(&self, session: &SessionConfig, ports: &PortPair) -> Result<(), TransportError> {
        let mut bound = self.ports.lock();
        if bound.is_some() {
            return Err(TransportError::AlreadyRunning);
        }

        ports.app_to_net.set_output(Arc::new(Echo {
            target: Arc::clone(&ports.net_to_app),
        }));
        *bound = Some(ports.clone());
        self.running.store(true, Ordering::SeqCst);

        info!(
            "🔁 Loopback session '{}' started (remote {} ignored)",
            session.endpoint_name, session.remote
        );
        Ok(())
    }

    fn stop(&self) {
        if let Some(ports) = self.ports.lock().take() {
            ports.app_to_net.clear_output();
            debug!("Loopback session stopped");
        }
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
