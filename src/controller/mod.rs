//! Connection controller
//!
//! Owns the `STOPPED` / `STARTING` / `RUNNING` state machine and drives one
//! connection attempt at a time: resolve the host, attach the virtual device,
//! start the native session, persist what worked.
//!
//! State lives in a `watch` channel: the controller is the only writer, any
//! number of observers can `subscribe()`. Every attempt carries a generation
//! number; a stop (or an unexpected session end) bumps it, so work finishing
//! late for an older attempt can neither flip the state nor leak a session.


use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::device::{DeviceHandle, DeviceRegistry};
use crate::endpoint::Endpoint;
use crate::error::BridgeError;
use crate::forwarder::PortPair;
use crate::messages::MessageSender;
use crate::resolver::HostResolver;
use crate::settings::{Settings, SettingsStore};
use crate::transport::{NativeTransport, SessionConfig, SessionOptions};

/// Message shown when a running session disappears on its own
pub const SESSION_LOST_MESSAGE: &str = "ERROR: Session ended unexpectedly.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Stopped,
    Starting,
    Running,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Stopped => "STOPPED",
            ConnectionState::Starting => "STARTING",
            ConnectionState::Running => "RUNNING",
        };
        f.write_str(s)
    }
}

/// Result of [`ConnectionController::request_start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// STOPPED -> STARTING, the attempt runs in the background
    Accepted,
    /// A session is starting or running; nothing was done
    AlreadyActive,
}

/// Collaborators handed to the controller, constructed once per process
pub struct ControllerParts {
    pub transport: Arc<dyn NativeTransport>,
    pub devices: Arc<dyn DeviceRegistry>,
    pub ports: PortPair,
    pub resolver: HostResolver,
    pub settings: Arc<dyn SettingsStore>,
    pub messages: MessageSender,
    pub device_name: String,
    pub options: SessionOptions,
}

#[derive(Default)]
struct Session {
    generation: u64,
    stopping: bool,
    task: Option<JoinHandle<()>>,
    device: Option<DeviceHandle>,
}

struct Inner {
    transport: Arc<dyn NativeTransport>,
    devices: Arc<dyn DeviceRegistry>,
    ports: PortPair,
    resolver: HostResolver,
    settings: Arc<dyn SettingsStore>,
    messages: MessageSender,
    device_name: String,
    options: SessionOptions,

    state: watch::Sender<ConnectionState>,
    session: Mutex<Session>,
    // Serializes native start/stop calls
    transport_gate: Mutex<()>,
}

/// Handle to the controller, cheap to clone
#[derive(Clone)]
pub struct ConnectionController {
    inner: Arc<Inner>,
}

impl ConnectionController {
    /// Create the controller, adopting a native session that is already up
    pub fn new(parts: ControllerParts) -> Self {
        let initial = if parts.transport.is_running() {
            info!("Native session already running, starting in RUNNING");
            ConnectionState::Running
        } else {
            ConnectionState::Stopped
        };
        let (state, _) = watch::channel(initial);

        Self {
            inner: Arc::new(Inner {
                transport: parts.transport,
                devices: parts.devices,
                ports: parts.ports,
                resolver: parts.resolver,
                settings: parts.settings,
                messages: parts.messages,
                device_name: parts.device_name,
                options: parts.options,
                state,
                session: Mutex::new(Session::default()),
                transport_gate: Mutex::new(()),
            }),
        }
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Begin connecting to `endpoint`
    ///
    /// Moves to STARTING before returning; the rest of the attempt runs on a
    /// spawned task, so this must be called within a tokio runtime. Failures
    /// come back through the message channel, never from this call.
    pub fn request_start(&self, endpoint: Endpoint) -> StartOutcome {
        let mut session = self.inner.session.lock();
        let state = self.current_state();
        if state != ConnectionState::Stopped {
            debug!("Start ignored, controller is {}", state);
            return StartOutcome::AlreadyActive;
        }

        session.generation += 1;
        let generation = session.generation;
        self.inner.state.send_replace(ConnectionState::Starting);
        info!(
            "🔌 Connecting to {}:{} as '{}'",
            endpoint.host(),
            endpoint.port(),
            endpoint.display_name()
        );

        let inner = Arc::clone(&self.inner);
        session.task = Some(tokio::spawn(inner.run_start(generation, endpoint)));
        StartOutcome::Accepted
    }

    /// Stop the session, or cancel the attempt in flight
    ///
    /// Best effort: always ends in STOPPED.
    pub async fn request_stop(&self) {
        let (task, device) = {
            let mut session = self.inner.session.lock();
            if self.current_state() == ConnectionState::Stopped {
                debug!("Stop ignored, nothing is running");
                return;
            }
            session.generation += 1;
            session.stopping = true;
            (session.task.take(), session.device.take())
        };

        if let Some(task) = task {
            task.abort();
        }

        self.inner.stop_native().await;
        drop(device);

        {
            let mut session = self.inner.session.lock();
            session.stopping = false;
            self.inner.state.send_replace(ConnectionState::Stopped);
        }
        info!("⏹️ Session stopped");
    }

    /// Notice a native session that ended without being asked to
    ///
    /// Called periodically by the binary's watchdog.
    pub async fn check_liveness(&self) {
        let device = {
            let mut session = self.inner.session.lock();
            if session.stopping
                || self.current_state() != ConnectionState::Running
                || self.inner.transport.is_running()
            {
                return;
            }
            session.generation += 1;
            session.stopping = true;
            session.task = None;
            session.device.take()
        };

        warn!("Native session ended unexpectedly");
        // Release what is left of the dead session so the next start is clean
        self.inner.stop_native().await;
        drop(device);

        {
            let mut session = self.inner.session.lock();
            session.stopping = false;
            self.inner.state.send_replace(ConnectionState::Stopped);
        }
        self.inner.messages.show(SESSION_LOST_MESSAGE);
    }
}

impl Inner {
    async fn run_start(self: Arc<Self>, generation: u64, endpoint: Endpoint) {
        match self.start_session(generation, &endpoint).await {
            Ok(true) => {},
            Ok(false) => debug!("Attempt {} superseded", generation),
            Err(e) => self.fail(generation, e),
        }
    }

    async fn start_session(
        self: &Arc<Self>,
        generation: u64,
        endpoint: &Endpoint,
    ) -> Result<bool, BridgeError> {
        let ip = self
            .resolver
            .resolve(endpoint.host())
            .await
            .into_result(endpoint.host())?;
        let remote = SocketAddr::new(ip, endpoint.port());

        let device = self.devices.attach(&self.device_name, &self.ports)?;
        {
            let mut session = self.session.lock();
            if session.generation != generation {
                return Ok(false);
            }
            session.device = Some(device);
        }

        let config = self.options.session_for(endpoint.display_name(), remote);
        let inner = Arc::clone(self);
        let endpoint = endpoint.clone();
        // Keeps running to completion even if this task is aborted
        tokio::task::spawn_blocking(move || inner.start_native(generation, &config, &endpoint))
            .await
            .map_err(|e| BridgeError::TransportStartFailed(format!("start task failed: {}", e)))?
    }

    /// Blocking part of an attempt: native start, persistence, RUNNING
    fn start_native(
        &self,
        generation: u64,
        config: &SessionConfig,
        endpoint: &Endpoint,
    ) -> Result<bool, BridgeError> {
        let _gate = self.transport_gate.lock();
        if self.session.lock().generation != generation {
            return Ok(false);
        }

        if self.transport.is_running() {
            warn!("Stale native session found, stopping it first");
            self.transport.stop();
        }

        self.transport
            .start(config, &self.ports)
            .map_err(|e| BridgeError::TransportStartFailed(e.to_string()))?;

        let mut session = self.session.lock();
        if session.generation != generation {
            drop(session);
            info!("Session came up after being cancelled, stopping it");
            self.transport.stop();
            return Ok(false);
        }
        // Only a session that made it to RUNNING becomes the new default
        if let Err(e) = Settings::persist_endpoint(self.settings.as_ref(), endpoint) {
            warn!("Failed to persist settings: {:#}", e);
        }
        session.task = None;
        self.state.send_replace(ConnectionState::Running);
        info!("✅ Session running with {}", config.remote);
        Ok(true)
    }

    async fn stop_native(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let stopped = tokio::task::spawn_blocking(move || {
            let _gate = inner.transport_gate.lock();
            inner.transport.stop();
        })
        .await;
        if let Err(e) = stopped {
            warn!("Native stop failed: {}", e);
        }
    }

    fn fail(&self, generation: u64, err: BridgeError) {
        let device = {
            let mut session = self.session.lock();
            if session.generation != generation {
                debug!("Ignoring failure of superseded attempt: {}", err);
                return;
            }
            session.task = None;
            let device = session.device.take();
            self.state.send_replace(ConnectionState::Stopped);
            device
        };
        drop(device);

        warn!("Connection attempt failed: {}", err);
        self.messages.show(err.user_message());
    }
}
