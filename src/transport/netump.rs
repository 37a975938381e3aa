//! NetUMP transport: Network MIDI 2.0 session through the native NetUMP
//! library (linked as `libnetump`, C ABI)
//!
//! Outgoing MIDI 1.0 messages are transcoded to UMP and queued for the
//! session thread; incoming UMP are transcoded back to MIDI 1.0 and relayed
//! into `net_to_app`. Endpoint (stream) messages stay inside the session.
//!
//! The session handler is owned by a dedicated thread that drains the
//! outbound queue and polls the library every millisecond. Nothing on the
//! relay path takes a lock or logs; packets that cannot be transcoded or
//! queued are counted and reported when the session ends.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::ffi::{c_char, c_int, c_void, CString};
use std::net::IpAddr;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{NativeTransport, SessionConfig, TransportError};
use crate::forwarder::{MidiForwarder, MidiMessage, MidiReceiver, PortPair};
use crate::ump::{is_stream_message, midi1_to_ump, ump_to_midi1, ump_word_count};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Outbound packets buffered between two session polls
const OUTBOUND_CAPACITY: usize = 1024;

#[repr(C)]
struct RawHandler {
    _private: [u8; 0],
}

type UmpCallback = unsafe extern "C" fn(ctx: *mut c_void, data: *const u32);

#[link(name = "netump")]
extern "C" {
    fn netump_create(callback: UmpCallback, ctx: *mut c_void) -> *mut RawHandler;
    fn netump_set_product_instance_id(handler: *mut RawHandler, id: *const c_char);
    fn netump_set_endpoint_name(handler: *mut RawHandler, name: *const c_char);
    fn netump_initiate_session(
        handler: *mut RawHandler,
        dest_ip: u32,
        dest_port: u16,
        local_port: u16,
        invite: bool,
    ) -> c_int;
    fn netump_run_session(handler: *mut RawHandler);
    fn netump_send_ump(handler: *mut RawHandler, data: *const u32);
    fn netump_close_session(handler: *mut RawHandler);
    fn netump_destroy(handler: *mut RawHandler);
}

/// Packets dropped on either relay direction
#[derive(Debug, Default)]
struct DropCounters {
    untranslatable_in: AtomicU64,
    untranslatable_out: AtomicU64,
    queue_full: AtomicU64,
}

impl DropCounters {
    fn report(&self) {
        let inbound = self.untranslatable_in.load(Ordering::Relaxed);
        let outbound = self.untranslatable_out.load(Ordering::Relaxed);
        let full = self.queue_full.load(Ordering::Relaxed);
        if inbound + outbound + full > 0 {
            debug!(
                "NetUMP dropped {} inbound / {} outbound untranslatable, {} on full queue",
                inbound, outbound, full
            );
        }
    }
}

/// Receives UMP from the session thread
struct Inbound {
    net_to_app: Arc<MidiForwarder>,
    epoch: Instant,
    drops: Arc<DropCounters>,
}

unsafe extern "C" fn on_ump(ctx: *mut c_void, data: *const u32) {
    if ctx.is_null() || data.is_null() {
        return;
    }
    // SAFETY: ctx is the Inbound owned by the Handler that issued this call,
    // and the library hands over a complete packet
    let inbound = unsafe { &*(ctx as *const Inbound) };
    let first = unsafe { *data };

    if is_stream_message(first) {
        return;
    }

    let words = unsafe { std::slice::from_raw_parts(data, ump_word_count(first)) };
    let mut bytes = [0u8; 3];
    let len = ump_to_midi1(words, &mut bytes);
    if len == 0 {
        inbound.drops.untranslatable_in.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let stamp = inbound.epoch.elapsed().as_nanos() as u64;
    inbound
        .net_to_app
        .relay(&MidiMessage::from_bytes(&bytes[..len], stamp));
}

/// Owned session handler; destroyed on drop
struct Handler {
    raw: NonNull<RawHandler>,
    // Must outlive `raw`, fields drop after `Drop::drop`
    _inbound: Box<Inbound>,
}

// Owned by exactly one thread at a time: the caller of `start`, then the
// session thread
unsafe impl Send for Handler {}

impl Handler {
    fn create(
        net_to_app: Arc<MidiForwarder>,
        drops: Arc<DropCounters>,
    ) -> Result<Self, TransportError> {
        let inbound = Box::new(Inbound {
            net_to_app,
            epoch: Instant::now(),
            drops,
        });
        let ctx = &*inbound as *const Inbound as *mut c_void;
        let raw = unsafe { netump_create(on_ump, ctx) };
        let raw = NonNull::new(raw).ok_or(TransportError::CreateFailed)?;
        Ok(Self {
            raw,
            _inbound: inbound,
        })
    }

    fn run(&mut self) {
        unsafe { netump_run_session(self.raw.as_ptr()) }
    }

    fn send(&mut self, word: u32) {
        let packet = [word, 0, 0, 0];
        unsafe { netump_send_ump(self.raw.as_ptr(), packet.as_ptr()) }
    }

    fn close(&mut self) {
        unsafe { netump_close_session(self.raw.as_ptr()) }
    }
}

impl Drop for Handler {
    fn drop(&mut self) {
        unsafe { netump_destroy(self.raw.as_ptr()) }
    }
}

/// `app_to_net` destination: MIDI 1.0 in, UMP onto the outbound queue
struct UmpSink {
    outbound: Sender<u32>,
    drops: Arc<DropCounters>,
}

impl MidiReceiver for UmpSink {
    fn send(&self, msg: &MidiMessage<'_>) {
        let Some(word) = midi1_to_ump(msg.bytes(), 0) else {
            self.drops.untranslatable_out.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if self.outbound.try_send(word).is_err() {
            self.drops.queue_full.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Session thread: flush queued packets, poll, repeat; close on the way out
fn session_loop(
    mut handler: Handler,
    outbound: Receiver<u32>,
    alive: Arc<AtomicBool>,
    drops: Arc<DropCounters>,
) {
    debug!("NetUMP session loop started");
    while alive.load(Ordering::Acquire) {
        for word in outbound.try_iter() {
            handler.send(word);
        }
        handler.run();
        thread::sleep(POLL_INTERVAL);
    }
    handler.close();
    drop(handler);
    drops.report();
    debug!("NetUMP session loop finished");
}

struct Session {
    alive: Arc<AtomicBool>,
    worker: JoinHandle<()>,
    ports: PortPair,
}

/// Network MIDI 2.0 session via libnetump
#[derive(Default)]
pub struct NetUmpTransport {
    session: Mutex<Option<Session>>,
}

impl NetUmpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

fn c_string(what: &str, value: &str) -> Result<CString, TransportError> {
    CString::new(value)
        .map_err(|_| TransportError::Unavailable(format!("{} contains a NUL byte", what)))
}

impl NativeTransport for NetUmpTransport {
    fn start(&self, session: &SessionConfig, ports: &PortPair) -> Result<(), TransportError> {
        let mut slot = self.session.lock();
        if slot.is_some() {
            return Err(TransportError::AlreadyRunning);
        }

        let dest_ip = match session.remote.ip() {
            IpAddr::V4(v4) => u32::from(v4),
            IpAddr::V6(_) => return Err(TransportError::UnsupportedAddress(session.remote)),
        };
        let name = c_string("endpoint name", &session.endpoint_name)?;
        let product = c_string("product instance id", &session.product_instance_id)?;

        let drops = Arc::new(DropCounters::default());
        let mut handler = Handler::create(Arc::clone(&ports.net_to_app), Arc::clone(&drops))?;
        unsafe {
            netump_set_product_instance_id(handler.raw.as_ptr(), product.as_ptr());
            netump_set_endpoint_name(handler.raw.as_ptr(), name.as_ptr());
        }

        let rc = unsafe {
            netump_initiate_session(
                handler.raw.as_ptr(),
                dest_ip,
                session.remote.port(),
                session.local_port,
                true,
            )
        };
        if rc < 0 {
            warn!("NetUMP session invitation to {} failed: {}", session.remote, rc);
            return Err(TransportError::SessionFailed(rc));
        }
        // Invitation sent, the session loop takes it from here
        handler.run();

        let (outbound_tx, outbound_rx) = bounded(OUTBOUND_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));

        let worker = {
            let alive = Arc::clone(&alive);
            let drops = Arc::clone(&drops);
            thread::Builder::new()
                .name("netump-session".to_string())
                .spawn(move || session_loop(handler, outbound_rx, alive, drops))
                .map_err(|e| TransportError::Unavailable(format!("cannot spawn session thread: {}", e)))?
        };

        ports.app_to_net.set_output(Arc::new(UmpSink {
            outbound: outbound_tx,
            drops,
        }));

        *slot = Some(Session {
            alive,
            worker,
            ports: ports.clone(),
        });

        info!(
            "🌐 NetUMP session '{}' invited {} (local port {})",
            session.endpoint_name, session.remote, session.local_port
        );
        Ok(())
    }

    fn stop(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };

        session.ports.app_to_net.clear_output();
        session.alive.store(false, Ordering::Release);
        if session.worker.join().is_err() {
            warn!("NetUMP session thread panicked");
        }
        info!("NetUMP session closed");
    }

    fn is_running(&self) -> bool {
        match self.session.lock().as_ref() {
            Some(session) => session.alive.load(Ordering::Acquire) && !session.worker.is_finished(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SessionOptions;

    #[test]
    fn test_ipv6_remote_rejected_before_native_calls() {
        let transport = NetUmpTransport::new();
        let session = SessionOptions::default().session_for("Nakama", "[::1]:5504".parse().unwrap());
        let err = transport.start(&session, &PortPair::new()).unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedAddress(_)));
        assert!(!transport.is_running());
    }

    #[test]
    fn test_sink_queues_without_blocking() {
        let (tx, rx) = bounded(2);
        let drops = Arc::new(DropCounters::default());
        let sink = UmpSink {
            outbound: tx,
            drops: Arc::clone(&drops),
        };

        for _ in 0..3 {
            sink.send(&MidiMessage::from_bytes(&[0x90, 60, 100], 0));
        }
        sink.send(&MidiMessage::from_bytes(&[0xF0, 0x7E, 0xF7], 0));

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![0x2090_3C64, 0x2090_3C64]);
        assert_eq!(drops.queue_full.load(Ordering::Relaxed), 1);
        assert_eq!(drops.untranslatable_out.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_stop_without_session() {
        let transport = NetUmpTransport::new();
        transport.stop();
        assert!(!transport.is_running());
    }
}
