//! Real-time MIDI forwarding between the virtual device and the transport
//!
//! A [`MidiForwarder`] sits on the MIDI callback thread. `relay` must stay
//! cheap: no locks shared with the control path, no allocation, no logging.
//! The destination is swapped with `arc_swap`, so rebinding from the control
//! thread never blocks an in-flight relay.

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::debug;

/// One raw MIDI message, borrowed for the duration of a single relay call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage<'a> {
    data: &'a [u8],
    offset: usize,
    length: usize,
    timestamp_nanos: u64,
}

impl<'a> MidiMessage<'a> {
    /// Borrow `length` bytes of `data` starting at `offset`
    ///
    /// Returns `None` when the range does not fit in the buffer.
    pub fn new(data: &'a [u8], offset: usize, length: usize, timestamp_nanos: u64) -> Option<Self> {
        let end = offset.checked_add(length)?;
        if end > data.len() {
            return None;
        }
        Some(Self {
            data,
            offset,
            length,
            timestamp_nanos,
        })
    }

    /// Message covering a whole buffer
    pub fn from_bytes(data: &'a [u8], timestamp_nanos: u64) -> Self {
        Self {
            data,
            offset: 0,
            length: data.len(),
            timestamp_nanos,
        }
    }

    /// The message bytes (the `offset..offset + length` range)
    pub fn bytes(&self) -> &'a [u8] {
        &self.data[self.offset..self.offset + self.length]
    }

    /// Backing buffer the message was cut from
    pub fn buffer(&self) -> &'a [u8] {
        self.data
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn timestamp_nanos(&self) -> u64 {
        self.timestamp_nanos
    }
}

/// Anything that can accept a MIDI message synchronously
///
/// Implementations are called from real-time threads and must not block.
pub trait MidiReceiver: Send + Sync {
    fn send(&self, msg: &MidiMessage<'_>);
}

/// Bound destination (sized wrapper so it fits in an `ArcSwapOption`)
struct Destination(Arc<dyn MidiReceiver>);

/// Relays every message from one source port to at most one destination
pub struct MidiForwarder {
    name: &'static str,
    output: ArcSwapOption<Destination>,
}

impl MidiForwarder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            output: ArcSwapOption::empty(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Forward `msg` to the bound destination, or drop it if none is bound
    #[inline]
    pub fn relay(&self, msg: &MidiMessage<'_>) {
        let output = self.output.load();
        if let Some(dest) = &*output {
            dest.0.send(msg);
        }
    }

    /// Bind the destination, replacing any previous one
    pub fn set_output(&self, output: Arc<dyn MidiReceiver>) {
        debug!("MidiForwarder '{}' setOutput", self.name);
        self.output.store(Some(Arc::new(Destination(output))));
    }

    /// Unbind the destination; later messages are dropped
    pub fn clear_output(&self) {
        debug!("MidiForwarder '{}' output cleared", self.name);
        self.output.store(None);
    }

    pub fn is_bound(&self) -> bool {
        self.output.load().is_some()
    }
}

impl MidiReceiver for MidiForwarder {
    fn send(&self, msg: &MidiMessage<'_>) {
        self.relay(msg);
    }
}

/// The two forwarders of the virtual device, constructed once per process
///
/// * `app_to_net` receives what the host application writes to the device;
///   the transport binds its network sender as the destination.
/// * `net_to_app` is fed by the transport; the device binds the port the
///   host application reads from as the destination.
#[derive(Clone)]
pub struct PortPair {
    pub app_to_net: Arc<MidiForwarder>,
    pub net_to_app: Arc<MidiForwarder>,
}

impl PortPair {
    pub fn new() -> Self {
        Self {
            app_to_net: Arc::new(MidiForwarder::new("app->net")),
            net_to_app: Arc::new(MidiForwarder::new("net->app")),
        }
    }
}

impl Default for PortPair {
    fn default() -> Self {
        Self::new()
    }
}
