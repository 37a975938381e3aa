//! Nakama - Network MIDI 2.0 bridge
//!
//! Connects a local virtual MIDI device to a remote Network MIDI 2.0
//! endpoint. The [`controller`] drives connection attempts, [`resolver`]
//! turns host names into addresses, [`forwarder`] relays MIDI between the
//! device and the native [`transport`].

pub mod cli;
pub mod config;
pub mod controller;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod forwarder;
pub mod messages;
pub mod paths;
pub mod resolver;
pub mod settings;
pub mod transport;
pub mod ump;

pub use controller::{ConnectionController, ConnectionState, ControllerParts, StartOutcome};
pub use endpoint::Endpoint;
pub use error::BridgeError;
pub use forwarder::{MidiForwarder, MidiMessage, MidiReceiver, PortPair};
pub use resolver::{HostResolver, ResolvedAddress};
pub use transport::{NativeTransport, SessionConfig};
