//! Virtual device backed by system MIDI ports (midir)
//!
//! The device is a pair of ports exposed by the OS or a virtual cable driver
//! (loopMIDI, IAC, ALSA virmidi) whose name contains [`super::DEVICE_NAME`].

use anyhow::Result;
use colored::*;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::{DeviceHandle, DeviceRegistry, DEVICE_NAME};
use crate::error::BridgeError;
use crate::forwarder::{MidiMessage, MidiReceiver, PortPair};

/// Opens the virtual device through midir
pub struct MidirRegistry {
    client_name: String,
}

impl MidirRegistry {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }
}

impl Default for MidirRegistry {
    fn default() -> Self {
        Self::new("Nakama")
    }
}

impl DeviceRegistry for MidirRegistry {
    fn attach(&self, name: &str, ports: &PortPair) -> Result<DeviceHandle, BridgeError> {
        let mut midi_in = MidiInput::new(&format!("{}-In", self.client_name))
            .map_err(|e| BridgeError::DeviceUnavailable(format!("MIDI input unavailable: {}", e)))?;
        // SysEx, timing and active sensing all go to the network
        midi_in.ignore(Ignore::None);

        let (in_port, in_name) = find_input_port(&midi_in, name).ok_or_else(|| {
            BridgeError::DeviceUnavailable(format!("input port '{}' not found", name))
        })?;

        let midi_out = MidiOutput::new(&format!("{}-Out", self.client_name))
            .map_err(|e| BridgeError::DeviceUnavailable(format!("MIDI output unavailable: {}", e)))?;

        let (out_port, out_name) = find_output_port(&midi_out, name).ok_or_else(|| {
            BridgeError::DeviceUnavailable(format!("output port '{}' not found", name))
        })?;

        let output = midi_out.connect(&out_port, "nakama-net-to-app").map_err(|e| {
            BridgeError::DeviceUnavailable(format!("cannot open output '{}': {}", out_name, e))
        })?;

        let app_to_net = Arc::clone(&ports.app_to_net);
        let input = midi_in
            .connect(
                &in_port,
                "nakama-app-to-net",
                move |stamp_us, data, _| {
                    app_to_net.relay(&MidiMessage::from_bytes(data, stamp_us.saturating_mul(1_000)));
                },
                (),
            )
            .map_err(|e| {
                BridgeError::DeviceUnavailable(format!("cannot open input '{}': {}", in_name, e))
            })?;

        ports.net_to_app.set_output(Arc::new(MidirSink::new(output)));

        info!("🎹 MIDI device attached (in: '{}', out: '{}')", in_name, out_name);
        Ok(DeviceHandle::new(
            name,
            ports.clone(),
            Box::new(InputGuard { _input: input }),
        ))
    }
}

/// Keeps the input connection (and its callback) alive
struct InputGuard {
    _input: MidiInputConnection<()>,
}

// The connection is only held, never used, after it is opened
unsafe impl Send for InputGuard {}

/// Destination that writes into the port the host application reads
pub struct MidirSink {
    output: Mutex<MidiOutputConnection>,
}

impl MidirSink {
    pub fn new(output: MidiOutputConnection) -> Self {
        Self {
            output: Mutex::new(output),
        }
    }
}

impl MidiReceiver for MidirSink {
    fn send(&self, msg: &MidiMessage<'_>) {
        // Only relay threads take this lock; a failed write drops the message
        let _ = self.output.lock().send(msg.bytes());
    }
}

/// Find an input port by case-insensitive substring match
fn find_input_port(midi_in: &MidiInput, pattern: &str) -> Option<(midir::MidiInputPort, String)> {
    let pattern = pattern.to_lowercase();
    for port in midi_in.ports() {
        if let Ok(name) = midi_in.port_name(&port) {
            if name.to_lowercase().contains(&pattern) {
                debug!("Found input port '{}' matching '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

/// Find an output port by case-insensitive substring match
fn find_output_port(
    midi_out: &MidiOutput,
    pattern: &str,
) -> Option<(midir::MidiOutputPort, String)> {
    let pattern = pattern.to_lowercase();
    for port in midi_out.ports() {
        if let Ok(name) = midi_out.port_name(&port) {
            if name.to_lowercase().contains(&pattern) {
                debug!("Found output port '{}' matching '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

/// Names of every MIDI input and output port
pub fn discover_ports() -> Result<(Vec<String>, Vec<String>)> {
    let midi_in = MidiInput::new("Nakama-Discovery")?;
    let inputs = midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect();

    let midi_out = MidiOutput::new("Nakama-Discovery")?;
    let outputs = midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect();

    Ok((inputs, outputs))
}

/// Print discovered ports, marking the ones that belong to the device
pub fn print_ports() -> Result<()> {
    let (inputs, outputs) = discover_ports()?;
    let needle = DEVICE_NAME.to_lowercase();

    let print = |title: &str, ports: &[String]| {
        println!("\n{}", format!("=== MIDI {} Ports ===", title).bold().cyan());
        if ports.is_empty() {
            println!("  {}", "(none)".dimmed());
        }
        for (i, name) in ports.iter().enumerate() {
            if name.to_lowercase().contains(&needle) {
                println!("  {}: {} {}", i, name.green(), "[DEVICE]".yellow());
            } else {
                println!("  {}: {}", i, name);
            }
        }
    };

    print("Input", &inputs);
    print("Output", &outputs);
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_is_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MidirSink>();
    }

    #[test]
    fn test_port_discovery() {
        // Ensures discovery doesn't panic, with or without a MIDI backend
        let _ = discover_ports();
    }

    #[test]
    fn test_missing_device_is_unavailable() {
        let registry = MidirRegistry::default();
        let ports = PortPair::new();
        let result = registry.attach("nakama-test-no-such-device-7f3a", &ports);
        assert!(matches!(result, Err(BridgeError::DeviceUnavailable(_))));
        assert!(!ports.net_to_app.is_bound());
    }
}
