use crate::midi::{MidiError, MidiOutput, Result};
use log::{debug, error, info};
use midir::{MidiOutput as MidirBackend, MidiOutputConnection};
use std::collections::HashMap;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const CLOCK: u8 = 0xF8;
const START: u8 = 0xFA;
const STOP: u8 = 0xFC;

/// Real MIDI output via midir. Holds a default connection plus any number
/// of named per-port connections (tracks may route to different gear).
///
/// Sending with no matching connection is a silent no-op so the engine can
/// run without hardware attached.
pub struct MidirOutput {
    default: Option<MidiOutputConnection>,
    ports: HashMap<String, MidiOutputConnection>,
}

impl Default for MidirOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl MidirOutput {
    pub fn new() -> Self {
        MidirOutput {
            default: None,
            ports: HashMap::new(),
        }
    }

    pub fn list_ports() -> Result<Vec<String>> {
        let midi_out = MidirBackend::new("stepsyncrs-port-lister")
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
        let ports = midi_out.ports();
        Ok(ports
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect())
    }

    /// Opens the default connection: by name when given, otherwise the
    /// first available port.
    pub fn connect_default(&mut self, device_name: Option<&str>) -> Result<()> {
        let connection = Self::open_connection(device_name)?;
        self.default = Some(connection);
        Ok(())
    }

    /// Opens a named connection used by tracks routed to `port_name`.
    pub fn connect_port(&mut self, port_name: &str) -> Result<()> {
        let connection = Self::open_connection(Some(port_name))?;
        self.ports.insert(port_name.to_string(), connection);
        Ok(())
    }

    fn open_connection(device_name: Option<&str>) -> Result<MidiOutputConnection> {
        let midi_out = MidirBackend::new("stepsyncrs-out")
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;

        let out_ports = midi_out.ports();
        if out_ports.is_empty() {
            return Err(MidiError::ConnectionError(
                "no MIDI output ports available".to_string(),
            ));
        }

        let port = match device_name {
            Some(name) => out_ports
                .iter()
                .find(|p| midi_out.port_name(p).unwrap_or_default().contains(name))
                .ok_or_else(|| MidiError::PortNotFound(name.to_string()))?,
            None => &out_ports[0],
        };

        let port_name = midi_out
            .port_name(port)
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
        info!("Connecting to MIDI output port: {}", port_name);

        midi_out
            .connect(port, "stepsyncrs-out-conn")
            .map_err(|e| MidiError::ConnectionError(e.to_string()))
    }

    fn conn_for(&mut self, port: Option<&str>) -> Option<&mut MidiOutputConnection> {
        match port {
            // Unrouted port names fall back to the default output.
            Some(name) if self.ports.contains_key(name) => self.ports.get_mut(name),
            _ => self.default.as_mut(),
        }
    }

    fn send_to(&mut self, port: Option<&str>, bytes: &[u8]) -> Result<()> {
        match self.conn_for(port) {
            Some(conn) => conn
                .send(bytes)
                .map_err(|e| MidiError::SendError(e.to_string())),
            None => {
                debug!("no MIDI connection for port {:?}, dropping message", port);
                Ok(())
            }
        }
    }

    /// Realtime and transport bytes go to every open connection.
    fn broadcast(&mut self, byte: u8) -> Result<()> {
        let mut failure = None;
        let message = [byte];
        for conn in self.default.iter_mut().chain(self.ports.values_mut()) {
            if let Err(e) = conn.send(&message) {
                error!("MIDI broadcast of {:#04X} failed: {}", byte, e);
                failure = Some(MidiError::SendError(e.to_string()));
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn wire_channel(channel: u8) -> u8 {
        // 1-based engine channels map to 0-based wire nibbles.
        channel.saturating_sub(1) & 0x0F
    }
}

impl MidiOutput for MidirOutput {
    fn send_note_on(
        &mut self,
        channel: u8,
        pitch: u8,
        velocity: u8,
        port: Option<&str>,
    ) -> Result<()> {
        debug!(
            "Note On: ch={}, pitch={}, vel={}, port={:?}",
            channel, pitch, velocity, port
        );
        self.send_to(port, &[NOTE_ON | Self::wire_channel(channel), pitch, velocity])
    }

    fn send_note_off(&mut self, channel: u8, pitch: u8, port: Option<&str>) -> Result<()> {
        debug!("Note Off: ch={}, pitch={}, port={:?}", channel, pitch, port);
        self.send_to(port, &[NOTE_OFF | Self::wire_channel(channel), pitch, 0])
    }

    fn send_clock(&mut self) -> Result<()> {
        self.broadcast(CLOCK)
    }

    fn send_start(&mut self) -> Result<()> {
        self.broadcast(START)
    }

    fn send_stop(&mut self) -> Result<()> {
        self.broadcast(STOP)
    }
}
