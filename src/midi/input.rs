use crate::engine::Engine;
use crate::midi::{MidiError, Result};
use log::{debug, info};
use midir::{Ignore, MidiInput, MidiInputConnection};
use std::sync::Arc;

const CLOCK: u8 = 0xF8;
const START: u8 = 0xFA;
const STOP: u8 = 0xFC;

/// Keeps the MIDI input connection alive for as long as the engine should
/// follow the external clock. Dropping it severs the feed.
pub struct ExternalClockInput {
    _connection: MidiInputConnection<()>,
}

pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("stepsyncrs-port-lister")
        .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
    let ports = midi_in.ports();
    Ok(ports
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect())
}

/// Binds the named MIDI input device and forwards its system-realtime
/// bytes to the engine's external clock handlers. Everything else on the
/// port is ignored.
pub fn bind_external_clock(engine: Arc<Engine>, device_name: &str) -> Result<ExternalClockInput> {
    let mut midi_in =
        MidiInput::new("stepsyncrs-in").map_err(|e| MidiError::ConnectionError(e.to_string()))?;
    midi_in.ignore(Ignore::None);

    let in_ports = midi_in.ports();
    let in_port = in_ports
        .iter()
        .find(|p| midi_in.port_name(p).unwrap_or_default().contains(device_name))
        .ok_or_else(|| MidiError::PortNotFound(device_name.to_string()))?;

    info!("Binding external clock input: {}", device_name);

    let connection = midi_in
        .connect(
            in_port,
            "stepsyncrs-clock-in",
            move |_timestamp, message, _| match message.first() {
                Some(&CLOCK) => engine.handle_external_pulse(),
                Some(&START) => {
                    debug!("external start byte received");
                    engine.handle_external_start();
                }
                Some(&STOP) => {
                    debug!("external stop byte received");
                    engine.handle_external_stop();
                }
                _ => {}
            },
            (),
        )
        .map_err(|e| MidiError::ConnectionError(e.to_string()))?;

    Ok(ExternalClockInput {
        _connection: connection,
    })
}
