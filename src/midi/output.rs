use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Transport faults. Connection problems surface at setup; send problems
/// are logged and swallowed inside the engine so the scheduling loop never
/// stalls on I/O.
#[derive(Debug)]
pub enum MidiError {
    ConnectionError(String),
    SendError(String),
    PortNotFound(String),
}

impl fmt::Display for MidiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiError::ConnectionError(msg) => write!(f, "MIDI connection error: {}", msg),
            MidiError::SendError(msg) => write!(f, "MIDI send error: {}", msg),
            MidiError::PortNotFound(name) => write!(f, "MIDI port not found: {}", name),
        }
    }
}

impl Error for MidiError {}

pub type Result<T> = std::result::Result<T, MidiError>;

/// Output surface the engine emits through. `port` selects a named
/// connection; `None` addresses the default one. Channels are 1-based as on
/// the front panel of the receiving gear.
pub trait MidiOutput: Send {
    fn send_note_on(&mut self, channel: u8, pitch: u8, velocity: u8, port: Option<&str>)
        -> Result<()>;

    fn send_note_off(&mut self, channel: u8, pitch: u8, port: Option<&str>) -> Result<()>;

    fn send_clock(&mut self) -> Result<()>;

    fn send_start(&mut self) -> Result<()>;

    fn send_stop(&mut self) -> Result<()>;
}

/// How the engine holds its output: shareable with the constructing caller
/// (tests keep a handle to inspect the mock).
pub type SharedMidiOutput = Arc<Mutex<dyn MidiOutput>>;
