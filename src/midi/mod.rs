//! MIDI transport collaborators for the sequencing engine.
//!
//! The engine itself never touches hardware; it talks to:
//! - [`MidiOutput`], the note/clock/transport emission trait
//! - [`MidirOutput`] for real devices via midir
//! - [`MockMidiOutput`], a recording implementation for tests
//! - [`bind_external_clock`], which feeds incoming MIDI realtime bytes to
//!   the engine's external clock handlers

mod input;
mod midir_output;
mod mock_output;
mod output;

pub use input::{bind_external_clock, list_input_ports, ExternalClockInput};
pub use midir_output::MidirOutput;
pub use mock_output::{MockMidiOutput, RecordedMessage};
pub use output::{MidiError, MidiOutput, Result, SharedMidiOutput};
