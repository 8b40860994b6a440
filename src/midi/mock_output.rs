use crate::midi::{MidiOutput, Result};

/// Everything a [`MockMidiOutput`] has been asked to emit, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedMessage {
    NoteOn {
        channel: u8,
        pitch: u8,
        velocity: u8,
        port: Option<String>,
    },
    NoteOff {
        channel: u8,
        pitch: u8,
        port: Option<String>,
    },
    Clock,
    Start,
    Stop,
}

/// Recording output for tests: every call succeeds and is appended to an
/// inspectable log.
#[derive(Debug, Default)]
pub struct MockMidiOutput {
    sent: Vec<RecordedMessage>,
}

impl MockMidiOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[RecordedMessage] {
        &self.sent
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }

    pub fn note_ons(&self) -> Vec<&RecordedMessage> {
        self.sent
            .iter()
            .filter(|m| matches!(m, RecordedMessage::NoteOn { .. }))
            .collect()
    }

    pub fn note_offs(&self) -> Vec<&RecordedMessage> {
        self.sent
            .iter()
            .filter(|m| matches!(m, RecordedMessage::NoteOff { .. }))
            .collect()
    }
}

impl MidiOutput for MockMidiOutput {
    fn send_note_on(
        &mut self,
        channel: u8,
        pitch: u8,
        velocity: u8,
        port: Option<&str>,
    ) -> Result<()> {
        self.sent.push(RecordedMessage::NoteOn {
            channel,
            pitch,
            velocity,
            port: port.map(str::to_string),
        });
        Ok(())
    }

    fn send_note_off(&mut self, channel: u8, pitch: u8, port: Option<&str>) -> Result<()> {
        self.sent.push(RecordedMessage::NoteOff {
            channel,
            pitch,
            port: port.map(str::to_string),
        });
        Ok(())
    }

    fn send_clock(&mut self) -> Result<()> {
        self.sent.push(RecordedMessage::Clock);
        Ok(())
    }

    fn send_start(&mut self) -> Result<()> {
        self.sent.push(RecordedMessage::Start);
        Ok(())
    }

    fn send_stop(&mut self) -> Result<()> {
        self.sent.push(RecordedMessage::Stop);
        Ok(())
    }
}
