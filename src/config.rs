// config.rs

use std::time::Duration;

/// MIDI clock resolution: pulses per quarter note.
pub const PULSES_PER_QUARTER: usize = 24;

/// Pulses per sequencer step (sixteenth notes at 24 PPQN).
pub const PULSES_PER_STEP: u64 = 6;

/// Steps per quarter note (sixteenth-note resolution).
pub const STEPS_PER_QUARTER: f64 = 4.0;

/// Fraction of a step a triggered note rings before its note-off.
pub const NOTE_GATE: f64 = 0.9;

pub const MIN_BPM: f64 = 1.0;
pub const MAX_BPM: f64 = 300.0;

pub const MIN_PATTERN_LENGTH: usize = 1;
pub const MAX_PATTERN_LENGTH: usize = 64;

pub const MIN_CHANNEL: u8 = 1;
pub const MAX_CHANNEL: u8 = 16;

/// Scheduler loop granularity. Bounds both trigger latency and how far a
/// note-off can land past its deadline.
pub const SCHEDULER_POLL: Duration = Duration::from_millis(2);

/// Construction-time shape of the engine. Track slots are fixed for the
/// engine's lifetime; everything else is mutable through commands.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tracks: usize,
    pub bpm: f64,
    pub pattern_length: usize,
    pub channel: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tracks: 8,
            bpm: 120.0,
            pattern_length: 16,
            channel: 1,
        }
    }
}
