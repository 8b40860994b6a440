use crate::pattern::{Note, Pattern};

/// Point-in-time copy of engine state, taken atomically under the engine's
/// serialization lock. Never mutated after creation; hand it to any thread.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub is_playing: bool,
    pub bpm: f64,
    pub external_sync: bool,
    pub step_counters: Vec<usize>,
    pub current_track: usize,
    pub patterns: Vec<Pattern>,
}

impl StateSnapshot {
    pub fn track_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn pattern(&self, track: usize) -> Option<&Pattern> {
        self.patterns.get(track)
    }

    pub fn step(&self, track: usize) -> Option<usize> {
        self.step_counters.get(track).copied()
    }

    pub fn notes_at(&self, track: usize, step: usize) -> Vec<Note> {
        self.patterns
            .get(track)
            .map(|p| p.notes_at(step))
            .unwrap_or_default()
    }
}
