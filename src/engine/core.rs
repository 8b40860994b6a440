use crate::config::{
    EngineConfig, MAX_BPM, MAX_CHANNEL, MIN_BPM, MIN_CHANNEL, NOTE_GATE, PULSES_PER_STEP,
    STEPS_PER_QUARTER,
};
use crate::engine::clock::{ClockStats, StepTimer};
use crate::engine::{EngineError, PulseKind};
use crate::events::EngineEvent;
use crate::midi::SharedMidiOutput;
use crate::pattern::Pattern;
use crate::state::StateSnapshot;
use log::{debug, error, info, trace};
use std::time::{Duration, Instant};

/// Per-track routing. Slots are created at engine construction and live for
/// its lifetime.
#[derive(Debug, Clone)]
pub struct TrackConfig {
    pub channel: u8,
    pub port: Option<String>,
}

/// A sounding note awaiting its note-off. At most one entry per
/// `(channel, pitch, port)`; a retrigger retires the prior instance first.
#[derive(Debug, Clone)]
struct ActiveNote {
    channel: u8,
    pitch: u8,
    port: Option<String>,
    off_at: Instant,
}

/// Single-writer sequencing state. The engine handle serializes every
/// caller through one mutex around this struct; all time-dependent entry
/// points take an explicit `Instant` so tests can drive them synthetically.
///
/// Mutations queue their domain events in `pending`; whoever holds the lock
/// drains and publishes them after releasing it, keeping observers out of
/// the critical section.
pub struct EngineCore {
    patterns: Vec<Pattern>,
    tracks: Vec<TrackConfig>,
    step_counters: Vec<usize>,
    active_notes: Vec<ActiveNote>,
    bpm: f64,
    is_playing: bool,
    external_sync: bool,
    current_track: usize,
    timer: StepTimer,
    stats: ClockStats,
    pulse_count: u64,
    output: SharedMidiOutput,
    pending: Vec<EngineEvent>,
}

impl EngineCore {
    pub fn new(config: &EngineConfig, output: SharedMidiOutput) -> Self {
        let tracks = config.tracks.max(1);
        EngineCore {
            patterns: (0..tracks)
                .map(|_| Pattern::new(config.pattern_length))
                .collect(),
            tracks: (0..tracks)
                .map(|_| TrackConfig {
                    channel: config.channel.clamp(MIN_CHANNEL, MAX_CHANNEL),
                    port: None,
                })
                .collect(),
            step_counters: vec![0; tracks],
            active_notes: Vec::new(),
            bpm: config.bpm.clamp(MIN_BPM, MAX_BPM),
            is_playing: false,
            external_sync: false,
            current_track: 0,
            timer: StepTimer::new(),
            stats: ClockStats::new(),
            pulse_count: 0,
            output,
            pending: Vec::new(),
        }
    }

    pub fn track_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn external_sync(&self) -> bool {
        self.external_sync
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn step_counters(&self) -> &[usize] {
        &self.step_counters
    }

    pub fn active_note_count(&self) -> usize {
        self.active_notes.len()
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.pending)
    }

    fn step_duration(&self) -> Duration {
        Duration::from_secs_f64(60.0 / (self.bpm * STEPS_PER_QUARTER))
    }

    fn ensure_track(&self, track: usize) -> Result<(), EngineError> {
        if track >= self.tracks.len() {
            return Err(EngineError::InvalidTrackIndex {
                track,
                tracks: self.tracks.len(),
            });
        }
        Ok(())
    }

    // ---- transport ----------------------------------------------------

    /// Play-equivalent shared by the `play()` command and the external
    /// start pulse. Returns whether a transition happened.
    pub fn begin_playback(&mut self, now: Instant) -> bool {
        if self.is_playing {
            trace!("play ignored, already playing");
            return false;
        }
        self.is_playing = true;
        if self.external_sync {
            self.timer.disarm();
        } else {
            self.timer.arm(now);
        }
        self.emit_start();
        self.pending
            .push(EngineEvent::PlayStateChanged { is_playing: true });
        info!(
            "playback started ({})",
            if self.external_sync {
                "external sync"
            } else {
                "internal clock"
            }
        );
        true
    }

    /// Stop-equivalent. Retires every active note before returning, so no
    /// note is left sounding once the caller's lock is released.
    pub fn halt_playback(&mut self) -> bool {
        if !self.is_playing {
            trace!("stop ignored, not playing");
            return false;
        }
        self.flush_active();
        self.timer.disarm();
        self.is_playing = false;
        self.emit_stop();
        self.pending
            .push(EngineEvent::PlayStateChanged { is_playing: false });
        info!("playback stopped, all notes retired");
        true
    }

    // ---- commands ------------------------------------------------------

    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), EngineError> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(EngineError::InvalidBpm { bpm });
        }
        self.bpm = bpm;
        self.pending.push(EngineEvent::BpmChanged { bpm });
        Ok(())
    }

    pub fn set_pattern_length(&mut self, track: usize, length: usize) -> Result<(), EngineError> {
        self.ensure_track(track)?;
        let old_length = self.patterns[track].length();
        self.patterns[track].set_length(length)?;
        if self.step_counters[track] >= length {
            self.step_counters[track] %= length;
        }
        self.pending.push(EngineEvent::PatternLengthChanged {
            track,
            length,
            old_length,
        });
        Ok(())
    }

    pub fn add_note(
        &mut self,
        track: usize,
        step: usize,
        pitch: u8,
        velocity: u8,
    ) -> Result<(), EngineError> {
        self.ensure_track(track)?;
        self.patterns[track].add_note(step, pitch, velocity)?;
        self.pending.push(EngineEvent::PatternModified { track, step });
        Ok(())
    }

    pub fn remove_note(&mut self, track: usize, step: usize, pitch: u8) -> Result<(), EngineError> {
        self.ensure_track(track)?;
        self.patterns[track].remove_note(step, pitch);
        self.pending.push(EngineEvent::PatternModified { track, step });
        Ok(())
    }

    pub fn select_track(&mut self, track: usize) -> Result<(), EngineError> {
        self.ensure_track(track)?;
        self.current_track = track;
        self.pending.push(EngineEvent::TrackChanged { track });
        Ok(())
    }

    pub fn set_track_channel(&mut self, track: usize, channel: u8) -> Result<(), EngineError> {
        self.ensure_track(track)?;
        self.tracks[track].channel = channel.clamp(MIN_CHANNEL, MAX_CHANNEL);
        Ok(())
    }

    pub fn set_track_port(&mut self, track: usize, port: Option<String>) -> Result<(), EngineError> {
        self.ensure_track(track)?;
        self.tracks[track].port = port;
        Ok(())
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            is_playing: self.is_playing,
            bpm: self.bpm,
            external_sync: self.external_sync,
            step_counters: self.step_counters.clone(),
            current_track: self.current_track,
            patterns: self.patterns.clone(),
        }
    }

    // ---- scheduling ----------------------------------------------------

    /// One scheduler iteration at `now`: retire due note-offs, then fire
    /// any internally-clocked steps that have come due.
    pub fn poll(&mut self, now: Instant) {
        self.sweep_expired(now);
        if self.is_playing && !self.external_sync {
            let interval = self.step_duration();
            let due = self.timer.due_steps(now, interval);
            for _ in 0..due {
                self.trigger_step(now);
            }
        }
    }

    /// External clock input, timestamped at arrival in the producer
    /// context so queue drain jitter cannot skew tempo derivation.
    pub fn handle_pulse(&mut self, kind: PulseKind, at: Instant) {
        match kind {
            PulseKind::Clock => {
                self.emit_clock();
                if let Some(derived) = self.stats.record(at) {
                    if (derived - self.bpm).abs() > 0.1 {
                        info!("external tempo update: {} -> {} BPM", self.bpm, derived);
                        self.bpm = derived;
                        self.pending.push(EngineEvent::BpmChanged { bpm: derived });
                    }
                }
                self.pulse_count += 1;
                if self.external_sync && self.is_playing && self.pulse_count % PULSES_PER_STEP == 0
                {
                    self.trigger_step(at);
                }
            }
            PulseKind::Start => {
                info!("external start received, switching to external sync");
                self.pulse_count = 0;
                self.stats.reset();
                for counter in &mut self.step_counters {
                    *counter = 0;
                }
                self.external_sync = true;
                self.begin_playback(at);
            }
            PulseKind::Stop => {
                info!("external stop received, switching to internal control");
                self.external_sync = false;
                self.halt_playback();
            }
        }
    }

    /// One global tick: trigger the current step of every track, then
    /// advance each counter modulo its own pattern length. Tracks with
    /// different lengths drift in and out of phase (polyrhythms) and
    /// realign after lcm of the lengths.
    ///
    /// Event order per tick: NoteTriggered for all tracks ascending, then
    /// StepAdvanced for all tracks ascending.
    fn trigger_step(&mut self, now: Instant) {
        let gate = self.step_duration().mul_f64(NOTE_GATE);
        let track_count = self.patterns.len();

        for track in 0..track_count {
            let step = self.step_counters[track];
            let notes = self.patterns[track].notes_at(step);
            if notes.is_empty() {
                continue;
            }
            let channel = self.tracks[track].channel;
            let port = self.tracks[track].port.clone();
            for note in notes {
                debug!(
                    "track {} step {}: note {} vel {} on channel {}",
                    track, step, note.pitch, note.velocity, channel
                );
                self.start_note(channel, note.pitch, note.velocity, port.as_deref(), now + gate);
                self.pending.push(EngineEvent::NoteTriggered {
                    track,
                    step,
                    pitch: note.pitch,
                    velocity: note.velocity,
                });
            }
        }

        for track in 0..track_count {
            let length = self.patterns[track].length();
            self.step_counters[track] = (self.step_counters[track] + 1) % length;
            self.pending.push(EngineEvent::StepAdvanced {
                track,
                step: self.step_counters[track],
            });
        }
    }

    fn start_note(
        &mut self,
        channel: u8,
        pitch: u8,
        velocity: u8,
        port: Option<&str>,
        off_at: Instant,
    ) {
        if let Some(pos) = self
            .active_notes
            .iter()
            .position(|n| n.channel == channel && n.pitch == pitch && n.port.as_deref() == port)
        {
            let prior = self.active_notes.remove(pos);
            self.emit_note_off(prior.channel, prior.pitch, prior.port.as_deref());
        }
        self.emit_note_on(channel, pitch, velocity, port);
        self.active_notes.push(ActiveNote {
            channel,
            pitch,
            port: port.map(str::to_string),
            off_at,
        });
    }

    fn sweep_expired(&mut self, now: Instant) {
        let mut due = Vec::new();
        self.active_notes.retain(|n| {
            if n.off_at <= now {
                due.push((n.channel, n.pitch, n.port.clone()));
                false
            } else {
                true
            }
        });
        for (channel, pitch, port) in due {
            self.emit_note_off(channel, pitch, port.as_deref());
        }
    }

    fn flush_active(&mut self) {
        for note in std::mem::take(&mut self.active_notes) {
            self.emit_note_off(note.channel, note.pitch, note.port.as_deref());
        }
    }

    // ---- output --------------------------------------------------------
    //
    // Transport faults are logged, never propagated: the scheduling loop
    // must outlive a flaky device.

    fn emit_note_on(&self, channel: u8, pitch: u8, velocity: u8, port: Option<&str>) {
        if let Ok(mut out) = self.output.lock() {
            if let Err(e) = out.send_note_on(channel, pitch, velocity, port) {
                error!("note-on send failed: {}", e);
            }
        }
    }

    fn emit_note_off(&self, channel: u8, pitch: u8, port: Option<&str>) {
        if let Ok(mut out) = self.output.lock() {
            if let Err(e) = out.send_note_off(channel, pitch, port) {
                error!("note-off send failed: {}", e);
            }
        }
    }

    fn emit_clock(&self) {
        if let Ok(mut out) = self.output.lock() {
            if let Err(e) = out.send_clock() {
                error!("clock send failed: {}", e);
            }
        }
    }

    fn emit_start(&self) {
        if let Ok(mut out) = self.output.lock() {
            if let Err(e) = out.send_start() {
                error!("start send failed: {}", e);
            }
        }
    }

    fn emit_stop(&self) {
        if let Ok(mut out) = self.output.lock() {
            if let Err(e) = out.send_stop() {
                error!("stop send failed: {}", e);
            }
        }
    }
}
