//! The sequencing engine.
//!
//! [`Engine`] is the single owner of all mutable sequencing state. Commands
//! arrive from arbitrary threads and serialize through one mutex around
//! [`EngineCore`]; external clock pulses are timestamped at arrival and
//! handed through a channel to the scheduler thread, which is the only
//! driver of tick and note-off work.

pub mod clock;
mod core;

pub use self::core::{EngineCore, TrackConfig};
pub use clock::{ClockStats, StepTimer};

use crate::config::{EngineConfig, SCHEDULER_POLL};
use crate::events::{EngineEvent, EventBus};
use crate::midi::SharedMidiOutput;
use crate::state::StateSnapshot;
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Rejected command input. Validation always precedes mutation: a rejected
/// command leaves the engine unchanged and publishes nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    InvalidTrackIndex { track: usize, tracks: usize },
    InvalidStepIndex { step: usize, length: usize },
    InvalidPatternLength { length: usize },
    InvalidBpm { bpm: f64 },
    InvalidVelocity { velocity: u8 },
    InvalidPitch { pitch: u8 },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidTrackIndex { track, tracks } => {
                write!(f, "invalid track index {} (engine has {} tracks)", track, tracks)
            }
            EngineError::InvalidStepIndex { step, length } => {
                write!(f, "invalid step index {} (pattern length {})", step, length)
            }
            EngineError::InvalidPatternLength { length } => {
                write!(f, "invalid pattern length {} (allowed 1..=64)", length)
            }
            EngineError::InvalidBpm { bpm } => {
                write!(f, "invalid bpm {} (allowed 1..=300)", bpm)
            }
            EngineError::InvalidVelocity { velocity } => {
                write!(f, "invalid velocity {} (allowed 0..=127)", velocity)
            }
            EngineError::InvalidPitch { pitch } => {
                write!(f, "invalid pitch {} (allowed 0..=127)", pitch)
            }
        }
    }
}

impl Error for EngineError {}

/// External clock input kinds, matching the MIDI system-realtime bytes the
/// input collaborator listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseKind {
    Clock,
    Start,
    Stop,
}

struct PulseEvent {
    kind: PulseKind,
    at: Instant,
}

/// Thread-safe engine handle. Cheap to share behind an `Arc`; all methods
/// take `&self`.
pub struct Engine {
    core: Arc<Mutex<EngineCore>>,
    bus: Arc<EventBus>,
    pulse_tx: Sender<PulseEvent>,
    running: Arc<AtomicBool>,
    scheduler: Option<JoinHandle<()>>,
}

impl Engine {
    /// Builds the engine and spawns its scheduler thread. The thread lives
    /// until [`Engine::shutdown`] (or drop); playback state only gates what
    /// it does per iteration.
    pub fn new(config: &EngineConfig, output: SharedMidiOutput) -> Self {
        let core = Arc::new(Mutex::new(EngineCore::new(config, output)));
        let bus = Arc::new(EventBus::new());
        let (pulse_tx, pulse_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let scheduler = spawn_scheduler(
            Arc::clone(&core),
            Arc::clone(&bus),
            pulse_rx,
            Arc::clone(&running),
        );

        Engine {
            core,
            bus,
            pulse_tx,
            running,
            scheduler: Some(scheduler),
        }
    }

    /// Observers subscribe here; the engine holds no references to them.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ---- transport commands -------------------------------------------

    /// Starts playback. No-op when already playing.
    pub fn play(&self) {
        let events = {
            let mut core = self.core.lock().unwrap();
            core.begin_playback(Instant::now());
            core.drain_events()
        };
        self.publish_all(events);
    }

    /// Stops playback. Blocks until every active note has been retired;
    /// after this returns no MIDI output occurs for the stopped run.
    pub fn stop(&self) {
        let events = {
            let mut core = self.core.lock().unwrap();
            core.halt_playback();
            core.drain_events()
        };
        self.publish_all(events);
    }

    // ---- mutation commands --------------------------------------------

    pub fn set_bpm(&self, bpm: f64) -> Result<(), EngineError> {
        self.command(|core| core.set_bpm(bpm))
    }

    pub fn set_pattern_length(&self, track: usize, length: usize) -> Result<(), EngineError> {
        self.command(|core| core.set_pattern_length(track, length))
    }

    pub fn add_note(
        &self,
        track: usize,
        step: usize,
        pitch: u8,
        velocity: u8,
    ) -> Result<(), EngineError> {
        self.command(|core| core.add_note(track, step, pitch, velocity))
    }

    pub fn remove_note(&self, track: usize, step: usize, pitch: u8) -> Result<(), EngineError> {
        self.command(|core| core.remove_note(track, step, pitch))
    }

    pub fn select_track(&self, track: usize) -> Result<(), EngineError> {
        self.command(|core| core.select_track(track))
    }

    pub fn set_track_channel(&self, track: usize, channel: u8) -> Result<(), EngineError> {
        self.command(|core| core.set_track_channel(track, channel))
    }

    pub fn set_track_port(&self, track: usize, port: Option<String>) -> Result<(), EngineError> {
        self.command(|core| core.set_track_port(track, port))
    }

    // ---- external clock feed ------------------------------------------
    //
    // Called from the MIDI input callback context, never from user-facing
    // code. The pulse is timestamped here and crosses to the scheduler
    // thread through the channel, preserving single-writer discipline.

    pub fn handle_external_pulse(&self) {
        self.send_pulse(PulseKind::Clock);
    }

    pub fn handle_external_start(&self) {
        self.send_pulse(PulseKind::Start);
    }

    pub fn handle_external_stop(&self) {
        self.send_pulse(PulseKind::Stop);
    }

    fn send_pulse(&self, kind: PulseKind) {
        let pulse = PulseEvent {
            kind,
            at: Instant::now(),
        };
        if self.pulse_tx.send(pulse).is_err() {
            warn!("pulse {:?} dropped, scheduler is gone", kind);
        }
    }

    // ---- reads ---------------------------------------------------------

    /// Atomic, immutable copy of the current state.
    pub fn snapshot(&self) -> StateSnapshot {
        self.core.lock().unwrap().snapshot()
    }

    // ---- lifecycle -----------------------------------------------------

    /// Stops playback and joins the scheduler thread.
    pub fn shutdown(&mut self) {
        if self.scheduler.is_none() {
            return;
        }
        self.stop();
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.scheduler.take() {
            if handle.join().is_err() {
                error!("scheduler thread panicked during shutdown");
            }
        }
        info!("engine shut down");
    }

    fn command<F>(&self, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut EngineCore) -> Result<(), EngineError>,
    {
        let events = {
            let mut core = self.core.lock().unwrap();
            f(&mut core)?;
            core.drain_events()
        };
        self.publish_all(events);
        Ok(())
    }

    fn publish_all(&self, events: Vec<EngineEvent>) {
        for event in &events {
            self.bus.publish(event);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_scheduler(
    core: Arc<Mutex<EngineCore>>,
    bus: Arc<EventBus>,
    pulse_rx: Receiver<PulseEvent>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        info!("scheduler thread started");
        while running.load(Ordering::SeqCst) {
            let events = {
                let mut core = core.lock().unwrap();
                while let Ok(pulse) = pulse_rx.try_recv() {
                    core.handle_pulse(pulse.kind, pulse.at);
                }
                core.poll(Instant::now());
                core.drain_events()
            };
            for event in &events {
                bus.publish(event);
            }
            thread::sleep(SCHEDULER_POLL);
        }
        info!("scheduler thread stopped");
    })
}
