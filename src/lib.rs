//! Multitrack step-sequencing engine.
//!
//! The core pieces are:
//! - [`Engine`], which owns all sequencing state, serializes commands, and
//!   runs the scheduling loop on its own thread
//! - [`Pattern`] per track, with independent lengths for polyrhythms
//! - [`EventBus`] for synchronous, decoupled state-change notification
//! - the [`midi`] module for the output transport and external clock input
//! - [`StateSnapshot`] for race-free reads from any thread
//!
//! Two clock sources drive step advancement: a free-running internal timer
//! at `60 / (bpm * 4)` seconds per step, or an external 24 PPQN MIDI pulse
//! stream with tempo re-derived from pulse intervals.

pub mod cli;
pub mod config;
pub mod engine;
pub mod events;
pub mod logging;
pub mod midi;
pub mod pattern;
pub mod state;
pub mod ui;

pub use config::EngineConfig;
pub use engine::{Engine, EngineError, PulseKind};
pub use events::{EngineEvent, EventBus, EventTopic, Subscription};
pub use pattern::{Note, Pattern};
pub use state::StateSnapshot;
