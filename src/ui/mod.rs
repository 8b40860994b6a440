//! Terminal state display.
//!
//! A read-only observer of the engine: it polls snapshots and renders one
//! progress bar per track plus a transport spinner. Nothing in here mutates
//! sequencing state.

mod inspector;

pub use inspector::run_state_inspector;
