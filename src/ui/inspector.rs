use crate::engine::Engine;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

fn create_track_progress(multi_progress: &MultiProgress, track: usize, length: u64) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new(length));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan}] {pos}/{len}")
            .unwrap()
            .progress_chars("⣀⣤⣦⣶⣷⣿ "),
    );
    pb.set_prefix(format!("Track {}", track + 1));
    pb
}

fn create_transport_spinner(multi_progress: &MultiProgress) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new_spinner());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap(),
    );
    pb.set_prefix("Transport");
    pb
}

/// Renders live engine state until the process exits. Spawn it on its own
/// thread next to the engine.
pub fn run_state_inspector(engine: Arc<Engine>) {
    let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());

    let snapshot = engine.snapshot();
    let track_bars: Vec<ProgressBar> = snapshot
        .patterns
        .iter()
        .enumerate()
        .map(|(track, pattern)| {
            create_track_progress(&multi_progress, track, pattern.length() as u64)
        })
        .collect();
    let transport_pb = create_transport_spinner(&multi_progress);

    loop {
        thread::sleep(REFRESH_INTERVAL);
        let snapshot = engine.snapshot();

        for (track, pb) in track_bars.iter().enumerate() {
            if let Some(pattern) = snapshot.pattern(track) {
                pb.set_length(pattern.length() as u64);
            }
            if let Some(step) = snapshot.step(track) {
                pb.set_position(step as u64);
            }
        }

        transport_pb.set_message(format!(
            "BPM: {:.1}, Clock: {}, {}",
            snapshot.bpm,
            if snapshot.external_sync {
                "external"
            } else {
                "internal"
            },
            if snapshot.is_playing {
                "playing"
            } else {
                "stopped"
            }
        ));
        transport_pb.tick();
    }
}
