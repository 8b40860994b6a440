//! Full-stack tests through the public `Engine` handle, with the scheduler
//! thread running. Wall-clock waits are condition polls with generous
//! timeouts, not bare sleeps.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use stepsyncrs::config::EngineConfig;
use stepsyncrs::midi::{MockMidiOutput, SharedMidiOutput};
use stepsyncrs::{Engine, EngineError, EngineEvent, EventTopic};

fn make_engine() -> (Engine, Arc<Mutex<MockMidiOutput>>) {
    let mock = Arc::new(Mutex::new(MockMidiOutput::new()));
    let output: SharedMidiOutput = mock.clone();
    (Engine::new(&EngineConfig::default(), output), mock)
}

fn collect_events(engine: &Engine) -> Arc<Mutex<Vec<EngineEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();
    engine.bus().subscribe_all(move |event| {
        log_clone.lock().unwrap().push(event.clone());
    });
    log
}

fn wait_until<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

const WAIT: Duration = Duration::from_secs(2);

#[test]
fn test_play_publishes_exactly_once() {
    let (engine, _mock) = make_engine();
    let events = collect_events(&engine);

    engine.play();
    engine.play();
    engine.stop();
    engine.stop();

    let events = events.lock().unwrap();
    let started = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::PlayStateChanged { is_playing: true }))
        .count();
    let stopped = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::PlayStateChanged { is_playing: false }))
        .count();
    assert_eq!(started, 1);
    assert_eq!(stopped, 1);
}

#[test]
fn test_internal_clock_triggers_notes() {
    let (engine, mock) = make_engine();
    let events = collect_events(&engine);

    engine.add_note(0, 0, 60, 100).unwrap();
    engine.set_pattern_length(0, 1).unwrap();
    engine.play();

    assert!(
        wait_until(|| mock.lock().unwrap().note_ons().len() >= 2, WAIT),
        "internal clock should retrigger the one-step pattern"
    );
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, EngineEvent::NoteTriggered { track: 0, pitch: 60, .. })));
}

#[test]
fn test_stop_flushes_and_goes_silent() {
    let (engine, mock) = make_engine();

    engine.set_pattern_length(0, 1).unwrap();
    engine.add_note(0, 0, 60, 100).unwrap();
    engine.play();
    assert!(wait_until(
        || mock.lock().unwrap().note_ons().len() >= 2,
        WAIT
    ));

    engine.stop();

    // Every note-on has a matching note-off once stop() returns, and the
    // output stays silent afterwards.
    let sent_at_stop = {
        let out = mock.lock().unwrap();
        assert_eq!(out.note_ons().len(), out.note_offs().len());
        out.sent().len()
    };
    thread::sleep(Duration::from_millis(100));
    assert_eq!(mock.lock().unwrap().sent().len(), sent_at_stop);

    assert!(!engine.snapshot().is_playing);
}

#[test]
fn test_external_clock_path() {
    let (engine, _mock) = make_engine();
    let events = collect_events(&engine);

    engine.add_note(0, 0, 60, 100).unwrap();
    engine.handle_external_start();
    assert!(
        wait_until(
            || {
                let s = engine.snapshot();
                s.is_playing && s.external_sync
            },
            WAIT
        ),
        "external start should begin externally synced playback"
    );

    for _ in 0..6 {
        engine.handle_external_pulse();
    }
    assert!(
        wait_until(
            || {
                events
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|e| matches!(e, EngineEvent::NoteTriggered { track: 0, step: 0, .. }))
            },
            WAIT
        ),
        "six pulses should advance one step"
    );

    engine.handle_external_stop();
    assert!(wait_until(
        || {
            let s = engine.snapshot();
            !s.is_playing && !s.external_sync
        },
        WAIT
    ));
}

#[test]
fn test_snapshot_reflects_commands() {
    let (engine, _mock) = make_engine();

    engine.set_bpm(140.0).unwrap();
    engine.set_pattern_length(2, 12).unwrap();
    engine.add_note(2, 3, 64, 90).unwrap();
    engine.select_track(2).unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.bpm, 140.0);
    assert_eq!(snapshot.current_track, 2);
    assert_eq!(snapshot.patterns[2].length(), 12);
    assert_eq!(
        snapshot.notes_at(2, 3),
        vec![stepsyncrs::Note {
            step: 3,
            pitch: 64,
            velocity: 90
        }]
    );
    assert!(!snapshot.is_playing);
}

#[test]
fn test_rejected_commands_return_errors() {
    let (engine, _mock) = make_engine();

    assert!(matches!(
        engine.set_bpm(500.0),
        Err(EngineError::InvalidBpm { .. })
    ));
    assert!(matches!(
        engine.add_note(20, 0, 60, 100),
        Err(EngineError::InvalidTrackIndex { .. })
    ));
    assert!(matches!(
        engine.set_pattern_length(0, 65),
        Err(EngineError::InvalidPatternLength { .. })
    ));
    assert!(matches!(
        engine.select_track(8),
        Err(EngineError::InvalidTrackIndex { .. })
    ));
}

#[test]
fn test_pattern_commands_publish() {
    let (engine, _mock) = make_engine();
    let log = Arc::new(Mutex::new(Vec::new()));

    let log_clone = log.clone();
    engine
        .bus()
        .subscribe(EventTopic::PatternLengthChanged, move |event| {
            log_clone.lock().unwrap().push(event.clone());
        });
    let log_clone = log.clone();
    engine
        .bus()
        .subscribe(EventTopic::PatternModified, move |event| {
            log_clone.lock().unwrap().push(event.clone());
        });

    engine.set_pattern_length(1, 8).unwrap();
    engine.add_note(1, 4, 62, 100).unwrap();
    engine.remove_note(1, 4, 62).unwrap();

    let events = log.lock().unwrap();
    assert_eq!(
        events[0],
        EngineEvent::PatternLengthChanged {
            track: 1,
            length: 8,
            old_length: 16
        }
    );
    assert_eq!(events[1], EngineEvent::PatternModified { track: 1, step: 4 });
    assert_eq!(events[2], EngineEvent::PatternModified { track: 1, step: 4 });
}

#[test]
fn test_shutdown_is_clean() {
    let (mut engine, mock) = make_engine();

    engine.set_pattern_length(0, 1).unwrap();
    engine.add_note(0, 0, 60, 100).unwrap();
    engine.play();
    assert!(wait_until(
        || !mock.lock().unwrap().note_ons().is_empty(),
        WAIT
    ));

    engine.shutdown();

    let out = mock.lock().unwrap();
    assert_eq!(out.note_ons().len(), out.note_offs().len());

    // Pulses after shutdown are dropped without panicking.
    drop(out);
    engine.handle_external_pulse();
}
