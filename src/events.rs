//! Engine event notification.
//!
//! The engine never holds a reference to an observer; observers subscribe
//! here. Delivery is synchronous on the publishing thread: topic-specific
//! subscribers fire first in subscription order, then wildcard subscribers
//! in subscription order. A panicking handler is caught and logged so the
//! remaining subscribers and the publisher are unaffected.

use log::error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// State changes published by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StepAdvanced {
        track: usize,
        step: usize,
    },
    NoteTriggered {
        track: usize,
        step: usize,
        pitch: u8,
        velocity: u8,
    },
    PlayStateChanged {
        is_playing: bool,
    },
    BpmChanged {
        bpm: f64,
    },
    PatternLengthChanged {
        track: usize,
        length: usize,
        old_length: usize,
    },
    TrackChanged {
        track: usize,
    },
    PatternModified {
        track: usize,
        step: usize,
    },
}

/// Discriminant of [`EngineEvent`], used for topic subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    StepAdvanced,
    NoteTriggered,
    PlayStateChanged,
    BpmChanged,
    PatternLengthChanged,
    TrackChanged,
    PatternModified,
}

impl EngineEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            EngineEvent::StepAdvanced { .. } => EventTopic::StepAdvanced,
            EngineEvent::NoteTriggered { .. } => EventTopic::NoteTriggered,
            EngineEvent::PlayStateChanged { .. } => EventTopic::PlayStateChanged,
            EngineEvent::BpmChanged { .. } => EventTopic::BpmChanged,
            EngineEvent::PatternLengthChanged { .. } => EventTopic::PatternLengthChanged,
            EngineEvent::TrackChanged { .. } => EventTopic::TrackChanged,
            EngineEvent::PatternModified { .. } => EventTopic::PatternModified,
        }
    }
}

type EventHandler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Handle returned by `subscribe`/`subscribe_all`, accepted by `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

struct Registration {
    id: u64,
    topic: Option<EventTopic>,
    handler: EventHandler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<Registration>,
}

/// Synchronous pub/sub bus for [`EngineEvent`]s.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: EventTopic, handler: F) -> Subscription
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.register(Some(topic), Arc::new(handler))
    }

    /// Subscribes to every topic. Wildcard handlers run after the
    /// topic-specific ones for each event.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    fn register(&self, topic: Option<EventTopic>, handler: EventHandler) -> Subscription {
        let mut registry = self.registry.lock().unwrap();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.push(Registration { id, topic, handler });
        Subscription(id)
    }

    /// Removes a registration. Unknown ids are a no-op.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut registry = self.registry.lock().unwrap();
        registry.subscribers.retain(|r| r.id != subscription.0);
    }

    pub fn publish(&self, event: &EngineEvent) {
        // Handlers are cloned out of the registry lock before running, so a
        // handler may publish or (un)subscribe without deadlocking.
        let matching: Vec<EventHandler> = {
            let registry = self.registry.lock().unwrap();
            let topic = event.topic();
            let specific = registry
                .subscribers
                .iter()
                .filter(|r| r.topic == Some(topic));
            let wildcard = registry.subscribers.iter().filter(|r| r.topic.is_none());
            specific
                .chain(wildcard)
                .map(|r| Arc::clone(&r.handler))
                .collect()
        };

        for handler in matching {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("event handler panicked while handling {:?}", event.topic());
            }
        }
    }
}
