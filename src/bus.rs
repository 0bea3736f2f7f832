//! Event bus - broadcast bridge between the scheduler and renderers
//!
//! Fired events, playback transitions and derived signals are republished
//! as named messages. Dispatch is synchronous fire-and-forget in
//! registration order; there is no replay, so a late subscriber simply
//! misses earlier messages. The bus also caches the latest band snapshot
//! for consumers that poll instead of subscribing.

use crate::bands::{FrequencyBands, RawAnalysis};
use crate::pattern::PatternEvent;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::error;

/// Wire names for the three message kinds.
pub const EVENT_FIRED: &str = "event-fired";
pub const PLAYBACK_CHANGED: &str = "playback-changed";
pub const SIGNAL_UPDATED: &str = "signal-updated";

/// A broadcast message and its payload.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// A pattern event crossed its scheduled position.
    EventFired {
        event: PatternEvent,
        /// Deadline the renderers should honor, in time-source ms.
        fired_at_ms: f64,
        /// Event length in ms.
        duration_ms: f64,
        cycle_position: f64,
    },
    /// Playback started or stopped.
    PlaybackChanged {
        is_playing: bool,
        cycle_position: f64,
    },
    /// A fresh signal derivation tick.
    SignalUpdated {
        raw: Option<RawAnalysis>,
        bands: FrequencyBands,
    },
}

impl BusMessage {
    pub fn name(&self) -> &'static str {
        match self {
            BusMessage::EventFired { .. } => EVENT_FIRED,
            BusMessage::PlaybackChanged { .. } => PLAYBACK_CHANGED,
            BusMessage::SignalUpdated { .. } => SIGNAL_UPDATED,
        }
    }
}

/// Handle returned by `subscribe`, used to detach later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

type Callback = Arc<dyn Fn(&BusMessage) + Send + Sync>;

/// Publish/subscribe hub shared by the bridge and all renderers.
pub struct EventBus {
    subscribers: Mutex<Vec<(SubscriberId, Callback)>>,
    next_id: AtomicU64,
    last_bands: RwLock<Option<FrequencyBands>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            last_bands: RwLock::new(None),
        }
    }

    /// Register a callback. Callbacks run synchronously on the publishing
    /// thread and must not block.
    pub fn subscribe(&self, callback: impl Fn(&BusMessage) + Send + Sync + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subs = self.subscribers.lock().unwrap();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Broadcast to every subscriber in registration order.
    ///
    /// Publishing with no subscribers silently succeeds. A panicking
    /// subscriber is logged and skipped; it cannot stall the others or
    /// the tick that published.
    pub fn publish(&self, message: BusMessage) {
        if let BusMessage::SignalUpdated { bands, .. } = &message {
            *self.last_bands.write().unwrap() = Some(*bands);
        }

        // snapshot so callbacks may subscribe/unsubscribe mid-dispatch
        let subs: Vec<(SubscriberId, Callback)> =
            self.subscribers.lock().unwrap().clone();

        for (id, callback) in subs {
            if catch_unwind(AssertUnwindSafe(|| callback(&message))).is_err() {
                error!(
                    "subscriber {:?} panicked handling '{}' message",
                    id,
                    message.name()
                );
            }
        }
    }

    /// Cache bands without broadcasting, for poll-only configurations.
    pub fn store_bands(&self, bands: FrequencyBands) {
        *self.last_bands.write().unwrap() = Some(bands);
    }

    /// Most recently derived bands, if any derivation has run yet.
    pub fn latest_bands(&self) -> Option<FrequencyBands> {
        *self.last_bands.read().unwrap()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
