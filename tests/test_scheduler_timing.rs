//! End-to-end scheduler timing through the bridge, on simulated time.

use glitch::bridge::{BridgeConfig, EngineConfig, PatternBridge};
use glitch::bus::{BusMessage, EventBus};
use glitch::pattern::{EventCategory, PatternEvent, PatternTable};
use glitch::time::{ManualClock, TimeSource};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Give the engine thread time to observe a manual-clock jump.
fn settle() {
    thread::sleep(Duration::from_millis(120));
}

#[test]
fn half_cycle_scenario_fires_each_event_once() {
    // two kicks: one on the downbeat, one at the half cycle
    let table = PatternTable::new(vec![
        PatternEvent::hit(0.0, EventCategory::Kick, 0.9),
        PatternEvent::hit(0.5, EventCategory::Kick, 0.8),
    ])
    .unwrap();

    let engine = EngineConfig {
        bpm: 90.0,
        beats_per_cycle: 8.0,
        tick_interval_ms: 25.0,
    };
    let cycle_ms = 60_000.0 / 90.0 * 8.0;

    let clock = Arc::new(ManualClock::new());
    let bus = Arc::new(EventBus::new());
    let bridge = PatternBridge::new(
        table,
        engine,
        BridgeConfig::default(),
        Arc::clone(&clock) as Arc<dyn TimeSource>,
        Arc::clone(&bus),
    )
    .unwrap();

    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    bus.subscribe(move |message| {
        if let BusMessage::EventFired { event, .. } = message {
            sink.lock().unwrap().push(event.time);
        }
    });

    // play at t=0: the downbeat kick fires at the start crossing
    bridge.play();
    settle();
    {
        let times = fired.lock().unwrap();
        assert_eq!(times.as_slice(), &[0.0], "only the downbeat fires on play");
    }

    // advance to exactly half the cycle
    clock.advance(cycle_ms / 2.0);
    settle();
    {
        let times = fired.lock().unwrap();
        let half_fires = times.iter().filter(|&&t| t == 0.5).count();
        let zero_fires = times.iter().filter(|&&t| t == 0.0).count();
        assert_eq!(half_fires, 1, "half-cycle kick fires exactly once");
        assert_eq!(zero_fires, 1, "no additional downbeat fires");
    }

    bridge.stop();
}

#[test]
fn frozen_time_fires_nothing_new() {
    let table = PatternTable::new(vec![PatternEvent::hit(0.5, EventCategory::Snare, 0.6)]).unwrap();
    let clock = Arc::new(ManualClock::new());
    let bus = Arc::new(EventBus::new());
    let bridge = PatternBridge::new(
        table,
        EngineConfig::default(),
        BridgeConfig::default(),
        Arc::clone(&clock) as Arc<dyn TimeSource>,
        Arc::clone(&bus),
    )
    .unwrap();

    let count = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&count);
    bus.subscribe(move |message| {
        if matches!(message, BusMessage::EventFired { .. }) {
            *sink.lock().unwrap() += 1;
        }
    });

    bridge.play();
    settle();
    settle();
    assert_eq!(*count.lock().unwrap(), 0, "no position change, no fires");
    bridge.stop();
}

#[test]
fn events_keep_firing_across_cycles() {
    let table = PatternTable::new(vec![PatternEvent::hit(0.25, EventCategory::Hat, 0.4)]).unwrap();
    let engine = EngineConfig {
        bpm: 120.0,
        beats_per_cycle: 4.0, // 2s cycle
        tick_interval_ms: 25.0,
    };
    let clock = Arc::new(ManualClock::new());
    let bus = Arc::new(EventBus::new());
    let bridge = PatternBridge::new(
        table,
        engine,
        BridgeConfig::default(),
        Arc::clone(&clock) as Arc<dyn TimeSource>,
        Arc::clone(&bus),
    )
    .unwrap();

    let count = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&count);
    bus.subscribe(move |message| {
        if matches!(message, BusMessage::EventFired { .. }) {
            *sink.lock().unwrap() += 1;
        }
    });

    bridge.play();
    // walk three cycles in quarter-cycle steps so every crossing is seen
    for _ in 0..12 {
        clock.advance(500.0);
        settle();
    }
    bridge.stop();

    assert_eq!(*count.lock().unwrap(), 3, "one fire per cycle, three cycles");
}
