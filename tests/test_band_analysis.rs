//! Band derivation properties: normalization, proximity and reconnects.

use glitch::analysis::{AnalysisSource, SyntheticBands};
use glitch::bands::{bands_from_magnitudes, RawAnalysis};
use glitch::bridge::{BridgeConfig, EngineConfig, PatternBridge};
use glitch::bus::EventBus;
use glitch::pattern::{EventCategory, PatternEvent, PatternTable};
use glitch::time::{ManualClock, TimeSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn settle() {
    thread::sleep(Duration::from_millis(120));
}

#[test]
fn band_values_stay_normalized_for_any_input() {
    let inputs: Vec<Vec<u8>> = vec![
        vec![0; 512],
        vec![255; 512],
        (0..1024).map(|i| (i % 256) as u8).collect(),
        (0..64).map(|i| (i * 13 % 256) as u8).collect(),
    ];
    for magnitudes in inputs {
        let bands = bands_from_magnitudes(&magnitudes, 44100.0);
        for value in bands.values() {
            assert!((0.0..=1.0).contains(&value));
        }
        assert!((0.0..=1.0).contains(&bands.average));
    }

    let silent = bands_from_magnitudes(&[0u8; 1024], 44100.0);
    assert_eq!(silent.average, 0.0);
}

#[test]
fn closer_events_contribute_more_energy() {
    let table = PatternTable::new(vec![PatternEvent::hit(0.5, EventCategory::Bass, 0.8)]).unwrap();
    let mut synth = SyntheticBands::with_params(0.1, 0.12, 0.0).with_seed(42);

    let on_top = synth.derive(&table, 0.5).bass;
    let half_radius = synth.derive(&table, 0.55).bass;
    let outside = synth.derive(&table, 0.75).bass;

    assert!(on_top > half_radius);
    assert!(half_radius > outside);
    assert!((outside - 0.12).abs() < 1e-6, "floor value far from events");
}

struct CountingSource {
    calls: Arc<AtomicUsize>,
}

impl AnalysisSource for CountingSource {
    fn sample_rate(&self) -> f32 {
        44100.0
    }

    fn capture(&mut self, now_ms: f64) -> Option<RawAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(RawAnalysis {
            magnitudes: vec![100; 128],
            waveform: vec![128; 128],
            fft_size: 256,
            timestamp_ms: now_ms,
        })
    }
}

#[test]
fn reconnecting_a_source_stops_the_previous_one() {
    let clock = Arc::new(ManualClock::new());
    let bus = Arc::new(EventBus::new());
    let bridge = PatternBridge::new(
        PatternTable::demo(),
        EngineConfig::default(),
        BridgeConfig::default(),
        Arc::clone(&clock) as Arc<dyn TimeSource>,
        Arc::clone(&bus),
    )
    .unwrap();

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    bridge.connect_source(Box::new(CountingSource {
        calls: Arc::clone(&first),
    }));

    bridge.play();
    for _ in 0..3 {
        clock.advance(60.0);
        settle();
    }
    let first_before = first.load(Ordering::SeqCst);
    assert!(first_before >= 3, "first source is being polled");

    bridge.connect_source(Box::new(CountingSource {
        calls: Arc::clone(&second),
    }));
    for _ in 0..3 {
        clock.advance(60.0);
        settle();
    }
    bridge.stop();

    assert_eq!(
        first.load(Ordering::SeqCst),
        first_before,
        "replaced source must stop ticking"
    );
    assert!(second.load(Ordering::SeqCst) >= 3, "new source takes over");
}

#[test]
fn disconnecting_falls_back_to_synthetic_bands() {
    let clock = Arc::new(ManualClock::new());
    let bus = Arc::new(EventBus::new());
    let bridge = PatternBridge::new(
        PatternTable::demo(),
        EngineConfig::default(),
        BridgeConfig::default(),
        Arc::clone(&clock) as Arc<dyn TimeSource>,
        Arc::clone(&bus),
    )
    .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    bridge.connect_source(Box::new(CountingSource {
        calls: Arc::clone(&calls),
    }));
    assert!(bridge.disconnect_source());
    assert!(!bridge.disconnect_source(), "second disconnect is a no-op");

    bridge.play();
    clock.advance(60.0);
    settle();
    bridge.stop();

    assert_eq!(calls.load(Ordering::SeqCst), 0, "disconnected source is idle");
    assert!(bridge.latest_bands().is_some(), "synthetic path still derives");
}
