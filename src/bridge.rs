//! Pattern bridge - ties the clock, scheduler, derivation and bus together
//!
//! The bridge owns one engine thread that runs two cooperative timers: the
//! scheduler tick and the signal-derivation tick. Handlers are synchronous
//! and non-blocking; renderers read published messages or poll the bus
//! cache, they are never awaited. Playback state is owned here
//! exclusively and toggled by idempotent `play`/`stop` calls.

use crate::analysis::{AnalysisSource, SignalAnalyzer, SyntheticBands};
use crate::bus::{BusMessage, EventBus};
use crate::clock::{cycle_duration_ms, CycleClock};
use crate::error::{GlitchError, Result};
use crate::pattern::PatternTable;
use crate::scheduler::{FiredEvent, SchedulerCore};
use crate::time::{TimeSource, WallClock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Tempo and tick cadence. Immutable once the bridge is built; changing
/// tempo means building a new bridge and restarting playback.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub bpm: f64,
    pub beats_per_cycle: f64,
    pub tick_interval_ms: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beats_per_cycle: 4.0,
            tick_interval_ms: 25.0,
        }
    }
}

impl EngineConfig {
    /// Validate and return the cycle duration in ms.
    pub fn validate(&self) -> Result<f64> {
        let cycle_ms = cycle_duration_ms(self.bpm, self.beats_per_cycle)?;
        if !(self.tick_interval_ms > 0.0) || !self.tick_interval_ms.is_finite() {
            return Err(GlitchError::Config(format!(
                "tick_interval_ms must be > 0, got {}",
                self.tick_interval_ms
            )));
        }
        Ok(cycle_ms)
    }
}

/// Derivation cadence and smoothing. Immutable for the bridge's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    pub analysis_interval_ms: f64,
    pub fft_size: usize,
    /// Fraction of the previous band value retained per derivation tick.
    pub smoothing: f32,
    /// When false, derived signals are only cached for polling and no
    /// `signal-updated` messages are broadcast.
    pub use_broadcast: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            analysis_interval_ms: 50.0,
            fft_size: 2048,
            smoothing: 0.7,
            use_broadcast: true,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.analysis_interval_ms > 0.0) || !self.analysis_interval_ms.is_finite() {
            return Err(GlitchError::Config(format!(
                "analysis_interval_ms must be > 0, got {}",
                self.analysis_interval_ms
            )));
        }
        if self.fft_size == 0 || !self.fft_size.is_power_of_two() {
            return Err(GlitchError::Config(format!(
                "fft_size must be a power of two, got {}",
                self.fft_size
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(GlitchError::Config(format!(
                "smoothing must be in [0, 1), got {}",
                self.smoothing
            )));
        }
        Ok(())
    }
}

struct Shared {
    playing: bool,
    scheduler: Option<SchedulerCore>,
    analyzer: SignalAnalyzer,
    table: PatternTable,
    next_tick_ms: f64,
    next_analysis_ms: f64,
}

/// Scheduler + derivation + bus, behind a start/stop surface.
pub struct PatternBridge {
    bus: Arc<EventBus>,
    time: Arc<dyn TimeSource>,
    shared: Arc<Mutex<Shared>>,
    engine: EngineConfig,
    config: BridgeConfig,
    cycle_ms: f64,
    shutdown: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl PatternBridge {
    /// Build a bridge over an injected time source and bus.
    ///
    /// Fails fast on invalid configuration; a bridge that cannot run is
    /// never constructed, so "not started" and "erroring" stay distinct.
    pub fn new(
        table: PatternTable,
        engine: EngineConfig,
        config: BridgeConfig,
        time: Arc<dyn TimeSource>,
        bus: Arc<EventBus>,
    ) -> Result<Self> {
        let cycle_ms = engine.validate()?;
        config.validate()?;

        let shared = Arc::new(Mutex::new(Shared {
            playing: false,
            scheduler: None,
            analyzer: SignalAnalyzer::new(config.smoothing).with_synthetic(SyntheticBands::new()),
            table,
            next_tick_ms: 0.0,
            next_analysis_ms: 0.0,
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let shared = Arc::clone(&shared);
            let bus = Arc::clone(&bus);
            let time = Arc::clone(&time);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                engine_loop(shared, bus, time, shutdown, engine, config, cycle_ms)
            })
        };

        Ok(Self {
            bus,
            time,
            shared,
            engine,
            config,
            cycle_ms,
            shutdown,
            worker: Some(worker),
        })
    }

    /// Bridge with default tempo/analysis settings, a wall clock and a
    /// fresh bus.
    pub fn with_defaults(table: PatternTable) -> Result<Self> {
        Self::new(
            table,
            EngineConfig::default(),
            BridgeConfig::default(),
            Arc::new(WallClock::new()),
            Arc::new(EventBus::new()),
        )
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn engine_config(&self) -> EngineConfig {
        self.engine
    }

    pub fn cycle_ms(&self) -> f64 {
        self.cycle_ms
    }

    /// Start playback. A no-op when already playing.
    ///
    /// Resets the per-event watermarks, anchors the cycle at the current
    /// time, fires start-of-cycle events and broadcasts the transition.
    pub fn play(&self) {
        let mut outbox = Vec::new();
        {
            let mut s = self.shared.lock().unwrap();
            if s.playing {
                debug!("play() while already playing, ignoring");
                return;
            }
            let now = self.time.now_ms();
            let clock = CycleClock::with_cycle_ms(now, self.cycle_ms);
            let mut core =
                SchedulerCore::new(clock, s.table.clone(), self.engine.tick_interval_ms);
            let started = core.begin(now);
            let position = core.position(now);

            s.playing = true;
            s.next_tick_ms = now + self.engine.tick_interval_ms;
            s.next_analysis_ms = now + self.config.analysis_interval_ms;
            s.scheduler = Some(core);

            outbox.push(BusMessage::PlaybackChanged {
                is_playing: true,
                cycle_position: position,
            });
            for f in started {
                outbox.push(self.fired_message(f, now));
            }
        }
        for message in outbox {
            self.bus.publish(message);
        }
    }

    /// Stop playback. A no-op when already stopped; safe to call from a
    /// subscriber callback.
    pub fn stop(&self) {
        let message = {
            let mut s = self.shared.lock().unwrap();
            if !s.playing {
                debug!("stop() while already stopped, ignoring");
                return;
            }
            s.playing = false;
            let position = s
                .scheduler
                .as_ref()
                .map(|core| core.position(self.time.now_ms()))
                .unwrap_or(0.0);
            // watermarks are reset on the next play()
            s.scheduler = None;
            BusMessage::PlaybackChanged {
                is_playing: false,
                cycle_position: position,
            }
        };
        self.bus.publish(message);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.lock().unwrap().playing
    }

    /// Current cycle position, while playing.
    pub fn position(&self) -> Option<f64> {
        let s = self.shared.lock().unwrap();
        s.scheduler
            .as_ref()
            .map(|core| core.position(self.time.now_ms()))
    }

    /// Latest derived bands from the bus cache.
    pub fn latest_bands(&self) -> Option<crate::bands::FrequencyBands> {
        self.bus.latest_bands()
    }

    /// Attach a live analysis source, replacing any previous one.
    pub fn connect_source(&self, source: Box<dyn AnalysisSource>) {
        self.shared.lock().unwrap().analyzer.connect_source(source);
    }

    /// Detach the live source and fall back to synthetic derivation.
    pub fn disconnect_source(&self) -> bool {
        self.shared.lock().unwrap().analyzer.disconnect_source()
    }

    fn fired_message(&self, fired: FiredEvent, now_ms: f64) -> BusMessage {
        let duration_ms = fired.event.duration_cycles() * self.cycle_ms;
        BusMessage::EventFired {
            event: fired.event,
            fired_at_ms: now_ms,
            duration_ms,
            cycle_position: fired.cycle_position,
        }
    }
}

impl Drop for PatternBridge {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// The engine thread: both timers in one cooperative loop.
///
/// Neither timer may block; each pass collects due work under the state
/// lock, releases it, then publishes. Next-due times advance by their
/// interval, resynchronizing after a stall instead of firing a burst.
fn engine_loop(
    shared: Arc<Mutex<Shared>>,
    bus: Arc<EventBus>,
    time: Arc<dyn TimeSource>,
    shutdown: Arc<AtomicBool>,
    engine: EngineConfig,
    config: BridgeConfig,
    cycle_ms: f64,
) {
    let quantum = Duration::from_millis(2);

    while !shutdown.load(Ordering::Relaxed) {
        let mut outbox: Vec<BusMessage> = Vec::new();
        {
            let mut guard = shared.lock().unwrap();
            let s = &mut *guard;
            if s.playing {
                let now = time.now_ms();

                if now >= s.next_tick_ms {
                    if let Some(core) = s.scheduler.as_mut() {
                        for fired in core.tick(now) {
                            let duration_ms = fired.event.duration_cycles() * cycle_ms;
                            outbox.push(BusMessage::EventFired {
                                event: fired.event,
                                fired_at_ms: now,
                                duration_ms,
                                cycle_position: fired.cycle_position,
                            });
                        }
                    }
                    s.next_tick_ms += engine.tick_interval_ms;
                    if s.next_tick_ms <= now {
                        s.next_tick_ms = now + engine.tick_interval_ms;
                    }
                }

                if now >= s.next_analysis_ms {
                    let position = s
                        .scheduler
                        .as_ref()
                        .map(|core| core.position(now))
                        .unwrap_or(0.0);
                    let (bands, raw) = s.analyzer.derive(&s.table, position, now);
                    if config.use_broadcast {
                        outbox.push(BusMessage::SignalUpdated { raw, bands });
                    } else {
                        bus.store_bands(bands);
                    }
                    s.next_analysis_ms += config.analysis_interval_ms;
                    if s.next_analysis_ms <= now {
                        s.next_analysis_ms = now + config.analysis_interval_ms;
                    }
                }
            }
        }

        for message in outbox {
            bus.publish(message);
        }

        thread::sleep(quantum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::PLAYBACK_CHANGED;
    use crate::time::ManualClock;
    use std::sync::atomic::AtomicUsize;

    fn manual_bridge() -> (PatternBridge, Arc<EventBus>, Arc<ManualClock>) {
        let bus = Arc::new(EventBus::new());
        let clock = Arc::new(ManualClock::new());
        let bridge = PatternBridge::new(
            PatternTable::demo(),
            EngineConfig::default(),
            BridgeConfig::default(),
            Arc::clone(&clock) as Arc<dyn TimeSource>,
            Arc::clone(&bus),
        )
        .unwrap();
        (bridge, bus, clock)
    }

    #[test]
    fn rejects_invalid_configuration() {
        let table = PatternTable::demo();
        let bad_bpm = EngineConfig {
            bpm: 0.0,
            ..EngineConfig::default()
        };
        assert!(PatternBridge::new(
            table.clone(),
            bad_bpm,
            BridgeConfig::default(),
            Arc::new(ManualClock::new()),
            Arc::new(EventBus::new()),
        )
        .is_err());

        let bad_fft = BridgeConfig {
            fft_size: 1000,
            ..BridgeConfig::default()
        };
        assert!(PatternBridge::new(
            table.clone(),
            EngineConfig::default(),
            bad_fft,
            Arc::new(ManualClock::new()),
            Arc::new(EventBus::new()),
        )
        .is_err());

        let bad_smoothing = BridgeConfig {
            smoothing: 1.0,
            ..BridgeConfig::default()
        };
        assert!(PatternBridge::new(
            table,
            EngineConfig::default(),
            bad_smoothing,
            Arc::new(ManualClock::new()),
            Arc::new(EventBus::new()),
        )
        .is_err());
    }

    #[test]
    fn play_and_stop_are_idempotent() {
        let (bridge, bus, _clock) = manual_bridge();
        let transitions = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&transitions);
        bus.subscribe(move |m| {
            if m.name() == PLAYBACK_CHANGED {
                t.fetch_add(1, Ordering::SeqCst);
            }
        });

        // double stop while stopped: nothing
        bridge.stop();
        bridge.stop();
        assert_eq!(transitions.load(Ordering::SeqCst), 0);

        // double play: one transition
        bridge.play();
        bridge.play();
        assert_eq!(transitions.load(Ordering::SeqCst), 1);
        assert!(bridge.is_playing());

        // double stop: one transition
        bridge.stop();
        bridge.stop();
        assert_eq!(transitions.load(Ordering::SeqCst), 2);
        assert!(!bridge.is_playing());
    }

    #[test]
    fn play_fires_start_of_cycle_events_immediately() {
        let (bridge, bus, _clock) = manual_bridge();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let f = Arc::clone(&fired);
        bus.subscribe(move |m| {
            if let BusMessage::EventFired { event, .. } = m {
                f.lock().unwrap().push(event.time);
            }
        });

        bridge.play();
        let times = fired.lock().unwrap().clone();
        assert!(!times.is_empty(), "beat-zero events fire on play()");
        assert!(times.iter().all(|&t| t < 0.05));
    }

    #[test]
    fn stop_can_be_called_from_a_subscriber() {
        let bus = Arc::new(EventBus::new());
        let clock = Arc::new(ManualClock::new());
        let bridge = Arc::new(
            PatternBridge::new(
                PatternTable::demo(),
                EngineConfig::default(),
                BridgeConfig::default(),
                Arc::clone(&clock) as Arc<dyn TimeSource>,
                Arc::clone(&bus),
            )
            .unwrap(),
        );

        let inner = Arc::clone(&bridge);
        bus.subscribe(move |m| {
            if let BusMessage::EventFired { .. } = m {
                inner.stop();
            }
        });

        bridge.play();
        // demo table has a beat-zero kick, so the subscriber already ran
        assert!(!bridge.is_playing());
    }

    #[test]
    fn position_is_only_available_while_playing() {
        let (bridge, _bus, clock) = manual_bridge();
        assert!(bridge.position().is_none());
        bridge.play();
        clock.advance(500.0);
        let pos = bridge.position().unwrap();
        assert!((0.0..1.0).contains(&pos));
        bridge.stop();
        assert!(bridge.position().is_none());
    }
}
