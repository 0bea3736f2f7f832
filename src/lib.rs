//! # Glitch - pattern scheduling and audio-reactive visuals
//!
//! Glitch is the engine behind the journal pages: a wall-clock pattern
//! scheduler that fires musical/visual events at fractional positions of
//! a repeating cycle, derives coarse frequency-band energy for
//! visualization, and fans everything out through a publish/subscribe
//! bridge so audio and visual renderers stay fully decoupled.
//!
//! ## Core pieces
//!
//! - [`clock`] - wall-clock time to fractional cycle position
//! - [`pattern`] - immutable event tables with category band weights
//! - [`scheduler`] - edge-triggered firing, wraparound included
//! - [`analysis`] - synthetic or FFT-driven band derivation
//! - [`bus`] - named broadcast messages plus a polling cache
//! - [`bridge`] - the engine thread tying it all together
//!
//! ## Quick start
//!
//! ```no_run
//! use glitch::bridge::PatternBridge;
//! use glitch::bus::BusMessage;
//! use glitch::pattern::PatternTable;
//!
//! let bridge = PatternBridge::with_defaults(PatternTable::demo()).unwrap();
//! bridge.bus().subscribe(|message| {
//!     if let BusMessage::EventFired { event, .. } = message {
//!         println!("fired {:?} at {}", event.category, event.time);
//!     }
//! });
//!
//! bridge.play();
//! std::thread::sleep(std::time::Duration::from_secs(4));
//! bridge.stop();
//! ```
//!
//! ## Cycle arithmetic
//!
//! ```
//! use glitch::clock::CycleClock;
//!
//! // 120 bpm, 4 beats per cycle: one cycle every two seconds
//! let clock = CycleClock::from_tempo(0.0, 120.0, 4.0).unwrap();
//! assert_eq!(clock.position(0.0), 0.0);
//! assert!((clock.position(500.0) - 0.25).abs() < 1e-12);
//! assert_eq!(clock.position(2000.0), 0.0); // wraps, never reaches 1.0
//! ```
//!
//! Renderers subscribe to three message names - `event-fired`,
//! `playback-changed` and `signal-updated` - and must tolerate joining
//! late: there is no replay. Consumers that poll instead can read the
//! latest bands from the bus cache at any time.

pub mod analysis;
pub mod bands;
pub mod bridge;
pub mod bus;
pub mod clock;
pub mod error;
pub mod pattern;
pub mod scheduler;
pub mod synth;
pub mod time;
pub mod visual;

pub use error::{GlitchError, Result};
