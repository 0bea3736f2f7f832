//! Pattern tables - the scheduled events that drive a cycle
//!
//! A pattern table is an ordered collection of immutable events, each
//! pinned to a fractional position within the repeating cycle. Tables are
//! authored as in-memory literals or loaded from JSON; the scheduler reads
//! them every tick and never mutates them.

use crate::error::{GlitchError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Event duration when a pattern author leaves it out, as a cycle fraction.
pub const DEFAULT_DURATION: f64 = 0.1;

/// What kind of sound/visual an event stands for.
///
/// Categories drive both the synth voice and the band contributions used
/// by the synthetic signal derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Kick,
    Snare,
    Hat,
    Bass,
    Tonal,
}

/// Per-band contribution weights for one event category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandWeights {
    pub sub: f32,
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub treble: f32,
}

impl EventCategory {
    /// Data-driven category-to-band mapping.
    ///
    /// Percussive kinds land in their characteristic bands; tonal events
    /// sit in the mids.
    pub fn band_weights(self) -> BandWeights {
        match self {
            EventCategory::Kick => BandWeights {
                sub: 0.9,
                bass: 1.0,
                low_mid: 0.3,
                mid: 0.1,
                high_mid: 0.0,
                treble: 0.0,
            },
            EventCategory::Snare => BandWeights {
                sub: 0.0,
                bass: 0.2,
                low_mid: 0.5,
                mid: 1.0,
                high_mid: 0.7,
                treble: 0.3,
            },
            EventCategory::Hat => BandWeights {
                sub: 0.0,
                bass: 0.0,
                low_mid: 0.0,
                mid: 0.1,
                high_mid: 0.6,
                treble: 1.0,
            },
            EventCategory::Bass => BandWeights {
                sub: 0.7,
                bass: 1.0,
                low_mid: 0.6,
                mid: 0.2,
                high_mid: 0.0,
                treble: 0.0,
            },
            EventCategory::Tonal => BandWeights {
                sub: 0.0,
                bass: 0.1,
                low_mid: 0.5,
                mid: 1.0,
                high_mid: 0.4,
                treble: 0.1,
            },
        }
    }

    pub fn is_percussive(self) -> bool {
        !matches!(self, EventCategory::Tonal)
    }
}

/// One scheduled event. Immutable once the table is built.
///
/// `time` is a fractional cycle position in `[0, 1)`; `duration` is a
/// cycle fraction too. `pitch` is in Hz for bass/tonal events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEvent {
    pub time: f64,
    pub category: EventCategory,
    #[serde(default)]
    pub pitch: Option<f64>,
    pub gain: f32,
    #[serde(default)]
    pub pan: Option<f32>,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl PatternEvent {
    /// Shorthand for percussive events with no pitch/pan.
    pub fn hit(time: f64, category: EventCategory, gain: f32) -> Self {
        Self {
            time,
            category,
            pitch: None,
            gain,
            pan: None,
            duration: None,
        }
    }

    /// Shorthand for pitched events.
    pub fn note(time: f64, category: EventCategory, pitch: f64, gain: f32) -> Self {
        Self {
            time,
            category,
            pitch: Some(pitch),
            gain,
            pan: None,
            duration: None,
        }
    }

    /// Duration as a cycle fraction, falling back to the default.
    pub fn duration_cycles(&self) -> f64 {
        self.duration.unwrap_or(DEFAULT_DURATION)
    }
}

/// A validated, ordered collection of pattern events.
#[derive(Debug, Clone)]
pub struct PatternTable {
    events: Vec<PatternEvent>,
}

impl PatternTable {
    /// Build a table, failing on an empty input.
    ///
    /// Event times outside `[0, 1)` are wrapped back into the cycle and
    /// logged; the source tables were informally authored and not
    /// range-validated.
    pub fn new(events: Vec<PatternEvent>) -> Result<Self> {
        if events.is_empty() {
            return Err(GlitchError::Pattern("pattern table is empty".to_string()));
        }
        let events = events
            .into_iter()
            .map(|mut ev| {
                if !ev.time.is_finite() {
                    warn!("event time {} is not finite, using 0", ev.time);
                    ev.time = 0.0;
                } else if !(0.0..1.0).contains(&ev.time) {
                    let wrapped = ev.time.rem_euclid(1.0);
                    warn!("event time {} outside [0,1), wrapped to {}", ev.time, wrapped);
                    ev.time = wrapped;
                }
                ev.gain = ev.gain.clamp(0.0, 1.0);
                ev
            })
            .collect();
        Ok(Self { events })
    }

    pub fn events(&self) -> &[PatternEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Parse a table from a JSON array of events.
    pub fn from_json(json: &str) -> Result<Self> {
        let events: Vec<PatternEvent> = serde_json::from_str(json)?;
        Self::new(events)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// The journal page's loop: kicks on the half notes, off-beat hats,
    /// a low drone and two tonal stabs.
    pub fn demo() -> Self {
        let events = vec![
            PatternEvent::hit(0.0, EventCategory::Kick, 0.9),
            PatternEvent::hit(0.5, EventCategory::Kick, 0.8),
            PatternEvent::hit(0.25, EventCategory::Hat, 0.4),
            PatternEvent::hit(0.75, EventCategory::Hat, 0.4),
            PatternEvent::hit(0.5, EventCategory::Snare, 0.6),
            PatternEvent {
                duration: Some(0.45),
                ..PatternEvent::note(0.0, EventCategory::Bass, 55.0, 0.7)
            },
            PatternEvent::note(0.33, EventCategory::Tonal, 220.0, 0.5),
            PatternEvent::note(0.66, EventCategory::Tonal, 330.0, 0.45),
        ];
        Self::new(events).expect("demo table is non-empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_is_an_error() {
        assert!(PatternTable::new(vec![]).is_err());
    }

    #[test]
    fn out_of_range_times_are_wrapped() {
        let table = PatternTable::new(vec![
            PatternEvent::hit(1.25, EventCategory::Kick, 0.9),
            PatternEvent::hit(-0.25, EventCategory::Hat, 0.4),
            PatternEvent::hit(1.0, EventCategory::Snare, 0.5),
        ])
        .unwrap();
        let times: Vec<f64> = table.events().iter().map(|e| e.time).collect();
        assert!((times[0] - 0.25).abs() < 1e-12);
        assert!((times[1] - 0.75).abs() < 1e-12);
        assert_eq!(times[2], 0.0);
        for t in times {
            assert!((0.0..1.0).contains(&t));
        }
    }

    #[test]
    fn gain_is_clamped() {
        let table = PatternTable::new(vec![PatternEvent::hit(0.0, EventCategory::Kick, 3.0)]).unwrap();
        assert_eq!(table.events()[0].gain, 1.0);
    }

    #[test]
    fn band_weights_match_category_character() {
        // kick is a low-end event, hat is a high-end event
        let kick = EventCategory::Kick.band_weights();
        let hat = EventCategory::Hat.band_weights();
        assert!(kick.bass > kick.treble);
        assert!(hat.treble > hat.bass);
        // tonal sits in the mids
        let tonal = EventCategory::Tonal.band_weights();
        assert!(tonal.mid >= tonal.sub && tonal.mid >= tonal.treble);
    }

    #[test]
    fn json_round_trip() {
        let json = r#"[
            {"time": 0.0, "category": "kick", "gain": 0.9},
            {"time": 0.5, "category": "tonal", "gain": 0.5, "pitch": 220.0, "duration": 0.2}
        ]"#;
        let table = PatternTable::from_json(json).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.events()[0].category, EventCategory::Kick);
        assert_eq!(table.events()[1].pitch, Some(220.0));
        assert_eq!(table.events()[1].duration_cycles(), 0.2);
        assert_eq!(table.events()[0].duration_cycles(), DEFAULT_DURATION);
    }

    #[test]
    fn bad_json_is_a_serialization_error() {
        assert!(PatternTable::from_json("not json").is_err());
        // an empty array parses but fails table validation
        assert!(PatternTable::from_json("[]").is_err());
    }

    #[test]
    fn demo_table_is_valid() {
        let table = PatternTable::demo();
        assert!(!table.is_empty());
        for ev in table.events() {
            assert!((0.0..1.0).contains(&ev.time));
            assert!((0.0..=1.0).contains(&ev.gain));
        }
    }
}
