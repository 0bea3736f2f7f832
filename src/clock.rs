//! Cycle clock - wall-clock time to fractional cycle position
//!
//! One cycle is `beats_per_cycle` beats at the configured tempo. The clock
//! is a pure function of its start time: position is re-derived on every
//! call, never accumulated, so it can't drift.

use crate::error::{GlitchError, Result};

/// Duration of one cycle in milliseconds for a tempo.
///
/// Fails fast on a non-positive tempo or beat count so downstream code
/// never divides by zero.
pub fn cycle_duration_ms(bpm: f64, beats_per_cycle: f64) -> Result<f64> {
    if !(bpm > 0.0) || !bpm.is_finite() {
        return Err(GlitchError::Config(format!("bpm must be > 0, got {bpm}")));
    }
    if !(beats_per_cycle > 0.0) || !beats_per_cycle.is_finite() {
        return Err(GlitchError::Config(format!(
            "beats_per_cycle must be > 0, got {beats_per_cycle}"
        )));
    }
    Ok(60_000.0 / bpm * beats_per_cycle)
}

/// Converts a time source reading into a position within the current cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleClock {
    start_ms: f64,
    cycle_ms: f64,
}

impl CycleClock {
    /// Clock starting at `start_ms` with the given tempo.
    pub fn from_tempo(start_ms: f64, bpm: f64, beats_per_cycle: f64) -> Result<Self> {
        Ok(Self {
            start_ms,
            cycle_ms: cycle_duration_ms(bpm, beats_per_cycle)?,
        })
    }

    /// Clock with a pre-computed cycle duration. `cycle_ms` must be > 0.
    pub fn with_cycle_ms(start_ms: f64, cycle_ms: f64) -> Self {
        debug_assert!(cycle_ms > 0.0);
        Self { start_ms, cycle_ms }
    }

    pub fn cycle_ms(&self) -> f64 {
        self.cycle_ms
    }

    pub fn start_ms(&self) -> f64 {
        self.start_ms
    }

    /// Fractional position in the current cycle, always in `[0, 1)`.
    ///
    /// `now == start` yields exactly 0. Uses a floating modulo so times
    /// before the start still land inside the cycle.
    pub fn position(&self, now_ms: f64) -> f64 {
        let pos = (now_ms - self.start_ms).rem_euclid(self.cycle_ms) / self.cycle_ms;
        // rem_euclid can round up to the full divisor for values just
        // below a boundary; fold that back to the wrap point.
        if pos >= 1.0 {
            0.0
        } else {
            pos
        }
    }

    /// Number of whole cycles elapsed since the start.
    pub fn cycles_elapsed(&self, now_ms: f64) -> i64 {
        ((now_ms - self.start_ms) / self.cycle_ms).floor() as i64
    }
}
