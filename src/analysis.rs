//! Signal derivation - band energies from patterns or live audio
//!
//! Two interchangeable strategies share the `FrequencyBands` output shape:
//! a synthetic one that weights nearby pattern events by circular
//! proximity (used when no real audio is connected), and a live one that
//! buckets FFT magnitudes from an `AnalysisSource`. The bridge runs one
//! derivation per analysis tick while playing and smooths between ticks.

use crate::bands::{bands_from_magnitudes, FrequencyBands, RawAnalysis};
use crate::error::{GlitchError, Result};
use crate::pattern::PatternTable;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Distance between two cycle positions on the unit circle.
///
/// Accounts for wraparound, so 0.95 and 0.05 are 0.1 apart.
pub fn circular_distance(a: f64, b: f64) -> f64 {
    let d = a - b;
    d.abs().min((d + 1.0).abs()).min((d - 1.0).abs())
}

/// Proximity-weighted band derivation from a pattern table.
///
/// Each event within `radius` of the current position contributes
/// `gain * (1 - distance / radius)` scaled by its category's band
/// weights. Bands are additive across events, clamped, floored so the
/// visuals never go fully dark, and jittered for liveliness.
pub struct SyntheticBands {
    radius: f64,
    floor: f32,
    jitter: f32,
    rng: fastrand::Rng,
}

impl SyntheticBands {
    pub fn new() -> Self {
        Self::with_params(0.1, 0.12, 0.03)
    }

    pub fn with_params(radius: f64, floor: f32, jitter: f32) -> Self {
        Self {
            radius: radius.max(1e-6),
            floor: floor.clamp(0.0, 1.0),
            jitter,
            rng: fastrand::Rng::new(),
        }
    }

    /// Deterministic jitter for tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn floor(&self) -> f32 {
        self.floor
    }

    pub fn derive(&mut self, table: &PatternTable, position: f64) -> FrequencyBands {
        let mut acc = [0.0f32; 6];
        for ev in table.events() {
            let dist = circular_distance(ev.time, position);
            if dist >= self.radius {
                continue;
            }
            let strength = ev.gain * (1.0 - (dist / self.radius) as f32);
            let w = ev.category.band_weights();
            acc[0] += strength * w.sub;
            acc[1] += strength * w.bass;
            acc[2] += strength * w.low_mid;
            acc[3] += strength * w.mid;
            acc[4] += strength * w.high_mid;
            acc[5] += strength * w.treble;
        }

        for band in &mut acc {
            let jitter = (self.rng.f32() * 2.0 - 1.0) * self.jitter;
            *band = (band.clamp(0.0, 1.0).max(self.floor) + jitter).clamp(0.0, 1.0);
        }

        FrequencyBands {
            sub: acc[0],
            bass: acc[1],
            low_mid: acc[2],
            mid: acc[3],
            high_mid: acc[4],
            treble: acc[5],
            average: acc.iter().sum::<f32>() / 6.0,
        }
    }
}

impl Default for SyntheticBands {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected producer of raw spectral snapshots.
///
/// Returning `None` from `capture` means no data is available yet; the
/// analyzer degrades to its cached bands rather than erroring.
pub trait AnalysisSource: Send {
    fn sample_rate(&self) -> f32;
    fn capture(&mut self, now_ms: f64) -> Option<RawAnalysis>;
}

/// Cloneable handle that pushes audio samples into an `FftSource`.
#[derive(Clone)]
pub struct SampleFeed {
    buffer: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl SampleFeed {
    pub fn push(&self, samples: &[f32]) {
        let mut buf = self.buffer.lock().unwrap();
        buf.extend(samples.iter().copied());
        while buf.len() > self.capacity {
            buf.pop_front();
        }
    }
}

/// Live analysis source: FFT over the most recent fed samples.
///
/// Output is byte-valued (magnitudes 0-255, waveform centered on 128) to
/// match the analyser-node contract the renderers were written against.
pub struct FftSource {
    buffer: Arc<Mutex<VecDeque<f32>>>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    window_gain: f32,
    fft_size: usize,
    sample_rate: f32,
}

impl FftSource {
    /// Build a source and the feed handle that supplies it with samples.
    pub fn new(sample_rate: f32, fft_size: usize) -> Result<(Self, SampleFeed)> {
        if fft_size == 0 || !fft_size.is_power_of_two() {
            return Err(GlitchError::Config(format!(
                "fft_size must be a power of two, got {fft_size}"
            )));
        }
        if sample_rate <= 0.0 {
            return Err(GlitchError::Config(format!(
                "sample_rate must be > 0, got {sample_rate}"
            )));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Hann window; normalize magnitudes by the window sum so a
        // full-scale sine peaks near 1.0 before byte conversion.
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let t = i as f32 / (fft_size - 1) as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();
        let window_gain = 2.0 / window.iter().sum::<f32>();

        let buffer = Arc::new(Mutex::new(VecDeque::with_capacity(fft_size * 4)));
        let feed = SampleFeed {
            buffer: Arc::clone(&buffer),
            capacity: fft_size * 4,
        };

        Ok((
            Self {
                buffer,
                fft,
                window,
                window_gain,
                fft_size,
                sample_rate,
            },
            feed,
        ))
    }
}

impl AnalysisSource for FftSource {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn capture(&mut self, now_ms: f64) -> Option<RawAnalysis> {
        let (mut spectrum, waveform) = {
            let buf = self.buffer.lock().unwrap();
            if buf.len() < self.fft_size {
                return None;
            }
            let start = buf.len() - self.fft_size;
            let spectrum: Vec<Complex<f32>> = (0..self.fft_size)
                .map(|i| Complex::new(buf[start + i] * self.window[i], 0.0))
                .collect();
            let waveform: Vec<u8> = (0..self.fft_size)
                .map(|i| ((buf[start + i].clamp(-1.0, 1.0) * 0.5 + 0.5) * 255.0) as u8)
                .collect();
            (spectrum, waveform)
        };

        self.fft.process(&mut spectrum);

        let magnitudes: Vec<u8> = spectrum[..self.fft_size / 2]
            .iter()
            .map(|c| ((c.norm() * self.window_gain).min(1.0) * 255.0) as u8)
            .collect();

        Some(RawAnalysis {
            magnitudes,
            waveform,
            fft_size: self.fft_size,
            timestamp_ms: now_ms,
        })
    }
}

/// Strategy selector plus smoothing state.
///
/// With a connected source the analyzer is FFT-driven; without one it
/// falls back to synthetic pattern proximity. Connecting a new source
/// drops the previous one, so there is never more than one live producer.
pub struct SignalAnalyzer {
    smoothing: f32,
    synthetic: SyntheticBands,
    source: Option<Box<dyn AnalysisSource>>,
    smoothed: FrequencyBands,
}

impl SignalAnalyzer {
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoothing: smoothing.clamp(0.0, 1.0),
            synthetic: SyntheticBands::new(),
            source: None,
            smoothed: FrequencyBands::default(),
        }
    }

    pub fn with_synthetic(mut self, synthetic: SyntheticBands) -> Self {
        self.synthetic = synthetic;
        self
    }

    /// Attach a live source, tearing down any previous one.
    pub fn connect_source(&mut self, source: Box<dyn AnalysisSource>) {
        if self.source.is_some() {
            debug!("replacing existing analysis source");
        }
        self.source = Some(source);
    }

    /// Detach the live source. Returns whether one was connected.
    pub fn disconnect_source(&mut self) -> bool {
        self.source.take().is_some()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Run one derivation step and return the smoothed bands.
    pub fn derive(
        &mut self,
        table: &PatternTable,
        position: f64,
        now_ms: f64,
    ) -> (FrequencyBands, Option<RawAnalysis>) {
        let (fresh, raw) = match &mut self.source {
            Some(src) => match src.capture(now_ms) {
                Some(raw) => {
                    let bands = bands_from_magnitudes(&raw.magnitudes, src.sample_rate());
                    (bands, Some(raw))
                }
                None => {
                    // no data yet: glide toward the floor rather than fail
                    debug!("analysis source produced no data, holding baseline");
                    (FrequencyBands::baseline(self.synthetic.floor()), None)
                }
            },
            None => (self.synthetic.derive(table, position), None),
        };

        self.smoothed = self.smoothed.smoothed_toward(fresh, self.smoothing);
        (self.smoothed, raw)
    }

    /// Most recent smoothed bands without running a new derivation.
    pub fn latest(&self) -> FrequencyBands {
        self.smoothed
    }
}
