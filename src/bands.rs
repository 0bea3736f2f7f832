//! Frequency band values shared by both derivation strategies
//!
//! Six coarse bands plus an overall average, each normalized to `[0, 1]`.
//! The FFT path buckets byte magnitudes the way a Web-Audio analyser
//! exposes them; the synthetic path fills the same shape from pattern
//! proximity (see `analysis`).

use serde::Serialize;

/// Band edges in Hz: sub, bass, low-mid, mid, high-mid, treble.
pub const BAND_RANGES_HZ: [(f32, f32); 6] = [
    (20.0, 60.0),
    (60.0, 250.0),
    (250.0, 500.0),
    (500.0, 2000.0),
    (2000.0, 4000.0),
    (4000.0, 20000.0),
];

/// Normalized band energies. Always the latest snapshot, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FrequencyBands {
    pub sub: f32,
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub treble: f32,
    pub average: f32,
}

impl FrequencyBands {
    /// All bands sitting at a uniform baseline level.
    pub fn baseline(level: f32) -> Self {
        let level = level.clamp(0.0, 1.0);
        Self {
            sub: level,
            bass: level,
            low_mid: level,
            mid: level,
            high_mid: level,
            treble: level,
            average: level,
        }
    }

    /// The six band values in low-to-high order, without the average.
    pub fn values(&self) -> [f32; 6] {
        [
            self.sub,
            self.bass,
            self.low_mid,
            self.mid,
            self.high_mid,
            self.treble,
        ]
    }

    /// Band labels matching `values()` order.
    pub fn labels() -> [&'static str; 6] {
        ["sub", "bass", "lomid", "mid", "himid", "treb"]
    }

    /// Every field clamped into `[0, 1]`.
    pub fn clamped(self) -> Self {
        Self {
            sub: self.sub.clamp(0.0, 1.0),
            bass: self.bass.clamp(0.0, 1.0),
            low_mid: self.low_mid.clamp(0.0, 1.0),
            mid: self.mid.clamp(0.0, 1.0),
            high_mid: self.high_mid.clamp(0.0, 1.0),
            treble: self.treble.clamp(0.0, 1.0),
            average: self.average.clamp(0.0, 1.0),
        }
    }

    /// One smoothing step toward `fresh`.
    ///
    /// `smoothing` is the fraction of the previous value retained, so 0
    /// follows the fresh value immediately and values near 1 glide.
    pub fn smoothed_toward(self, fresh: Self, smoothing: f32) -> Self {
        let s = smoothing.clamp(0.0, 1.0);
        let mix = |prev: f32, next: f32| prev * s + next * (1.0 - s);
        Self {
            sub: mix(self.sub, fresh.sub),
            bass: mix(self.bass, fresh.bass),
            low_mid: mix(self.low_mid, fresh.low_mid),
            mid: mix(self.mid, fresh.mid),
            high_mid: mix(self.high_mid, fresh.high_mid),
            treble: mix(self.treble, fresh.treble),
            average: mix(self.average, fresh.average),
        }
    }
}

/// Raw analyser snapshot forwarded alongside derived bands.
///
/// Byte-valued like the analyser node it mirrors: magnitudes are 0-255
/// per bin, waveform samples are centered on 128.
#[derive(Debug, Clone)]
pub struct RawAnalysis {
    pub magnitudes: Vec<u8>,
    pub waveform: Vec<u8>,
    pub fft_size: usize,
    pub timestamp_ms: f64,
}

/// Bucket byte magnitudes into the six bands.
///
/// `bin_width = sample_rate / 2 / bin_count`; each band is the mean
/// magnitude of its bins normalized by 255, and `average` is the mean over
/// all bins.
pub fn bands_from_magnitudes(magnitudes: &[u8], sample_rate: f32) -> FrequencyBands {
    if magnitudes.is_empty() || sample_rate <= 0.0 {
        return FrequencyBands::default();
    }

    let bin_count = magnitudes.len();
    let bin_width = sample_rate / 2.0 / bin_count as f32;

    let mut out = [0.0f32; 6];
    for (band, (lo, hi)) in BAND_RANGES_HZ.iter().enumerate() {
        let min_bin = (lo / bin_width) as usize;
        let max_bin = ((hi / bin_width) as usize).min(bin_count - 1);
        if min_bin >= bin_count || max_bin < min_bin {
            continue;
        }
        let sum: f32 = magnitudes[min_bin..=max_bin]
            .iter()
            .map(|&m| m as f32)
            .sum();
        out[band] = sum / ((max_bin - min_bin + 1) as f32 * 255.0);
    }

    let total: f32 = magnitudes.iter().map(|&m| m as f32).sum();
    let average = total / (bin_count as f32 * 255.0);

    FrequencyBands {
        sub: out[0],
        bass: out[1],
        low_mid: out[2],
        mid: out[3],
        high_mid: out[4],
        treble: out[5],
        average,
    }
    .clamped()
}
